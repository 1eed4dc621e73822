//! Retitle runtime: wires the Telegram adapter, coordinator and gateway.

use crate::config::RetitleConfig;
use crate::gateway::Gateway;
use crate::transport::ChannelTransport;
use anyhow::Result;
use rt_channels::{ChannelAdapter, TelegramAdapter};
use rt_core::{RenameCoordinator, RoomId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INBOUND_QUEUE_CAPACITY: usize = 256;
const GATEWAY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = RetitleConfig::load_with_path(config_path).await?;
    let token = cfg.bot_token().ok_or_else(|| {
        anyhow::anyhow!("telegram.bot_token is required (or set TELEGRAM_BOT_TOKEN)")
    })?;

    let channel: Arc<dyn ChannelAdapter> = Arc::new(TelegramAdapter::new(token)?);
    if !channel.supports_titles() {
        return Err(anyhow::anyhow!(
            "channel {} cannot change chat titles",
            channel.channel_id()
        ));
    }
    let transport = Arc::new(ChannelTransport::new(channel.clone()));
    let coordinator = Arc::new(RenameCoordinator::new(
        cfg.build_registry()?,
        transport,
        cfg.tunables(),
    ));
    tracing::info!(
        config_path = %path.display(),
        rooms = ?coordinator.rooms().ids(),
        tunables = ?coordinator.tunables(),
        "coordinator ready"
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    channel.start(inbound_tx).await?;

    let gateway = Arc::new(Gateway::new(coordinator.clone(), inbound_rx));
    let shutdown = CancellationToken::new();
    let gateway_handle = gateway.start(shutdown.child_token());
    tracing::info!(channel = channel.channel_id(), "gateway started");

    shutdown_signal(shutdown.clone()).await;

    match tokio::time::timeout(GATEWAY_SHUTDOWN_TIMEOUT, gateway_handle).await {
        Ok(Ok(())) => tracing::info!("gateway shutdown completed"),
        Ok(Err(e)) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
        Err(_) => tracing::warn!("timed out waiting for gateway shutdown"),
    }
    coordinator.shutdown().await;
    tracing::info!("coordinator shutdown completed");
    Ok(())
}

pub async fn check(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = RetitleConfig::load_with_path(config_path).await?;
    let tunables = cfg.tunables();
    tracing::info!(
        config_path = %path.display(),
        rooms = cfg.rooms.len(),
        has_bot_token = cfg.bot_token().is_some(),
        "config ok"
    );
    println!("config ok: {}", path.display());
    println!(
        "multi_edit_hold={}s revert_after={}s max_title_len={}",
        tunables.multi_edit_hold.as_secs(),
        tunables.revert_after.as_secs(),
        tunables.max_title_len
    );
    for room in &cfg.rooms {
        println!(
            "room {}: {:?} ({} pattern(s), {} fixup rule(s))",
            room.id,
            room.original_title,
            room.patterns.len(),
            room.fixup.len()
        );
    }
    if cfg.bot_token().is_none() {
        println!("warning: no telegram.bot_token configured; `serve` will refuse to start");
    }
    Ok(())
}

pub async fn preview(config_path: Option<PathBuf>, room: &str, text: &str) -> Result<()> {
    let cfg = RetitleConfig::load(config_path).await?;
    println!("{}", describe_preview(&cfg, room, text)?);
    Ok(())
}

/// Title a message would produce in a freshly reverted room.
pub fn describe_preview(cfg: &RetitleConfig, room: &str, text: &str) -> Result<String> {
    let registry = cfg.build_registry()?;
    let room = registry.get(&RoomId::from(room)).ok_or_else(|| {
        let known: Vec<String> = registry.ids().iter().map(ToString::to_string).collect();
        anyhow::anyhow!("unknown room {room}; configured rooms: {}", known.join(", "))
    })?;
    let Some(candidate) = room.spec().candidate(&[], text) else {
        return Ok("no pattern matches".to_string());
    };
    let max = cfg.timing.max_title_len;
    if candidate.char_len() > max {
        return Ok(format!(
            "rejected: {:?} is {} characters (max {max})",
            candidate.title,
            candidate.char_len()
        ));
    }
    Ok(candidate.title)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn config() -> RetitleConfig {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"
[[rooms]]
id = "-1001384391544"
original_title = "Programming & Tech for girls"
patterns = ['prog(?:ramming|gy) (?:&|and) (.+)']
fixup = [
  { kind = "prefix", text = "Programming & " },
  { kind = "append_unless", keyword = "tech", suffix = " & Tech" },
  { kind = "append_unless", keyword = "girl", suffix = " for girls" },
]
"#,
        )
        .expect("write config");
        RetitleConfig::load(Some(file.path().to_path_buf()))
            .await
            .expect("load config")
    }

    #[tokio::test]
    async fn preview_describes_title_and_rejections() {
        let cfg = config().await;
        assert_eq!(
            describe_preview(&cfg, "-1001384391544", "proggy and rust and go").expect("preview"),
            "Programming & Rust & Go & Tech for girls"
        );
        assert_eq!(
            describe_preview(&cfg, "-1001384391544", "good morning").expect("preview"),
            "no pattern matches"
        );
        let long = format!("programming and {}", "x".repeat(200));
        assert!(
            describe_preview(&cfg, "-1001384391544", &long)
                .expect("preview")
                .starts_with("rejected:")
        );
        let err = describe_preview(&cfg, "nope", "programming and cats").expect_err("unknown");
        assert!(err.to_string().contains("-1001384391544"));
    }
}
