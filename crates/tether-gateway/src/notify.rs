use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_client::{ClientHandle, OutboundPayload};
use tether_connection::{LifecycleListener, SessionEnd};
use tether_core::TetherConfig;
use tracing::{info, warn};

/// Server suffix for direct-chat JIDs.
const USER_SERVER: &str = "s.whatsapp.net";

/// Announces readiness and optionally messages owners on every connect.
pub struct ReadyNotifier {
    owners: Vec<String>,
    notify_owners: bool,
    prefix: String,
    mode: String,
    send_timeout: Duration,
}

impl ReadyNotifier {
    pub fn from_config(config: &TetherConfig) -> Self {
        Self {
            owners: config.bot.owner_numbers(),
            notify_owners: config.bot.startup_notify,
            prefix: config.bot.prefix.clone(),
            mode: config.bot.mode.to_string(),
            send_timeout: Duration::from_secs(config.gateway.send_timeout_secs),
        }
    }

    pub fn startup_text(&self) -> String {
        format!(
            "✅ Bot connected\n\nPrefix: {}\nMode: {}\nVersion: {}",
            self.prefix,
            self.mode,
            env!("CARGO_PKG_VERSION")
        )
    }
}

#[async_trait]
impl LifecycleListener for ReadyNotifier {
    async fn on_open(&self, handle: Arc<dyn ClientHandle>) {
        info!(prefix = %self.prefix, mode = %self.mode, "bot ready");
        if !self.notify_owners {
            return;
        }
        let text = self.startup_text();
        for owner in &self.owners {
            let jid = format!("{owner}@{USER_SERVER}");
            let send = handle.send_message(&jid, OutboundPayload::text(text.clone()));
            match tokio::time::timeout(self.send_timeout, send).await {
                Ok(Ok(())) => info!(owner = %jid, "startup notice sent"),
                Ok(Err(e)) => warn!(owner = %jid, error = %e, "startup notice failed"),
                Err(_) => warn!(owner = %jid, "startup notice timed out"),
            }
        }
    }

    async fn on_terminal(&self, end: &SessionEnd) {
        warn!(?end, "connection session over");
    }
}
