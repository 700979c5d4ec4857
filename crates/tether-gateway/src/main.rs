use std::sync::Arc;
use std::time::Duration;

use tether_client::bridge::BridgeClient;
use tether_core::TetherConfig;
use tether_gateway::{Gateway, GatewayError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tether=info,tether_gateway=info,tether_connection=info,tether_dispatch=info,\
                 tether_session=info,tether_client=info"
                    .into()
            }),
        )
        .init();

    // explicit TETHER_CONFIG path > ~/.tether/tether.toml, then TETHER_* env overrides
    let config_path = std::env::var("TETHER_CONFIG").ok();
    // a missing file already yields defaults; anything else is fatal
    let config = match TetherConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "config load failed");
            std::process::exit(1);
        }
    };

    info!(
        prefix = %config.bot.prefix,
        mode = %config.bot.mode,
        bridge = %config.bridge.url,
        "starting tether"
    );

    let client = Arc::new(BridgeClient::new(
        config.bridge.url.clone(),
        Duration::from_secs(config.gateway.send_timeout_secs),
    ));

    let mut gateway = Gateway::builder(config).client(client).build()?;
    if let Err(e) = gateway.start().await {
        error!(error = %e, "gateway failed to start");
        std::process::exit(1);
    }

    let stop = gateway.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            stop.cancel();
        }
    });

    match gateway.run_until_stopped().await {
        Ok(()) => {
            info!("tether stopped");
            Ok(())
        }
        Err(GatewayError::Terminal(end)) => {
            error!(?end, "session ended, re-pair or fix the account and restart");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
