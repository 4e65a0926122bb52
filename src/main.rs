use anyhow::Context;
use poloniex_ws_sdk::{init_logging, ClientConfig, PushClient, TICKER_CHANNEL_NAME};

/// Stream push updates for the markets named on the command line, or the
/// ticker channel when none are given, until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ClientConfig::from_env().map_err(anyhow::Error::msg)?;
    let client = PushClient::connect(config)
        .await
        .context("failed to start push client")?;

    let mut channels: Vec<String> = std::env::args().skip(1).collect();
    if channels.is_empty() {
        channels.push(TICKER_CHANNEL_NAME.to_string());
    }

    let mut consumers = Vec::new();
    for channel in &channels {
        let queue = client
            .subscribe(channel)
            .await
            .with_context(|| format!("failed to subscribe to {}", channel))?;

        consumers.push(tokio::spawn(async move {
            while let Some(update) = queue.recv().await {
                tracing::info!(channel = queue.channel(), "{}", update);
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received");

    client.shutdown().await?;
    for consumer in consumers {
        consumer.await?;
    }
    Ok(())
}
