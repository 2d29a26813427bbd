use anyhow::{Result, anyhow};
use pod_label_webhook::{WebhookServer, cli, config::Config, tracing::setup_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    // Starting from rustls 0.22, each application must set its default crypto provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("cannot install the rustls crypto provider"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        service = pod_label_webhook::config::SERVICE_NAME,
        "starting"
    );

    let server = WebhookServer::new_from_config(config).await?;
    server.run().await
}
