use tracing_subscriber::EnvFilter;

use chartfill::api;
use chartfill::config::{self, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Chartfill starting v{}", config::APP_VERSION);

    let server_config = ServerConfig::from_env();
    if let Err(e) = api::serve(server_config).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
