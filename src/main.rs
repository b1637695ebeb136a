use lifeplaneer_gateway::{config::GatewayConfig, init_gateway, init_tracing};
use std::process;

#[tokio::main]
async fn main() {
    // Configuration comes from the environment; fail fast before
    // anything else is built.
    let config = match GatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    if let Err(e) = init_gateway(config).await {
        tracing::error!(error = %e, "Gateway error");
        process::exit(1);
    }
}
