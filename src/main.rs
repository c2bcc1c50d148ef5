use log::info;

use gt06::config::ServerConfig;
use gt06::{server, telemetry};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    info!("GT06 terminal server starting on {}", config.listen_addr);

    let (sink, positions) = telemetry::channel();
    tokio::spawn(telemetry::log_positions(positions));

    if let Err(e) = server::run(config, sink).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
