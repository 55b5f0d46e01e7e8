use clap::Parser;
use log::error;

use server::config::ServerConfig;
use server::run;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ServerConfig::parse();
    if let Err(e) = run(config).await {
        error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
