use clap::Parser;
use log::{debug, error};

use client::run;

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
struct Args {
    /// Address of the parking server
    #[arg(short = 'a', long, default_value_t = String::from("127.0.0.1"))]
    address: String,

    /// Port number for the parking server
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();

    debug!("Parking server is at address {}", args.address);
    debug!("Parking server port is {}", args.port);

    let connect = format!("{}:{}", args.address, args.port);

    if let Err(e) = run(connect).await {
        error!("Client stopped: {}", e);
        std::process::exit(1);
    }
}
