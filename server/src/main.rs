//! Towber game server binary.
//!
//! Run with: cargo run --bin towber-server -- --addr 127.0.0.1:8080

use towber_server::store::Stores;
use towber_server::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: towber-server [--addr <ADDR>]

Environment:
  TOWBER_ADDR                 listen address (default 0.0.0.0:8080)
  TOWBER_SAVE_INTERVAL_SECS   pet save interval
  TOWBER_ROUND_TIMEOUT_SECS   battle round timeout
  RUST_LOG                    log filter (default info)";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = ServerConfig::from_env()?;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => {
                config.listen_addr = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--addr needs a value\n\n{USAGE}"))?;
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {other}\n\n{USAGE}"),
        }
    }

    tracing::info!("Starting towber server on {}", config.listen_addr);
    let server = Server::builder()
        .config(config)
        .stores(Stores::in_memory())
        .build()
        .map_err(anyhow::Error::msg)?;
    server.run().await?;
    Ok(())
}
