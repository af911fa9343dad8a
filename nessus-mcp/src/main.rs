use std::env;
use std::process;

use anyhow::Result;
use log::{error, info};
use nessus_mcp::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!("starting nessus-mcp server version {}", nessus_mcp::MCP_VERSION);

    let config_path = env::args().nth(1);

    match start_server(config_path.as_deref()).await {
        Ok(_) => {
            info!("nessus-mcp server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("error starting nessus-mcp server: {e}");
            process::exit(1);
        }
    }
}
