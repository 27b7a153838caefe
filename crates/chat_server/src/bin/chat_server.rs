use clap::Parser;
use flexi_logger::Logger;
use log::info;
use std::path::PathBuf;

use chat_server::config::Config;
use chat_server::db::Db;
use chat_server::errors::ServerError;
use chat_server::listener::Server;

#[derive(Parser, Debug)]
#[command(name = "chat_server", about = "Multi-channel chat server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the bind address from the config
    #[arg(long)]
    bind_address: Option<String>,

    /// Override the listening port from the config
    #[arg(long)]
    port: Option<u16>,

    /// Override the database path from the config
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    Logger::try_with_env_or_str("info")
        .and_then(|logger| logger.log_to_stderr().start())
        .ok();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(bind_address) = args.bind_address {
        config.network.bind_address = bind_address;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(database) = args.database {
        config.database.path = database;
    }

    info!("starting {} on {}", config.server.name, config.bind_addr());
    let db = Db::connect(&config.database.path).await?;
    let server = Server::bind(config, db).await?;
    server.run().await
}
