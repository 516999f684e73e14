//! File server: `server -c <ip:port> -f <directory>`

use std::process::ExitCode;
use tcp_fileshare::config::ServerConfig;
use tcp_fileshare::server::Server;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tcp_fileshare::init_logging(&config.log_level);

    info!(
        listen = %config.listen,
        root = %config.root.display(),
        max_clients = config.max_clients,
        "Starting file server"
    );

    let server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    server.run().await;
    ExitCode::SUCCESS
}
