//! Download client: `client -c <ip:port> -f <filename> -o <output_folder>`

use std::process::ExitCode;
use tcp_fileshare::client::{self, Outcome};
use tcp_fileshare::config::ClientConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tcp_fileshare::init_logging(&config.log_level);

    match client::fetch(&config).await {
        Ok(Outcome::Received { .. }) => {
            println!("File received: {}", config.filename);
            ExitCode::SUCCESS
        }
        // Not-found is an informational outcome, not a failure
        Ok(Outcome::NotFound) => {
            println!("File not found on the server: {}", config.filename);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
