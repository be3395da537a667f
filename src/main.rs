use tokio_util::sync::CancellationToken;

use mppsolar_bridge::prelude::*;

#[tokio::main]
async fn main() {
    let options = Options::new();
    let shutdown = CancellationToken::new();

    // Handle Ctrl+C
    let token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        token.cancel();
    });

    // a supervisor is expected to restart us on failure
    if let Err(e) = mppsolar_bridge::app(options, shutdown).await {
        error!("{:#}", e);
        std::process::exit(255);
    }
}
