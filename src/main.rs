use rpc_admission::{config::AdmissionConfig, init_tracing, server::serve};
use std::env;
use std::path::Path;
use std::process;
use tracing::warn;

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use default
    let explicit = env::args().nth(1);
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| "config/admission.yaml".to_string());

    // A missing default file means built-in defaults; an explicit path must exist
    let config = if explicit.is_none() && !Path::new(&config_path).exists() {
        warn!("{} not found, using default configuration", config_path);
        AdmissionConfig::default()
    } else {
        match AdmissionConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", config_path, e);
                eprintln!("Usage: rpc-admission [config_file]");
                process::exit(1);
            }
        }
    };

    if let Err(e) = serve(config).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
