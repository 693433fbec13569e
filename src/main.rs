use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rancherctl::cli::{self, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut args = Cli::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn,rancherctl=info",
        1 => "warn,rancherctl=debug",
        _ => "warn,rancherctl=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified, then re-read env-backed flags
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
        args = Cli::parse();
    }

    match cli::run(args).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
