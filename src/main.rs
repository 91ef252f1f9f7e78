use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbindex::{Config, Error, PbiFile};

fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let prefix = e.downcast_ref::<Error>().map_or("error", Error::error_type);
            eprintln!("pbindex ERROR: [{}] {:#}", prefix, e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Indexing {}", config.input.display());
    PbiFile::create_from(&config.input)?;
    Ok(())
}
