use clap::Parser;
use hyperfoil_term_core::telemetry::logging;
use hyperfoil_term_core::terminal::app;
use hyperfoil_term_core::terminal::cli::Cli;
use hyperfoil_term_core::terminal::error::CliError;
use tracing::debug;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    logging::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    if log_config.effective_level() != log_config.level {
        eprintln!(
            "⚠️  --log-level {} needs --log-file while the terminal is in raw mode; logging warnings only",
            log_config.level.as_str()
        );
    }
    debug!(
        target: "terminal::app",
        log_level = ?log_config.effective_level(),
        log_file = ?log_config.file,
        "logging configured"
    );
    app::run(cli).await
}
