use clap::{Args, Parser, builder::BoolishValueParser};
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "hyperfoil-term",
    about = "Drive a Hyperfoil controller's web CLI from the terminal",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "HYPERFOIL_SERVER",
        default_value = "http://localhost:8090",
        value_name = "URL",
        help = "Base URL of the Hyperfoil controller"
    )]
    pub server: String,

    #[arg(
        long,
        env = "HYPERFOIL_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        help = "Bearer token sent to the controller"
    )]
    pub token: Option<String>,

    #[arg(
        long = "download-dir",
        env = "HYPERFOIL_DOWNLOAD_DIR",
        value_name = "DIR",
        help = "Directory for downloaded reports and exports (default: current directory)"
    )]
    pub download_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "COMMAND",
        help = "Editor for benchmark documents (default: $VISUAL, $EDITOR, then vi)"
    )]
    pub editor: Option<String>,

    #[arg(
        long,
        env = "HYPERFOIL_NOTIFICATIONS",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL",
        help = "Ask the controller for run notifications"
    )]
    pub notifications: Option<bool>,

    #[arg(
        long = "reconnect-max-delay-ms",
        env = "HYPERFOIL_RECONNECT_MAX_DELAY_MS",
        default_value_t = 5_000,
        value_name = "MS",
        help = "Upper bound of the delay between reconnect attempts"
    )]
    pub reconnect_max_delay_ms: u64,

    #[arg(
        long,
        default_value_t = 10_000,
        value_name = "LINES",
        help = "Transcript lines kept in memory"
    )]
    pub scrollback: usize,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "HYPERFOIL_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "HYPERFOIL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_controller() {
        let cli = Cli::try_parse_from(["hyperfoil-term"]).unwrap();
        assert_eq!(cli.server, "http://localhost:8090");
        assert_eq!(cli.reconnect_max_delay_ms, 5_000);
        assert_eq!(cli.logging.level, LogLevel::Warn);
    }

    #[test]
    fn bare_notifications_flag_opts_in() {
        let cli = Cli::try_parse_from(["hyperfoil-term", "--notifications"]).unwrap();
        assert_eq!(cli.notifications, Some(true));
        let cli = Cli::try_parse_from(["hyperfoil-term", "--notifications", "false"]).unwrap();
        assert_eq!(cli.notifications, Some(false));
    }

    #[test]
    fn logging_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "hyperfoil-term",
            "--log-level",
            "debug",
            "--log-file",
            "/tmp/hf.log",
        ])
        .unwrap();
        let config = cli.logging.to_config();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/hf.log")));
    }
}
