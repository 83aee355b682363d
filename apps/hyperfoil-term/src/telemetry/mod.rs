fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    pub const FILTER_ENV: &str = "HYPERFOIL_LOG_FILTER";
    const TRACE_DEPS_ENV: &str = "HYPERFOIL_TRACE_DEPS";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }

        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    impl LogConfig {
        pub fn writes_to_terminal(&self) -> bool {
            self.file.is_none()
        }

        /// Level actually installed. Stderr shares the screen with the
        /// raw-mode session, so without a log file nothing chattier than
        /// warnings is written.
        pub fn effective_level(&self) -> LogLevel {
            if self.writes_to_terminal() {
                self.level.min(LogLevel::Warn)
            } else {
                self.level
            }
        }
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("logging already initialized")]
        AlreadyInitialized,
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static INIT: OnceLock<()> = OnceLock::new();
    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if INIT.get().is_some() {
            return Ok(());
        }

        inner_init(config)?;
        INIT.set(()).ok();
        Ok(())
    }

    fn inner_init(config: &LogConfig) -> Result<(), InitError> {
        let (env_filter, throttled_deps) = build_env_filter(config.effective_level().to_filter());

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_level(true)
            .with_target(config.effective_level() >= LogLevel::Debug)
            .with_thread_names(config.effective_level() >= LogLevel::Trace)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(guard);
        if throttled_deps {
            tracing::info!(
                target: "hyperfoil_term_core::telemetry",
                "suppressing dependency trace output; set {TRACE_DEPS_ENV}=1 or {FILTER_ENV} to override"
            );
        }
        Ok(())
    }

    fn build_env_filter(level: LevelFilter) -> (EnvFilter, bool) {
        if let Ok(filter) = std::env::var(FILTER_ENV) {
            return (EnvFilter::new(filter), false);
        }
        let (filter, throttled) = default_filter_for(level);
        (EnvFilter::new(filter), throttled)
    }

    /// Targets used by this crate's events.
    const CRATE_TARGETS: &[&str] = &[
        "hyperfoil_term_core",
        "hyperfoil_term",
        "client",
        "transport",
        "upload",
        "download",
        "terminal",
    ];

    /// The websocket, HTTP and TLS stacks under the session and upload paths.
    const TRACE_DEP_TARGETS: &[&str] = &[
        "tokio_tungstenite",
        "tungstenite",
        "native_tls",
        "reqwest",
        "hyper",
        "h2",
        "rustls",
        "want",
        "mio",
    ];

    pub(crate) fn default_filter_for(level: LevelFilter) -> (String, bool) {
        let verbose = match level {
            LevelFilter::TRACE => "trace",
            LevelFilter::DEBUG => "debug",
            LevelFilter::INFO => return ("info".to_owned(), false),
            LevelFilter::WARN => return ("warn".to_owned(), false),
            LevelFilter::ERROR => return ("error".to_owned(), false),
            LevelFilter::OFF => return ("off".to_owned(), false),
        };
        let mut base = String::from("info");
        for target in CRATE_TARGETS {
            base.push_str(&format!(",{target}={verbose}"));
        }
        if level == LevelFilter::TRACE && !allow_dependency_traces() {
            (throttle_dependency_traces(&base), true)
        } else {
            (base, false)
        }
    }

    fn allow_dependency_traces() -> bool {
        super::env_truthy(TRACE_DEPS_ENV).unwrap_or(false)
    }

    fn throttle_dependency_traces(base: &str) -> String {
        let mut filter = base.to_owned();
        for target in TRACE_DEP_TARGETS {
            filter.push(',');
            filter.push_str(target);
            filter.push_str("=info");
        }
        filter
    }

}
