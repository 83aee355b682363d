use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::session::SessionId;
use crate::terminal::cli::Cli;
use crate::terminal::error::CliError;
use crate::transport::ReconnectPolicy;
use crate::transport::websocket::config::WebSocketConfig;
use crate::upload::{ControllerConfig, UploadError};

const DEFAULT_EDITOR: &str = "vi";

/// Validated runtime settings.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Controller base URL, always `http` or `https`.
    pub server: Url,
    pub token: Option<String>,
    pub download_dir: PathBuf,
    pub editor: String,
    pub notifications: bool,
    pub reconnect: ReconnectPolicy,
    pub scrollback: usize,
}

impl ClientConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let download_dir = match &cli.download_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        if cli.scrollback == 0 {
            return Err(CliError::InvalidArgument(
                "--scrollback must be at least 1".into(),
            ));
        }
        Ok(Self {
            server: parse_server(&cli.server)?,
            token: cli
                .token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            download_dir,
            editor: resolve_editor(
                cli.editor.as_deref(),
                std::env::var("VISUAL").ok(),
                std::env::var("EDITOR").ok(),
            ),
            notifications: cli.notifications.unwrap_or(false),
            reconnect: ReconnectPolicy::default()
                .with_max_delay(Duration::from_millis(cli.reconnect_max_delay_ms))
                .with_jitter(true),
            scrollback: cli.scrollback,
        })
    }

    pub fn controller(&self) -> Result<ControllerConfig, UploadError> {
        ControllerConfig::new(self.server.as_str())
    }

    pub fn websocket(&self, session_id: SessionId) -> WebSocketConfig {
        WebSocketConfig::new(self.server.clone(), session_id)
    }
}

/// Accepts `host:port` shorthand and websocket schemes; the result always
/// uses the matching HTTP scheme.
pub(crate) fn parse_server(raw: &str) -> Result<Url, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::InvalidArgument("--server cannot be empty".into()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&candidate)
        .map_err(|err| CliError::InvalidArgument(format!("invalid server url '{raw}': {err}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => {
            return Err(CliError::InvalidArgument(format!(
                "unsupported server scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CliError::InvalidArgument(format!("cannot use scheme {scheme}")))?;
    Ok(url)
}

pub(crate) fn resolve_editor(
    flag: Option<&str>,
    visual: Option<String>,
    editor: Option<String>,
) -> String {
    flag.map(str::to_string)
        .into_iter()
        .chain(visual)
        .chain(editor)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}
