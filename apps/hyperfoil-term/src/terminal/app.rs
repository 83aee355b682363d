use std::io::{self, IsTerminal, Stdout};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::effect::{self, Download, DownloadSource, Effect, EditorBuffer};
use crate::client::{ClientSession, InputEvent, ModeKind, SessionOptions};
use crate::terminal::cli::Cli;
use crate::terminal::config::ClientConfig;
use crate::terminal::editor::{self, ExternalEditor};
use crate::terminal::error::CliError;
use crate::terminal::keys::{self, InputPump, KeyAction, TerminalInput};
use crate::terminal::prompt::{Prompt, PromptKind, PromptOutcome};
use crate::terminal::render::{RawModeGuard, TerminalRenderer};
use crate::transport::{TransportEvent, WebSocketTransport};
use crate::upload::{ControllerClient, UploadError, UploadReceipt};

const FALLBACK_DOWNLOAD_NAME: &str = "download";

/// Results of background work, fed back into the session in arrival order.
#[derive(Debug)]
enum Completion {
    SourceLoaded {
        path: String,
        filename: String,
        result: io::Result<Vec<u8>>,
    },
    AttachmentLoaded {
        slot: String,
        path: String,
        result: io::Result<Vec<u8>>,
    },
    UploadDone(Result<UploadReceipt, UploadError>),
    DownloadSaved {
        filename: String,
        result: Result<PathBuf, String>,
    },
}

enum Next {
    Transport(Option<TransportEvent>),
    Terminal(TerminalInput),
    Completion(Completion),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::from_cli(&cli)?;
    if !(io::stdin().is_terminal() && io::stdout().is_terminal()) {
        return Err(CliError::Runtime(
            "stdin and stdout must be attached to a terminal".into(),
        ));
    }

    let controller = ControllerClient::new(config.controller()?)?;
    let (width, height) = crossterm::terminal::size()?;
    let mut client = ClientSession::new(SessionOptions {
        notifications: config.notifications,
        term_size: Some((width, height)),
        scrollback: Some(config.scrollback),
    });
    if let Some(token) = &config.token {
        // Not connected yet; the token goes out first on every connection.
        let _ = client.set_auth_token(token.clone());
    }

    let transport = WebSocketTransport::spawn(
        config.websocket(client.session_id().clone()),
        config.reconnect.clone(),
    )?;
    info!(
        target: "terminal::app",
        server = %config.server,
        session_id = %client.session_id(),
        "starting web cli session"
    );

    let raw = RawModeGuard::new(true);
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let input = InputPump::spawn(input_tx)?;
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

    let mut app = App {
        client,
        renderer: TerminalRenderer::new(io::stdout(), height),
        editor: ExternalEditor::new(config.editor.clone()),
        prompt: None,
        transport,
        controller,
        config,
        completions: completion_tx,
        input,
        raw,
    };

    let outcome = loop {
        let next = tokio::select! {
            event = app.transport.recv() => Next::Transport(event),
            Some(input) = input_rx.recv() => Next::Terminal(input),
            Some(done) = completion_rx.recv() => Next::Completion(done),
        };
        let step = match next {
            Next::Transport(Some(event)) => app.on_transport(event),
            Next::Transport(None) => Err(CliError::Runtime("transport task ended".into())),
            Next::Terminal(input) => app.on_terminal(input).await,
            Next::Completion(done) => app.on_completion(done).map(|_| Flow::Continue),
        };
        match step {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    app.transport.close().await;
    info!(target: "terminal::app", "session closed");
    outcome
}

struct App {
    client: ClientSession,
    renderer: TerminalRenderer<Stdout>,
    editor: ExternalEditor,
    prompt: Option<Prompt>,
    transport: WebSocketTransport,
    controller: ControllerClient,
    config: ClientConfig,
    completions: mpsc::UnboundedSender<Completion>,
    input: InputPump,
    raw: RawModeGuard,
}

impl App {
    fn on_transport(&mut self, event: TransportEvent) -> Result<Flow, CliError> {
        let effects = match event {
            TransportEvent::Connecting { attempt: 0 } => self.client.connection_opening(),
            TransportEvent::Connecting { .. } => Vec::new(),
            TransportEvent::Opened => self.client.connection_opened(),
            TransportEvent::Frame(frame) => self.client.handle_frame(frame),
            TransportEvent::Closed { .. } => self.client.connection_closed(),
            TransportEvent::Reconnecting { attempt, delay } => {
                debug!(
                    target: "terminal::app",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.client.reconnecting()
            }
            TransportEvent::GaveUp => {
                return Err(CliError::Disconnected(self.config.server.to_string()));
            }
        };
        self.dispatch(effects)?;
        Ok(Flow::Continue)
    }

    async fn on_terminal(&mut self, input: TerminalInput) -> Result<Flow, CliError> {
        let key = match input {
            TerminalInput::Key(key) => key,
            TerminalInput::Resize(width, height) => {
                self.renderer.resize(height);
                let effects = self.client.resize(width, height);
                self.dispatch(effects)?;
                return Ok(Flow::Continue);
            }
        };
        let Some(action) = keys::translate(&key) else {
            return Ok(Flow::Continue);
        };
        if action == KeyAction::Quit {
            return Ok(Flow::Quit);
        }

        let effects = match self.client.mode_kind() {
            ModeKind::Editing if self.editor.is_focused() => match action {
                KeyAction::OpenEditor => {
                    self.open_editor().await?;
                    Vec::new()
                }
                KeyAction::SaveEdits => {
                    let document = self.editor.get();
                    self.client.save_edits(document)
                }
                KeyAction::Input(InputEvent::Escape | InputEvent::Interrupt) => {
                    self.client.cancel_edits()
                }
                _ => Vec::new(),
            },
            ModeKind::Paging => match action {
                KeyAction::Input(InputEvent::Up) => {
                    self.renderer.scroll_pager(-1);
                    Vec::new()
                }
                KeyAction::Input(InputEvent::Down) => {
                    self.renderer.scroll_pager(1);
                    Vec::new()
                }
                KeyAction::PageUp => {
                    self.renderer.scroll_pager(-self.renderer.page_rows());
                    Vec::new()
                }
                KeyAction::PageDown => {
                    self.renderer.scroll_pager(self.renderer.page_rows());
                    Vec::new()
                }
                KeyAction::Input(event) => self.client.handle_input(event),
                _ => Vec::new(),
            },
            _ if self.prompt.is_some() => match action {
                KeyAction::Input(event) => self.on_prompt_key(event)?,
                _ => Vec::new(),
            },
            _ => match action {
                KeyAction::Input(event) => self.client.handle_input(event),
                _ => Vec::new(),
            },
        };
        self.dispatch(effects)?;
        Ok(Flow::Continue)
    }

    fn on_prompt_key(&mut self, event: InputEvent) -> Result<Vec<Effect>, CliError> {
        let Some(prompt) = self.prompt.as_mut() else {
            return Ok(Vec::new());
        };
        let outcome = prompt.edit(event);
        let kind = prompt.kind().clone();
        let view = prompt.view();
        match outcome {
            PromptOutcome::Edited => {
                self.renderer.set_prompt(Some(view));
                Ok(Vec::new())
            }
            PromptOutcome::Ignored => Ok(Vec::new()),
            PromptOutcome::Passthrough => Ok(self.client.handle_input(event)),
            PromptOutcome::Submitted(path) => {
                self.renderer.set_prompt(Some(view));
                match kind {
                    PromptKind::Source => {
                        self.load_source(path);
                        Ok(Vec::new())
                    }
                    PromptKind::Attach { slot } => {
                        self.load_attachment(slot, path);
                        Ok(Vec::new())
                    }
                    PromptKind::Confirm => match self.client.confirm_upload() {
                        Ok(effects) => Ok(effects),
                        Err(err) => Ok(self.client.report_error(&err.user_message())),
                    },
                }
            }
        }
    }

    fn on_completion(&mut self, done: Completion) -> Result<(), CliError> {
        let effects = match done {
            Completion::SourceLoaded {
                path,
                filename,
                result,
            } => match result {
                Ok(content) => self.client.begin_upload(filename, content),
                Err(err) => self.client.report_error(&format!("cannot read {path}: {err}")),
            },
            Completion::AttachmentLoaded { slot, path, result } => match result {
                Ok(content) => match self.client.attach_upload_file(&slot, path, content) {
                    Ok(effects) => effects,
                    Err(err) => self.client.report_error(&err.user_message()),
                },
                Err(err) => self.client.report_error(&format!("cannot read {path}: {err}")),
            },
            Completion::UploadDone(result) => self.client.upload_finished(result),
            Completion::DownloadSaved { filename, result } => match result {
                Ok(target) => self
                    .client
                    .report_notice(&format!("Downloaded {filename} to {}", target.display())),
                Err(message) => self.client.report_error(&message),
            },
        };
        self.dispatch(effects)
    }

    /// Applies display effects and starts the I/O the rest ask for.
    fn dispatch(&mut self, effects: Vec<Effect>) -> Result<(), CliError> {
        let pending = effect::apply(effects, &mut self.renderer, &mut self.editor);
        for effect in pending {
            match effect {
                Effect::Send(message) => {
                    debug!(target: "terminal::app", message = message.label(), "sending");
                    for frame in message.into_frames() {
                        self.transport.send(frame)?;
                    }
                }
                Effect::SubmitUpload(request) => {
                    let controller = self.controller.clone();
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        let result = controller.upload(request).await;
                        let _ = completions.send(Completion::UploadDone(result));
                    });
                }
                Effect::Download(download) => self.start_download(download),
                other => debug!(target: "terminal::app", effect = ?other, "unhandled effect"),
            }
        }
        self.sync_prompt();
        Ok(())
    }

    /// Keeps the upload prompt in step with the session's upload stage.
    fn sync_prompt(&mut self) {
        let wanted = PromptKind::for_session(&self.client);
        let current = self.prompt.as_ref().map(|prompt| prompt.kind().clone());
        if wanted == current {
            return;
        }
        self.prompt = wanted.map(Prompt::new);
        self.renderer
            .set_prompt(self.prompt.as_ref().map(Prompt::view));
    }

    fn load_source(&self, path: String) {
        let completions = self.completions.clone();
        let filename = file_name(&path);
        tokio::spawn(async move {
            let result = tokio::fs::read(&path).await;
            let _ = completions.send(Completion::SourceLoaded {
                path,
                filename,
                result,
            });
        });
    }

    fn load_attachment(&self, slot: String, path: String) {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = tokio::fs::read(&path).await;
            let _ = completions.send(Completion::AttachmentLoaded { slot, path, result });
        });
    }

    fn start_download(&self, download: Download) {
        let Download { filename, source } = download;
        let target = download_target(&self.config.download_dir, &filename);
        let controller = self.controller.clone();
        let token = self.client.auth_token().map(str::to_string);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = save_download(&controller, token.as_deref(), source, target).await;
            if let Err(message) = &result {
                warn!(target: "download", %filename, error = %message, "download failed");
            }
            let _ = completions.send(Completion::DownloadSaved { filename, result });
        });
    }

    /// Hands the terminal to the external editor and loads the result back.
    async fn open_editor(&mut self) -> Result<(), CliError> {
        self.input.pause().await;
        self.raw.suspend()?;
        let command = self.editor.command().to_string();
        let document = self.editor.get();
        let edited = tokio::task::spawn_blocking(move || editor::run_editor(&command, &document))
            .await
            .map_err(|err| CliError::Runtime(err.to_string()));
        self.raw.resume()?;
        self.input.resume();

        let effects = match edited? {
            Ok(text) => {
                self.editor.set(&text);
                self.editor.focus();
                Vec::new()
            }
            Err(err) => self.client.report_error(&format!("editor failed: {err}")),
        };
        self.renderer.redraw();
        self.dispatch(effects)
    }
}

async fn save_download(
    controller: &ControllerClient,
    token: Option<&str>,
    source: DownloadSource,
    target: PathBuf,
) -> Result<PathBuf, String> {
    let content = match source {
        DownloadSource::Inline(content) => content,
        DownloadSource::Remote { path } => controller
            .download(&path, token)
            .await
            .map_err(|err| format!("download of {path} failed: {}", err.user_message()))?,
    };
    tokio::fs::write(&target, content)
        .await
        .map_err(|err| format!("cannot write {}: {err}", target.display()))?;
    Ok(target)
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Only the final component of a server-provided name is used, so a
/// download never lands outside `dir`.
pub(crate) fn download_target(dir: &Path, filename: &str) -> PathBuf {
    let name = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_DOWNLOAD_NAME.to_string());
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_target_strips_directories() {
        let dir = Path::new("/tmp/downloads");
        assert_eq!(
            download_target(dir, "report.html"),
            PathBuf::from("/tmp/downloads/report.html")
        );
        assert_eq!(
            download_target(dir, "../../etc/passwd"),
            PathBuf::from("/tmp/downloads/passwd")
        );
        assert_eq!(
            download_target(dir, ".."),
            PathBuf::from("/tmp/downloads/download")
        );
        assert_eq!(download_target(dir, ""), PathBuf::from("/tmp/downloads/download"));
    }

    #[test]
    fn source_name_is_the_last_path_component() {
        assert_eq!(file_name("/home/me/bench.hf.yaml"), "bench.hf.yaml");
        assert_eq!(file_name("bench.hf.yaml"), "bench.hf.yaml");
    }

    #[tokio::test]
    async fn inline_downloads_are_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ControllerClient::new(
            crate::upload::ControllerConfig::new("http://localhost:8090").unwrap(),
        )
        .unwrap();
        let target = download_target(dir.path(), "export.json");
        let saved = save_download(
            &controller,
            None,
            DownloadSource::Inline(b"{}".to_vec()),
            target.clone(),
        )
        .await
        .unwrap();
        assert_eq!(saved, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"{}");
    }
}
