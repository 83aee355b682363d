//! Protocol core of the web CLI client.
//!
//! [`ClientSession`] owns every piece of mutable protocol state. Each handler
//! runs to completion and returns the [`Effect`]s its caller must apply, in
//! order. Nothing in here performs I/O.

pub mod effect;
pub mod encoder;
pub mod mode;
pub mod output;
pub mod router;
pub mod tokenizer;

pub use effect::{Download, DownloadSource, Effect, EditorBuffer, InputView, Renderer, Surface};
pub use encoder::{InputEvent, InputLine};
pub use mode::{Mode, ModeKind};
pub use output::{Color, RenderedLine, Style, Transcript};

use crate::protocol::sentinel::DEFAULT_NOTIFICATION_TITLE;
use crate::protocol::{Frame, Outbound};
use crate::session::{Session, SessionId, TransportState};
use crate::upload::{EDITED_SOURCE_NAME, PendingUpload, UploadError, UploadReceipt};
use mode::{CompletedDownload, DownloadUnit, FileList, FileListAccumulator, PagerBuffer};
use router::Start;
use tokenizer::Control;
use tracing::{debug, info, trace, warn};

pub const RESTART_WARNING: &str =
    "The CLI server was restarted; application state has been reset.";
const UPLOADING_NOTICE: &str = "Uploading... ";
const UPLOAD_DONE_NOTICE: &str = " done.\n";

fn error_style() -> Style {
    Style {
        fg: Some(Color::Indexed(1)),
        ..Style::default()
    }
}

/// Settings that outlive a single connection.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Ask the server for run notifications on every connection.
    pub notifications: bool,
    pub term_size: Option<(u16, u16)>,
    pub scrollback: Option<usize>,
}

/// What the upload prompt currently asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStage {
    None,
    /// Waiting for the user to pick the benchmark source.
    ChooseSource,
    /// Waiting for the requested files and a confirmation.
    AttachFiles,
    Submitting,
}

pub struct ClientSession {
    session: Session,
    mode: Mode,
    transcript: Transcript,
    input: InputLine,
    upload: Option<PendingUpload>,
    upload_stage: UploadStage,
    session_started: bool,
    options: SessionOptions,
}

impl ClientSession {
    pub fn new(options: SessionOptions) -> Self {
        Self::with_session(Session::new(), options)
    }

    pub fn with_session(session: Session, options: SessionOptions) -> Self {
        let transcript = match options.scrollback {
            Some(lines) => Transcript::with_scrollback(lines),
            None => Transcript::new(),
        };
        Self {
            session,
            mode: Mode::Idle,
            transcript,
            input: InputLine::new(),
            upload: None,
            upload_stage: UploadStage::None,
            session_started: false,
            options,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    pub fn transport_state(&self) -> TransportState {
        self.session.state()
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn pending_upload(&self) -> Option<&PendingUpload> {
        self.upload.as_ref()
    }

    pub fn upload_stage(&self) -> UploadStage {
        self.upload_stage
    }

    pub fn session_started(&self) -> bool {
        self.session_started
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.session.auth_token()
    }

    /// Stores the token; on an open connection that has not authenticated yet
    /// the auth frame goes out right away.
    pub fn set_auth_token(&mut self, token: impl Into<String>) -> Vec<Effect> {
        self.session.set_auth_token(token);
        let mut effects = Vec::new();
        self.flush_auth(&mut effects);
        effects
    }

    pub fn connection_opening(&mut self) -> Vec<Effect> {
        vec![Effect::Status(TransportState::Connecting)]
    }

    /// A new connection is up: authenticate first, then restate the terminal
    /// size and the notification opt-in.
    pub fn connection_opened(&mut self) -> Vec<Effect> {
        self.session.opened();
        info!(
            target: "client::session",
            session_id = %self.session.id(),
            connection = self.session.connections(),
            "connection open"
        );
        let mut effects = vec![Effect::Status(TransportState::Open)];
        self.flush_auth(&mut effects);
        if let Some((width, height)) = self.options.term_size {
            self.send(&mut effects, Outbound::SetTermSize { width, height });
        }
        if self.options.notifications {
            self.send(&mut effects, Outbound::SendNotifications);
        }
        self.settle_input(&mut effects);
        effects
    }

    pub fn connection_closed(&mut self) -> Vec<Effect> {
        self.session.closed();
        info!(
            target: "client::session",
            session_id = %self.session.id(),
            "connection closed"
        );
        let mut effects = vec![Effect::Status(TransportState::Closed)];
        self.settle_input(&mut effects);
        effects
    }

    pub fn reconnecting(&mut self) -> Vec<Effect> {
        self.session.reconnecting();
        let mut effects = vec![Effect::Status(TransportState::Reconnecting)];
        self.settle_input(&mut effects);
        effects
    }

    pub fn handle_frame(&mut self, frame: Frame) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flush_auth(&mut effects);
        match frame {
            Frame::Binary(bytes) => self.route_binary(bytes),
            Frame::Text(text) => {
                self.route_text(&text, &mut effects);
                self.settle_input(&mut effects);
            }
        }
        effects
    }

    pub fn resize(&mut self, width: u16, height: u16) -> Vec<Effect> {
        self.options.term_size = Some((width, height));
        let mut effects = Vec::new();
        self.send(&mut effects, Outbound::SetTermSize { width, height });
        effects
    }

    /// Opting out only stops future requests; the server keeps its setting for
    /// the current connection.
    pub fn set_notifications(&mut self, enabled: bool) -> Vec<Effect> {
        let changed = self.options.notifications != enabled;
        self.options.notifications = enabled;
        let mut effects = Vec::new();
        if enabled && changed {
            self.send(&mut effects, Outbound::SendNotifications);
        }
        effects
    }

    /// Leaves the pager on user request.
    pub fn stop_paging(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !matches!(self.mode, Mode::Paging(_)) {
            return effects;
        }
        self.mode = Mode::Idle;
        effects.push(Effect::HideSurface(Surface::Pager));
        self.send(&mut effects, Outbound::Interrupt);
        self.settle_input(&mut effects);
        effects
    }

    /// Sends the edited document and keeps it as the source of a later upload.
    pub fn save_edits(&mut self, content: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !matches!(self.mode, Mode::Editing { .. }) {
            return effects;
        }
        self.mode = Mode::Idle;
        self.upload = Some(PendingUpload::with_source(
            EDITED_SOURCE_NAME,
            content.clone().into_bytes(),
        ));
        effects.push(Effect::HideSurface(Surface::Editor));
        effects.push(Effect::EditorSet(String::new()));
        self.send(&mut effects, Outbound::Edits(content));
        self.send(&mut effects, Outbound::Interrupt);
        self.settle_input(&mut effects);
        effects
    }

    pub fn cancel_edits(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !matches!(self.mode, Mode::Editing { .. }) {
            return effects;
        }
        self.mode = Mode::Idle;
        effects.push(Effect::HideSurface(Surface::Editor));
        effects.push(Effect::EditorSet(String::new()));
        self.send(&mut effects, Outbound::Interrupt);
        self.settle_input(&mut effects);
        effects
    }

    /// The user picked a benchmark source after an upload request.
    pub fn begin_upload(&mut self, filename: impl Into<String>, content: Vec<u8>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.upload_stage != UploadStage::ChooseSource {
            return effects;
        }
        let text = String::from_utf8_lossy(&content).into_owned();
        self.upload = Some(PendingUpload::with_source(filename, content));
        self.upload_stage = UploadStage::None;
        effects.push(Effect::HideSurface(Surface::UploadTrigger));
        self.send(&mut effects, Outbound::Edits(text));
        self.settle_input(&mut effects);
        effects
    }

    pub fn attach_upload_file(
        &mut self,
        slot: &str,
        local_name: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<Vec<Effect>, UploadError> {
        let upload = self.upload.as_mut().ok_or(UploadError::NotPending)?;
        upload.attach(slot, local_name, content)?;
        Ok(vec![Effect::UploadForm(upload.slots())])
    }

    /// Submits the upload once every requested file is attached.
    pub fn confirm_upload(&mut self) -> Result<Vec<Effect>, UploadError> {
        if self.upload_stage != UploadStage::AttachFiles {
            return Err(UploadError::NotPending);
        }
        let mut effects = Vec::new();
        self.submit_upload(&mut effects)?;
        Ok(effects)
    }

    /// Abandons the upload prompt and tells the server to stop waiting.
    pub fn cancel_upload(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if matches!(self.upload_stage, UploadStage::None | UploadStage::Submitting) {
            return effects;
        }
        self.discard_upload(&mut effects);
        self.send(&mut effects, Outbound::Interrupt);
        self.settle_input(&mut effects);
        effects
    }

    /// Completion of the HTTP upload. The pending upload is discarded either
    /// way and the server is released with an interrupt.
    pub fn upload_finished(&mut self, result: Result<UploadReceipt, UploadError>) -> Vec<Effect> {
        let mut effects = Vec::new();
        match result {
            Ok(receipt) => {
                effects.extend(self.transcript.write(UPLOAD_DONE_NOTICE));
                self.send(&mut effects, Outbound::SetBenchmark(receipt.benchmark));
            }
            Err(err) => {
                warn!(target: "upload", error = %err, "upload failed");
                effects.extend(self.transcript.write("\n"));
                effects.extend(
                    self.transcript
                        .write_line(error_style(), &err.user_message()),
                );
            }
        }
        if self.upload_stage == UploadStage::Submitting {
            effects.push(Effect::HideSurface(Surface::UploadForm));
        }
        self.upload = None;
        self.upload_stage = UploadStage::None;
        self.send(&mut effects, Outbound::Interrupt);
        self.settle_input(&mut effects);
        effects
    }

    /// Renders a local message, e.g. a failed download, without touching the
    /// protocol state.
    pub fn report_error(&mut self, message: &str) -> Vec<Effect> {
        self.report(error_style(), message)
    }

    pub fn report_notice(&mut self, message: &str) -> Vec<Effect> {
        self.report(Style::default(), message)
    }

    fn report(&mut self, style: Style, message: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.transcript.last_line().is_some_and(|line| !line.is_empty()) {
            effects.extend(self.transcript.write("\n"));
        }
        effects.extend(self.transcript.write_line(style, message));
        self.settle_input(&mut effects);
        effects
    }

    fn flush_auth(&mut self, effects: &mut Vec<Effect>) {
        if let Some(auth) = self.session.take_auth() {
            debug!(target: "client::session", "sending auth token");
            effects.push(Effect::Send(auth));
        }
    }

    /// Outbound traffic only flows on an open connection, always behind the
    /// auth frame.
    fn send(&mut self, effects: &mut Vec<Effect>, message: Outbound) {
        if !self.session.is_open() {
            debug!(
                target: "client::session",
                message = message.label(),
                state = self.session.state().as_str(),
                "dropping outbound message while disconnected"
            );
            return;
        }
        self.flush_auth(effects);
        effects.push(Effect::Send(message));
    }

    fn route_binary(&mut self, bytes: Vec<u8>) {
        match &mut self.mode {
            Mode::Downloading(unit) => {
                unit.push_binary(bytes);
                trace!(
                    target: "client::router",
                    bytes = unit.content_len(),
                    "download payload"
                );
            }
            other => warn!(
                target: "client::router",
                mode = %other.kind(),
                bytes = bytes.len(),
                "ignoring binary frame outside of a download"
            ),
        }
    }

    fn route_text(&mut self, chunk: &str, effects: &mut Vec<Effect>) {
        let (controls, residual) = tokenizer::strip_controls(chunk);
        for control in controls {
            let effect = match control {
                Control::ClearLine => self.transcript.clear_last(),
                Control::RemoveLine => self.transcript.remove_last(),
            };
            effects.extend(effect);
        }

        match router::recognize(residual) {
            Some(start) if self.mode.is_idle() || !start.enters_mode() => {
                debug!(
                    target: "client::router",
                    sentinel = start.label(),
                    mode = %self.mode.kind(),
                    "start sentinel"
                );
                self.enter(start, effects);
            }
            _ => self.continue_mode(residual, effects),
        }
    }

    fn continue_mode(&mut self, chunk: &str, effects: &mut Vec<Effect>) {
        match &mut self.mode {
            Mode::Idle => effects.extend(self.transcript.write(chunk)),
            Mode::Paging(pager) => {
                pager.push(chunk);
                effects.push(Effect::PagerAppend(chunk.to_string()));
            }
            Mode::Editing { .. } => effects.push(Effect::EditorAppend(chunk.to_string())),
            Mode::ReceivingFileList(acc) => {
                acc.push(chunk);
                self.check_file_list(effects);
            }
            Mode::Downloading(unit) => {
                if let Some(done) = unit.push_text(chunk) {
                    self.finish_download(done, effects);
                }
            }
        }
    }

    fn enter(&mut self, start: Start<'_>, effects: &mut Vec<Effect>) {
        match start {
            Start::UploadRequest => {
                self.upload_stage = UploadStage::ChooseSource;
                effects.push(Effect::ShowSurface(Surface::UploadTrigger));
            }
            Start::Pager { rest } => {
                self.mode = Mode::Paging(PagerBuffer::new(rest));
                effects.push(Effect::ShowSurface(Surface::Pager));
                effects.push(Effect::PagerSet(rest.to_string()));
            }
            Start::Edit { document, rest } => {
                self.mode = Mode::Editing {
                    document: document.map(str::to_string),
                };
                effects.push(Effect::ShowSurface(Surface::Editor));
                effects.push(Effect::EditorSet(rest.to_string()));
                effects.push(Effect::EditorFocus);
            }
            Start::FileList { rest } => {
                self.mode = Mode::ReceivingFileList(FileListAccumulator::new(rest));
                self.check_file_list(effects);
            }
            Start::IndirectDownload { path, filename } => {
                if path.is_empty() {
                    warn!(target: "client::router", "download link without a path");
                    return;
                }
                effects.push(Effect::Download(Download {
                    filename: filename.to_string(),
                    source: DownloadSource::Remote {
                        path: path.to_string(),
                    },
                }));
            }
            Start::DirectDownload { rest } => {
                self.mode = Mode::Downloading(DownloadUnit::new());
                self.continue_mode(rest, effects);
            }
            Start::SessionStart { rest } => {
                if self.session_started {
                    warn!(
                        target: "client::session",
                        session_id = %self.session.id(),
                        "server restarted"
                    );
                    self.input.clear();
                    effects.push(Effect::Input(self.input.view()));
                    self.discard_upload(effects);
                    if self.transcript.last_line().is_some_and(|line| !line.is_empty()) {
                        effects.extend(self.transcript.write("\n"));
                    }
                    effects.extend(self.transcript.write_line(error_style(), RESTART_WARNING));
                } else {
                    self.session_started = true;
                }
                if !rest.is_empty() {
                    self.route_text(rest, effects);
                }
            }
            Start::Notification { title, body } => {
                let title = if title.is_empty() {
                    DEFAULT_NOTIFICATION_TITLE
                } else {
                    title
                };
                effects.push(Effect::Notify {
                    title: title.to_string(),
                    body: body.to_string(),
                });
                // Focus is restored by settle_input.
                self.input.focused = false;
            }
        }
    }

    /// Forgets the upload prompt and its pending state without telling the
    /// server.
    fn discard_upload(&mut self, effects: &mut Vec<Effect>) {
        match self.upload_stage {
            UploadStage::None => {}
            UploadStage::ChooseSource => effects.push(Effect::HideSurface(Surface::UploadTrigger)),
            UploadStage::AttachFiles | UploadStage::Submitting => {
                effects.push(Effect::HideSurface(Surface::UploadForm))
            }
        }
        self.upload = None;
        self.upload_stage = UploadStage::None;
        self.settle_input(effects);
    }

    fn check_file_list(&mut self, effects: &mut Vec<Effect>) {
        let finished = match &mut self.mode {
            Mode::ReceivingFileList(acc) => acc.finish(),
            _ => None,
        };
        let Some((list, trailing)) = finished else {
            return;
        };
        self.mode = Mode::Idle;
        self.file_list_received(list, effects);
        if !trailing.is_empty() {
            self.route_text(&trailing, effects);
        }
    }

    fn file_list_received(&mut self, list: FileList, effects: &mut Vec<Effect>) {
        debug!(
            target: "client::router",
            benchmark = %list.benchmark,
            files = list.files.len(),
            "file list received"
        );
        let FileList {
            benchmark,
            version,
            files,
        } = list;
        let upload = self.upload.get_or_insert_with(|| {
            warn!(
                target: "upload",
                "file list arrived without a benchmark source"
            );
            PendingUpload::new()
        });
        let empty = files.is_empty();
        upload.require_files(benchmark, version, files);
        if empty {
            if let Err(err) = self.submit_upload(effects) {
                effects.extend(self.upload_finished(Err(err)));
            }
            return;
        }
        self.upload_stage = UploadStage::AttachFiles;
        effects.push(Effect::ShowSurface(Surface::UploadForm));
        effects.push(Effect::UploadForm(upload.slots()));
    }

    fn submit_upload(&mut self, effects: &mut Vec<Effect>) -> Result<(), UploadError> {
        let token = self.session.auth_token().map(str::to_string);
        let upload = self.upload.as_mut().ok_or(UploadError::NotPending)?;
        let request = upload.build_request(token)?;
        self.upload_stage = UploadStage::Submitting;
        effects.extend(self.transcript.write(UPLOADING_NOTICE));
        effects.push(Effect::SubmitUpload(request));
        Ok(())
    }

    fn finish_download(&mut self, done: CompletedDownload, effects: &mut Vec<Effect>) {
        let CompletedDownload {
            filename,
            content,
            trailing,
        } = done;
        debug!(
            target: "client::router",
            %filename,
            bytes = content.len(),
            "download complete"
        );
        self.mode = Mode::Idle;
        effects.push(Effect::Download(Download {
            filename,
            source: DownloadSource::Inline(content),
        }));
        if !trailing.is_empty() {
            self.route_text(&trailing, effects);
        }
    }

    /// The command input belongs to the last line while the session is idle
    /// and connected, and no upload prompt is up.
    fn settle_input(&mut self, effects: &mut Vec<Effect>) {
        let attach = self.mode.is_idle()
            && self.session.is_open()
            && self.upload_stage == UploadStage::None;
        if self.input.attached == attach && self.input.focused == attach {
            return;
        }
        self.input.attached = attach;
        self.input.focused = attach;
        effects.push(Effect::Input(self.input.view()));
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}
