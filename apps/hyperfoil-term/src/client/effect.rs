use crate::client::output::RenderedLine;
use crate::protocol::Outbound;
use crate::session::TransportState;
use crate::upload::{UploadRequest, UploadSlotView};

/// Overlays that temporarily replace the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    Pager,
    Editor,
    /// Prompt offering to pick a benchmark file to upload.
    UploadTrigger,
    /// Prompt collecting the files a benchmark refers to.
    UploadForm,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadSource {
    /// Bytes streamed over the websocket.
    Inline(Vec<u8>),
    /// Path on the controller, fetched over HTTP.
    Remote { path: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub source: DownloadSource,
}

/// Presentation state of the command input field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputView {
    pub text: String,
    /// Cursor position in characters.
    pub cursor: usize,
    pub attached: bool,
    pub focused: bool,
}

/// Everything the session core asks its environment to do. Handlers return
/// effects in the order they must be applied.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Send(Outbound),
    AppendLine(RenderedLine),
    UpdateLastLine(RenderedLine),
    ClearLastLine,
    RemoveLastLine,
    ShowSurface(Surface),
    HideSurface(Surface),
    PagerSet(String),
    PagerAppend(String),
    EditorSet(String),
    EditorAppend(String),
    EditorFocus,
    Input(InputView),
    UploadForm(Vec<UploadSlotView>),
    SubmitUpload(UploadRequest),
    Download(Download),
    Notify { title: String, body: String },
    Status(TransportState),
}

impl Effect {
    pub fn as_send(&self) -> Option<&Outbound> {
        match self {
            Effect::Send(message) => Some(message),
            _ => None,
        }
    }
}

/// Display side of the client: the transcript, overlays, and the status line.
pub trait Renderer {
    fn append_line(&mut self, line: &RenderedLine);
    fn update_last_line(&mut self, line: &RenderedLine);
    fn clear_last_line(&mut self);
    fn remove_last_line(&mut self);
    fn show_surface(&mut self, surface: Surface);
    fn hide_surface(&mut self, surface: Surface);
    fn set_pager(&mut self, text: &str);
    fn append_pager(&mut self, text: &str);
    fn set_input(&mut self, view: &InputView);
    fn show_upload_form(&mut self, slots: &[UploadSlotView]);
    fn request_notification(&mut self, title: &str, body: &str);
    fn set_status(&mut self, state: TransportState);
}

/// Text buffer backing the document editor.
pub trait EditorBuffer {
    fn get(&self) -> String;
    fn set(&mut self, text: &str);
    fn append(&mut self, text: &str);
    fn focus(&mut self);
}

/// Applies display effects and hands the rest back in order.
pub fn apply<R, E>(effects: Vec<Effect>, renderer: &mut R, editor: &mut E) -> Vec<Effect>
where
    R: Renderer + ?Sized,
    E: EditorBuffer + ?Sized,
{
    let mut pending = Vec::new();
    for effect in effects {
        match effect {
            Effect::AppendLine(line) => renderer.append_line(&line),
            Effect::UpdateLastLine(line) => renderer.update_last_line(&line),
            Effect::ClearLastLine => renderer.clear_last_line(),
            Effect::RemoveLastLine => renderer.remove_last_line(),
            Effect::ShowSurface(surface) => renderer.show_surface(surface),
            Effect::HideSurface(surface) => renderer.hide_surface(surface),
            Effect::PagerSet(text) => renderer.set_pager(&text),
            Effect::PagerAppend(text) => renderer.append_pager(&text),
            Effect::EditorSet(text) => editor.set(&text),
            Effect::EditorAppend(text) => editor.append(&text),
            Effect::EditorFocus => editor.focus(),
            Effect::Input(view) => renderer.set_input(&view),
            Effect::UploadForm(slots) => renderer.show_upload_form(&slots),
            Effect::Notify { title, body } => renderer.request_notification(&title, &body),
            Effect::Status(state) => renderer.set_status(state),
            other @ (Effect::Send(_) | Effect::SubmitUpload(_) | Effect::Download(_)) => {
                pending.push(other)
            }
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        editor: String,
    }

    impl Renderer for Recorder {
        fn append_line(&mut self, line: &RenderedLine) {
            self.calls.push(format!("append {}", line.plain_text()));
        }
        fn update_last_line(&mut self, line: &RenderedLine) {
            self.calls.push(format!("update {}", line.plain_text()));
        }
        fn clear_last_line(&mut self) {
            self.calls.push("clear".into());
        }
        fn remove_last_line(&mut self) {
            self.calls.push("remove".into());
        }
        fn show_surface(&mut self, surface: Surface) {
            self.calls.push(format!("show {surface:?}"));
        }
        fn hide_surface(&mut self, surface: Surface) {
            self.calls.push(format!("hide {surface:?}"));
        }
        fn set_pager(&mut self, text: &str) {
            self.calls.push(format!("pager {text}"));
        }
        fn append_pager(&mut self, text: &str) {
            self.calls.push(format!("pager+ {text}"));
        }
        fn set_input(&mut self, view: &InputView) {
            self.calls.push(format!("input {}", view.attached));
        }
        fn show_upload_form(&mut self, slots: &[UploadSlotView]) {
            self.calls.push(format!("form {}", slots.len()));
        }
        fn request_notification(&mut self, title: &str, _body: &str) {
            self.calls.push(format!("notify {title}"));
        }
        fn set_status(&mut self, state: TransportState) {
            self.calls.push(format!("status {}", state.as_str()));
        }
    }

    impl EditorBuffer for Recorder {
        fn get(&self) -> String {
            self.editor.clone()
        }
        fn set(&mut self, text: &str) {
            self.editor = text.to_string();
        }
        fn append(&mut self, text: &str) {
            self.editor.push_str(text);
        }
        fn focus(&mut self) {}
    }

    #[test]
    fn render_effects_are_applied_and_io_is_returned() {
        let mut renderer = Recorder::default();
        let mut editor = Recorder::default();
        let mut line = RenderedLine::new();
        line.push_text(Default::default(), "hi");
        let pending = apply(
            vec![
                Effect::Send(Outbound::Interrupt),
                Effect::AppendLine(line),
                Effect::EditorSet("a".into()),
                Effect::EditorAppend("b".into()),
                Effect::Status(TransportState::Open),
            ],
            &mut renderer,
            &mut editor,
        );
        assert_eq!(pending, vec![Effect::Send(Outbound::Interrupt)]);
        assert_eq!(renderer.calls, vec!["append hi", "status open"]);
        assert_eq!(editor.get(), "ab");
    }
}
