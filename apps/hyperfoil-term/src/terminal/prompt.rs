use crate::client::{ClientSession, InputEvent, InputLine, UploadStage};

/// What the upload prompt is asking for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptKind {
    /// Path of the benchmark document to upload.
    Source,
    /// Path of a local file for a file the benchmark refers to.
    Attach { slot: String },
    /// Every file is attached; Enter submits.
    Confirm,
}

impl PromptKind {
    /// The prompt the session currently needs, if any. Slots are asked for in
    /// the order the server listed them.
    pub fn for_session(client: &ClientSession) -> Option<Self> {
        match client.upload_stage() {
            UploadStage::ChooseSource => Some(PromptKind::Source),
            UploadStage::AttachFiles => {
                let missing = client.pending_upload()?.missing();
                Some(match missing.into_iter().next() {
                    Some(slot) => PromptKind::Attach { slot },
                    None => PromptKind::Confirm,
                })
            }
            UploadStage::None | UploadStage::Submitting => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PromptKind::Source => "Benchmark file to upload (Esc cancels): ".to_string(),
            PromptKind::Attach { slot } => format!("Local file for '{slot}': "),
            PromptKind::Confirm => "All files attached, press Enter to upload ".to_string(),
        }
    }
}

/// What the renderer draws for an active prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptView {
    pub label: String,
    pub text: String,
    pub cursor: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Edited,
    Submitted(String),
    /// Left to the session, e.g. an interrupt cancelling the upload.
    Passthrough,
    Ignored,
}

#[derive(Debug)]
pub struct Prompt {
    kind: PromptKind,
    field: InputLine,
}

impl Prompt {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            field: InputLine::new(),
        }
    }

    pub fn kind(&self) -> &PromptKind {
        &self.kind
    }

    pub fn view(&self) -> PromptView {
        PromptView {
            label: self.kind.label(),
            text: self.field.text().to_string(),
            cursor: self.field.cursor(),
        }
    }

    pub fn edit(&mut self, event: InputEvent) -> PromptOutcome {
        match event {
            InputEvent::Char(ch) => self.field.insert(ch),
            InputEvent::Backspace => {
                self.field.backspace();
            }
            InputEvent::Left => {
                self.field.move_left();
            }
            InputEvent::Right => {
                self.field.move_right();
            }
            InputEvent::Home => self.field.move_home(),
            InputEvent::End => self.field.move_end(),
            InputEvent::Submit => {
                let value = self.field.take().trim().to_string();
                if value.is_empty() && self.kind != PromptKind::Confirm {
                    return PromptOutcome::Ignored;
                }
                return PromptOutcome::Submitted(value);
            }
            InputEvent::Escape | InputEvent::Interrupt => return PromptOutcome::Passthrough,
            InputEvent::Tab | InputEvent::Up | InputEvent::Down => return PromptOutcome::Ignored,
        }
        PromptOutcome::Edited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionOptions;
    use crate::protocol::Frame;
    use crate::protocol::sentinel::{BENCHMARK_END_OF_FILES, BENCHMARK_FILE_LIST, UPLOAD_MAGIC};

    fn type_text(prompt: &mut Prompt, text: &str) {
        for ch in text.chars() {
            assert_eq!(prompt.edit(InputEvent::Char(ch)), PromptOutcome::Edited);
        }
    }

    #[test]
    fn submit_returns_trimmed_path() {
        let mut prompt = Prompt::new(PromptKind::Source);
        type_text(&mut prompt, " bench.hf.yaml ");
        assert_eq!(prompt.view().text, " bench.hf.yaml ");
        assert_eq!(
            prompt.edit(InputEvent::Submit),
            PromptOutcome::Submitted("bench.hf.yaml".into())
        );
        assert_eq!(prompt.view().text, "");
    }

    #[test]
    fn empty_path_is_ignored_but_confirm_accepts_enter() {
        let mut prompt = Prompt::new(PromptKind::Attach {
            slot: "data.csv".into(),
        });
        assert_eq!(prompt.edit(InputEvent::Submit), PromptOutcome::Ignored);
        let mut confirm = Prompt::new(PromptKind::Confirm);
        assert_eq!(
            confirm.edit(InputEvent::Submit),
            PromptOutcome::Submitted(String::new())
        );
    }

    #[test]
    fn escape_is_left_to_the_session() {
        let mut prompt = Prompt::new(PromptKind::Source);
        assert_eq!(prompt.edit(InputEvent::Escape), PromptOutcome::Passthrough);
        assert_eq!(prompt.edit(InputEvent::Interrupt), PromptOutcome::Passthrough);
    }

    #[test]
    fn prompts_follow_the_upload_exchange() {
        let mut client = ClientSession::new(SessionOptions::default());
        client.connection_opened();
        assert_eq!(PromptKind::for_session(&client), None);

        client.handle_frame(Frame::Text(UPLOAD_MAGIC.into()));
        assert_eq!(PromptKind::for_session(&client), Some(PromptKind::Source));

        client.begin_upload("bench.hf.yaml", b"name: demo".to_vec());
        assert_eq!(PromptKind::for_session(&client), None);

        client.handle_frame(Frame::Text(format!(
            "{BENCHMARK_FILE_LIST}demo\nv1\ndata.csv\n{BENCHMARK_END_OF_FILES}"
        )));
        assert_eq!(
            PromptKind::for_session(&client),
            Some(PromptKind::Attach {
                slot: "data.csv".into()
            })
        );

        client
            .attach_upload_file("data.csv", "/tmp/data.csv", b"a,b".to_vec())
            .unwrap();
        assert_eq!(PromptKind::for_session(&client), Some(PromptKind::Confirm));
    }
}
