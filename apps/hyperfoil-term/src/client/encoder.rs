use super::{ClientSession, Effect, InputView, Mode, ModeKind, Surface, UploadStage};
use crate::protocol::Outbound;
use crate::protocol::sentinel::{ARROW_DOWN, ARROW_UP, BACKSPACE};

/// Key-level events delivered by the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Char(char),
    Submit,
    Tab,
    Backspace,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    Escape,
    Interrupt,
}

/// The local command-input field. Only completed lines and control keys reach
/// the server; editing within the field stays local.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
    /// Position in characters.
    cursor: usize,
    pub(crate) attached: bool,
    pub(crate) focused: bool,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn view(&self) -> InputView {
        InputView {
            text: self.text.clone(),
            cursor: self.cursor,
            attached: self.attached,
            focused: self.focused,
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn byte_offset(&self, cursor: usize) -> usize {
        self.text
            .char_indices()
            .nth(cursor)
            .map_or(self.text.len(), |(offset, _)| offset)
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn insert(&mut self, ch: char) {
        let offset = self.byte_offset(self.cursor);
        self.text.insert(offset, ch);
        self.cursor += 1;
    }

    /// Puts a character in front of the field without moving the cursor.
    pub fn prepend(&mut self, ch: char) {
        self.text.insert(0, ch);
    }

    /// Deletes the character before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let offset = self.byte_offset(self.cursor);
        self.text.remove(offset);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.len();
    }
}

impl ClientSession {
    /// Encodes one key event. Keys that only edit the field locally produce
    /// an input update and nothing on the wire.
    pub fn handle_input(&mut self, event: InputEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.session.is_open() {
            return effects;
        }
        match self.mode.kind() {
            ModeKind::Idle if self.upload_stage == UploadStage::None => {
                self.encode_idle(event, &mut effects)
            }
            ModeKind::Idle => {
                if matches!(event, InputEvent::Escape | InputEvent::Interrupt) {
                    effects.extend(self.cancel_upload());
                }
            }
            ModeKind::Paging => {
                if matches!(
                    event,
                    InputEvent::Escape | InputEvent::Interrupt | InputEvent::Char('q')
                ) {
                    effects.extend(self.stop_paging());
                }
            }
            ModeKind::Editing => {}
            ModeKind::ReceivingFileList | ModeKind::Downloading => {
                if matches!(event, InputEvent::Escape | InputEvent::Interrupt) {
                    self.interrupt(&mut effects);
                }
            }
        }
        effects
    }

    fn encode_idle(&mut self, event: InputEvent, effects: &mut Vec<Effect>) {
        match event {
            InputEvent::Char(ch) => {
                self.input.insert(ch);
                effects.push(Effect::Input(self.input.view()));
            }
            InputEvent::Submit => self.send_field('\n', effects),
            InputEvent::Tab => self.send_field('\t', effects),
            InputEvent::Backspace => {
                if self.input.backspace() {
                    effects.push(Effect::Input(self.input.view()));
                    return;
                }
                if let Some((_, effect)) = self.transcript.pop_char() {
                    effects.push(effect);
                } else if let Some(effect) = self.transcript.pop_line_break() {
                    effects.push(effect);
                }
                self.send(effects, Outbound::Input(BACKSPACE.to_string()));
            }
            InputEvent::Left => {
                if self.input.move_left() {
                    effects.push(Effect::Input(self.input.view()));
                    return;
                }
                // Pull the character before the field back into it.
                let Some((ch, effect)) = self.transcript.pop_char() else {
                    return;
                };
                effects.push(effect);
                self.input.prepend(ch);
                effects.push(Effect::Input(self.input.view()));
                self.send(effects, Outbound::Input(BACKSPACE.to_string()));
            }
            InputEvent::Right => {
                if self.input.move_right() {
                    effects.push(Effect::Input(self.input.view()));
                }
            }
            InputEvent::Home => {
                self.input.move_home();
                effects.push(Effect::Input(self.input.view()));
            }
            InputEvent::End => {
                self.input.move_end();
                effects.push(Effect::Input(self.input.view()));
            }
            InputEvent::Up => self.send(effects, Outbound::Input(ARROW_UP.to_string())),
            InputEvent::Down => self.send(effects, Outbound::Input(ARROW_DOWN.to_string())),
            InputEvent::Escape | InputEvent::Interrupt => self.interrupt(effects),
        }
    }

    fn send_field(&mut self, terminator: char, effects: &mut Vec<Effect>) {
        let mut line = self.input.take();
        line.push(terminator);
        effects.push(Effect::Input(self.input.view()));
        self.send(effects, Outbound::Input(line));
    }

    /// Echoes the abandoned input, tells the server to stop, and drops any
    /// local mode.
    pub(crate) fn interrupt(&mut self, effects: &mut Vec<Effect>) {
        let abandoned = self.input.take();
        if !abandoned.is_empty() {
            effects.push(self.transcript.push_interrupted(&abandoned));
        }
        effects.push(Effect::Input(self.input.view()));
        match std::mem::take(&mut self.mode) {
            Mode::Paging(_) => effects.push(Effect::HideSurface(Surface::Pager)),
            Mode::Editing { .. } => {
                effects.push(Effect::HideSurface(Surface::Editor));
                effects.push(Effect::EditorSet(String::new()));
            }
            Mode::Idle | Mode::ReceivingFileList(_) | Mode::Downloading(_) => {}
        }
        self.send(effects, Outbound::Interrupt);
        self.settle_input(effects);
    }
}
