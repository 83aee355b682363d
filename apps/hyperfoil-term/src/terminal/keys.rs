use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::InputEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a key press means to the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Input(InputEvent),
    /// Ctrl-E: open the document in the external editor.
    OpenEditor,
    /// Ctrl-S: send the edited document back.
    SaveEdits,
    PageUp,
    PageDown,
    /// Ctrl-D: leave the client.
    Quit,
}

pub fn translate(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(KeyAction::Input(InputEvent::Interrupt)),
            KeyCode::Char('d') => Some(KeyAction::Quit),
            KeyCode::Char('e') => Some(KeyAction::OpenEditor),
            KeyCode::Char('s') => Some(KeyAction::SaveEdits),
            KeyCode::Char('a') => Some(KeyAction::Input(InputEvent::Home)),
            _ => None,
        };
    }
    let input = match key.code {
        KeyCode::Char(ch) => InputEvent::Char(ch),
        KeyCode::Enter => InputEvent::Submit,
        KeyCode::Tab => InputEvent::Tab,
        KeyCode::Backspace => InputEvent::Backspace,
        KeyCode::Left => InputEvent::Left,
        KeyCode::Right => InputEvent::Right,
        KeyCode::Home => InputEvent::Home,
        KeyCode::End => InputEvent::End,
        KeyCode::Up => InputEvent::Up,
        KeyCode::Down => InputEvent::Down,
        KeyCode::Esc => InputEvent::Escape,
        KeyCode::PageUp => return Some(KeyAction::PageUp),
        KeyCode::PageDown => return Some(KeyAction::PageDown),
        _ => return None,
    };
    Some(KeyAction::Input(input))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalInput {
    Key(KeyEvent),
    Resize(u16, u16),
}

/// Reads terminal events on a dedicated thread. Reading can be paused while
/// an external program owns the terminal.
pub struct InputPump {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputPump {
    pub fn spawn(sink: mpsc::UnboundedSender<TerminalInput>) -> std::io::Result<Self> {
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new().name("hyperfoil-input".into()).spawn({
            let paused = paused.clone();
            let stop = stop.clone();
            move || pump(sink, paused, stop)
        })?;
        Ok(Self {
            paused,
            stop,
            handle: Some(handle),
        })
    }

    /// Stops reading and waits out the current poll.
    pub async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tokio::time::sleep(POLL_INTERVAL * 2).await;
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Drop for InputPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn pump(sink: mpsc::UnboundedSender<TerminalInput>, paused: Arc<AtomicBool>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        if paused.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                warn!(target: "terminal::keys", error = %err, "terminal poll failed");
                return;
            }
        }
        let input = match event::read() {
            Ok(Event::Key(key)) => TerminalInput::Key(key),
            Ok(Event::Resize(width, height)) => TerminalInput::Resize(width, height),
            Ok(_) => continue,
            Err(err) => {
                warn!(target: "terminal::keys", error = %err, "terminal read failed");
                return;
            }
        };
        if sink.send(input).is_err() {
            break;
        }
    }
    debug!(target: "terminal::keys", "input pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn plain_keys_become_input_events() {
        assert_eq!(
            translate(&key(KeyCode::Char('x'), KeyModifiers::NONE)),
            Some(KeyAction::Input(InputEvent::Char('x')))
        );
        assert_eq!(
            translate(&key(KeyCode::Char('X'), KeyModifiers::SHIFT)),
            Some(KeyAction::Input(InputEvent::Char('X')))
        );
        assert_eq!(
            translate(&key(KeyCode::Enter, KeyModifiers::NONE)),
            Some(KeyAction::Input(InputEvent::Submit))
        );
        assert_eq!(
            translate(&key(KeyCode::Esc, KeyModifiers::NONE)),
            Some(KeyAction::Input(InputEvent::Escape))
        );
    }

    #[test]
    fn control_chords() {
        let ctrl = KeyModifiers::CONTROL;
        assert_eq!(
            translate(&key(KeyCode::Char('c'), ctrl)),
            Some(KeyAction::Input(InputEvent::Interrupt))
        );
        assert_eq!(translate(&key(KeyCode::Char('e'), ctrl)), Some(KeyAction::OpenEditor));
        assert_eq!(translate(&key(KeyCode::Char('s'), ctrl)), Some(KeyAction::SaveEdits));
        assert_eq!(translate(&key(KeyCode::Char('d'), ctrl)), Some(KeyAction::Quit));
        assert_eq!(translate(&key(KeyCode::Char('z'), ctrl)), None);
    }

    #[test]
    fn releases_are_ignored() {
        let mut release = key(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(translate(&release), None);
        assert_eq!(translate(&key(KeyCode::F(5), KeyModifiers::NONE)), None);
    }
}
