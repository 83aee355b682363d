use std::fs;
use std::io::{self, Write};
use std::process::Command;
use tracing::debug;

use crate::client::EditorBuffer;

const DOCUMENT_SUFFIX: &str = ".hf.yaml";

/// Document buffer edited through an external program.
#[derive(Debug)]
pub struct ExternalEditor {
    command: String,
    buffer: String,
    focused: bool,
}

impl ExternalEditor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            buffer: String::new(),
            focused: false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }
}

impl EditorBuffer for ExternalEditor {
    fn get(&self) -> String {
        self.buffer.clone()
    }

    fn set(&mut self, text: &str) {
        self.buffer = text.to_string();
        if text.is_empty() {
            self.focused = false;
        }
    }

    fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn focus(&mut self) {
        self.focused = true;
    }
}

/// Runs `command` on a temporary copy of `content` and returns the saved
/// text. Blocks until the editor exits; the caller hands it the terminal.
pub fn run_editor(command: &str, content: &str) -> io::Result<String> {
    let mut words = command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "editor command is empty"))?;

    let mut file = tempfile::Builder::new()
        .prefix("hyperfoil-")
        .suffix(DOCUMENT_SUFFIX)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    debug!(target: "terminal::editor", program, path = %file.path().display(), "launching editor");
    let status = Command::new(program).args(words).arg(file.path()).status()?;
    if !status.success() {
        return Err(io::Error::other(format!("{program} exited with {status}")));
    }
    fs::read_to_string(file.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_collects_streamed_document() {
        let mut editor = ExternalEditor::new("vi");
        editor.set("name: demo\n");
        editor.append("phases:\n");
        editor.focus();
        assert!(editor.is_focused());
        assert_eq!(editor.get(), "name: demo\nphases:\n");
        editor.set("");
        assert!(!editor.is_focused());
    }

    #[cfg(unix)]
    #[test]
    fn editor_output_is_read_back() {
        // `true` leaves the file untouched.
        assert_eq!(run_editor("true", "name: demo\n").unwrap(), "name: demo\n");
        assert!(run_editor("false", "x").is_err());
        assert!(run_editor("   ", "x").is_err());
    }
}
