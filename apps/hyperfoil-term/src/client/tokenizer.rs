use crate::protocol::sentinel::{CLEAR_LINE, CURSOR_TO_COLUMN, CURSOR_UP};

/// Side effect requested by a stripped control sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Empty the last rendered line but keep it.
    ClearLine,
    /// Drop the last rendered line entirely.
    RemoveLine,
}

/// Strips cursor-control sequences from the front of `chunk`.
///
/// Rules are tried in a fixed order and the scan restarts after every match.
/// Cursor-to-column codes are discarded without an action. Every match
/// consumes input, so the loop ends on any chunk.
pub fn strip_controls(chunk: &str) -> (Vec<Control>, &str) {
    let mut controls = Vec::new();
    let mut rest = chunk;
    loop {
        if let Some(tail) = strip_any(rest, &CURSOR_TO_COLUMN) {
            rest = tail;
        } else if let Some(tail) = strip_any(rest, &CLEAR_LINE) {
            controls.push(Control::ClearLine);
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(CURSOR_UP) {
            controls.push(Control::RemoveLine);
            rest = tail;
        } else {
            break;
        }
    }
    (controls, rest)
}

fn strip_any<'a>(text: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| text.strip_prefix(prefix))
}
