use super::sentinel;
use std::fmt;

/// A single websocket message, in either direction.
#[derive(Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Frame::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

/// Messages the client sends upstream.
#[derive(Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Raw keystroke text forwarded to the remote line editor.
    Input(String),
    Interrupt,
    AuthToken(String),
    SetBenchmark(String),
    SetTermSize { width: u16, height: u16 },
    SendNotifications,
    /// Edited or uploaded benchmark source, framed by the edits markers.
    Edits(String),
}

impl Outbound {
    pub fn into_frames(self) -> Vec<Frame> {
        match self {
            Outbound::Input(text) => vec![Frame::Text(text)],
            Outbound::Interrupt => vec![Frame::Text(sentinel::INTERRUPT_SIGNAL.to_string())],
            Outbound::AuthToken(token) => {
                vec![Frame::Text(format!("{}{token}", sentinel::AUTH_TOKEN))]
            }
            Outbound::SetBenchmark(name) => {
                vec![Frame::Text(format!("{}{name}", sentinel::SET_BENCHMARK))]
            }
            Outbound::SetTermSize { width, height } => vec![Frame::Text(format!(
                "{}{width}x{height}",
                sentinel::SET_TERM_SIZE
            ))],
            Outbound::SendNotifications => {
                vec![Frame::Text(sentinel::SEND_NOTIFICATIONS.to_string())]
            }
            Outbound::Edits(content) => vec![
                Frame::Text(sentinel::EDITS_BEGIN.to_string()),
                Frame::Text(content),
                Frame::Text(sentinel::EDITS_END.to_string()),
            ],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outbound::Input(_) => "input",
            Outbound::Interrupt => "interrupt",
            Outbound::AuthToken(_) => "auth_token",
            Outbound::SetBenchmark(_) => "set_benchmark",
            Outbound::SetTermSize { .. } => "set_term_size",
            Outbound::SendNotifications => "send_notifications",
            Outbound::Edits(_) => "edits",
        }
    }
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Input(text) => f.debug_tuple("Input").field(text).finish(),
            Outbound::Interrupt => f.write_str("Interrupt"),
            Outbound::AuthToken(_) => f.write_str("AuthToken([REDACTED])"),
            Outbound::SetBenchmark(name) => f.debug_tuple("SetBenchmark").field(name).finish(),
            Outbound::SetTermSize { width, height } => f
                .debug_struct("SetTermSize")
                .field("width", width)
                .field("height", height)
                .finish(),
            Outbound::SendNotifications => f.write_str("SendNotifications"),
            Outbound::Edits(content) => write!(f, "Edits({} bytes)", content.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_are_framed_by_markers() {
        let frames = Outbound::Edits("name: demo\n".into()).into_frames();
        assert_eq!(
            frames,
            vec![
                Frame::Text("__HYPERFOIL_EDITS_BEGIN__\n".into()),
                Frame::Text("name: demo\n".into()),
                Frame::Text("__HYPERFOIL_EDITS_END__\n".into()),
            ]
        );
    }

    #[test]
    fn term_size_uses_width_x_height() {
        let frames = Outbound::SetTermSize {
            width: 120,
            height: 40,
        }
        .into_frames();
        assert_eq!(
            frames,
            vec![Frame::Text("__HYPERFOIL_SET_TERM_SIZE__120x40".into())]
        );
    }

    #[test]
    fn auth_token_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", Outbound::AuthToken("secret".into()));
        assert!(!rendered.contains("secret"));
    }
}
