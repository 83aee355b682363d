use crate::protocol::Outbound;
use std::fmt;
use uuid::Uuid;

/// Client-generated identifier that lets the server reattach a reconnecting
/// client to the same CLI context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

impl TransportState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportState::Connecting => "connecting",
            TransportState::Open => "open",
            TransportState::Closed => "closed",
            TransportState::Reconnecting => "reconnecting",
        }
    }
}

/// Identity and per-connection handshake state of one client lifetime.
pub struct Session {
    id: SessionId,
    state: TransportState,
    auth_token: Option<String>,
    auth_sent: bool,
    connections: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::generate())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            state: TransportState::Connecting,
            auth_token: None,
            auth_sent: false,
            connections: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransportState::Open
    }

    /// Number of connections opened so far, including the current one.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// A token replaced after it was sent is presented on the next connection.
    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.auth_token = Some(token.into());
    }

    pub fn opened(&mut self) {
        self.state = TransportState::Open;
        self.auth_sent = false;
        self.connections += 1;
    }

    pub fn closed(&mut self) {
        self.state = TransportState::Closed;
    }

    pub fn reconnecting(&mut self) {
        self.state = TransportState::Reconnecting;
    }

    /// Returns the auth frame if it is due on the current connection. At most
    /// one frame is produced per connection.
    pub fn take_auth(&mut self) -> Option<Outbound> {
        if self.auth_sent || !self.is_open() {
            return None;
        }
        let token = self.auth_token.clone()?;
        self.auth_sent = true;
        Some(Outbound::AuthToken(token))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
