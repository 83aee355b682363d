use crate::session::SessionId;
use crate::transport::TransportError;
use url::Url;

/// Where the web CLI socket lives and which session to attach to.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Controller base URL; `http`, `https`, `ws` and `wss` are accepted.
    pub server: Url,
    pub session_id: SessionId,
}

impl WebSocketConfig {
    pub fn new(server: Url, session_id: SessionId) -> Self {
        Self { server, session_id }
    }

    /// The socket URL: the server's root with the session id as the whole
    /// query string, e.g. `ws://host:8090/?<session id>`.
    pub fn build_url(&self) -> Result<Url, TransportError> {
        let mut url = self.server.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
        if url.path().is_empty() {
            url.set_path("/");
        }
        url.set_fragment(None);
        url.set_query(Some(&self.session_id.to_string()));
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session() -> SessionId {
        SessionId::from(Uuid::nil())
    }

    #[test]
    fn http_maps_to_ws_with_session_query() {
        let config = WebSocketConfig::new(Url::parse("http://localhost:8090").unwrap(), session());
        assert_eq!(
            config.build_url().unwrap().as_str(),
            "ws://localhost:8090/?00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn https_maps_to_wss_and_keeps_path() {
        let config = WebSocketConfig::new(
            Url::parse("https://perf.example.com/cli/?old=1#frag").unwrap(),
            session(),
        );
        assert_eq!(
            config.build_url().unwrap().as_str(),
            "wss://perf.example.com/cli/?00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        let config = WebSocketConfig::new(Url::parse("ftp://host/").unwrap(), session());
        assert!(matches!(
            config.build_url(),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
