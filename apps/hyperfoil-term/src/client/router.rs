use crate::protocol::sentinel::{
    BENCHMARK_FILE_LIST, DIRECT_DOWNLOAD_MAGIC, DOWNLOAD_MAGIC, EDIT_MAGIC, NOTIFICATION,
    PAGER_MAGIC, SESSION_START, UPLOAD_MAGIC,
};

/// A start sentinel found at the front of a chunk, with the text it carries.
#[derive(Debug, PartialEq, Eq)]
pub enum Start<'a> {
    UploadRequest,
    Pager { rest: &'a str },
    Edit { document: Option<&'a str>, rest: &'a str },
    FileList { rest: &'a str },
    IndirectDownload { path: &'a str, filename: &'a str },
    DirectDownload { rest: &'a str },
    SessionStart { rest: &'a str },
    Notification { title: &'a str, body: &'a str },
}

impl Start<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Start::UploadRequest => "upload_request",
            Start::Pager { .. } => "pager",
            Start::Edit { .. } => "edit",
            Start::FileList { .. } => "file_list",
            Start::IndirectDownload { .. } => "indirect_download",
            Start::DirectDownload { .. } => "direct_download",
            Start::SessionStart { .. } => "session_start",
            Start::Notification { .. } => "notification",
        }
    }

    /// Whether the sentinel opens a mode that consumes later chunks.
    pub fn enters_mode(&self) -> bool {
        matches!(
            self,
            Start::Pager { .. }
                | Start::Edit { .. }
                | Start::FileList { .. }
                | Start::DirectDownload { .. }
        )
    }
}

/// Matches the start sentinels in priority order. Only the front of the chunk
/// is inspected; the first match wins.
pub fn recognize(chunk: &str) -> Option<Start<'_>> {
    if chunk.starts_with(UPLOAD_MAGIC) {
        return Some(Start::UploadRequest);
    }
    if let Some(rest) = chunk.strip_prefix(PAGER_MAGIC) {
        return Some(Start::Pager { rest });
    }
    if let Some(rest) = chunk.strip_prefix(EDIT_MAGIC) {
        let (name, rest) = rest.split_once('\n').unwrap_or((rest, ""));
        let name = name.trim();
        let document = (!name.is_empty()).then_some(name);
        return Some(Start::Edit { document, rest });
    }
    if let Some(rest) = chunk.strip_prefix(BENCHMARK_FILE_LIST) {
        return Some(Start::FileList { rest });
    }
    if let Some(rest) = chunk.strip_prefix(DOWNLOAD_MAGIC) {
        let mut parts = rest
            .trim_end_matches(['\r', '\n'])
            .split(' ')
            .filter(|part| !part.is_empty());
        let path = parts.next().unwrap_or_default();
        let filename = parts
            .next()
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path));
        return Some(Start::IndirectDownload { path, filename });
    }
    if let Some(rest) = chunk.strip_prefix(DIRECT_DOWNLOAD_MAGIC) {
        return Some(Start::DirectDownload { rest });
    }
    if let Some(rest) = chunk.strip_prefix(SESSION_START) {
        return Some(Start::SessionStart { rest });
    }
    if let Some(rest) = chunk.strip_prefix(NOTIFICATION) {
        let (title, body) = rest.split_once('\n').unwrap_or((rest, ""));
        return Some(Start::Notification {
            title,
            body: body.trim_end_matches('\n'),
        });
    }
    None
}
