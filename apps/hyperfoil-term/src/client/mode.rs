use crate::protocol::sentinel::{BENCHMARK_END_OF_FILES, DIRECT_DOWNLOAD_END};
use std::fmt;

/// What the session does with the next inbound chunk that carries no start
/// sentinel. At most one mode is active at a time.
#[derive(Debug, Default)]
pub enum Mode {
    #[default]
    Idle,
    Paging(PagerBuffer),
    Editing { document: Option<String> },
    ReceivingFileList(FileListAccumulator),
    Downloading(DownloadUnit),
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Idle => ModeKind::Idle,
            Mode::Paging(_) => ModeKind::Paging,
            Mode::Editing { .. } => ModeKind::Editing,
            Mode::ReceivingFileList(_) => ModeKind::ReceivingFileList,
            Mode::Downloading(_) => ModeKind::Downloading,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Mode::Idle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    Idle,
    Paging,
    Editing,
    ReceivingFileList,
    Downloading,
}

impl ModeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeKind::Idle => "idle",
            ModeKind::Paging => "paging",
            ModeKind::Editing => "editing",
            ModeKind::ReceivingFileList => "receiving_file_list",
            ModeKind::Downloading => "downloading",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct PagerBuffer {
    content: String,
}

impl PagerBuffer {
    pub fn new(initial: &str) -> Self {
        Self {
            content: initial.to_string(),
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.content.push_str(chunk);
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Offset from which a terminator of `marker_len` bytes could start, given
/// that the first `scanned` bytes were already searched.
fn rescan_from(text: &str, scanned: usize, marker_len: usize) -> usize {
    let mut from = scanned.saturating_sub(marker_len.saturating_sub(1));
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    from
}

/// Benchmark id, optional version, and the extra files it refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileList {
    pub benchmark: String,
    pub version: Option<String>,
    pub files: Vec<String>,
}

impl FileList {
    /// Parses the text preceding the terminator: the id on the first line, the
    /// version (possibly empty) on the second, then one filename per line.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));
        let benchmark = lines.next().unwrap_or_default().to_string();
        let version = lines
            .next()
            .filter(|version| !version.is_empty())
            .map(str::to_string);
        let files = lines
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            benchmark,
            version,
            files,
        }
    }
}

#[derive(Debug, Default)]
pub struct FileListAccumulator {
    text: String,
    scanned: usize,
}

impl FileListAccumulator {
    pub fn new(initial: &str) -> Self {
        let mut acc = Self::default();
        acc.push(initial);
        acc
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Looks for the end-of-files marker. On a hit, returns the parsed list
    /// and whatever followed the marker.
    pub fn finish(&mut self) -> Option<(FileList, String)> {
        let from = rescan_from(&self.text, self.scanned, BENCHMARK_END_OF_FILES.len());
        let Some(offset) = self.text[from..].find(BENCHMARK_END_OF_FILES) else {
            self.scanned = self.text.len();
            return None;
        };
        let end = from + offset;
        let list = FileList::parse(&self.text[..end]);
        let trailing = self.text[end + BENCHMARK_END_OF_FILES.len()..].to_string();
        Some((list, trailing))
    }
}

/// A finished direct download.
#[derive(Debug, PartialEq, Eq)]
pub struct CompletedDownload {
    pub filename: String,
    pub content: Vec<u8>,
    /// Text that followed the terminator in the same chunk.
    pub trailing: String,
}

/// Metadata text and binary content of one direct download.
#[derive(Debug, Default)]
pub struct DownloadUnit {
    metadata: String,
    scanned: usize,
    content: Vec<u8>,
    binary_frames: usize,
}

impl DownloadUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// A later binary frame replaces any earlier content.
    pub fn push_binary(&mut self, bytes: Vec<u8>) {
        self.content = bytes;
        self.binary_frames += 1;
    }

    /// Appends metadata text and completes the unit once the terminator has
    /// arrived. The filename is the first metadata line. Downloads that never
    /// carried a binary frame use the remaining metadata lines as content.
    pub fn push_text(&mut self, chunk: &str) -> Option<CompletedDownload> {
        self.metadata.push_str(chunk);
        let from = rescan_from(&self.metadata, self.scanned, DIRECT_DOWNLOAD_END.len());
        let Some(offset) = self.metadata[from..].find(DIRECT_DOWNLOAD_END) else {
            self.scanned = self.metadata.len();
            return None;
        };
        let end = from + offset;
        let head = &self.metadata[..end];
        let (filename, body) = match head.split_once('\n') {
            Some((name, body)) => (name, body),
            None => (head, ""),
        };
        let content = if self.binary_frames > 0 {
            std::mem::take(&mut self.content)
        } else {
            body.as_bytes().to_vec()
        };
        Some(CompletedDownload {
            filename: filename.trim_end_matches('\r').to_string(),
            content,
            trailing: self.metadata[end + DIRECT_DOWNLOAD_END.len()..].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_parses_id_version_and_names() {
        let list = FileList::parse("demo\nv42\ndata.csv\nusers.txt\n");
        assert_eq!(list.benchmark, "demo");
        assert_eq!(list.version.as_deref(), Some("v42"));
        assert_eq!(list.files, vec!["data.csv", "users.txt"]);
    }

    #[test]
    fn empty_version_line_means_no_version() {
        let list = FileList::parse("demo\n\n");
        assert_eq!(list.version, None);
        assert!(list.files.is_empty());
    }

    #[test]
    fn terminator_split_across_chunks_is_found() {
        let mut acc = FileListAccumulator::new("demo\nv1\ndata.csv\n__HYPERFOIL_BENCH");
        assert!(acc.finish().is_none());
        acc.push("MARK_END_OF_FILES__\nrest");
        let (list, trailing) = acc.finish().expect("terminator");
        assert_eq!(list.files, vec!["data.csv"]);
        assert_eq!(trailing, "rest");
    }

    #[test]
    fn download_prefers_binary_content() {
        let mut unit = DownloadUnit::new();
        assert!(unit.push_text("report.json\n").is_none());
        unit.push_binary(vec![1, 2]);
        unit.push_binary(vec![3, 4, 5]);
        assert_eq!(unit.content_len(), 3);
        let done = unit
            .push_text("__HYPERFOIL_DIRECT_DOWNLOAD_END__\n")
            .expect("complete");
        assert_eq!(done.filename, "report.json");
        assert_eq!(done.content, vec![3, 4, 5]);
        assert_eq!(done.trailing, "");
    }

    #[test]
    fn text_only_download_uses_body_lines() {
        let mut unit = DownloadUnit::new();
        let done = unit
            .push_text("notes.txt\nhello\n__HYPERFOIL_DIRECT_DOWNLOAD_END__\n$ ")
            .expect("complete");
        assert_eq!(done.filename, "notes.txt");
        assert_eq!(done.content, b"hello\n");
        assert_eq!(done.trailing, "$ ");
    }

    #[test]
    fn rescan_respects_char_boundaries() {
        let text = "ééé";
        let from = rescan_from(text, text.len(), 4);
        assert!(text.is_char_boundary(from));
    }
}
