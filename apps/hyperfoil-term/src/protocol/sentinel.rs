//! Literal markers exchanged with the web CLI endpoint.
//!
//! Inbound markers are matched as prefixes of a text frame; outbound markers
//! prefix the payload of a text frame. Matching is case-sensitive.

pub const INTERRUPT_SIGNAL: &str = "__HYPERFOIL_INTERRUPT_SIGNAL__";

pub const UPLOAD_MAGIC: &str = "__HYPERFOIL_UPLOAD_MAGIC__";
pub const PAGER_MAGIC: &str = "__HYPERFOIL_PAGER_MAGIC__\n";
/// Followed by an optional document name and a newline.
pub const EDIT_MAGIC: &str = "__HYPERFOIL_EDIT_MAGIC__";
pub const BENCHMARK_FILE_LIST: &str = "__HYPERFOIL_BENCHMARK_FILE_LIST__\n";
pub const BENCHMARK_END_OF_FILES: &str = "__HYPERFOIL_BENCHMARK_END_OF_FILES__\n";
/// Followed by ` <path> <filename>`.
pub const DOWNLOAD_MAGIC: &str = "__HYPERFOIL_DOWNLOAD_MAGIC__";
pub const DIRECT_DOWNLOAD_MAGIC: &str = "__HYPERFOIL_DIRECT_DOWNLOAD_MAGIC__\n";
pub const DIRECT_DOWNLOAD_END: &str = "__HYPERFOIL_DIRECT_DOWNLOAD_END__\n";
pub const SESSION_START: &str = "__HYPERFOIL_SESSION_START__\n";
pub const NOTIFICATION: &str = "__HYPERFOIL_NOTIFICATION__";
pub const RAW_HTML_START: &str = "__HYPERFOIL_RAW_HTML_START__";
pub const RAW_HTML_END: &str = "__HYPERFOIL_RAW_HTML_END__";

pub const AUTH_TOKEN: &str = "__HYPERFOIL_AUTH_TOKEN__";
pub const SET_BENCHMARK: &str = "__HYPERFOIL_SET_BENCHMARK__";
pub const SET_TERM_SIZE: &str = "__HYPERFOIL_SET_TERM_SIZE__";
pub const SEND_NOTIFICATIONS: &str = "__HYPERFOIL_SEND_NOTIFICATIONS__";
pub const EDITS_BEGIN: &str = "__HYPERFOIL_EDITS_BEGIN__\n";
pub const EDITS_END: &str = "__HYPERFOIL_EDITS_END__\n";

/// Title used for notifications that arrive without one.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Hyperfoil";

/// Cursor-to-column sequences; the client owns line layout and drops them.
pub const CURSOR_TO_COLUMN: [&str; 2] = ["\u{1b}[160D", "\u{1b}[1000D"];
pub const CLEAR_LINE: [&str; 2] = ["\u{1b}[2K", "\u{1b}[K"];
pub const CURSOR_UP: &str = "\u{1b}[1A";

pub const ARROW_UP: &str = "\u{1b}[A";
pub const ARROW_DOWN: &str = "\u{1b}[B";
pub const BACKSPACE: &str = "\u{8}";
