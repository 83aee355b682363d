use crate::client::effect::Effect;
use crate::protocol::sentinel::{RAW_HTML_END, RAW_HTML_START};
use std::fmt::Write as _;
use tracing::trace;
use vte::{Params, Perform};

const DEFAULT_SCROLLBACK: usize = 10_000;

const BASE_PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (187, 0, 0),
    (0, 187, 0),
    (187, 187, 0),
    (0, 0, 187),
    (187, 0, 187),
    (0, 187, 187),
    (255, 255, 255),
    (85, 85, 85),
    (255, 85, 85),
    (0, 255, 0),
    (255, 255, 85),
    (85, 85, 255),
    (255, 85, 255),
    (85, 255, 255),
    (255, 255, 255),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub fn to_rgb(self) -> (u8, u8, u8) {
        match self {
            Color::Rgb(r, g, b) => (r, g, b),
            Color::Indexed(idx) if idx < 16 => BASE_PALETTE[idx as usize],
            Color::Indexed(idx) if idx < 232 => {
                let i = idx - 16;
                (
                    CUBE_LEVELS[(i / 36) as usize],
                    CUBE_LEVELS[((i / 6) % 6) as usize],
                    CUBE_LEVELS[(i % 6) as usize],
                )
            }
            Color::Indexed(idx) => {
                let level = 8 + (idx - 232) * 10;
                (level, level, level)
            }
        }
    }

    fn css(self) -> String {
        let (r, g, b) = self.to_rgb();
        format!("rgb({r},{g},{b})")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Style {
    pub fn is_plain(&self) -> bool {
        *self == Style::default()
    }

    fn css(&self) -> String {
        let mut rules = Vec::new();
        if let Some(fg) = self.fg {
            rules.push(format!("color:{}", fg.css()));
        }
        if let Some(bg) = self.bg {
            rules.push(format!("background-color:{}", bg.css()));
        }
        if self.bold {
            rules.push("font-weight:bold".to_string());
        }
        if self.faint {
            rules.push("opacity:0.7".to_string());
        }
        if self.italic {
            rules.push("font-style:italic".to_string());
        }
        if self.underline {
            rules.push("text-decoration:underline".to_string());
        }
        rules.join(";")
    }

    fn apply_sgr(&mut self, codes: &[u16]) {
        if codes.is_empty() {
            *self = Style::default();
            return;
        }
        let mut iter = codes.iter().copied();
        while let Some(code) = iter.next() {
            match code {
                0 => *self = Style::default(),
                1 => self.bold = true,
                2 => self.faint = true,
                3 => self.italic = true,
                4 => self.underline = true,
                22 => {
                    self.bold = false;
                    self.faint = false;
                }
                23 => self.italic = false,
                24 => self.underline = false,
                30..=37 => self.fg = Some(Color::Indexed((code - 30) as u8)),
                38 => self.fg = extended_color(&mut iter).or(self.fg),
                39 => self.fg = None,
                40..=47 => self.bg = Some(Color::Indexed((code - 40) as u8)),
                48 => self.bg = extended_color(&mut iter).or(self.bg),
                49 => self.bg = None,
                90..=97 => self.fg = Some(Color::Indexed((code - 90 + 8) as u8)),
                100..=107 => self.bg = Some(Color::Indexed((code - 100 + 8) as u8)),
                _ => {}
            }
        }
    }
}

fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|idx| Color::Indexed(idx.min(255) as u8)),
        2 => {
            let r = iter.next()?;
            let g = iter.next()?;
            let b = iter.next()?;
            Some(Color::Rgb(
                r.min(255) as u8,
                g.min(255) as u8,
                b.min(255) as u8,
            ))
        }
        _ => None,
    }
}

/// One piece of a rendered line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Run {
    Text { style: Style, text: String },
    /// Input that was abandoned with an interrupt.
    Interrupted(String),
    /// Server-provided markup inserted without conversion.
    Raw(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedLine {
    runs: Vec<Run>,
}

impl RenderedLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn push_text(&mut self, style: Style, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Run::Text {
            style: last_style,
            text: last,
        }) = self.runs.last_mut()
        {
            if *last_style == style {
                last.push_str(text);
                return;
            }
        }
        self.runs.push(Run::Text {
            style,
            text: text.to_string(),
        });
    }

    pub fn push_raw(&mut self, html: &str) {
        self.runs.push(Run::Raw(html.to_string()));
    }

    pub fn push_interrupted(&mut self, text: &str) {
        self.runs.push(Run::Interrupted(text.to_string()));
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// Removes the final character of the trailing text or interrupted run.
    /// Raw markup is atomic and is never split.
    pub fn pop_char(&mut self) -> Option<char> {
        let (ch, now_empty) = match self.runs.last_mut()? {
            Run::Text { text, .. } | Run::Interrupted(text) => {
                let ch = text.pop()?;
                (ch, text.is_empty())
            }
            Run::Raw(_) => return None,
        };
        if now_empty {
            self.runs.pop();
        }
        Some(ch)
    }

    /// Text content without markup; raw spans are omitted.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match run {
                Run::Text { text, .. } | Run::Interrupted(text) => out.push_str(text),
                Run::Raw(_) => {}
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match run {
                Run::Text { style, text } if style.is_plain() => escape_html(text, &mut out),
                Run::Text { style, text } => {
                    let _ = write!(out, "<span style=\"{}\">", style.css());
                    escape_html(text, &mut out);
                    out.push_str("</span>");
                }
                Run::Interrupted(text) => {
                    out.push_str("<span class=\"ctrl-c\">");
                    escape_html(text, &mut out);
                    out.push_str("</span>");
                }
                Run::Raw(html) => out.push_str(html),
            }
        }
        out
    }
}

fn escape_html(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Raw(&'a str),
}

/// Splits a chunk on raw-markup delimiters. Spans do not nest; a start marker
/// without a matching end runs to the end of the chunk.
pub fn split_raw_html(chunk: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = chunk;
    while let Some(start) = rest.find(RAW_HTML_START) {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let body = &rest[start + RAW_HTML_START.len()..];
        match body.find(RAW_HTML_END) {
            Some(end) => {
                segments.push(Segment::Raw(&body[..end]));
                rest = &body[end + RAW_HTML_END.len()..];
            }
            None => {
                segments.push(Segment::Raw(body));
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Stateful ANSI decoder; SGR state carries over between chunks.
pub struct AnsiConverter {
    parser: vte::Parser,
    style: Style,
}

impl AnsiConverter {
    pub fn new() -> Self {
        Self {
            parser: vte::Parser::new(),
            style: Style::default(),
        }
    }

    pub fn style(&self) -> Style {
        self.style
    }

    /// Decodes `text` into styled pieces, one vector per line. The result
    /// always holds at least one (possibly empty) line.
    pub fn convert(&mut self, text: &str) -> Vec<Vec<(Style, String)>> {
        let mut performer = StyledText {
            style: &mut self.style,
            lines: vec![Vec::new()],
        };
        for byte in text.bytes() {
            self.parser.advance(&mut performer, byte);
        }
        performer.lines
    }
}

impl Default for AnsiConverter {
    fn default() -> Self {
        Self::new()
    }
}

struct StyledText<'a> {
    style: &'a mut Style,
    lines: Vec<Vec<(Style, String)>>,
}

impl StyledText<'_> {
    fn push_char(&mut self, c: char) {
        let style = *self.style;
        let Some(line) = self.lines.last_mut() else {
            return;
        };
        match line.last_mut() {
            Some((last_style, text)) if *last_style == style => text.push(c),
            _ => line.push((style, c.to_string())),
        }
    }
}

impl Perform for StyledText<'_> {
    fn print(&mut self, c: char) {
        self.push_char(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.lines.push(Vec::new()),
            b'\t' => self.push_char('\t'),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], ignore: bool, action: char) {
        if action != 'm' || ignore {
            return;
        }
        let codes: Vec<u16> = params.iter().flat_map(|p| p.iter().copied()).collect();
        self.style.apply_sgr(&codes);
    }
}

/// The rendered output: an ordered list of lines whose last entry is the line
/// currently being written.
pub struct Transcript {
    lines: Vec<RenderedLine>,
    converter: AnsiConverter,
    scrollback: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::with_scrollback(DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(scrollback: usize) -> Self {
        Self {
            lines: Vec::new(),
            converter: AnsiConverter::new(),
            scrollback: scrollback.max(1),
        }
    }

    pub fn lines(&self) -> &[RenderedLine] {
        &self.lines
    }

    pub fn last_line(&self) -> Option<&RenderedLine> {
        self.lines.last()
    }

    pub fn html_lines(&self) -> Vec<String> {
        self.lines.iter().map(RenderedLine::to_html).collect()
    }

    /// Renders terminal output. The first produced line extends the current
    /// line; each newline starts a new one.
    pub fn write(&mut self, chunk: &str) -> Vec<Effect> {
        let existed = !self.lines.is_empty();
        if !existed {
            self.lines.push(RenderedLine::new());
        }
        let first_new = if existed { self.lines.len() } else { 0 };
        let before = self.lines.last().cloned().unwrap_or_default();

        for segment in split_raw_html(chunk) {
            match segment {
                Segment::Text(text) => {
                    for (idx, pieces) in self.converter.convert(text).into_iter().enumerate() {
                        if idx > 0 {
                            self.lines.push(RenderedLine::new());
                        }
                        let line = self.current_line();
                        for (style, piece) in pieces {
                            line.push_text(style, &piece);
                        }
                    }
                }
                Segment::Raw(html) => self.current_line().push_raw(html),
            }
        }

        let mut effects = Vec::new();
        if existed && self.lines[first_new - 1] != before {
            effects.push(Effect::UpdateLastLine(self.lines[first_new - 1].clone()));
        }
        for line in &self.lines[first_new..] {
            effects.push(Effect::AppendLine(line.clone()));
        }
        trace!(
            target: "client::output",
            bytes = chunk.len(),
            appended = self.lines.len() - first_new,
            "rendered chunk"
        );
        self.trim_scrollback();
        effects
    }

    /// Writes a standalone notice line. An empty current line is reused; a
    /// fresh empty line is left open after the notice.
    pub fn write_line(&mut self, style: Style, text: &str) -> Vec<Effect> {
        let mut notice = RenderedLine::new();
        notice.push_text(style, text);
        let mut effects = Vec::new();
        match self.lines.last_mut() {
            Some(last) if last.is_empty() => {
                *last = notice.clone();
                effects.push(Effect::UpdateLastLine(notice));
            }
            _ => {
                self.lines.push(notice.clone());
                effects.push(Effect::AppendLine(notice));
            }
        }
        self.lines.push(RenderedLine::new());
        effects.push(Effect::AppendLine(RenderedLine::new()));
        self.trim_scrollback();
        effects
    }

    pub fn push_interrupted(&mut self, text: &str) -> Effect {
        let existed = !self.lines.is_empty();
        let line = self.current_line();
        line.push_interrupted(text);
        if existed {
            Effect::UpdateLastLine(line.clone())
        } else {
            Effect::AppendLine(line.clone())
        }
    }

    pub fn clear_last(&mut self) -> Option<Effect> {
        let line = self.lines.last_mut()?;
        line.clear();
        Some(Effect::ClearLastLine)
    }

    pub fn remove_last(&mut self) -> Option<Effect> {
        self.lines.pop()?;
        Some(Effect::RemoveLastLine)
    }

    /// Takes one character off the end of the current line.
    pub fn pop_char(&mut self) -> Option<(char, Effect)> {
        let line = self.lines.last_mut()?;
        let ch = line.pop_char()?;
        Some((ch, Effect::UpdateLastLine(line.clone())))
    }

    /// Joins an empty current line onto the one before it, undoing the last
    /// newline.
    pub fn pop_line_break(&mut self) -> Option<Effect> {
        if self.lines.len() < 2 || self.lines.last().is_some_and(|line| !line.is_empty()) {
            return None;
        }
        self.lines.pop();
        Some(Effect::RemoveLastLine)
    }

    fn current_line(&mut self) -> &mut RenderedLine {
        if self.lines.is_empty() {
            self.lines.push(RenderedLine::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    fn trim_scrollback(&mut self) {
        if self.lines.len() > self.scrollback {
            let excess = self.lines.len() - self.scrollback;
            self.lines.drain(..excess);
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a complete text into HTML lines in one pass.
pub fn ansi_to_html_lines(text: &str) -> Vec<String> {
    let mut transcript = Transcript::with_scrollback(usize::MAX);
    transcript.write(text);
    transcript.html_lines()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Style {
        Style {
            fg: Some(Color::Indexed(1)),
            ..Style::default()
        }
    }

    #[test]
    fn plain_text_splits_on_newlines() {
        let mut transcript = Transcript::new();
        let effects = transcript.write("hello\nworld\n");
        assert_eq!(transcript.html_lines(), vec!["hello", "world", ""]);
        assert_eq!(effects.len(), 3);
        assert!(effects.iter().all(|e| matches!(e, Effect::AppendLine(_))));
    }

    #[test]
    fn first_line_extends_current_line() {
        let mut transcript = Transcript::new();
        transcript.write("[hyperfoil]$ ");
        let effects = transcript.write("help\nok");
        assert_eq!(transcript.html_lines(), vec!["[hyperfoil]$ help", "ok"]);
        assert!(matches!(effects[0], Effect::UpdateLastLine(_)));
        assert!(matches!(effects[1], Effect::AppendLine(_)));
    }

    #[test]
    fn sgr_codes_become_inline_styles() {
        let html = ansi_to_html_lines("\u{1b}[31mred\u{1b}[0m plain");
        assert_eq!(
            html,
            vec!["<span style=\"color:rgb(187,0,0)\">red</span> plain"]
        );
    }

    #[test]
    fn style_persists_across_chunks_and_coalesces() {
        let mut transcript = Transcript::new();
        transcript.write("\u{1b}[31mab");
        transcript.write("cd");
        assert_eq!(
            transcript.last_line().unwrap().runs(),
            &[Run::Text {
                style: red(),
                text: "abcd".into()
            }]
        );
    }

    #[test]
    fn extended_colors_are_decoded() {
        let mut style = Style::default();
        style.apply_sgr(&[38, 5, 196, 48, 2, 1, 2, 3, 1]);
        assert_eq!(style.fg.map(Color::to_rgb), Some((255, 0, 0)));
        assert_eq!(style.bg, Some(Color::Rgb(1, 2, 3)));
        assert!(style.bold);
        style.apply_sgr(&[22, 39]);
        assert!(!style.bold);
        assert_eq!(style.fg, None);
    }

    #[test]
    fn markup_is_escaped_outside_raw_spans() {
        let html = ansi_to_html_lines(
            "<b>&</b>__HYPERFOIL_RAW_HTML_START__<iframe src=\"x\"></iframe>__HYPERFOIL_RAW_HTML_END__!",
        );
        assert_eq!(
            html,
            vec!["&lt;b&gt;&amp;&lt;/b&gt;<iframe src=\"x\"></iframe>!"]
        );
    }

    #[test]
    fn raw_spans_are_sequential_and_not_split_on_newlines() {
        let segments = split_raw_html(
            "a__HYPERFOIL_RAW_HTML_START__<p>\n</p>__HYPERFOIL_RAW_HTML_END__b__HYPERFOIL_RAW_HTML_START__<hr>",
        );
        assert_eq!(
            segments,
            vec![
                Segment::Text("a"),
                Segment::Raw("<p>\n</p>"),
                Segment::Text("b"),
                Segment::Raw("<hr>"),
            ]
        );
    }

    #[test]
    fn non_sgr_sequences_are_dropped() {
        let html = ansi_to_html_lines("a\u{1b}[5Cb\u{1b}[?25lc");
        assert_eq!(html, vec!["abc"]);
    }

    #[test]
    fn pop_char_removes_from_interrupted_run() {
        let mut line = RenderedLine::new();
        line.push_text(Style::default(), "$ ");
        line.push_interrupted("ab");
        assert_eq!(line.pop_char(), Some('b'));
        assert_eq!(line.pop_char(), Some('a'));
        assert_eq!(line.runs().len(), 1);
        assert_eq!(line.pop_char(), Some(' '));
    }

    #[test]
    fn raw_runs_are_not_popped() {
        let mut line = RenderedLine::new();
        line.push_raw("<hr>");
        assert_eq!(line.pop_char(), None);
        assert_eq!(line.runs().len(), 1);
    }

    #[test]
    fn clear_keeps_line_and_remove_drops_it() {
        let mut transcript = Transcript::new();
        transcript.write("one\ntwo");
        assert_eq!(transcript.clear_last(), Some(Effect::ClearLastLine));
        assert_eq!(transcript.html_lines(), vec!["one", ""]);
        assert_eq!(transcript.remove_last(), Some(Effect::RemoveLastLine));
        assert_eq!(transcript.html_lines(), vec!["one"]);
    }

    #[test]
    fn scrollback_is_bounded() {
        let mut transcript = Transcript::with_scrollback(3);
        transcript.write("1\n2\n3\n4\n5");
        assert_eq!(transcript.html_lines(), vec!["3", "4", "5"]);
    }
}
