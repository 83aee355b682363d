use crossterm::cursor::{MoveLeft, MoveTo, MoveToColumn, MoveUp};
use crossterm::style::{
    Attribute, Color as TermColor, Print, ResetColor, SetAttribute, SetBackgroundColor,
    SetForegroundColor,
};
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{execute, queue};
use std::collections::VecDeque;
use std::io::{self, Write};
use tracing::warn;

use crate::client::output::Run;
use crate::client::{Color, InputView, RenderedLine, Renderer, Style, Surface};
use crate::session::TransportState;
use crate::terminal::prompt::PromptView;
use crate::upload::UploadSlotView;

/// Lines kept for redrawing after the tail line is removed.
const HISTORY: usize = 256;
const PAGER_HINT: &str = " q/Esc: quit  Up/Down/PgUp/PgDn: scroll ";
const EDITOR_HINT: &str = "[editing: Ctrl-E opens the editor, Ctrl-S saves, Esc cancels] ";

enum Deferred {
    Append(RenderedLine),
    Update(RenderedLine),
    Clear,
    Remove,
}

struct PagerView {
    text: String,
    offset: usize,
}

/// Line-oriented renderer: finished lines scroll up the normal screen and the
/// last line is redrawn in place together with the input field. The pager
/// takes over the alternate screen; transcript updates arriving meanwhile are
/// replayed when it closes.
pub struct TerminalRenderer<W: Write> {
    out: W,
    lines: VecDeque<RenderedLine>,
    input: InputView,
    prompt: Option<PromptView>,
    status: TransportState,
    pager: Option<PagerView>,
    deferred: Vec<Deferred>,
    editing: bool,
    upload_slots: Vec<UploadSlotView>,
    height: u16,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, height: u16) -> Self {
        Self {
            out,
            lines: VecDeque::new(),
            input: InputView::default(),
            prompt: None,
            status: TransportState::Connecting,
            pager: None,
            deferred: Vec::new(),
            editing: false,
            upload_slots: Vec::new(),
            height,
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn set_prompt(&mut self, prompt: Option<PromptView>) {
        if self.prompt == prompt {
            return;
        }
        self.prompt = prompt;
        self.redraw();
    }

    pub fn resize(&mut self, height: u16) {
        self.height = height;
        self.redraw();
    }

    pub fn scroll_pager(&mut self, delta: isize) {
        let rows = self.pager_rows();
        let Some(pager) = self.pager.as_mut() else {
            return;
        };
        let total = pager.text.split('\n').count();
        let max_offset = total.saturating_sub(rows);
        pager.offset = pager.offset.saturating_add_signed(delta).min(max_offset);
        let result = self.draw_pager();
        self.report(result);
    }

    pub fn page_rows(&self) -> isize {
        self.pager_rows() as isize
    }

    pub fn redraw(&mut self) {
        let result = if self.pager.is_some() {
            self.draw_pager()
        } else {
            self.draw_tail(true)
        };
        self.report(result);
    }

    fn report(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            warn!(target: "terminal::render", error = %err, "terminal write failed");
        }
    }

    fn pager_rows(&self) -> usize {
        usize::from(self.height.saturating_sub(1)).max(1)
    }

    fn draw_tail(&mut self, decorated: bool) -> io::Result<()> {
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        if let Some(line) = self.lines.back() {
            write_runs(&mut self.out, line)?;
        }
        if decorated {
            if self.editing {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Dim),
                    Print(EDITOR_HINT),
                    SetAttribute(Attribute::Reset)
                )?;
            }
            if self.status != TransportState::Open {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Dim),
                    Print(format!("[{}] ", self.status.as_str())),
                    SetAttribute(Attribute::Reset)
                )?;
            }
            if let Some(prompt) = &self.prompt {
                if !self.upload_slots.is_empty() {
                    let attached = self
                        .upload_slots
                        .iter()
                        .filter(|slot| slot.attached.is_some())
                        .count();
                    queue!(
                        self.out,
                        Print(format!("[{attached}/{} files] ", self.upload_slots.len()))
                    )?;
                }
                queue!(
                    self.out,
                    SetAttribute(Attribute::Bold),
                    Print(&prompt.label),
                    SetAttribute(Attribute::Reset),
                    Print(&prompt.text)
                )?;
                let back = prompt.text.chars().count().saturating_sub(prompt.cursor);
                move_back(&mut self.out, back)?;
            } else if self.input.attached {
                queue!(self.out, Print(&self.input.text))?;
                let back = self.input.text.chars().count().saturating_sub(self.input.cursor);
                move_back(&mut self.out, back)?;
            }
        }
        self.out.flush()
    }

    fn draw_pager(&mut self) -> io::Result<()> {
        let rows = self.pager_rows();
        let Some(pager) = &self.pager else {
            return Ok(());
        };
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        for (row, line) in pager.text.split('\n').skip(pager.offset).take(rows).enumerate() {
            queue!(
                self.out,
                MoveTo(0, row as u16),
                Print(line.trim_end_matches('\r')),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }
        queue!(
            self.out,
            MoveTo(0, rows as u16),
            SetAttribute(Attribute::Reverse),
            Print(PAGER_HINT),
            SetAttribute(Attribute::Reset)
        )?;
        self.out.flush()
    }

    fn try_append(&mut self, line: &RenderedLine) -> io::Result<()> {
        if !self.lines.is_empty() {
            self.draw_tail(false)?;
            queue!(self.out, Print("\r\n"))?;
        }
        self.lines.push_back(line.clone());
        while self.lines.len() > HISTORY {
            self.lines.pop_front();
        }
        self.draw_tail(true)
    }

    fn try_remove(&mut self) -> io::Result<()> {
        self.lines.pop_back();
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        if !self.lines.is_empty() {
            queue!(self.out, MoveUp(1))?;
        }
        self.draw_tail(true)
    }

    fn replay_deferred(&mut self) {
        for deferred in std::mem::take(&mut self.deferred) {
            match deferred {
                Deferred::Append(line) => self.append_line(&line),
                Deferred::Update(line) => self.update_last_line(&line),
                Deferred::Clear => self.clear_last_line(),
                Deferred::Remove => self.remove_last_line(),
            }
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn append_line(&mut self, line: &RenderedLine) {
        if self.pager.is_some() {
            self.deferred.push(Deferred::Append(line.clone()));
            return;
        }
        let result = self.try_append(line);
        self.report(result);
    }

    fn update_last_line(&mut self, line: &RenderedLine) {
        if self.pager.is_some() {
            self.deferred.push(Deferred::Update(line.clone()));
            return;
        }
        match self.lines.back_mut() {
            Some(last) => *last = line.clone(),
            None => self.lines.push_back(line.clone()),
        }
        let result = self.draw_tail(true);
        self.report(result);
    }

    fn clear_last_line(&mut self) {
        if self.pager.is_some() {
            self.deferred.push(Deferred::Clear);
            return;
        }
        if let Some(last) = self.lines.back_mut() {
            last.clear();
        }
        let result = self.draw_tail(true);
        self.report(result);
    }

    fn remove_last_line(&mut self) {
        if self.pager.is_some() {
            self.deferred.push(Deferred::Remove);
            return;
        }
        let result = self.try_remove();
        self.report(result);
    }

    fn show_surface(&mut self, surface: Surface) {
        match surface {
            Surface::Pager => {
                if self.pager.is_none() {
                    let result = execute!(self.out, EnterAlternateScreen);
                    self.report(result);
                    self.pager = Some(PagerView {
                        text: String::new(),
                        offset: 0,
                    });
                }
            }
            Surface::Editor => self.editing = true,
            Surface::UploadTrigger | Surface::UploadForm => {}
        }
        self.redraw();
    }

    fn hide_surface(&mut self, surface: Surface) {
        match surface {
            Surface::Pager => {
                if self.pager.take().is_some() {
                    let result = execute!(self.out, LeaveAlternateScreen);
                    self.report(result);
                    self.replay_deferred();
                }
            }
            Surface::Editor => self.editing = false,
            Surface::UploadForm => self.upload_slots.clear(),
            Surface::UploadTrigger => {}
        }
        self.redraw();
    }

    fn set_pager(&mut self, text: &str) {
        if let Some(pager) = self.pager.as_mut() {
            pager.text = text.to_string();
            pager.offset = 0;
            let result = self.draw_pager();
            self.report(result);
        }
    }

    fn append_pager(&mut self, text: &str) {
        if let Some(pager) = self.pager.as_mut() {
            pager.text.push_str(text);
            let result = self.draw_pager();
            self.report(result);
        }
    }

    fn set_input(&mut self, view: &InputView) {
        self.input = view.clone();
        if self.pager.is_none() {
            let result = self.draw_tail(true);
            self.report(result);
        }
    }

    fn show_upload_form(&mut self, slots: &[UploadSlotView]) {
        self.upload_slots = slots.to_vec();
        self.redraw();
    }

    fn request_notification(&mut self, title: &str, body: &str) {
        let result = queue!(
            self.out,
            Print(format!(
                "\u{1b}]777;notify;{};{}\u{7}",
                notification_text(title),
                notification_text(body)
            ))
        )
        .and_then(|_| self.out.flush());
        self.report(result);
    }

    fn set_status(&mut self, state: TransportState) {
        self.status = state;
        self.redraw();
    }
}

fn move_back<W: Write>(out: &mut W, columns: usize) -> io::Result<()> {
    // A zero count still moves one column on most terminals.
    if columns > 0 {
        queue!(out, MoveLeft(columns.min(u16::MAX as usize) as u16))?;
    }
    Ok(())
}

fn write_runs<W: Write>(out: &mut W, line: &RenderedLine) -> io::Result<()> {
    for run in line.runs() {
        match run {
            Run::Text { style, text } => {
                apply_style(out, style)?;
                queue!(out, Print(text))?;
                if !style.is_plain() {
                    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
                }
            }
            Run::Interrupted(text) => queue!(
                out,
                Print(text),
                SetAttribute(Attribute::Dim),
                Print("^C"),
                SetAttribute(Attribute::Reset)
            )?,
            Run::Raw(html) => queue!(out, Print(strip_markup(html)))?,
        }
    }
    Ok(())
}

fn apply_style<W: Write>(out: &mut W, style: &Style) -> io::Result<()> {
    if let Some(fg) = style.fg {
        queue!(out, SetForegroundColor(term_color(fg)))?;
    }
    if let Some(bg) = style.bg {
        queue!(out, SetBackgroundColor(term_color(bg)))?;
    }
    if style.bold {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if style.faint {
        queue!(out, SetAttribute(Attribute::Dim))?;
    }
    if style.italic {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if style.underline {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    Ok(())
}

fn term_color(color: Color) -> TermColor {
    match color {
        Color::Indexed(idx) => TermColor::AnsiValue(idx),
        Color::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
    }
}

/// Text content of server-provided markup.
pub(crate) fn strip_markup(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn notification_text(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() || ch == ';' { ' ' } else { ch })
        .collect()
}

/// Raw mode for the lifetime of the guard.
pub struct RawModeGuard(bool);

impl RawModeGuard {
    pub fn new(enable: bool) -> Self {
        if !enable {
            return Self(false);
        }
        match enable_raw_mode() {
            Ok(()) => Self(true),
            Err(err) => {
                warn!(target: "terminal::render", error = %err, "failed to enable raw mode");
                Self(false)
            }
        }
    }

    /// Hands the terminal to another program until [`RawModeGuard::resume`].
    pub fn suspend(&self) -> io::Result<()> {
        if self.0 { disable_raw_mode() } else { Ok(()) }
    }

    pub fn resume(&self) -> io::Result<()> {
        if self.0 { enable_raw_mode() } else { Ok(()) }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.0 {
            let _ = disable_raw_mode();
            let mut stdout = io::stdout();
            let _ = execute!(stdout, Print("\r\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> TerminalRenderer<Vec<u8>> {
        TerminalRenderer::new(Vec::new(), 24)
    }

    fn line(text: &str) -> RenderedLine {
        let mut line = RenderedLine::new();
        line.push_text(Style::default(), text);
        line
    }

    fn output(renderer: &TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8_lossy(renderer.writer()).into_owned()
    }

    #[test]
    fn appended_lines_are_separated_by_crlf() {
        let mut renderer = renderer();
        renderer.append_line(&line("first"));
        renderer.append_line(&line("second"));
        let out = output(&renderer);
        let first = out.find("first").unwrap();
        let second = out.rfind("second").unwrap();
        assert!(out[first..second].contains("\r\n"));
    }

    #[test]
    fn attached_input_follows_the_last_line() {
        let mut renderer = renderer();
        renderer.set_status(TransportState::Open);
        renderer.append_line(&line("[hyperfoil]$ "));
        renderer.set_input(&InputView {
            text: "status".into(),
            cursor: 6,
            attached: true,
            focused: true,
        });
        assert!(output(&renderer).ends_with("[hyperfoil]$ status"));
    }

    #[test]
    fn pager_defers_transcript_updates() {
        let mut renderer = renderer();
        renderer.show_surface(Surface::Pager);
        renderer.set_pager("page one\npage two");
        renderer.append_line(&line("later"));
        let during = output(&renderer);
        assert!(during.contains("\u{1b}[?1049h"));
        assert!(during.contains("page two"));
        assert!(!during.contains("later"));

        renderer.hide_surface(Surface::Pager);
        let after = output(&renderer);
        assert!(after.contains("\u{1b}[?1049l"));
        assert!(after.contains("later"));
    }

    #[test]
    fn styled_runs_reset_afterwards() {
        let mut renderer = renderer();
        let mut red = RenderedLine::new();
        red.push_text(
            Style {
                fg: Some(Color::Indexed(1)),
                ..Style::default()
            },
            "error",
        );
        renderer.append_line(&red);
        let out = output(&renderer);
        let start = out.find("error").unwrap();
        assert!(out[..start].contains("\u{1b}[38;5;1m"));
        assert!(out[start..].contains("\u{1b}[0m"));
    }

    #[test]
    fn markup_is_reduced_to_text() {
        assert_eq!(
            strip_markup("<a href=\"/x\">report &amp; stats</a>"),
            "report & stats"
        );
        assert_eq!(strip_markup("&lt;b&gt;"), "<b>");
    }

    #[test]
    fn notification_uses_terminal_escape() {
        let mut renderer = renderer();
        renderer.request_notification("Hyperfoil", "run 0001; done\n");
        assert!(output(&renderer).contains("\u{1b}]777;notify;Hyperfoil;run 0001  done "));
    }
}
