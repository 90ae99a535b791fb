//! Terminal rendering of segmented messages.
//!
//! Messages are turned into ratatui `Text` (prose lines plus framed code
//! blocks labelled with their code id) and written to stdout as ANSI. The
//! reveal renderer redraws the growing reply in place on every tick.

use std::io::{self, Write as _};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    terminal::{size as terminal_size, Clear, ClearType},
    ExecutableCommand,
};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use unicode_width::UnicodeWidthStr;

use copilot_core::segment::{self, code_id, CodeSpan};
use copilot_core::{Message, Preview, Role};

const CURSOR: &str = "▌";

fn code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn frame_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// Build styled lines for a segmented message. `revealing` marks the end of
/// the text with a cursor.
pub fn render_spans(message_id: u64, spans: &[segment::Span<'_>], revealing: bool) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut after_block = false;

    for (index, span) in spans.iter().enumerate() {
        match span {
            segment::Span::Text(text) => {
                // The newline that ends a closing fence line is already
                // accounted for by the block frame.
                let text = if after_block {
                    text.strip_prefix('\n').unwrap_or(text)
                } else {
                    text
                };
                after_block = false;

                let mut pieces = text.split('\n').peekable();
                while let Some(piece) = pieces.next() {
                    if !piece.is_empty() {
                        current.push(Span::raw(piece.to_string()));
                    }
                    if pieces.peek().is_some() {
                        flush_line(&mut lines, &mut current);
                    }
                }
            }
            segment::Span::Code(code) => {
                if !current.is_empty() {
                    flush_line(&mut lines, &mut current);
                }
                push_block(&mut lines, code, &code_id(message_id, index));
                after_block = true;
            }
        }
    }

    if revealing {
        let open_block = spans
            .last()
            .and_then(segment::Span::as_code)
            .is_some_and(|code| !code.terminated);
        if open_block {
            if let Some(last) = lines.last_mut() {
                last.spans.push(Span::styled(CURSOR, frame_style()));
            }
        } else {
            current.push(Span::styled(CURSOR, frame_style()));
        }
    }

    if !current.is_empty() {
        flush_line(&mut lines, &mut current);
    }

    Text::from(lines)
}

fn push_block(lines: &mut Vec<Line<'static>>, code: &CodeSpan<'_>, id: &str) {
    lines.push(Line::from(vec![
        Span::styled("┌─ ", frame_style()),
        Span::styled(
            code.language.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" · {}", id), frame_style()),
    ]));

    let mut body: Vec<&str> = code.content.split('\n').collect();
    if code.terminated && body.last() == Some(&"") {
        body.pop();
    }
    for line in body {
        lines.push(Line::from(vec![
            Span::styled("│ ", frame_style()),
            Span::styled(line.to_string(), code_style()),
        ]));
    }

    if code.terminated {
        lines.push(Line::from(Span::styled("└─", frame_style())));
    }
}

fn flush_line(lines: &mut Vec<Line<'static>>, spans: &mut Vec<Span<'static>>) {
    lines.push(Line::from(std::mem::take(spans)));
}

/// Rendered width of a line in terminal columns.
fn line_width(line: &Line) -> usize {
    line.spans
        .iter()
        .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
        .sum()
}

/// Terminal rows `text` occupies once wrapped at `width` columns.
pub fn visual_rows(text: &Text, width: usize) -> usize {
    let width = width.max(1);
    text.lines
        .iter()
        .map(|line| line_width(line).div_ceil(width).max(1))
        .sum()
}

/// Convert ratatui `Text` to an ANSI-escaped string for direct terminal output.
pub fn text_to_ansi(text: &Text) -> String {
    let mut out = String::new();
    for (i, line) in text.lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for span in &line.spans {
            let sgr = style_to_ansi(&span.style);
            if sgr.is_empty() {
                out.push_str(&span.content);
            } else {
                out.push_str(&sgr);
                out.push_str(&span.content);
                out.push_str("\x1b[0m");
            }
        }
    }
    out
}

/// Convert a ratatui Style to an ANSI SGR escape sequence.
fn style_to_ansi(style: &Style) -> String {
    let mut codes = Vec::new();

    if style.add_modifier.contains(Modifier::BOLD) {
        codes.push("1".to_string());
    }
    if style.add_modifier.contains(Modifier::DIM) {
        codes.push("2".to_string());
    }
    if let Some(code) = style.fg.and_then(color_to_ansi_fg) {
        codes.push(code);
    }

    if codes.is_empty() {
        String::new()
    } else {
        format!("\x1b[{}m", codes.join(";"))
    }
}

fn color_to_ansi_fg(color: Color) -> Option<String> {
    match color {
        Color::Red => Some("31".to_string()),
        Color::Green => Some("32".to_string()),
        Color::Yellow => Some("33".to_string()),
        Color::Blue => Some("34".to_string()),
        Color::Magenta => Some("35".to_string()),
        Color::Cyan => Some("36".to_string()),
        Color::White | Color::Gray => Some("37".to_string()),
        Color::DarkGray => Some("90".to_string()),
        Color::Indexed(n) => Some(format!("38;5;{}", n)),
        Color::Rgb(r, g, b) => Some(format!("38;2;{};{};{}", r, g, b)),
        _ => None,
    }
}

fn term_width() -> usize {
    let (width, _) = terminal_size().unwrap_or((80, 24));
    (width as usize).max(20)
}

fn role_label(role: Role) -> Line<'static> {
    let (label, color) = match role {
        Role::User => ("you", Color::Green),
        Role::Assistant => ("assistant", Color::Cyan),
        Role::System => ("system", Color::Magenta),
    };
    Line::from(Span::styled(
        format!("{}>", label),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

/// Print a complete message with its role label.
pub fn print_message(message: &Message) {
    let spans = segment::segment(&message.content);
    let mut text = Text::from(role_label(message.role));
    text.extend(render_spans(message.id, &spans, false));
    println!("{}\n", text_to_ansi(&text));
}

/// Print the preview panel.
pub fn print_preview(preview: &Preview) {
    let mut lines = vec![Line::from(Span::styled("┌─ preview", frame_style()))];
    for line in preview.code.lines() {
        lines.push(Line::from(vec![
            Span::styled("│ ", frame_style()),
            Span::raw(line.to_string()),
        ]));
    }
    lines.push(Line::from(Span::styled("└─", frame_style())));
    println!("{}\n", text_to_ansi(&Text::from(lines)));
}

/// Redraws a revealing reply in place.
pub struct RevealRenderer {
    /// Rows drawn by the previous frame (for clearing)
    rendered_rows: usize,
    term_width: usize,
}

impl RevealRenderer {
    pub fn new() -> Self {
        Self {
            rendered_rows: 0,
            term_width: term_width(),
        }
    }

    /// Replace the previous frame with `text`.
    pub fn draw(&mut self, text: &Text) -> io::Result<()> {
        self.clear()?;
        let mut stdout = io::stdout();
        print!("{}", text_to_ansi(text));
        stdout.flush()?;
        self.rendered_rows = visual_rows(text, self.term_width);
        Ok(())
    }

    /// Erase the previous frame, leaving the cursor at its first row.
    pub fn clear(&mut self) -> io::Result<()> {
        if self.rendered_rows == 0 {
            return Ok(());
        }
        let mut stdout = io::stdout();
        stdout.execute(MoveToColumn(0))?;
        stdout.execute(Clear(ClearType::CurrentLine))?;
        for _ in 1..self.rendered_rows {
            stdout.execute(MoveUp(1))?;
            stdout.execute(Clear(ClearType::CurrentLine))?;
        }
        self.rendered_rows = 0;
        Ok(())
    }

    /// Keep the last frame and move past it.
    pub fn finish(&mut self) {
        if self.rendered_rows > 0 {
            println!("\n");
        }
        self.rendered_rows = 0;
    }
}

impl Default for RevealRenderer {
    fn default() -> Self {
        Self::new()
    }
}
