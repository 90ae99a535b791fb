//! Fenced code block segmentation.
//!
//! Splits free-form model text into prose and code spans. The scanner is
//! called once per revealed character while a reply is animating, so it
//! borrows from the input and never fails: an unterminated fence becomes an
//! open trailing code span that keeps growing until its closing marker
//! arrives.

const FENCE: &str = "```";

/// Language reported for a fence without a usable language tag.
pub const DEFAULT_LANGUAGE: &str = "code";

/// A typed segment of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'a> {
    Text(&'a str),
    Code(CodeSpan<'a>),
}

/// A fenced code block, or the open block at the end of a partial message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSpan<'a> {
    /// Language tag from the opening line, or [`DEFAULT_LANGUAGE`].
    pub language: &'a str,
    /// Text between the opening line and the closing marker.
    pub content: &'a str,
    /// The exact slice of input covered by this block, fences included.
    pub source: &'a str,
    /// Whether the closing marker has been seen.
    pub terminated: bool,
}

impl<'a> Span<'a> {
    /// The slice of the original input this span covers.
    pub fn source(&self) -> &'a str {
        match self {
            Span::Text(text) => text,
            Span::Code(code) => code.source,
        }
    }

    pub fn as_code(&self) -> Option<&CodeSpan<'a>> {
        match self {
            Span::Code(code) => Some(code),
            Span::Text(_) => None,
        }
    }
}

/// Identifier correlating UI state (copy, add to project) with one code span
/// of one message.
pub fn code_id(message_id: u64, index: usize) -> String {
    format!("{}-{}", message_id, index)
}

/// Split `text` into text and code spans in document order.
///
/// Empty input yields a single empty text span. A closed fence is always
/// followed by a text span, which may be empty. A trailing run of one or two
/// backticks is emitted as its own text span because it may turn out to be
/// the start of a fence once more text arrives.
pub fn segment(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(FENCE) {
        let open = pos + offset;
        if open > pos {
            spans.push(Span::Text(&text[pos..open]));
        }

        let (code, end) = scan_block(text, open);
        spans.push(Span::Code(code));
        if !code.terminated {
            return spans;
        }
        pos = end;
    }

    let rest = &text[pos..];
    let body_len = rest.trim_end_matches('`').len();
    let (body, pending) = rest.split_at(body_len);

    if !body.is_empty() {
        spans.push(Span::Text(body));
    } else if pending.is_empty() && !matches!(spans.last(), Some(Span::Text(_))) {
        spans.push(Span::Text(body));
    }
    if !pending.is_empty() {
        spans.push(Span::Text(pending));
    }

    spans
}

/// Scan the block whose opening marker starts at `open`. Returns the span
/// and the byte offset just past it.
fn scan_block(text: &str, open: usize) -> (CodeSpan<'_>, usize) {
    let body_start = open + FENCE.len();
    let body = &text[body_start..];
    let close = body.find(FENCE);
    let newline = body.find('\n');

    match (newline, close) {
        (Some(nl), close) if close.map_or(true, |c| nl < c) => {
            let language = language_tag(&body[..nl]);
            let content_start = nl + 1;
            match close {
                Some(c) => {
                    let end = body_start + c + FENCE.len();
                    let span = CodeSpan {
                        language,
                        content: &body[content_start..c],
                        source: &text[open..end],
                        terminated: true,
                    };
                    (span, end)
                }
                None => {
                    let span = CodeSpan {
                        language,
                        content: &body[content_start..],
                        source: &text[open..],
                        terminated: false,
                    };
                    (span, text.len())
                }
            }
        }
        // Closing marker on the opening line: ```like this```
        (_, Some(c)) => {
            let end = body_start + c + FENCE.len();
            let span = CodeSpan {
                language: DEFAULT_LANGUAGE,
                content: &body[..c],
                source: &text[open..end],
                terminated: true,
            };
            (span, end)
        }
        // Opening line still arriving.
        (_, None) => {
            let span = CodeSpan {
                language: language_tag(body),
                content: "",
                source: &text[open..],
                terminated: false,
            };
            (span, text.len())
        }
    }
}

fn language_tag(line: &str) -> &str {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if !line.is_empty() && line.chars().all(is_word) {
        line
    } else {
        DEFAULT_LANGUAGE
    }
}

/// Concatenate the source of each span. For any input this reproduces the
/// string that was segmented.
pub fn reconstruct(spans: &[Span<'_>]) -> String {
    spans.iter().map(Span::source).collect()
}

/// Code spans with their position in the span sequence.
pub fn code_blocks<'s, 'a>(
    spans: &'s [Span<'a>],
) -> impl Iterator<Item = (usize, &'s CodeSpan<'a>)> + 's {
    spans
        .iter()
        .enumerate()
        .filter_map(|(index, span)| span.as_code().map(|code| (index, code)))
}
