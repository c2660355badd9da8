//! Framing of decoded stream text into content fragments.
//!
//! The backend emits two disciplines for the same class of endpoint: plain
//! text chunks (quote and summary generation) and line-oriented frames where
//! content lines carry a `data: ` prefix (the chat endpoint). The contract is
//! not negotiated anywhere, so both are modeled explicitly and each call site
//! picks its [`Framing`].
//!
//! In line mode, a line split across chunk boundaries is buffered until its
//! terminator arrives; partial lines are never parsed.

/// Literal prefix marking a content line in line-framed streams.
///
/// Matching is an exact prefix match, never a heuristic: a line is either a
/// marker line (its remainder is content) or it is taken verbatim.
pub const DATA_MARKER: &str = "data: ";

/// Framing discipline of a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Every decoded chunk is content, appended verbatim.
    #[default]
    Raw,
    /// Line-oriented frames: `data: `-prefixed lines contribute their
    /// remainder, other non-empty lines contribute verbatim, blank lines
    /// separate frames and contribute nothing.
    Lines,
}

/// Stateful parser turning decoded text into content fragments.
#[derive(Debug)]
pub struct FrameParser {
    framing: Framing,
    /// Unterminated tail of the last chunk, waiting for its newline.
    line_buffer: String,
}

impl FrameParser {
    /// Create a parser for the given framing discipline.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            line_buffer: String::new(),
        }
    }

    /// The discipline this parser was created with.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Consume decoded text and return the content fragments it completes.
    ///
    /// Raw mode passes the text through as a single fragment. Line mode
    /// buffers and emits one fragment per completed content line; empty
    /// fragments are never emitted.
    pub fn feed(&mut self, text: &str) -> Vec<String> {
        match self.framing {
            Framing::Raw => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
            Framing::Lines => {
                self.line_buffer.push_str(text);
                let mut fragments = Vec::new();
                while let Some(pos) = self.line_buffer.find('\n') {
                    let rest = self.line_buffer.split_off(pos + 1);
                    let mut line = std::mem::replace(&mut self.line_buffer, rest);
                    line.truncate(pos);
                    if let Some(fragment) = parse_line(line.trim_end_matches('\r')) {
                        fragments.push(fragment.to_string());
                    }
                }
                fragments
            }
        }
    }

    /// Flush the parser at end of stream.
    ///
    /// A final line without a terminator is parsed here.
    pub fn finish(&mut self) -> Option<String> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.line_buffer);
        parse_line(tail.trim_end_matches('\r')).map(str::to_string)
    }
}

/// Extract the content of one complete line, if any.
fn parse_line(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(DATA_MARKER) {
        if rest.is_empty() {
            return None;
        }
        return Some(rest);
    }
    if line.is_empty() {
        return None;
    }
    Some(line)
}
