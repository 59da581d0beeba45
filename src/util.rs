//! Small utilities shared across the compiler: source spans and the `debug!`
//! tracing macro. Spans use 0-based line/column numbers everywhere, including
//! in rendered error messages.

use nom_locate::LocatedSpan;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Formatter};

/// The raw input type fed to the parser. Wraps the source text and tracks
/// position/line information as the parser consumes it.
pub(crate) type RawSpan<'a> = LocatedSpan<&'a str>;

/// A range of the original source code. Attached to AST nodes and errors so
/// that diagnostics can point at the offending text. Lines and columns are
/// 0-based.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start of the span
    pub offset: usize,
    /// Length of the span, in bytes
    pub length: usize,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    /// Build a span covering an entire consumed fragment.
    pub(crate) fn from_raw_span(raw_span: &RawSpan<'_>) -> Self {
        let fragment = raw_span.fragment();
        let start_line = raw_span.location_line() as usize - 1;
        let start_col = raw_span.get_utf8_column() - 1;

        // Walk the fragment to find where the span ends. Most spans are
        // single-line so this loop is short.
        let mut end_line = start_line;
        let mut end_col = start_col;
        for c in fragment.chars() {
            if c == '\n' {
                end_line += 1;
                end_col = 0;
            } else {
                end_col += 1;
            }
        }

        Self {
            offset: raw_span.location_offset(),
            length: fragment.len(),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Build a zero-length span pointing at the given input position. Used
    /// for syntax errors, where the "span" is just the place we got stuck.
    pub(crate) fn from_position(raw_span: &RawSpan<'_>) -> Self {
        let line = raw_span.location_line() as usize - 1;
        let col = raw_span.get_utf8_column() - 1;
        Self {
            offset: raw_span.location_offset(),
            length: 0,
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }

    /// Get the slice of source code that this span covers.
    pub fn get_source_slice<'a>(&self, src: &'a str) -> &'a str {
        &src[self.offset..self.offset + self.length]
    }
}

/// Write the source line containing `span`, with a caret line underneath
/// pointing at the spanned columns. Used by the alternate (`{:#}`) error
/// format.
pub(crate) fn fmt_src_highlights(
    f: &mut Formatter<'_>,
    span: &Span,
    source: &str,
) -> fmt::Result {
    let line = match source.lines().nth(span.start_line) {
        Some(line) => line,
        // Past the end of the source (e.g. an EOF error); nothing to show
        None => return Ok(()),
    };

    let caret_count = if span.length == 0 || span.end_line > span.start_line {
        1
    } else {
        span.end_col - span.start_col
    };
    writeln!(f)?;
    writeln!(f, "{}", line)?;
    write!(
        f,
        "{}{}",
        " ".repeat(span.start_col),
        "^".repeat(caret_count.max(1))
    )
}

/// Macro that can wrap any body, and only executes the body if we are running
/// in debug mode. Debug mode is enabled by setting the environment variable
/// DEBUG=true. This compiles away to nothing when --release is used.
#[macro_export]
macro_rules! debug {
    ($arg:expr) => {
        #[cfg(debug_assertions)]
        {
            if let Ok(debug_val) = std::env::var("DEBUG") {
                if debug_val.to_lowercase().as_str() == "true" {
                    $arg
                }
            }
        }
    };
}
