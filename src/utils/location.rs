//! Source location tracking for error reporting in the text front end.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A position in source text (line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of input
    pub offset: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// Create a location at the start of the input.
    pub fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span in source text (start and end positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start line (1-indexed)
    pub start_line: usize,
    /// Start column (1-indexed)
    pub start_column: usize,
    /// End line (1-indexed)
    pub end_line: usize,
    /// End column (1-indexed)
    pub end_column: usize,
    /// Byte offset of start
    pub start_offset: usize,
    /// Byte offset of end
    pub end_offset: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a span from start and end locations.
    pub fn from_locations(start: SourceLocation, end: SourceLocation) -> Self {
        Self {
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
            start_offset: start.offset,
            end_offset: end.offset,
        }
    }

    /// Get the start location.
    pub fn start(&self) -> SourceLocation {
        SourceLocation::new(self.start_line, self.start_column, self.start_offset)
    }

    /// Get the end location.
    pub fn end(&self) -> SourceLocation {
        SourceLocation::new(self.end_line, self.end_column, self.end_offset)
    }

    /// Merge two spans to create a span covering both.
    pub fn merge(&self, other: &Span) -> Span {
        let start = if self.start_offset <= other.start_offset { self.start() } else { other.start() };
        let end = if self.end_offset >= other.end_offset { self.end() } else { other.end() };
        Span::from_locations(start, end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new(1, 5, 1, 10);
        assert_eq!(format!("{}", span), "1:5-10");

        let span = Span::new(1, 5, 3, 10);
        assert_eq!(format!("{}", span), "1:5-3:10");
    }

    #[test]
    fn test_span_merge() {
        let a = Span::from_locations(SourceLocation::new(1, 1, 0), SourceLocation::new(1, 5, 4));
        let b = Span::from_locations(SourceLocation::new(1, 10, 9), SourceLocation::new(1, 15, 14));
        let merged = a.merge(&b);
        assert_eq!(merged.start_column, 1);
        assert_eq!(merged.end_column, 15);
        assert_eq!(merged.end_offset, 14);
    }
}
