use core::fmt;
use std::io;

use thiserror::Error;

/// Position of the codec within the input stream, for diagnostics.
///
/// `line` and `column` are 1-based; `byte_offset` is the 0-based offset of
/// the next undecoded byte in the underlying source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// 1-based record line number.
    pub line: u64,
    /// 1-based character column within the current line.
    pub column: u64,
    /// 0-based byte offset into the underlying source.
    pub byte_offset: u64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {} (byte {})",
            self.line, self.column, self.byte_offset
        )
    }
}

/// The byte-level failures the UTF-8 stream decoder can report.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8ErrorKind {
    /// A byte that cannot start a UTF-8 sequence (a continuation byte, or
    /// one of the `0xF8..=0xFF` values no sequence uses).
    #[error("invalid UTF-8 lead byte 0x{0:02X}")]
    InvalidLeadByte(u8),
    /// A byte inside a multi-byte sequence that is not of the `10xxxxxx`
    /// continuation form.
    #[error("invalid UTF-8 continuation byte 0x{0:02X}")]
    InvalidContinuationByte(u8),
    /// A well-formed sequence decoding to a non-scalar value (a surrogate,
    /// or a code point above `U+10FFFF`).
    #[error("UTF-8 sequence decodes to invalid code point U+{0:04X}")]
    InvalidCodePoint(u32),
    /// The source ended in the middle of a multi-byte sequence.
    #[error("unexpected end of input inside a multi-byte UTF-8 sequence")]
    UnexpectedEndOfInput,
}

/// A byte-level decode failure, positioned by global byte offset.
///
/// The offset references the lead byte of the offending sequence.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} at byte offset {byte_offset}")]
pub struct Utf8DecodeError {
    /// What went wrong.
    pub kind: Utf8ErrorKind,
    /// Global offset of the lead byte of the offending sequence.
    pub byte_offset: u64,
}

/// Grammar-level failures while scanning column values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// A quoted value was still open when the input ended.
    #[error("missing closing quote before end of input")]
    MissingClosingQuote,
    /// Something other than trailing spaces, a separator, or a line end
    /// followed a closing quote.
    #[error("expected separator or end of line after closing quote, found {0:?}")]
    UnexpectedAfterQuote(char),
    /// The input ended immediately after an escape character.
    #[error("unexpected end of input inside an escape sequence")]
    TruncatedEscape,
}

/// A grammar-level decode failure with full position context.
///
/// These errors are fatal for the stream: the decoder cannot resynchronize
/// and the caller must abandon it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} at {location}")]
pub struct DecodeError {
    /// What went wrong.
    pub kind: DecodeErrorKind,
    /// Where it went wrong.
    pub location: Location,
}

/// All errors surfaced by the codec.
#[derive(Error, Debug)]
pub enum CsvError {
    /// An error from the underlying byte source or sink, propagated
    /// unchanged and never retried.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Malformed UTF-8 in the byte stream.
    #[error(transparent)]
    Utf8(#[from] Utf8DecodeError),
    /// Malformed delimited-text grammar.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A narrowing numeric conversion fell outside the target range. Fatal
    /// only for the accessor call; the decoder state is intact and the text
    /// form is still readable.
    #[error("numeric value {text:?} out of range of {target}")]
    NumberRange {
        /// The column text that failed to narrow.
        text: String,
        /// The requested target representation.
        target: &'static str,
    },
    /// Numeric text failed to parse after it was classified as parseable.
    /// This indicates an internal inconsistency and should be unreachable.
    #[error("internal: numeric text {text:?} failed to parse after classification")]
    MalformedNumber {
        /// The offending column text.
        text: String,
    },
    /// The encoder was handed a column index that has already been written
    /// for the current row.
    #[error("column {index} already written; next expected column is {next}")]
    ColumnOutOfOrder {
        /// The index the caller supplied.
        index: usize,
        /// The next index the encoder would accept for immediate writing.
        next: usize,
    },
}
