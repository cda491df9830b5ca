//! Streaming column decoder.
//!
//! [`ColumnDecoder`] pulls decoded chars from [`Utf8StreamDecoder`] into a
//! fixed-capacity input buffer and scans one column value per
//! [`next_column`] call, assembling content through [`TextAccumulator`].
//!
//! The scan is run-based: within the input buffer the decoder only advances
//! an index, and content is committed in bulk at boundaries — the end of
//! the value (a zero-copy shared span when nothing forced a copy), an
//! escape or doubled quote (decoded content differs from the raw input), or
//! a refill (the buffer is about to be overwritten). Values that cross a
//! refill continue in the accumulator's owned segment chain.
//!
//! State persisting between calls is limited to `BetweenColumns` and
//! `PendingLineEnd`; a pending line end is consumed at the start of the
//! *next* call (treating `\r\n` as one unit, peeking across a refill when
//! needed) so that the caller sees the record boundary as a `None` column.
//!
//! [`next_column`]: ColumnDecoder::next_column

use std::io;
use std::rc::Rc;

use crate::accum::TextAccumulator;
use crate::error::{CsvError, DecodeError, DecodeErrorKind, Location};
use crate::number::NumberCoercion;
use crate::options::CsvOptions;
use crate::pool::{BufferPool, NoopPool};
use crate::utf8::{BYTE_BUFFER_LEN, Utf8StreamDecoder};

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

/// Default capacity of the char input buffer.
pub(crate) const INPUT_BUFFER_LEN: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    BetweenColumns,
    InUnquotedValue,
    InQuotedValue,
    AfterClosingQuote,
    PendingLineEnd,
}

/// Streaming decoder producing one column value (or end-of-record) per
/// call.
///
/// A decoder serves exactly one logical stream and must not be shared
/// across concurrent callers. Buffers are acquired from the pool on
/// construction and released exactly once by [`close`](Self::close)
/// (idempotent, also invoked on drop).
pub struct ColumnDecoder<R: io::Read> {
    reader: Utf8StreamDecoder<R>,
    input: Vec<char>,
    pos: usize,
    end: usize,
    /// Chars consumed before `input[0]`, for global positions.
    chars_before: u64,
    eof: bool,
    state: DecodeState,
    at_record_start: bool,
    accum: TextAccumulator,
    numbers: NumberCoercion,
    line: u64,
    /// Global char index where the current line began.
    line_start: u64,
    token_line: u64,
    token_column: u64,
    separator: char,
    quote: Option<char>,
    escape: Option<char>,
    trim_spaces: bool,
    allow_comments: bool,
    pool: Rc<dyn BufferPool>,
    closed: bool,
}

impl<R: io::Read> ColumnDecoder<R> {
    /// Creates a decoder with a private, non-recycling buffer pool.
    #[must_use]
    pub fn new(source: R, options: &CsvOptions) -> Self {
        Self::with_pool(source, options, Rc::new(NoopPool))
    }

    /// Creates a decoder drawing its buffers from `pool`.
    #[must_use]
    pub fn with_pool(source: R, options: &CsvOptions, pool: Rc<dyn BufferPool>) -> Self {
        Self::with_capacities(source, options, pool, BYTE_BUFFER_LEN, INPUT_BUFFER_LEN)
    }

    /// Creates a decoder with explicit byte and char buffer capacities.
    #[must_use]
    pub fn with_capacities(
        source: R,
        options: &CsvOptions,
        pool: Rc<dyn BufferPool>,
        byte_capacity: usize,
        char_capacity: usize,
    ) -> Self {
        let reader = Utf8StreamDecoder::with_capacity(source, Rc::clone(&pool), byte_capacity);
        let input = pool.acquire_chars(char_capacity.max(8));
        Self {
            reader,
            input,
            pos: 0,
            end: 0,
            chars_before: 0,
            eof: false,
            state: DecodeState::BetweenColumns,
            at_record_start: true,
            accum: TextAccumulator::new(),
            numbers: NumberCoercion::default(),
            line: 1,
            line_start: 0,
            token_line: 1,
            token_column: 1,
            separator: options.separator,
            quote: options.quote,
            escape: options.escape,
            trim_spaces: options.trim_spaces,
            allow_comments: options.allow_comments,
            pool,
            closed: false,
        }
    }

    /// Advances to the next record: drains any remaining columns of the
    /// current one, consumes the pending line end, skips comment lines, and
    /// reports whether another record exists.
    ///
    /// # Errors
    ///
    /// Propagates any error [`next_column`](Self::next_column) can raise.
    pub fn next_record(&mut self) -> Result<bool, CsvError> {
        if !self.at_record_start {
            while self.next_column()?.is_some() {}
        }
        self.begin_record()
    }

    /// Decodes the next column of the current record.
    ///
    /// Returns `Ok(None)` once the record is exhausted (consuming its line
    /// end); the following call starts the next record. At end of input the
    /// decoder keeps returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// I/O and UTF-8 errors from the underlying decoder propagate; grammar
    /// violations raise [`CsvError::Decode`]. All of these are fatal for
    /// the stream.
    pub fn next_column(&mut self) -> Result<Option<&str>, CsvError> {
        if self.state == DecodeState::PendingLineEnd {
            self.consume_line_end()?;
            self.state = DecodeState::BetweenColumns;
            self.at_record_start = true;
            return Ok(None);
        }
        if self.at_record_start {
            if !self.begin_record()? {
                return Ok(None);
            }
            self.at_record_start = false;
        }
        self.accum.reset();
        self.numbers.reset();
        if self.trim_spaces {
            self.skip_leading_spaces()?;
        }
        self.mark_token_start();
        let Some(ch) = self.peek()? else {
            // A separator ran into end of input: one trailing empty column.
            self.accum.set_text("");
            self.state = DecodeState::PendingLineEnd;
            return Ok(Some(self.current_contents()));
        };
        if Some(ch) == self.quote {
            self.read_quoted_value()?;
        } else if ch == self.separator {
            self.pos += 1;
            self.accum.set_text("");
        } else if ch == '\r' || ch == '\n' {
            self.accum.set_text("");
            self.state = DecodeState::PendingLineEnd;
        } else {
            self.read_unquoted_value()?;
        }
        Ok(Some(self.current_contents()))
    }

    /// The current column as `i32`, narrowing or widening as needed.
    ///
    /// # Errors
    ///
    /// [`CsvError::NumberRange`] outside the target range,
    /// [`CsvError::MalformedNumber`] for unparseable text. Neither corrupts
    /// decoder state.
    pub fn as_i32(&mut self) -> Result<i32, CsvError> {
        let text = self.accum.contents_as_str(&self.input[..self.end]);
        self.numbers.as_i32(text)
    }

    /// The current column as `i64`. Errors as [`as_i32`](Self::as_i32).
    ///
    /// # Errors
    ///
    /// See [`as_i32`](Self::as_i32).
    pub fn as_i64(&mut self) -> Result<i64, CsvError> {
        let text = self.accum.contents_as_str(&self.input[..self.end]);
        self.numbers.as_i64(text)
    }

    /// The current column as an arbitrary-precision integer.
    ///
    /// # Errors
    ///
    /// See [`as_i32`](Self::as_i32).
    pub fn as_big_integer(&mut self) -> Result<BigInt, CsvError> {
        let text = self.accum.contents_as_str(&self.input[..self.end]);
        self.numbers.as_big_integer(text)
    }

    /// The current column as `f64`.
    ///
    /// # Errors
    ///
    /// See [`as_i32`](Self::as_i32).
    pub fn as_f64(&mut self) -> Result<f64, CsvError> {
        let text = self.accum.contents_as_str(&self.input[..self.end]);
        self.numbers.as_f64(text)
    }

    /// The current column as an arbitrary-precision decimal, always derived
    /// from the column text rather than a previously computed double.
    ///
    /// # Errors
    ///
    /// See [`as_i32`](Self::as_i32).
    pub fn as_big_decimal(&mut self) -> Result<BigDecimal, CsvError> {
        let text = self.accum.contents_as_str(&self.input[..self.end]);
        self.numbers.as_big_decimal(text)
    }

    /// Current position, for diagnostics.
    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.global_pos() - self.line_start + 1,
            byte_offset: self.reader.byte_offset(),
        }
    }

    /// Releases pooled buffers. Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.close();
        self.pos = 0;
        self.end = 0;
        self.pool.release_chars(std::mem::take(&mut self.input));
    }

    // ------------------------------------------------------------------
    // Record boundaries
    // ------------------------------------------------------------------

    /// Skips comment lines at a record boundary; `false` at end of input.
    fn begin_record(&mut self) -> Result<bool, CsvError> {
        loop {
            let Some(ch) = self.peek()? else {
                return Ok(false);
            };
            if self.allow_comments && ch == '#' {
                self.skip_comment_line()?;
                continue;
            }
            return Ok(true);
        }
    }

    fn skip_comment_line(&mut self) -> Result<(), CsvError> {
        loop {
            let Some(ch) = self.peek()? else {
                return Ok(());
            };
            if ch == '\r' || ch == '\n' {
                return self.consume_line_end();
            }
            self.pos += 1;
        }
    }

    /// Consumes one line end, treating `\r\n` as a single unit. A no-op at
    /// end of input (a record may end without a terminator).
    fn consume_line_end(&mut self) -> Result<(), CsvError> {
        match self.peek()? {
            Some('\r') => {
                self.pos += 1;
                if self.peek()? == Some('\n') {
                    self.pos += 1;
                }
                self.bump_line();
            }
            Some('\n') => {
                self.pos += 1;
                self.bump_line();
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Value scanning
    // ------------------------------------------------------------------

    fn read_unquoted_value(&mut self) -> Result<(), CsvError> {
        self.state = DecodeState::InUnquotedValue;
        let mut run_start = self.pos;
        let mut spilled = false;
        loop {
            if self.pos >= self.end {
                if self.pos > run_start {
                    self.accum.append_run(&self.input[run_start..self.pos]);
                }
                spilled = true;
                if !self.load_more()? {
                    // Value and record both end at end of input.
                    if self.trim_spaces {
                        self.accum.trim_trailing(&self.input[..self.end]);
                    }
                    self.state = DecodeState::PendingLineEnd;
                    return Ok(());
                }
                run_start = self.pos;
                continue;
            }
            let ch = self.input[self.pos];
            if ch == self.separator {
                self.finish_run(run_start, spilled);
                self.pos += 1;
                self.state = DecodeState::BetweenColumns;
                return Ok(());
            }
            if ch == '\r' || ch == '\n' {
                self.finish_run(run_start, spilled);
                self.state = DecodeState::PendingLineEnd;
                return Ok(());
            }
            if Some(ch) == self.escape {
                if self.pos > run_start {
                    self.accum.append_run(&self.input[run_start..self.pos]);
                }
                spilled = true;
                self.pos += 1;
                self.decode_escape()?;
                run_start = self.pos;
                continue;
            }
            self.pos += 1;
        }
    }

    /// Commits the final run of an unquoted value: a zero-copy shared span
    /// when nothing forced owned accumulation, and trailing trim when
    /// configured.
    fn finish_run(&mut self, run_start: usize, spilled: bool) {
        if spilled {
            if self.pos > run_start {
                self.accum.append_run(&self.input[run_start..self.pos]);
            }
        } else {
            self.accum.finish_shared(run_start, self.pos - run_start);
        }
        if self.trim_spaces {
            self.accum.trim_trailing(&self.input[..self.end]);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn read_quoted_value(&mut self) -> Result<(), CsvError> {
        self.state = DecodeState::InQuotedValue;
        let Some(quote) = self.quote else {
            unreachable!()
        };
        self.pos += 1; // opening quote
        let mut run_start = self.pos;
        let mut spilled = false;
        let mut prev_cr = false;
        loop {
            if self.pos >= self.end {
                if self.pos > run_start {
                    self.accum.append_run(&self.input[run_start..self.pos]);
                }
                spilled = true;
                if !self.load_more()? {
                    return Err(self.error_at_token(DecodeErrorKind::MissingClosingQuote));
                }
                run_start = self.pos;
                continue;
            }
            let ch = self.input[self.pos];
            let was_cr = prev_cr;
            prev_cr = ch == '\r';
            if ch == quote {
                let run_end = self.pos;
                self.pos += 1;
                // Peek for a doubled quote; crossing the buffer spills the
                // pending run first, because the refill invalidates it.
                if self.pos >= self.end {
                    if run_end > run_start {
                        self.accum.append_run(&self.input[run_start..run_end]);
                    }
                    spilled = true;
                    if self.load_more()? && self.input[self.pos] == quote {
                        self.accum.push(quote);
                        self.pos += 1;
                        run_start = self.pos;
                        continue;
                    }
                    // Closing quote; content is already fully accumulated.
                    break;
                }
                if self.input[self.pos] == quote {
                    // Doubled quote: one literal quote, value continues.
                    if run_end > run_start {
                        self.accum.append_run(&self.input[run_start..run_end]);
                    }
                    spilled = true;
                    self.accum.push(quote);
                    self.pos += 1;
                    run_start = self.pos;
                    continue;
                }
                // Closing quote within the buffer.
                if spilled {
                    if run_end > run_start {
                        self.accum.append_run(&self.input[run_start..run_end]);
                    }
                } else {
                    self.accum.finish_shared(run_start, run_end - run_start);
                }
                break;
            }
            if Some(ch) == self.escape {
                if self.pos > run_start {
                    self.accum.append_run(&self.input[run_start..self.pos]);
                }
                spilled = true;
                self.pos += 1;
                self.decode_escape()?;
                run_start = self.pos;
                continue;
            }
            if ch == '\r' || ch == '\n' {
                // Embedded line ends are content, but still count rows.
                self.pos += 1;
                if ch == '\n' && was_cr {
                    self.line_start = self.global_pos();
                } else {
                    self.bump_line();
                }
                continue;
            }
            self.pos += 1;
        }
        self.after_closing_quote()
    }

    /// Only trailing spaces may separate a closing quote from the next
    /// separator or line end.
    fn after_closing_quote(&mut self) -> Result<(), CsvError> {
        self.state = DecodeState::AfterClosingQuote;
        loop {
            let Some(ch) = self.peek()? else {
                self.state = DecodeState::PendingLineEnd;
                return Ok(());
            };
            if ch == self.separator {
                self.pos += 1;
                self.state = DecodeState::BetweenColumns;
                return Ok(());
            }
            if ch == '\r' || ch == '\n' {
                self.state = DecodeState::PendingLineEnd;
                return Ok(());
            }
            if ch == ' ' {
                self.pos += 1;
                continue;
            }
            return Err(self.error_here(DecodeErrorKind::UnexpectedAfterQuote(ch)));
        }
    }

    /// Decodes the character after an escape character: `0`, `n`, `r`, `t`
    /// map to their controls, anything else passes through literally.
    fn decode_escape(&mut self) -> Result<(), CsvError> {
        let Some(ch) = self.peek()? else {
            return Err(self.error_here(DecodeErrorKind::TruncatedEscape));
        };
        self.pos += 1;
        let decoded = match ch {
            '0' => '\0',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            other => other,
        };
        self.accum.push(decoded);
        Ok(())
    }

    fn skip_leading_spaces(&mut self) -> Result<(), CsvError> {
        loop {
            let Some(ch) = self.peek()? else {
                return Ok(());
            };
            if ch != ' ' || self.separator == ' ' {
                return Ok(());
            }
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // Buffer management and positions
    // ------------------------------------------------------------------

    /// Peeks the next char, refilling if the buffer is exhausted. `None`
    /// means end of input.
    fn peek(&mut self) -> Result<Option<char>, CsvError> {
        if self.pos >= self.end && !self.load_more()? {
            return Ok(None);
        }
        Ok(Some(self.input[self.pos]))
    }

    /// Refills the input buffer from the UTF-8 decoder. Any shared column
    /// span still pointing into the buffer is copied out first.
    fn load_more(&mut self) -> Result<bool, CsvError> {
        if self.eof {
            return Ok(false);
        }
        self.accum.ensure_owned(&self.input[..self.end]);
        self.chars_before += self.end as u64;
        let n = self.reader.read(&mut self.input)?;
        self.pos = 0;
        self.end = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    fn global_pos(&self) -> u64 {
        self.chars_before + self.pos as u64
    }

    /// Called after consuming a line end.
    fn bump_line(&mut self) {
        self.line += 1;
        self.line_start = self.global_pos();
    }

    fn mark_token_start(&mut self) {
        self.token_line = self.line;
        self.token_column = self.global_pos() - self.line_start + 1;
    }

    fn current_contents(&mut self) -> &str {
        self.accum.contents_as_str(&self.input[..self.end])
    }

    fn error_here(&self, kind: DecodeErrorKind) -> CsvError {
        DecodeError {
            kind,
            location: self.location(),
        }
        .into()
    }

    /// An error positioned at the start of the current token, for failures
    /// (like a missing closing quote) best reported where the value began.
    fn error_at_token(&self, kind: DecodeErrorKind) -> CsvError {
        DecodeError {
            kind,
            location: Location {
                line: self.token_line,
                column: self.token_column,
                byte_offset: self.reader.byte_offset(),
            },
        }
        .into()
    }
}

impl<R: io::Read> Drop for ColumnDecoder<R> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::ColumnDecoder;
    use crate::error::{CsvError, DecodeErrorKind};
    use crate::options::CsvOptions;
    use crate::pool::{BufferPool, NoopPool, RecyclingPool};

    fn decode(options: &CsvOptions, input: &str) -> Vec<Vec<String>> {
        let mut dec = ColumnDecoder::new(input.as_bytes(), options);
        read_all(&mut dec)
    }

    /// Tiny buffers on both levels force refills inside values.
    fn decode_tiny(options: &CsvOptions, input: &str) -> Vec<Vec<String>> {
        let mut dec = ColumnDecoder::with_capacities(
            input.as_bytes(),
            options,
            Rc::new(NoopPool),
            4,
            8,
        );
        read_all(&mut dec)
    }

    fn read_all(dec: &mut ColumnDecoder<&[u8]>) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        loop {
            match dec.next_record() {
                Ok(true) => {}
                Ok(false) => return records,
                Err(e) => panic!("unexpected error: {e}"),
            }
            let mut record = Vec::new();
            while let Some(text) = dec.next_column().expect("column") {
                record.push(text.to_owned());
            }
            records.push(record);
        }
    }

    #[test]
    fn plain_records() {
        let records = decode(&CsvOptions::default(), "a,b,c\nd,e,f\n");
        assert_eq!(records, vec![vec!["a", "b", "c"], vec!["d", "e", "f"]]);
    }

    #[test]
    fn last_record_without_terminator() {
        let records = decode(&CsvOptions::default(), "a,b\nc,d");
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn crlf_is_one_line_end() {
        let records = decode(&CsvOptions::default(), "a,b\r\nc,d\r\n");
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn empty_columns() {
        let records = decode(&CsvOptions::default(), ",x,\n");
        assert_eq!(records, vec![vec!["", "x", ""]]);
    }

    #[test]
    fn trailing_separator_at_end_of_input() {
        let records = decode(&CsvOptions::default(), "a,");
        assert_eq!(records, vec![vec!["a", ""]]);
    }

    #[test]
    fn quoted_values() {
        let records = decode(&CsvOptions::default(), "\"a,b\",\"c\nd\"\n");
        assert_eq!(records, vec![vec!["a,b", "c\nd"]]);
    }

    #[test]
    fn doubled_quotes_decode_to_one() {
        let records = decode(&CsvOptions::default(), "\"a\"\"b\",\"\"\"\"\n");
        assert_eq!(records, vec![vec!["a\"b", "\""]]);
    }

    #[test]
    fn quoted_line_ends_count_rows() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("\"a\nb\",x\n".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.next_column().unwrap(), Some("a\nb"));
        assert_eq!(dec.location().line, 2);
    }

    #[test]
    fn trailing_spaces_after_closing_quote_are_skipped() {
        let records = decode(&CsvOptions::default(), "\"a\"  ,b\n");
        assert_eq!(records, vec![vec!["a", "b"]]);
    }

    #[test]
    fn garbage_after_closing_quote_is_fatal() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("\"a\"x,b\n".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        match dec.next_column() {
            Err(CsvError::Decode(e)) => {
                assert_eq!(e.kind, DecodeErrorKind::UnexpectedAfterQuote('x'));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_closing_quote_is_fatal() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("\"abc".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        match dec.next_column() {
            Err(CsvError::Decode(e)) => {
                assert_eq!(e.kind, DecodeErrorKind::MissingClosingQuote);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn trimming_applies_to_unquoted_values_only() {
        let options = CsvOptions {
            trim_spaces: true,
            ..Default::default()
        };
        let records = decode(&options, "  foo  ,\"  foo  \"\n");
        assert_eq!(records, vec![vec!["foo", "  foo  "]]);
    }

    #[test]
    fn without_trimming_spaces_are_data() {
        let records = decode(&CsvOptions::default(), " a ,b\n");
        assert_eq!(records, vec![vec![" a ", "b"]]);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let options = CsvOptions {
            allow_comments: true,
            ..Default::default()
        };
        let records = decode(&options, "# header comment\na,b\n#tail\nc,d\n");
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn hash_mid_record_is_data() {
        let options = CsvOptions {
            allow_comments: true,
            ..Default::default()
        };
        let records = decode(&options, "a,#b\n");
        assert_eq!(records, vec![vec!["a", "#b"]]);
    }

    #[test]
    fn comments_disabled_hash_is_data() {
        let records = decode(&CsvOptions::default(), "#a,b\n");
        assert_eq!(records, vec![vec!["#a", "b"]]);
    }

    #[test]
    fn escapes_decode_controls_and_pass_through() {
        let options = CsvOptions {
            escape: Some('\\'),
            ..Default::default()
        };
        let records = decode(&options, "a\\nb,c\\td,e\\qf,\"g\\rh\"\n");
        assert_eq!(records, vec![vec!["a\nb", "c\td", "eqf", "g\rh"]]);
    }

    #[test]
    fn escape_at_end_of_input_is_fatal() {
        let options = CsvOptions {
            escape: Some('\\'),
            ..Default::default()
        };
        let mut dec = ColumnDecoder::new("ab\\".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        match dec.next_column() {
            Err(CsvError::Decode(e)) => {
                assert_eq!(e.kind, DecodeErrorKind::TruncatedEscape);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn values_survive_refill_boundaries() {
        // 8-char input buffer; every value here crosses at least one refill.
        let records = decode_tiny(
            &CsvOptions::default(),
            "abcdefghij,\"klm nopqr stuv\"\n0123456789,x\n",
        );
        assert_eq!(
            records,
            vec![vec!["abcdefghij", "klm nopqr stuv"], vec!["0123456789", "x"]]
        );
    }

    #[test]
    fn multibyte_content_survives_refills() {
        let records = decode_tiny(&CsvOptions::default(), "héllo,\"wörld😀\"\nok,fin\n");
        assert_eq!(records, vec![vec!["héllo", "wörld😀"], vec!["ok", "fin"]]);
    }

    #[test]
    fn doubled_quote_split_by_refill() {
        // The peek for the second quote crosses the refill boundary.
        let records = decode_tiny(&CsvOptions::default(), "\"aaaaaa\"\"b\"\n");
        assert_eq!(records, vec![vec!["aaaaaa\"b"]]);
    }

    #[test]
    fn numeric_accessors_on_columns() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("123,4.5\n".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.next_column().unwrap(), Some("123"));
        assert_eq!(dec.as_i32().unwrap(), 123);
        assert_eq!(dec.as_i64().unwrap(), 123);
        assert_eq!(dec.next_column().unwrap(), Some("4.5"));
        assert_eq!(dec.as_f64().unwrap(), 4.5);
        // A failed narrowing leaves the decoder usable.
        assert!(matches!(dec.as_i32(), Ok(4)));
        assert_eq!(dec.next_column().unwrap(), None);
        assert!(!dec.next_record().unwrap());
    }

    #[test]
    fn blank_line_is_a_single_empty_column() {
        let records = decode(&CsvOptions::default(), "a\n\nb\n");
        assert_eq!(records, vec![vec!["a"], vec![""], vec!["b"]]);
    }

    #[test]
    fn next_record_skips_unread_columns() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("a,b,c\nd,e\n".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.next_column().unwrap(), Some("a"));
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.next_column().unwrap(), Some("d"));
        assert_eq!(dec.next_column().unwrap(), Some("e"));
        assert_eq!(dec.next_column().unwrap(), None);
        assert!(!dec.next_record().unwrap());
    }

    #[test]
    fn quoting_disabled_treats_quotes_as_data() {
        let options = CsvOptions {
            quote: None,
            ..Default::default()
        };
        let records = decode(&options, "\"a\",b\n");
        assert_eq!(records, vec![vec!["\"a\"", "b"]]);
    }

    #[test]
    fn location_tracks_lines_and_columns() {
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::new("ab,c\nde\n".as_bytes(), &options);
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.next_column().unwrap(), Some("ab"));
        let loc = dec.location();
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 4);
        while dec.next_column().unwrap().is_some() {}
        assert!(dec.next_record().unwrap());
        assert_eq!(dec.location().line, 2);
    }

    #[test]
    fn close_returns_buffers_to_the_pool() {
        let pool = Rc::new(RecyclingPool::new(4));
        let options = CsvOptions::default();
        let mut dec = ColumnDecoder::with_pool(
            "a\n".as_bytes(),
            &options,
            Rc::clone(&pool) as Rc<dyn BufferPool>,
        );
        assert!(dec.next_record().unwrap());
        dec.close();
        dec.close();
        drop(dec);
        assert_eq!(pool.retained(), (1, 1));
    }
}
