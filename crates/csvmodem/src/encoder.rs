//! Streaming column encoder.
//!
//! [`ColumnEncoder`] accepts typed column values keyed by column index,
//! possibly out of declared order, and serializes correctly quoted and
//! escaped delimited text into a fixed-capacity output buffer that is
//! flushed to the sink whenever an operation would overflow it.
//!
//! Values arriving at the expected index are serialized immediately; later
//! indices are parked as [`BufferedScalar`]s in a sparse array and replayed
//! in ascending order when the row ends. The quoting decision is one of two
//! deliberately separate policies (see [`QuoteStyle`]); serialization of a
//! quoted value speculates that it contains no quote character, copying it
//! wholesale and re-encoding from the first quote only when the scan of the
//! copied bytes finds one.

use std::io;
use std::rc::Rc;

use bstr::ByteSlice;

use crate::error::CsvError;
use crate::options::{CsvOptions, QuoteStyle};
use crate::pool::{BufferPool, NoopPool};
use crate::scalar::BufferedScalar;

/// Default capacity of the output buffer, in bytes.
pub(crate) const OUTPUT_BUFFER_LEN: usize = 8 * 1024;

/// Values no longer than this are scanned for quoting; longer values are
/// quoted outright under the loose policy to skip the scan.
const MAX_QUOTE_CHECK: usize = 24;

/// Streaming encoder producing delimited text from column values.
///
/// An encoder serves exactly one logical stream and must not be shared
/// across concurrent callers. The output buffer is acquired from the pool
/// on construction and released exactly once by [`close`](Self::close)
/// (idempotent, also invoked best-effort on drop).
pub struct ColumnEncoder<W: io::Write> {
    sink: W,
    buf: Vec<u8>,
    capacity: usize,
    next_index: usize,
    buffered: Vec<Option<BufferedScalar>>,
    /// Highest buffered column index, when any value is buffered.
    watermark: Option<usize>,
    separator: char,
    quote: Option<char>,
    escape: Option<char>,
    line_separator: String,
    null_literal: String,
    column_count: usize,
    quote_style: QuoteStyle,
    always_quote_strings: bool,
    always_quote_empty: bool,
    write_missing: bool,
    escape_quote_with_escape: bool,
    /// Loose-mode threshold: any char below this code point forces quoting.
    min_safe: u32,
    pool: Rc<dyn BufferPool>,
    closed: bool,
}

impl<W: io::Write> ColumnEncoder<W> {
    /// Creates an encoder with a private, non-recycling buffer pool.
    #[must_use]
    pub fn new(sink: W, options: &CsvOptions) -> Self {
        Self::with_pool(sink, options, Rc::new(NoopPool))
    }

    /// Creates an encoder drawing its output buffer from `pool`.
    #[must_use]
    pub fn with_pool(sink: W, options: &CsvOptions, pool: Rc<dyn BufferPool>) -> Self {
        Self::with_capacity(sink, options, pool, OUTPUT_BUFFER_LEN)
    }

    /// Creates an encoder with an explicit output buffer capacity (raised
    /// to 64 if smaller).
    #[must_use]
    pub fn with_capacity(
        sink: W,
        options: &CsvOptions,
        pool: Rc<dyn BufferPool>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(64);
        let mut buf = pool.acquire_bytes(capacity);
        buf.clear();
        let mut buffered = Vec::new();
        buffered.resize_with(options.column_count, || None);
        Self {
            sink,
            buf,
            capacity,
            next_index: 0,
            buffered,
            watermark: None,
            separator: options.separator,
            quote: options.quote,
            escape: options.escape,
            line_separator: options.line_separator.clone(),
            null_literal: options.null_literal.clone(),
            column_count: options.column_count,
            quote_style: options.quote_style,
            always_quote_strings: options.always_quote_strings,
            always_quote_empty: options.always_quote_empty_strings,
            write_missing: options.write_missing_columns,
            escape_quote_with_escape: options.escape_quote_with_escape,
            min_safe: calc_min_safe(options),
            pool,
            closed: false,
        }
    }

    /// Writes a string column, quoting and escaping as the configured
    /// policy demands.
    ///
    /// # Errors
    ///
    /// I/O errors from the sink; [`CsvError::ColumnOutOfOrder`] when
    /// `index` was already written this row.
    pub fn write_str(&mut self, index: usize, value: &str) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_text_value(value)
        } else {
            self.buffer_value(index, BufferedScalar::Text(value.to_owned()))
        }
    }

    /// Writes pre-formatted text verbatim, bypassing the quoting decision.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_raw_str(&mut self, index: usize, value: &str) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_raw(value)
        } else {
            self.buffer_value(index, BufferedScalar::RawText(value.to_owned()))
        }
    }

    /// Writes an `i32` column as an unquoted literal.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_i32(&mut self, index: usize, value: i32) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_i64(i64::from(value))
        } else {
            self.buffer_value(index, BufferedScalar::Int(value))
        }
    }

    /// Writes an `i64` column as an unquoted literal.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_i64(&mut self, index: usize, value: i64) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_i64(value)
        } else {
            self.buffer_value(index, BufferedScalar::Long(value))
        }
    }

    /// Writes an `f64` column as an unquoted literal.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_f64(&mut self, index: usize, value: f64) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_f64(value)
        } else {
            self.buffer_value(index, BufferedScalar::Double(value))
        }
    }

    /// Writes a boolean column as an unquoted `true`/`false` literal.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_bool(&mut self, index: usize, value: bool) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_raw(if value { "true" } else { "false" })
        } else {
            self.buffer_value(index, BufferedScalar::Bool(value))
        }
    }

    /// Writes a null column as the configured null literal, never quoted.
    ///
    /// # Errors
    ///
    /// As [`write_str`](Self::write_str).
    pub fn write_null(&mut self, index: usize) -> Result<(), CsvError> {
        if index == self.next_index {
            self.next_index += 1;
            self.begin_column(index)?;
            self.append_null()
        } else {
            self.buffer_value(index, BufferedScalar::Null)
        }
    }

    /// Ends the current row: replays buffered out-of-order values in
    /// ascending index order (absent slots contribute only their
    /// separator), pads to the declared column count when configured,
    /// writes the line separator, and resets for the next row.
    ///
    /// # Errors
    ///
    /// I/O errors from the sink.
    pub fn end_row(&mut self) -> Result<(), CsvError> {
        if let Some(high) = self.watermark.take() {
            for index in self.next_index..=high {
                self.begin_column(index)?;
                if let Some(value) = self.buffered[index].take() {
                    self.append_scalar(&value)?;
                }
            }
            self.next_index = high + 1;
        }
        if self.write_missing {
            for index in self.next_index..self.column_count {
                self.begin_column(index)?;
            }
        }
        append_to(
            &mut self.sink,
            &mut self.buf,
            self.capacity,
            self.line_separator.as_bytes(),
        )?;
        self.next_index = 0;
        Ok(())
    }

    /// Drains the output buffer and flushes the sink.
    ///
    /// # Errors
    ///
    /// I/O errors from the sink.
    pub fn flush(&mut self) -> Result<(), CsvError> {
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok(())
    }

    /// Flushes remaining output and releases the pooled buffer. Idempotent;
    /// the buffer is released even when the final flush fails.
    ///
    /// # Errors
    ///
    /// I/O errors from the final flush.
    pub fn close(&mut self) -> Result<(), CsvError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self
            .flush_buffer()
            .and_then(|()| self.sink.flush().map_err(CsvError::from));
        self.pool.release_bytes(std::mem::take(&mut self.buf));
        flushed
    }

    // ------------------------------------------------------------------
    // Out-of-order buffering
    // ------------------------------------------------------------------

    fn buffer_value(&mut self, index: usize, value: BufferedScalar) -> Result<(), CsvError> {
        if index < self.next_index {
            return Err(CsvError::ColumnOutOfOrder {
                index,
                next: self.next_index,
            });
        }
        if index >= self.buffered.len() {
            self.buffered.resize_with(index + 1, || None);
        }
        self.buffered[index] = Some(value);
        self.watermark = Some(self.watermark.map_or(index, |high| high.max(index)));
        Ok(())
    }

    fn append_scalar(&mut self, value: &BufferedScalar) -> Result<(), CsvError> {
        match value {
            BufferedScalar::Text(text) => self.append_text_value(text),
            BufferedScalar::RawText(text) => self.append_raw(text),
            BufferedScalar::Int(v) => self.append_i64(i64::from(*v)),
            BufferedScalar::Long(v) => self.append_i64(*v),
            BufferedScalar::Double(v) => self.append_f64(*v),
            BufferedScalar::Bool(v) => self.append_raw(if *v { "true" } else { "false" }),
            BufferedScalar::Null => self.append_null(),
        }
    }

    // ------------------------------------------------------------------
    // Quoting decision
    // ------------------------------------------------------------------

    fn may_need_quotes(&self, value: &str) -> bool {
        if self.quote.is_none() {
            return false;
        }
        if self.always_quote_strings {
            return true;
        }
        match self.quote_style {
            QuoteStyle::Strict => self.needs_quoting_strict(value),
            QuoteStyle::Loose => self.needs_quoting_loose(value),
        }
    }

    /// Full scan: quote only when the value actually requires it.
    fn needs_quoting_strict(&self, value: &str) -> bool {
        if value.starts_with('#') {
            return true;
        }
        value.chars().any(|ch| {
            ch == self.separator
                || Some(ch) == self.quote
                || ch == '\r'
                || ch == '\n'
                || Some(ch) == self.escape
        })
    }

    /// Threshold scan: long values are quoted without looking, short ones
    /// are scanned against the precomputed minimum safe code point. Empty
    /// values quote only here, never in strict mode.
    fn needs_quoting_loose(&self, value: &str) -> bool {
        if value.is_empty() {
            return self.always_quote_empty;
        }
        if value.len() > MAX_QUOTE_CHECK {
            return true;
        }
        value.chars().any(|ch| (ch as u32) < self.min_safe)
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    fn begin_column(&mut self, index: usize) -> Result<(), CsvError> {
        if index > 0 {
            self.append_char(self.separator)?;
        }
        Ok(())
    }

    fn append_text_value(&mut self, value: &str) -> Result<(), CsvError> {
        if self.may_need_quotes(value) {
            self.append_quoted(value)
        } else {
            self.append_raw(value)
        }
    }

    fn append_quoted(&mut self, value: &str) -> Result<(), CsvError> {
        let Some(quote) = self.quote else {
            return self.append_raw(value);
        };
        self.append_char(quote)?;
        // Speculative fast path: copy the value wholesale and scan the
        // copied bytes; only a quote actually found forces re-encoding.
        if quote.is_ascii() && value.len() + 1 <= self.capacity - self.buf.len() {
            let start = self.buf.len();
            self.buf.extend_from_slice(value.as_bytes());
            if let Some(found) = self.buf[start..].find_byte(quote as u8) {
                self.buf.truncate(start + found);
                self.append_quoted_slow(&value[found..], quote)?;
            }
        } else {
            self.append_quoted_slow(value, quote)?;
        }
        self.append_char(quote)
    }

    /// Char-by-char path handling embedded quotes and mid-value flushes.
    fn append_quoted_slow(&mut self, value: &str, quote: char) -> Result<(), CsvError> {
        for ch in value.chars() {
            if ch == quote {
                if self.escape_quote_with_escape {
                    if let Some(escape) = self.escape {
                        self.append_char(escape)?;
                        self.append_char(quote)?;
                        continue;
                    }
                }
                self.append_char(quote)?;
                self.append_char(quote)?;
            } else {
                self.append_char(ch)?;
            }
        }
        Ok(())
    }

    fn append_i64(&mut self, value: i64) -> Result<(), CsvError> {
        let mut tmp = itoa::Buffer::new();
        self.append_raw(tmp.format(value))
    }

    fn append_f64(&mut self, value: f64) -> Result<(), CsvError> {
        let mut tmp = ryu::Buffer::new();
        self.append_raw(tmp.format(value))
    }

    fn append_null(&mut self) -> Result<(), CsvError> {
        append_to(
            &mut self.sink,
            &mut self.buf,
            self.capacity,
            self.null_literal.as_bytes(),
        )
    }

    fn append_raw(&mut self, value: &str) -> Result<(), CsvError> {
        append_to(&mut self.sink, &mut self.buf, self.capacity, value.as_bytes())
    }

    fn append_char(&mut self, ch: char) -> Result<(), CsvError> {
        let mut tmp = [0u8; 4];
        let encoded = ch.encode_utf8(&mut tmp);
        append_to(&mut self.sink, &mut self.buf, self.capacity, encoded.as_bytes())
    }

    fn flush_buffer(&mut self) -> Result<(), CsvError> {
        if !self.buf.is_empty() {
            self.sink.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

/// Appends bytes to the output buffer in chunks, flushing to the sink
/// whenever the buffer would overflow. Values larger than the whole buffer
/// therefore stream through it mid-value.
fn append_to<W: io::Write>(
    sink: &mut W,
    buf: &mut Vec<u8>,
    capacity: usize,
    mut bytes: &[u8],
) -> Result<(), CsvError> {
    while !bytes.is_empty() {
        let room = capacity - buf.len();
        if room == 0 {
            sink.write_all(buf)?;
            buf.clear();
            continue;
        }
        let take = room.min(bytes.len());
        buf.extend_from_slice(&bytes[..take]);
        bytes = &bytes[take..];
    }
    Ok(())
}

impl<W: io::Write> Drop for ColumnEncoder<W> {
    fn drop(&mut self) {
        // Best effort on the way out; errors have nowhere to go.
        let _ = self.close();
    }
}

/// Smallest code point the loose policy considers safe to leave unquoted:
/// one above the separator, quote, and line-separator characters.
fn calc_min_safe(options: &CsvOptions) -> u32 {
    let mut safe = u32::from('\r').max(u32::from('\n'));
    safe = safe.max(u32::from(options.separator));
    if let Some(quote) = options.quote {
        safe = safe.max(u32::from(quote));
    }
    for ch in options.line_separator.chars() {
        safe = safe.max(u32::from(ch));
    }
    safe + 1
}
