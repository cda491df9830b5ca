//! Incremental UTF-8 byte stream decoder.
//!
//! [`Utf8StreamDecoder`] turns a `std::io::Read` byte stream into `char`s,
//! one caller-supplied output span at a time, refilling a fixed-capacity
//! byte buffer as it drains. Two properties shape the implementation:
//!
//! - A multi-byte sequence split by the end of the buffered bytes does not
//!   force an immediate refill: the byte pointer rewinds to the lead byte
//!   and the call returns whatever it already decoded. The next call slides
//!   the undecoded tail to the buffer start and pulls more bytes before
//!   continuing.
//! - An invalid byte discovered after the same call already produced valid
//!   output does not discard that output. The error is parked in a pending
//!   state and raised at the top of the next call, before any new decoding,
//!   so the caller always receives the longest valid prefix first.

use std::io;
use std::rc::Rc;

use bstr::ByteSlice;

use crate::error::{CsvError, Utf8DecodeError, Utf8ErrorKind};
use crate::pool::BufferPool;

/// Default capacity of the byte buffer, in bytes.
pub(crate) const BYTE_BUFFER_LEN: usize = 8 * 1024;

/// A decode failure parked until the next `read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Error(Utf8ErrorKind, u64),
}

/// Streaming UTF-8 decoder over an [`io::Read`] source.
///
/// The byte buffer is acquired from the supplied [`BufferPool`] and released
/// back to it on [`close`](Self::close) (or drop), unless it was supplied
/// externally through [`with_buffer`](Self::with_buffer).
pub struct Utf8StreamDecoder<R: io::Read> {
    source: R,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    /// Global stream offset of `buf[0]`.
    base_offset: u64,
    eof: bool,
    pending: Pending,
    pool: Rc<dyn BufferPool>,
    pooled: bool,
    closed: bool,
}

impl<R: io::Read> Utf8StreamDecoder<R> {
    /// Creates a decoder with the default buffer capacity.
    #[must_use]
    pub fn new(source: R, pool: Rc<dyn BufferPool>) -> Self {
        Self::with_capacity(source, pool, BYTE_BUFFER_LEN)
    }

    /// Creates a decoder with a pooled byte buffer of `capacity` bytes
    /// (raised to 4 if smaller, so any single sequence fits).
    #[must_use]
    pub fn with_capacity(source: R, pool: Rc<dyn BufferPool>, capacity: usize) -> Self {
        let buf = pool.acquire_bytes(capacity.max(4));
        Self {
            source,
            buf,
            start: 0,
            end: 0,
            base_offset: 0,
            eof: false,
            pending: Pending::None,
            pool,
            pooled: true,
            closed: false,
        }
    }

    /// Creates a decoder over an externally supplied buffer. The buffer is
    /// dropped, not released to the pool, when the decoder closes.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is shorter than 4 bytes.
    #[must_use]
    pub fn with_buffer(source: R, pool: Rc<dyn BufferPool>, buf: Vec<u8>) -> Self {
        assert!(buf.len() >= 4, "buffer must hold at least one sequence");
        Self {
            source,
            buf,
            start: 0,
            end: 0,
            base_offset: 0,
            eof: false,
            pending: Pending::None,
            pool,
            pooled: false,
            closed: false,
        }
    }

    /// Global offset of the next undecoded byte.
    #[must_use]
    pub fn byte_offset(&self) -> u64 {
        self.base_offset + self.start as u64
    }

    /// Decodes as many complete code points as fit in `out` and in the
    /// currently buffered bytes.
    ///
    /// Returns the number of `char`s written; `Ok(0)` means the input is
    /// exhausted (never "try again").
    ///
    /// # Errors
    ///
    /// I/O errors from the source propagate unchanged. Malformed UTF-8
    /// raises [`CsvError::Utf8`], deferred by one call when the same call
    /// already decoded output.
    pub fn read(&mut self, out: &mut [char]) -> Result<usize, CsvError> {
        if let Pending::Error(kind, byte_offset) = self.pending {
            self.pending = Pending::None;
            return Err(Utf8DecodeError { kind, byte_offset }.into());
        }
        if self.closed || out.is_empty() {
            return Ok(0);
        }
        let mut n = 0;
        while n < out.len() {
            if self.start == self.end {
                // Refill only while the caller has received nothing; a
                // partial result goes back immediately.
                if n > 0 || !self.fill()? {
                    break;
                }
            }
            let b = self.buf[self.start];
            if b < 0x80 {
                let avail = &self.buf[self.start..self.end];
                let run = avail
                    .find_non_ascii_byte()
                    .unwrap_or(avail.len())
                    .min(out.len() - n);
                for &byte in &avail[..run] {
                    out[n] = char::from(byte);
                    n += 1;
                }
                self.start += run;
                continue;
            }
            let lead_offset = self.byte_offset();
            let Some(len) = sequence_len(b) else {
                return self.fail(n, Utf8ErrorKind::InvalidLeadByte(b), lead_offset);
            };
            if self.start + len > self.end {
                // Rewound to the lead byte: deliver the decoded prefix, or
                // when there is none, slide and pull more bytes now.
                if n > 0 {
                    break;
                }
                if !self.fill()? {
                    return self.fail(0, Utf8ErrorKind::UnexpectedEndOfInput, lead_offset);
                }
                continue;
            }
            match decode_sequence(&self.buf[self.start..self.start + len]) {
                Ok(ch) => {
                    out[n] = ch;
                    n += 1;
                    self.start += len;
                }
                Err(kind) => return self.fail(n, kind, lead_offset),
            }
        }
        Ok(n)
    }

    /// Either raises `kind` immediately or, when this call already decoded
    /// output, parks it for the next call and hands the prefix back.
    fn fail(&mut self, n: usize, kind: Utf8ErrorKind, byte_offset: u64) -> Result<usize, CsvError> {
        if n > 0 {
            self.pending = Pending::Error(kind, byte_offset);
            return Ok(n);
        }
        Err(Utf8DecodeError { kind, byte_offset }.into())
    }

    /// Slides undecoded bytes to the buffer start and reads more from the
    /// source. Returns `false` once the source is exhausted and nothing new
    /// arrived.
    fn fill(&mut self) -> Result<bool, CsvError> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.base_offset += self.start as u64;
            self.end -= self.start;
            self.start = 0;
        }
        if self.eof {
            return Ok(false);
        }
        let read = self.source.read(&mut self.buf[self.end..])?;
        if read == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.end += read;
        Ok(true)
    }

    /// Releases the pooled byte buffer. Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.start = 0;
        self.end = 0;
        if self.pooled {
            self.pool.release_bytes(std::mem::take(&mut self.buf));
        }
    }
}

impl<R: io::Read> Drop for Utf8StreamDecoder<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sequence length implied by a non-ASCII lead byte, or `None` for bytes
/// that cannot lead a sequence.
fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0xC0..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF7 => Some(4),
        _ => None,
    }
}

/// Decodes one complete multi-byte sequence.
fn decode_sequence(bytes: &[u8]) -> Result<char, Utf8ErrorKind> {
    let lead = bytes[0];
    let mut code = match bytes.len() {
        2 => u32::from(lead & 0x1F),
        3 => u32::from(lead & 0x0F),
        _ => u32::from(lead & 0x07),
    };
    for &b in &bytes[1..] {
        if b & 0xC0 != 0x80 {
            return Err(Utf8ErrorKind::InvalidContinuationByte(b));
        }
        code = (code << 6) | u32::from(b & 0x3F);
    }
    char::from_u32(code).ok_or(Utf8ErrorKind::InvalidCodePoint(code))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::rc::Rc;

    use super::Utf8StreamDecoder;
    use crate::error::{CsvError, Utf8ErrorKind};
    use crate::pool::{BufferPool, NoopPool, RecyclingPool};

    /// A reader that hands out its contents at most `chunk` bytes per call,
    /// to force refills at awkward places.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Trickle {
        fn new(data: &[u8], chunk: usize) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
                chunk,
            }
        }
    }

    impl io::Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn decode_all<R: io::Read>(dec: &mut Utf8StreamDecoder<R>) -> Result<String, CsvError> {
        let mut out = ['\0'; 7];
        let mut text = String::new();
        loop {
            let n = dec.read(&mut out)?;
            if n == 0 {
                return Ok(text);
            }
            text.extend(&out[..n]);
        }
    }

    #[test]
    fn ascii_round_trip() {
        let mut dec = Utf8StreamDecoder::new("hello, world".as_bytes(), Rc::new(NoopPool));
        assert_eq!(decode_all(&mut dec).unwrap(), "hello, world");
    }

    #[test]
    fn multibyte_split_across_refills() {
        // One byte per refill splits every sequence, including the 4-byte
        // emoji, across buffer loads.
        let text = "aé€😀z";
        let mut dec = Utf8StreamDecoder::with_capacity(
            Trickle::new(text.as_bytes(), 1),
            Rc::new(NoopPool),
            4,
        );
        assert_eq!(decode_all(&mut dec).unwrap(), text);
    }

    #[test]
    fn four_byte_sequence_split_at_buffer_boundary() {
        // "ab" fills the 4-byte buffer up to the emoji's lead byte; the
        // sequence itself straddles a slide-and-refill.
        let text = "ab😀cd";
        let mut dec = Utf8StreamDecoder::with_capacity(
            Trickle::new(text.as_bytes(), 3),
            Rc::new(NoopPool),
            4,
        );
        assert_eq!(decode_all(&mut dec).unwrap(), text);
    }

    #[test]
    fn partial_sequence_returns_prefix_before_refilling() {
        // The buffer holds "ab" plus the first byte of 'é'; the first read
        // must hand back "ab" without blocking on more input.
        let mut dec = Utf8StreamDecoder::with_capacity(
            Trickle::new("abé".as_bytes(), 3),
            Rc::new(NoopPool),
            8,
        );
        let mut out = ['\0'; 8];
        assert_eq!(dec.read(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &['a', 'b']);
        assert_eq!(dec.read(&mut out).unwrap(), 1);
        assert_eq!(out[0], 'é');
        assert_eq!(dec.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn truncated_sequence_reports_lead_offset() {
        // 'a' then the first two bytes of '€' (E2 82), cut short.
        let bytes = [b'a', 0xE2, 0x82];
        let mut dec = Utf8StreamDecoder::new(&bytes[..], Rc::new(NoopPool));
        let mut out = ['\0'; 4];
        assert_eq!(dec.read(&mut out).unwrap(), 1);
        match dec.read(&mut out) {
            Err(CsvError::Utf8(e)) => {
                assert_eq!(e.kind, Utf8ErrorKind::UnexpectedEndOfInput);
                assert_eq!(e.byte_offset, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_byte_is_deferred_past_decoded_prefix() {
        let bytes = [b'a', b'b', 0xFF, b'c'];
        let mut dec = Utf8StreamDecoder::new(&bytes[..], Rc::new(NoopPool));
        let mut out = ['\0'; 8];
        // The valid prefix is delivered first...
        assert_eq!(dec.read(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &['a', 'b']);
        // ...and the parked error surfaces before any new decoding.
        match dec.read(&mut out) {
            Err(CsvError::Utf8(e)) => {
                assert_eq!(e.kind, Utf8ErrorKind::InvalidLeadByte(0xFF));
                assert_eq!(e.byte_offset, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_continuation_byte_errors_immediately_at_call_start() {
        let bytes = [0xC3, b'x'];
        let mut dec = Utf8StreamDecoder::new(&bytes[..], Rc::new(NoopPool));
        let mut out = ['\0'; 4];
        match dec.read(&mut out) {
            Err(CsvError::Utf8(e)) => {
                assert_eq!(e.kind, Utf8ErrorKind::InvalidContinuationByte(b'x'));
                assert_eq!(e.byte_offset, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn surrogate_code_point_is_rejected() {
        // ED A0 80 encodes U+D800.
        let bytes = [0xED, 0xA0, 0x80];
        let mut dec = Utf8StreamDecoder::new(&bytes[..], Rc::new(NoopPool));
        let mut out = ['\0'; 4];
        match dec.read(&mut out) {
            Err(CsvError::Utf8(e)) => {
                assert_eq!(e.kind, Utf8ErrorKind::InvalidCodePoint(0xD800));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn small_output_spans_drain_the_buffer_incrementally() {
        let mut dec = Utf8StreamDecoder::new("abcdef".as_bytes(), Rc::new(NoopPool));
        let mut out = ['\0'; 2];
        let mut text = String::new();
        loop {
            let n = dec.read(&mut out).unwrap();
            if n == 0 {
                break;
            }
            text.extend(&out[..n]);
        }
        assert_eq!(text, "abcdef");
    }

    #[test]
    fn close_releases_the_pooled_buffer_once() {
        let pool = Rc::new(RecyclingPool::new(4));
        let mut dec =
            Utf8StreamDecoder::new("x".as_bytes(), Rc::clone(&pool) as Rc<dyn BufferPool>);
        dec.close();
        dec.close();
        assert_eq!(pool.retained(), (1, 0));
        drop(dec);
        assert_eq!(pool.retained(), (1, 0));
    }

    #[test]
    fn external_buffer_is_not_released_to_the_pool() {
        let pool = Rc::new(RecyclingPool::new(4));
        let mut dec = Utf8StreamDecoder::with_buffer(
            "x".as_bytes(),
            Rc::clone(&pool) as Rc<dyn BufferPool>,
            vec![0; 16],
        );
        dec.close();
        assert_eq!(pool.retained(), (0, 0));
    }
}
