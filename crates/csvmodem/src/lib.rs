//! A streaming, incremental CSV (delimited-text) value codec.
//!
//! This crate is the character-level core of a delimited-text backend: the
//! decode side turns a raw byte stream into a sequence of column values,
//! and the encode side turns typed column values — possibly written out of
//! declared order — back into correctly quoted and escaped delimited text.
//! It owns the parts that have to be right at the character level: values
//! split across buffer refills, multi-byte UTF-8 sequences split across
//! byte reads, quote doubling and escape sequences, and lazy numeric
//! promotion (`i32` → `i64` → big integer, `f64` → big decimal) that never
//! re-parses text it has already classified.
//!
//! What this crate deliberately is not: schema binding, a tree-of-values
//! adapter, or configuration loading. Those live above it and talk to the
//! codec through [`ColumnDecoder::next_column`] / the numeric accessors on
//! one side and [`ColumnEncoder::write_str`] and friends on the other.
//!
//! # Example
//!
//! ```rust
//! use csvmodem::{ColumnDecoder, ColumnEncoder, CsvOptions};
//!
//! # fn main() -> Result<(), csvmodem::CsvError> {
//! let options = CsvOptions::default();
//!
//! let mut out = Vec::new();
//! let mut enc = ColumnEncoder::new(&mut out, &options);
//! enc.write_str(1, "second")?; // buffered until the row ends
//! enc.write_str(0, "first")?;
//! enc.end_row()?;
//! enc.close()?;
//! drop(enc);
//!
//! let mut dec = ColumnDecoder::new(out.as_slice(), &options);
//! assert!(dec.next_record()?);
//! assert_eq!(dec.next_column()?, Some("first"));
//! assert_eq!(dec.next_column()?, Some("second"));
//! assert_eq!(dec.next_column()?, None);
//! # Ok(())
//! # }
//! ```
//!
//! Both halves are single-threaded and synchronous: one instance per
//! logical stream, blocking only at the refill/flush boundary of the
//! underlying `Read`/`Write`. I/O buffers come from a [`BufferPool`]
//! passed at construction and are released exactly once on close.

#![allow(missing_docs)]

mod accum;
mod decoder;
mod encoder;
mod error;
mod number;
mod options;
mod pool;
mod scalar;
mod utf8;

pub use decoder::ColumnDecoder;
pub use encoder::ColumnEncoder;
pub use error::{
    CsvError, DecodeError, DecodeErrorKind, Location, Utf8DecodeError, Utf8ErrorKind,
};
pub use options::{CsvOptions, QuoteStyle};
pub use pool::{BufferPool, NoopPool, RecyclingPool};
pub use utf8::Utf8StreamDecoder;
