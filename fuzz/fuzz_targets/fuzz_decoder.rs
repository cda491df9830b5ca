#![no_main]
use std::io;
use std::rc::Rc;

use csvmodem::{ColumnDecoder, CsvOptions, NoopPool};
use libfuzzer_sys::fuzz_target;

const HEADER: usize = 4; // 2 flag bytes + chunk size + buffer size

/// Hands out at most `chunk` bytes per read, so column values and
/// multi-byte UTF-8 sequences split at arbitrary byte positions.
struct Chunked<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl io::Read for Chunked<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

fn decode(data: &[u8]) {
    if data.len() < HEADER {
        return;
    }

    // Map the header onto the decoder-relevant configuration space.
    let flags = data[0];
    let shape = data[1];
    let chunk = data[2] as usize + 1;
    let capacity = data[3] as usize + 4;
    let data = &data[HEADER..];

    let options = CsvOptions {
        separator: if flags & 1 != 0 { ';' } else { ',' },
        quote: if flags & 2 != 0 { None } else { Some('"') },
        escape: if flags & 4 != 0 { Some('\\') } else { None },
        trim_spaces: flags & 8 != 0,
        allow_comments: flags & 16 != 0,
        ..CsvOptions::default()
    };

    let source = Chunked { data, chunk };
    let mut dec = ColumnDecoder::with_capacities(
        source,
        &options,
        Rc::new(NoopPool),
        capacity,
        capacity,
    );

    // Drain every record and column. Grammar, UTF-8, and numeric errors are
    // expected outcomes on arbitrary bytes; panics are not.
    loop {
        match dec.next_record() {
            Ok(true) => {}
            Ok(false) | Err(_) => return,
        }
        loop {
            match dec.next_column() {
                Ok(Some(_)) => {
                    if shape & 1 != 0 {
                        let _ = dec.as_i64();
                    }
                    if shape & 2 != 0 {
                        let _ = dec.as_f64();
                    }
                    if shape & 4 != 0 {
                        let _ = dec.as_big_decimal();
                    }
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
}

fuzz_target!(|data: &[u8]| decode(data));
