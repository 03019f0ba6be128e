use std::io::{self, BufRead, Read};

use super::TelegramError;

/// Anything that can hand out telegram lines one at a time.
pub trait LineSource {
    /// Appends one line, including its line break, to `buf`.
    /// Returns the number of bytes read, `0` once the source has no more data.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, TelegramError>;

    fn close(&mut self) -> Result<(), TelegramError>;

    /// True once a read returned no data. Serial ports never run dry.
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, TelegramError> {
        (**self).read_line(buf)
    }

    fn close(&mut self) -> Result<(), TelegramError> {
        (**self).close()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Line source over any buffered reader. Closing drops the reader.
pub struct ReaderSource<R: BufRead> {
    reader: Option<R>,
    max_line_len: Option<usize>,
    exhausted: bool,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            max_line_len: None,
            exhausted: false,
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: Option<usize>) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

/// Drops everything up to and including the next `\n`.
fn discard_line<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<usize> {
    let mut discarded = 0;
    loop {
        let (found, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(discarded);
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (true, pos + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        discarded += used;
        if found {
            return Ok(discarded);
        }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, TelegramError> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            TelegramError::Source(io::Error::new(io::ErrorKind::NotConnected, "source already closed"))
        })?;

        let read = match self.max_line_len {
            Some(max) => {
                let start = buf.len();
                let read = reader.by_ref().take(max as u64 + 1).read_until(b'\n', buf)?;
                if read > max {
                    let complete = buf.last() == Some(&b'\n');
                    buf.truncate(start);
                    /* The next read has to start on a fresh line */
                    if !complete {
                        discard_line(reader)?;
                    }
                    return Err(TelegramError::LineTooLong(max));
                }
                read
            }
            None => reader.read_until(b'\n', buf)?,
        };

        if read == 0 {
            self.exhausted = true;
        }
        Ok(read)
    }

    fn close(&mut self) -> Result<(), TelegramError> {
        self.reader = None;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
