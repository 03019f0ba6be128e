use log::{debug, trace};

use super::line_reader::LineSource;
use super::structs::{FrameState, Telegram};
use super::TelegramError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_frame_len: Option<usize>,
    pub max_lines: Option<usize>,
    /// Drop everything before the first `/` header line
    pub sync_on_header: bool,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_len: Some(16384),
            max_lines: Some(128),
            sync_on_header: false,
        }
    }
}

/// Collects lines until the `!` checksum line shows up.
pub struct FrameAssembler {
    limits: FrameLimits,
    state: FrameState,
    synced: bool,
    buffer: Vec<u8>,
    lines: usize,
}

impl FrameAssembler {
    pub fn new(limits: FrameLimits) -> Self {
        let synced = !limits.sync_on_header;
        Self {
            limits,
            state: FrameState::Collecting,
            synced,
            buffer: Vec::new(),
            lines: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Drops a partially collected frame.
    pub fn reset(&mut self) {
        self.state = FrameState::Collecting;
        self.synced = !self.limits.sync_on_header;
        self.buffer.clear();
        self.lines = 0;
    }

    pub fn push_line(&mut self, line: &[u8]) -> Result<FrameState, TelegramError> {
        if self.state == FrameState::Complete {
            return Err(TelegramError::Malformed("line received after the checksum line".to_string()));
        }

        if !self.synced {
            if line.first() != Some(&b'/') {
                trace!("Skipping line outside of a telegram: {}", String::from_utf8_lossy(line).trim_end());
                return Ok(self.state);
            }
            self.synced = true;
        }

        if let Some(max) = self.limits.max_lines {
            if self.lines + 1 > max {
                self.reset();
                return Err(TelegramError::TooManyLines(max));
            }
        }
        if let Some(max) = self.limits.max_frame_len {
            if self.buffer.len() + line.len() > max {
                self.reset();
                return Err(TelegramError::FrameTooLong(max));
            }
        }

        self.buffer.extend_from_slice(line);
        self.lines += 1;

        if line.first() == Some(&b'!') {
            debug!("Found checksum line after {} lines", self.lines);
            self.state = FrameState::Complete;
        }

        Ok(self.state)
    }

    /// Hands out the finished telegram and starts over.
    pub fn take_telegram(&mut self) -> Option<Telegram> {
        if self.state != FrameState::Complete {
            return None;
        }
        let telegram = Telegram::new(std::mem::take(&mut self.buffer), self.lines);
        self.reset();
        Some(telegram)
    }
}

/// Reads one complete telegram from `source`.
///
/// Any source error drops the lines collected so far. A source that runs dry
/// before the checksum line yields `Malformed`.
pub fn assemble<S: LineSource + ?Sized>(source: &mut S, limits: &FrameLimits) -> Result<Telegram, TelegramError> {
    let mut assembler = FrameAssembler::new(limits.clone());
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = source.read_line(&mut line)?;
        if read == 0 {
            return Err(TelegramError::Malformed(format!(
                "source ended after {} lines without a checksum line",
                assembler.lines()
            )));
        }

        trace!("Line read: {}", String::from_utf8_lossy(&line).trim_end());
        if assembler.push_line(&line)? == FrameState::Complete {
            break;
        }
    }

    assembler
        .take_telegram()
        .ok_or_else(|| TelegramError::Malformed("frame not complete".to_string()))
}
