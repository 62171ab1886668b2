// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub source: LogSource,
    pub line: String,
}

/// Decoder of the multiplexed log stream of the Docker Engine.
///
/// Each frame has an 8-byte header: stream type, three zero bytes and the
/// big-endian payload length. Chunks may split frames at any byte.
#[derive(Default)]
pub struct LogFrameDecoder {
    buffer: Vec<u8>,
}

impl LogFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning the lines of the frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LogLine> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = vec![];
        loop {
            if self.buffer.len() < HEADER_LEN {
                break;
            }
            let size = u32::from_be_bytes([self.buffer[4], self.buffer[5], self.buffer[6], self.buffer[7]]) as usize;
            if self.buffer.len() < HEADER_LEN + size {
                break;
            }
            let source = match self.buffer[0] {
                0 => LogSource::Stdin,
                2 => LogSource::Stderr,
                _ => LogSource::Stdout,
            };
            let payload: Vec<u8> = self.buffer.drain(..HEADER_LEN + size).skip(HEADER_LEN).collect();
            for line in String::from_utf8_lossy(&payload).lines() {
                if !line.is_empty() {
                    lines.push(LogLine {
                        source,
                        line: line.to_string(),
                    });
                }
            }
        }
        lines
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }
}
