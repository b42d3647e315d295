use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// A scripted server connection: replays `read_buf` and records what the client writes.
#[derive(Debug, Default)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    pub written_buf: Vec<u8>,
    fail_with: Option<ErrorKind>,
    eof_on_read: bool,
    byte_reads: usize,
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::default().with_buf(read_buf)
    }

    /// A stream replaying `lines`, each terminated with CRLF.
    pub fn with_lines(lines: &[&str]) -> MockStream {
        let mut buf = Vec::new();
        for line in lines {
            buf.extend_from_slice(line.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        MockStream::new(buf)
    }

    pub fn with_buf(mut self, read_buf: Vec<u8>) -> MockStream {
        self.read_buf = read_buf;
        self
    }

    pub fn with_eof(mut self) -> MockStream {
        self.eof_on_read = true;
        self
    }

    pub fn with_err(mut self, kind: ErrorKind) -> MockStream {
        self.fail_with = Some(kind);
        self
    }

    /// Hand out the first `n` bytes one read at a time.
    pub fn with_byte_reads(mut self, n: usize) -> MockStream {
        self.byte_reads = n;
        self
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written_buf).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.eof_on_read {
            return Ok(0);
        }
        if let Some(kind) = self.fail_with {
            return Err(Error::new(kind, "MockStream Error"));
        }
        if self.read_pos >= self.read_buf.len() {
            return Ok(0);
        }
        let mut len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if self.byte_reads > 0 {
            self.byte_reads -= 1;
            len = min(len, 1);
        }
        buf[..len].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
