//! In-memory stream state for byte, text and file values.
//!
//! A rebuilt stream keeps its content and read position so that a later
//! snapshot of the same stream can rewrite it in place.

use crate::value::ObjRef;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Growable byte buffer with a cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
}

impl ByteBuffer {
    /// Create a buffer positioned at `position`
    #[must_use]
    pub fn new(data: Vec<u8>, position: usize) -> Self {
        Self { data, position }
    }

    /// All bytes regardless of position
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Current position
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Replace the content and move the cursor
    pub fn rewrite(&mut self, data: Vec<u8>, position: usize) {
        self.data = data;
        self.position = position;
    }
}

impl Read for ByteBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.position.min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position = start + n;
        Ok(n)
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.position + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ByteBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek_target(pos, self.position, self.data.len())?;
        self.position = target;
        Ok(target as u64)
    }
}

/// Text buffer with a character cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    /// Position in characters
    position: usize,
}

impl TextBuffer {
    /// Create a buffer positioned at `position` characters
    #[must_use]
    pub fn new(text: impl Into<String>, position: usize) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }

    /// Buffer positioned at the end of its text
    #[must_use]
    pub fn at_end(text: impl Into<String>) -> Self {
        let text = text.into();
        let position = text.chars().count();
        Self { text, position }
    }

    /// Whole text
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.text
    }

    /// Current position in characters
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Replace the text and move the cursor
    pub fn rewrite(&mut self, text: impl Into<String>, position: usize) {
        self.text = text.into();
        self.position = position;
    }

    /// Read from the cursor to the end
    pub fn read_rest(&mut self) -> String {
        let rest: String = self.text.chars().skip(self.position).collect();
        self.position += rest.chars().count();
        rest
    }
}

impl std::fmt::Write for TextBuffer {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let len = self.text.chars().count();
        if self.position >= len {
            self.text.push_str(s);
        } else {
            let head: String = self.text.chars().take(self.position).collect();
            let tail: String = self.text.chars().skip(self.position + s.chars().count()).collect();
            self.text = format!("{head}{s}{tail}");
        }
        self.position += s.chars().count();
        Ok(())
    }
}

/// A file opened for reading, held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBuffer {
    /// Path on disk
    pub path: PathBuf,
    /// Bytes read when the value was rebuilt
    pub bytes: ByteBuffer,
}

impl FileBuffer {
    /// Create a file buffer from already-read content
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>, position: usize) -> Self {
        Self {
            path: path.into(),
            bytes: ByteBuffer::new(content, position),
        }
    }
}

/// Direction of a buffered or text-wrapping stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Reads from the wrapped stream
    Reader,
    /// Writes to the wrapped stream
    Writer,
}

/// A stream wrapping another stream object
#[derive(Debug, Clone)]
pub struct BufferedStream {
    /// Read or write side
    pub direction: StreamDirection,
    /// Wrapped byte, text or file object
    pub inner: ObjRef,
}

impl BufferedStream {
    /// Wrap a stream object
    #[must_use]
    pub fn new(direction: StreamDirection, inner: ObjRef) -> Self {
        Self { direction, inner }
    }
}

fn seek_target(pos: SeekFrom, current: usize, len: usize) -> io::Result<usize> {
    let (base, offset) = match pos {
        SeekFrom::Start(n) => {
            return usize::try_from(n)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"));
        }
        SeekFrom::End(n) => (len, n),
        SeekFrom::Current(n) => (current, n),
    };
    let target = i64::try_from(base)
        .ok()
        .and_then(|b| b.checked_add(offset))
        .filter(|t| *t >= 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
    usize::try_from(target).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    #[test]
    fn test_byte_buffer_read_from_position() {
        let mut buf = ByteBuffer::new(b"hello".to_vec(), 2);
        let mut out = String::new();
        buf.read_to_string(&mut out).unwrap();
        assert_eq!(out, "llo");
        assert_eq!(buf.position(), 5);
    }

    #[test]
    fn test_byte_buffer_write_extends() {
        let mut buf = ByteBuffer::new(b"ab".to_vec(), 1);
        buf.write_all(b"xyz").unwrap();
        assert_eq!(buf.contents(), b"axyz");
        buf.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(buf.position(), 0);
        assert!(buf.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(buf.seek(SeekFrom::End(-1)).unwrap(), 3);
    }

    #[test]
    fn test_rewrite_in_place() {
        let mut buf = ByteBuffer::new(b"old".to_vec(), 3);
        buf.rewrite(b"new content".to_vec(), 4);
        assert_eq!(buf.contents(), b"new content");
        assert_eq!(buf.position(), 4);
    }

    #[test]
    fn test_text_buffer() {
        let mut buf = TextBuffer::at_end("héllo");
        assert_eq!(buf.position(), 5);
        buf.write_str(" world").unwrap();
        assert_eq!(buf.contents(), "héllo world");
        buf.seek(1);
        assert_eq!(buf.read_rest(), "éllo world");
        let mut over = TextBuffer::new("abcdef", 1);
        over.write_str("XY").unwrap();
        assert_eq!(over.contents(), "aXYdef");
    }

    #[test]
    fn test_file_buffer_reads() {
        let mut file = FileBuffer::new("/tmp/x", b"data".to_vec(), 1);
        let mut out = Vec::new();
        file.bytes.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ata");
    }
}
