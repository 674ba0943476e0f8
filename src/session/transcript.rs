//! Synchronized session transcript.
//!
//! The SSH reader task appends everything the device writes; the driver and
//! the wait primitives poll it. Writes are append-only — only the driver's
//! own [`reset`](Transcript::reset), [`drain`](Transcript::drain) and
//! [`discard_until`](Transcript::discard_until) ever remove bytes.

use std::sync::Mutex;

/// Append-only byte buffer shared between the channel reader and the driver.
///
/// All operations are serialized by a single lock. ANSI escape sequences are
/// stripped on write so prompt detection sees plain text.
#[derive(Debug, Default)]
pub struct Transcript {
    buf: Mutex<Vec<u8>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append device output.
    pub fn write(&self, data: &[u8]) {
        let cleaned = strip_ansi_escapes::strip(data);
        self.buf.lock().unwrap().extend_from_slice(&cleaned);
    }

    /// Drain-style read into `out`; returns the number of bytes moved.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut buf = self.buf.lock().unwrap();
        let n = out.len().min(buf.len());
        out[..n].copy_from_slice(&buf[..n]);
        buf.drain(..n);
        n
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.buf.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard everything.
    pub fn reset(&self) {
        self.buf.lock().unwrap().clear();
    }

    /// Discard the first `n` bytes (or everything, if fewer are buffered).
    pub fn drain(&self, n: usize) {
        let mut buf = self.buf.lock().unwrap();
        let n = n.min(buf.len());
        buf.drain(..n);
    }

    /// Read and throw away bytes up to and including the first occurrence of
    /// `b`. Draining the whole buffer without finding `b` is not an error.
    pub fn discard_until(&self, b: u8) {
        let mut buf = self.buf.lock().unwrap();
        match buf.iter().position(|&c| c == b) {
            Some(idx) => {
                buf.drain(..=idx);
            }
            None => buf.clear(),
        }
    }

    /// Current contents as a string, without consuming.
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    /// Current contents as raw bytes, without consuming.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }

    /// The suffix after the final `\n`, or the whole contents if none.
    pub fn last_line(&self) -> String {
        let buf = self.buf.lock().unwrap();
        let start = buf
            .iter()
            .rposition(|&c| c == b'\n')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&buf[start..]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let t = Transcript::new();
        assert_eq!(t.len(), 0);

        t.write(b"boembabies");
        assert_eq!(t.len(), 10);
        assert_eq!(t.snapshot(), "boembabies");
    }

    #[test]
    fn test_read_drains() {
        let t = Transcript::new();
        t.write(b"abcdef");

        let mut out = [0u8; 4];
        assert_eq!(t.read(&mut out), 4);
        assert_eq!(&out, b"abcd");
        assert_eq!(t.snapshot(), "ef");
    }

    #[test]
    fn test_reset() {
        let t = Transcript::new();
        t.write(b"output");
        t.reset();
        assert!(t.is_empty());
    }

    #[test]
    fn test_discard_until_leaves_following_byte() {
        let t = Transcript::new();
        t.write(b"echo\rreal output");
        t.discard_until(b'\r');
        assert_eq!(t.snapshot(), "real output");
    }

    #[test]
    fn test_discard_until_missing_byte_empties_buffer() {
        let t = Transcript::new();
        t.write(b"no carriage return here");
        t.discard_until(b'\r');
        assert!(t.is_empty());

        // And an empty buffer is fine too.
        t.discard_until(b'\r');
        assert!(t.is_empty());
    }

    #[test]
    fn test_last_line() {
        let t = Transcript::new();
        t.write(b"line1\nline2\nrouter#");
        assert_eq!(t.last_line(), "router#");

        t.reset();
        t.write(b"no newline");
        assert_eq!(t.last_line(), "no newline");
    }

    #[test]
    fn test_ansi_stripping() {
        let t = Transcript::new();
        t.write(b"\x1b[32mrouter#\x1b[0m");
        assert_eq!(t.snapshot(), "router#");
    }

    #[test]
    fn test_concurrent_writer() {
        use std::sync::Arc;

        let t = Arc::new(Transcript::new());
        let writer = {
            let t = t.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    t.write(b"x");
                }
            })
        };
        while t.len() < 100 {
            std::thread::yield_now();
        }
        writer.join().unwrap();
        assert_eq!(t.len(), 100);
    }
}
