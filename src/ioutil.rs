//! Small file helpers shared by the binaries and the scheduler.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

/// Normalize CR/LF and lone CR to LF.
pub fn dos2unix(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Append `text` to `path`, creating the file when absent.
pub fn append_to_file(path: &str, text: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    file.write_all(text.as_bytes())
}

/// Replace the contents of `path` with `text`.
pub fn replace_file(path: &str, text: &str) -> io::Result<()> {
    std::fs::write(path, text)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolve a payload argument: a `file:<path>` prefix reads the payload from
/// that file, anything else is taken literally.
pub fn read_payload(arg: &str) -> io::Result<String> {
    match arg.strip_prefix("file:") {
        Some(path) => std::fs::read_to_string(expand_home(path)),
        None => Ok(arg.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos2unix() {
        assert_eq!(dos2unix("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();

        append_to_file(path, "one\n").unwrap();
        append_to_file(path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_read_payload_inline_and_file() {
        assert_eq!(read_payload("hostname rtr1").unwrap(), "hostname rtr1");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configlet.txt");
        std::fs::write(&path, "interface loopback0\n").unwrap();
        let arg = format!("file:{}", path.display());
        assert_eq!(read_payload(&arg).unwrap(), "interface loopback0\n");
    }
}
