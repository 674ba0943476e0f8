//! Bounded polling waits over the session transcript.
//!
//! The device CLI is not framed; the only reliable frame is "the prompt
//! reappeared". Each wait records the transcript position on entry so it
//! cannot match a prompt that was already on screen. All waits return on
//! deadline regardless — they are advisory synchronization, and correctness
//! comes from sequencing successive waits around each command.

use std::time::Duration;

use tokio::time::Instant;

use super::transcript::Transcript;

/// Devices emit characters slowly and unpredictably; 20 ms polling is plenty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

const PROMPT_CHARS: [u8; 3] = [b'#', b'>', b'$'];

/// Wait until a prompt character appears in output newer than the entry
/// position. With `erase`, the buffer is then consumed up to and including
/// that character so the next wait only sees newer output.
pub async fn wait_for_prompt(output: &Transcript, limit: Duration, erase: bool) {
    let start = output.len();
    let deadline = Instant::now() + limit;
    loop {
        let snap = output.snapshot_bytes();
        let from = start.min(snap.len());
        if let Some(pos) = snap[from..]
            .iter()
            .position(|b| PROMPT_CHARS.contains(b))
        {
            if erase {
                output.drain(from + pos + 1);
            }
            return;
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait until a newline has appeared since entry.
pub async fn wait_for_enter(output: &Transcript, limit: Duration) {
    wait_for_byte(output, b'\n', limit).await
}

async fn wait_for_byte(output: &Transcript, byte: u8, limit: Duration) {
    let start = output.len();
    let deadline = Instant::now() + limit;
    loop {
        let snap = output.snapshot_bytes();
        let from = start.min(snap.len());
        if snap[from..].contains(&byte) {
            return;
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait until `needle` appears in output newer than the entry position.
pub async fn wait_for(output: &Transcript, needle: &str, limit: Duration) {
    let start = output.len();
    let deadline = Instant::now() + limit;
    let needle = needle.as_bytes();
    loop {
        let snap = output.snapshot_bytes();
        let from = start.min(snap.len());
        if contains(&snap[from..], needle) {
            return;
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_wait_for_prompt_sees_new_output() {
        let t = Arc::new(Transcript::new());

        let writer = {
            let t = t.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                t.write(b"banner text\nrouter#");
            })
        };

        let start = Instant::now();
        wait_for_prompt(&t, Duration::from_secs(2), false).await;
        assert!(start.elapsed() < Duration::from_secs(2));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_prompt_ignores_old_prompt() {
        let t = Transcript::new();
        t.write(b"old prompt#");

        // Nothing new arrives; the wait must run out the clock instead of
        // matching the prompt that was already there.
        let start = Instant::now();
        wait_for_prompt(&t, Duration::from_millis(100), false).await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_wait_for_prompt_erase_consumes_through_prompt() {
        let t = Arc::new(Transcript::new());
        let writer = {
            let t = t.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                t.write(b"login banner\nrouter# newer");
            })
        };

        wait_for_prompt(&t, Duration::from_secs(2), true).await;
        writer.await.unwrap();
        assert_eq!(t.snapshot(), " newer");
    }

    #[tokio::test]
    async fn test_wait_for_enter() {
        let t = Arc::new(Transcript::new());
        let writer = {
            let t = t.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                t.write(b"command echo\n");
            })
        };

        let start = Instant::now();
        wait_for_enter(&t, Duration::from_secs(2)).await;
        assert!(start.elapsed() < Duration::from_secs(2));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_substring() {
        let t = Arc::new(Transcript::new());
        let writer = {
            let t = t.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                t.write(b"Destination filename [configlet]?");
            })
        };

        let start = Instant::now();
        wait_for(&t, "?", Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_deadline_is_respected() {
        let t = Transcript::new();
        let start = Instant::now();
        wait_for(&t, "never arrives", Duration::from_millis(80)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_secs(1));
    }
}
