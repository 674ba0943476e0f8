//! SSH transport for interactive device shells, built on russh.
//!
//! Network gear frequently runs old SSH stacks, so the cipher list is
//! extended with the legacy CBC ciphers and host keys are not verified —
//! this is an operator tool for a known fleet. Authentication offers a
//! password and falls back to keyboard-interactive, answering every
//! question with the password (some IOS versions present the password
//! prompt that way).

use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use russh::client::{self, Handle, KeyboardInteractiveAuthResponse};
use russh::keys::PublicKey;
use russh::{cipher, ChannelMsg, Disconnect, Preferred, Pty};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::transcript::Transcript;
use crate::error::SessionError;
use crate::options::Options;

/// Append `:22` when the device address carries no port.
pub fn with_default_port(device: &str) -> String {
    if device.contains(':') {
        device.to_string()
    } else {
        format!("{device}:22")
    }
}

/// Cipher preferences for old network gear: the defaults plus the legacy
/// CBC ciphers still shipped by Cisco IOS.
fn preferred_algorithms() -> Preferred {
    let mut ciphers = Preferred::DEFAULT.cipher.to_vec();
    ciphers.extend_from_slice(&[
        cipher::AES_128_CBC,
        cipher::AES_192_CBC,
        cipher::AES_256_CBC,
        cipher::TRIPLE_DES_CBC,
    ]);
    Preferred {
        cipher: Cow::Owned(ciphers),
        ..Preferred::DEFAULT
    }
}

/// An open interactive shell on a device.
///
/// The channel reader runs as its own task and appends everything the device
/// writes to the [`Transcript`]; the driver writes through [`send`](Self::send)
/// and polls the transcript. The TCP connection, SSH client and channel are
/// all scoped to this value and released on drop.
pub struct Shell {
    device: String,
    writer: mpsc::Sender<Vec<u8>>,
    transcript: Arc<Transcript>,
    io_task: JoinHandle<()>,
    handle: Handle<IgnoreHostKey>,
}

impl Shell {
    /// Dial, negotiate, authenticate and start a shell with a PTY.
    ///
    /// `deadline` bounds every step; the elapsed budget is checked between
    /// steps so a stalled device fails fast.
    pub async fn open(
        opts: &Options,
        device: &str,
        user: &str,
        password: &str,
        deadline: Instant,
    ) -> Result<Shell, SessionError> {
        let handle = connect_client(opts, device, user, password, deadline).await?;

        check_deadline(device, deadline, opts.timeout)?;
        let channel =
            handle
                .channel_open_session()
                .await
                .map_err(|source| SessionError::SessionOpen {
                    device: device.to_string(),
                    source,
                })?;

        check_deadline(device, deadline, opts.timeout)?;
        channel
            .request_pty(true, "xterm", 80, 50, 0, 0, &[(Pty::ECHO, 0)])
            .await
            .map_err(|source| SessionError::PtyRequest {
                device: device.to_string(),
                source,
            })?;

        channel
            .request_shell(true)
            .await
            .map_err(|source| SessionError::ShellStart {
                device: device.to_string(),
                source,
            })?;

        debug!("shell open on {device}");

        let transcript = Arc::new(Transcript::new());
        let (writer, mut rx) = mpsc::channel::<Vec<u8>>(32);

        let io_task = {
            let transcript = transcript.clone();
            let device = device.to_string();
            let mut channel = channel;
            tokio::spawn(async move {
                let mut rx_open = true;
                loop {
                    tokio::select! {
                        outgoing = rx.recv(), if rx_open => {
                            match outgoing {
                                Some(bytes) => {
                                    if channel.data(&bytes[..]).await.is_err() {
                                        debug!("{device}: write to channel failed");
                                        break;
                                    }
                                }
                                None => rx_open = false,
                            }
                        }
                        msg = channel.wait() => {
                            match msg {
                                Some(ChannelMsg::Data { ref data }) => transcript.write(data),
                                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                                    transcript.write(data)
                                }
                                Some(ChannelMsg::ExitStatus { exit_status }) => {
                                    trace!("{device}: shell exited with status {exit_status}");
                                    let _ = channel.eof().await;
                                    break;
                                }
                                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                                _ => {}
                            }
                        }
                    }
                }
                debug!("{device}: session ended");
            })
        };

        Ok(Shell {
            device: device.to_string(),
            writer,
            transcript,
            io_task,
            handle,
        })
    }

    /// The session transcript fed by the channel reader.
    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    /// Send bytes to the remote stdin. `what` names the command for error
    /// reporting.
    pub async fn send(&self, what: &str, bytes: &[u8]) -> Result<(), SessionError> {
        self.writer
            .send(bytes.to_vec())
            .await
            .map_err(|_| SessionError::Write {
                device: self.device.clone(),
                what: what.to_string(),
            })
    }

    /// Wait until the remote side ends the session (the reader task exits).
    pub async fn wait_session_end(&mut self) {
        let _ = (&mut self.io_task).await;
    }

    /// Disconnect politely.
    pub async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

/// Dial through the configured dialer, negotiate SSH and authenticate.
/// Shared between the scripted drivers and the interactive passthrough.
pub(crate) async fn connect_client(
    opts: &Options,
    device: &str,
    user: &str,
    password: &str,
    deadline: Instant,
) -> Result<Handle<IgnoreHostKey>, SessionError> {
    let addr = with_default_port(device);

    let remaining = check_deadline(device, deadline, opts.timeout)?;
    let stream = tokio::time::timeout(remaining, opts.dial(&addr))
        .await
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "dial timed out")))
        .map_err(|source| SessionError::Connect {
            device: device.to_string(),
            user: user.to_string(),
            source,
        })?;

    check_deadline(device, deadline, opts.timeout)?;

    let config = Arc::new(client::Config {
        preferred: preferred_algorithms(),
        ..Default::default()
    });

    let mut handle = client::connect_stream(config, stream, IgnoreHostKey)
        .await
        .map_err(|source| SessionError::Negotiate {
            device: device.to_string(),
            source,
        })?;

    check_deadline(device, deadline, opts.timeout)?;
    authenticate(&mut handle, device, user, password).await?;

    Ok(handle)
}

/// Fail with a timeout naming the device once the budget is consumed,
/// otherwise return the remaining time.
pub fn check_deadline(
    device: &str,
    deadline: Instant,
    budget: Duration,
) -> Result<Duration, SessionError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(SessionError::Timeout {
            device: device.to_string(),
            budget,
        });
    }
    Ok(deadline - now)
}

async fn authenticate(
    handle: &mut Handle<IgnoreHostKey>,
    device: &str,
    user: &str,
    password: &str,
) -> Result<(), SessionError> {
    let negotiate = |source| SessionError::Negotiate {
        device: device.to_string(),
        source,
    };

    let auth = handle
        .authenticate_password(user, password)
        .await
        .map_err(negotiate)?;
    if auth {
        return Ok(());
    }

    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(negotiate)?;
    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(()),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = vec![password.to_string(); prompts.len()];
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(negotiate)?;
            }
            _ => {
                return Err(SessionError::Auth {
                    device: device.to_string(),
                    user: user.to_string(),
                })
            }
        }
    }
}

/// Host-key verification is intentionally disabled: operator tool, known fleet.
pub(crate) struct IgnoreHostKey;

#[async_trait]
impl client::Handler for IgnoreHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("rtr1"), "rtr1:22");
        assert_eq!(with_default_port("rtr1:2222"), "rtr1:2222");
    }

    #[test]
    fn test_legacy_ciphers_offered() {
        let preferred = preferred_algorithms();
        assert!(preferred.cipher.contains(&cipher::AES_256_CBC));
        assert!(preferred.cipher.contains(&cipher::TRIPLE_DES_CBC));
        // Defaults stay in front.
        assert!(preferred.cipher.len() > 4);
    }

    #[tokio::test]
    async fn test_deadline_check() {
        let device = "rtr1";
        let budget = Duration::from_secs(10);

        let live = Instant::now() + Duration::from_secs(5);
        assert!(check_deadline(device, live, budget).is_ok());

        let expired = Instant::now() - Duration::from_millis(1);
        let err = check_deadline(device, expired, budget).unwrap_err();
        assert!(err.to_string().contains("rtr1"));
        assert!(err.to_string().contains("timeout"));
    }
}
