//! Interactive terminal passthrough.
//!
//! Attaches the local terminal to a remote PTY: raw mode locally, stdin
//! bytes forwarded as typed, device output written straight through. Ends
//! when the remote side closes the session.

use std::time::Duration;

use crossterm::terminal;
use log::debug;
use russh::{ChannelMsg, Pty};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::{Result, SessionError};
use crate::options::Options;
use crate::session::connect_client;

/// Give the login plenty of room; once connected there is no deadline — the
/// operator decides when the session is over.
const CONNECT_BUDGET: Duration = Duration::from_secs(30);

/// Start a remote shell and connect it to the local terminal.
pub async fn interactive(opts: &Options, device: &str, user: &str, password: &str) -> Result<()> {
    debug!("starting interactive shell on {device}");

    let deadline = Instant::now() + CONNECT_BUDGET;
    let handle = connect_client(opts, device, user, password, deadline).await?;

    let mut channel =
        handle
            .channel_open_session()
            .await
            .map_err(|source| SessionError::SessionOpen {
                device: device.to_string(),
                source,
            })?;
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

    // Raw mode so single keys reach the device.
    terminal::enable_raw_mode()?;
    let result = passthrough(&mut channel).await;
    terminal::disable_raw_mode()?;
    result
}

async fn passthrough(channel: &mut russh::Channel<russh::client::Msg>) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut keys = [0u8; 1024];

    loop {
        tokio::select! {
            read = stdin.read(&mut keys) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if channel.data(&keys[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { ref data }) => {
                        stdout.write_all(data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                        stdout.write_all(data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
