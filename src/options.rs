//! Shared options and the dialer capability.
//!
//! [`Options`] is built once at startup and passed explicitly to the session
//! drivers, the scheduler and the checks. The [`Dialer`] is how SOCKS5 or
//! plain TCP is injected; the drivers never open sockets themselves.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Object-safe byte stream the SSH client runs over.
pub trait SshStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SshStream for T {}

/// A connected stream as produced by a [`Dialer`].
pub type BoxedStream = Box<dyn SshStream + 'static>;

/// Capability that opens a TCP-like connection to `addr` (`host:port`).
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: &str) -> io::Result<BoxedStream>;
}

/// Dialer that opens a direct TCP connection.
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, addr: &str) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Box::new(stream))
    }
}

/// Dialer that tunnels through a SOCKS5 proxy.
pub struct Socks5Dialer {
    proxy: String,
}

impl Socks5Dialer {
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, addr: &str) -> io::Result<BoxedStream> {
        let stream =
            tokio_socks::tcp::Socks5Stream::connect(self.proxy.as_str(), addr.to_string())
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))?;
        Ok(Box::new(stream))
    }
}

/// Build a dialer from an optional SOCKS5 proxy address.
pub fn make_dialer(socks: Option<&str>) -> Arc<dyn Dialer> {
    match socks {
        Some(proxy) if !proxy.is_empty() => Arc::new(Socks5Dialer::new(proxy)),
        _ => Arc::new(DirectDialer),
    }
}

/// Configuration bag shared by the drivers, the scheduler and the shell.
#[derive(Clone)]
pub struct Options {
    /// Drop the SSH banner and login chatter from the captured output.
    pub suppress_banner: bool,

    /// Drop administrative output (the `terminal length 0` exchange).
    pub suppress_admin: bool,

    /// Drop the echo of what is being sent to the device.
    pub suppress_sending: bool,

    /// Don't print device output at all.
    pub suppress_output: bool,

    /// Per-device time budget.
    pub timeout: Duration,

    /// How connections are opened (direct TCP or SOCKS5).
    pub dialer: Arc<dyn Dialer>,
}

impl Options {
    pub fn new() -> Self {
        Self {
            suppress_banner: true,
            suppress_admin: true,
            suppress_sending: true,
            suppress_output: false,
            timeout: Duration::from_secs(10),
            dialer: Arc::new(DirectDialer),
        }
    }

    /// Open a connection to `addr` through the configured dialer.
    pub async fn dial(&self, addr: &str) -> io::Result<BoxedStream> {
        self.dialer.dial(addr).await
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("suppress_banner", &self.suppress_banner)
            .field("suppress_admin", &self.suppress_admin)
            .field("suppress_sending", &self.suppress_sending)
            .field("suppress_output", &self.suppress_output)
            .field("timeout", &self.timeout)
            .field("dialer", &"<Dialer>")
            .finish()
    }
}
