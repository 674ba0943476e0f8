//! # netpush
//!
//! Run commands and push configlets on fleets of network devices (Cisco
//! IOS / IOS XR / Juniper) over interactive SSH shells.
//!
//! Device CLIs do not speak a machine protocol; netpush drives them the way
//! a human would, with a screen-scraping session driver, and layers a
//! bounded-concurrency scheduler with retries and progress on top.
//!
//! ## Pieces
//!
//! - [`session`] — the interactive SSH driver: transcript buffer, polling
//!   wait primitives, and the `cmd`/`push` operations.
//! - [`fanout`] — the worker pool that runs a driver against many devices.
//! - [`config`] — the indented-config parser: tree, formal rendering and
//!   configlet merge simulation.
//! - [`textfsm`] — a TextFSM engine for extracting tabular data from CLI
//!   output, with bundled `show interfaces` / `show bgp summary` templates.
//! - [`checks`] — device health checks built on the two above.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use netpush::{session, Options};
//!
//! #[tokio::main]
//! async fn main() -> netpush::Result<()> {
//!     let opts = Options::new();
//!     let output = session::cmd(
//!         &opts,
//!         "rtr1.example.net",
//!         "admin",
//!         "secret",
//!         "show version",
//!         Duration::from_secs(10),
//!     )
//!     .await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```

pub mod checks;
pub mod config;
pub mod configfile;
pub mod error;
pub mod fanout;
pub mod ioutil;
pub mod options;
pub mod pwcache;
pub mod session;
pub mod shell;
pub mod texttable;
pub mod textfsm;

// Re-export main types for convenience.
pub use error::{CheckError, ConfigError, Error, Result, SessionError, TemplateError};
pub use fanout::{
    render_summary, run_devices, CheckDriver, CmdDriver, DeviceDriver, FanoutConfig, PushDriver,
    Summary,
};
pub use options::{make_dialer, Dialer, DirectDialer, Options, Socks5Dialer};
