//! Interactive SSH session layer.
//!
//! This module holds the screen-scraping state machine: the synchronized
//! transcript fed by the channel reader, the polling wait primitives, the
//! russh transport, and the `cmd`/`push` drivers built on top of them.

mod driver;
mod transcript;
mod transport;
mod waits;

pub use driver::{cmd, push, remove_prompt_suffix};
pub use transcript::Transcript;
pub(crate) use transport::connect_client;
pub use transport::{with_default_port, Shell};
pub use waits::{wait_for, wait_for_enter, wait_for_prompt, POLL_INTERVAL};
