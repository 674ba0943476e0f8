//! Error types for netpush.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netpush operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Interactive SSH session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// TextFSM template parse/execute errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Indented-config parse/apply errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Health-check errors
    #[error("Check error: {0}")]
    Check(#[from] CheckError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while driving an interactive SSH session.
///
/// Every variant names the device so that fan-out output stays attributable.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The dialer could not reach the device.
    #[error("failed to connect to device {device:?} as user {user:?}: {source}")]
    Connect {
        device: String,
        user: String,
        #[source]
        source: io::Error,
    },

    /// SSH protocol negotiation or the authentication exchange failed.
    #[error("failed to negotiate ssh with device {device:?}: {source}")]
    Negotiate {
        device: String,
        #[source]
        source: russh::Error,
    },

    /// All offered auth methods were rejected.
    #[error("authentication failed on device {device:?} for user {user:?}")]
    Auth { device: String, user: String },

    /// Could not open a session channel.
    #[error("failed to get session on device {device:?}: {source}")]
    SessionOpen {
        device: String,
        #[source]
        source: russh::Error,
    },

    /// PTY allocation was refused.
    #[error("failed to get pty on device {device:?}: {source}")]
    PtyRequest {
        device: String,
        #[source]
        source: russh::Error,
    },

    /// Shell request was refused.
    #[error("failed to get shell on device {device:?}: {source}")]
    ShellStart {
        device: String,
        #[source]
        source: russh::Error,
    },

    /// A write to the remote stdin failed; `what` is the command that was
    /// being sent.
    #[error("failed to run command {what:?} on device {device:?}")]
    Write { device: String, what: String },

    /// The per-device time budget was consumed.
    #[error("timeout of {budget:?} hit on device {device:?}")]
    Timeout { device: String, budget: Duration },

    /// The device rejected one or more configlet lines. The transcript is
    /// carried along so the operator can diagnose the push.
    #[error("error in configlet on device {device:?}:\n{}", offending.join("\n"))]
    InvalidInput {
        device: String,
        offending: Vec<String>,
        transcript: String,
    },
}

/// Errors from the TextFSM template parser and executor.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Structural error in the template text.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A regular expression in the template failed to compile.
    #[error("line {line}: invalid regular expression {regex:?}: {source}")]
    Regex {
        line: usize,
        regex: String,
        #[source]
        source: regex::Error,
    },

    /// An `Error` rule fired while parsing input.
    #[error("error: {message}. Rule line: {rule_line}. Input line: {input:?}")]
    Execute {
        message: String,
        rule_line: usize,
        input: String,
    },
}

/// Errors from the indented-config parser.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A subsection failed to make progress while parsing.
    #[error("failed to advance in subsection at line {line:?}")]
    Parse { line: String },
}

/// Errors from the health-check suite.
#[derive(Error, Debug)]
pub enum CheckError {
    /// A check could not parse a command's output.
    #[error("check {check:?} failed to parse output on device {device:?}: {source}")]
    Parse {
        check: String,
        device: String,
        #[source]
        source: TemplateError,
    },
}

/// Result type alias using netpush's Error.
pub type Result<T> = std::result::Result<T, Error>;
