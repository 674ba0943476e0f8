//! Cmd and Push: the two operations the tool performs on a device.
//!
//! Both log in over SSH, type into a PTY the way a human would, and scrape
//! the transcript. The sleeps between writes are pacing for slow device
//! command parsers, not synchronization — do not remove them.

use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use super::transport::{check_deadline, Shell};
use super::waits::{wait_for, wait_for_enter, wait_for_prompt};
use crate::error::SessionError;
use crate::options::Options;

/// Disable the "more" paging prompt on cisco routers.
const NO_MORE: &str = "terminal length 0";
const EXIT_COMMAND: &str = "exit";
const WR_COMMAND: &str = "wr";

const START_TCLSH: &str = "tclsh";
const CONFIG_TEMPLATE_OPEN: &str = "puts [open \"flash:configlet\" w+] {";
const CONFIG_TEMPLATE_CLOSE: &str = "}";
const QUIT_TCLSH: &str = "exit";
const COMMIT_CONFIG: &str = "copy flash:configlet running-config";
const CONFIRM: &str = "y";

/// Contract with the device: IOS flags bad configlet lines with this.
const INVALID_INPUT: &str = "Invalid input";

const PROMPT_WAIT: Duration = Duration::from_secs(2);
const QUESTION_WAIT: Duration = Duration::from_secs(5);
const COMMAND_PACE: Duration = Duration::from_millis(200);
const SHORT_PACE: Duration = Duration::from_millis(100);
const LINE_PACE: Duration = Duration::from_millis(20);

/// Strip the trailing prompt (and the echoed `exit`) from captured output.
pub fn remove_prompt_suffix(output: &str) -> String {
    let lines: Vec<&str> = output
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return output.to_string();
    }

    let mut last = lines.len();
    let trim = lines[last - 1].trim_matches(' ');
    if trim.ends_with('#') || trim.ends_with('>') {
        last -= 1;
    }
    if last > 0 {
        let trim = lines[last - 1].trim_matches(' ');
        if trim.ends_with(&format!("#{EXIT_COMMAND}")) || trim.ends_with(&format!(">{EXIT_COMMAND}"))
        {
            last -= 1;
        }
    }
    lines[..last].join("\n")
}

/// Execute a command on a device and return the output.
pub async fn cmd(
    opts: &Options,
    device: &str,
    user: &str,
    password: &str,
    command: &str,
    timeout: Duration,
) -> Result<String, SessionError> {
    debug!("cmd on {device} with timeout of {timeout:?}");
    let deadline = Instant::now() + timeout;

    let mut shell = Shell::open(opts, device, user, password, deadline).await?;
    let transcript = shell.transcript().clone();
    let mut narration = String::new();

    // Absorb the banner and login chatter.
    wait_for_prompt(&transcript, PROMPT_WAIT, opts.suppress_banner).await;
    check_deadline(device, deadline, timeout)?;

    if !opts.suppress_sending {
        narration.push_str(&format!("sending {NO_MORE:?}\n"));
    }
    shell.send(NO_MORE, format!("{NO_MORE}\r").as_bytes()).await?;
    if opts.suppress_admin {
        wait_for_prompt(&transcript, PROMPT_WAIT, false).await;
        transcript.reset();
    }
    check_deadline(device, deadline, timeout)?;

    if !opts.suppress_sending {
        narration.push_str(&format!("sending {command:?}\n"));
    }
    let mut to_send = command.to_string();
    if !to_send.ends_with('\r') {
        to_send.push('\r');
    }
    shell.send(command, to_send.as_bytes()).await?;
    tokio::time::sleep(COMMAND_PACE).await;
    if opts.suppress_sending {
        // Drop the command echo: wait for its newline, then discard through
        // the carriage return.
        wait_for_enter(&transcript, PROMPT_WAIT).await;
        transcript.discard_until(b'\r');
    }
    check_deadline(device, deadline, timeout)?;

    if !opts.suppress_sending {
        narration.push_str(&format!("sending {EXIT_COMMAND:?}\n"));
    }
    shell
        .send(EXIT_COMMAND, format!("{EXIT_COMMAND}\r\n").as_bytes())
        .await?;

    // The session closing is the only reliable "command finished" signal.
    let remaining = check_deadline(device, deadline, timeout)?;
    if tokio::time::timeout(remaining, shell.wait_session_end())
        .await
        .is_err()
    {
        return Err(SessionError::Timeout {
            device: device.to_string(),
            budget: timeout,
        });
    }

    let output = format!("{narration}{}", transcript.snapshot());
    shell.close().await;
    Ok(remove_prompt_suffix(&output))
}

/// Install a configlet on a device via its embedded Tcl shell.
///
/// The configlet is written to `flash:configlet` and copied onto the running
/// config; this avoids walking into config mode line by line. `;` in the
/// configlet acts as a newline sentinel. The transcript is the result.
pub async fn push(
    opts: &Options,
    device: &str,
    user: &str,
    password: &str,
    configlet: &str,
    timeout: Duration,
) -> Result<String, SessionError> {
    debug!("push to {device} with timeout of {timeout:?}");
    let deadline = Instant::now() + timeout;

    let shell = Shell::open(opts, device, user, password, deadline).await?;
    let transcript = shell.transcript().clone();

    wait_for_prompt(&transcript, PROMPT_WAIT, opts.suppress_banner).await;

    shell
        .send(NO_MORE, format!("{NO_MORE}\r\n").as_bytes())
        .await?;
    wait_for_prompt(&transcript, PROMPT_WAIT, false).await;
    if opts.suppress_sending {
        transcript.discard_until(b'\r');
    }
    check_deadline(device, deadline, timeout)?;

    shell
        .send(START_TCLSH, format!("{START_TCLSH}\r\n").as_bytes())
        .await?;
    tokio::time::sleep(COMMAND_PACE).await;
    shell
        .send(
            CONFIG_TEMPLATE_OPEN,
            format!("{CONFIG_TEMPLATE_OPEN}\r").as_bytes(),
        )
        .await?;
    tokio::time::sleep(COMMAND_PACE).await;

    // Expand ";" to newlines to allow single-line configlets on the command
    // line; pace each line so the device's parser keeps up.
    let expanded = configlet.replace(';', "\n");
    for line in expanded.split('\n') {
        shell.send(line, format!("{line}\r").as_bytes()).await?;
        tokio::time::sleep(LINE_PACE).await;
    }

    shell
        .send(
            CONFIG_TEMPLATE_CLOSE,
            format!("{CONFIG_TEMPLATE_CLOSE}\r").as_bytes(),
        )
        .await?;
    tokio::time::sleep(SHORT_PACE).await;
    shell
        .send(QUIT_TCLSH, format!("{QUIT_TCLSH}\r").as_bytes())
        .await?;
    tokio::time::sleep(SHORT_PACE).await;
    check_deadline(device, deadline, timeout)?;

    shell
        .send(COMMIT_CONFIG, format!("{COMMIT_CONFIG}\r").as_bytes())
        .await?;
    tokio::time::sleep(SHORT_PACE).await;

    // The copy command asks a question; the default is right for the
    // destination filename, anything else gets a "y".
    wait_for(&transcript, "?", QUESTION_WAIT).await;
    if transcript.last_line().contains("Destination filename") {
        shell.send(COMMIT_CONFIG, b"\r").await?;
    } else {
        shell.send(CONFIRM, format!("{CONFIRM}\r").as_bytes()).await?;
    }
    tokio::time::sleep(COMMAND_PACE).await;

    shell
        .send(WR_COMMAND, format!("{WR_COMMAND}\r").as_bytes())
        .await?;
    tokio::time::sleep(COMMAND_PACE).await;
    shell
        .send(EXIT_COMMAND, format!("{EXIT_COMMAND}\r").as_bytes())
        .await?;
    tokio::time::sleep(COMMAND_PACE).await;

    wait_for_prompt(&transcript, PROMPT_WAIT, false).await;

    let output = transcript.snapshot();
    shell.close().await;

    if output.contains(INVALID_INPUT) {
        let offending: Vec<String> = output
            .lines()
            .filter(|line| line.contains(INVALID_INPUT))
            .map(str::to_string)
            .collect();
        return Err(SessionError::InvalidInput {
            device: device.to_string(),
            offending,
            transcript: output,
        });
    }

    Ok(output)
}
