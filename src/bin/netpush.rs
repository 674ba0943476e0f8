//! netpush: execute commands on network devices and push configuration.

use std::io::Read as _;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::error;

use netpush::configfile::ConfigFile;
use netpush::{
    fanout, ioutil, make_dialer, pwcache, render_summary, run_devices, session, shell,
    CmdDriver, FanoutConfig, Options, PushDriver, SessionError,
};

/// Tool to send commands to Cisco and Juniper routers.
///
/// Simplest usage:
///
///     netpush rtr1 show version
#[derive(Parser, Debug)]
#[command(name = "netpush", version, about)]
struct Cli {
    /// A device to execute commands on
    #[arg(long)]
    device: Option<String>,

    /// File with a list of devices to execute commands on, one per line
    #[arg(long)]
    devicefile: Option<String>,

    /// Read the list of devices from stdin (don't forget to CTRL-D, or provide EOF)
    #[arg(long)]
    devicestdin: bool,

    /// Comma-separated list of routers
    #[arg(long)]
    devices: Option<String>,

    /// A command to execute
    #[arg(long)]
    cmd: Option<String>,

    /// Something to put into the configuration. With a file: prefix, it is
    /// read from that file
    #[arg(long)]
    push: Option<String>,

    /// Create an interactive shell on the device
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Suppress the SSH banner and login
    #[arg(long = "suppress_banner", num_args = 0..=1, default_missing_value = "true")]
    suppress_banner: Option<bool>,

    /// Suppress administrative information
    #[arg(long = "suppress_admin", num_args = 0..=1, default_missing_value = "true")]
    suppress_admin: Option<bool>,

    /// Suppress what is being sent to the router
    #[arg(long = "suppress_sending", num_args = 0..=1, default_missing_value = "true")]
    suppress_sending: Option<bool>,

    /// Don't print router output
    #[arg(long = "suppress_output", num_args = 0..=1, default_missing_value = "true")]
    suppress_output: Option<bool>,

    /// Don't show the progress indicator
    #[arg(long = "suppress_progress", num_args = 0..=1, default_missing_value = "true")]
    suppress_progress: Option<bool>,

    /// Prefix output from routers with the device name
    #[arg(long = "devicename", num_args = 0..=1, default_missing_value = "true")]
    devicename: Option<bool>,

    /// Template for files to save the output in; %s gets replaced with the
    /// device name
    #[arg(long)]
    output: Option<String>,

    /// Skip devices whose output file already exists
    #[arg(long = "skip_existing")]
    skip_existing: bool,

    /// Randomize the device order
    #[arg(long)]
    shuffle: bool,

    /// Username to use for login
    #[arg(long)]
    username: Option<String>,

    /// Retries (per device)
    #[arg(long)]
    retries: Option<usize>,

    /// Timeout for the command, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum number of simultaneous devices
    #[arg(long)]
    limit: Option<usize>,

    /// Allowed to cache the password in /dev/shm
    #[arg(long = "pw_cache_allowed", num_args = 0..=1, default_missing_value = "true")]
    pw_cache_allowed: Option<bool>,

    /// Forcibly clear the password cache
    #[arg(long = "pw_clear_cache")]
    pw_clear_cache: bool,

    /// SOCKS5 proxy to use
    #[arg(long)]
    socks: Option<String>,

    /// Device and command words, as plain arguments
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn get_user() -> String {
    let username = std::env::var("USER").unwrap_or_default();
    match username.strip_prefix("adm1-") {
        Some(stripped) => stripped.to_string(),
        None => username,
    }
}

/// Trim entries and drop empty strings from a device list.
fn filter_empty_devices(devices: Vec<String>) -> Vec<String> {
    devices
        .into_iter()
        .map(|device| device.trim().to_string())
        .filter(|device| !device.is_empty())
        .collect()
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let file = ConfigFile::load("~/.netpush");
    let mut cli = Cli::parse();

    // Allow device and command arguments to be passed in as plain args.
    if cli.device.is_none()
        && cli.devices.is_none()
        && cli.devicefile.is_none()
        && cli.args.len() == 1
        && cli.cmd.is_none()
        && cli.push.is_none()
    {
        cli.device = Some(cli.args[0].clone());
        cli.interactive = true;
    } else if cli.device.is_none() && cli.cmd.is_none() && cli.args.len() >= 2 {
        cli.device = Some(cli.args[0].clone());
        cli.cmd = Some(cli.args[1..].join(" "));
    }

    let command = cli.cmd.or_else(|| file.get_str("cmd"));
    let push = cli.push;
    if command.is_none() && push.is_none() && !cli.interactive {
        error!("you didn't pass in a command or a configlet");
        exit(1);
    }

    let username = cli
        .username
        .or_else(|| file.get_str("username"))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(get_user);

    let socks = cli.socks.or_else(|| file.get_str("socks"));
    let timeout = cli.timeout.or_else(|| file.get_u64("timeout")).unwrap_or(10);

    let mut opts = Options::new();
    opts.suppress_banner = cli
        .suppress_banner
        .or_else(|| file.get_bool("suppress_banner"))
        .unwrap_or(true);
    opts.suppress_admin = cli
        .suppress_admin
        .or_else(|| file.get_bool("suppress_admin"))
        .unwrap_or(true);
    opts.suppress_sending = cli
        .suppress_sending
        .or_else(|| file.get_bool("suppress_sending"))
        .unwrap_or(true);
    opts.suppress_output = cli
        .suppress_output
        .or_else(|| file.get_bool("suppress_output"))
        .unwrap_or(false);
    opts.timeout = Duration::from_secs(timeout);
    opts.dialer = make_dialer(socks.as_deref());

    let config = FanoutConfig {
        concurrency: cli.limit.or_else(|| file.get_u64("limit").map(|v| v as usize)).unwrap_or(25),
        retries: cli
            .retries
            .or_else(|| file.get_u64("retries").map(|v| v as usize))
            .unwrap_or(3),
        shuffle: cli.shuffle,
        show_device_name: cli
            .devicename
            .or_else(|| file.get_bool("devicename"))
            .unwrap_or(true),
        output_template: cli.output.or_else(|| file.get_str("output")),
        skip_if_output_exists: cli.skip_existing,
        suppress_progress: cli
            .suppress_progress
            .or_else(|| file.get_bool("suppress_progress"))
            .unwrap_or(false),
    };

    let cache_allowed = cli
        .pw_cache_allowed
        .or_else(|| file.get_bool("pw_cache_allowed"))
        .unwrap_or(true);
    let password = match pwcache::get_password(cache_allowed, cli.pw_clear_cache) {
        Ok(password) => password,
        Err(err) => {
            error!("error getting password for user: {err}");
            exit(1);
        }
    };
    if cli.pw_clear_cache {
        return;
    }

    if let Some(device) = cli.device {
        run_single_device(
            &opts, &config, &device, &username, &password, command, push, cli.interactive,
        )
        .await;
        return;
    }

    let devices = if let Some(list) = cli.devices {
        filter_empty_devices(list.split(',').map(str::to_string).collect())
    } else if let Some(path) = cli.devicefile {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                error!("failed to read device file {path:?}: {err}");
                exit(1);
            }
        };
        filter_empty_devices(contents.split('\n').map(str::to_string).collect())
    } else if cli.devicestdin {
        let mut contents = String::new();
        if let Err(err) = std::io::stdin().read_to_string(&mut contents) {
            error!("failed to read devices from stdin: {err}");
            exit(1);
        }
        filter_empty_devices(contents.split('\n').map(str::to_string).collect())
    } else {
        error!("you didn't pass in a device");
        exit(1);
    };

    let (payload, driver): (String, Arc<dyn fanout::DeviceDriver>) = match &push {
        Some(raw) => match ioutil::read_payload(raw) {
            Ok(configlet) => (configlet, Arc::new(PushDriver) as _),
            Err(err) => {
                error!("failed to read push lines from {raw:?}: {err}");
                exit(1);
            }
        },
        None => (command.unwrap_or_default(), Arc::new(CmdDriver) as _),
    };

    let summary = run_devices(
        &opts, &config, &devices, &username, &password, &payload, driver,
    )
    .await;
    print!("{}", render_summary(&summary));
}

#[allow(clippy::too_many_arguments)]
async fn run_single_device(
    opts: &Options,
    config: &FanoutConfig,
    device: &str,
    username: &str,
    password: &str,
    command: Option<String>,
    push: Option<String>,
    interactive: bool,
) {
    if interactive {
        if let Err(err) = shell::interactive(opts, device, username, password).await {
            error!("failed to start interactive shell: {err}");
            exit(1);
        }
        return;
    }

    let mut output = String::new();
    if let Some(command) = &command {
        output = match session::cmd(opts, device, username, password, command, opts.timeout).await
        {
            Ok(output) => output,
            Err(err) => {
                error!("failed to execute command {command:?} on device {device:?}: {err}");
                exit(1);
            }
        };
    }
    if let Some(raw) = &push {
        let configlet = match ioutil::read_payload(raw) {
            Ok(configlet) => configlet,
            Err(err) => {
                error!("failed to read push lines from {raw:?}: {err}");
                exit(1);
            }
        };
        log::info!("pushing to {device:?}: {configlet:?}");
        output = match session::push(opts, device, username, password, &configlet, opts.timeout)
            .await
        {
            Ok(output) => output,
            Err(SessionError::InvalidInput {
                offending,
                transcript,
                ..
            }) => {
                // Show the full transcript so the operator can diagnose
                // which configlet lines the device rejected.
                eprintln!("{transcript}");
                error!(
                    "device {device:?} rejected configlet lines:\n{}",
                    offending.join("\n")
                );
                exit(1);
            }
            Err(err) => {
                error!("failed to commit configlet on device {device:?}: {err}");
                exit(1);
            }
        };
    }

    if let Some(template) = &config.output_template {
        let path = template.replace("%s", device);
        if let Err(err) = ioutil::append_to_file(&path, &ioutil::dos2unix(&output)) {
            error!("failed to save output for router {device:?}: {err}");
        }
    }
    if !opts.suppress_output {
        println!("{output}");
    }
}
