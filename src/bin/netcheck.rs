//! netcheck: run the health-check suite against network devices.

use std::io::Read as _;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::error;

use netpush::configfile::ConfigFile;
use netpush::{
    make_dialer, pwcache, render_summary, run_devices, CheckDriver, FanoutConfig, Options,
};

/// Tool to check router state.
#[derive(Parser, Debug)]
#[command(name = "netcheck", version, about)]
struct Cli {
    /// A device to check
    #[arg(long)]
    device: Option<String>,

    /// File with a list of devices to check, one per line
    #[arg(long)]
    devicefile: Option<String>,

    /// Read the list of devices from stdin (don't forget to CTRL-D, or provide EOF)
    #[arg(long)]
    devicestdin: bool,

    /// Comma-separated list of routers
    #[arg(long)]
    devices: Option<String>,

    /// Suppress the SSH banner and login
    #[arg(long = "suppress_banner", num_args = 0..=1, default_missing_value = "true")]
    suppress_banner: Option<bool>,

    /// Suppress administrative information
    #[arg(long = "suppress_admin", num_args = 0..=1, default_missing_value = "true")]
    suppress_admin: Option<bool>,

    /// Suppress what is being sent to the router
    #[arg(long = "suppress_sending", num_args = 0..=1, default_missing_value = "true")]
    suppress_sending: Option<bool>,

    /// Don't print findings
    #[arg(long = "suppress_output", num_args = 0..=1, default_missing_value = "true")]
    suppress_output: Option<bool>,

    /// Don't show the progress indicator
    #[arg(long = "suppress_progress", num_args = 0..=1, default_missing_value = "true")]
    suppress_progress: Option<bool>,

    /// Username to use for login
    #[arg(long)]
    username: Option<String>,

    /// Retries (per device)
    #[arg(long)]
    retries: Option<usize>,

    /// Timeout per device, in seconds
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

    /// Devices, as plain arguments
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

    if cli.device.is_none() && cli.devices.is_none() && cli.devicefile.is_none() {
        if let Some(first) = cli.args.first() {
            cli.device = Some(first.clone());
        }
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
        concurrency: cli
            .limit
            .or_else(|| file.get_u64("limit").map(|v| v as usize))
            .unwrap_or(25),
        retries: cli
            .retries
            .or_else(|| file.get_u64("retries").map(|v| v as usize))
            .unwrap_or(3),
        // Findings carry the device name already.
        show_device_name: false,
        suppress_progress: cli
            .suppress_progress
            .or_else(|| file.get_bool("suppress_progress"))
            .unwrap_or(false),
        ..FanoutConfig::default()
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

    let devices = if let Some(device) = cli.device {
        vec![device]
    } else if let Some(list) = cli.devices {
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

    let summary = run_devices(
        &opts,
        &config,
        &devices,
        &username,
        &password,
        "",
        Arc::new(CheckDriver),
    )
    .await;
    print!("{}", render_summary(&summary));
}
