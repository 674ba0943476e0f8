//! Bounded-concurrency fan-out over a device list.
//!
//! Workers run the driver against devices, retry failed attempts and report
//! through a channel to a single aggregator, which owns the progress line,
//! the stdout stream and the output files — concurrent workers never write
//! user-visible output themselves.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::warn;
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::checks;
use crate::error::{Error, SessionError};
use crate::ioutil;
use crate::options::Options;
use crate::session;
use crate::texttable;

/// Erase the current terminal line before repainting or interleaving other
/// output with the progress display.
pub const ERASE_LINE: &str = "\x1b[2K\r";

/// One per-device operation the scheduler can fan out: the command driver,
/// the push driver, or the check suite.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn run(
        &self,
        opts: &Options,
        device: &str,
        user: &str,
        password: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<String, Error>;
}

/// Runs one command and captures its output.
pub struct CmdDriver;

#[async_trait]
impl DeviceDriver for CmdDriver {
    async fn run(
        &self,
        opts: &Options,
        device: &str,
        user: &str,
        password: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        Ok(session::cmd(opts, device, user, password, payload, timeout).await?)
    }
}

/// Installs a configlet through the device's Tcl shell.
pub struct PushDriver;

#[async_trait]
impl DeviceDriver for PushDriver {
    async fn run(
        &self,
        opts: &Options,
        device: &str,
        user: &str,
        password: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        Ok(session::push(opts, device, user, password, payload, timeout).await?)
    }
}

/// Runs the health-check suite; the payload is ignored.
pub struct CheckDriver;

#[async_trait]
impl DeviceDriver for CheckDriver {
    async fn run(
        &self,
        opts: &Options,
        device: &str,
        user: &str,
        password: &str,
        _payload: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        let findings = checks::check_device(opts, device, user, password, timeout).await?;
        let lines: Vec<String> = findings
            .iter()
            .map(|f| format!("{} {}: {}", f.check_name, f.device, f.message))
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Scheduler knobs beyond the shared [`Options`].
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Maximum number of simultaneous devices.
    pub concurrency: usize,
    /// Attempts per device before the last error becomes final.
    pub retries: usize,
    /// Randomize device order before enqueueing.
    pub shuffle: bool,
    /// Prefix each output line with `device: `.
    pub show_device_name: bool,
    /// Per-device output file; `%s` is replaced with the device name.
    pub output_template: Option<String>,
    /// With an output template, skip devices whose file already exists.
    pub skip_if_output_exists: bool,
    /// Don't paint the progress line.
    pub suppress_progress: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            concurrency: 25,
            retries: 3,
            shuffle: false,
            show_device_name: true,
            output_template: None,
            skip_if_output_exists: false,
            suppress_progress: false,
        }
    }
}

/// Final per-run accounting, sorted by device name.
#[derive(Debug, Default)]
pub struct Summary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

/// The two sorted name sets rendered as column-wrapped text.
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str(&format!("succeeded ({}):\n", summary.succeeded.len()));
    out.push_str(&texttable::columns(&summary.succeeded, 4));
    out.push_str(&format!("failed ({}):\n", summary.failed.len()));
    out.push_str(&texttable::columns(&summary.failed, 4));
    out
}

enum Event {
    Started { device: String },
    Ended { device: String },
    Retry { device: String, attempt: usize, error: Error },
    Output { device: String, output: String },
    Failed { device: String, error: Error },
}

/// Run `driver` against every device with bounded concurrency, retries and
/// progress reporting. Returns when every device has exactly one final
/// outcome.
pub async fn run_devices(
    opts: &Options,
    config: &FanoutConfig,
    devices: &[String],
    user: &str,
    password: &str,
    payload: &str,
    driver: Arc<dyn DeviceDriver>,
) -> Summary {
    let mut devices: Vec<String> = devices.to_vec();

    let mut skipped = Vec::new();
    if let Some(template) = &config.output_template {
        if config.skip_if_output_exists {
            devices.retain(|device| {
                let path = template.replace("%s", device);
                if Path::new(&path).exists() {
                    skipped.push(device.clone());
                    false
                } else {
                    true
                }
            });
        }
    }

    if config.shuffle {
        devices.shuffle(&mut rand::thread_rng());
    }

    let total = devices.len();
    let retries = config.retries.max(1);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let (event_tx, event_rx) = mpsc::channel::<Event>(64);

    let mut workers = JoinSet::new();
    for device in devices {
        let opts = opts.clone();
        let driver = driver.clone();
        let semaphore = semaphore.clone();
        let event_tx = event_tx.clone();
        let user = user.to_string();
        let password = password.to_string();
        let payload = payload.to_string();

        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let _ = event_tx
                .send(Event::Started {
                    device: device.clone(),
                })
                .await;

            let mut last_error = None;
            for attempt in 1..=retries {
                // The driver enforces the timeout internally as well, but a
                // hung connection must not pin a worker forever.
                let attempt_result = tokio::time::timeout(
                    opts.timeout,
                    driver.run(&opts, &device, &user, &password, &payload, opts.timeout),
                )
                .await;

                let error = match attempt_result {
                    Ok(Ok(output)) => {
                        let _ = event_tx
                            .send(Event::Ended {
                                device: device.clone(),
                            })
                            .await;
                        let _ = event_tx.send(Event::Output { device, output }).await;
                        return;
                    }
                    Ok(Err(error)) => error,
                    Err(_) => Error::Session(SessionError::Timeout {
                        device: device.clone(),
                        budget: opts.timeout,
                    }),
                };

                if attempt < retries {
                    let _ = event_tx
                        .send(Event::Retry {
                            device: device.clone(),
                            attempt,
                            error,
                        })
                        .await;
                } else {
                    last_error = Some(error);
                }
            }

            // retries >= 1, so the last attempt always stored an error.
            let error = last_error.unwrap_or_else(|| {
                Error::Session(SessionError::Timeout {
                    device: device.clone(),
                    budget: opts.timeout,
                })
            });
            let _ = event_tx
                .send(Event::Ended {
                    device: device.clone(),
                })
                .await;
            let _ = event_tx.send(Event::Failed { device, error }).await;
        });
    }
    drop(event_tx);

    let summary = aggregate(opts, config, total, retries, event_rx, skipped).await;
    while workers.join_next().await.is_some() {}
    summary
}

/// Sole consumer of worker events and sole writer to the terminal.
async fn aggregate(
    opts: &Options,
    config: &FanoutConfig,
    total: usize,
    retries: usize,
    mut event_rx: mpsc::Receiver<Event>,
    skipped: Vec<String>,
) -> Summary {
    let started_at = Instant::now();
    let mut in_flight = 0usize;
    let mut ended = 0usize;
    let mut succeeded = BTreeSet::new();
    let mut failed = BTreeSet::new();

    while let Some(event) = event_rx.recv().await {
        match event {
            Event::Started { .. } => {
                in_flight += 1;
                paint_progress(config, total, in_flight, ended, started_at);
            }
            Event::Ended { .. } => {
                in_flight = in_flight.saturating_sub(1);
                ended += 1;
                paint_progress(config, total, in_flight, ended, started_at);
            }
            Event::Retry {
                device,
                attempt,
                error,
            } => {
                eprintln!("{ERASE_LINE}retrying {device:?} ({attempt}/{retries}): {error}");
                paint_progress(config, total, in_flight, ended, started_at);
            }
            Event::Output { device, output } => {
                if let Some(template) = &config.output_template {
                    let path = template.replace("%s", &device);
                    if let Err(error) = ioutil::replace_file(&path, &ioutil::dos2unix(&output)) {
                        warn!("failed to save output for router {device:?}: {error}");
                    }
                }
                if !opts.suppress_output {
                    for line in output.split('\n') {
                        if config.show_device_name {
                            println!("{device}: {line}");
                        } else {
                            println!("{line}");
                        }
                    }
                }
                succeeded.insert(device);
            }
            Event::Failed { device, error } => {
                eprintln!("{ERASE_LINE}error on {device:?}: {error}");
                failed.insert(device);
                paint_progress(config, total, in_flight, ended, started_at);
            }
        }
    }

    if !config.suppress_progress {
        eprintln!();
    }

    Summary {
        succeeded: succeeded.into_iter().collect(),
        failed: failed.into_iter().collect(),
        skipped,
    }
}

/// `remaining/in-flight/ended/total pct elapsed/eta finish@time`, repainted
/// in place.
fn paint_progress(
    config: &FanoutConfig,
    total: usize,
    in_flight: usize,
    ended: usize,
    started_at: Instant,
) {
    if config.suppress_progress {
        return;
    }
    let remaining = total.saturating_sub(in_flight + ended);
    let pct = 100 * ended / total.max(1);
    let elapsed = whole_seconds(started_at.elapsed());
    let eta = if ended > 0 {
        whole_seconds(started_at.elapsed() * (total - ended) as u32 / ended as u32)
    } else {
        Duration::ZERO
    };
    let finish = Local::now() + chrono::Duration::seconds(eta.as_secs() as i64);
    eprint!(
        "{ERASE_LINE}{remaining}/{in_flight}/{ended}/{total} {pct}% {elapsed:?}/{eta:?} finish@{}",
        finish.format("%H:%M:%S")
    );
}

fn whole_seconds(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn quiet_config() -> FanoutConfig {
        FanoutConfig {
            suppress_progress: true,
            ..FanoutConfig::default()
        }
    }

    fn quiet_opts() -> Options {
        Options {
            suppress_output: true,
            timeout: Duration::from_secs(5),
            ..Options::new()
        }
    }

    fn devices(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("rtr{i}")).collect()
    }

    /// Driver that sleeps briefly and returns the device name, tracking how
    /// many invocations overlap.
    struct CountingDriver {
        current: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl CountingDriver {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DeviceDriver for CountingDriver {
        async fn run(
            &self,
            _opts: &Options,
            device: &str,
            _user: &str,
            _password: &str,
            _payload: &str,
            _timeout: Duration,
        ) -> Result<String, Error> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(device.to_string())
        }
    }

    #[tokio::test]
    async fn test_all_devices_succeed_with_bounded_concurrency() {
        let driver = Arc::new(CountingDriver::new());
        let config = FanoutConfig {
            concurrency: 3,
            ..quiet_config()
        };

        let summary = run_devices(
            &quiet_opts(),
            &config,
            &devices(10),
            "user",
            "pw",
            "show version",
            driver.clone(),
        )
        .await;

        assert_eq!(summary.succeeded.len(), 10);
        assert!(summary.failed.is_empty());
        assert!(driver.max_seen.load(Ordering::SeqCst) <= 3);
    }

    /// Driver that fails the first attempt for every device.
    struct FlakyDriver {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DeviceDriver for FlakyDriver {
        async fn run(
            &self,
            _opts: &Options,
            device: &str,
            _user: &str,
            _password: &str,
            _payload: &str,
            timeout: Duration,
        ) -> Result<String, Error> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                return Err(Error::Session(SessionError::Timeout {
                    device: device.to_string(),
                    budget: timeout,
                }));
            }
            Ok(device.to_string())
        }
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let driver = Arc::new(FlakyDriver {
            attempts: AtomicUsize::new(0),
        });

        let summary = run_devices(
            &quiet_opts(),
            &quiet_config(),
            &devices(1),
            "user",
            "pw",
            "show version",
            driver,
        )
        .await;

        assert_eq!(summary.succeeded, vec!["rtr0"]);
        assert!(summary.failed.is_empty());
    }

    /// Driver that always fails.
    struct FailingDriver {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DeviceDriver for FailingDriver {
        async fn run(
            &self,
            _opts: &Options,
            device: &str,
            _user: &str,
            _password: &str,
            _payload: &str,
            timeout: Duration,
        ) -> Result<String, Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Session(SessionError::Timeout {
                device: device.to_string(),
                budget: timeout,
            }))
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_exactly_once() {
        let driver = Arc::new(FailingDriver {
            attempts: AtomicUsize::new(0),
        });
        let config = FanoutConfig {
            retries: 3,
            ..quiet_config()
        };

        let summary = run_devices(
            &quiet_opts(),
            &config,
            &devices(1),
            "user",
            "pw",
            "show version",
            driver.clone(),
        )
        .await;

        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.failed, vec!["rtr0"]);
        assert_eq!(driver.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_skip_if_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("rtr0.txt");
        std::fs::write(&existing, "already collected\n").unwrap();

        let config = FanoutConfig {
            output_template: Some(format!("{}/%s.txt", dir.path().display())),
            skip_if_output_exists: true,
            ..quiet_config()
        };
        let driver = Arc::new(CountingDriver::new());

        let summary = run_devices(
            &quiet_opts(),
            &config,
            &devices(2),
            "user",
            "pw",
            "show version",
            driver,
        )
        .await;

        assert_eq!(summary.skipped, vec!["rtr0"]);
        assert_eq!(summary.succeeded, vec!["rtr1"]);
        // rtr0's file is untouched; rtr1's was written.
        assert_eq!(
            std::fs::read_to_string(&existing).unwrap(),
            "already collected\n"
        );
        assert!(dir.path().join("rtr1.txt").exists());
    }

    #[tokio::test]
    async fn test_shuffle_covers_every_device() {
        let config = FanoutConfig {
            shuffle: true,
            ..quiet_config()
        };
        let driver = Arc::new(CountingDriver::new());

        let summary = run_devices(
            &quiet_opts(),
            &config,
            &devices(8),
            "user",
            "pw",
            "show version",
            driver,
        )
        .await;

        // Order is randomized, membership is not; the summary is sorted.
        assert_eq!(summary.succeeded, devices(8));
    }

    #[test]
    fn test_render_summary() {
        let summary = Summary {
            succeeded: vec!["rtr1".to_string(), "rtr2".to_string()],
            failed: vec!["rtr3".to_string()],
            skipped: vec![],
        };
        let rendered = render_summary(&summary);
        assert!(rendered.contains("succeeded (2):"));
        assert!(rendered.contains("failed (1):"));
        assert!(rendered.contains("rtr3"));
    }
}
