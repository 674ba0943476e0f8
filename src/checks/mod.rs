//! Device health checks.
//!
//! A check names the commands it needs and an analyzer over their collected
//! outputs. The orchestrator runs the union of all commands once per device,
//! then feeds every check from the same output map.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CheckError, Error};
use crate::options::Options;
use crate::session;
use crate::textfsm::{
    parse_typed_cisco_ios_show_bgp_summary, parse_typed_cisco_ios_show_interfaces,
};

/// A single human-readable problem found on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check_name: String,
    pub device: String,
    pub message: String,
}

impl Finding {
    fn new(check_name: &str, device: &str, message: String) -> Self {
        Self {
            check_name: check_name.to_string(),
            device: device.to_string(),
            message,
        }
    }
}

type AnalyzeFn = fn(&str, &HashMap<String, String>) -> Result<Vec<Finding>, CheckError>;

/// A registered check: the commands it consumes and its analyzer.
pub struct Check {
    pub name: &'static str,
    pub commands: &'static [&'static str],
    pub analyze: AnalyzeFn,
}

/// The compile-time check registry.
pub fn checks() -> &'static [Check] {
    &[
        Check {
            name: "CheckInterfaces",
            commands: &["show interfaces"],
            analyze: check_interfaces,
        },
        Check {
            name: "CheckBgpSummary",
            commands: &["show bgp summary"],
            analyze: check_bgp_summary,
        },
    ]
}

/// The union of all checks' commands, in registry order.
pub fn check_commands() -> Vec<&'static str> {
    let mut result: Vec<&'static str> = Vec::new();
    for check in checks() {
        for cmd in check.commands {
            if !result.contains(cmd) {
                result.push(cmd);
            }
        }
    }
    result
}

/// Run every registered check against one device's collected outputs.
pub fn run_checks(
    device: &str,
    cmd_results: &HashMap<String, String>,
) -> Result<Vec<Finding>, CheckError> {
    let mut findings = Vec::new();
    for check in checks() {
        findings.extend((check.analyze)(device, cmd_results)?);
    }
    Ok(findings)
}

/// Collect the needed command outputs from a device over a fresh session per
/// command, then analyze.
pub async fn check_device(
    opts: &Options,
    device: &str,
    user: &str,
    password: &str,
    timeout: Duration,
) -> Result<Vec<Finding>, Error> {
    let mut cmd_results = HashMap::new();
    for cmd in check_commands() {
        let output = session::cmd(opts, device, user, password, cmd, timeout).await?;
        cmd_results.insert(cmd.to_string(), output);
    }
    Ok(run_checks(device, &cmd_results)?)
}

/// Missing output for a command a check depends on is a finding, not an
/// error: the rest of the suite still runs.
fn missing_output(check: &str, device: &str, cmd: &str) -> Finding {
    Finding::new(check, device, format!("missing output for {cmd:?}"))
}

/// Flag interfaces that are neither (up, up) nor (administratively down,
/// down), and any non-zero error counter.
fn check_interfaces(
    device: &str,
    cmd_results: &HashMap<String, String>,
) -> Result<Vec<Finding>, CheckError> {
    const NAME: &str = "CheckInterfaces";

    let Some(output) = cmd_results.get("show interfaces") else {
        return Ok(vec![missing_output(NAME, device, "show interfaces")]);
    };

    let rows = parse_typed_cisco_ios_show_interfaces(output).map_err(|source| {
        CheckError::Parse {
            check: NAME.to_string(),
            device: device.to_string(),
            source,
        }
    })?;

    let mut findings = Vec::new();
    for row in &rows {
        match (row.link_status.as_str(), row.protocol_status.as_str()) {
            ("up", "up") => {}
            ("administratively down", "down") => {}
            (link, protocol) => findings.push(Finding::new(
                NAME,
                device,
                format!("{}: admin {link:?} protocol {protocol:?}", row.intf),
            )),
        }

        let counters = [
            (&row.runts, "runts"),
            (&row.giants, "giants"),
            (&row.input_errors, "input errors"),
            (&row.crc, "CRC errors"),
            (&row.overrun, "frame overruns"),
            (&row.abort, "abort errors"),
            (&row.output_errors, "output errors"),
        ];
        for (count, what) in counters {
            if !count.is_empty() && count != "0" {
                findings.push(Finding::new(
                    NAME,
                    device,
                    format!("{}: {count} {what}", row.intf),
                ));
            }
        }
    }
    Ok(findings)
}

/// Flag BGP neighbors whose State/PfxRcd column is not a prefix count:
/// Idle, Active and Connect all mean the session is not established.
fn check_bgp_summary(
    device: &str,
    cmd_results: &HashMap<String, String>,
) -> Result<Vec<Finding>, CheckError> {
    const NAME: &str = "CheckBgpSummary";

    let Some(output) = cmd_results.get("show bgp summary") else {
        return Ok(vec![missing_output(NAME, device, "show bgp summary")]);
    };

    let rows = parse_typed_cisco_ios_show_bgp_summary(output).map_err(|source| {
        CheckError::Parse {
            check: NAME.to_string(),
            device: device.to_string(),
            source,
        }
    })?;

    let mut findings = Vec::new();
    for row in &rows {
        if !row.status.is_empty() {
            findings.push(Finding::new(
                NAME,
                device,
                format!("{}: state {:?}", row.remote_ip, row.status),
            ));
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(cmd: &str, output: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(cmd.to_string(), output.to_string());
        map
    }

    #[test]
    fn test_check_interfaces() {
        let dev = "router1";

        struct Test {
            comment: &'static str,
            output: &'static str,
            want: Vec<Finding>,
        }

        let tests = [
            Test {
                comment: "good interface",
                output: "GigabitEthernet0/1 is up, line protocol is up  \nDescription: good\n",
                want: vec![],
            },
            Test {
                comment: "good interface, but down",
                output:
                    "GigabitEthernet0/1 is administratively down, line protocol is down \nDescription: also good\n",
                want: vec![],
            },
            Test {
                comment: "wrong status: line protocol shouldn't be down",
                output: "GigabitEthernet0/1 is up, line protocol is down \nDescription: bad\n",
                want: vec![Finding::new(
                    "CheckInterfaces",
                    dev,
                    "GigabitEthernet0/1: admin \"up\" protocol \"down\"".to_string(),
                )],
            },
            Test {
                comment: "input errors",
                output: "GigabitEthernet0/1 is up, line protocol is up \n      33 input errors, 0 CRC, 0 frame, 0 overrun, 0 ignored, 0 abort\n",
                want: vec![Finding::new(
                    "CheckInterfaces",
                    dev,
                    "GigabitEthernet0/1: 33 input errors".to_string(),
                )],
            },
            Test {
                comment: "CRC errors",
                output: "GigabitEthernet0/1 is up, line protocol is up \n     0 input errors, 92 CRC, 0 frame, 0 overrun, 0 ignored, 0 abort\n",
                want: vec![Finding::new(
                    "CheckInterfaces",
                    dev,
                    "GigabitEthernet0/1: 92 CRC errors".to_string(),
                )],
            },
        ];

        for test in tests {
            let got = check_interfaces(dev, &results("show interfaces", test.output)).unwrap();
            assert_eq!(got, test.want, "test {:?}", test.comment);
        }
    }

    #[test]
    fn test_check_interfaces_missing_output_is_a_finding() {
        let got = check_interfaces("router1", &HashMap::new()).unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].message.contains("show interfaces"));
    }

    #[test]
    fn test_check_bgp_summary() {
        let dev = "router1";
        let output = "\
BGP router identifier 192.0.2.70, local AS number 65550

Neighbor        V           AS MsgRcvd MsgSent   TblVer  InQ OutQ Up/Down  State/PfxRcd
192.0.2.77      4        65551  268789  256228   646589    0    0 5w4d            1
192.0.2.79      4        65553       0       0        1    0    0 never    Idle
";
        let got = check_bgp_summary(dev, &results("show bgp summary", output)).unwrap();
        assert_eq!(
            got,
            vec![Finding::new(
                "CheckBgpSummary",
                dev,
                "192.0.2.79: state \"Idle\"".to_string(),
            )]
        );
    }

    #[test]
    fn test_check_commands_union() {
        let commands = check_commands();
        assert_eq!(commands, vec!["show interfaces", "show bgp summary"]);
    }

    #[test]
    fn test_run_checks_aggregates() {
        let dev = "router1";
        let mut map = HashMap::new();
        map.insert(
            "show interfaces".to_string(),
            "GigabitEthernet0/1 is up, line protocol is down\n".to_string(),
        );
        // BGP output missing: that's a finding, not a failure.
        let got = run_checks(dev, &map).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].check_name, "CheckInterfaces");
        assert_eq!(got[1].check_name, "CheckBgpSummary");
    }
}
