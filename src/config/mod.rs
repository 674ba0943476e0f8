//! Indented-configuration parser.
//!
//! Cisco-style config is block-structured by indentation only. This module
//! turns it into a [`ConfLine`] tree, flattens it into IOS XR style "formal"
//! config, and merges configlets into a base config in simulation.

use std::fmt;

use crate::error::ConfigError;

fn indent_level(s: &str) -> usize {
    if s.trim_matches(' ').is_empty() {
        return 0;
    }
    s.chars().take_while(|&c| c == ' ').count()
}

/// Rewrite block-structured config into flat "formal" config, somewhat like
/// Juniper's `set` rendering: every descendant line is prefixed with the
/// accumulated path of its parent headings.
///
/// ```text
/// interface loopback0
///  description boembabies
/// ```
///
/// becomes:
///
/// ```text
/// interface loopback0
/// interface loopback0 description boembabies
/// ```
pub fn config_to_formal(config: &str) -> String {
    let lines: Vec<&str> = config.split('\n').collect();
    if lines.is_empty() {
        return String::new();
    }

    let mut headings: Vec<&str> = vec![lines[0]];
    let mut last_indent = 0usize;
    let mut result = Vec::with_capacity(lines.len());

    for &line in &lines {
        let line_indent = indent_level(line);
        if line_indent > last_indent {
            headings.push(line);
            last_indent = line_indent;
        } else if line_indent < last_indent {
            headings.truncate(line_indent + 1);
            if let Some(top) = headings.get_mut(line_indent) {
                *top = line;
            }
            last_indent = line_indent;
        } else if line_indent < headings.len() {
            headings[line_indent] = line;
        } else {
            headings.push(line);
        }

        let path = headings[..line_indent.min(headings.len())].join(" ");
        result.push(format!("{path}{line}"));
    }
    result.join("\n")
}

/// A configuration line that can start a section:
///
/// ```text
/// interface loopback0
///  description boembabies
/// ```
///
/// A node's `sub_lines` are the strictly more-indented lines that follow it;
/// indentation is the sole nesting signal. The root has an empty `line` and
/// holds the top-level lines as children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfLine {
    pub line: String,
    pub sub_lines: Vec<ConfLine>,
}

impl ConfLine {
    pub fn new(line: impl Into<String>, sub_lines: Vec<ConfLine>) -> Self {
        Self {
            line: line.into(),
            sub_lines,
        }
    }

    pub fn leaf(line: impl Into<String>) -> Self {
        Self::new(line, Vec::new())
    }

    fn render(&self, prefix: &str, out: &mut String) {
        if !self.line.is_empty() {
            out.push_str(prefix);
            out.push_str(&self.line);
            out.push('\n');
        }
        let child_prefix = if self.line.is_empty() {
            String::new()
        } else {
            format!(" {prefix}")
        };
        for sub in &self.sub_lines {
            sub.render(&child_prefix, out);
        }
    }

    /// Merge a configlet tree into this tree.
    ///
    /// Leaves match an existing sibling by first whitespace-delimited word
    /// and replace its line; sections match by the full heading line and
    /// recurse. Unmatched overlay lines are appended. Base ordering is
    /// preserved.
    ///
    /// Multi-word leaf keys are ambiguous under first-word matching: two
    /// distinct `ip address` lines in one section collapse onto whichever
    /// comes first. Configlets are expected to carry at most one leaf per
    /// key per section.
    pub fn apply(&mut self, overlay: &ConfLine) {
        for over in &overlay.sub_lines {
            if over.sub_lines.is_empty() {
                let key = first_word(&over.line);
                match self
                    .sub_lines
                    .iter_mut()
                    .find(|base| first_word(&base.line) == key)
                {
                    Some(base) => base.line = over.line.clone(),
                    None => self.sub_lines.push(over.clone()),
                }
            } else {
                match self
                    .sub_lines
                    .iter_mut()
                    .find(|base| base.line == over.line)
                {
                    Some(base) => base.apply(over),
                    None => self.sub_lines.push(over.clone()),
                }
            }
        }
    }
}

impl fmt::Display for ConfLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render("", &mut out);
        write!(f, "{}", out.trim_end_matches('\n'))
    }
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Parse indented config into a tree. Blank lines and lone `!` markers are
/// skipped.
pub fn parse(conf: &str) -> Result<ConfLine, ConfigError> {
    let lines: Vec<&str> = conf.split('\n').collect();
    if lines.is_empty() {
        return Ok(ConfLine::default());
    }
    let (top_level, _) = parse_section(&lines, indent_level(lines[0]))?;
    Ok(ConfLine::new("", top_level))
}

fn parse_section(lines: &[&str], min_indent: usize) -> Result<(Vec<ConfLine>, usize), ConfigError> {
    let mut result: Vec<ConfLine> = Vec::new();

    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "!" {
            idx += 1;
            continue;
        }
        let indent = indent_level(line);
        if indent < min_indent {
            return Ok((result, idx));
        }
        if indent == min_indent {
            result.push(ConfLine::leaf(trimmed));
            idx += 1;
        } else {
            let (section, skip) = parse_section(&lines[idx..], indent)?;
            if skip == 0 {
                return Err(ConfigError::Parse {
                    line: line.to_string(),
                });
            }
            idx += skip;
            match result.last_mut() {
                Some(parent) => parent.sub_lines = section,
                None => {
                    return Err(ConfigError::Parse {
                        line: line.to_string(),
                    })
                }
            }
        }
    }
    Ok((result, idx))
}

/// Apply a configlet to a router config and return the merged rendering.
pub fn apply(config: &str, configlet: &str) -> Result<String, ConfigError> {
    let mut base = parse(config)?;
    let overlay = parse(configlet)?;
    base.apply(&overlay);
    Ok(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Allows for nicely formatted multiline strings in tests: removes the
    // indentation of the first line from all lines.
    fn dedent(s: &str) -> String {
        let mut lines: Vec<&str> = s.split('\n').collect();
        if lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        let first = lines.first().copied().unwrap_or("");
        let indent = first.len() - first.trim_start().len();
        let prefix = first[..indent].to_string();
        lines
            .iter()
            .map(|l| l.strip_prefix(prefix.as_str()).unwrap_or(l))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("\n\tboem\n\t  babies"), "boem\n  babies");
    }

    #[test]
    fn test_config_to_formal() {
        let tests = [
            ("trivial example", "description boembabies", "description boembabies"),
            (
                "basic section",
                "interface loopback0\n description boembabies",
                "interface loopback0\ninterface loopback0 description boembabies",
            ),
            (
                "multiline section",
                "interface loopback0\n description boembabies\n ip address 1.0.0.1 255.255.255.252",
                "interface loopback0\ninterface loopback0 description boembabies\ninterface loopback0 ip address 1.0.0.1 255.255.255.252",
            ),
            (
                "2 multiline sections",
                "interface loopback0\n description boembabies\ninterface loopback1\n description boembabies2",
                "interface loopback0\ninterface loopback0 description boembabies\ninterface loopback1\ninterface loopback1 description boembabies2",
            ),
        ];

        for (description, input, want) in tests {
            assert_eq!(config_to_formal(input), want, "test {description:?}");
        }
    }

    #[test]
    fn test_parse() {
        let tests = [
            ("empty example", String::new(), ConfLine::default()),
            (
                "trivial example",
                "description boembabies".to_string(),
                ConfLine::new("", vec![ConfLine::leaf("description boembabies")]),
            ),
            (
                "trivial multiline example",
                dedent(
                    "
                    line1
                    line2",
                ),
                ConfLine::new("", vec![ConfLine::leaf("line1"), ConfLine::leaf("line2")]),
            ),
            (
                "one section example",
                dedent(
                    "
                    interface loopback0
                     description boembabies
                     ip address 1.0.0.1 255.255.255.0",
                ),
                ConfLine::new(
                    "",
                    vec![ConfLine::new(
                        "interface loopback0",
                        vec![
                            ConfLine::leaf("description boembabies"),
                            ConfLine::leaf("ip address 1.0.0.1 255.255.255.0"),
                        ],
                    )],
                ),
            ),
            (
                "two sections test",
                dedent(
                    "
                    interface loopback0
                     description boembabies
                     ip address 1.0.0.1 255.255.255.0
                    interface loopback1
                     description alsoboembabies
                     ip address 2.0.0.1 255.255.255.0",
                ),
                ConfLine::new(
                    "",
                    vec![
                        ConfLine::new(
                            "interface loopback0",
                            vec![
                                ConfLine::leaf("description boembabies"),
                                ConfLine::leaf("ip address 1.0.0.1 255.255.255.0"),
                            ],
                        ),
                        ConfLine::new(
                            "interface loopback1",
                            vec![
                                ConfLine::leaf("description alsoboembabies"),
                                ConfLine::leaf("ip address 2.0.0.1 255.255.255.0"),
                            ],
                        ),
                    ],
                ),
            ),
        ];

        for (description, input, want) in tests {
            let got = parse(&input).unwrap();
            assert_eq!(got, want, "test {description:?}");

            // And reverse it again.
            assert_eq!(got.to_string(), input, "round trip for {description:?}");
        }
    }

    #[test]
    fn test_parse_skips_bang_and_blank_lines() {
        let input = dedent(
            "
            interface loopback0
             description boembabies
            !

            interface loopback1",
        );
        let got = parse(&input).unwrap();
        assert_eq!(
            got,
            ConfLine::new(
                "",
                vec![
                    ConfLine::new(
                        "interface loopback0",
                        vec![ConfLine::leaf("description boembabies")],
                    ),
                    ConfLine::leaf("interface loopback1"),
                ],
            )
        );
    }

    #[test]
    fn test_reparse_is_identity() {
        let input = dedent(
            "
            router bgp 65550
             address-family ipv4
              network 10.0.0.0
            interface loopback0
             shutdown",
        );
        let tree = parse(&input).unwrap();
        let rendered = tree.to_string();
        assert_eq!(parse(&rendered).unwrap(), tree);
        assert_eq!(rendered, input);
    }

    #[test]
    fn test_apply_simple_hostname_change() {
        let got = apply("hostname boem", "hostname babies").unwrap();
        assert_eq!(got, "hostname babies");
    }

    #[test]
    fn test_apply_leaf_in_section_preserves_siblings_and_order() {
        let base = dedent(
            "
            interface loopback0
             ip address 1.0.0.1 255.255.255.255
             description loopback0
             shutdown",
        );
        let configlet = dedent(
            "
            interface loopback0
             description boembabies",
        );
        let want = dedent(
            "
            interface loopback0
             ip address 1.0.0.1 255.255.255.255
             description boembabies
             shutdown",
        );
        assert_eq!(apply(&base, &configlet).unwrap(), want);
    }

    #[test]
    fn test_apply_appends_unknown_lines() {
        let base = dedent(
            "
            interface loopback0
             description boembabies",
        );
        let configlet = dedent(
            "
            interface loopback0
             shutdown
            interface loopback1
             description new",
        );
        let want = dedent(
            "
            interface loopback0
             description boembabies
             shutdown
            interface loopback1
             description new",
        );
        assert_eq!(apply(&base, &configlet).unwrap(), want);
    }

    #[test]
    fn test_apply_empty_configlet_canonicalizes() {
        let base = "interface loopback0\n description boembabies\n!\n";
        let want = "interface loopback0\n description boembabies";
        assert_eq!(apply(base, "").unwrap(), want);
    }

    #[test]
    fn test_apply_two_multilevel_changes_changing_order() {
        let base = dedent(
            "
            interface loopback0
             description one
            interface loopback1
             description two",
        );
        let forward = dedent(
            "
            interface loopback0
             description changed-one
            interface loopback1
             description changed-two",
        );
        let backward = dedent(
            "
            interface loopback1
             description changed-two
            interface loopback0
             description changed-one",
        );

        // The merge depends only on the (section, leaf) pairs present in the
        // configlet, not on their order.
        assert_eq!(
            apply(&base, &forward).unwrap(),
            apply(&base, &backward).unwrap()
        );
    }
}
