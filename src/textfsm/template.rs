//! TextFSM template parsing: Value definitions and State/Rule blocks.
//!
//! A template is a contiguous block of `Value` lines, a blank line, then one
//! or more state blocks. Rules substitute `${name}` references with the
//! value's named-group regex before compilation.

use indexmap::IndexMap;
use regex::Regex;

use crate::error::TemplateError;

/// State and value names are capped at 48 characters.
pub const MAX_NAME_LEN: usize = 48;

pub const LINE_OPERATORS: [&str; 3] = ["Continue", "Next", "Error"];
pub const RECORD_OPERATORS: [&str; 4] = ["Clear", "Clearall", "Record", "NoRecord"];

/// Options a `Value` can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOption {
    Required,
    Key,
    List,
    Filldown,
    Fillup,
}

impl ValueOption {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Required" => Some(Self::Required),
            "Key" => Some(Self::Key),
            "List" => Some(Self::List),
            "Filldown" => Some(Self::Filldown),
            "Fillup" => Some(Self::Fillup),
            _ => None,
        }
    }
}

/// A `Value [options] name (regex)` definition.
#[derive(Debug, Clone)]
pub struct Value {
    pub name: String,
    pub options: Vec<ValueOption>,
    pub regex: String,
    /// The regex with its opening `(` rewritten to `(?P<name>`.
    pub template: String,
    /// Names of nested `(?P<...>)` groups inside the regex; non-empty means
    /// this value captures a mapping instead of a scalar.
    pub group_names: Vec<String>,
}

impl Value {
    pub fn has_option(&self, option: ValueOption) -> bool {
        self.options.contains(&option)
    }

    /// Parse a `Value` line. `line_num` is for error reporting.
    pub fn parse(line: &str, line_num: usize) -> Result<Value, TemplateError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(TemplateError::Parse {
                line: line_num,
                message: "expect at least 3 tokens on Value line".to_string(),
            });
        }

        let (options, name, regex) = if !tokens[2].starts_with('(') {
            // Format: Value Options Name Regex
            let mut options = Vec::new();
            for option in tokens[1].split(',') {
                let parsed = ValueOption::parse(option).ok_or_else(|| TemplateError::Parse {
                    line: line_num,
                    message: format!("invalid option {option:?}"),
                })?;
                if options.contains(&parsed) {
                    return Err(TemplateError::Parse {
                        line: line_num,
                        message: format!("duplicate option {option:?}"),
                    });
                }
                options.push(parsed);
            }
            (options, tokens[2], tokens[3..].join(" "))
        } else {
            // Format: Value Name Regex
            (Vec::new(), tokens[1], tokens[2..].join(" "))
        };

        if name.len() > MAX_NAME_LEN {
            return Err(TemplateError::Parse {
                line: line_num,
                message: format!("invalid Value name {name:?} or name too long"),
            });
        }

        // The regex must be a single top-level `( )` group; count brackets
        // with character classes removed so `([()])` style classes don't
        // confuse the balance check.
        let without_classes = strip_char_classes(&regex);
        if !(regex.starts_with('(') && regex.ends_with(')')) {
            return Err(TemplateError::Parse {
                line: line_num,
                message: format!("value {regex:?} must be contained within a '()' pair"),
            });
        }
        let opens = without_classes.matches('(').count();
        let closes = without_classes.matches(')').count();
        if opens != closes {
            return Err(TemplateError::Parse {
                line: line_num,
                message: format!("value {regex:?} must be contained within a '()' pair"),
            });
        }

        Regex::new(&regex).map_err(|source| TemplateError::Regex {
            line: line_num,
            regex: regex.clone(),
            source,
        })?;

        let group_names = group_names(&regex).map_err(|message| TemplateError::Parse {
            line: line_num,
            message,
        })?;

        let template = format!("(?P<{name}>{}", &regex[1..]);

        Ok(Value {
            name: name.to_string(),
            options,
            regex,
            template,
            group_names,
        })
    }
}

/// Remove `[...]` character classes so bracket balancing only sees real
/// groups.
fn strip_char_classes(regex: &str) -> String {
    let mut out = String::with_capacity(regex.len());
    let mut chars = regex.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                // Escaped character; never opens or closes a class.
                chars.next();
                if !in_class {
                    out.push('x');
                }
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            _ => out.push(c),
        }
    }
    out
}

/// Extract the names of `(?P<...>)` groups in declaration order.
fn group_names(regex: &str) -> Result<Vec<String>, String> {
    let finder = Regex::new(r"\(\?P<([A-Za-z0-9_]+)>").unwrap();
    let mut names = Vec::new();
    for caps in finder.captures_iter(regex) {
        let name = caps[1].to_string();
        if names.contains(&name) {
            return Err(format!("duplicate group name {name:?}"));
        }
        names.push(name);
    }
    Ok(names)
}

/// What to do with the input line after a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineOp {
    #[default]
    Next,
    Continue,
    Error,
}

/// What to do with the record being built after a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOp {
    #[default]
    NoRecord,
    Clear,
    Clearall,
    Record,
}

/// A single `^match [-> action]` rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// The raw match expression, before `${}` substitution.
    pub match_expr: String,
    /// Compiled regex with all value references expanded.
    pub regex: Regex,
    pub line_op: LineOp,
    pub record_op: RecordOp,
    /// Target state, or the diagnostic message for `Error` rules.
    pub new_state: String,
    pub line_num: usize,
}

impl Rule {
    fn parse(
        line: &str,
        line_num: usize,
        values: &IndexMap<String, Value>,
    ) -> Result<Rule, TemplateError> {
        // Implicit default is '(regexp) -> Next.NoRecord'.
        let match_action = Regex::new(r"(?s)^(?P<match>.*)(\s->(?P<action>.*))$").unwrap();
        let action_re = Regex::new(
            r#"^\s+(?P<ln_op>Continue|Next|Error)(\.(?P<rec_op>Clear|Clearall|Record|NoRecord))?(\s+(?P<new_state>\w+|".*"))?$"#,
        )
        .unwrap();
        let action2_re = Regex::new(
            r#"^\s+(?P<rec_op>Clear|Clearall|Record|NoRecord)(\s+(?P<new_state>\w+|".*"))?$"#,
        )
        .unwrap();
        let action3_re = Regex::new(r#"^(\s+(?P<new_state>\w+|".*"))?$"#).unwrap();

        let line = line.trim();
        if line.is_empty() {
            return Err(TemplateError::Parse {
                line: line_num,
                message: "null data in Rule".to_string(),
            });
        }

        let (match_expr, action) = match match_action.captures(line) {
            Some(caps) => (
                caps["match"].to_string(),
                caps.name("action").map(|m| m.as_str().to_string()),
            ),
            None => (line.to_string(), None),
        };

        let expanded = expand_value_references(&match_expr, values, line_num)?;
        let regex = Regex::new(&expanded).map_err(|source| TemplateError::Regex {
            line: line_num,
            regex: expanded.clone(),
            source,
        })?;

        let mut rule = Rule {
            match_expr,
            regex,
            line_op: LineOp::default(),
            record_op: RecordOp::default(),
            new_state: String::new(),
            line_num,
        };

        if let Some(action) = action {
            let caps = action_re
                .captures(&action)
                .or_else(|| action2_re.captures(&action))
                .or_else(|| action3_re.captures(&action))
                .ok_or_else(|| TemplateError::Parse {
                    line: line_num,
                    message: format!("badly formatted rule {line:?}"),
                })?;

            if let Some(op) = caps.name("ln_op") {
                rule.line_op = match op.as_str() {
                    "Continue" => LineOp::Continue,
                    "Error" => LineOp::Error,
                    _ => LineOp::Next,
                };
            }
            if let Some(op) = caps.name("rec_op") {
                rule.record_op = match op.as_str() {
                    "Clear" => RecordOp::Clear,
                    "Clearall" => RecordOp::Clearall,
                    "Record" => RecordOp::Record,
                    _ => RecordOp::NoRecord,
                };
            }
            if let Some(new_state) = caps.name("new_state") {
                rule.new_state = new_state.as_str().to_string();
            }
        }

        // Only 'Next' (or implicit 'Next') can carry a new state; Error may
        // carry a quoted message instead.
        if rule.line_op == LineOp::Continue && !rule.new_state.is_empty() {
            return Err(TemplateError::Parse {
                line: line_num,
                message: format!(
                    "action 'Continue' with new state {} specified",
                    rule.new_state
                ),
            });
        }
        if rule.line_op != LineOp::Error && !rule.new_state.is_empty() {
            let word = Regex::new(r"^\w+$").unwrap();
            if !word.is_match(&rule.new_state) {
                return Err(TemplateError::Parse {
                    line: line_num,
                    message: "alphanumeric characters only in state names".to_string(),
                });
            }
        }

        Ok(rule)
    }
}

/// Expand `${name}` and `$name` references to the value's named-group
/// template; `$$` collapses to a literal `$`.
fn expand_value_references(
    expr: &str,
    values: &IndexMap<String, Value>,
    line_num: usize,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(expr.len());
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    // Longest name first so $interface2 resolves $interface2, not $interface.
    let mut names: Vec<&String> = values.keys().collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));

    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        // "$$" is an escaped dollar (commonly the $ anchor at end of line).
        if chars.get(i + 1) == Some(&'$') {
            out.push('$');
            i += 2;
            continue;
        }
        if chars.get(i + 1) == Some(&'{') {
            let rest: String = chars[i + 2..].iter().collect();
            let end = rest.find('}').ok_or_else(|| TemplateError::Parse {
                line: line_num,
                message: format!("unterminated value reference in {expr:?}"),
            })?;
            let name = &rest[..end];
            let value = values.get(name).ok_or_else(|| TemplateError::Parse {
                line: line_num,
                message: format!("unknown value {name:?} referenced"),
            })?;
            out.push_str(&value.template);
            i += 2 + end + 1;
            continue;
        }
        // Bare $name reference.
        let rest: String = chars[i + 1..].iter().collect();
        match names.iter().find(|name| rest.starts_with(name.as_str())) {
            Some(name) => {
                out.push_str(&values[name.as_str()].template);
                i += 1 + name.len();
            }
            None => {
                out.push('$');
                i += 1;
            }
        }
    }
    Ok(out)
}

/// A named state block and its ordered rules.
#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// A parsed TextFSM template.
#[derive(Debug, Clone)]
pub struct TextFsm {
    pub values: IndexMap<String, Value>,
    pub states: IndexMap<String, State>,
}

impl TextFsm {
    /// Parse a template from its text form.
    pub fn parse(template: &str) -> Result<TextFsm, TemplateError> {
        let mut parser = TemplateParser::new(template);
        let values = parser.parse_values()?;
        let mut states: IndexMap<String, State> = IndexMap::new();
        while let Some(state) = parser.parse_state(&values, &states)? {
            states.insert(state.name.clone(), state);
        }
        let mut fsm = TextFsm { values, states };
        fsm.validate()?;
        Ok(fsm)
    }

    /// Check state names and jump destinations.
    ///
    /// `Start` is required; `End`/`EOF` must be empty if present (`End` is
    /// dropped after the check); every referenced destination must exist.
    fn validate(&mut self) -> Result<(), TemplateError> {
        if !self.states.contains_key("Start") {
            return Err(TemplateError::Parse {
                line: 0,
                message: "missing state 'Start'".to_string(),
            });
        }
        if let Some(state) = self.states.get("End") {
            if !state.rules.is_empty() {
                return Err(TemplateError::Parse {
                    line: 0,
                    message: "non-empty 'End' state".to_string(),
                });
            }
            self.states.shift_remove("End");
        }
        if let Some(state) = self.states.get("EOF") {
            if !state.rules.is_empty() {
                return Err(TemplateError::Parse {
                    line: 0,
                    message: "non-empty 'EOF' state".to_string(),
                });
            }
        }
        for (name, state) in &self.states {
            for rule in &state.rules {
                if rule.line_op == LineOp::Error {
                    continue;
                }
                if rule.new_state.is_empty()
                    || rule.new_state == "End"
                    || rule.new_state == "EOF"
                {
                    continue;
                }
                if !self.states.contains_key(&rule.new_state) {
                    return Err(TemplateError::Parse {
                        line: rule.line_num,
                        message: format!(
                            "state {:?} not found, referenced in state {:?}",
                            rule.new_state, name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

struct TemplateParser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    line_num: usize,
}

impl<'a> TemplateParser<'a> {
    fn new(template: &'a str) -> Self {
        Self {
            lines: template.lines().collect(),
            pos: 0,
            line_num: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.pos).copied()?;
        self.pos += 1;
        self.line_num += 1;
        Some(line.trim_end())
    }

    fn is_comment(line: &str) -> bool {
        line.trim_start().starts_with('#')
    }

    /// Values are a contiguous block at the head of the file, terminated by
    /// a blank line.
    fn parse_values(&mut self) -> Result<IndexMap<String, Value>, TemplateError> {
        let mut values = IndexMap::new();
        loop {
            let Some(line) = self.next_line() else {
                let message = if self.line_num == 0 {
                    "null template".to_string()
                } else {
                    "no State definition found".to_string()
                };
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message,
                });
            };
            if line.is_empty() {
                return Ok(values);
            }
            if Self::is_comment(line) {
                continue;
            }
            if line.starts_with("Value ") {
                let value = Value::parse(line, self.line_num)?;
                values.insert(value.name.clone(), value);
            } else if values.is_empty() {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: "no Value definitions found".to_string(),
                });
            } else {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: "expected blank line after last Value entry".to_string(),
                });
            }
        }
    }

    /// Parse one state block; `None` at end of input.
    fn parse_state(
        &mut self,
        values: &IndexMap<String, Value>,
        seen: &IndexMap<String, State>,
    ) -> Result<Option<State>, TemplateError> {
        let state_re = Regex::new(r"^(\w+)$").unwrap();

        let name = loop {
            let Some(line) = self.next_line() else {
                if seen.is_empty() {
                    return Err(TemplateError::Parse {
                        line: self.line_num,
                        message: "no State definition found".to_string(),
                    });
                }
                return Ok(None);
            };
            if line.is_empty() || Self::is_comment(line) {
                continue;
            }
            if !state_re.is_match(line) {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: format!("invalid state name {line:?}"),
                });
            }
            if line.len() > MAX_NAME_LEN {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: format!("state name too long, should be < {MAX_NAME_LEN} chars"),
                });
            }
            if LINE_OPERATORS.contains(&line) || RECORD_OPERATORS.contains(&line) {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: format!("state {line:?} can not be a keyword"),
                });
            }
            if seen.contains_key(line) {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: format!("duplicate state name {line:?}"),
                });
            }
            break line.to_string();
        };

        let mut rules = Vec::new();
        loop {
            let Some(line) = self.next_line() else {
                // A state with no rules is fine (End/EOF).
                break;
            };
            if line.is_empty() {
                break;
            }
            if Self::is_comment(line) {
                continue;
            }
            let valid = [" ^", "  ^", "\t^"]
                .iter()
                .any(|prefix| line.starts_with(prefix));
            if !valid {
                return Err(TemplateError::Parse {
                    line: self.line_num,
                    message: "missing white space or carat ('^') before rule".to_string(),
                });
            }
            rules.push(Rule::parse(line, self.line_num, values)?);
        }

        Ok(Some(State { name, rules }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse_plain() {
        let value = Value::parse("Value interface (\\S+)", 1).unwrap();
        assert_eq!(value.name, "interface");
        assert_eq!(value.regex, "(\\S+)");
        assert_eq!(value.template, "(?P<interface>\\S+)");
        assert!(value.options.is_empty());
    }

    #[test]
    fn test_value_parse_with_options() {
        let value = Value::parse("Value Filldown,Required interface (.*)", 3).unwrap();
        assert!(value.has_option(ValueOption::Filldown));
        assert!(value.has_option(ValueOption::Required));
        assert!(!value.has_option(ValueOption::List));
    }

    #[test]
    fn test_value_parse_rejects_bad_option() {
        let err = Value::parse("Value Banana interface (.*)", 2).unwrap_err();
        assert!(err.to_string().contains("invalid option"));
    }

    #[test]
    fn test_value_parse_rejects_unwrapped_regex() {
        assert!(Value::parse("Value interface \\S+", 1).is_err());
        assert!(Value::parse("Value interface (\\S+", 1).is_err());
    }

    #[test]
    fn test_value_regex_with_char_class_brackets() {
        // The ']' inside the class must not confuse the balance check.
        let value = Value::parse("Value ports ([\\[\\]()\\d]+)", 1).unwrap();
        assert_eq!(value.name, "ports");
    }

    #[test]
    fn test_value_nested_groups() {
        let value =
            Value::parse("Value List pairs ((?P<name>\\w+)\\s+(?P<age>\\d+))", 1).unwrap();
        assert_eq!(value.group_names, vec!["name", "age"]);
    }

    #[test]
    fn test_template_requires_start_state() {
        let err = TextFsm::parse("Value x (.*)\n\nOther\n  ^${x}\n").unwrap_err();
        assert!(err.to_string().contains("Start"));
    }

    #[test]
    fn test_template_rejects_rule_without_carat() {
        let err = TextFsm::parse("Value x (.*)\n\nStart\n  no carat here\n").unwrap_err();
        assert!(err.to_string().contains("carat"));
    }

    #[test]
    fn test_template_rejects_continue_with_state() {
        let err =
            TextFsm::parse("Value x (.*)\n\nStart\n  ^${x} -> Continue Other\n\nOther\n  ^.*\n")
                .unwrap_err();
        assert!(err.to_string().contains("Continue"));
    }

    #[test]
    fn test_template_rejects_unknown_jump_target() {
        let err = TextFsm::parse("Value x (.*)\n\nStart\n  ^${x} -> Nowhere\n").unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn test_template_end_state_must_be_empty() {
        let err = TextFsm::parse("Value x (.*)\n\nStart\n  ^${x}\n\nEnd\n  ^.*\n").unwrap_err();
        assert!(err.to_string().contains("End"));

        let fsm = TextFsm::parse("Value x (.*)\n\nStart\n  ^${x} -> End\n\nEnd\n").unwrap();
        assert!(!fsm.states.contains_key("End"));
    }

    #[test]
    fn test_rule_action_parsing() {
        let template = "Value x (.*)\n\nStart\n  ^${x} -> Continue.Record\n  ^a -> Next.Clear Other\n  ^b -> Record\n  ^c -> Error \"boom\"\n\nOther\n  ^.*\n";
        let fsm = TextFsm::parse(template).unwrap();
        let rules = &fsm.states["Start"].rules;

        assert_eq!(rules[0].line_op, LineOp::Continue);
        assert_eq!(rules[0].record_op, RecordOp::Record);

        assert_eq!(rules[1].line_op, LineOp::Next);
        assert_eq!(rules[1].record_op, RecordOp::Clear);
        assert_eq!(rules[1].new_state, "Other");

        assert_eq!(rules[2].line_op, LineOp::Next);
        assert_eq!(rules[2].record_op, RecordOp::Record);

        assert_eq!(rules[3].line_op, LineOp::Error);
        assert_eq!(rules[3].new_state, "\"boom\"");
    }

    #[test]
    fn test_value_reference_expansion() {
        let fsm = TextFsm::parse(
            "Value intf (\\S+)\n\nStart\n  ^${intf} is up\\s*$$\n",
        )
        .unwrap();
        let rule = &fsm.states["Start"].rules[0];
        assert_eq!(rule.regex.as_str(), "^(?P<intf>\\S+) is up\\s*$");
    }

    #[test]
    fn test_bare_dollar_reference_prefers_longest_name() {
        let fsm = TextFsm::parse(
            "Value ab (a)\nValue abc (b)\n\nStart\n  ^$abc$ab\n",
        )
        .unwrap();
        let rule = &fsm.states["Start"].rules[0];
        assert_eq!(rule.regex.as_str(), "^(?P<abc>b)(?P<ab>a)");
    }

    #[test]
    fn test_comments_are_skipped() {
        let template = "# leading comment\nValue x (.*)\n\nStart\n  # rule comment\n  ^${x}\n";
        let fsm = TextFsm::parse(template).unwrap();
        assert_eq!(fsm.states["Start"].rules.len(), 1);
    }
}
