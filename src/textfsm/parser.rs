//! TextFSM executor: run a compiled template over CLI output.
//!
//! Each input line is passed through the current state's rules in order.
//! Matched named groups update value state; the rule's operators then decide
//! whether to emit the record, clear it, stay on the line, or switch states.

use indexmap::IndexMap;

use super::template::{LineOp, RecordOp, Rule, TextFsm, Value, ValueOption};
use crate::error::TemplateError;

/// A captured field. Scalars are the common case; values whose regex holds
/// nested named groups capture mappings, and `List` values accumulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Str(String),
    List(Vec<String>),
    Map(IndexMap<String, String>),
    MapList(Vec<IndexMap<String, String>>),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Str(s) => s.is_empty(),
            CellValue::List(l) => l.is_empty(),
            CellValue::Map(m) => m.is_empty(),
            CellValue::MapList(l) => l.is_empty(),
        }
    }

    /// The scalar form, or `""` for non-scalars.
    pub fn as_str(&self) -> &str {
        match self {
            CellValue::Str(s) => s,
            _ => "",
        }
    }

    /// The list form, or empty for non-lists.
    pub fn as_list(&self) -> &[String] {
        match self {
            CellValue::List(l) => l,
            _ => &[],
        }
    }
}

/// One emitted row: value name to captured cell, in declaration order.
pub type Record = IndexMap<String, CellValue>;

#[derive(Debug, Clone, Default)]
struct ValueState {
    cur: Option<CellValue>,
    filldown: Option<CellValue>,
}

fn is_empty(cell: &Option<CellValue>) -> bool {
    match cell {
        None => true,
        Some(value) => value.is_empty(),
    }
}

/// Run state for one input document.
#[derive(Debug)]
pub struct ParserOutput {
    /// Emitted records.
    pub records: Vec<Record>,
    cur_state: String,
    values: IndexMap<String, ValueState>,
}

impl ParserOutput {
    pub fn new(fsm: &TextFsm) -> Self {
        let values = fsm
            .values
            .keys()
            .map(|name| (name.clone(), ValueState::default()))
            .collect();
        Self {
            records: Vec::new(),
            cur_state: "Start".to_string(),
            values,
        }
    }

    /// Reset for a fresh document.
    pub fn reset(&mut self, fsm: &TextFsm) {
        self.clear_record(fsm, true);
        self.cur_state = "Start".to_string();
        self.records.clear();
    }

    /// Pass `text` through the FSM. With `eof`, an implicit `Record` fires
    /// at end of input unless the template declares an explicit `EOF` state
    /// or execution stopped in `End`.
    pub fn parse_text(&mut self, fsm: &TextFsm, text: &str, eof: bool) -> Result<(), TemplateError> {
        for line in text.lines() {
            self.check_line(fsm, line)?;
            if self.cur_state == "End" || self.cur_state == "EOF" {
                break;
            }
        }
        if self.cur_state != "End" && !fsm.states.contains_key("EOF") && eof {
            self.append_record(fsm);
        }
        Ok(())
    }

    /// Pass the line through the current state's rules until one matches.
    fn check_line(&mut self, fsm: &TextFsm, line: &str) -> Result<(), TemplateError> {
        let Some(state) = fsm.states.get(&self.cur_state) else {
            // Only reachable with a corrupted state name; treat as end.
            return Ok(());
        };
        for rule in &state.rules {
            let Some(caps) = rule.regex.captures(line) else {
                continue;
            };

            for name in rule.regex.capture_names().flatten() {
                let Some(value) = fsm.values.get(name) else {
                    // Nested match groups have no value of their own.
                    continue;
                };
                let captured = caps.name(name).map(|m| m.as_str()).unwrap_or("");
                if value.group_names.is_empty() {
                    self.process_scalar(value, captured);
                } else {
                    let mut map = IndexMap::new();
                    for group in &value.group_names {
                        map.insert(
                            group.clone(),
                            caps.name(group).map(|m| m.as_str()).unwrap_or("").to_string(),
                        );
                    }
                    self.process_map(value, map);
                }
                self.fill_up(value);
            }

            if self.handle_operations(fsm, rule, line)? {
                if !rule.new_state.is_empty() {
                    self.cur_state = rule.new_state.clone();
                }
                break;
            }
        }
        Ok(())
    }

    fn process_scalar(&mut self, value: &Value, newval: &str) {
        let state = &mut self.values[&value.name];
        let finalval = if value.has_option(ValueOption::List) {
            match state.cur.take() {
                Some(CellValue::List(mut list)) => {
                    list.push(newval.to_string());
                    CellValue::List(list)
                }
                _ => match (&state.filldown, value.has_option(ValueOption::Filldown)) {
                    // No current value but a remembered filldown list:
                    // append to it.
                    (Some(CellValue::List(list)), true) => {
                        let mut list = list.clone();
                        list.push(newval.to_string());
                        CellValue::List(list)
                    }
                    _ => CellValue::List(vec![newval.to_string()]),
                },
            }
        } else {
            CellValue::Str(newval.to_string())
        };
        if value.has_option(ValueOption::Filldown) {
            state.filldown = Some(finalval.clone());
        }
        state.cur = Some(finalval);
    }

    fn process_map(&mut self, value: &Value, map: IndexMap<String, String>) {
        let state = &mut self.values[&value.name];
        let finalval = if value.has_option(ValueOption::List) {
            match state.cur.take() {
                Some(CellValue::MapList(mut list)) => {
                    list.push(map);
                    CellValue::MapList(list)
                }
                _ => match (&state.filldown, value.has_option(ValueOption::Filldown)) {
                    (Some(CellValue::MapList(list)), true) => {
                        let mut list = list.clone();
                        list.push(map);
                        CellValue::MapList(list)
                    }
                    _ => CellValue::MapList(vec![map]),
                },
            }
        } else {
            CellValue::Map(map)
        };
        if value.has_option(ValueOption::Filldown) {
            state.filldown = Some(finalval.clone());
        }
        state.cur = Some(finalval);
    }

    /// Backfill this field into already-emitted records whose value is
    /// empty, stopping at the first non-empty one.
    fn fill_up(&mut self, value: &Value) {
        if !value.has_option(ValueOption::Fillup) {
            return;
        }
        let Some(cur) = self.values[&value.name].cur.clone() else {
            return;
        };
        for record in self.records.iter_mut().rev() {
            let existing = record.get(&value.name);
            if existing.is_none() || existing.is_some_and(|cell| cell.is_empty()) {
                record.insert(value.name.clone(), cur.clone());
            } else {
                break;
            }
        }
    }

    /// Returns true if the state machine should advance to the next input
    /// line.
    fn handle_operations(
        &mut self,
        fsm: &TextFsm,
        rule: &Rule,
        line: &str,
    ) -> Result<bool, TemplateError> {
        match rule.record_op {
            RecordOp::Record => self.append_record(fsm),
            RecordOp::Clear => self.clear_record(fsm, false),
            RecordOp::Clearall => self.clear_record(fsm, true),
            RecordOp::NoRecord => {}
        }

        match rule.line_op {
            LineOp::Error => {
                let message = if rule.new_state.is_empty() {
                    "state Error raised".to_string()
                } else {
                    rule.new_state.clone()
                };
                Err(TemplateError::Execute {
                    message,
                    rule_line: rule.line_num,
                    input: line.to_string(),
                })
            }
            LineOp::Continue => Ok(false),
            LineOp::Next => Ok(true),
        }
    }

    /// Add the current record to the result if well-formed.
    ///
    /// A `Required` value that is still empty discards the whole record, and
    /// a record with no non-empty field at all is suppressed.
    fn append_record(&mut self, fsm: &TextFsm) {
        let mut record = Record::new();
        let mut any_value = false;
        for (name, value) in &fsm.values {
            let state = &self.values[name];
            if value.has_option(ValueOption::Required) && is_empty(&state.cur) {
                let filled = value.has_option(ValueOption::Filldown) && !is_empty(&state.filldown);
                if !filled {
                    self.clear_record(fsm, false);
                    return;
                }
            }
            let finalval = final_value(value, state);
            if !finalval.is_empty() {
                any_value = true;
            }
            record.insert(name.clone(), finalval);
        }
        if any_value {
            self.records.push(record);
        }
        self.clear_record(fsm, false);
    }

    fn clear_record(&mut self, fsm: &TextFsm, all: bool) {
        for (name, value) in &fsm.values {
            let state = &mut self.values[name];
            state.cur = None;
            if all && value.has_option(ValueOption::Filldown) {
                state.filldown = None;
            }
        }
    }
}

/// The field as it appears in an emitted record: the current capture,
/// falling back to the filldown value, falling back to a typed empty.
fn final_value(value: &Value, state: &ValueState) -> CellValue {
    let source = if is_empty(&state.cur) && value.has_option(ValueOption::Filldown) {
        &state.filldown
    } else {
        &state.cur
    };
    match source {
        Some(cell) => cell.clone(),
        None => empty_cell(value),
    }
}

fn empty_cell(value: &Value) -> CellValue {
    let nested = !value.group_names.is_empty();
    if value.has_option(ValueOption::List) {
        if nested {
            CellValue::MapList(Vec::new())
        } else {
            CellValue::List(Vec::new())
        }
    } else if nested {
        CellValue::Map(IndexMap::new())
    } else {
        CellValue::Str(String::new())
    }
}

/// Parse `input` with `template` in one call.
pub fn parse(template: &str, input: &str, eof: bool) -> Result<Vec<Record>, TemplateError> {
    let fsm = TextFsm::parse(template)?;
    let mut output = ParserOutput::new(&fsm);
    output.parse_text(&fsm, input, eof)?;
    Ok(output.records)
}
