//! TextFSM template engine.
//!
//! A template pairs regex-based value captures with a state machine of match
//! rules and record/line operators; the purpose is to extract tabular data
//! from free-form CLI output. Semantics follow the published TextFSM
//! reference: value options (`Required`, `Key`, `List`, `Filldown`,
//! `Fillup`), `Start`/`End`/`EOF` states, and `Next`/`Continue`/`Error` ×
//! `Record`/`Clear`/`Clearall`/`NoRecord` actions.

mod parser;
mod shortcuts;
mod template;

pub use parser::{parse, CellValue, ParserOutput, Record};
pub use shortcuts::{
    parse_cisco_ios_show_bgp_summary, parse_cisco_ios_show_interfaces, parse_typed,
    parse_typed_cisco_ios_show_bgp_summary, parse_typed_cisco_ios_show_interfaces,
    CiscoIosShowBgpSummaryRow, CiscoIosShowInterfacesRow, FromRecord,
    CISCO_IOS_SHOW_BGP_SUMMARY_TEMPLATE, CISCO_IOS_SHOW_INTERFACES_TEMPLATE,
};
pub use template::{LineOp, RecordOp, Rule, State, TextFsm, Value, ValueOption, MAX_NAME_LEN};
