//! Bundled templates and typed row shortcuts.
//!
//! Template value names are snake_case; typed rows expose them as struct
//! fields. The `interface` value is deliberately renamed to `intf` on rows,
//! following the template-collection convention for names that collide with
//! keywords elsewhere.

use super::parser::{parse, CellValue, Record};
use crate::error::TemplateError;

/// Build a typed row from an emitted record.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> Self;
}

/// Parse `input` with `template` into typed rows.
pub fn parse_typed<T: FromRecord>(template: &str, input: &str) -> Result<Vec<T>, TemplateError> {
    let records = parse(template, input, true)?;
    Ok(records.iter().map(T::from_record).collect())
}

fn str_field(record: &Record, name: &str) -> String {
    match record.get(name) {
        Some(CellValue::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

pub const CISCO_IOS_SHOW_INTERFACES_TEMPLATE: &str = r"Value Required interface (\S+)
Value link_status (.+?)
Value protocol_status (.+?)
Value hardware_type ([\w ]+)
Value mac_address ([a-fA-F0-9]{4}\.[a-fA-F0-9]{4}\.[a-fA-F0-9]{4})
Value bia_mac_address ([a-fA-F0-9]{4}\.[a-fA-F0-9]{4}\.[a-fA-F0-9]{4})
Value description (.+?)
Value ip (\d+\.\d+\.\d+\.\d+)
Value prefixlen (\d+)
Value mtu (\d+)
Value duplex (([Ff]ull|[Aa]uto|[Hh]alf|[Aa]-).*?)
Value speed (.*?)
Value media_type (\S+.*)
Value bandwidth (\d+\s+\w+)
Value delay (\d+\s+\S+)
Value encapsulation (.+?)
Value last_input (.+?)
Value last_output (.+?)
Value last_output_hang (.+?)
Value queue_strategy (.+)
Value input_rate (\d+)
Value output_rate (\d+)
Value input_pps (\d+)
Value output_pps (\d+)
Value input_packets (\d+)
Value output_packets (\d+)
Value runts (\d+)
Value giants (\d+)
Value input_errors (\d+)
Value crc (\d+)
Value frame (\d+)
Value overrun (\d+)
Value abort (\d+)
Value output_errors (\d+)
Value vlan_id (\d+)
Value vlan_id_inner (\d+)
Value vlan_id_outer (\d+)

Start
  ^\S+\s+is\s+.+?,\s+line\s+protocol.*$$ -> Continue.Record
  ^${interface}\s+is\s+${link_status},\s+line\s+protocol\s+is\s+${protocol_status}\s*$$
  ^\s+Hardware\s+is\s+${hardware_type} -> Continue
  ^.+address\s+is\s+${mac_address}\s+\(bia\s+${bia_mac_address}\)\s*$$
  ^\s+Description:\s+${description}\s*$$
  ^\s+Internet\s+address\s+is\s+${ip}\/${prefixlen}\s*$$
  ^\s+MTU\s+${mtu}.*BW\s+${bandwidth}.*DLY\s+${delay},\s*$$
  ^\s+Encapsulation\s+${encapsulation}, Vlan ID\s+${vlan_id}.+$$
  ^\s+Encapsulation\s+${encapsulation}, outer ID\s+${vlan_id_outer}, inner ID\s+${vlan_id_inner}.+$$
  ^\s+Encapsulation\s+${encapsulation},.+$$
  ^\s+Last\s+input\s+${last_input},\s+output\s+${last_output},\s+output\s+hang\s+${last_output_hang}\s*$$
  ^\s+Queueing\s+strategy:\s+${queue_strategy}\s*$$
  ^\s+${duplex},\s+${speed},.+media\stype\sis\s${media_type}$$
  ^\s+${duplex},\s+${speed},.+TX/FX$$
  ^\s+${duplex},\s+${speed}$$
  ^.*input\s+rate\s+${input_rate}\s+\w+/sec,\s+${input_pps}\s+packets.+$$
  ^.*output\s+rate\s+${output_rate}\s+\w+/sec,\s+${output_pps}\s+packets.+$$
  ^\s+${input_packets}\s+packets\s+input,\s+\d+\s+bytes,\s+\d+\s+no\s+buffer\s*$$
  ^\s+${runts}\s+runts,\s+${giants}\s+giants,\s+\d+\s+throttles\s*$$
  ^\s+${input_errors}\s+input\s+errors,\s+${crc}\s+(crc|CRC),\s+${frame}\s+frame,\s+${overrun}\s+overrun,\s+\d+\s+ignored\s*$$
  ^\s+${input_errors}\s+input\s+errors,\s+${crc}\s+(crc|CRC),\s+${frame}\s+frame,\s+${overrun}\s+overrun,\s+\d+\s+ignored,\s+${abort}\s+abort\s*$$
  ^\s+${output_packets}\s+packets\s+output,\s+\d+\s+bytes,\s+\d+\s+underruns\s*$$
  ^\s+${output_errors}\s+output\s+errors,\s+\d+\s+collisions,\s+\d+\s+interface\s+resets\s*$$
  # Capture time-stamp if vty line has command time-stamping turned on
  ^Load\s+for\s+
  ^Time\s+source\s+is
";

/// One interface block from `show interfaces`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiscoIosShowInterfacesRow {
    pub intf: String,
    pub link_status: String,
    pub protocol_status: String,
    pub hardware_type: String,
    pub mac_address: String,
    pub bia_mac_address: String,
    pub description: String,
    pub ip: String,
    pub prefixlen: String,
    pub mtu: String,
    pub duplex: String,
    pub speed: String,
    pub media_type: String,
    pub bandwidth: String,
    pub delay: String,
    pub encapsulation: String,
    pub last_input: String,
    pub last_output: String,
    pub last_output_hang: String,
    pub queue_strategy: String,
    pub input_rate: String,
    pub output_rate: String,
    pub input_pps: String,
    pub output_pps: String,
    pub input_packets: String,
    pub output_packets: String,
    pub runts: String,
    pub giants: String,
    pub input_errors: String,
    pub crc: String,
    pub frame: String,
    pub overrun: String,
    pub abort: String,
    pub output_errors: String,
    pub vlan_id: String,
    pub vlan_id_inner: String,
    pub vlan_id_outer: String,
}

impl FromRecord for CiscoIosShowInterfacesRow {
    fn from_record(record: &Record) -> Self {
        Self {
            intf: str_field(record, "interface"),
            link_status: str_field(record, "link_status"),
            protocol_status: str_field(record, "protocol_status"),
            hardware_type: str_field(record, "hardware_type"),
            mac_address: str_field(record, "mac_address"),
            bia_mac_address: str_field(record, "bia_mac_address"),
            description: str_field(record, "description"),
            ip: str_field(record, "ip"),
            prefixlen: str_field(record, "prefixlen"),
            mtu: str_field(record, "mtu"),
            duplex: str_field(record, "duplex"),
            speed: str_field(record, "speed"),
            media_type: str_field(record, "media_type"),
            bandwidth: str_field(record, "bandwidth"),
            delay: str_field(record, "delay"),
            encapsulation: str_field(record, "encapsulation"),
            last_input: str_field(record, "last_input"),
            last_output: str_field(record, "last_output"),
            last_output_hang: str_field(record, "last_output_hang"),
            queue_strategy: str_field(record, "queue_strategy"),
            input_rate: str_field(record, "input_rate"),
            output_rate: str_field(record, "output_rate"),
            input_pps: str_field(record, "input_pps"),
            output_pps: str_field(record, "output_pps"),
            input_packets: str_field(record, "input_packets"),
            output_packets: str_field(record, "output_packets"),
            runts: str_field(record, "runts"),
            giants: str_field(record, "giants"),
            input_errors: str_field(record, "input_errors"),
            crc: str_field(record, "crc"),
            frame: str_field(record, "frame"),
            overrun: str_field(record, "overrun"),
            abort: str_field(record, "abort"),
            output_errors: str_field(record, "output_errors"),
            vlan_id: str_field(record, "vlan_id"),
            vlan_id_inner: str_field(record, "vlan_id_inner"),
            vlan_id_outer: str_field(record, "vlan_id_outer"),
        }
    }
}

pub fn parse_cisco_ios_show_interfaces(input: &str) -> Result<Vec<Record>, TemplateError> {
    parse(CISCO_IOS_SHOW_INTERFACES_TEMPLATE, input, true)
}

pub fn parse_typed_cisco_ios_show_interfaces(
    input: &str,
) -> Result<Vec<CiscoIosShowInterfacesRow>, TemplateError> {
    parse_typed(CISCO_IOS_SHOW_INTERFACES_TEMPLATE, input)
}

pub const CISCO_IOS_SHOW_BGP_SUMMARY_TEMPLATE: &str = r"Value Filldown router_id (\d+(\.\d+){3})
Value Filldown local_as (\d+)
Value Required remote_ip (\d+(\.\d+){3})
Value remote_as (\d+)
Value uptime (\S+)
Value received_v4 (\d+)
Value status (\D.*?)

Start
  ^BGP router identifier ${router_id}, local AS number ${local_as}
  ^${remote_ip}\s+\d+\s+${remote_as}(?:\s+\S+){5}\s+${uptime}\s+${received_v4}\s*$$ -> Record
  ^${remote_ip}\s+\d+\s+${remote_as}(?:\s+\S+){5}\s+${uptime}\s+${status}\s*$$ -> Record
";

/// One neighbor from `show bgp summary`. A numeric State/PfxRcd column lands
/// in `received_v4`; a non-numeric one (Idle, Active, Connect) lands in
/// `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiscoIosShowBgpSummaryRow {
    pub router_id: String,
    pub local_as: String,
    pub remote_ip: String,
    pub remote_as: String,
    pub uptime: String,
    pub received_v4: String,
    pub status: String,
}

impl FromRecord for CiscoIosShowBgpSummaryRow {
    fn from_record(record: &Record) -> Self {
        Self {
            router_id: str_field(record, "router_id"),
            local_as: str_field(record, "local_as"),
            remote_ip: str_field(record, "remote_ip"),
            remote_as: str_field(record, "remote_as"),
            uptime: str_field(record, "uptime"),
            received_v4: str_field(record, "received_v4"),
            status: str_field(record, "status"),
        }
    }
}

pub fn parse_cisco_ios_show_bgp_summary(input: &str) -> Result<Vec<Record>, TemplateError> {
    parse(CISCO_IOS_SHOW_BGP_SUMMARY_TEMPLATE, input, true)
}

pub fn parse_typed_cisco_ios_show_bgp_summary(
    input: &str,
) -> Result<Vec<CiscoIosShowBgpSummaryRow>, TemplateError> {
    parse_typed(CISCO_IOS_SHOW_BGP_SUMMARY_TEMPLATE, input)
}
