//! `~/.netpush` option overlay.
//!
//! A flat YAML key/value document whose keys match the long flag names.
//! File values fill in flags the user did not pass on the command line; a
//! missing file is fine.

use log::warn;
use serde_yaml::{Mapping, Value};

use crate::ioutil::expand_home;

/// A loaded (possibly empty) overlay document.
#[derive(Debug, Default)]
pub struct ConfigFile {
    map: Mapping,
}

impl ConfigFile {
    /// Load `path` (`~/` expanded). A nonexistent file yields an empty
    /// overlay; an unparseable one is reported and ignored.
    pub fn load(path: &str) -> Self {
        let path = expand_home(path);
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml::from_str::<Mapping>(&text) {
            Ok(map) => Self { map },
            Err(error) => {
                warn!("could not parse config file {}: {error}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_str_for_tests(text: &str) -> Self {
        Self {
            map: serde_yaml::from_str(text).unwrap_or_default(),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(Value::String(key.to_string()))
    }

    /// String-valued key; scalars are coerced to their text form.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Bool-valued key; the strings "true"/"false" also count.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Integer-valued key; numeric strings also count.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}
