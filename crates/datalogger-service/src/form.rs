//! Serial port form submitted by the connect and disconnect actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const REQUIRED: &str = "This field is required.";
pub const NOT_AN_INTEGER: &str = "Not a valid integer value.";
pub const NOT_POSITIVE: &str = "Number must be at least 1.";

/// Raw, unvalidated form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SerialPortForm {
    pub comm_port: Option<String>,
    pub baud_rate: Option<String>,
}

/// Validated serial settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
}

/// Validation errors keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl SerialPortForm {
    /// Check every field and collect all errors.
    pub fn validate(&self) -> Result<SerialSettings, FieldErrors> {
        let mut errors = FieldErrors::default();

        let port = match non_blank(&self.comm_port) {
            Some(port) => port.to_string(),
            None => {
                errors.push("comm_port", REQUIRED);
                String::new()
            }
        };

        let baud_rate = match non_blank(&self.baud_rate) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) => {
                    errors.push("baud_rate", NOT_POSITIVE);
                    0
                }
                Ok(rate) => rate,
                Err(_) => {
                    errors.push("baud_rate", NOT_AN_INTEGER);
                    0
                }
            },
            None => {
                errors.push("baud_rate", REQUIRED);
                0
            }
        };

        if errors.is_empty() {
            Ok(SerialSettings { port, baud_rate })
        } else {
            Err(errors)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
