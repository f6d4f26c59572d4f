use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction a field's value travels in.
///
/// `Input` fields are edited on the host side and snapshotted into every
/// request; `Output` fields are written back by the plugin's responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDirection {
    Input,
    Output,
}

/// Canonical datatype of a declared field, after alias coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Text {
        default: String,
    },
    Int(IntOptions),
    Float(FloatOptions),
    Toggle {
        default: bool,
    },
    /// A momentary trigger; carries no value, dispatches a command instead.
    Action,
    /// Tabular plugin output; carries no scalar value.
    Table,
    Enumerated {
        choices: Vec<String>,
        default: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntOptions {
    pub default: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub step: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatOptions {
    pub default: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl FieldKind {
    /// Initial value carried by a freshly validated field, if the kind
    /// carries a value at all.
    pub fn default_value(&self) -> Option<FieldValue> {
        match self {
            FieldKind::Text { default } => Some(FieldValue::Text(default.clone())),
            FieldKind::Int(opts) => Some(FieldValue::Int(opts.default)),
            FieldKind::Float(opts) => Some(FieldValue::Float(opts.default)),
            FieldKind::Toggle { default } => Some(FieldValue::Toggle(*default)),
            FieldKind::Enumerated { default, .. } => Some(FieldValue::Choice(*default)),
            FieldKind::Action | FieldKind::Table => None,
        }
    }

    /// Check that `value` is acceptable for a field of this kind.
    pub fn validate(&self, name: &str, value: &FieldValue) -> Result<(), FieldError> {
        match (self, value) {
            (FieldKind::Text { .. }, FieldValue::Text(_)) => Ok(()),
            (FieldKind::Int(opts), FieldValue::Int(v)) => {
                let below = opts.min.map_or(false, |min| *v < min);
                let above = opts.max.map_or(false, |max| *v > max);
                if below || above {
                    Err(FieldError::OutOfRange {
                        name: name.to_string(),
                        value: *v as f64,
                        min: opts.min.map(|v| v as f64),
                        max: opts.max.map(|v| v as f64),
                    })
                } else {
                    Ok(())
                }
            }
            (FieldKind::Float(opts), FieldValue::Float(v)) => {
                let below = opts.min.map_or(false, |min| *v < min);
                let above = opts.max.map_or(false, |max| *v > max);
                if below || above {
                    Err(FieldError::OutOfRange {
                        name: name.to_string(),
                        value: *v,
                        min: opts.min,
                        max: opts.max,
                    })
                } else {
                    Ok(())
                }
            }
            (FieldKind::Toggle { .. }, FieldValue::Toggle(_)) => Ok(()),
            (FieldKind::Enumerated { choices, .. }, FieldValue::Choice(idx)) => {
                if *idx >= choices.len() {
                    Err(FieldError::InvalidChoice {
                        name: name.to_string(),
                        index: *idx,
                        count: choices.len(),
                    })
                } else {
                    Ok(())
                }
            }
            (FieldKind::Action | FieldKind::Table, _) => Err(FieldError::Valueless {
                name: name.to_string(),
                kind: self.type_name(),
            }),
            _ => Err(FieldError::WrongType {
                name: name.to_string(),
                expected: self.type_name(),
                actual: value.type_name(),
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "string",
            FieldKind::Int(_) => "int",
            FieldKind::Float(_) => "float",
            FieldKind::Toggle { .. } => "bool",
            FieldKind::Action => "action",
            FieldKind::Table => "table",
            FieldKind::Enumerated { .. } => "enumerated",
        }
    }
}

/// A concrete field value exchanged between host and plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Toggle(bool),
    /// Index into an enumerated field's choice list.
    Choice(usize),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_toggle(&self) -> Option<bool> {
        match self {
            FieldValue::Toggle(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<usize> {
        match self {
            FieldValue::Choice(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Toggle(_) => "bool",
            FieldValue::Choice(_) => "choice",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Toggle(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Toggle(v) => write!(f, "{v}"),
            FieldValue::Choice(v) => write!(f, "#{v}"),
        }
    }
}

/// A validated field in its canonical form.
///
/// Produced by the host's validator from a raw declaration; `value` holds
/// the current value for value-bearing kinds and is the slot request
/// snapshots read from and response outputs write to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub label: String,
    /// Display page this field was declared on, if any. Pages scope display
    /// only; `name` is unique across the whole flattened set.
    pub page: Option<String>,
    pub kind: FieldKind,
    pub direction: FieldDirection,
    pub value: Option<FieldValue>,
    /// Command fired when an action field is triggered.
    pub command: Option<String>,
}

impl Field {
    /// Replace the current value after checking it against the field kind.
    pub fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        self.kind.validate(&self.name, &value)?;
        self.value = Some(value);
        Ok(())
    }
}

/// Errors raised when a field value does not fit its declaration.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("field `{name}` expected {expected} value but received {actual}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("field `{name}` received value {value} outside of its declared bounds")]
    OutOfRange {
        name: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    #[error("field `{name}` received choice index {index} outside of 0..{count}")]
    InvalidChoice {
        name: String,
        index: usize,
        count: usize,
    },
    #[error("field `{name}` is a {kind} field and carries no value")]
    Valueless { name: String, kind: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_kind() -> FieldKind {
        FieldKind::Float(FloatOptions {
            default: 1.0,
            min: Some(0.0),
            max: Some(10.0),
            step: None,
        })
    }

    #[test]
    fn float_bounds_are_enforced() {
        let kind = float_kind();
        assert!(kind.validate("width", &FieldValue::Float(5.0)).is_ok());
        assert!(matches!(
            kind.validate("width", &FieldValue::Float(11.0)),
            Err(FieldError::OutOfRange { .. })
        ));
    }

    #[test]
    fn int_values_coerce_to_float_reads() {
        assert_eq!(FieldValue::Int(3).as_float(), Some(3.0));
    }

    #[test]
    fn choice_index_must_exist() {
        let kind = FieldKind::Enumerated {
            choices: vec!["a".into(), "b".into()],
            default: 0,
        };
        assert!(kind.validate("mode", &FieldValue::Choice(1)).is_ok());
        assert!(matches!(
            kind.validate("mode", &FieldValue::Choice(2)),
            Err(FieldError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn action_fields_reject_values() {
        assert!(matches!(
            FieldKind::Action.validate("run", &FieldValue::Toggle(true)),
            Err(FieldError::Valueless { .. })
        ));
    }
}
