//! Type-tagged config field specs.
//!
//! Each device setting is described by a short spec string whose first
//! character picks the input control and whose remainder, after a `:`
//! delimiter, carries colon-separated parameters:
//!
//! | Spec                | Control                                   |
//! |---------------------|-------------------------------------------|
//! | `T`                 | free text input                           |
//! | `N`                 | number input                              |
//! | `S:low:mid:high`    | drop-down select, option value = index    |
//! | `C`                 | checkbox (0/1)                            |
//! | `D`                 | read-only display                         |
//! | `R:min:max:step`    | range slider                              |
//! | `B:off:on:auto`     | radio button group, option value = index  |
//! | `A:caption`         | action button                             |
//!
//! The spec is decoded once, at the boundary, into [`FieldKind`].  Unknown
//! tags are rejected with [`FieldError::UnknownTypeTag`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator between the type tag and its parameters, and between parameters.
pub const PARAM_DELIMITER: char = ':';

/// Errors produced while decoding a field spec.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError {
    /// The spec string was empty, so no type tag was present.
    #[error("empty config field spec")]
    EmptySpec,

    /// The first character is not a known type tag.
    #[error("unknown config field type tag '{tag}' in '{spec}'")]
    UnknownTypeTag { tag: char, spec: String },

    /// A range spec did not carry three numeric parameters.
    #[error("malformed range spec '{spec}': expected R:min:max:step")]
    MalformedRange { spec: String },

    /// A select or radio spec carried no options.
    #[error("{kind} spec '{spec}' has no options")]
    MissingOptions { kind: &'static str, spec: String },
}

/// The input control a setting is edited with.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Number,
    /// Drop-down; the submitted value is the index of the chosen option.
    Select { options: Vec<String> },
    Checkbox,
    /// Read-only display of the saved value.
    Display,
    Range { min: f64, max: f64, step: f64 },
    /// Radio buttons; the submitted value is the index of the checked label.
    RadioGroup { labels: Vec<String> },
    /// A button that sends `<key>=1` when pressed.
    ActionButton { caption: String },
}

impl FieldKind {
    /// Decodes a spec string such as `"R:0:100:1"`.
    ///
    /// # Errors
    ///
    /// See [`FieldError`].
    pub fn parse(spec: &str) -> Result<Self, FieldError> {
        let mut chars = spec.chars();
        let tag = chars.next().ok_or(FieldError::EmptySpec)?;
        let rest = chars.as_str();
        let params = rest.strip_prefix(PARAM_DELIMITER).unwrap_or(rest);

        match tag {
            'T' => Ok(Self::Text),
            'N' => Ok(Self::Number),
            'C' => Ok(Self::Checkbox),
            'D' => Ok(Self::Display),
            'S' => Ok(Self::Select {
                options: split_options(params, "select", spec)?,
            }),
            'B' => Ok(Self::RadioGroup {
                labels: split_options(params, "radio", spec)?,
            }),
            'R' => parse_range(params, spec),
            'A' => Ok(Self::ActionButton {
                caption: if params.is_empty() {
                    "Run".to_string()
                } else {
                    params.to_string()
                },
            }),
            other => Err(FieldError::UnknownTypeTag {
                tag: other,
                spec: spec.to_string(),
            }),
        }
    }

    /// The one-letter wire tag for this kind.
    pub fn tag(&self) -> char {
        match self {
            Self::Text => 'T',
            Self::Number => 'N',
            Self::Select { .. } => 'S',
            Self::Checkbox => 'C',
            Self::Display => 'D',
            Self::Range { .. } => 'R',
            Self::RadioGroup { .. } => 'B',
            Self::ActionButton { .. } => 'A',
        }
    }
}

impl FromStr for FieldKind {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_options(params: &str, kind: &'static str, spec: &str) -> Result<Vec<String>, FieldError> {
    if params.is_empty() {
        return Err(FieldError::MissingOptions {
            kind,
            spec: spec.to_string(),
        });
    }
    Ok(params.split(PARAM_DELIMITER).map(str::to_string).collect())
}

fn parse_range(params: &str, spec: &str) -> Result<FieldKind, FieldError> {
    let malformed = || FieldError::MalformedRange {
        spec: spec.to_string(),
    };
    let numbers = params
        .split(PARAM_DELIMITER)
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;
    match numbers.as_slice() {
        [min, max, step] => Ok(FieldKind::Range {
            min: *min,
            max: *max,
            step: *step,
        }),
        _ => Err(malformed()),
    }
}

/// One decoded row of a config table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigField {
    /// Device key; also the id of the control bound to it.
    pub key: String,
    /// Human-readable setting name.
    pub label: String,
    pub kind: FieldKind,
    /// Saved value as reported by the device.
    pub value: String,
}

impl ConfigField {
    /// Decodes one `(key, saved value, label, spec)` entry.
    ///
    /// # Example
    ///
    /// ```rust
    /// use panel_core::{ConfigField, FieldKind};
    ///
    /// let field = ConfigField::decode("quality", "50", "JPEG quality", "R:0:100:1").unwrap();
    /// assert_eq!(field.kind, FieldKind::Range { min: 0.0, max: 100.0, step: 1.0 });
    /// assert_eq!(field.value, "50");
    /// ```
    pub fn decode(key: &str, value: &str, label: &str, spec: &str) -> Result<Self, FieldError> {
        Ok(Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: FieldKind::parse(spec)?,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Select { options } => write!(f, "select[{}]", options.join("|")),
            Self::Checkbox => write!(f, "checkbox"),
            Self::Display => write!(f, "display"),
            Self::Range { min, max, step } => write!(f, "range {min}..{max} step {step}"),
            Self::RadioGroup { labels } => write!(f, "radio[{}]", labels.join("|")),
            Self::ActionButton { caption } => write!(f, "button '{caption}'"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
