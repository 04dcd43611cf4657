//! Config table builder.
//!
//! When the user opens a config group the device answers with a JSON object
//! in which every setting occupies three consecutive entries:
//!
//! ```text
//! "fps":     "20"          ← key and saved value
//! "fps_lab": "Frame rate"  ← label (entry key ignored)
//! "fps_typ": "R:1:30:1"    ← type spec (entry key ignored)
//! ```
//!
//! [`TableBuilder::build`] walks those triples in order and decodes each into
//! a [`ConfigField`].  A row with a bad spec is reported and skipped; the rest
//! of the table is still built.
//!
//! # Target containers
//!
//! A config group may have a dedicated *retained* container on the main page.
//! Such a group is re-rendered on every push.  All other groups share one
//! config container, and asking for the group that is already displayed
//! there is a no-op.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::config_field::{ConfigField, FieldError};
use crate::domain::status::{value_to_text, StatusMap, CFG_GROUP_KEY};

/// A row that could not be turned into a control.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TableError {
    #[error("setting '{key}': {source}")]
    Field {
        key: String,
        #[source]
        source: FieldError,
    },

    /// The payload ended part way through a triple.
    #[error("setting '{key}' is missing its label or type spec")]
    IncompleteEntry { key: String },
}

/// Where a table is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    /// The dedicated main-page container for this group.
    Retained(String),
    /// The shared config container.
    Shared,
}

/// A decoded config group ready to display.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTable {
    pub group: String,
    pub container: Container,
    pub rows: Vec<ConfigField>,
}

/// Result of a [`TableBuilder::build`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built {
        table: ConfigTable,
        /// Rows that were skipped, in payload order.
        errors: Vec<TableError>,
    },
    /// The group is already displayed in the shared container.
    Skipped,
}

/// Tracks which group is on screen and builds tables from device payloads.
#[derive(Debug, Default)]
pub struct TableBuilder {
    current_group: Option<String>,
    retained: HashSet<String>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dedicated main-page container for `group`.
    pub fn retain_group(&mut self, group: impl Into<String>) {
        self.retained.insert(group.into());
    }

    /// The group currently displayed, if any.
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }

    /// Forgets the displayed group, e.g. when the user closes the config view,
    /// so the next request for it renders again.
    pub fn clear(&mut self) {
        self.current_group = None;
    }

    /// Picks the container a group renders into.
    pub fn container_for(&self, group: &str) -> Container {
        if self.retained.contains(group) {
            Container::Retained(group.to_string())
        } else {
            Container::Shared
        }
    }

    /// Decodes `data` into the table for `group`.
    ///
    /// Returns [`BuildOutcome::Skipped`] when `group` is already displayed in
    /// the shared container.
    pub fn build(&mut self, data: &StatusMap, group: &str) -> BuildOutcome {
        let container = self.container_for(group);
        if container == Container::Shared && self.current_group.as_deref() == Some(group) {
            debug!("config group {group} already displayed; skipping rebuild");
            return BuildOutcome::Skipped;
        }
        self.current_group = Some(group.to_string());

        let (rows, errors) = decode_rows(data);
        for error in &errors {
            warn!("config group {group}: {error}");
        }

        BuildOutcome::Built {
            table: ConfigTable {
                group: group.to_string(),
                container,
                rows,
            },
            errors,
        }
    }
}

/// Walks the payload in `(key/value, label, spec)` triples.
fn decode_rows(data: &StatusMap) -> (Vec<ConfigField>, Vec<TableError>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    let entries: Vec<(&String, String)> = data
        .iter()
        .filter(|(key, _)| key.as_str() != CFG_GROUP_KEY)
        .map(|(key, value)| (key, value_to_text(value)))
        .collect();

    for triple in entries.chunks(3) {
        match triple {
            [(key, saved), (_, label), (_, spec)] => {
                match ConfigField::decode(key, saved, label, spec) {
                    Ok(field) => rows.push(field),
                    Err(source) => errors.push(TableError::Field {
                        key: key.to_string(),
                        source,
                    }),
                }
            }
            [(key, _), ..] => errors.push(TableError::IncompleteEntry {
                key: key.to_string(),
            }),
            [] => {}
        }
    }

    (rows, errors)
}

impl fmt::Display for ConfigTable {
    /// Two-column text rendering: setting name and current control.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|row| row.label.len())
            .max()
            .unwrap_or(0)
            .max("Setting Name".len());
        writeln!(f, "{:<width$}  Setting Value", "Setting Name")?;
        for row in &self.rows {
            writeln!(f, "{:<width$}  {} = {}", row.label, row.kind, row.value)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config_field::FieldKind;

    fn payload() -> StatusMap {
        StatusMap::from_json_str(
            r#"{
                "cfgGroup": "2",
                "quality": "50", "quality_l": "JPEG quality", "quality_t": "R:0:100:1",
                "enableMic": 1, "enableMic_l": "Microphone", "enableMic_t": "C",
                "frameSize": "1", "frameSize_l": "Frame size", "frameSize_t": "S:QVGA:VGA"
            }"#,
        )
        .unwrap()
    }

    fn built(outcome: BuildOutcome) -> (ConfigTable, Vec<TableError>) {
        match outcome {
            BuildOutcome::Built { table, errors } => (table, errors),
            BuildOutcome::Skipped => panic!("expected a built table"),
        }
    }

    #[test]
    fn test_build_decodes_triples_in_order() {
        // Arrange
        let mut builder = TableBuilder::new();

        // Act
        let (table, errors) = built(builder.build(&payload(), "2"));

        // Assert
        assert!(errors.is_empty());
        let keys: Vec<&str> = table.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["quality", "enableMic", "frameSize"]);
        assert_eq!(table.rows[1].label, "Microphone");
        assert_eq!(table.rows[1].value, "1");
    }

    #[test]
    fn test_range_row_carries_bounds_and_saved_value() {
        let mut builder = TableBuilder::new();
        let (table, _) = built(builder.build(&payload(), "2"));

        let quality = &table.rows[0];
        assert_eq!(
            quality.kind,
            FieldKind::Range {
                min: 0.0,
                max: 100.0,
                step: 1.0
            }
        );
        assert_eq!(quality.value, "50");
    }

    #[test]
    fn test_second_build_of_same_group_is_skipped() {
        // Arrange
        let mut builder = TableBuilder::new();
        let _ = builder.build(&payload(), "2");

        // Act
        let second = builder.build(&payload(), "2");

        // Assert
        assert_eq!(second, BuildOutcome::Skipped);
        assert_eq!(builder.current_group(), Some("2"));
    }

    #[test]
    fn test_different_group_rebuilds() {
        let mut builder = TableBuilder::new();
        let _ = builder.build(&payload(), "2");
        assert!(matches!(
            builder.build(&payload(), "3"),
            BuildOutcome::Built { .. }
        ));
    }

    #[test]
    fn test_retained_group_always_rebuilds() {
        // Arrange
        let mut builder = TableBuilder::new();
        builder.retain_group("2");
        let _ = builder.build(&payload(), "2");

        // Act
        let (table, _) = built(builder.build(&payload(), "2"));

        // Assert
        assert_eq!(table.container, Container::Retained("2".into()));
    }

    #[test]
    fn test_clear_allows_rebuild() {
        let mut builder = TableBuilder::new();
        let _ = builder.build(&payload(), "2");
        builder.clear();
        assert!(matches!(
            builder.build(&payload(), "2"),
            BuildOutcome::Built { .. }
        ));
    }

    #[test]
    fn test_unknown_tag_skips_row_and_keeps_rest() {
        // Arrange
        let data = StatusMap::from_json_str(
            r#"{"a":"1","a_l":"Alpha","a_t":"Q","b":"x","b_l":"Beta","b_t":"T"}"#,
        )
        .unwrap();
        let mut builder = TableBuilder::new();

        // Act
        let (table, errors) = built(builder.build(&data, "5"));

        // Assert
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].key, "b");
        assert_eq!(
            errors,
            vec![TableError::Field {
                key: "a".into(),
                source: FieldError::UnknownTypeTag {
                    tag: 'Q',
                    spec: "Q".into()
                }
            }]
        );
    }

    #[test]
    fn test_trailing_partial_entry_is_reported() {
        let data =
            StatusMap::from_json_str(r#"{"a":"1","a_l":"Alpha","a_t":"N","b":"2"}"#).unwrap();
        let mut builder = TableBuilder::new();
        let (table, errors) = built(builder.build(&data, "1"));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(errors, vec![TableError::IncompleteEntry { key: "b".into() }]);
    }

    #[test]
    fn test_display_lists_every_row() {
        let mut builder = TableBuilder::new();
        let (table, _) = built(builder.build(&payload(), "2"));
        let text = table.to_string();
        assert!(text.starts_with("Setting Name"));
        assert!(text.contains("JPEG quality"));
        assert!(text.contains("range 0..100 step 1 = 50"));
    }
}
