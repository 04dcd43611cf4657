//! Panel view model.
//!
//! The panel is the set of UI elements bound to device keys.  Every status
//! push is written into it by [`Panel::update_status`], and every user edit
//! comes back out of it through [`Panel::set_user_value`], which plays the
//! part of the control's change handler and yields the string to send to the
//! device.
//!
//! Elements are located by id (the device key) and written according to their
//! role:
//!
//! | Role      | On status push                                        |
//! |-----------|-------------------------------------------------------|
//! | `Label`   | text replaced                                         |
//! | `Display` | text replaced only when marked display-only           |
//! | `Input`   | value set; checkbox checked when the value is non-zero |
//! | `Cell`    | text replaced                                         |
//! | `Radio`   | the option whose value matches is checked             |
//!
//! A key may be bound to several elements of different roles, e.g. an svg
//! label, a table cell and a radio group sharing one name; a status push
//! writes all of them.  Keys with no bound element are still cached but
//! otherwise ignored.

use std::collections::HashMap;
use std::mem;

use serde_json::{Map, Value};

use crate::domain::config_field::FieldKind;
use crate::domain::status::{value_to_text, StatusMap, ACTION_KEY};
use crate::domain::table::ConfigTable;

/// Input control flavours.
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    Text,
    Number,
    ReadOnly,
    Checkbox,
    Range { min: f64, max: f64, step: f64 },
    /// Selected option index is held in the element value.
    Select { options: Vec<String> },
    Button,
}

/// A UI element bound to one device key.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Text node of an svg button.
    Label { text: String },
    Display { display_only: bool, text: String },
    Input {
        kind: InputKind,
        value: String,
        checked: bool,
    },
    /// Table data cell.
    Cell { text: String },
    /// Radio button group addressed by name; option values are in order.
    Radio {
        values: Vec<String>,
        checked: Option<usize>,
    },
}

impl Element {
    pub fn input(kind: InputKind) -> Self {
        Self::Input {
            kind,
            value: String::new(),
            checked: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Panel {
    elements: HashMap<String, Vec<Element>>,
    update_action_ids: Vec<String>,
    status: StatusMap,
    active_tab: Option<String>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `element` to `id`.  An element of the same role already bound
    /// to `id` is replaced; elements of other roles stay bound.
    pub fn register(&mut self, id: impl Into<String>, element: Element) {
        let bound = self.elements.entry(id.into()).or_default();
        let role = mem::discriminant(&element);
        match bound.iter().position(|e| mem::discriminant(e) == role) {
            Some(i) => bound[i] = element,
            None => bound.push(element),
        }
    }

    /// Marks an input whose value is included in a websocket bulk update.
    pub fn mark_update_action(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.update_action_ids.contains(&id) {
            self.update_action_ids.push(id);
        }
    }

    /// First element bound to `id`.
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)?.first()
    }

    /// Every element bound to `id`, in registration order.
    pub fn elements(&self, id: &str) -> &[Element] {
        self.elements.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Cached device state, including keys with no bound element.
    pub fn status(&self) -> &StatusMap {
        &self.status
    }

    /// Drops the cached device state.
    pub fn clear_status(&mut self) {
        self.status.clear();
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    pub fn open_tab(&mut self, name: impl Into<String>) {
        self.active_tab = Some(name.into());
    }

    /// Writes every entry of `update` into its bound element and the cache.
    ///
    /// Returns the number of keys that matched an element.
    pub fn update_status(&mut self, update: &StatusMap) -> usize {
        let mut matched = 0;
        for (key, value) in update.iter() {
            let text = value_to_text(value);
            if let Some(bound) = self.elements.get_mut(key) {
                for element in bound.iter_mut() {
                    write_element(element, &text);
                }
                matched += 1;
            }
        }
        self.status.merge(update);
        matched
    }

    /// Reads the value the first element bound to `id` currently shows.
    pub fn read(&self, id: &str) -> Option<String> {
        match self.element(id)? {
            Element::Label { text } | Element::Display { text, .. } | Element::Cell { text } => {
                Some(text.clone())
            }
            Element::Input {
                kind: InputKind::Checkbox,
                checked,
                ..
            } => Some(flag_text(*checked)),
            Element::Input { value, .. } => Some(value.clone()),
            Element::Radio { values, checked } => checked.and_then(|i| values.get(i)).cloned(),
        }
    }

    /// The string the change handler of the first editable element bound to
    /// `id` would send to the device, or `None` when none is editable.
    pub fn change_value(&self, id: &str) -> Option<String> {
        self.elements.get(id)?.iter().find_map(change_value_of)
    }

    /// Applies a user edit to the first editable element bound to `id` and
    /// returns what its change handler sends.
    ///
    /// Checkboxes accept `1`, `true` or `on` as checked.  Range values are
    /// clamped to the slider bounds and formatted for its step.
    pub fn set_user_value(&mut self, id: &str, raw: &str) -> Option<String> {
        let element = self
            .elements
            .get_mut(id)?
            .iter_mut()
            .find(|e| is_editable(e))?;
        match element {
            Element::Input { kind, value, checked } => match kind {
                InputKind::Checkbox => {
                    *checked = matches!(raw.trim(), "1" | "true" | "on");
                }
                InputKind::Range { min, max, step } => {
                    let clamped = raw
                        .trim()
                        .parse::<f64>()
                        .map(|v| v.max(*min).min(*max).to_string())
                        .unwrap_or_else(|_| raw.to_string());
                    *value = format_range_value(&clamped, *step);
                }
                _ => *value = raw.to_string(),
            },
            Element::Radio { values, checked } => {
                let position = values.iter().position(|v| v == raw.trim())?;
                *checked = Some(position);
            }
            Element::Label { .. } | Element::Display { .. } | Element::Cell { .. } => {
                return None;
            }
        }
        change_value_of(element)
    }

    /// Collects the values of every update-action input into the body of a
    /// websocket bulk update.
    pub fn update_action_values(&self, action: &str) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(ACTION_KEY.to_string(), Value::String(action.to_string()));
        for id in &self.update_action_ids {
            let input = self.elements(id).iter().find_map(|e| match e {
                Element::Input { value, .. } => Some(value),
                _ => None,
            });
            if let Some(value) = input {
                body.insert(id.clone(), Value::String(value.trim().to_string()));
            }
        }
        body
    }

    /// Binds one control per row of a freshly built config table, primed
    /// with the saved values.
    pub fn bind_table(&mut self, table: &ConfigTable) {
        for row in &table.rows {
            let mut element = element_for(&row.kind);
            write_element(&mut element, &row.value);
            self.register(row.key.clone(), element);
        }
    }
}

fn is_editable(element: &Element) -> bool {
    match element {
        Element::Input { kind, .. } => *kind != InputKind::ReadOnly,
        Element::Radio { .. } => true,
        Element::Label { .. } | Element::Display { .. } | Element::Cell { .. } => false,
    }
}

fn change_value_of(element: &Element) -> Option<String> {
    match element {
        Element::Input { kind, value, checked } => match kind {
            InputKind::Checkbox => Some(flag_text(*checked)),
            InputKind::Button => Some("1".to_string()),
            InputKind::ReadOnly => None,
            _ => Some(value.trim().to_string()),
        },
        Element::Radio { values, checked } => checked.and_then(|i| values.get(i)).cloned(),
        Element::Label { .. } | Element::Display { .. } | Element::Cell { .. } => None,
    }
}

fn element_for(kind: &FieldKind) -> Element {
    let input_kind = match kind {
        FieldKind::Text => InputKind::Text,
        FieldKind::Number => InputKind::Number,
        FieldKind::Display => InputKind::ReadOnly,
        FieldKind::Checkbox => InputKind::Checkbox,
        FieldKind::Range { min, max, step } => InputKind::Range {
            min: *min,
            max: *max,
            step: *step,
        },
        FieldKind::Select { options } => InputKind::Select {
            options: options.clone(),
        },
        FieldKind::ActionButton { .. } => InputKind::Button,
        FieldKind::RadioGroup { labels } => {
            return Element::Radio {
                values: (0..labels.len()).map(|i| i.to_string()).collect(),
                checked: None,
            };
        }
    };
    Element::input(input_kind)
}

fn write_element(element: &mut Element, text: &str) {
    match element {
        Element::Label { text: current } | Element::Cell { text: current } => {
            *current = text.to_string();
        }
        Element::Display {
            display_only,
            text: current,
        } => {
            if *display_only {
                *current = text.to_string();
            }
        }
        Element::Input { kind, value, checked } => match kind {
            InputKind::Checkbox => {
                *checked = is_set(text);
                *value = text.to_string();
            }
            InputKind::Range { step, .. } => *value = format_range_value(text, *step),
            _ => *value = text.to_string(),
        },
        Element::Radio { values, checked } => {
            if let Some(position) = values.iter().position(|v| v == text) {
                *checked = Some(position);
            }
        }
    }
}

/// Formats a range value with one decimal place for fractional steps and
/// none otherwise.  Halves round away from zero.  Non-numeric text is
/// passed through.
pub fn format_range_value(text: &str, step: f64) -> String {
    let decimals: usize = if step > 0.0 && step < 1.0 { 1 } else { 0 };
    match text.trim().parse::<f64>() {
        Ok(v) => {
            let scale = 10f64.powi(decimals as i32);
            let rounded = (v * scale).round() / scale;
            format!("{rounded:.decimals$}")
        }
        Err(_) => text.to_string(),
    }
}

fn is_set(text: &str) -> bool {
    text.trim().parse::<f64>().map(|n| n != 0.0).unwrap_or(false)
}

fn flag_text(checked: bool) -> String {
    let text = if checked { "1" } else { "0" };
    text.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
