//! Domain layer: pure panel state with no I/O.
//!
//! - [`status`]: ordered key/value cache of device state.
//! - [`config_field`]: the one-letter type tag format used to describe a
//!   setting's input control.
//! - [`table`]: groups decoded fields into a config table per config group.
//! - [`panel`]: the bound UI elements that status pushes are written into.
//! - [`log`]: severity classification of device log lines.

pub mod config_field;
pub mod log;
pub mod panel;
pub mod status;
pub mod table;
