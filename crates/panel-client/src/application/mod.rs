//! Application layer: use cases built on the core domain.
//!
//! - [`dispatch`]: carries out routed actions through the
//!   [`dispatch::DeviceControl`] and [`dispatch::CommandSink`] seams.
//! - [`session`]: owns the panel state for one live connection and
//!   processes socket events in order.

pub mod dispatch;
pub mod session;
