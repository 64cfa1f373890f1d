//! Bitsnap robot control over Bluetooth LE
//!
//! ```text
//! caller ─▶ Command ─▶ DispatcherHandle::enqueue ─▶ consumer ─▶ frame::encode ─▶ PeripheralWriter
//! ```
//!
//! [`infrastructure::session::establish`] finds the robot and returns a
//! [`Session`](infrastructure::session::Session) whose handle is the only way to
//! issue commands.

pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::command::Command;
pub use infrastructure::dispatcher::{DispatchError, DispatcherHandle};
pub use infrastructure::session::{establish, Session, SessionConfig, SessionError};
