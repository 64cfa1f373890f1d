//! Bluetooth Module
//!
//! WinRT implementation of the peripheral boundary.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WindowsBleLink                       │
//! │        (PeripheralLink used by session bootstrap)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │
//! │           │  │            │  │          │
//! │ - adverts │  │ - GATT     │  │ - address│
//! │ - address │  │ - labels   │  │ - UUIDs  │
//! │   match   │  │ - writes   │  │          │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! Only [`protocol`] builds off Windows.

#[cfg(windows)]
pub mod connection;
pub mod protocol;
#[cfg(windows)]
pub mod scanner;

#[cfg(windows)]
pub use connection::{GattWriter, WindowsBleLink};
