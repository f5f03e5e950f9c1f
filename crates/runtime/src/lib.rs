//! Bus session runtime - transport, correlation, and signal dispatch
//!
//! This crate provides the low-level session infrastructure for talking to
//! the file manager over the session bus:
//!
//! - **Transport**: Length-prefixed JSON framing over a duplex byte stream
//! - **Session**: Method call serial correlation and reply delivery
//! - **Dispatch**: Broadcast signals matched against a subscription table
//!   keyed by (interface, member, optional arg0 filter)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ oie-extension │  Registrar + menu controller
//! └──────┬────────┘
//!        │ subscribe / call
//! ┌──────▼────────┐
//! │  oie-runtime  │  This crate
//! │  ┌─────────┐  │
//! │  │ Session │  │  Serial correlation, dispatch table
//! │  └─────────┘  │
//! │  ┌─────────┐  │
//! │  │ Trans   │  │  Framed pipe transport
//! │  └─────────┘  │
//! └───────────────┘
//! ```
//!
//! The session is an explicitly owned object: callers construct it from a
//! transport, spawn [`BusSession::run`], and shut it down when done. There
//! is no process-wide singleton, so tests can run independent sessions
//! side by side.

pub mod error;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{BusSession, SignalHandler, SubscriptionHandle};
pub use transport::{
    PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts,
    TransportReceiver,
};
