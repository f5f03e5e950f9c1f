//! Wire types for the file-manager menu-provider protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with the file manager over the session bus. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **1:1 with the bus**: Method calls, replies, and broadcast signals
//! - **Stable**: Changes only when the wire protocol changes
//!
//! The session layer (reply correlation, signal dispatch) lives in
//! `oie-runtime`; the menu-provider state machine lives in `oie-extension`.

pub mod fm;
pub mod message;

pub use message::{ErrorPayload, Message, Reply, Request, Signal};
