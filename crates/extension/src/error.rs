//! Error taxonomy for the extension.
//!
//! Propagation policy: failures crossing the bus or process boundary are
//! caught where they happen, logged, and converted into "do nothing
//! further for this event". Nothing here is retried automatically; the
//! host's enable/disable cycle is the only recovery path.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bus unreachable. Fatal to this session; no retry.
    #[error("bus connection failed: {0}")]
    Connection(String),

    /// Provider announcement rejected or timed out. Disables menu
    /// contribution until the next enable cycle.
    #[error("provider registration failed: {0}")]
    Registration(String),

    /// `AddMenuItem` failed for one event. Aborts that pending action only.
    #[error("menu insert failed: {0}")]
    MenuInsert(String),

    /// Editor process could not be spawned.
    #[error("editor launch failed: {command}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A selection URI does not resolve to a local path (remote or
    /// virtual location). The URI is skipped, never shown to the user.
    #[error("not a local path: {uri}")]
    PathResolution { uri: String },

    #[error(transparent)]
    Runtime(#[from] oie_runtime::Error),
}
