//! File-manager context-menu extension: open the selected folder in an
//! external editor.
//!
//! The extension speaks the file manager's menu-provider protocol over a
//! [`BusSession`](oie_runtime::BusSession):
//!
//! 1. On enable, the [`ProviderRegistrar`] subscribes to selection
//!    broadcasts and announces the extension as a menu contributor.
//! 2. For each selection event, the [`MenuController`] picks the first
//!    directory in the selection, mints a session-unique action
//!    identifier, inserts a menu item for it, and listens for that
//!    identifier's activation signal.
//! 3. On activation it launches the configured editor on the stored path.
//!
//! Every boundary-crossing callback catches and logs its own failures;
//! nothing in this crate takes the host process down.

pub mod controller;
pub mod error;
pub mod launch;
pub mod lifecycle;
pub mod registrar;
pub mod settings;
pub mod uri;

pub use controller::MenuController;
pub use error::{Error, Result};
pub use launch::{EditorLauncher, Launcher};
pub use lifecycle::Extension;
pub use registrar::{ProviderRegistrar, RegistrationStatus};
pub use settings::Settings;

/// Identity announced to the file manager via `RegisterProvider`.
pub const PROVIDER_ID: &str = "open-in-editor";
