//! Extension lifecycle: the host's enable/disable hooks.
//!
//! The host environment owns these calls; the extension never restarts
//! itself. A failed registration leaves `enable` successful but inert -
//! the host's next enable/disable cycle is the only recovery path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use oie_runtime::BusSession;

use crate::PROVIDER_ID;
use crate::controller::MenuController;
use crate::launch::{EditorLauncher, Launcher};
use crate::registrar::ProviderRegistrar;
use crate::settings::Settings;

/// The extension: an explicitly owned context object, one per session.
///
/// No process-wide state; tests run several of these against independent
/// sessions.
pub struct Extension {
    registrar: Arc<ProviderRegistrar>,
    controller: Arc<MenuController>,
    enabled: AtomicBool,
}

impl Extension {
    /// Builds the extension with the production editor launcher.
    pub fn new(session: Arc<BusSession>, settings: &Settings) -> Self {
        Self::with_launcher(
            session,
            Arc::new(EditorLauncher::new(settings.editor_command.clone())),
        )
    }

    /// Builds the extension with a caller-supplied launcher (test seam).
    pub fn with_launcher(session: Arc<BusSession>, launcher: Arc<dyn Launcher>) -> Self {
        let registrar = Arc::new(ProviderRegistrar::new(Arc::clone(&session), PROVIDER_ID));
        let controller = MenuController::new(session, Arc::clone(&registrar), launcher);
        Self {
            registrar,
            controller,
            enabled: AtomicBool::new(false),
        }
    }

    /// Subscribes to selection events and announces the provider.
    ///
    /// Idempotent. Registration failure is logged and non-fatal: the
    /// extension stays enabled but contributes nothing until the next
    /// enable cycle.
    pub async fn enable(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            tracing::debug!("enable called while already enabled");
            return;
        }

        self.controller.arm();
        self.registrar
            .subscribe_selection(self.controller.selection_handler());

        if let Err(e) = self.registrar.register().await {
            tracing::warn!("menu contribution disabled: {e}");
        }
    }

    /// Reverses everything `enable` set up.
    ///
    /// Safe to call when `enable` never ran or failed part-way.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }

        self.controller.teardown();
        self.registrar.teardown();
    }

    /// True once the file manager accepted the provider registration.
    pub fn is_registered(&self) -> bool {
        self.registrar.is_registered()
    }

    /// Number of contributed actions still awaiting activation.
    pub fn pending_actions(&self) -> usize {
        self.controller.pending_len()
    }
}
