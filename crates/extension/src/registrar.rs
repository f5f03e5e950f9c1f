//! Provider registrar: announces the extension to the file manager.
//!
//! Registration is a one-time, bounded handshake at startup. The protocol
//! has no revocation call, so teardown only cancels the local
//! selection-event subscription and resets status.

use std::sync::Arc;
use std::time::Duration;

use oie_protocol::fm;
use oie_runtime::{BusSession, SignalHandler, SubscriptionHandle};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Bound on the registration handshake. Startup-only; never on the
/// activation path.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the registrar is in the provider handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Unregistered,
    Registering,
    Registered,
    /// Announcement rejected or timed out. Menu contribution stays off
    /// until the next enable cycle.
    Failed,
}

/// Establishes the extension as a recognized menu contributor.
pub struct ProviderRegistrar {
    session: Arc<BusSession>,
    provider_id: String,
    status: Mutex<RegistrationStatus>,
    selection_subscription: Mutex<Option<SubscriptionHandle>>,
}

impl ProviderRegistrar {
    pub fn new(session: Arc<BusSession>, provider_id: impl Into<String>) -> Self {
        Self {
            session,
            provider_id: provider_id.into(),
            status: Mutex::new(RegistrationStatus::Unregistered),
            selection_subscription: Mutex::new(None),
        }
    }

    /// Subscribes to the file manager's selection broadcast.
    ///
    /// Idempotent: a second call never creates a duplicate subscription.
    /// Valid even before the file manager process exists; the
    /// subscription simply never fires until signals arrive.
    pub fn subscribe_selection(&self, handler: SignalHandler) {
        let mut slot = self.selection_subscription.lock();
        if slot.is_some() {
            tracing::debug!("selection subscription already present");
            return;
        }

        let handle =
            self.session
                .subscribe(fm::MENU_PROVIDER_INTERFACE, fm::ITEMS_ADDED, None, handler);
        *slot = Some(handle);
    }

    /// Announces this extension to the file manager's registration point.
    ///
    /// On timeout or rejection the registrar is marked [`RegistrationStatus::Failed`]
    /// and the error is returned; the caller logs it and carries on. No retry.
    pub async fn register(&self) -> Result<()> {
        *self.status.lock() = RegistrationStatus::Registering;

        let call = self.session.call(
            fm::MENU_PROVIDER_INTERFACE,
            fm::MENU_PROVIDER_PATH,
            fm::REGISTER_PROVIDER,
            vec![serde_json::json!(self.provider_id)],
        );

        let outcome = match tokio::time::timeout(REGISTRATION_TIMEOUT, call).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::Registration(e.to_string())),
            Err(_) => Err(Error::Registration(format!(
                "no reply within {}s",
                REGISTRATION_TIMEOUT.as_secs()
            ))),
        };

        *self.status.lock() = match &outcome {
            Ok(()) => RegistrationStatus::Registered,
            Err(_) => RegistrationStatus::Failed,
        };
        outcome
    }

    pub fn status(&self) -> RegistrationStatus {
        *self.status.lock()
    }

    /// Gate consulted before any menu contribution.
    pub fn is_registered(&self) -> bool {
        self.status() == RegistrationStatus::Registered
    }

    /// Cancels the selection subscription and resets status.
    ///
    /// Safe to call when nothing was ever set up.
    pub fn teardown(&self) {
        if let Some(handle) = self.selection_subscription.lock().take() {
            self.session.unsubscribe(&handle);
        }
        *self.status.lock() = RegistrationStatus::Unregistered;
    }
}
