//! Menu session controller.
//!
//! Translates selection events into menu contributions and menu
//! activations into editor launches. Per selection event:
//!
//! - filter: take the first URI in list order that resolves to a local
//!   directory (files interleaved with directories are skipped; extra
//!   directories in the same event are ignored - a documented
//!   limitation, not one to fix silently);
//! - mint: generate a session-unique action identifier;
//! - register: insert the menu item via `AddMenuItem`;
//! - await: subscribe to `MenuItemActivated` scoped by the identifier;
//! - activate: one-shot - resolve the stored path, cancel the
//!   subscription, launch the editor.
//!
//! The protocol has no menu-closed notification, so actions that are
//! never activated would otherwise accumulate forever. The pending table
//! is bounded at [`MAX_PENDING`]; inserting past the bound evicts the
//! oldest action and cancels its subscription.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use oie_protocol::{Signal, fm};
use oie_runtime::{BusSession, SignalHandler, SubscriptionHandle};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::launch::Launcher;
use crate::registrar::ProviderRegistrar;
use crate::uri;

/// Display label for the contributed menu entry.
pub const MENU_LABEL: &str = "Open in Editor";

/// Static icon hint passed with the menu entry.
pub const MENU_ICON: &str = "folder-open";

/// Bound on contributed-but-never-activated actions.
pub const MAX_PENDING: usize = 64;

/// One contributed menu action awaiting possible activation.
struct PendingAction {
    target: PathBuf,
    subscription: SubscriptionHandle,
}

/// Pending actions plus insertion order for eviction.
#[derive(Default)]
struct PendingTable {
    actions: HashMap<String, PendingAction>,
    order: VecDeque<String>,
}

impl PendingTable {
    fn insert(&mut self, action_id: String, action: PendingAction) {
        self.order.push_back(action_id.clone());
        self.actions.insert(action_id, action);
    }

    fn remove(&mut self, action_id: &str) -> Option<PendingAction> {
        let action = self.actions.remove(action_id)?;
        self.order.retain(|id| id != action_id);
        Some(action)
    }

    /// Evicts oldest entries past the bound, returning their actions so
    /// the caller can cancel subscriptions outside this table.
    fn evict_over(&mut self, bound: usize) -> Vec<PendingAction> {
        let mut evicted = Vec::new();
        while self.actions.len() > bound {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(action) = self.actions.remove(&oldest) {
                tracing::debug!(action_id = %oldest, "evicting stale pending action");
                evicted.push(action);
            }
        }
        evicted
    }

    fn drain(&mut self) -> Vec<PendingAction> {
        self.order.clear();
        self.actions.drain().map(|(_, action)| action).collect()
    }
}

/// Translates selection events into menu contributions and activations
/// into editor launches.
pub struct MenuController {
    session: Arc<BusSession>,
    registrar: Arc<ProviderRegistrar>,
    launcher: Arc<dyn Launcher>,
    pending: Mutex<PendingTable>,
    disabled: AtomicBool,
}

impl MenuController {
    pub fn new(
        session: Arc<BusSession>,
        registrar: Arc<ProviderRegistrar>,
        launcher: Arc<dyn Launcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            registrar,
            launcher,
            pending: Mutex::new(PendingTable::default()),
            disabled: AtomicBool::new(false),
        })
    }

    /// Handler to hang on the `ItemsAdded` subscription.
    ///
    /// Classification and the `AddMenuItem` call are async, so the
    /// handler spawns a task per event instead of blocking the dispatch
    /// loop.
    pub fn selection_handler(self: &Arc<Self>) -> SignalHandler {
        let controller = Arc::clone(self);
        Arc::new(move |signal| {
            let uris = selection_uris(signal);
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller.handle_selection(uris).await;
            });
        })
    }

    /// Number of actions currently awaiting activation.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().actions.len()
    }

    /// Clears the disabled flag so a re-enabled extension handles events
    /// again.
    pub fn arm(&self) {
        self.disabled.store(false, Ordering::SeqCst);
    }

    /// Cancels every pending activation subscription and ignores all
    /// later events.
    pub fn teardown(&self) {
        self.disabled.store(true, Ordering::SeqCst);
        let drained = self.pending.lock().drain();
        for action in &drained {
            self.session.unsubscribe(&action.subscription);
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "cancelled pending actions");
        }
    }

    async fn handle_selection(self: Arc<Self>, uris: Vec<String>) {
        if self.disabled.load(Ordering::SeqCst) {
            return;
        }
        if !self.registrar.is_registered() {
            tracing::debug!("selection event while unregistered (ignored)");
            return;
        }

        let Some(target) = self.first_directory(&uris).await else {
            // Zero directories in the selection: contribute nothing.
            return;
        };

        if let Err(e) = self.contribute(target).await {
            tracing::warn!("menu contribution failed: {e}");
        }
    }

    /// First URI in list order that resolves to a local directory.
    ///
    /// Unresolvable URIs (remote/virtual locations) are skipped, as are
    /// paths that are not directories or cannot be inspected.
    async fn first_directory(&self, uris: &[String]) -> Option<PathBuf> {
        for uri in uris {
            let path = match uri::local_path(uri) {
                Ok(path) => path,
                Err(e) => {
                    tracing::debug!("skipping selection entry: {e}");
                    continue;
                }
            };
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => return Some(path),
                _ => continue,
            }
        }
        None
    }

    async fn contribute(self: &Arc<Self>, target: PathBuf) -> Result<()> {
        let action_id = mint_action_id();
        let target_uri = uri::to_file_uri(&target)?;

        self.session
            .call(
                fm::MENU_PROVIDER_INTERFACE,
                fm::MENU_PROVIDER_PATH,
                fm::ADD_MENU_ITEM,
                vec![
                    serde_json::json!(action_id),
                    serde_json::json!(MENU_LABEL),
                    serde_json::json!({
                        fm::ATTR_ICON_NAME: MENU_ICON,
                        fm::ATTR_URI: target_uri,
                    }),
                ],
            )
            .await
            .map_err(|e| Error::MenuInsert(e.to_string()))?;

        let controller = Arc::clone(self);
        let handler_action_id = action_id.clone();
        let subscription = self.session.subscribe(
            fm::MENU_PROVIDER_INTERFACE,
            fm::MENU_ITEM_ACTIVATED,
            Some(&action_id),
            Arc::new(move |_signal| {
                controller.on_activated(&handler_action_id);
            }),
        );

        let evicted = {
            let mut table = self.pending.lock();
            if self.disabled.load(Ordering::SeqCst) {
                // Teardown raced the AddMenuItem round trip; don't leak
                // a listener past disable.
                drop(table);
                self.session.unsubscribe(&subscription);
                return Ok(());
            }
            tracing::debug!(action_id = %action_id, target = %target.display(), "menu action pending");
            table.insert(
                action_id,
                PendingAction {
                    target,
                    subscription,
                },
            );
            table.evict_over(MAX_PENDING)
        };
        for action in evicted {
            self.session.unsubscribe(&action.subscription);
        }

        Ok(())
    }

    /// One-shot activation: a repeated signal for an already-consumed
    /// identifier finds nothing in the table and does nothing.
    fn on_activated(&self, action_id: &str) {
        if self.disabled.load(Ordering::SeqCst) {
            return;
        }

        let Some(action) = self.pending.lock().remove(action_id) else {
            tracing::debug!(action_id, "activation for unknown action (ignored)");
            return;
        };
        self.session.unsubscribe(&action.subscription);

        if let Err(e) = self.launcher.launch(&action.target) {
            tracing::warn!(action_id, "activation had no effect: {e}");
        }
    }
}

/// Mints an action identifier unique for the lifetime of the process.
///
/// Random 128-bit token; collision probability treated as zero.
fn mint_action_id() -> String {
    format!("open-folder-{}", Uuid::new_v4())
}

/// Extracts the URI list from an `ItemsAdded` signal payload.
fn selection_uris(signal: &Signal) -> Vec<String> {
    let Some(list) = signal.args.first().and_then(|v| v.as_array()) else {
        tracing::debug!("malformed ItemsAdded payload (ignored)");
        return Vec::new();
    };
    list.iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
