//! Bus session: method call correlation and signal dispatch.
//!
//! This module implements the request/reply correlation layer on top of the
//! transport, plus the broadcast-signal dispatch table. It handles:
//! - Generating unique call serials
//! - Correlating replies with pending calls
//! - Distinguishing signals from replies
//! - Delivering signals to matching subscriptions
//!
//! # Message Flow
//!
//! 1. Client calls `call()` with interface, path, member, and args
//! 2. Session generates a unique serial and creates a oneshot channel
//! 3. Request is serialized and sent via transport
//! 4. Client awaits on the oneshot receiver
//! 5. Message loop receives the reply from the transport
//! 6. Reply is correlated by serial and sent via oneshot channel
//!
//! # Signal Scoping
//!
//! A subscription is keyed by (interface, member, optional arg0). A signal
//! is delivered to a subscription only if interface and member match and
//! the arg0 filter, when present, equals the signal's first string
//! argument. This scoping is what keeps concurrently pending menu actions
//! from receiving each other's activations.

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};
use oie_protocol::{ErrorPayload, Message, Reply, Request, Signal};
use parking_lot::Mutex as ParkingLotMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

/// Callback invoked for each matching signal.
///
/// Handlers run on the dispatch loop; anything slow or async must be
/// spawned onto the runtime by the handler itself.
pub type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Handle identifying one live subscription.
///
/// Cancellation is explicit: pass the handle back to
/// [`BusSession::unsubscribe`]. Dropping the handle does not cancel, so a
/// handle can be stored and cancelled from teardown paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
}

struct SubscriptionEntry {
    interface: String,
    member: String,
    arg0: Option<String>,
    handler: SignalHandler,
}

impl SubscriptionEntry {
    fn matches(&self, signal: &Signal) -> bool {
        if self.interface != signal.interface || self.member != signal.member {
            return false;
        }
        match &self.arg0 {
            None => true,
            Some(wanted) => signal.arg0_str() == Some(wanted.as_str()),
        }
    }
}

/// Pending call callbacks keyed by serial.
type CallbackMap = Arc<TokioMutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII guard ensuring callback cleanup when a call future is dropped.
struct CancelGuard {
    serial: u32,
    callbacks: CallbackMap,
    completed: bool,
}

impl CancelGuard {
    fn new(serial: u32, callbacks: CallbackMap) -> Self {
        Self {
            serial,
            callbacks,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        let serial = self.serial;
        let callbacks = Arc::clone(&self.callbacks);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if callbacks.lock().await.remove(&serial).is_some() {
                    tracing::debug!(serial, "CancelGuard: removed orphaned callback");
                }
            });
        }
    }
}

/// Future returned by [`BusSession::call`] with automatic cancellation cleanup.
struct ReplyFuture {
    rx: oneshot::Receiver<Result<Value>>,
    guard: CancelGuard,
}

impl Future for ReplyFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => {
                self.guard.complete();
                Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Connection to the session bus.
///
/// Manages call/reply correlation and broadcast-signal dispatch. The
/// session is owned and passed down explicitly; there is no global
/// instance.
pub struct BusSession {
    /// Sequential call serial counter.
    last_serial: AtomicU32,
    /// Pending call callbacks keyed by serial.
    callbacks: CallbackMap,
    /// Channel for queuing outbound frames to the writer task.
    outbound_tx: mpsc::UnboundedSender<Value>,
    /// Transport sender (taken by run() to start the writer task).
    transport_sender: Arc<TokioMutex<Option<Box<dyn Transport>>>>,
    /// Receiver for inbound messages from the transport.
    message_rx: Arc<TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>>,
    /// Receiver half of the transport (owned by run(), only needed once).
    transport_receiver: Arc<TokioMutex<Option<Box<dyn TransportReceiver>>>>,
    /// Receiver for outbound frames (taken by run() to start the writer task).
    outbound_rx: Arc<TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>>,
    /// Signal subscriptions (parking_lot: touched from sync handler context).
    subscriptions: Arc<ParkingLotMutex<HashMap<u64, SubscriptionEntry>>>,
    /// Next subscription id.
    next_subscription: AtomicU64,
    /// Set by shutdown(); no handler runs once this is true.
    closed: AtomicBool,
}

impl BusSession {
    /// Creates a new session over the given transport.
    pub fn new(parts: TransportParts) -> Self {
        let TransportParts {
            sender,
            receiver,
            message_rx,
        } = parts;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            last_serial: AtomicU32::new(0),
            callbacks: Arc::new(TokioMutex::new(HashMap::new())),
            outbound_tx,
            transport_sender: Arc::new(TokioMutex::new(Some(sender))),
            message_rx: Arc::new(TokioMutex::new(Some(message_rx))),
            transport_receiver: Arc::new(TokioMutex::new(Some(receiver))),
            outbound_rx: Arc::new(TokioMutex::new(Some(outbound_rx))),
            subscriptions: Arc::new(ParkingLotMutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Sends a method call and awaits the reply.
    ///
    /// An error reply from the peer is surfaced as [`Error::Bus`].
    pub async fn call(
        &self,
        interface: &str,
        path: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }

        let serial = self.last_serial.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(serial, interface, member, "sending call");

        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().await.insert(serial, tx);

        let guard = CancelGuard::new(serial, Arc::clone(&self.callbacks));

        let request = Request {
            serial,
            interface: interface.to_string(),
            path: path.to_string(),
            member: member.to_string(),
            args,
        };

        let frame = serde_json::to_value(&request)?;
        if self.outbound_tx.send(frame).is_err() {
            tracing::error!("failed to queue call: outbound channel closed");
            return Err(Error::ChannelClosed);
        }

        ReplyFuture { rx, guard }.await
    }

    /// Registers a signal subscription.
    ///
    /// The subscription is a local dispatch-table entry: it is valid even
    /// if the emitting service does not exist yet, and simply never fires
    /// until matching signals arrive.
    pub fn subscribe(
        &self,
        interface: &str,
        member: &str,
        arg0: Option<&str>,
        handler: SignalHandler,
    ) -> SubscriptionHandle {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let entry = SubscriptionEntry {
            interface: interface.to_string(),
            member: member.to_string(),
            arg0: arg0.map(str::to_string),
            handler,
        };

        tracing::debug!(id, interface, member, arg0 = ?entry.arg0, "subscribed");
        self.subscriptions.lock().insert(id, entry);
        SubscriptionHandle { id }
    }

    /// Cancels a subscription. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if self.subscriptions.lock().remove(&handle.id).is_some() {
            tracing::debug!(id = handle.id, "unsubscribed");
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Returns true once [`BusSession::shutdown`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the session: clears all subscriptions and fails every
    /// outstanding call with [`Error::ChannelClosed`].
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions.lock().clear();

        let pending: Vec<_> = self.callbacks.lock().await.drain().collect();
        for (serial, tx) in pending {
            tracing::debug!(serial, "failing pending call on shutdown");
            let _ = tx.send(Err(Error::ChannelClosed));
        }
    }

    /// Runs the message dispatch loop.
    ///
    /// Spawns the transport reader and writer tasks, then delivers each
    /// inbound message until the transport closes.
    pub async fn run(self: &Arc<Self>) {
        let mut transport_receiver = self
            .transport_receiver
            .lock()
            .await
            .take()
            .expect("run() can only be called once - transport receiver already taken");

        let mut transport_sender = self
            .transport_sender
            .lock()
            .await
            .take()
            .expect("run() can only be called once - transport sender already taken");

        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .expect("run() can only be called once - outbound receiver already taken");

        let reader_handle = tokio::spawn(async move {
            if let Err(e) = transport_receiver.run().await {
                tracing::error!("transport read error: {e}");
            }
        });

        let writer_handle = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = transport_sender.send(frame).await {
                    tracing::error!("transport write error: {e}");
                    break;
                }
            }
        });

        let mut message_rx = self
            .message_rx
            .lock()
            .await
            .take()
            .expect("run() can only be called once - message receiver already taken");

        while let Some(frame) = message_rx.recv().await {
            match serde_json::from_value::<Message>(frame) {
                Ok(message) => {
                    if let Err(e) = self.dispatch_internal(message).await {
                        tracing::error!("error dispatching message: {e}");
                    }
                }
                Err(e) => {
                    tracing::error!("failed to parse message: {e}");
                }
            }
        }

        let _ = reader_handle.await;
        let _ = writer_handle.await;
    }

    /// Dispatch an incoming message (test-only public version).
    #[cfg(test)]
    pub async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
        self.dispatch_internal(message).await
    }

    async fn dispatch_internal(self: &Arc<Self>, message: Message) -> Result<()> {
        match message {
            Message::Reply(reply) => self.handle_reply(reply).await,
            Message::Signal(signal) => {
                self.handle_signal(&signal);
                Ok(())
            }
            Message::Unknown(value) => {
                tracing::debug!(
                    "unknown message type (forward-compatible, ignored): {}",
                    serde_json::to_string(&value)
                        .unwrap_or_else(|_| "<serialization failed>".to_string())
                );
                Ok(())
            }
        }
    }

    async fn handle_reply(&self, reply: Reply) -> Result<()> {
        tracing::debug!(serial = reply.serial, "processing reply");
        let callback = self
            .callbacks
            .lock()
            .await
            .remove(&reply.serial)
            .ok_or_else(|| {
                Error::ProtocolError(format!(
                    "Cannot find call to answer: serial={}",
                    reply.serial
                ))
            })?;

        let result = if let Some(error) = reply.error {
            Err(parse_bus_error(error))
        } else {
            Ok(reply.result.unwrap_or(Value::Null))
        };

        let _ = callback.send(result);
        Ok(())
    }

    fn handle_signal(&self, signal: &Signal) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(member = %signal.member, "signal after shutdown (ignored)");
            return;
        }

        // Collect matches under the lock, invoke after releasing it: a
        // handler may subscribe or unsubscribe re-entrantly.
        let handlers: Vec<SignalHandler> = {
            let table = self.subscriptions.lock();
            table
                .values()
                .filter(|entry| entry.matches(signal))
                .map(|entry| Arc::clone(&entry.handler))
                .collect()
        };

        if handlers.is_empty() {
            tracing::debug!(
                interface = %signal.interface,
                member = %signal.member,
                "signal with no subscribers (ignored)"
            );
            return;
        }

        for handler in handlers {
            handler(signal);
        }
    }
}

/// Converts an [`ErrorPayload`] from the peer into [`Error::Bus`].
fn parse_bus_error(error: ErrorPayload) -> Error {
    Error::Bus {
        name: error.name.unwrap_or_else(|| "Error".to_string()),
        message: error.message,
    }
}
