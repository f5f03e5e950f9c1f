//! End-to-end menu-provider flow against a scripted fake file manager.
//!
//! The fake sits on the far end of a duplex pipe: it answers method
//! calls (`RegisterProvider`, `AddMenuItem`) and emits broadcast signals
//! (`ItemsAdded`, `MenuItemActivated`), exactly what the real file
//! manager does on the bus.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use oie_extension::{Extension, Launcher, PROVIDER_ID, uri};
use oie_protocol::fm;
use oie_protocol::{ErrorPayload, Reply, Request, Signal};
use oie_runtime::{BusSession, PipeTransport};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const QUIET: Duration = Duration::from_millis(150);
const WAIT: Duration = Duration::from_secs(2);

struct RecordingLauncher {
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, dir: &Path) -> oie_extension::Result<()> {
        self.tx.send(dir.to_path_buf()).expect("test receiver alive");
        Ok(())
    }
}

struct FakeFileManager {
    read: DuplexStream,
    write: DuplexStream,
}

impl FakeFileManager {
    async fn read_request(&mut self) -> Request {
        let mut length_buf = [0u8; 4];
        self.read.read_exact(&mut length_buf).await.unwrap();
        let length = u32::from_le_bytes(length_buf) as usize;

        let mut body = vec![0u8; length];
        self.read.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Asserts that the extension stays quiet for the given window.
    async fn expect_no_request(&mut self, window: Duration) {
        let mut length_buf = [0u8; 4];
        let read = timeout(window, self.read.read_exact(&mut length_buf)).await;
        assert!(read.is_err(), "unexpected bus call from extension");
    }

    async fn send_frame(&mut self, frame: serde_json::Value) {
        let body = serde_json::to_vec(&frame).unwrap();
        let length = body.len() as u32;
        self.write.write_all(&length.to_le_bytes()).await.unwrap();
        self.write.write_all(&body).await.unwrap();
    }

    async fn reply_ok(&mut self, serial: u32) {
        let reply = Reply {
            serial,
            result: Some(serde_json::Value::Null),
            error: None,
        };
        self.send_frame(serde_json::to_value(&reply).unwrap()).await;
    }

    async fn reply_error(&mut self, serial: u32, message: &str) {
        let reply = Reply {
            serial,
            result: None,
            error: Some(ErrorPayload {
                name: Some("org.example.Error.Failed".to_string()),
                message: message.to_string(),
            }),
        };
        self.send_frame(serde_json::to_value(&reply).unwrap()).await;
    }

    async fn emit(&mut self, member: &str, args: Vec<serde_json::Value>) {
        let signal = Signal {
            interface: fm::MENU_PROVIDER_INTERFACE.to_string(),
            path: fm::MENU_PROVIDER_PATH.to_string(),
            member: member.to_string(),
            args,
        };
        self.send_frame(serde_json::to_value(&signal).unwrap()).await;
    }

    async fn emit_selection(&mut self, uris: &[String]) {
        self.emit(fm::ITEMS_ADDED, vec![serde_json::json!(uris)])
            .await;
    }

    async fn emit_activation(&mut self, action_id: &str) {
        self.emit(fm::MENU_ITEM_ACTIVATED, vec![serde_json::json!(action_id)])
            .await;
    }
}

struct Harness {
    session: Arc<BusSession>,
    extension: Extension,
    fm: FakeFileManager,
    launches: mpsc::UnboundedReceiver<PathBuf>,
}

fn setup() -> Harness {
    let (fm_read, ext_write) = tokio::io::duplex(4096);
    let (ext_read, fm_write) = tokio::io::duplex(4096);

    let (transport, message_rx) = PipeTransport::new(ext_write, ext_read);
    let session = Arc::new(BusSession::new(transport.into_transport_parts(message_rx)));

    let run_session = Arc::clone(&session);
    tokio::spawn(async move { run_session.run().await });

    let (tx, launches) = mpsc::unbounded_channel();
    let extension = Extension::with_launcher(Arc::clone(&session), Arc::new(RecordingLauncher { tx }));

    Harness {
        session,
        extension,
        fm: FakeFileManager {
            read: fm_read,
            write: fm_write,
        },
        launches,
    }
}

/// Runs `enable` while the fake accepts the provider registration.
async fn enable_ok(extension: &Extension, fm: &mut FakeFileManager) {
    tokio::join!(extension.enable(), async {
        let request = fm.read_request().await;
        assert_eq!(request.member, fm::REGISTER_PROVIDER);
        assert_eq!(request.interface, fm::MENU_PROVIDER_INTERFACE);
        assert_eq!(request.args[0], serde_json::json!(PROVIDER_ID));
        fm.reply_ok(request.serial).await;
    });
    assert!(extension.is_registered());
}

/// Polls until the extension has the expected number of pending actions.
///
/// Activation subscriptions are installed asynchronously after the
/// `AddMenuItem` reply, so tests must not emit activations before the
/// listener exists.
async fn wait_for_pending(extension: &Extension, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if extension.pending_actions() == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} pending actions (have {})",
            extension.pending_actions()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn dir_uri(path: &Path) -> String {
    uri::to_file_uri(path).unwrap()
}

#[tokio::test]
async fn directory_selection_contributes_action_and_activation_launches_editor() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    let file = tmp.path().join("a.txt");
    std::fs::write(&file, "x").unwrap();

    // File listed first: the controller must skip it and pick the
    // directory.
    h.fm.emit_selection(&[dir_uri(&file), dir_uri(&sub)]).await;

    let request = h.fm.read_request().await;
    assert_eq!(request.member, fm::ADD_MENU_ITEM);
    let action_id = request.args[0].as_str().unwrap().to_string();
    assert!(action_id.starts_with("open-folder-"));
    assert_eq!(request.args[1], serde_json::json!("Open in Editor"));
    assert_eq!(
        request.args[2][fm::ATTR_URI],
        serde_json::json!(dir_uri(&sub))
    );
    h.fm.reply_ok(request.serial).await;

    wait_for_pending(&h.extension, 1).await;

    h.fm.emit_activation(&action_id).await;
    let launched = timeout(WAIT, h.launches.recv()).await.unwrap().unwrap();
    assert_eq!(launched, sub);

    // One-shot: a repeated activation signal has no further effect.
    h.fm.emit_activation(&action_id).await;
    assert!(timeout(QUIET, h.launches.recv()).await.is_err());
    assert_eq!(h.extension.pending_actions(), 0);
}

#[tokio::test]
async fn selection_without_directories_issues_no_bus_call() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("a.txt");
    std::fs::write(&file, "x").unwrap();

    h.fm.emit_selection(&[
        dir_uri(&file),
        "sftp://server/home/me".to_string(),
        dir_uri(&tmp.path().join("does-not-exist")),
    ])
    .await;

    h.fm.expect_no_request(QUIET).await;
    assert_eq!(h.extension.pending_actions(), 0);
}

#[tokio::test]
async fn first_directory_in_list_order_wins() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    std::fs::create_dir(&first).unwrap();
    std::fs::create_dir(&second).unwrap();

    h.fm.emit_selection(&[dir_uri(&first), dir_uri(&second)])
        .await;

    let request = h.fm.read_request().await;
    assert_eq!(
        request.args[2][fm::ATTR_URI],
        serde_json::json!(dir_uri(&first))
    );
    h.fm.reply_ok(request.serial).await;
    wait_for_pending(&h.extension, 1).await;

    // Only the first qualifying directory produces an action.
    h.fm.expect_no_request(QUIET).await;
}

#[tokio::test]
async fn failed_registration_disables_contribution() {
    let mut h = setup();

    let (extension, file_manager) = (&h.extension, &mut h.fm);
    tokio::join!(extension.enable(), async {
        let request = file_manager.read_request().await;
        assert_eq!(request.member, fm::REGISTER_PROVIDER);
        file_manager
            .reply_error(request.serial, "incompatible version")
            .await;
    });
    assert!(!h.extension.is_registered());

    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("sub");
    std::fs::create_dir(&sub).unwrap();

    h.fm.emit_selection(&[dir_uri(&sub)]).await;
    h.fm.expect_no_request(QUIET).await;
    assert_eq!(h.extension.pending_actions(), 0);
}

#[tokio::test]
async fn menu_insert_error_abandons_the_action() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("sub");
    std::fs::create_dir(&sub).unwrap();

    h.fm.emit_selection(&[dir_uri(&sub)]).await;

    let request = h.fm.read_request().await;
    let action_id = request.args[0].as_str().unwrap().to_string();
    h.fm.reply_error(request.serial, "file manager busy").await;

    // No pending action survives a rejected insert; the identifier is
    // dead.
    tokio::time::sleep(QUIET).await;
    assert_eq!(h.extension.pending_actions(), 0);

    h.fm.emit_activation(&action_id).await;
    assert!(timeout(QUIET, h.launches.recv()).await.is_err());
}

#[tokio::test]
async fn teardown_silences_previous_subscriptions() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("sub");
    std::fs::create_dir(&sub).unwrap();

    h.fm.emit_selection(&[dir_uri(&sub)]).await;
    let request = h.fm.read_request().await;
    let action_id = request.args[0].as_str().unwrap().to_string();
    h.fm.reply_ok(request.serial).await;
    wait_for_pending(&h.extension, 1).await;

    h.extension.disable();
    assert_eq!(h.session.subscription_count(), 0);
    assert_eq!(h.extension.pending_actions(), 0);

    // Neither a stale activation nor a fresh selection does anything.
    h.fm.emit_activation(&action_id).await;
    assert!(timeout(QUIET, h.launches.recv()).await.is_err());

    h.fm.emit_selection(&[dir_uri(&sub)]).await;
    h.fm.expect_no_request(QUIET).await;
}

#[tokio::test]
async fn concurrent_pending_actions_do_not_cross_talk() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;

    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    std::fs::create_dir(&first).unwrap();
    std::fs::create_dir(&second).unwrap();

    h.fm.emit_selection(&[dir_uri(&first)]).await;
    let request = h.fm.read_request().await;
    let first_id = request.args[0].as_str().unwrap().to_string();
    h.fm.reply_ok(request.serial).await;
    wait_for_pending(&h.extension, 1).await;

    h.fm.emit_selection(&[dir_uri(&second)]).await;
    let request = h.fm.read_request().await;
    let second_id = request.args[0].as_str().unwrap().to_string();
    h.fm.reply_ok(request.serial).await;
    wait_for_pending(&h.extension, 2).await;

    assert_ne!(first_id, second_id);

    // Activating the second action must launch its own target, not the
    // first one's.
    h.fm.emit_activation(&second_id).await;
    let launched = timeout(WAIT, h.launches.recv()).await.unwrap().unwrap();
    assert_eq!(launched, second);

    h.fm.emit_activation(&first_id).await;
    let launched = timeout(WAIT, h.launches.recv()).await.unwrap().unwrap();
    assert_eq!(launched, first);

    assert_eq!(h.extension.pending_actions(), 0);
}

#[tokio::test]
async fn enable_twice_does_not_duplicate_subscriptions() {
    let mut h = setup();
    enable_ok(&h.extension, &mut h.fm).await;
    let count = h.session.subscription_count();

    // Second enable must neither re-register nor re-subscribe.
    h.extension.enable().await;
    assert_eq!(h.session.subscription_count(), count);
    h.fm.expect_no_request(QUIET).await;
}
