use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use oie_extension::{Extension, Settings};
use oie_runtime::{BusSession, PipeTransport};
use tokio::net::UnixStream;

mod logging;

#[derive(Parser)]
#[command(
	name = "oie-host",
	about = "Host process for the open-in-editor file-manager extension"
)]
struct Cli {
	/// Path to the session bus socket.
	#[arg(long, env = "OIE_BUS_SOCKET")]
	socket: Option<PathBuf>,

	/// Editor command override (defaults to the persisted setting).
	#[arg(long)]
	editor: Option<String>,

	/// Increase log verbosity (-v, -vv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

fn default_socket() -> PathBuf {
	std::env::var_os("XDG_RUNTIME_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(std::env::temp_dir)
		.join("oie-bus.sock")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let mut settings = Settings::load();
	if let Some(editor) = cli.editor {
		settings.editor_command = editor;
	}

	// No retry loop on connection failure: the host environment restarts
	// this process on its own lifecycle.
	let socket = cli.socket.unwrap_or_else(default_socket);
	let stream = UnixStream::connect(&socket)
		.await
		.with_context(|| format!("connecting to bus socket {}", socket.display()))?;
	let (read_half, write_half) = stream.into_split();

	let (transport, message_rx) = PipeTransport::new(write_half, read_half);
	let session = Arc::new(BusSession::new(transport.into_transport_parts(message_rx)));

	let dispatch_session = Arc::clone(&session);
	let dispatch = tokio::spawn(async move { dispatch_session.run().await });

	let extension = Extension::new(Arc::clone(&session), &settings);
	extension.enable().await;
	tracing::info!(
		registered = extension.is_registered(),
		editor = %settings.editor_command,
		"extension enabled"
	);

	tokio::signal::ctrl_c()
		.await
		.context("waiting for shutdown signal")?;
	tracing::info!("shutting down");

	extension.disable();
	session.shutdown().await;
	dispatch.abort();

	Ok(())
}
