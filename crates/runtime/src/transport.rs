//! Framed pipe transport.
//!
//! Messages are JSON values framed with a 4-byte little-endian length
//! prefix. The transport is split into a sender half (serializes and
//! writes frames) and a receiver half (reads frames and forwards parsed
//! values to the session over an unbounded channel).
//!
//! The transport is generic over any duplex byte stream: a Unix socket in
//! production, `tokio::io::duplex` in tests.

use crate::error::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Upper bound on a single frame body. Anything larger is a protocol
/// violation, not a legitimate menu-provider message.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Object-safe sender half of a transport.
pub trait Transport: Send {
    /// Serialize and write one framed message.
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Object-safe receiver half of a transport.
pub trait TransportReceiver: Send {
    /// Read frames until EOF or a transport error, forwarding each parsed
    /// message to the session.
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Bundle handed to [`crate::BusSession::new`].
pub struct TransportParts {
    /// Sender half, taken by the session's writer task.
    pub sender: Box<dyn Transport>,
    /// Receiver half, taken by the session's reader task.
    pub receiver: Box<dyn TransportReceiver>,
    /// Channel the receiver forwards inbound messages on.
    pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Length-prefixed JSON transport over a pair of byte streams.
pub struct PipeTransport<W, R> {
    sender: PipeTransportSender<W>,
    receiver: PipeTransportReceiver<R>,
}

/// Writer half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
    writer: W,
}

/// Reader half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
    reader: R,
    inbound_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Creates a transport over the given write/read streams.
    ///
    /// Returns the transport and the receiving end of the inbound message
    /// channel, which the session consumes.
    pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: PipeTransportSender { writer },
                receiver: PipeTransportReceiver { reader, inbound_tx },
            },
            inbound_rx,
        )
    }

    /// Splits into the sender and receiver halves.
    pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
        (self.sender, self.receiver)
    }

    /// Boxes both halves into [`TransportParts`] for the session.
    pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
        let (sender, receiver) = self.into_parts();
        TransportParts {
            sender: Box::new(sender),
            receiver: Box::new(receiver),
            message_rx,
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> PipeTransportSender<W> {
    /// Writes one frame: 4-byte little-endian length, then the JSON body.
    pub async fn send(&mut self, message: Value) -> Result<()> {
        let body = serde_json::to_vec(&message)?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(Error::TransportError(format!(
                "outbound frame too large: {} bytes",
                body.len()
            )));
        }

        let length = body.len() as u32;
        self.writer.write_all(&length.to_le_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

impl<R: AsyncRead + Unpin + Send> PipeTransportReceiver<R> {
    /// Reads frames until EOF (clean stop) or an error.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let mut length_buf = [0u8; 4];
            match self.reader.read_exact(&mut length_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("transport closed by peer");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes(length_buf) as usize;
            if length > MAX_FRAME_BYTES {
                return Err(Error::TransportError(format!(
                    "inbound frame too large: {length} bytes"
                )));
            }

            let mut body = vec![0u8; length];
            self.reader.read_exact(&mut body).await?;

            let message: Value = serde_json::from_slice(&body)?;
            if self.inbound_tx.send(message).is_err() {
                // Session dropped its receiver; nothing left to deliver to.
                return Ok(());
            }
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> Transport for PipeTransportSender<W> {
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { PipeTransportSender::send(self, message).await })
    }
}

impl<R: AsyncRead + Unpin + Send> TransportReceiver for PipeTransportReceiver<R> {
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { PipeTransportReceiver::run(self).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn length_prefix_is_little_endian() {
        let length: u32 = 1234;
        let bytes = length.to_le_bytes();

        assert_eq!(bytes[0], (length & 0xFF) as u8);
        assert_eq!(bytes[1], ((length >> 8) & 0xFF) as u8);
        assert_eq!(bytes[2], ((length >> 16) & 0xFF) as u8);
        assert_eq!(bytes[3], ((length >> 24) & 0xFF) as u8);
        assert_eq!(u32::from_le_bytes(bytes), length);
    }

    #[test]
    fn frame_layout_is_length_then_body() {
        let message = serde_json::json!({"member": "ItemsAdded"});
        let body = serde_json::to_vec(&message).unwrap();
        let length_bytes = (body.len() as u32).to_le_bytes();

        let mut frame = Vec::new();
        frame.extend_from_slice(&length_bytes);
        frame.extend_from_slice(&body);

        assert_eq!(frame.len(), 4 + body.len());
        assert_eq!(&frame[0..4], &length_bytes);
        assert_eq!(&frame[4..], &body);
    }

    #[tokio::test]
    async fn sender_writes_framed_message() {
        let (mut our_end, their_write) = tokio::io::duplex(1024);
        let (_unused_read, their_read) = tokio::io::duplex(1024);

        let (transport, _rx) = PipeTransport::new(their_write, their_read);
        let (mut sender, _receiver) = transport.into_parts();

        let message = serde_json::json!({
            "serial": 1,
            "interface": "org.example.FileManager.MenuProvider",
            "path": "/org/example/FileManager/MenuProvider",
            "member": "RegisterProvider",
            "args": ["open-in-editor"]
        });
        sender.send(message.clone()).await.unwrap();

        let mut length_buf = [0u8; 4];
        our_end.read_exact(&mut length_buf).await.unwrap();
        let length = u32::from_le_bytes(length_buf) as usize;

        let mut body = vec![0u8; length];
        our_end.read_exact(&mut body).await.unwrap();

        let received: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn receiver_delivers_messages_in_order() {
        let (unused_writer, _far_end) = tokio::io::duplex(16);
        let (read_end, mut write_end) = tokio::io::duplex(4096);

        let (transport, mut rx) = PipeTransport::new(unused_writer, read_end);
        let (_sender, mut receiver) = transport.into_parts();

        let read_task = tokio::spawn(async move { receiver.run().await });

        let messages = vec![
            serde_json::json!({"serial": 1, "result": null}),
            serde_json::json!({"interface": "i", "path": "/p", "member": "first", "args": []}),
            serde_json::json!({"interface": "i", "path": "/p", "member": "second", "args": []}),
        ];

        for message in &messages {
            let body = serde_json::to_vec(message).unwrap();
            let length = body.len() as u32;
            write_end.write_all(&length.to_le_bytes()).await.unwrap();
            write_end.write_all(&body).await.unwrap();
        }
        drop(write_end);

        for expected in &messages {
            let received = rx.recv().await.expect("message delivered");
            assert_eq!(&received, expected);
        }

        read_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn receiver_rejects_oversized_frame() {
        let (_our_write, peer_write) = tokio::io::duplex(64);
        let (read_end, mut write_end) = tokio::io::duplex(64);

        let (transport, _rx) = PipeTransport::new(peer_write, read_end);
        let (_sender, mut receiver) = transport.into_parts();

        let bogus_length = (MAX_FRAME_BYTES as u32) + 1;
        write_end
            .write_all(&bogus_length.to_le_bytes())
            .await
            .unwrap();

        let err = receiver.run().await.unwrap_err();
        assert!(matches!(err, Error::TransportError(_)));
    }
}
