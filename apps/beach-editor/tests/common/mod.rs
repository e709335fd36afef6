#![allow(dead_code)]

use beach_editor::protocol::{RpcMessage, WireCodec, WireValue};
use beach_editor::rpc::FrameDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// The editor side of an in-memory session.
pub struct FakeEditor {
    codec: WireCodec,
    stream: DuplexStream,
    decoder: FrameDecoder,
}

/// Returns the client's read and write halves plus the fake editor.
pub fn session() -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>, FakeEditor) {
    let codec = WireCodec::default();
    let (client, editor) = tokio::io::duplex(256 * 1024);
    let (reader, writer) = tokio::io::split(client);
    (
        reader,
        writer,
        FakeEditor {
            codec,
            stream: editor,
            decoder: FrameDecoder::new(codec),
        },
    )
}

impl FakeEditor {
    /// Next message from the client, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<RpcMessage> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(value) = self.decoder.next_value().expect("decode") {
                return Some(RpcMessage::from_value(value).expect("message"));
            }
            let n = self.stream.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    /// Next request, skipping notifications. Panics if the client hung up.
    pub async fn request(&mut self) -> (u64, String, Vec<WireValue>) {
        loop {
            match self.recv().await.expect("client closed the stream") {
                RpcMessage::Request { id, method, args } => return (id, method, args),
                RpcMessage::Notification { .. } => continue,
                RpcMessage::Response { id, .. } => panic!("unexpected response {id}"),
            }
        }
    }

    pub fn encode(&self, message: RpcMessage) -> Vec<u8> {
        self.codec
            .encode_to_vec(&message.into_value())
            .expect("encode")
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
        self.stream.flush().await.expect("flush");
    }

    pub async fn respond(&mut self, id: u64, result: WireValue) {
        let bytes = self.encode(RpcMessage::Response {
            id,
            error: None,
            result,
        });
        self.send_bytes(&bytes).await;
    }

    pub async fn fail(&mut self, id: u64, error: WireValue) {
        let bytes = self.encode(RpcMessage::Response {
            id,
            error: Some(error),
            result: WireValue::Nil,
        });
        self.send_bytes(&bytes).await;
    }

    pub async fn notify(&mut self, method: &str, args: Vec<WireValue>) {
        let bytes = self.encode(RpcMessage::Notification {
            method: method.to_owned(),
            args,
        });
        self.send_bytes(&bytes).await;
    }

    /// Simulates the editor going away.
    pub fn hang_up(self) {
        drop(self);
    }
}

/// `[name, occurrence...]` group of a redraw batch.
pub fn group(name: &str, occurrences: Vec<Vec<WireValue>>) -> WireValue {
    let mut items = vec![WireValue::from(name)];
    items.extend(occurrences.into_iter().map(WireValue::Array));
    WireValue::Array(items)
}
