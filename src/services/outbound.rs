use prost::Message;
use tokio::sync::mpsc;

/// Frames queued per socket before `send` waits for the writer.
pub const OUTBOUND_BUFFER: usize = 64;

/// Write half of a device session.
///
/// Frames are handed to the socket's writer task; once the socket is gone every
/// send is a silent no-op.
#[derive(Clone, Debug)]
pub struct DeviceSender {
    inner: mpsc::Sender<Vec<u8>>,
}

impl DeviceSender {
    pub fn channel() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (inner, receiver) = mpsc::channel(OUTBOUND_BUFFER);
        (Self { inner }, receiver)
    }

    /// Returns `false` when the socket has already closed.
    pub async fn send<M: Message>(&self, message: &M) -> bool {
        self.inner.send(message.encode_to_vec()).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandResult, MatrxMessage, matrx_message};

    #[tokio::test]
    async fn send_after_close_is_a_noop() {
        let (sender, mut receiver) = DeviceSender::channel();
        let message = MatrxMessage::from(matrx_message::Message::CommandResult(
            CommandResult::ok(),
        ));
        assert!(sender.send(&message).await);
        let frame = receiver.recv().await.unwrap();
        assert_eq!(MatrxMessage::decode(frame.as_slice()).unwrap(), message);

        drop(receiver);
        assert!(sender.is_closed());
        assert!(!sender.send(&message).await);
    }
}
