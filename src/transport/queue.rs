//! Bounded inbound message queue.
//!
//! Every connection read loop produces into it; one consumer drains it.
//! A full queue blocks producers, which is the node's backpressure point.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::transport::frame::Message;

/// Create a queue holding at most `capacity` undelivered messages.
pub fn message_queue(capacity: usize) -> (mpsc::Sender<Message>, Messages) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Messages { rx })
}

/// The consumer end of the message queue. FIFO across all peers.
#[derive(Debug)]
pub struct Messages {
    rx: mpsc::Receiver<Message>,
}

impl Messages {
    /// Next message, or `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Messages {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut messages) = message_queue(8);
        for i in 0..3 {
            tx.send(Message::new("beta", "alpha", format!("m{}", i))).await.unwrap();
        }
        drop(tx);

        let contents: Vec<_> = (&mut messages).map(|m| m.content).collect().await;
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
        assert!(messages.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_blocks_producer() {
        let (tx, mut messages) = message_queue(1);
        tx.send(Message::new("beta", "alpha", "first")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(Message::new("beta", "alpha", "second")),
        )
        .await;
        assert!(blocked.is_err(), "send into a full queue should wait");

        assert_eq!(messages.try_recv().unwrap().content, "first");
        tx.send(Message::new("beta", "alpha", "third")).await.unwrap();
        assert_eq!(messages.recv().await.unwrap().content, "third");
    }
}
