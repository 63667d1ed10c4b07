use std::sync::mpsc;

/// One-way notification channel between simulation systems and whoever wants
/// to observe them (HUD, audio, diagnostics). Senders are cheap to clone;
/// the receiver is polled once per frame via [`EventReceiver::drain`].
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

pub struct EventReceiver<T> {
    rx: mpsc::Receiver<T>,
}

pub fn channel<T>() -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSender<T> {
    /// Delivery failure means every receiver is gone; events are advisory so
    /// that is not an error worth propagating.
    pub fn send(&self, event: T) {
        let _ = self.tx.send(event);
    }
}

impl<T> EventReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Takes every event queued since the last call, without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::channel;

    #[test]
    fn drain_returns_queued_events_in_order() {
        let (tx, rx) = channel();
        tx.send(1);
        tx.send(2);
        tx.send(3);
        assert_eq!(rx.drain(), vec![1, 2, 3]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn cloned_senders_feed_the_same_receiver() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        tx.send("a");
        tx2.send("b");
        assert_eq!(rx.drain(), vec!["a", "b"]);
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send(42);
    }
}
