use std::sync::mpsc;

/// Notifications raised when an observer passes through a portal.
///
/// The engine only emits these. Reacting to them (movement speed scaling,
/// prop visibility, level scripting) is the consumer's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalEvent {
    /// The observer crossed into the scaled side of a scaling portal pair.
    EnteredScaledWorld,
    /// The observer crossed back out of the scaled side.
    LeftScaledWorld,
    /// The blockade sealing the return route should be taken down.
    RemoveBlockade,
}

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
    pub fn send(&self, event: T) -> Result<(), mpsc::SendError<T>> {
        self.tx.send(event)
    }
}

impl<T> EventReceiver<T> {
    pub fn recv(&self) -> Result<T, mpsc::RecvError> {
        self.rx.recv()
    }

    pub fn try_recv(&self) -> Result<T, mpsc::TryRecvError> {
        self.rx.try_recv()
    }

    /// Drains everything queued so far without blocking. Frame loops call
    /// this once per frame to pick up events emitted earlier in the frame.
    pub fn try_iter(&self) -> mpsc::TryIter<'_, T> {
        self.rx.try_iter()
    }

    pub fn iter(&self) -> mpsc::Iter<'_, T> {
        self.rx.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{channel, PortalEvent};

    #[test]
    fn cloned_senders_deliver_to_the_same_receiver() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();

        tx.send(PortalEvent::EnteredScaledWorld).unwrap();
        tx2.send(PortalEvent::RemoveBlockade).unwrap();

        assert_eq!(rx.try_recv(), Ok(PortalEvent::EnteredScaledWorld));
        assert_eq!(rx.try_recv(), Ok(PortalEvent::RemoveBlockade));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn try_iter_drains_pending_events_without_blocking() {
        let (tx, rx) = channel();
        tx.send(PortalEvent::LeftScaledWorld).unwrap();
        tx.send(PortalEvent::RemoveBlockade).unwrap();

        let drained: Vec<PortalEvent> = rx.try_iter().collect();
        assert_eq!(
            drained,
            vec![PortalEvent::LeftScaledWorld, PortalEvent::RemoveBlockade]
        );
        assert!(rx.try_iter().next().is_none());
    }
}
