use tokio::sync::watch;

/// Single-writer, multi-reader published value.
///
/// The session owns the writer; UIs subscribe for change notifications.
/// Every mutation replaces the whole snapshot, so a reader never observes a
/// half-applied update.
#[derive(Debug)]
pub struct Published<T> {
    tx: watch::Sender<T>,
}

impl<T> Published<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, value: T) {
        // send_replace publishes even while no subscriber is listening.
        let _ = self.tx.send_replace(value);
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_notifies_subscribers() {
        let published = Published::new(0_u32);
        let mut receiver = published.subscribe();

        published.set(7);
        receiver.changed().await.expect("sender alive");
        assert_eq!(*receiver.borrow(), 7);
    }

    #[test]
    fn set_without_subscribers_still_updates_the_snapshot() {
        let published = Published::new("before".to_string());
        published.set("after".to_string());
        assert_eq!(published.get(), "after");
    }

    #[tokio::test]
    async fn late_subscribers_see_the_latest_snapshot() {
        let published = Published::new(vec![1, 2]);
        published.set(vec![3]);

        let receiver = published.subscribe();
        assert_eq!(*receiver.borrow(), vec![3]);
    }
}
