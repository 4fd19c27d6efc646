use async_trait::async_trait;
use tokio::sync::watch;

use crate::weather::models::Coordinates;

/// Device location source.
///
/// `subscribe` yields a continuous stream of nullable fixes; `last_known` is a
/// one-shot query that returns `None` when there is no fix or access was denied.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Option<Coordinates>>;

    async fn last_known(&self) -> Option<Coordinates>;
}

pub async fn last_known_or_default(
    provider: &dyn LocationProvider,
    fallback: Coordinates,
) -> Coordinates {
    provider.last_known().await.unwrap_or(fallback)
}

/// Location fed from outside (CLI flags, a platform bridge, tests).
pub struct ManualLocationProvider {
    tx: watch::Sender<Option<Coordinates>>,
}

impl ManualLocationProvider {
    pub fn new(initial: Option<Coordinates>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new fix. `None` models a lost fix.
    pub fn push(&self, fix: Option<Coordinates>) {
        self.tx.send_replace(fix);
    }
}

#[async_trait]
impl LocationProvider for ManualLocationProvider {
    fn subscribe(&self) -> watch::Receiver<Option<Coordinates>> {
        self.tx.subscribe()
    }

    async fn last_known(&self) -> Option<Coordinates> {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_used_without_fix() {
        let provider = ManualLocationProvider::new(None);
        let fallback = Coordinates::new(30.6118656, 32.2895872);
        assert_eq!(last_known_or_default(&provider, fallback).await, fallback);

        let fix = Coordinates::new(51.5, -0.12);
        provider.push(Some(fix));
        assert_eq!(last_known_or_default(&provider, fallback).await, fix);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_fix() {
        let provider = ManualLocationProvider::new(None);
        let mut rx = provider.subscribe();

        provider.push(Some(Coordinates::new(1.0, 2.0)));
        provider.push(Some(Coordinates::new(3.0, 4.0)));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(Coordinates::new(3.0, 4.0)));
    }
}
