//! In-process pub/sub used alongside the document backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::channel::{ChannelTransport, InboundMessage};
use crate::core::error::CacheResult;

type Subscriber = (u64, mpsc::Sender<InboundMessage>);

/// Channel fan-out shared by every [`LocalChannels`] built from it
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    channels: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, channel: &str, id: u64, tx: &mpsc::Sender<InboundMessage>) {
        let mut subs = self.inner.channels.entry(channel.to_string()).or_default();
        if !subs.iter().any(|(sub, _)| *sub == id) {
            subs.push((id, tx.clone()));
        }
    }

    fn detach(&self, channel: &str, id: u64) {
        self.inner.channels.remove_if_mut(channel, |_, subs| {
            subs.retain(|(sub, _)| *sub != id);
            subs.is_empty()
        });
    }

    fn detach_all(&self, id: u64) {
        self.inner.channels.retain(|_, subs| {
            subs.retain(|(sub, _)| *sub != id);
            !subs.is_empty()
        });
    }

    /// Deliver to every current subscriber of `channel`, returning how many accepted it
    pub fn publish(&self, channel: &str, message: &str) -> u64 {
        let Some(subs) = self.inner.channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in subs.iter() {
            let msg = InboundMessage {
                channel: channel.to_string(),
                payload: message.to_string(),
            };
            match tx.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Dropped message on '{}' for subscriber {}: {}", channel, id, e),
            }
        }
        delivered
    }
}

/// One subscriber endpoint on a [`LocalHub`]
pub struct LocalChannels {
    hub: LocalHub,
    id: u64,
    tx: mpsc::Sender<InboundMessage>,
}

impl LocalChannels {
    pub fn new(hub: &LocalHub, tx: mpsc::Sender<InboundMessage>) -> Self {
        let id = hub.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Self {
            hub: hub.clone(),
            id,
            tx,
        }
    }
}

#[async_trait]
impl ChannelTransport for LocalChannels {
    async fn subscribe(&self, channel: &str) -> CacheResult<()> {
        self.hub.attach(channel, self.id, &self.tx);
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> CacheResult<()> {
        self.hub.detach(channel, self.id);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        Ok(self.hub.publish(channel, message))
    }

    async fn close(&self) -> CacheResult<()> {
        self.hub.detach_all(self.id);
        debug!("Local subscriber {} detached", self.id);
        Ok(())
    }
}

impl Drop for LocalChannels {
    fn drop(&mut self) {
        self.hub.detach_all(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_counts_receivers() {
        let hub = LocalHub::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = LocalChannels::new(&hub, tx_a);
        let b = LocalChannels::new(&hub, tx_b);

        a.subscribe("room").await.unwrap();
        a.subscribe("room").await.unwrap();
        b.subscribe("room").await.unwrap();
        assert_eq!(hub.publish("room", "hi"), 2);

        assert_eq!(rx_a.recv().await.unwrap().payload, "hi");
        assert_eq!(rx_b.recv().await.unwrap().channel, "room");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_endpoints_detach() {
        let hub = LocalHub::new();
        let (tx, _rx) = mpsc::channel(4);
        {
            let sub = LocalChannels::new(&hub, tx);
            sub.subscribe("room").await.unwrap();
            assert_eq!(hub.publish("room", "x"), 1);
        }
        assert_eq!(hub.publish("room", "x"), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = LocalHub::new();
        let (tx, _rx) = mpsc::channel(1);
        let sub = LocalChannels::new(&hub, tx);
        sub.subscribe("room").await.unwrap();

        assert_eq!(hub.publish("room", "1"), 1);
        assert_eq!(hub.publish("room", "2"), 0);
    }
}
