use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::error::CacheResult;
use super::handler::{self, ChannelHandler, DefaultHandler};

/// A message delivered by a transport to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub payload: String,
}

/// The pub/sub wire underneath a [`ChannelDispatcher`].
///
/// Implementations forward every message received on a subscribed channel to
/// the `mpsc` sender they were built with.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    async fn subscribe(&self, channel: &str) -> CacheResult<()>;

    async fn unsubscribe(&self, channel: &str) -> CacheResult<()>;

    /// Fire and forget; returns how many receivers got the message
    async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64>;

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Routes inbound channel messages to per-channel handlers.
///
/// A channel is subscribed iff it has an entry in the handler map; an entry
/// without a handler falls through to the default handler.
pub struct ChannelDispatcher {
    transport: Arc<dyn ChannelTransport>,
    handlers: DashMap<String, Option<Arc<dyn ChannelHandler>>>,
    default_handler: RwLock<Arc<dyn DefaultHandler>>,
    inbound: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl ChannelDispatcher {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        inbound: mpsc::Receiver<InboundMessage>,
    ) -> Arc<Self> {
        let fallback: Arc<dyn DefaultHandler> = Arc::new(handler::ignore);
        Arc::new(Self {
            transport,
            handlers: DashMap::new(),
            default_handler: RwLock::new(fallback),
            inbound: Mutex::new(Some(inbound)),
        })
    }

    /// Start draining the inbound queue; only the first call spawns
    fn start_pump(self: &Arc<Self>) {
        let Some(mut inbound) = self.inbound.lock().take() else {
            return;
        };
        let dispatcher = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(msg) = inbound.recv().await {
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.on_message(&msg.channel, &msg.payload).await;
            }
            debug!("Channel pump stopped");
        });
    }

    /// Subscribe, replacing any handler previously recorded for `channel`
    pub async fn subscribe(
        self: &Arc<Self>,
        channel: &str,
        handler: Option<Arc<dyn ChannelHandler>>,
    ) -> CacheResult<()> {
        self.start_pump();
        self.transport.subscribe(channel).await?;
        if self.handlers.insert(channel.to_string(), handler).is_some() {
            debug!("Re-subscribed to '{}'", channel);
        } else {
            debug!("Subscribed to '{}'", channel);
        }
        Ok(())
    }

    pub async fn subscribe_with<H: ChannelHandler>(self: &Arc<Self>, channel: &str, handler: H) -> CacheResult<()> {
        let handler: Arc<dyn ChannelHandler> = Arc::new(handler);
        self.subscribe(channel, Some(handler)).await
    }

    pub async fn unsubscribe(&self, channel: &str) -> CacheResult<()> {
        self.transport.unsubscribe(channel).await?;
        self.handlers.remove(channel);
        debug!("Unsubscribed from '{}'", channel);
        Ok(())
    }

    pub async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        self.transport.publish(channel, message).await
    }

    pub fn set_default_handler<H: DefaultHandler>(&self, handler: H) {
        let handler: Arc<dyn DefaultHandler> = Arc::new(handler);
        *self.default_handler.write() = handler;
    }

    /// Deliver one message; handler failures are logged, never returned
    pub async fn on_message(&self, channel: &str, message: &str) {
        let handler = match self.handlers.get(channel) {
            Some(entry) => entry.value().clone(),
            None => {
                warn!("Message on unsubscribed channel '{}'", channel);
                None
            }
        };

        let result = match handler {
            Some(handler) => handler.call(message.to_string()).await,
            None => {
                let fallback = self.default_handler.read().clone();
                fallback.call(channel.to_string(), message.to_string()).await
            }
        };

        if let Err(e) = result {
            error!("Handler for channel '{}' failed: {:#}", channel, e);
        }
    }

    /// Subscribed channel names in ascending order
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    pub async fn close(&self) -> CacheResult<()> {
        self.handlers.clear();
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::adapter::local::{LocalChannels, LocalHub};

    fn dispatcher(hub: &LocalHub) -> Arc<ChannelDispatcher> {
        let (tx, rx) = mpsc::channel(64);
        ChannelDispatcher::new(Arc::new(LocalChannels::new(hub, tx)), rx)
    }

    #[derive(Default)]
    struct Counts {
        custom: AtomicUsize,
        fallback: AtomicUsize,
    }

    fn counting(dispatcher: &ChannelDispatcher) -> Arc<Counts> {
        let counts = Arc::new(Counts::default());
        let c = counts.clone();
        dispatcher.set_default_handler(move |_channel: String, _message: String| {
            let c = c.clone();
            async move {
                c.fallback.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });
        counts
    }

    #[tokio::test]
    async fn custom_handler_only() {
        let hub = LocalHub::new();
        let dispatcher = dispatcher(&hub);
        let counts = counting(&dispatcher);

        let c = counts.clone();
        dispatcher
            .subscribe_with("news", move |_message: String| {
                let c = c.clone();
                async move {
                    c.custom.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            })
            .await
            .unwrap();

        dispatcher.on_message("news", "hello").await;
        assert_eq!(counts.custom.load(Ordering::SeqCst), 1);
        assert_eq!(counts.fallback.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_handler_falls_back_once() {
        let hub = LocalHub::new();
        let dispatcher = dispatcher(&hub);
        let counts = counting(&dispatcher);

        dispatcher.subscribe("alerts", None).await.unwrap();
        dispatcher.on_message("alerts", "x").await;
        assert_eq!(counts.fallback.load(Ordering::SeqCst), 1);
        assert_eq!(counts.custom.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_handler_is_contained() {
        let hub = LocalHub::new();
        let dispatcher = dispatcher(&hub);
        dispatcher
            .subscribe_with("bad", |_message: String| async { Err::<(), _>(anyhow::anyhow!("boom")) })
            .await
            .unwrap();
        dispatcher.on_message("bad", "x").await;
    }

    #[tokio::test]
    async fn published_messages_reach_subscribers() {
        let hub = LocalHub::new();
        let subscriber = dispatcher(&hub);
        let publisher = dispatcher(&hub);

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        subscriber
            .subscribe_with("jobs", move |message: String| {
                let seen_tx = seen_tx.clone();
                async move {
                    seen_tx.send(message)?;
                    anyhow::Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(publisher.publish("jobs", "job-1").await.unwrap(), 1);
        assert_eq!(publisher.publish("idle", "nobody").await.unwrap(), 0);

        let got = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = LocalHub::new();
        let subscriber = dispatcher(&hub);
        let publisher = dispatcher(&hub);

        subscriber.subscribe("a", None).await.unwrap();
        subscriber.subscribe("b", None).await.unwrap();
        assert_eq!(subscriber.channels(), vec!["a".to_string(), "b".to_string()]);

        subscriber.unsubscribe("a").await.unwrap();
        assert!(!subscriber.is_subscribed("a"));
        assert!(subscriber.is_subscribed("b"));
        assert_eq!(publisher.publish("a", "x").await.unwrap(), 0);
        assert_eq!(publisher.publish("b", "x").await.unwrap(), 1);
    }
}
