use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::RedisStore;
use crate::core::channel::{ChannelTransport, InboundMessage};
use crate::core::error::{CacheError, CacheResult};

enum Command {
    Subscribe(String, oneshot::Sender<CacheResult<()>>),
    Unsubscribe(String, oneshot::Sender<CacheResult<()>>),
}

/// Pub/sub over redis.
///
/// Publishing borrows a pooled connection; subscriptions share one dedicated
/// connection owned by a reader task, started on the first subscribe.
pub struct RedisChannels {
    store: Arc<RedisStore>,
    inbound: mpsc::Sender<InboundMessage>,
    reader: Mutex<Option<mpsc::Sender<Command>>>,
}

impl RedisChannels {
    pub fn new(store: Arc<RedisStore>, inbound: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            store,
            inbound,
            reader: Mutex::new(None),
        }
    }

    async fn start_reader(&self) -> CacheResult<mpsc::Sender<Command>> {
        let client = redis::Client::open(self.store.url()?)
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(read_loop(pubsub, rx, self.inbound.clone()));
        info!("Started redis subscription reader");
        Ok(tx)
    }

    /// Hand a (un)subscribe to the reader and wait for its acknowledgement
    async fn request(&self, channel: String, subscribe: bool) -> CacheResult<()> {
        let mut reader = self.reader.lock().await;
        let live = reader.as_ref().filter(|tx| !tx.is_closed()).cloned();
        let tx = match live {
            Some(tx) => tx,
            // Nothing to unsubscribe from without a reader
            None if !subscribe => return Ok(()),
            None => {
                let tx = self.start_reader().await?;
                *reader = Some(tx.clone());
                tx
            }
        };

        let (ack, done) = oneshot::channel();
        let command = if subscribe {
            Command::Subscribe(channel, ack)
        } else {
            Command::Unsubscribe(channel, ack)
        };
        if tx.send(command).await.is_err() {
            *reader = None;
            return Err(CacheError::Connection("subscription reader stopped".into()));
        }
        drop(reader);

        done.await
            .map_err(|_| CacheError::Connection("subscription reader stopped".into()))?
    }
}

async fn read_loop(
    mut pubsub: redis::aio::PubSub,
    mut commands: mpsc::Receiver<Command>,
    inbound: mpsc::Sender<InboundMessage>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe(channel, ack)) => {
                    let result = pubsub.subscribe(&channel).await.map_err(CacheError::from);
                    let _ = ack.send(result);
                }
                Some(Command::Unsubscribe(channel, ack)) => {
                    let result = pubsub.unsubscribe(&channel).await.map_err(CacheError::from);
                    let _ = ack.send(result);
                }
                None => break,
            },
            msg = async { pubsub.on_message().next().await } => {
                let Some(msg) = msg else {
                    error!("Redis subscription connection closed");
                    break;
                };
                let payload = match msg.get_payload::<String>() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Undecodable message on '{}': {}", msg.get_channel_name(), e);
                        continue;
                    }
                };
                let message = InboundMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                };
                if inbound.send(message).await.is_err() {
                    debug!("Dispatcher gone, stopping subscription reader");
                    break;
                }
            }
        }
    }
    debug!("Redis subscription reader stopped");
}

#[async_trait]
impl ChannelTransport for RedisChannels {
    async fn subscribe(&self, channel: &str) -> CacheResult<()> {
        self.request(channel.to_string(), true).await
    }

    async fn unsubscribe(&self, channel: &str) -> CacheResult<()> {
        self.request(channel.to_string(), false).await
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        self.store.publish(channel, message).await
    }

    async fn close(&self) -> CacheResult<()> {
        // Dropping the command sender ends the reader loop
        if self.reader.lock().await.take().is_some() {
            debug!("Stopping redis subscription reader");
        }
        Ok(())
    }
}
