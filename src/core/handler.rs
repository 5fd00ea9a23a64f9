use std::future::Future;

use anyhow::Result;
use futures::{FutureExt, future::BoxFuture};

/// Handles messages arriving on one subscribed channel
pub trait ChannelHandler: Send + Sync + 'static {
    fn call(&self, message: String) -> BoxFuture<'static, Result<()>>;
}

impl<Func, Fut> ChannelHandler for Func
where
    Func: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, message: String) -> BoxFuture<'static, Result<()>> {
        (self)(message).boxed()
    }
}

/// Fallback for channels subscribed without a handler; receives the channel name too
pub trait DefaultHandler: Send + Sync + 'static {
    fn call(&self, channel: String, message: String) -> BoxFuture<'static, Result<()>>;
}

impl<Func, Fut> DefaultHandler for Func
where
    Func: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, channel: String, message: String) -> BoxFuture<'static, Result<()>> {
        (self)(channel, message).boxed()
    }
}

/// Default handler used until one is installed
pub(crate) fn ignore(channel: String, _message: String) -> BoxFuture<'static, Result<()>> {
    async move {
        tracing::trace!("No handler for message on '{}'", channel);
        Ok(())
    }
    .boxed()
}
