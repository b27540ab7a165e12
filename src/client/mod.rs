//! Caller entry points
//!
//! [`Http`], [`Downloader`] and [`Uploader`] each own a [`LifeCycle`] and
//! offer a structured form (`request`, `download`, `upload`) plus shorthand
//! methods. Both forms normalize into one [`RequestOptions`].

mod downloader;
mod http;
mod uploader;

pub use downloader::Downloader;
pub use http::Http;
pub use uploader::Uploader;

use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::config::NetConfig;
use crate::lifecycle::{Defaults, LifeCycle, RequestOptions};
use crate::listeners::EventListeners;
use crate::queue::TaskQueue;
use crate::transport::{CachedTransport, HttpTransport, Transport};

/// HTTP transport behind a queue, behind the cache when it is enabled
pub fn build_transport(config: &NetConfig) -> Result<Arc<dyn Transport>> {
    debug!(?config.queue, cache_enabled = config.cache.enabled, "build_transport: called");
    let http: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let queue = TaskQueue::new(http, config.queue.clone());

    if config.cache.enabled {
        Ok(Arc::new(CachedTransport::new(queue, config.cache.clone())))
    } else {
        Ok(Arc::new(queue))
    }
}

fn lifecycle_from_config(config: &NetConfig) -> Result<LifeCycle> {
    config.validate()?;
    let defaults = Defaults::from(&config.defaults);
    Ok(LifeCycle::new(defaults, build_transport(config)?))
}

/// Options for shorthand calls: `config` supplies everything but the target
fn shorthand(url: impl Into<String>, config: Option<RequestOptions>) -> RequestOptions {
    let mut options = config.unwrap_or_default();
    options.url = url.into();
    options
}

/// All three entry points built from one configuration
///
/// Each client gets its own queue, so requests, downloads and uploads are
/// limited independently. Observers are shared.
pub struct Network {
    pub http: Http,
    pub downloader: Downloader,
    pub uploader: Uploader,
    listeners: Arc<EventListeners>,
}

impl Network {
    pub fn from_config(config: &NetConfig) -> Result<Self> {
        debug!("Network::from_config: called");
        let listeners = Arc::new(EventListeners::with_tracing());
        Ok(Self {
            http: Http::from_config(config)?.with_listeners(Arc::clone(&listeners)),
            downloader: Downloader::from_config(config)?.with_listeners(Arc::clone(&listeners)),
            uploader: Uploader::from_config(config)?.with_listeners(Arc::clone(&listeners)),
            listeners,
        })
    }

    /// Observers shared by all three clients
    pub fn listeners(&self) -> &EventListeners {
        &self.listeners
    }
}
