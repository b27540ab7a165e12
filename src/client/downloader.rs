//! File downloads

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use super::{lifecycle_from_config, shorthand};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::lifecycle::{Defaults, LifeCycle, RequestOptions};
use crate::listeners::EventListeners;
use crate::transport::{OperationKind, Response, Transport};

/// Downloads land at `local_path`, or a fresh temp file when none is given
pub struct Downloader {
    lifecycle: LifeCycle,
}

impl Downloader {
    pub fn new(defaults: Defaults, transport: Arc<dyn Transport>) -> Self {
        Self {
            lifecycle: LifeCycle::new(defaults, transport),
        }
    }

    pub fn from_config(config: &NetConfig) -> Result<Self> {
        debug!("Downloader::from_config: called");
        Ok(Self {
            lifecycle: lifecycle_from_config(config)?,
        })
    }

    pub fn with_listeners(mut self, listeners: Arc<EventListeners>) -> Self {
        self.lifecycle = self.lifecycle.with_listeners(listeners);
        self
    }

    pub fn lifecycle(&self) -> &LifeCycle {
        &self.lifecycle
    }

    pub fn listeners(&self) -> &EventListeners {
        self.lifecycle.listeners()
    }

    pub async fn download(&self, mut options: RequestOptions) -> Result<Response, NetError> {
        debug!(url = %options.url, local_path = ?options.local_path, "Downloader::download: called");
        options.kind = OperationKind::Download;
        self.lifecycle.process(options).await
    }

    pub async fn download_to(
        &self,
        url: impl Into<String>,
        local_path: Option<PathBuf>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        let mut options = shorthand(url, config);
        if local_path.is_some() {
            options.local_path = local_path;
        }
        self.download(options).await
    }
}
