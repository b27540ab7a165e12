//! Multipart file uploads

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use serde_json::Value;
use tracing::debug;

use super::{lifecycle_from_config, shorthand};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::lifecycle::{Defaults, LifeCycle, RequestOptions};
use crate::listeners::EventListeners;
use crate::transport::{Method, OperationKind, Response, Transport};

/// Uploads send the file at `local_path` as form field `name`
///
/// Object `data` becomes extra text fields. Uploads default to POST.
pub struct Uploader {
    lifecycle: LifeCycle,
}

impl Uploader {
    pub fn new(defaults: Defaults, transport: Arc<dyn Transport>) -> Self {
        Self {
            lifecycle: LifeCycle::new(defaults, transport),
        }
    }

    pub fn from_config(config: &NetConfig) -> Result<Self> {
        debug!("Uploader::from_config: called");
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

    pub async fn upload(&self, mut options: RequestOptions) -> Result<Response, NetError> {
        debug!(url = %options.url, local_path = ?options.local_path, "Uploader::upload: called");
        options.kind = OperationKind::Upload;
        options.method = options.method.or(Some(Method::Post));
        self.lifecycle.process(options).await
    }

    pub async fn upload_file(
        &self,
        local_path: impl Into<PathBuf>,
        name: impl Into<String>,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        let mut options = shorthand(url, config);
        options.local_path = Some(local_path.into());
        options.name = Some(name.into());
        if data.is_some() {
            options.data = data;
        }
        self.upload(options).await
    }
}
