//! Plain HTTP requests

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

pub struct Http {
    lifecycle: LifeCycle,
}

impl Http {
    pub fn new(defaults: Defaults, transport: Arc<dyn Transport>) -> Self {
        Self {
            lifecycle: LifeCycle::new(defaults, transport),
        }
    }

    pub fn from_config(config: &NetConfig) -> Result<Self> {
        debug!("Http::from_config: called");
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

    /// Structured form
    pub async fn request(&self, mut options: RequestOptions) -> Result<Response, NetError> {
        debug!(url = %options.url, method = ?options.method, "Http::request: called");
        options.kind = OperationKind::Request;
        self.lifecycle.process(options).await
    }

    /// Shorthand form; `data` replaces any data in `config`
    pub async fn send(
        &self,
        method: Method,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        let mut options = shorthand(url, config);
        options.method = Some(method);
        if data.is_some() {
            options.data = data;
        }
        self.request(options).await
    }

    pub async fn get(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Get, url, data, config).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Post, url, data, config).await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Put, url, data, config).await
    }

    pub async fn delete(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Delete, url, data, config).await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Patch, url, data, config).await
    }

    pub async fn head(
        &self,
        url: impl Into<String>,
        data: Option<Value>,
        config: Option<RequestOptions>,
    ) -> Result<Response, NetError> {
        self.send(Method::Head, url, data, config).await
    }
}
