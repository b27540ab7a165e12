//! LifeCycle implementation

use std::sync::Arc;

use tracing::{debug, info};

use super::options::{Defaults, RequestContext, RequestOptions};
use crate::error::NetError;
use crate::listeners::EventListeners;
use crate::transport::{Dispatch, Response, Transport};

/// Request pipeline in front of a transport
///
/// Each call merges its options over the pipeline defaults, turns them into
/// an [`Operation`](crate::transport::Operation) once, then dispatches that
/// operation until it succeeds, runs out of attempts or is cancelled.
pub struct LifeCycle {
    defaults: Defaults,
    listeners: Arc<EventListeners>,
    transport: Arc<dyn Transport>,
}

impl LifeCycle {
    pub fn new(defaults: Defaults, transport: Arc<dyn Transport>) -> Self {
        debug!(?defaults, "LifeCycle::new: called");
        Self {
            defaults,
            listeners: Arc::new(EventListeners::new()),
            transport,
        }
    }

    /// Share an observer registry with other pipelines
    pub fn with_listeners(mut self, listeners: Arc<EventListeners>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn listeners(&self) -> &EventListeners {
        &self.listeners
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run one call to completion
    pub async fn process(&self, options: RequestOptions) -> Result<Response, NetError> {
        let mut ctx = RequestContext::new(options, &self.defaults);
        let kind = ctx.options.kind;
        debug!(%kind, url = %ctx.options.url, attempts = ctx.remaining, "LifeCycle::process: called");

        self.listeners.emit_send(&ctx.options);

        let transform_send = ctx
            .options
            .transform_send
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.defaults.transform_send));
        let operation = match transform_send(&ctx.options) {
            Ok(operation) => operation,
            Err(err) => {
                debug!(error = %err, "LifeCycle::process: send-transform failed");
                self.listeners.emit_rejected(&err, &ctx.options);
                return Err(err);
            }
        };

        let transform_response = ctx
            .options
            .transform_response
            .clone()
            .or_else(|| self.defaults.transform_response.clone());
        let token = ctx.options.cancel_token.clone();

        loop {
            if let Some(token) = &token {
                token.ensure_not_cancelled(kind)?;
            }

            debug!(url = %operation.url, remaining = ctx.remaining, "LifeCycle::process: dispatching attempt");
            let Dispatch { handle, completion } = self.transport.dispatch(operation.clone());

            let outcome = match &token {
                Some(token) => {
                    tokio::select! {
                        biased;
                        reason = token.cancelled() => {
                            info!(url = %operation.url, %reason, "LifeCycle::process: cancelled in flight");
                            handle.abort();
                            self.listeners.emit_abort(&reason, &ctx.options);
                            Err(NetError::aborted(kind, Some(reason)))
                        }
                        result = completion => result,
                    }
                }
                None => completion.await,
            };

            // after-response precedes on-complete
            if let Ok(response) = &outcome {
                self.listeners.emit_response(response, &ctx.options);
            }
            self.listeners.emit_complete(&outcome, &ctx.options);

            let result = outcome.and_then(|response| match &transform_response {
                Some(transform) => transform(response, &ctx.options),
                None => Ok(response),
            });

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && ctx.consume_attempt() => {
                    debug!(error = %err, remaining = ctx.remaining, "LifeCycle::process: retrying");
                }
                Err(err) => {
                    debug!(error = %err, "LifeCycle::process: rejecting");
                    self.listeners.emit_rejected(&err, &ctx.options);
                    return Err(err);
                }
            }
        }
    }
}
