//! Built-in send and response transforms

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::options::RequestOptions;
use crate::error::NetError;
use crate::transport::{Operation, OperationKind, Response};
use crate::utils::build_params;

/// Default send-transform
///
/// Expands the URL template against `params` and `base_url`, carries the
/// body, headers and queue fields over, and for uploads turns an object
/// `data` into form fields.
pub fn transform_send_default(options: &RequestOptions) -> Result<Operation, NetError> {
    debug!(kind = %options.kind, url = %options.url, "transform_send_default: called");
    let url = build_params(&options.url, &options.params, options.base_url.as_deref());

    let mut operation = Operation::new(options.kind, url);
    operation.method = options.method.unwrap_or_default();
    operation.header = options.header.clone();
    operation.local_path = options.local_path.clone();
    operation.timeout = options.timeout;
    operation.jump = options.jump.unwrap_or(false);
    operation.timestamp = options.timestamp.unwrap_or(false);
    operation.on_progress_update = options.on_progress_update.clone();
    operation.on_headers_received = options.on_headers_received.clone();

    match options.kind {
        OperationKind::Upload => {
            let (Some(_), Some(name)) = (&options.local_path, &options.name) else {
                return Err(NetError::transform("upload needs both local_path and name"));
            };
            operation.name = Some(name.clone());
            operation.form_data = form_fields(options.data.as_ref())?;
        }
        OperationKind::Request | OperationKind::Download => {
            operation.data = options.data.clone();
        }
    }

    Ok(operation)
}

/// Response-transform that only lets 2xx responses through
pub fn transform_response_ok_data(response: Response, options: &RequestOptions) -> Result<Response, NetError> {
    if response.is_ok() {
        Ok(response)
    } else {
        debug!(url = %options.url, status_code = response.status_code, "transform_response_ok_data: rejecting");
        Err(NetError::status(options.kind, response.status_code))
    }
}

fn form_fields(data: Option<&Value>) -> Result<BTreeMap<String, String>, NetError> {
    match data {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()),
        Some(other) => Err(NetError::transform(format!("upload form data must be an object, got {}", other))),
    }
}
