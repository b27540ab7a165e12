//! reqwest-backed transport

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{FutureExt, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    Dispatch, Headers, HeadersCallback, Method, Operation, OperationKind, Progress, ProgressCallback, Response,
    Transport, TransportHandle,
};
use crate::error::NetError;

/// Performs operations over HTTP
///
/// Each dispatch runs on its own spawned task. Aborting the handle, or
/// dropping the completion future, stops that task.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, NetError> {
        debug!("HttpTransport::new: called");
        let client = Client::builder()
            .build()
            .map_err(|e| NetError::transport(OperationKind::Request, e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn dispatch(&self, operation: Operation) -> Dispatch {
        debug!(kind = %operation.kind, method = %operation.method, url = %operation.url, "HttpTransport::dispatch: called");
        let kind = operation.kind;
        let handle = Arc::new(HttpTaskHandle::new(kind));
        let client = self.client.clone();

        let task_handle = Arc::clone(&handle);
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_handle.abort.cancelled() => Err(NetError::aborted(kind, None)),
                result = perform(&client, operation, &task_handle) => result,
            }
        });

        let drop_guard = handle.abort.clone().drop_guard();
        let completion = async move {
            let _drop_guard = drop_guard;
            join.await
                .unwrap_or_else(|e| Err(NetError::transport(kind, format!("task failed: {}", e))))
        }
        .boxed();

        Dispatch { handle, completion }
    }
}

struct HttpTaskHandle {
    kind: OperationKind,
    abort: CancellationToken,
    progress: Mutex<Option<ProgressCallback>>,
    headers: Mutex<Option<HeadersCallback>>,
}

impl HttpTaskHandle {
    fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            abort: CancellationToken::new(),
            progress: Mutex::new(None),
            headers: Mutex::new(None),
        }
    }

    fn emit_progress(&self, progress: Progress) {
        let callback = self.progress.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(callback) = callback {
            callback(progress);
        }
    }

    fn emit_headers(&self, headers: &Headers) {
        let callback = self.headers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(callback) = callback {
            callback(headers);
        }
    }
}

impl TransportHandle for HttpTaskHandle {
    fn abort(&self) {
        debug!(kind = %self.kind, "HttpTaskHandle::abort: called");
        self.abort.cancel();
    }

    fn supports_progress(&self) -> bool {
        matches!(self.kind, OperationKind::Download | OperationKind::Upload)
    }

    fn on_progress_update(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn on_headers_received(&self, callback: HeadersCallback) {
        *self.headers.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

async fn perform(client: &Client, operation: Operation, handle: &Arc<HttpTaskHandle>) -> Result<Response, NetError> {
    let kind = operation.kind;
    let method = reqwest::Method::from_bytes(operation.method.as_str().as_bytes())
        .map_err(|e| NetError::transport(kind, e))?;

    let mut request = client.request(method, &operation.url);
    for (key, value) in &operation.header {
        request = request.header(key, value);
    }
    request = match kind {
        OperationKind::Request => with_body(request, operation.method, operation.data.as_ref()),
        OperationKind::Download => request,
        OperationKind::Upload => request.multipart(upload_form(&operation, handle).await?),
    };

    let response = request.send().await.map_err(|e| NetError::transport(kind, e))?;
    let status_code = response.status().as_u16();
    let header = header_map(response.headers());
    debug!(%status_code, url = %operation.url, "perform: headers received");
    handle.emit_headers(&header);

    if kind == OperationKind::Download {
        let path = operation.local_path.clone().unwrap_or_else(temp_download_path);
        download(response, &path, handle).await?;
        return Ok(Response {
            status_code,
            header,
            data: Value::Null,
            file_path: Some(path),
            time: None,
        });
    }

    let bytes = response.bytes().await.map_err(|e| NetError::transport(kind, e))?;
    Ok(Response {
        status_code,
        header,
        data: parse_body(&bytes),
        file_path: None,
        time: None,
    })
}

/// GET and HEAD carry object data as query parameters; everything else as a body
fn with_body(request: RequestBuilder, method: Method, data: Option<&Value>) -> RequestBuilder {
    match (method, data) {
        (_, None | Some(Value::Null)) => request,
        (Method::Get | Method::Head, Some(Value::Object(map))) => {
            let query: Vec<(String, String)> = map.iter().map(|(k, v)| (k.clone(), plain_string(v))).collect();
            request.query(&query)
        }
        (_, Some(Value::String(body))) => request.body(body.clone()),
        (_, Some(value)) => request.json(value),
    }
}

/// Multipart body with the file streamed from disk, reporting progress per chunk
async fn upload_form(operation: &Operation, handle: &Arc<HttpTaskHandle>) -> Result<Form, NetError> {
    let kind = operation.kind;
    let (Some(path), Some(name)) = (&operation.local_path, &operation.name) else {
        return Err(NetError::transport(kind, "missing local_path or name"));
    };

    let file = tokio::fs::File::open(path).await.map_err(|e| NetError::io(kind, &e))?;
    let length = file.metadata().await.map_err(|e| NetError::io(kind, &e))?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());

    let progress = Arc::clone(handle);
    let mut sent: u64 = 0;
    let stream = ReaderStream::new(file).inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            sent += chunk.len() as u64;
            progress.emit_progress(Progress::new(sent, Some(length)));
        }
    });
    let part = Part::stream_with_length(Body::wrap_stream(stream), length).file_name(file_name);

    let mut form = Form::new();
    for (key, value) in &operation.form_data {
        form = form.text(key.clone(), value.clone());
    }
    Ok(form.part(name.clone(), part))
}

async fn download(response: reqwest::Response, path: &Path, handle: &HttpTaskHandle) -> Result<(), NetError> {
    let kind = OperationKind::Download;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| NetError::io(kind, &e))?;
    }

    let expected = response.content_length();
    let mut file = tokio::fs::File::create(path).await.map_err(|e| NetError::io(kind, &e))?;
    let mut stream = response.bytes_stream();
    let mut total: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NetError::transport(kind, e))?;
        file.write_all(&chunk).await.map_err(|e| NetError::io(kind, &e))?;
        total += chunk.len() as u64;
        handle.emit_progress(Progress::new(total, expected));
    }
    file.flush().await.map_err(|e| NetError::io(kind, &e))?;

    debug!(path = %path.display(), total, "download: written");
    Ok(())
}

fn header_map(headers: &reqwest::header::HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.as_str().to_string(), value.to_string())),
            Err(_) => {
                warn!(header = %name, "header_map: skipping non-ascii header value");
                None
            }
        })
        .collect()
}

/// JSON when the body parses, the raw text otherwise
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Default destination for downloads without a `local_path`
fn temp_download_path() -> PathBuf {
    std::env::temp_dir().join(format!("netqueue-{}", Uuid::now_v7()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body(b"plain text"), json!("plain text"));
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(plain_string(&json!("x")), "x");
        assert_eq!(plain_string(&json!(3)), "3");
        assert_eq!(plain_string(&json!(true)), "true");
    }

    #[test]
    fn test_temp_download_paths_are_unique() {
        let a = temp_download_path();
        let b = temp_download_path();
        assert_ne!(a, b);
        assert!(a.starts_with(std::env::temp_dir()));
    }

    #[tokio::test]
    async fn test_abort_settles_with_cancel() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = HttpTransport::new().unwrap();
        let Dispatch { handle, completion } =
            transport.dispatch(Operation::new(OperationKind::Request, format!("http://{}/slow", addr)));
        assert!(!handle.supports_progress());

        handle.abort();
        handle.abort();
        let err = completion.await.unwrap_err();
        assert!(err.is_cancel());
        assert_eq!(err.err_msg(), "request:fail abort");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .dispatch(Operation::new(OperationKind::Request, format!("http://{}/", addr)))
            .completion
            .await
            .unwrap_err();

        assert!(err.err_msg().starts_with("request:fail "));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_failure() {
        let mut operation = Operation::new(OperationKind::Upload, "http://127.0.0.1:9/upload");
        operation.local_path = Some(PathBuf::from("/definitely/not/here.bin"));
        operation.name = Some("file".to_string());

        let handle = Arc::new(HttpTaskHandle::new(OperationKind::Upload));
        assert!(handle.supports_progress());
        let err = upload_form(&operation, &handle).await.unwrap_err();
        assert!(matches!(err, NetError::Io { .. }));
        assert!(err.err_msg().starts_with("uploadFile:fail "));
    }
}
