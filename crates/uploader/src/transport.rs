//! One request/response exchange with an enforced deadline.
//!
//! [`Transport`] knows nothing about blocks or digests; it moves a
//! [`Request`] and returns the raw [`Response`]. Deadlines are applied on top
//! by [`send_with_timeout`], so every implementation gets identical timeout
//! semantics.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

/// Errors produced by a transport exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    Bytes {
        name: String,
        file_name: String,
        data: Vec<u8>,
    },
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Part::Text { name, .. } | Part::Bytes { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` parts, in order.
    Multipart(Vec<Part>),
}

/// Transport-neutral request descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }

    pub fn multipart(mut self, parts: Vec<Part>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Value of a text field, looked up in the form or multipart body.
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            RequestBody::Multipart(parts) => parts.iter().find_map(|p| match p {
                Part::Text { name: n, value } if n == name => Some(value.as_str()),
                _ => None,
            }),
            RequestBody::Empty => None,
        }
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstract request/response channel to the upload service.
///
/// Using a trait keeps the protocol logic decoupled from HTTP and testable
/// with mocks.
pub trait Transport: Send + Sync {
    /// Performs one exchange. Implementations do not apply deadlines.
    fn send(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>>;
}

/// Sends `request` and fails with [`TransportError::Timeout`] if no response
/// arrives within `timeout`.
///
/// Exactly one outcome is observed. On timeout the in-flight exchange is
/// dropped, which cancels it; a late response can never reach the caller.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: Request,
    timeout: Duration,
) -> Result<Response, TransportError> {
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(?timeout, "request deadline elapsed");
            Err(TransportError::Timeout(timeout))
        }
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chunkup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// Wraps an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = match part {
                        Part::Text { name, value } => form.text(name, value),
                        Part::Bytes {
                            name,
                            file_name,
                            data,
                        } => form.part(
                            name,
                            reqwest::multipart::Part::bytes(data)
                                .file_name(file_name)
                                .mime_str("application/octet-stream")?,
                        ),
                    };
                }
                builder.multipart(form)
            }
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(Response { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers after `delay`, flagging completion even if nobody is waiting.
    struct SlowTransport {
        delay: Option<Duration>,
        completed: Arc<AtomicBool>,
    }

    impl Transport for SlowTransport {
        fn send(
            &self,
            _request: Request,
        ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>>
        {
            Box::pin(async move {
                match self.delay {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
                self.completed.store(true, Ordering::SeqCst);
                Ok(Response::new(200, "late"))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_when_no_response() {
        let transport = SlowTransport {
            delay: None,
            completed: Arc::new(AtomicBool::new(false)),
        };
        let start = tokio::time::Instant::now();
        let result =
            send_with_timeout(&transport, Request::get("http://x"), Duration::from_secs(10)).await;

        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == Duration::from_secs(10)));
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_discarded() {
        let completed = Arc::new(AtomicBool::new(false));
        let transport = SlowTransport {
            delay: Some(Duration::from_secs(20)),
            completed: Arc::clone(&completed),
        };
        let result =
            send_with_timeout(&transport, Request::get("http://x"), Duration::from_secs(10)).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));

        // The exchange was dropped, so it never gets to finish.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_response_wins() {
        let transport = SlowTransport {
            delay: Some(Duration::from_millis(5)),
            completed: Arc::new(AtomicBool::new(false)),
        };
        let resp =
            send_with_timeout(&transport, Request::get("http://x"), Duration::from_secs(10))
                .await
                .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "late");
    }

    #[test]
    fn response_success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(199, "").is_success());
        assert!(!Response::new(302, "").is_success());
        assert!(!Response::new(500, "").is_success());
    }

    #[test]
    fn request_field_lookup() {
        let req = Request::post("http://x").multipart(vec![
            Part::Text {
                name: "md5".into(),
                value: "abc".into(),
            },
            Part::Bytes {
                name: "file".into(),
                file_name: "blob".into(),
                data: vec![1, 2, 3],
            },
        ]);
        assert_eq!(req.field("md5"), Some("abc"));
        assert_eq!(req.field("file"), None);

        let req = Request::post("http://x").form(vec![("suffix".into(), "png".into())]);
        assert_eq!(req.field("suffix"), Some("png"));
        assert_eq!(Request::get("http://x").field("suffix"), None);
    }

    // -----------------------------------------------------------------------
    // HttpTransport against a raw TCP mock server
    // -----------------------------------------------------------------------

    /// Accepts one connection, captures the full request, replies with
    /// `status` and `body`.
    async fn mock_server(
        status: u16,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let raw = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            raw
        });

        (url, handle)
    }

    /// Reads headers, then exactly `Content-Length` body bytes.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut raw = Vec::new();
        let mut buf = vec![0u8; 8192];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return raw;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    return raw;
                }
            }
        }
    }

    #[tokio::test]
    async fn http_multipart_upload() {
        let (url, handle) = mock_server(200, r#"{"ok":true}"#).await;
        let transport = HttpTransport::new().unwrap();

        let req = Request::post(format!("{url}/file/upload")).multipart(vec![
            Part::Text {
                name: "md5".into(),
                value: "0123abcd".into(),
            },
            Part::Text {
                name: "block".into(),
                value: "7".into(),
            },
            Part::Bytes {
                name: "file".into(),
                file_name: "blob".into(),
                data: b"BLOCK_PAYLOAD".to_vec(),
            },
        ]);
        let resp = transport.send(req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), r#"{"ok":true}"#);

        let raw = String::from_utf8_lossy(&handle.await.unwrap()).to_string();
        assert!(raw.starts_with("POST /file/upload HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("content-type: multipart/form-data"));
        assert!(raw.contains(r#"name="md5""#));
        assert!(raw.contains("0123abcd"));
        assert!(raw.contains(r#"name="block""#));
        assert!(raw.contains(r#"name="file"; filename="blob""#));
        assert!(raw.contains("BLOCK_PAYLOAD"));
    }

    #[tokio::test]
    async fn http_form_post() {
        let (url, handle) = mock_server(200, r#"{"url":"/files/x.png"}"#).await;
        let transport = HttpTransport::new().unwrap();

        let req = Request::post(format!("{url}/file/merge"))
            .form(vec![("md5".into(), "abc".into()), ("suffix".into(), "png".into())]);
        let resp = transport.send(req).await.unwrap();
        assert!(resp.is_success());

        let raw = String::from_utf8_lossy(&handle.await.unwrap()).to_string();
        assert!(raw.starts_with("POST /file/merge HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("application/x-www-form-urlencoded"));
        assert!(raw.ends_with("md5=abc&suffix=png"));
    }

    #[tokio::test]
    async fn http_get_with_query() {
        let (url, handle) = mock_server(200, r#"{"ieExist":false}"#).await;
        let transport = HttpTransport::new().unwrap();

        let req = Request::get(format!("{url}/file/exist"))
            .query(vec![("md5".into(), "abc".into()), ("suffix".into(), "mp4".into())]);
        transport.send(req).await.unwrap();

        let raw = String::from_utf8_lossy(&handle.await.unwrap()).to_string();
        assert!(raw.starts_with("GET /file/exist?md5=abc&suffix=mp4 HTTP/1.1"));
    }

    #[tokio::test]
    async fn http_error_status_is_a_response() {
        let (url, handle) = mock_server(500, "internal").await;
        let transport = HttpTransport::new().unwrap();

        let resp = transport
            .send(Request::post(format!("{url}/file/upload")))
            .await
            .unwrap();
        assert_eq!(resp.status, 500);
        assert!(!resp.is_success());
        assert_eq!(resp.text(), "internal");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn http_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new().unwrap();
        let result = transport
            .send(Request::get(format!("http://127.0.0.1:{port}/file/exist")))
            .await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
