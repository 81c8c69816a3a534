//! HTTP client with builder pattern.
//!
//! # Example
//!
//! ```rust,ignore
//! use wirenet::{Client, DecompressionMethods};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .max_connections_per_server(4)
//!     .automatic_decompression(DecompressionMethods::ALL)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//!
//! let body = client.get("http://example.com/").send().await?.text().await?;
//! ```

use crate::base::neterror::NetError;
use crate::config::{defaults, ConnectionSettings};
use crate::dns::Resolve;
use crate::http::decompression::{Decompression, DecompressionMethods};
use crate::http::parse::is_content_header;
use crate::http::pipeline::{Handler, Pipeline};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::socket::manager::PoolManager;
use crate::socket::proxy::ProxyResolve;
use crate::socket::tls::{DangerAcceptInvalidCerts, DefaultTlsTarget, TlsConfig, TlsTarget};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// When [`Client::send_with`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionOption {
    /// After the whole body has been read into memory.
    #[default]
    ResponseContentRead,
    /// As soon as the headers are parsed; the body streams from the socket.
    ResponseHeadersRead,
}

struct ClientInner {
    pipeline: Pipeline,
    manager: Arc<PoolManager>,
    timeout: Option<Duration>,
    max_response_content_buffer_size: usize,
    default_headers: HeaderMap,
    pending: Mutex<CancellationToken>,
}

/// HTTP client for making requests.
///
/// Cheap to clone; clones share pools and configuration.
/// Use [`Client::builder()`] to configure and create a client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        ClientBuilder::default().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn pool_manager(&self) -> &Arc<PoolManager> {
        &self.inner.manager
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Sends `request` and buffers the whole response body.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        self.send_with(request, CompletionOption::ResponseContentRead, &CancellationToken::new())
            .await
    }

    /// Sends `request`, honoring `token`, the client timeout and
    /// [`cancel_pending_requests`](Self::cancel_pending_requests).
    ///
    /// With [`CompletionOption::ResponseHeadersRead`] the body is left on the
    /// connection and stays bound to the client's pending-requests token.
    pub async fn send_with(
        &self,
        mut request: HttpRequest,
        completion: CompletionOption,
        token: &CancellationToken,
    ) -> Result<HttpResponse, NetError> {
        for (name, value) in &self.inner.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }

        let merged = self.pending_token().child_token();
        let buffer = completion == CompletionOption::ResponseContentRead && request.method != Method::HEAD;
        tracing::debug!(method = %request.method, url = %request.url, ?completion, "sending request");

        let exchange = async {
            let mut response = self.inner.pipeline.send(request, &merged).await?;
            if buffer {
                response.buffer_content(self.inner.max_response_content_buffer_size).await?;
            }
            Ok::<_, NetError>(response)
        };
        let deadline = async {
            match self.inner.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(NetError::Cancelled),
            _ = merged.cancelled() => Err(NetError::Cancelled),
            _ = deadline => {
                tracing::debug!(timeout = ?self.inner.timeout, "request timed out");
                Err(NetError::Cancelled)
            }
            outcome = exchange => outcome,
        };

        match outcome {
            Err(error) if merged.is_cancelled() || token.is_cancelled() => {
                tracing::trace!(%error, "failure after cancellation");
                merged.cancel();
                Err(NetError::Cancelled)
            }
            outcome => outcome,
        }
    }

    /// Cancels every request currently in flight on this client.
    ///
    /// Requests started afterwards are unaffected.
    pub fn cancel_pending_requests(&self) {
        let previous = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *pending, CancellationToken::new())
        };
        tracing::debug!("cancelling pending requests");
        previous.cancel();
    }

    fn pending_token(&self) -> CancellationToken {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Closes idle connections and rejects further requests.
    pub fn dispose(&self) {
        self.inner.manager.dispose();
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a PATCH request.
    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.as_ref().to_string(),
            headers: HeaderMap::new(),
            content_headers: HeaderMap::new(),
            body: None,
            completion: CompletionOption::default(),
            token: None,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("manager", &self.inner.manager)
            .field("pipeline", &self.inner.pipeline)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Builder for creating a [`Client`].
pub struct ClientBuilder {
    settings: ConnectionSettings,
    timeout: Option<Duration>,
    max_response_content_buffer_size: usize,
    default_headers: HeaderMap,
    handlers: Vec<Box<dyn Handler>>,
    cleanup_interval: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            settings: ConnectionSettings::default(),
            timeout: defaults::REQUEST_TIMEOUT,
            max_response_content_buffer_size: defaults::MAX_RESPONSE_CONTENT_BUFFER_SIZE,
            default_headers: HeaderMap::new(),
            handlers: Vec::new(),
            cleanup_interval: None,
        }
    }
}

impl ClientBuilder {
    /// Replace every connection setting at once.
    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_connections_per_server(mut self, max: usize) -> Self {
        self.settings.max_connections_per_server = max.max(1);
        self
    }

    pub fn pooled_connection_idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.pooled_connection_idle_timeout = timeout;
        self
    }

    pub fn pooled_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.settings.pooled_connection_lifetime = Some(lifetime);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = Some(timeout);
        self
    }

    /// Ceiling for the response head, in KiB.
    pub fn max_response_headers_length(mut self, kib: usize) -> Self {
        self.settings.max_response_headers_length = kib;
        self
    }

    pub fn initial_read_buffer_size(mut self, size: usize) -> Self {
        self.settings.initial_read_buffer_size = size.max(1);
        self
    }

    pub fn initial_write_buffer_size(mut self, size: usize) -> Self {
        self.settings.initial_write_buffer_size = size;
        self
    }

    pub fn automatic_decompression(mut self, methods: DecompressionMethods) -> Self {
        self.settings.automatic_decompression = methods;
        self
    }

    /// Set proxy.
    pub fn proxy<P: ProxyResolve + 'static>(mut self, proxy: P) -> Self {
        self.settings.proxy = Some(Arc::new(proxy));
        self.settings.use_proxy = true;
        self
    }

    pub fn no_proxy(mut self) -> Self {
        self.settings.use_proxy = false;
        self
    }

    pub fn resolver<R: Resolve + 'static>(mut self, resolver: R) -> Self {
        self.settings.resolver = Arc::new(resolver);
        self
    }

    pub fn tls_target<T: TlsTarget + 'static>(mut self, target: T) -> Self {
        self.settings.tls_target = Arc::new(target);
        self
    }

    pub fn tls_config(mut self, config: TlsConfig) -> Self {
        self.settings.tls_config = config;
        self
    }

    /// Skip certificate validation. Only for test servers.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.settings.tls_target = if accept {
            Arc::new(DangerAcceptInvalidCerts)
        } else {
            Arc::new(DefaultTlsTarget)
        };
        self
    }

    pub fn read_ahead(mut self, enabled: bool) -> Self {
        self.settings.read_ahead = enabled;
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let requests run for as long as they take.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn max_response_content_buffer_size(mut self, size: usize) -> Self {
        self.max_response_content_buffer_size = size;
        self
    }

    /// Header added to every request that does not set it.
    pub fn default_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (key.try_into(), value.try_into()) {
            self.default_headers.insert(key, value);
        }
        self
    }

    /// Add a pipeline stage. Stages run in the order added, outermost first.
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Sweep idle connections periodically. Needs a running tokio runtime
    /// at [`build`](Self::build) time.
    pub fn idle_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let decompression = self.settings.automatic_decompression;
        let manager = Arc::new(PoolManager::new(self.settings));

        let mut pipeline = Pipeline::builder(manager.clone());
        for handler in self.handlers {
            pipeline = pipeline.boxed_handler(handler);
        }
        if !decompression.is_empty() {
            pipeline = pipeline.handler(Decompression::new(decompression));
        }

        if let Some(interval) = self.cleanup_interval {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => manager.start_cleanup_task(interval),
                Err(_) => tracing::warn!("no tokio runtime; idle cleanup disabled"),
            }
        }

        Client {
            inner: Arc::new(ClientInner {
                pipeline: pipeline.build(),
                manager,
                timeout: self.timeout,
                max_response_content_buffer_size: self.max_response_content_buffer_size,
                default_headers: self.default_headers,
                pending: Mutex::new(CancellationToken::new()),
            }),
        }
    }
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: HeaderMap,
    content_headers: HeaderMap,
    body: Option<Bytes>,
    completion: CompletionOption,
    token: Option<CancellationToken>,
}

impl RequestBuilder {
    /// Add a header. Payload headers such as `Content-Type` are sent with
    /// the body.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (key.try_into(), value.try_into()) {
            if is_content_header(&key) {
                self.content_headers.append(key, value);
            } else {
                self.headers.append(key, value);
            }
        }
        self
    }

    /// Set request body.
    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(json) {
            self.body = Some(Bytes::from(bytes));
            self.content_headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    pub fn completion(mut self, completion: CompletionOption) -> Self {
        self.completion = completion;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn build(self) -> Result<HttpRequest, NetError> {
        let url = Url::parse(&self.url).map_err(|_| NetError::InvalidUrl)?;
        let mut request = HttpRequest::new(self.method, url);
        request.headers = self.headers;
        request.content_headers = self.content_headers;
        request.body = self.body;
        Ok(request)
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse, NetError> {
        let client = self.client.clone();
        let completion = self.completion;
        let token = self.token.clone().unwrap_or_default();
        let request = self.build()?;
        client.send_with(request, completion, &token).await
    }
}
