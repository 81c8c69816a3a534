//! Ordered request/response handler chain.
//!
//! Stages run outermost first: the first handler added sees the request
//! first and the response last. The innermost step is a [`Transport`].

use crate::base::neterror::NetError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::socket::manager::PoolManager;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, NetError>> + Send + 'a>>;

/// One stage of a [`Pipeline`].
pub trait Handler: Send + Sync {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
        token: &'a CancellationToken,
        next: Next<'a>,
    ) -> HandlerFuture<'a>;
}

/// What finally puts a request on the wire.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: HttpRequest, token: &'a CancellationToken) -> HandlerFuture<'a>;
}

impl Transport for PoolManager {
    fn send<'a>(&'a self, request: HttpRequest, token: &'a CancellationToken) -> HandlerFuture<'a> {
        Box::pin(async move { PoolManager::send(self, &request, token).await })
    }
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Box<dyn Handler>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn run(self, request: HttpRequest, token: &'a CancellationToken) -> HandlerFuture<'a> {
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                handler.send(request, token, Next { handlers: rest, transport: self.transport })
            }
            None => self.transport.send(request, token),
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("remaining", &self.handlers.len()).finish()
    }
}

/// An immutable chain of handlers ending in a transport.
pub struct Pipeline {
    handlers: Vec<Box<dyn Handler>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder { handlers: Vec::new(), transport }
    }

    pub async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, NetError> {
        Next { handlers: &self.handlers, transport: self.transport.as_ref() }
            .run(request, token)
            .await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("handlers", &self.handlers.len()).finish()
    }
}

/// Collects handlers; each is moved in, so none can appear twice.
pub struct PipelineBuilder {
    handlers: Vec<Box<dyn Handler>>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn boxed_handler(mut self, handler: Box<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline { handlers: self.handlers, transport: self.transport }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::ResponseBody;
    use http::{HeaderMap, HeaderValue, StatusCode, Version};
    use std::borrow::Cow;
    use std::sync::Mutex;
    use url::Url;

    struct Echo;

    impl Transport for Echo {
        fn send<'a>(&'a self, request: HttpRequest, _: &'a CancellationToken) -> HandlerFuture<'a> {
            Box::pin(async move {
                Ok(HttpResponse::new(
                    Version::HTTP_11,
                    StatusCode::OK,
                    Cow::Borrowed("OK"),
                    request.headers,
                    HeaderMap::new(),
                    ResponseBody::empty(),
                ))
            })
        }
    }

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Tag {
        fn send<'a>(
            &'a self,
            mut request: HttpRequest,
            token: &'a CancellationToken,
            next: Next<'a>,
        ) -> HandlerFuture<'a> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{} in", self.name));
                request.headers.append("x-stage", HeaderValue::from_static(self.name));
                let response = next.run(request, token).await;
                self.log.lock().unwrap().push(format!("{} out", self.name));
                response
            })
        }
    }

    #[tokio::test]
    async fn first_stage_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder(Arc::new(Echo))
            .handler(Tag { name: "a", log: log.clone() })
            .handler(Tag { name: "b", log: log.clone() })
            .build();
        assert_eq!(pipeline.len(), 2);

        let request = HttpRequest::get(Url::parse("http://example.test/").unwrap());
        let response = pipeline.send(request, &CancellationToken::new()).await.unwrap();

        let stages: Vec<_> = response.headers().get_all("x-stage").iter().collect();
        assert_eq!(stages, ["a", "b"]);
        assert_eq!(*log.lock().unwrap(), ["a in", "b in", "b out", "a out"]);
    }

    #[tokio::test]
    async fn empty_pipeline_hits_transport() {
        let pipeline = Pipeline::builder(Arc::new(Echo)).build();
        assert!(pipeline.is_empty());
        let request = HttpRequest::get(Url::parse("http://example.test/").unwrap());
        let response = pipeline.send(request, &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
