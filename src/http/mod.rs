//! HTTP/1.1 over pooled connections.
//!
//! - [`connection`]: the wire engine for one connection
//! - [`body`]: content-length, chunked and read-until-close bodies
//! - [`pipeline`]: handler chain in front of the pool manager
//! - [`decompression`]: `gzip` / `deflate` pipeline stage

pub mod body;
pub mod buffer;
pub mod chunked;
pub mod connection;
pub mod decompression;
pub mod parse;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod retry;

// Re-exports for convenience
pub use body::ResponseBody;
pub use decompression::{Decompression, DecompressionMethods};
pub use pipeline::{Handler, HandlerFuture, Next, Pipeline, PipelineBuilder, Transport};
pub use request::HttpRequest;
pub use response::HttpResponse;
