//! # wirenet
//!
//! A ground-up HTTP/1.1 client transport for Rust.
//!
//! `wirenet` serializes requests and parses responses directly against the
//! wire, reuses connections across requests, and bounds how many
//! connections each destination may hold.
//!
//! ## Features
//!
//! - **Connection Pooling**: per-destination limit, idle cache, FIFO waiters
//! - **HTTP/1.1 framing**: content-length, chunked (with trailers), read-until-close
//! - **Decompression**: optional `gzip` / `deflate` pipeline stage
//! - **TLS**: BoringSSL with a pluggable server-name / validation strategy
//! - **DNS**: system resolver by default, hickory-dns or pinned overrides on demand
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wirenet::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new();
//!     let response = client.get("http://example.com/").send().await.unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`config`] - Connection settings and their defaults
//! - [`dns`] - Endpoint resolution strategies
//! - [`http`] - Wire engine, bodies, decompression and the handler pipeline
//! - [`socket`] - Connection keys, pools, dialing, proxy and TLS

pub mod base;
pub mod client;
pub mod config;
pub mod dns;
pub mod http;
pub mod socket;

pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder, CompletionOption, RequestBuilder};
pub use config::ConnectionSettings;
pub use http::{DecompressionMethods, HttpRequest, HttpResponse, ResponseBody};
