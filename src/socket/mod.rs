//! Socket and connection management.
//!
//! - [`manager`]: routes each request to the pool for its [`key::ConnectionKey`]
//! - [`pool`]: bounded per-destination pool with idle cache and FIFO waiters
//! - [`connectjob`]: DNS → TCP → TLS connection flow
//! - [`proxy`]: proxy selection and `NO_PROXY` matching
//! - [`tls`]: TLS configuration with BoringSSL

pub mod connectjob;
pub mod key;
pub mod manager;
pub mod matcher;
pub mod pool;
pub mod proxy;
pub mod stream;
pub mod tls;

pub use key::{ConnectionKey, ConnectionKind};
pub use manager::PoolManager;
pub use pool::ConnectionPool;
