//! Endpoint resolution.
//!
//! Dialing goes through the [`Resolve`] strategy so callers can swap the
//! system resolver for hickory-dns or a fixed table of overrides.
//!
//! - [`GaiResolver`]: `getaddrinfo` on the blocking pool (default)
//! - [`HickoryResolver`]: fully async, shares one process-wide resolver
//! - [`DnsResolverWithOverrides`]: pins host names to addresses
//!
//! ```rust,ignore
//! use wirenet::dns::{resolve_endpoint, GaiResolver};
//!
//! let addrs = resolve_endpoint(&GaiResolver::new(), "example.com", 80).await?;
//! ```

mod gai;
mod hickory;
mod resolve;

pub use gai::GaiResolver;
pub use hickory::HickoryResolver;
pub use resolve::{
    resolve_endpoint, Addrs, DnsResolverWithOverrides, Name, Resolve, Resolving,
};
