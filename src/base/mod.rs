//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes numbered after Chromium's `net_error_list.h`
//! - [`context`]: helpers that attach host/port context to I/O failures

pub mod context;
pub mod neterror;
