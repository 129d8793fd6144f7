//! Shallow application-layer observers.
//!
//! These parsers exist for operator visibility only: they surface DNS
//! question names and HTTP request headers from transport payload. Their
//! results never gate detection, and malformed traffic is a normal outcome,
//! not an error.

pub mod dns;
pub mod http;
