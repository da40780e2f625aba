//! service-core: error type, configuration, observability and HTTP middleware
//! shared by the integration service binaries.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
