//! Request and response bodies of the HTTP API.

pub mod v1;
