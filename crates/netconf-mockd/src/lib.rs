//! NETCONF device simulator
//!
//! Serves canned datastores, YANG schemas and notifications over the NETCONF
//! protocol, either on a TCP port or on in-memory streams for tests.

pub mod config;
pub mod datastore;
pub mod error;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::{Server, ServerHandle};
