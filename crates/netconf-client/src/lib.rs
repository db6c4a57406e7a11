//! NETCONF client library
//!
//! Session engine for NETCONF devices: hello exchange, RPC correlation over a
//! single framed channel, and asynchronous notification delivery.

pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod negotiator;
pub mod profile;
pub mod session;

pub use config::ClientConfig;
pub use error::{ErrorKind, NetconfError, Result, RpcErrorReply};
pub use profile::{DeviceProfile, ProfileParams};
pub use session::{Session, SessionOptions, SessionState};
