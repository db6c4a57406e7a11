//! NETCONF Protocol Definitions
//!
//! This crate defines the NETCONF wire protocol: the XML element tree,
//! message framing, message classification, operation builders and
//! capability URI parsing.

pub mod capability;
pub mod error;
pub mod filter;
pub mod messages;
pub mod operations;
pub mod protocol;
pub mod xml;

pub use capability::Capability;
pub use error::{ProtocolError, Result};
pub use filter::unchecked_subtree_filter;
pub use messages::{Hello, Message, Notification, Rpc, RpcErrorInfo, RpcReply, SessionId};
pub use operations::{Datastore, Filter, SubscriptionOptions};
pub use protocol::{Framing, NetconfCodec, MAX_MESSAGE_SIZE};
pub use xml::Element;
