//! Protocol message definitions

use crate::{Element, ProtocolError, Result};
use chrono::{DateTime, FixedOffset};

/// NETCONF base namespace
pub const BASE_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// RFC 5277 notification namespace
pub const NOTIFICATION_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// RFC 6022 monitoring namespace
pub const MONITORING_NAMESPACE: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

/// Session identifier assigned by the server in its hello
pub type SessionId = u32;

/// Top-level message, classified by root element
#[derive(Debug, Clone)]
pub enum Message {
    /// Capability advertisement, sent once by each side
    Hello(Hello),

    /// Server reply to an `<rpc>`
    RpcReply(RpcReply),

    /// Unsolicited event
    Notification(Notification),

    /// Client request (seen by servers)
    Rpc(Rpc),
}

impl Message {
    /// Parse one complete message
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        let root = Element::parse(text)?;

        match root.local_name() {
            "hello" => Hello::from_element(&root).map(Message::Hello),
            "rpc-reply" => Ok(Message::RpcReply(RpcReply::from_element(root))),
            "notification" => Notification::from_element(root, text).map(Message::Notification),
            "rpc" => Ok(Message::Rpc(Rpc::from_element(root))),
            other => Err(ProtocolError::InvalidFormat(format!(
                "unexpected root element <{}>",
                other
            ))),
        }
    }

    /// Get message type name
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::RpcReply(_) => "rpc-reply",
            Message::Notification(_) => "notification",
            Message::Rpc(_) => "rpc",
        }
    }
}

/// `<hello>` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Advertised capability URIs, as sent
    pub capabilities: Vec<String>,

    /// Present only in the server hello
    pub session_id: Option<SessionId>,
}

impl Hello {
    /// Build from an already parsed `<hello>` element
    pub fn from_element(root: &Element) -> Result<Self> {
        let capabilities = root
            .child("capabilities")
            .ok_or_else(|| ProtocolError::InvalidFormat("hello without <capabilities>".to_string()))?
            .children_named("capability")
            .map(|c| c.text_content().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let session_id = match root.child_text("session-id") {
            Some(raw) => Some(raw.parse::<SessionId>().map_err(|_| {
                ProtocolError::InvalidFormat(format!("invalid session-id {:?}", raw))
            })?),
            None => None,
        };

        Ok(Self {
            capabilities,
            session_id,
        })
    }

    /// Render as a `<hello>` element
    pub fn to_element(&self) -> Element {
        let mut capabilities = Element::new("capabilities");
        for capability in &self.capabilities {
            capabilities.push_child(Element::new("capability").with_text(capability.clone()));
        }

        let mut hello = Element::new("hello")
            .with_namespace(BASE_NAMESPACE)
            .with_child(capabilities);
        if let Some(id) = self.session_id {
            hello.push_child(Element::new("session-id").with_text(id.to_string()));
        }
        hello
    }
}

/// `<rpc-reply>` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    /// `message-id` attribute; absent on some malformed replies
    pub message_id: Option<String>,

    /// The whole reply element
    pub body: Element,
}

impl RpcReply {
    pub fn from_element(body: Element) -> Self {
        Self {
            message_id: body.attr("message-id").map(str::to_string),
            body,
        }
    }

    /// True when the reply carries `<ok/>`
    pub fn is_ok(&self) -> bool {
        self.body.child("ok").is_some()
    }

    /// `<data>` payload, if present
    pub fn data(&self) -> Option<&Element> {
        self.body.child("data")
    }

    /// All `<rpc-error>` entries
    pub fn errors(&self) -> Vec<RpcErrorInfo> {
        self.body
            .children_named("rpc-error")
            .map(RpcErrorInfo::from_element)
            .collect()
    }

    /// True when at least one entry has a severity other than `warning`
    pub fn has_errors(&self) -> bool {
        self.errors().iter().any(|e| !e.is_warning())
    }
}

/// One `<rpc-error>` entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcErrorInfo {
    pub error_type: Option<String>,
    pub error_tag: Option<String>,
    pub error_severity: Option<String>,
    pub error_app_tag: Option<String>,
    pub error_path: Option<String>,
    pub error_message: Option<String>,
}

impl RpcErrorInfo {
    pub fn from_element(element: &Element) -> Self {
        let field = |name: &str| element.child_text(name).map(str::to_string);
        Self {
            error_type: field("error-type"),
            error_tag: field("error-tag"),
            error_severity: field("error-severity"),
            error_app_tag: field("error-app-tag"),
            error_path: field("error-path"),
            error_message: field("error-message"),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.error_severity.as_deref() == Some("warning")
    }

    /// Render as an `<rpc-error>` element
    pub fn to_element(&self) -> Element {
        let mut element = Element::new("rpc-error");
        let fields = [
            ("error-type", &self.error_type),
            ("error-tag", &self.error_tag),
            ("error-severity", &self.error_severity),
            ("error-app-tag", &self.error_app_tag),
            ("error-path", &self.error_path),
            ("error-message", &self.error_message),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                element.push_child(Element::new(name).with_text(value.clone()));
            }
        }
        element
    }
}

/// `<notification>` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Parsed `<eventTime>`, if present and valid RFC 3339
    pub event_time: Option<DateTime<FixedOffset>>,

    /// Local name of the event element
    pub event_type: String,

    /// The whole notification element
    pub body: Element,

    /// Message text exactly as received
    pub raw: String,
}

impl Notification {
    pub fn from_element(body: Element, raw: &str) -> Result<Self> {
        let event_time = body
            .child_text("eventTime")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok());

        let event_type = body
            .children
            .iter()
            .find(|c| c.local_name() != "eventTime")
            .map(|c| c.local_name().to_string())
            .ok_or_else(|| {
                ProtocolError::InvalidFormat("notification without event content".to_string())
            })?;

        Ok(Self {
            event_time,
            event_type,
            body,
            raw: raw.to_string(),
        })
    }

    /// Event element (first child that is not `<eventTime>`)
    pub fn event(&self) -> Option<&Element> {
        self.body
            .children
            .iter()
            .find(|c| c.local_name() != "eventTime")
    }
}

/// `<rpc>` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rpc {
    pub message_id: Option<String>,
    pub body: Element,
}

impl Rpc {
    pub fn from_element(body: Element) -> Self {
        Self {
            message_id: body.attr("message-id").map(str::to_string),
            body,
        }
    }

    /// Operation element (first child)
    pub fn operation(&self) -> Option<&Element> {
        self.body.children.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_types() {
        let hello = Message::parse(
            br#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities><session-id>4</session-id></hello>"#,
        )
        .unwrap();
        assert_eq!(hello.message_type(), "hello");

        match hello {
            Message::Hello(h) => {
                assert_eq!(h.session_id, Some(4));
                assert_eq!(h.capabilities, vec!["urn:ietf:params:netconf:base:1.0"]);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_hello_round_trip() {
        let hello = Hello {
            capabilities: vec![
                "urn:ietf:params:netconf:base:1.0".to_string(),
                "urn:ietf:params:netconf:base:1.1".to_string(),
            ],
            session_id: None,
        };
        let parsed = Hello::from_element(&hello.to_element()).unwrap();
        assert_eq!(parsed, hello);
    }

    #[test]
    fn test_hello_bad_session_id() {
        let result = Message::parse(
            b"<hello><capabilities/><session-id>abc</session-id></hello>",
        );
        assert!(matches!(result, Err(ProtocolError::InvalidFormat(_))));
    }

    #[test]
    fn test_rpc_reply_with_errors() {
        let msg = Message::parse(
            br#"<rpc-reply message-id="9" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <rpc-error>
    <error-type>application</error-type>
    <error-tag>invalid-value</error-tag>
    <error-severity>error</error-severity>
    <error-message>no such schema</error-message>
  </rpc-error>
</rpc-reply>"#,
        )
        .unwrap();

        let Message::RpcReply(reply) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(reply.message_id.as_deref(), Some("9"));
        assert!(reply.has_errors());
        let errors = reply.errors();
        assert_eq!(errors[0].error_tag.as_deref(), Some("invalid-value"));
        assert_eq!(errors[0].error_message.as_deref(), Some("no such schema"));
    }

    #[test]
    fn test_warning_only_reply_is_not_an_error() {
        let warning = RpcErrorInfo {
            error_severity: Some("warning".to_string()),
            ..Default::default()
        };
        let body = Element::new("rpc-reply")
            .with_attr("message-id", "2")
            .with_child(warning.to_element())
            .with_child(Element::new("ok"));
        let reply = RpcReply::from_element(body);
        assert!(!reply.has_errors());
        assert!(reply.is_ok());
    }

    #[test]
    fn test_notification_fields() {
        let raw = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2024-05-01T10:00:00Z</eventTime><link-down xmlns="urn:example"><if>eth0</if></link-down></notification>"#;
        let Message::Notification(n) = Message::parse(raw.as_bytes()).unwrap() else {
            panic!("Wrong message type");
        };
        assert_eq!(n.event_type, "link-down");
        assert_eq!(n.raw, raw);
        assert!(n.event_time.is_some());
        assert_eq!(n.event().unwrap().child_text("if"), Some("eth0"));
    }

    #[test]
    fn test_notification_without_event() {
        let result = Message::parse(b"<notification><eventTime>2024-05-01T10:00:00Z</eventTime></notification>");
        assert!(matches!(result, Err(ProtocolError::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_root() {
        assert!(Message::parse(b"<bogus/>").is_err());
    }
}
