//! Request and reply builders for the supported operations

use crate::messages::{BASE_NAMESPACE, MONITORING_NAMESPACE, NOTIFICATION_NAMESPACE};
use crate::{Element, ProtocolError, Result, RpcErrorInfo};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::fmt;
use std::str::FromStr;

/// Configuration datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Datastore {
    #[default]
    Running,
    Candidate,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datastore {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Datastore::Running),
            "candidate" => Ok(Datastore::Candidate),
            other => Err(ProtocolError::Parse(format!("unknown datastore {:?}", other))),
        }
    }
}

/// Subtree filter for `<get>` / `<get-config>` / `<create-subscription>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Already structured subtree
    Subtree(Element),

    /// Raw XML text; must hold exactly one well-formed root element
    Raw(String),
}

impl Filter {
    /// Render as `<filter type="subtree">`
    pub fn to_element(&self) -> Result<Element> {
        let content = match self {
            Filter::Subtree(element) => element.clone(),
            Filter::Raw(xml) => Element::parse(xml)
                .map_err(|e| ProtocolError::Parse(format!("invalid filter XML: {}", e)))?,
        };
        Ok(Element::new("filter")
            .with_attr("type", "subtree")
            .with_child(content))
    }
}

/// RFC 5277 `<create-subscription>` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Event stream; the server default is `NETCONF`
    pub stream: Option<String>,

    pub filter: Option<Filter>,

    /// Replay start
    pub start_time: Option<DateTime<FixedOffset>>,

    /// Replay stop; only meaningful with `start_time`
    pub stop_time: Option<DateTime<FixedOffset>>,
}

/// Wrap an operation in an `<rpc>` envelope.
///
/// `namespaces` are extra `xmlns:<prefix>` declarations placed on the
/// envelope so that operation content may use vendor prefixes.
pub fn rpc_envelope(message_id: &str, operation: Element, namespaces: &[(&str, &str)]) -> Element {
    let mut rpc = Element::new("rpc")
        .with_namespace(BASE_NAMESPACE)
        .with_attr("message-id", message_id);
    for (prefix, uri) in namespaces {
        rpc.set_attr(format!("xmlns:{}", prefix), *uri);
    }
    rpc.with_child(operation)
}

/// `<get-config>`
pub fn get_config(source: Datastore, filter: Option<&Filter>) -> Result<Element> {
    let mut operation = Element::new("get-config")
        .with_child(Element::new("source").with_child(Element::new(source.as_str())));
    if let Some(filter) = filter {
        operation.push_child(filter.to_element()?);
    }
    Ok(operation)
}

/// `<get>`
pub fn get(filter: Option<&Filter>) -> Result<Element> {
    let mut operation = Element::new("get");
    if let Some(filter) = filter {
        operation.push_child(filter.to_element()?);
    }
    Ok(operation)
}

/// RFC 6022 `<get-schema>`
pub fn get_schema(identifier: &str, version: Option<&str>, format: Option<&str>) -> Element {
    let mut operation = Element::new("get-schema")
        .with_namespace(MONITORING_NAMESPACE)
        .with_child(Element::new("identifier").with_text(identifier));
    if let Some(version) = version {
        operation.push_child(Element::new("version").with_text(version));
    }
    if let Some(format) = format {
        operation.push_child(Element::new("format").with_text(format));
    }
    operation
}

/// RFC 5277 `<create-subscription>`
pub fn create_subscription(options: &SubscriptionOptions) -> Result<Element> {
    if options.stop_time.is_some() && options.start_time.is_none() {
        return Err(ProtocolError::InvalidFormat(
            "stopTime requires startTime".to_string(),
        ));
    }

    let mut operation = Element::new("create-subscription").with_namespace(NOTIFICATION_NAMESPACE);
    if let Some(stream) = &options.stream {
        operation.push_child(Element::new("stream").with_text(stream.clone()));
    }
    if let Some(filter) = &options.filter {
        operation.push_child(filter.to_element()?);
    }
    if let Some(start) = options.start_time {
        operation.push_child(
            Element::new("startTime").with_text(start.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
    }
    if let Some(stop) = options.stop_time {
        operation.push_child(
            Element::new("stopTime").with_text(stop.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
    }
    Ok(operation)
}

/// `<close-session>`
pub fn close_session() -> Element {
    Element::new("close-session")
}

/// `<rpc-reply>` carrying `<ok/>`
pub fn reply_ok(message_id: &str) -> Element {
    reply_envelope(message_id).with_child(Element::new("ok"))
}

/// `<rpc-reply>` carrying `<data>`
pub fn reply_data(message_id: &str, data: Element) -> Element {
    reply_envelope(message_id).with_child(data)
}

/// `<rpc-reply>` carrying one `<rpc-error>`
pub fn reply_error(message_id: Option<&str>, error: &RpcErrorInfo) -> Element {
    let mut reply = Element::new("rpc-reply").with_namespace(BASE_NAMESPACE);
    if let Some(id) = message_id {
        reply.set_attr("message-id", id);
    }
    reply.with_child(error.to_element())
}

/// `<notification>` wrapping an event element
pub fn notification(event_time: DateTime<FixedOffset>, event: Element) -> Element {
    Element::new("notification")
        .with_namespace(NOTIFICATION_NAMESPACE)
        .with_child(
            Element::new("eventTime")
                .with_text(event_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        )
        .with_child(event)
}

fn reply_envelope(message_id: &str) -> Element {
    Element::new("rpc-reply")
        .with_namespace(BASE_NAMESPACE)
        .with_attr("message-id", message_id)
}
