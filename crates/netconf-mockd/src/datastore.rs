//! Canned device data
//!
//! Datastores are fixed at startup. Reads may be narrowed with a subtree
//! filter; the matching follows the RFC 6241 rules for containment,
//! selection and content-match nodes, without attribute matching.

use crate::config::{parse_fragment, ServerConfig};
use crate::{Result, ServerError};
use netconf_proto::messages::BASE_NAMESPACE;
use netconf_proto::Element;
use std::collections::BTreeMap;

/// Everything a simulated device can report
#[derive(Debug, Clone)]
pub struct DeviceData {
    running: Vec<Element>,
    candidate: Option<Vec<Element>>,
    schemas: BTreeMap<String, String>,
    notifications: Vec<Element>,
}

impl DeviceData {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let candidate = match &config.candidate {
            Some(xml) => Some(parse_fragment("candidate", xml)?),
            None => None,
        };
        let notifications = config
            .notifications
            .iter()
            .map(|xml| {
                Element::parse(xml)
                    .map_err(|e| ServerError::Config(format!("invalid notification: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            running: parse_fragment("running", &config.running)?,
            candidate,
            schemas: config.schemas.clone(),
            notifications,
        })
    }

    /// Datastore content by name (`running`, `candidate`)
    pub fn datastore(&self, name: &str) -> Option<&[Element]> {
        match name {
            "running" => Some(&self.running),
            "candidate" => self.candidate.as_deref(),
            _ => None,
        }
    }

    pub fn schema(&self, identifier: &str) -> Option<&str> {
        self.schemas.get(identifier).map(String::as_str)
    }

    /// Events replayed to each new subscriber
    pub fn replay(&self) -> &[Element] {
        &self.notifications
    }
}

/// Build a `<data>` reply element from datastore content and an optional `<filter>`
pub fn select(content: &[Element], filter: Option<&Element>) -> Element {
    let mut data = Element::new("data").with_namespace(BASE_NAMESPACE);
    match filter {
        None => data.children = content.to_vec(),
        Some(filter) => {
            for node in content {
                if let Some(selected) = filter
                    .children
                    .iter()
                    .find_map(|selector| filter_node(node, selector))
                {
                    data.push_child(selected);
                }
            }
        }
    }
    data
}

fn filter_node(node: &Element, selector: &Element) -> Option<Element> {
    if node.local_name() != selector.local_name() {
        return None;
    }
    if let (Some(want), Some(have)) = (selector.namespace(), node.namespace()) {
        if want != have {
            return None;
        }
    }

    if let Some(text) = content_text(selector) {
        return (node.text_content().trim() == text).then(|| node.clone());
    }
    if selector.children.is_empty() {
        return Some(node.clone());
    }

    let (content, selection): (Vec<&Element>, Vec<&Element>) = selector
        .children
        .iter()
        .partition(|c| content_text(c).is_some());

    // Every content-match node must be satisfied by some child.
    let satisfied = content
        .iter()
        .all(|want| node.children.iter().any(|c| filter_node(c, want).is_some()));
    if !satisfied {
        return None;
    }
    if selection.is_empty() {
        return Some(node.clone());
    }

    let mut result = Element {
        name: node.name.clone(),
        attributes: node.attributes.clone(),
        children: Vec::new(),
        text: None,
    };
    for child in &node.children {
        if content.iter().any(|want| filter_node(child, want).is_some()) {
            result.push_child(child.clone());
        } else if let Some(selected) = selection.iter().find_map(|want| filter_node(child, want)) {
            result.push_child(selected);
        }
    }

    let selected_any = result.children.len() > content.len();
    selected_any.then_some(result)
}

fn content_text(selector: &Element) -> Option<&str> {
    if !selector.children.is_empty() {
        return None;
    }
    selector
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACES: &str = r#"<interfaces xmlns="urn:x"><interface><name>eth0</name><mtu>1500</mtu></interface><interface><name>eth1</name><mtu>9000</mtu></interface></interfaces><system xmlns="urn:y"><hostname>r1</hostname></system>"#;

    fn content() -> Vec<Element> {
        parse_fragment("running", INTERFACES).unwrap()
    }

    fn filter(xml: &str) -> Element {
        Element::parse(&format!("<filter type=\"subtree\">{}</filter>", xml)).unwrap()
    }

    #[test]
    fn test_no_filter_returns_everything() {
        let data = select(&content(), None);
        assert_eq!(data.children.len(), 2);
        assert_eq!(data.namespace(), Some(BASE_NAMESPACE));
    }

    #[test]
    fn test_containment_selects_top_level() {
        let data = select(&content(), Some(&filter(r#"<system xmlns="urn:y"/>"#)));
        assert_eq!(data.children.len(), 1);
        assert_eq!(data.children[0].child_text("hostname"), Some("r1"));
    }

    #[test]
    fn test_namespace_mismatch() {
        let data = select(&content(), Some(&filter(r#"<system xmlns="urn:other"/>"#)));
        assert!(data.children.is_empty());
    }

    #[test]
    fn test_content_match_with_selection() {
        let data = select(
            &content(),
            Some(&filter(
                "<interfaces><interface><name>eth1</name><mtu/></interface></interfaces>",
            )),
        );
        let interfaces = &data.children[0];
        assert_eq!(interfaces.children.len(), 1);
        let interface = &interfaces.children[0];
        assert_eq!(interface.child_text("name"), Some("eth1"));
        assert_eq!(interface.child_text("mtu"), Some("9000"));
    }

    #[test]
    fn test_content_match_only_returns_whole_entry() {
        let data = select(
            &content(),
            Some(&filter("<interfaces><interface><name>eth0</name></interface></interfaces>")),
        );
        let interface = &data.children[0].children[0];
        assert_eq!(interface.children.len(), 2);
    }

    #[test]
    fn test_data_from_config() {
        let mut schemas = BTreeMap::new();
        schemas.insert("acme".to_string(), "module acme { }".to_string());
        let config = ServerConfig {
            running: INTERFACES.to_string(),
            schemas,
            notifications: vec!["<tick/>".to_string()],
            ..Default::default()
        };

        let data = DeviceData::from_config(&config).unwrap();
        assert_eq!(data.datastore("running").unwrap().len(), 2);
        assert!(data.datastore("candidate").is_none());
        assert!(data.datastore("startup").is_none());
        assert_eq!(data.schema("acme"), Some("module acme { }"));
        assert_eq!(data.replay().len(), 1);
    }
}
