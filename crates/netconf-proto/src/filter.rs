//! Unchecked subtree filter builder
//!
//! Turns a path-like expression such as
//! `interfaces@urn:ietf:params:xml:ns:yang:ietf-interfaces interface name=eth0`
//! into a single chain of nested elements. Nothing is checked against a YANG
//! model and element names are used as given; the result is a convenience
//! for interactive use and should not be trusted as a validated request.

use crate::{Element, ProtocolError, Result};

/// Build a nested subtree filter from a whitespace-separated expression.
///
/// Each token is `name`, optionally followed by `=text` and then `@namespace`.
/// The namespace is split off first, so `name@ns=text` yields the namespace
/// `ns=text` and no text.
pub fn unchecked_subtree_filter(expression: &str) -> Result<Element> {
    let mut elements = expression
        .split_whitespace()
        .map(parse_token)
        .collect::<Result<Vec<_>>>()?;

    // Fold from the innermost element outwards.
    let Some(mut current) = elements.pop() else {
        return Err(ProtocolError::Parse("empty filter expression".to_string()));
    };
    while let Some(mut parent) = elements.pop() {
        parent.push_child(current);
        current = parent;
    }
    Ok(current)
}

fn parse_token(token: &str) -> Result<Element> {
    let (rest, namespace) = split_once_strict(token, '@')?;
    let (name, text) = split_once_strict(rest, '=')?;

    if name.is_empty() {
        return Err(ProtocolError::Parse(format!(
            "filter token {:?} has no element name",
            token
        )));
    }

    let mut element = Element::new(name);
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        element.text = Some(text.to_string());
    }
    if let Some(namespace) = namespace.filter(|n| !n.is_empty()) {
        element.set_attr("xmlns", namespace);
    }
    Ok(element)
}

fn split_once_strict(token: &str, separator: char) -> Result<(&str, Option<&str>)> {
    match token.split_once(separator) {
        Some((_, tail)) if tail.contains(separator) => Err(ProtocolError::Parse(format!(
            "filter token {:?} has more than one '{}'",
            token, separator
        ))),
        Some((head, tail)) => Ok((head, Some(tail))),
        None => Ok((token, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_chain() {
        let root = unchecked_subtree_filter(
            "interfaces@urn:ietf:params:xml:ns:yang:ietf-interfaces interface name=eth0",
        )
        .unwrap();

        assert_eq!(root.name, "interfaces");
        assert_eq!(
            root.namespace(),
            Some("urn:ietf:params:xml:ns:yang:ietf-interfaces")
        );
        let interface = root.child("interface").unwrap();
        let name = interface.child("name").unwrap();
        assert_eq!(name.text.as_deref(), Some("eth0"));
        assert!(name.children.is_empty());
    }

    #[test]
    fn test_text_and_namespace_on_one_token() {
        let root = unchecked_subtree_filter("system hostname=edge1@urn:example").unwrap();
        let hostname = root.child("hostname").unwrap();
        assert_eq!(hostname.text.as_deref(), Some("edge1"));
        assert_eq!(hostname.attr("xmlns"), Some("urn:example"));
    }

    #[test]
    fn test_single_token() {
        let root = unchecked_subtree_filter("  system  ").unwrap();
        assert_eq!(root.to_xml(), "<system/>");
    }

    #[test]
    fn test_rejected_expressions() {
        for expression in ["", "   ", "=value", "a@x@y", "a b=c=d"] {
            assert!(
                matches!(unchecked_subtree_filter(expression), Err(ProtocolError::Parse(_))),
                "expression {:?}",
                expression
            );
        }
    }
}
