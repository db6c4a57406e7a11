//! Capability URIs (RFC 3986) with strict `key=value&...` query parsing

use crate::{ProtocolError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// NETCONF base protocol, end-of-message framing
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// NETCONF base protocol, chunked framing
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// RFC 5277 event notifications
pub const NOTIFICATION_1_0: &str = "urn:ietf:params:netconf:capability:notification:1.0";

/// RFC 5277 interleave (RPCs allowed while subscribed)
pub const INTERLEAVE_1_0: &str = "urn:ietf:params:netconf:capability:interleave:1.0";

/// Candidate configuration datastore
pub const CANDIDATE_1_0: &str = "urn:ietf:params:netconf:capability:candidate:1.0";

/// RFC 6022 monitoring (provides `<get-schema>`)
pub const MONITORING: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

/// A parsed capability URI
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capability {
    uri: String,
    scheme: String,
    authority: Option<String>,
    path: String,
    query: BTreeMap<String, String>,
    fragment: Option<String>,
}

impl Capability {
    /// Parse a capability URI.
    ///
    /// Every query token must be `key=value`; a repeated key fails with
    /// [`ProtocolError::DuplicateQueryKey`] and any other malformed token
    /// fails with [`ProtocolError::Parse`].
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        let url = Url::parse(trimmed)
            .map_err(|e| ProtocolError::Parse(format!("invalid capability URI {:?}: {}", trimmed, e)))?;

        let authority = if url.has_authority() {
            raw_authority(trimmed)
        } else {
            None
        };

        let query = match url.query() {
            Some(raw) => parse_query(trimmed, raw)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            uri: trimmed.to_string(),
            scheme: url.scheme().to_string(),
            authority,
            path: url.path().to_string(),
            query,
            fragment: url.fragment().map(str::to_string),
        })
    }

    /// The URI as advertised
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// URI without query or fragment, used for capability matching
    pub fn base_uri(&self) -> &str {
        let end = self
            .uri
            .find(|c| c == '?' || c == '#')
            .unwrap_or(self.uri.len());
        &self.uri[..end]
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Query parameters
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Single query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// YANG module name from the `module` parameter
    pub fn module(&self) -> Option<&str> {
        self.param("module")
    }

    /// YANG module revision from the `revision` parameter
    pub fn revision(&self) -> Option<&str> {
        self.param("revision")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl FromStr for Capability {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Authority as written in the URI, between `//` and the next `/`, `?` or `#`
fn raw_authority(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("//")?;
    let end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    Some(&rest[..end])
        .filter(|authority| !authority.is_empty())
        .map(str::to_string)
}

fn parse_query(uri: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    let mut query = BTreeMap::new();
    if raw.is_empty() {
        return Ok(query);
    }

    for token in raw.split('&') {
        let (key, value) = token.split_once('=').ok_or_else(|| {
            ProtocolError::Parse(format!("query token {:?} in {} has no '='", token, uri))
        })?;
        if key.is_empty() {
            return Err(ProtocolError::Parse(format!(
                "query token {:?} in {} has an empty key",
                token, uri
            )));
        }
        if value.contains('=') {
            return Err(ProtocolError::Parse(format!(
                "query token {:?} in {} has more than one '='",
                token, uri
            )));
        }
        if query.insert(key.to_string(), value.to_string()).is_some() {
            return Err(ProtocolError::DuplicateQueryKey {
                uri: uri.to_string(),
                key: key.to_string(),
            });
        }
    }

    Ok(query)
}
