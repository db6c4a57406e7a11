//! Device profiles
//!
//! Vendor differences are a handful of parameters rather than behaviour:
//! extra hello capabilities, namespace prefixes declared on every `<rpc>`,
//! and whether chunked framing may be used at all.

use crate::{NetconfError, Result};
use netconf_proto::capability::{BASE_1_0, BASE_1_1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known device families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Default,
    Junos,
    Nexus,
    Huawei,
    Alu,
}

/// Parameters a profile overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileParams {
    /// Advertised in the client hello after the base capabilities
    pub extra_capabilities: &'static [&'static str],

    /// `(prefix, namespace)` pairs declared on the `<rpc>` envelope
    pub namespaces: &'static [(&'static str, &'static str)],

    /// Never negotiate base:1.1, even if the device offers it
    pub force_base_1_0: bool,
}

const DEFAULT_PARAMS: ProfileParams = ProfileParams {
    extra_capabilities: &[],
    namespaces: &[],
    force_base_1_0: false,
};

impl DeviceProfile {
    pub const ALL: [DeviceProfile; 5] = [
        DeviceProfile::Default,
        DeviceProfile::Junos,
        DeviceProfile::Nexus,
        DeviceProfile::Huawei,
        DeviceProfile::Alu,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceProfile::Default => "default",
            DeviceProfile::Junos => "junos",
            DeviceProfile::Nexus => "nexus",
            DeviceProfile::Huawei => "huawei",
            DeviceProfile::Alu => "alu",
        }
    }

    pub fn params(&self) -> ProfileParams {
        match self {
            DeviceProfile::Default => DEFAULT_PARAMS,
            DeviceProfile::Junos => ProfileParams {
                namespaces: &[("junos", "http://xml.juniper.net/junos/*/junos")],
                ..DEFAULT_PARAMS
            },
            DeviceProfile::Nexus => ProfileParams {
                extra_capabilities: &["urn:ietf:params:xml:ns:netconf:base:1.0"],
                namespaces: &[
                    ("nxos", "http://www.cisco.com/nxos:1.0"),
                    ("if", "http://www.cisco.com/nxos:1.0:if_manager"),
                ],
                force_base_1_0: false,
            },
            DeviceProfile::Huawei => ProfileParams {
                extra_capabilities: &[
                    "http://www.huawei.com/netconf/capability/base/1.0",
                    "http://www.huawei.com/netconf/capability/execute-cli/1.0",
                ],
                ..DEFAULT_PARAMS
            },
            DeviceProfile::Alu => ProfileParams {
                force_base_1_0: true,
                ..DEFAULT_PARAMS
            },
        }
    }

    /// Capabilities for the client hello
    pub fn client_capabilities(&self) -> Vec<String> {
        let params = self.params();
        let mut capabilities = vec![BASE_1_0.to_string()];
        if !params.force_base_1_0 {
            capabilities.push(BASE_1_1.to_string());
        }
        capabilities.extend(params.extra_capabilities.iter().map(|c| c.to_string()));
        capabilities
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceProfile {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(DeviceProfile::Default),
            "junos" | "juniper" => Ok(DeviceProfile::Junos),
            "nexus" | "nxos" => Ok(DeviceProfile::Nexus),
            "huawei" => Ok(DeviceProfile::Huawei),
            "alu" => Ok(DeviceProfile::Alu),
            other => Err(NetconfError::Config(format!(
                "unknown device profile {:?} (expected one of: default, junos, nexus, huawei, alu)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_offers_both_bases() {
        let caps = DeviceProfile::Default.client_capabilities();
        assert_eq!(caps, vec![BASE_1_0.to_string(), BASE_1_1.to_string()]);
        assert!(DeviceProfile::Default.params().namespaces.is_empty());
    }

    #[test]
    fn test_forced_base_1_0() {
        let caps = DeviceProfile::Alu.client_capabilities();
        assert_eq!(caps, vec![BASE_1_0.to_string()]);
    }

    #[test]
    fn test_nexus_namespaces() {
        let params = DeviceProfile::Nexus.params();
        assert!(params
            .namespaces
            .contains(&("nxos", "http://www.cisco.com/nxos:1.0")));
    }

    #[test]
    fn test_from_str() {
        for profile in DeviceProfile::ALL {
            assert_eq!(profile.name().parse::<DeviceProfile>().unwrap(), profile);
        }
        assert_eq!("NXOS".parse::<DeviceProfile>().unwrap(), DeviceProfile::Nexus);
        assert!("ios".parse::<DeviceProfile>().is_err());
    }
}
