// ABOUTME: Cloud provider selection and instance sizing.
// ABOUTME: Maps cpu/memory descriptors onto provider-native instance types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown cloud provider: {0} (expected aws, gcp or azure)")]
pub struct ParseProviderError(String);

/// Cloud provider hosting the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }

    /// Instance type used when the sizing doesn't name one we recognise.
    pub fn default_instance_type(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "t2.micro",
            CloudProvider::Gcp => "e2-micro",
            CloudProvider::Azure => "Standard_B1s",
        }
    }

    /// Resolve the provider-native instance type for a sizing request.
    ///
    /// A cpu descriptor that already looks like a native type is used verbatim.
    /// The legacy numeric descriptors `0.5`, `1` and `2` map onto the
    /// micro/small/medium tiers.
    pub fn instance_type_for(&self, sizing: &Sizing) -> String {
        let cpu = sizing.cpu.trim();

        if self.is_native_type(cpu) {
            return cpu.to_string();
        }

        let mapped = match (self, cpu) {
            (CloudProvider::Aws, "0.5") => "t2.micro",
            (CloudProvider::Aws, "1") => "t2.small",
            (CloudProvider::Aws, "2") => "t2.medium",
            (CloudProvider::Gcp, "0.5") => "e2-micro",
            (CloudProvider::Gcp, "1") => "e2-small",
            (CloudProvider::Gcp, "2") => "e2-medium",
            (CloudProvider::Azure, "0.5") => "Standard_B1ls",
            (CloudProvider::Azure, "1") => "Standard_B1s",
            (CloudProvider::Azure, "2") => "Standard_B2s",
            _ => self.default_instance_type(),
        };
        mapped.to_string()
    }

    fn is_native_type(&self, cpu: &str) -> bool {
        match self {
            CloudProvider::Aws => {
                cpu.contains('.') && cpu.starts_with(['t', 'm', 'c'])
            }
            CloudProvider::Gcp => cpu.starts_with("e2-") || cpu.starts_with("n1-"),
            CloudProvider::Azure => cpu.starts_with("Standard_"),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "gcp" => Ok(CloudProvider::Gcp),
            "azure" => Ok(CloudProvider::Azure),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// Requested compute size. Descriptors are opaque strings as entered by the
/// user: either a native instance type or a legacy numeric vCPU count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sizing {
    pub cpu: String,
    pub memory: String,
}

impl Sizing {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_types_pass_through() {
        let sizing = Sizing::new("m5.large", "8GB");
        assert_eq!(CloudProvider::Aws.instance_type_for(&sizing), "m5.large");

        let sizing = Sizing::new("n1-standard-2", "7.5GB");
        assert_eq!(CloudProvider::Gcp.instance_type_for(&sizing), "n1-standard-2");

        let sizing = Sizing::new("Standard_D2s_v3", "8GB");
        assert_eq!(
            CloudProvider::Azure.instance_type_for(&sizing),
            "Standard_D2s_v3"
        );
    }

    #[test]
    fn legacy_numeric_sizes_map_to_tiers() {
        let sizing = Sizing::new("1", "2GB");
        assert_eq!(CloudProvider::Aws.instance_type_for(&sizing), "t2.small");
        assert_eq!(CloudProvider::Gcp.instance_type_for(&sizing), "e2-small");
        assert_eq!(CloudProvider::Azure.instance_type_for(&sizing), "Standard_B1s");

        let sizing = Sizing::new("2", "4GB");
        assert_eq!(CloudProvider::Aws.instance_type_for(&sizing), "t2.medium");
    }

    #[test]
    fn unknown_sizes_fall_back_to_provider_default() {
        let sizing = Sizing::new("16", "64GB");
        assert_eq!(CloudProvider::Aws.instance_type_for(&sizing), "t2.micro");
        assert_eq!(CloudProvider::Gcp.instance_type_for(&sizing), "e2-micro");
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("AWS".parse::<CloudProvider>().unwrap(), CloudProvider::Aws);
        assert_eq!(" gcp ".parse::<CloudProvider>().unwrap(), CloudProvider::Gcp);
        assert!("digitalocean".parse::<CloudProvider>().is_err());
    }
}
