// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles provider names and `owner/repo` repository references.

use serde::Deserialize;

use crate::types::CloudProvider;

/// Accepts provider names in any case (`AWS`, `aws`, `Aws`).
pub fn deserialize_provider<'de, D>(deserializer: D) -> Result<CloudProvider, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

pub fn deserialize_repo<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_repo(&s).map_err(serde::de::Error::custom)
}

/// Validate a GitHub `owner/repo` reference, tolerating a full URL.
pub fn parse_repo(s: &str) -> Result<String, String> {
    let trimmed = s
        .trim()
        .trim_start_matches("https://github.com/")
        .trim_end_matches(".git")
        .trim_matches('/');

    match trimmed.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(trimmed.to_string())
        }
        _ => Err(format!("repository must be 'owner/repo', got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_accepts_short_and_url_forms() {
        assert_eq!(parse_repo("acme/shop").unwrap(), "acme/shop");
        assert_eq!(
            parse_repo("https://github.com/acme/shop.git").unwrap(),
            "acme/shop"
        );
    }

    #[test]
    fn repo_rejects_missing_owner() {
        assert!(parse_repo("shop").is_err());
        assert!(parse_repo("/shop").is_err());
        assert!(parse_repo("a/b/c").is_err());
    }
}
