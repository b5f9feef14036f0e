//! ID generation and resolution for domain entities.
//!
//! Every entity id has the form `{6-char-hex}-{type}-{slug}`, e.g.
//! `019430-task-add-oauth-login`. The hex prefix comes from a UUIDv7 (so ids
//! sort roughly by creation time); the type tag and slug make ids legible in
//! logs and CLI output without a lookup.

use std::collections::HashMap;

/// Generate an id for `domain_type` (`"project"`, `"epic"`, `"story"`, `"task"`,
/// `"subtask"`, `"session"`, `"milestone"`) from a human-readable `title`.
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{hex_prefix}-{domain_type}")
    } else {
        format!("{hex_prefix}-{domain_type}-{slug}")
    }
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-")
}

/// Type-safe wrapper around an id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainId(String);

impl DomainId {
    pub fn new(domain_type: &str, title: &str) -> Self {
        Self(generate_id(domain_type, title))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain_type(&self) -> Option<&str> {
        self.0.splitn(3, '-').nth(1)
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DomainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DomainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DomainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DomainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Resolves a short/partial reference (a hex prefix, or a prefix of the full
/// id) against a set of known ids, used by the CLI so a user can type
/// `obra task execute 019430` instead of the full slug.
pub struct IdResolver<'a> {
    ids: &'a HashMap<String, String>,
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: &'a HashMap<String, String>) -> Self {
        Self { ids }
    }

    /// Resolve `reference` to exactly one id.
    ///
    /// - `Ok(Some(id))` — exactly one match.
    /// - `Ok(None)` — no matches.
    /// - `Err(candidates)` — ambiguous; candidates listed for the caller to display.
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        if self.ids.contains_key(reference) {
            return Ok(Some(reference.to_string()));
        }
        let matches: Vec<String> = self
            .ids
            .keys()
            .filter(|id| id.starts_with(reference))
            .cloned()
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.into_iter().next().unwrap())),
            _ => Err(matches),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_three_parts() {
        let id = generate_id("task", "Add OAuth Login");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1], "task");
        assert_eq!(parts[2], "add-oauth-login");
    }

    #[test]
    fn slugify_strips_apostrophes_and_punctuation() {
        let id = generate_id("story", "Don't Break CI!!");
        assert!(id.ends_with("dont-break-ci"));
    }

    #[test]
    fn resolver_disambiguates_prefixes() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-add-oauth".to_string(), "Add OAuth".to_string());
        ids.insert("019431-task-add-saml".to_string(), "Add SAML".to_string());
        let resolver = IdResolver::new(&ids);
        assert_eq!(resolver.resolve("019430-task-add-oauth").unwrap(), Some("019430-task-add-oauth".to_string()));
        assert_eq!(resolver.resolve("nope").unwrap(), None);
        assert!(resolver.resolve("0194").is_err());
    }
}
