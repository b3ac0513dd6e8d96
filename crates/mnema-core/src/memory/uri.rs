//! URI path grammar
//!
//! Memories can be anchored at stable URIs of the form
//! `domain://free/form/path`. The domain must lie in an allowed set;
//! callers may widen the set at path-creation time.

use std::sync::OnceLock;

use regex::Regex;

/// Domains accepted when the caller supplies no wider set.
pub const DEFAULT_DOMAINS: &[&str] = &["core", "emotion", "knowledge", "event", "system"];

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z]+)://(.+)$").expect("static uri pattern"))
}

/// Split a URI into `(domain, path)`, validating the grammar.
///
/// Returns `None` for anything that does not match `^([a-z]+)://(.+)$`.
pub fn parse_uri(uri: &str) -> Option<(&str, &str)> {
    let captures = uri_pattern().captures(uri)?;
    let domain = captures.get(1)?.as_str();
    let path = captures.get(2)?.as_str();
    Some((domain, path))
}

/// Validate a URI against an allowed-domain set.
pub fn validate_uri<'a>(uri: &'a str, allowed: &[&str]) -> Result<(&'a str, &'a str), String> {
    let (domain, path) =
        parse_uri(uri).ok_or_else(|| format!("Malformed URI '{}': expected domain://path", uri))?;
    if !allowed.contains(&domain) {
        return Err(format!(
            "Unknown domain '{}' in URI '{}' (allowed: {})",
            domain,
            uri,
            allowed.join(", ")
        ));
    }
    Ok((domain, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            parse_uri("core://agent/identity"),
            Some(("core", "agent/identity"))
        );
        assert_eq!(parse_uri("knowledge://rust"), Some(("knowledge", "rust")));
        assert!(parse_uri("no-scheme").is_none());
        assert!(parse_uri("CORE://upper").is_none());
        assert!(parse_uri("core://").is_none());
    }

    #[test]
    fn test_validate_domain() {
        assert!(validate_uri("core://agent/identity", DEFAULT_DOMAINS).is_ok());
        assert!(validate_uri("bogus://x", DEFAULT_DOMAINS).is_err());
        // A caller-supplied wider set admits extra domains
        assert!(validate_uri("project://x", &["project"]).is_ok());
    }
}
