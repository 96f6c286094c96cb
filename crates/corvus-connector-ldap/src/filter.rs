//! LDAP filter composition
//!
//! Value escaping per RFC 4515 and the range-bound rewriting used by the
//! chunked retrieval strategy. The protocol has no strict greater-than
//! match, so the advancing bound is expressed as `>=` combined with an
//! exclusion of the boundary value itself.

/// Escape special characters in LDAP filter values (RFC 4515).
///
/// Characters that must be escaped: `* ( ) \` and NUL.
pub fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Compose a filter restricted to entries whose `attribute` is strictly
/// greater than `cursor`.
///
/// The cursor value is escaped before interpolation.
pub fn range_bound(filter: &str, attribute: &str, cursor: &str) -> String {
    let escaped = escape_value(cursor);
    format!(
        "(&{}({}>={})(!({}={})))",
        filter, attribute, escaped, attribute, escaped
    )
}

/// Wrap a bare attribute=value style expression in parentheses if the
/// caller left them off. Filters arriving from configuration are used
/// verbatim otherwise.
pub fn normalize(filter: &str) -> String {
    let trimmed = filter.trim();
    if trimmed.starts_with('(') {
        trimmed.to_string()
    } else {
        format!("({trimmed})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_value() {
        assert_eq!(escape_value("John Doe"), "John Doe");
    }

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_value("a*b"), "a\\2ab");
        assert_eq!(escape_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_value("a\\b"), "a\\5cb");
        assert_eq!(escape_value("a\0b"), "a\\00b");
    }

    #[test]
    fn test_range_bound_composition() {
        let composed = range_bound("(objectClass=inetOrgPerson)", "uid", "jdoe");
        assert_eq!(
            composed,
            "(&(objectClass=inetOrgPerson)(uid>=jdoe)(!(uid=jdoe)))"
        );
    }

    #[test]
    fn test_range_bound_escapes_cursor() {
        let composed = range_bound("(objectClass=person)", "uid", "a*c");
        assert!(composed.contains("(uid>=a\\2ac)"));
        assert!(composed.contains("(!(uid=a\\2ac))"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("(cn=x)"), "(cn=x)");
        assert_eq!(normalize("cn=x"), "(cn=x)");
        assert_eq!(normalize("  (objectClass=*)  "), "(objectClass=*)");
    }
}
