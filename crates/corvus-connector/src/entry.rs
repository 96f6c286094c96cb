//! Directory entry model
//!
//! Entries are attribute maps with an explicit polymorphic value type:
//! a single string, a list of strings, or absent (not in the map).
//! Multi-valued attributes are first-class and never flattened.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value for a directory attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single string value.
    Single(String),
    /// Multiple string values, in server return order.
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Get as a string if this is a single value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(s) => Some(s),
            AttributeValue::Multi(_) => None,
        }
    }

    /// Get the first value, regardless of arity.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(s) => Some(s),
            AttributeValue::Multi(v) => v.first().map(String::as_str),
        }
    }

    /// Iterate over all values, regardless of arity.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            AttributeValue::Single(s) => std::slice::from_ref(s).iter(),
            AttributeValue::Multi(v) => v.iter(),
        }
        .map(String::as_str)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            AttributeValue::Single(_) => 1,
            AttributeValue::Multi(v) => v.len(),
        }
    }

    /// Whether there are no values. Only possible for an empty `Multi`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if this is multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Multi(_))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Single(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Single(s.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Multi(values)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        AttributeValue::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// A single entry returned by a directory search.
///
/// Owned transiently by the chunk currently in flight; the engine never
/// retains entries after the chunk they arrived in has been processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Value of the configured unique id attribute. Empty when the entry
    /// did not carry that attribute; such entries are counted as failed
    /// by the differ.
    id: String,

    /// Attribute name → value(s). Keyed deterministically so two entries
    /// with the same content compare and serialize identically.
    attributes: BTreeMap<String, AttributeValue>,
}

impl DirectoryEntry {
    /// Create a new entry with the given unique identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Get the unique identifier value.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    /// Get all values of an attribute.
    pub fn get_all(&self, name: &str) -> Option<Vec<&str>> {
        self.get(name).map(|v| v.iter().collect())
    }

    /// Check if an attribute is present.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the entry has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_access() {
        let entry = DirectoryEntry::new("u1")
            .with("cn", "Ada Lovelace")
            .with("mail", "ada@example.com");

        assert_eq!(entry.id(), "u1");
        assert_eq!(entry.get_str("cn"), Some("Ada Lovelace"));
        assert!(!entry.has("telephoneNumber"));
    }

    #[test]
    fn test_multi_value_access() {
        let entry = DirectoryEntry::new("u2").with("memberOf", vec!["admins", "users"]);

        let value = entry.get("memberOf").unwrap();
        assert!(value.is_multi_valued());
        assert_eq!(value.len(), 2);
        assert_eq!(entry.get_all("memberOf"), Some(vec!["admins", "users"]));
        // A multi-valued attribute is not a single string
        assert_eq!(entry.get_str("memberOf"), None);
    }

    #[test]
    fn test_value_first_and_iter() {
        let single = AttributeValue::from("one");
        assert_eq!(single.first(), Some("one"));
        assert_eq!(single.iter().count(), 1);

        let multi = AttributeValue::from(vec!["a", "b", "c"]);
        assert_eq!(multi.first(), Some("a"));
        assert_eq!(multi.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_absent_vs_empty() {
        let entry = DirectoryEntry::new("u3").with("tags", Vec::<String>::new());
        // Present but empty is distinct from absent
        assert!(entry.has("tags"));
        assert!(entry.get("tags").unwrap().is_empty());
        assert!(!entry.has("missing"));
    }

    #[test]
    fn test_attributes_are_key_ordered() {
        let entry = DirectoryEntry::new("u4")
            .with("zz", "last")
            .with("aa", "first")
            .with("mm", "middle");

        let names: Vec<&str> = entry.names().collect();
        assert_eq!(names, vec!["aa", "mm", "zz"]);
    }

    #[test]
    fn test_entry_equality_ignores_insertion_order() {
        let a = DirectoryEntry::new("u5").with("x", "1").with("y", "2");
        let b = DirectoryEntry::new("u5").with("y", "2").with("x", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_roundtrip() {
        let entry = DirectoryEntry::new("u6")
            .with("cn", "Grace Hopper")
            .with("memberOf", vec!["staff", "admins"]);

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: DirectoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
