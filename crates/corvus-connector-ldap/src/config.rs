//! LDAP harvester configuration
//!
//! Connection settings for the directory server and the per-run harvest
//! request handed in by orchestration.

use serde::{Deserialize, Serialize};

use corvus_connector::error::{HarvestError, HarvestResult};

/// Configuration for the LDAP connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password (stored encrypted upstream).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Default search base when a harvest request does not carry one.
    pub base_dn: String,

    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("base_dn", &self.base_dn)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connection_timeout_secs() -> u64 {
    30
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            bind_dn: bind_dn.into(),
            bind_password: None,
            base_dn: base_dn.into(),
            connection_timeout_secs: default_connection_timeout_secs(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS) and switch to the LDAPS port.
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Validate the connection configuration.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.host.is_empty() {
            return Err(HarvestError::invalid_config("host is required"));
        }
        if self.base_dn.is_empty() {
            return Err(HarvestError::invalid_config("base_dn is required"));
        }
        if self.bind_dn.is_empty() {
            return Err(HarvestError::invalid_config("bind_dn is required"));
        }
        if self.use_ssl && self.use_starttls {
            return Err(HarvestError::invalid_config(
                "cannot use both SSL and STARTTLS",
            ));
        }
        Ok(())
    }

    /// Return a copy safe for logging and API responses.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}

fn default_chunk_size() -> u32 {
    500
}

fn default_safety_chunk_limit() -> u32 {
    10_000
}

fn default_id_attribute() -> String {
    "entryUUID".to_string()
}

/// A single harvest invocation from orchestration.
///
/// Immutable once the harvest begins. The chunked retrieval strategy
/// rewrites its filter internally per chunk, but this request is never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    /// Search base DN.
    pub base: String,

    /// LDAP filter selecting the record set to enumerate.
    pub filter: String,

    /// Attributes to harvest. Empty means all user attributes.
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Unique, totally ordered attribute used both as the entry identifier
    /// and as the sort key for range chunking.
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Start range-chunked enumeration strictly after this id value
    /// instead of at the beginning of the result set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,

    /// Entries per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Hard ceiling on search round trips per harvest. Exceeding it aborts
    /// the run; it exists to catch misconfiguration, not data volume.
    #[serde(default = "default_safety_chunk_limit")]
    pub safety_chunk_limit: u32,

    /// Attributes whose values determine the content hash. Volatile
    /// operational attributes are excluded by leaving them out of this
    /// list.
    pub significant_attributes: Vec<String>,

    /// Classify every entry against an empty index instead of the
    /// persisted one.
    #[serde(default)]
    pub full_resync: bool,

    /// The server's cumulative result cap, when known in advance. Used
    /// only to reject chunk sizes that would trip the cap on the first
    /// page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_result_cap: Option<u32>,

    /// Stop the run after this many entries have been seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u64>,

    /// Stop the run after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,
}

impl HarvestRequest {
    /// Create a request with defaults for everything but the scope.
    pub fn new(
        base: impl Into<String>,
        filter: impl Into<String>,
        significant_attributes: Vec<String>,
    ) -> Self {
        Self {
            base: base.into(),
            filter: filter.into(),
            attributes: Vec::new(),
            id_attribute: default_id_attribute(),
            start_cursor: None,
            chunk_size: default_chunk_size(),
            safety_chunk_limit: default_safety_chunk_limit(),
            significant_attributes,
            full_resync: false,
            known_result_cap: None,
            max_records: None,
            max_duration_secs: None,
        }
    }

    /// Set the entry id / sort attribute.
    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    /// Set the starting cursor for range-chunked enumeration.
    pub fn with_start_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.start_cursor = Some(cursor.into());
        self
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the safety round-trip ceiling.
    #[must_use]
    pub fn with_safety_chunk_limit(mut self, limit: u32) -> Self {
        self.safety_chunk_limit = limit;
        self
    }

    /// Request a full resync.
    #[must_use]
    pub fn with_full_resync(mut self) -> Self {
        self.full_resync = true;
        self
    }

    /// The attribute list actually sent to the server: the requested
    /// attributes plus the id attribute and every significant attribute,
    /// so classification never misses a field the hash depends on.
    #[must_use]
    pub fn search_attributes(&self) -> Vec<String> {
        let mut attrs = if self.attributes.is_empty() {
            vec!["*".to_string()]
        } else {
            self.attributes.clone()
        };
        let required = self
            .significant_attributes
            .iter()
            .chain(std::iter::once(&self.id_attribute));
        for extra in required {
            if !attrs.iter().any(|a| a.eq_ignore_ascii_case(extra)) {
                attrs.push(extra.clone());
            }
        }
        attrs
    }

    /// Validate the request.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.base.is_empty() {
            return Err(HarvestError::invalid_config("base is required"));
        }
        if self.filter.trim().is_empty() {
            return Err(HarvestError::invalid_config("filter is required"));
        }
        if self.id_attribute.is_empty() {
            return Err(HarvestError::invalid_config("id_attribute is required"));
        }
        if self.chunk_size == 0 {
            return Err(HarvestError::invalid_config("chunk_size must be at least 1"));
        }
        if self.safety_chunk_limit == 0 {
            return Err(HarvestError::invalid_config(
                "safety_chunk_limit must be at least 1",
            ));
        }
        if self.significant_attributes.is_empty() {
            return Err(HarvestError::invalid_config(
                "at least one significant attribute is required",
            ));
        }
        if let Some(cap) = self.known_result_cap {
            if self.chunk_size > cap {
                return Err(HarvestError::invalid_config(format!(
                    "chunk_size {} exceeds the known server result cap {}",
                    self.chunk_size, cap
                )));
            }
        }
        Ok(())
    }
}
