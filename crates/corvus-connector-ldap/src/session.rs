//! Live LDAP session
//!
//! Implements [`DirectorySession`] over `ldap3`: one bound connection,
//! one search at a time, with explicit handling of the paged-results
//! control and of the result codes that drive strategy selection.

use async_trait::async_trait;
use base64::Engine;
use ldap3::controls::{Control, ControlType, MakeCritical, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions, SearchResult};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use corvus_connector::entry::{AttributeValue, DirectoryEntry};
use corvus_connector::error::{HarvestError, HarvestResult};
use corvus_connector::traits::{ChunkPage, ChunkQuery, DirectorySession, PageControl};

use crate::config::LdapConfig;

// LDAP result codes the harvester cares about (RFC 4511).
const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_ADMIN_LIMIT_EXCEEDED: u32 = 11;
const RC_UNAVAILABLE_CRITICAL_EXTENSION: u32 = 12;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// LDAP-backed directory session.
pub struct LdapSession {
    /// Connection configuration.
    config: LdapConfig,

    /// Current connection, established lazily and replaced on reconnect.
    ldap: Option<Ldap>,
}

impl LdapSession {
    /// Create a session without connecting yet.
    pub fn new(config: LdapConfig) -> HarvestResult<Self> {
        config.validate()?;
        Ok(Self { config, ldap: None })
    }

    /// Create a session and establish the connection immediately.
    pub async fn connect(config: LdapConfig) -> HarvestResult<Self> {
        let mut session = Self::new(config)?;
        session.ensure_connected().await?;
        Ok(session)
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    async fn ensure_connected(&mut self) -> HarvestResult<()> {
        if self.ldap.is_none() {
            self.ldap = Some(self.create_connection().await?);
        }
        Ok(())
    }

    /// Establish a new connection and bind.
    async fn create_connection(&self) -> HarvestResult<Ldap> {
        let url = self.config.url();
        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(std::time::Duration::from_secs(
                self.config.connection_timeout_secs,
            ))
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                HarvestError::connection_failed_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap.simple_bind(bind_dn, bind_password).await.map_err(|e| {
            HarvestError::connection_failed_with_source(
                format!("LDAP bind failed for {bind_dn}"),
                e,
            )
        })?;

        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(HarvestError::AuthenticationFailed);
        }
        if result.rc != RC_SUCCESS {
            return Err(HarvestError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Map a result code from a paged search.
    ///
    /// Size/admin limit codes here mean the server refused to continue the
    /// paged search: the cumulative-cap signal, distinct from an ordinary
    /// end of results (which is signalled by an empty continuation cookie).
    fn check_paged_result(rc: u32, text: &str) -> HarvestResult<()> {
        match rc {
            RC_SUCCESS => Ok(()),
            RC_SIZE_LIMIT_EXCEEDED | RC_ADMIN_LIMIT_EXCEEDED => Err(HarvestError::size_limit(
                format!("server refused further pages (code {rc}): {text}"),
            )),
            RC_UNAVAILABLE_CRITICAL_EXTENSION => Err(HarvestError::paging_unsupported(format!(
                "server rejected the paged-results control: {text}"
            ))),
            RC_INVALID_CREDENTIALS => Err(HarvestError::AuthenticationFailed),
            _ => Err(HarvestError::search_failed(format!(
                "LDAP search failed with code {rc}: {text}"
            ))),
        }
    }

    /// Map a result code from a bounded (size-limited) search.
    ///
    /// A size-limit code with a full chunk means our own limit fired and is
    /// expected. A size-limit code with a short chunk means the server
    /// truncated below the chunk size on its own; surfacing that as the
    /// cap signal rather than end-of-results prevents silent gaps.
    fn check_bounded_result(rc: u32, text: &str, returned: usize, requested: u32) -> HarvestResult<()> {
        match rc {
            RC_SUCCESS => Ok(()),
            RC_SIZE_LIMIT_EXCEEDED | RC_ADMIN_LIMIT_EXCEEDED => {
                if returned >= requested as usize {
                    Ok(())
                } else {
                    Err(HarvestError::size_limit(format!(
                        "server truncated a bounded search to {returned} of {requested} entries (code {rc}): {text}"
                    )))
                }
            }
            RC_INVALID_CREDENTIALS => Err(HarvestError::AuthenticationFailed),
            _ => Err(HarvestError::search_failed(format!(
                "LDAP search failed with code {rc}: {text}"
            ))),
        }
    }
}

/// Look up an attribute by name, falling back to a case-insensitive scan
/// (LDAP attribute names are case-insensitive per RFC 4512).
fn attr_lookup<'a, T>(map: &'a HashMap<String, Vec<T>>, name: &str) -> Option<&'a Vec<T>> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    })
}

/// Convert an `ldap3` search entry into a [`DirectoryEntry`].
///
/// Binary attribute values are encoded as standard base64 so the entry
/// model stays string-valued. The DN is preserved as a regular attribute.
fn convert_entry(entry: SearchEntry, id_attribute: &str) -> DirectoryEntry {
    let SearchEntry {
        dn,
        attrs,
        bin_attrs,
    } = entry;

    let b64 = base64::engine::general_purpose::STANDARD;

    let id = attr_lookup(&attrs, id_attribute)
        .and_then(|values| values.first().cloned())
        .or_else(|| {
            attr_lookup(&bin_attrs, id_attribute)
                .and_then(|values| values.first())
                .map(|bytes| b64.encode(bytes))
        })
        .unwrap_or_default();

    let mut converted = DirectoryEntry::new(id);

    if !dn.is_empty() {
        converted.set("dn", dn);
    }

    for (name, mut values) in attrs {
        match values.len() {
            0 => {}
            1 => converted.set(name, values.remove(0)),
            _ => converted.set(name, AttributeValue::Multi(values)),
        }
    }

    for (name, values) in bin_attrs {
        let mut encoded: Vec<String> = values.iter().map(|bytes| b64.encode(bytes)).collect();
        match encoded.len() {
            0 => {}
            1 => converted.set(name, encoded.remove(0)),
            _ => converted.set(name, AttributeValue::Multi(encoded)),
        }
    }

    converted
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn execute(&mut self, query: &ChunkQuery) -> HarvestResult<ChunkPage> {
        self.ensure_connected().await?;
        let ldap = self
            .ldap
            .as_mut()
            .ok_or_else(|| HarvestError::connection_failed("no live LDAP connection"))?;

        let attrs = query.attributes.clone();

        debug!(
            base = %query.base,
            filter = %query.filter,
            page = ?query.page,
            "Executing LDAP search"
        );

        let (raw_entries, ldap_result, next_cookie) = match &query.page {
            PageControl::Paged {
                size,
                cookie,
                critical,
            } => {
                let control = PagedResults {
                    size: *size as i32,
                    cookie: cookie.clone().unwrap_or_default(),
                };
                let result = if *critical {
                    ldap.with_controls(control.critical())
                        .search(&query.base, Scope::Subtree, &query.filter, attrs)
                        .await
                } else {
                    ldap.with_controls(control)
                        .search(&query.base, Scope::Subtree, &query.filter, attrs)
                        .await
                }
                .map_err(|e| {
                    HarvestError::connection_failed_with_source("LDAP paged search failed", e)
                })?;

                let SearchResult(raw_entries, ldap_result) = result;
                Self::check_paged_result(ldap_result.rc, &ldap_result.text)?;

                let mut next_cookie = None;
                for ctrl in &ldap_result.ctrls {
                    if let Control(Some(ControlType::PagedResults), raw) = ctrl {
                        let response: PagedResults = raw.parse();
                        if !response.cookie.is_empty() {
                            next_cookie = Some(response.cookie);
                        }
                    }
                }

                (raw_entries, ldap_result, next_cookie)
            }
            PageControl::Bounded { size } => {
                let result = ldap
                    .with_search_options(SearchOptions::new().sizelimit(*size as i32))
                    .search(&query.base, Scope::Subtree, &query.filter, attrs)
                    .await
                    .map_err(|e| {
                        HarvestError::connection_failed_with_source("LDAP bounded search failed", e)
                    })?;

                let SearchResult(raw_entries, ldap_result) = result;
                Self::check_bounded_result(
                    ldap_result.rc,
                    &ldap_result.text,
                    raw_entries.len(),
                    *size,
                )?;

                (raw_entries, ldap_result, None)
            }
        };

        let entries: Vec<DirectoryEntry> = raw_entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| convert_entry(entry, &query.id_attribute))
            .collect();

        debug!(
            returned = entries.len(),
            rc = ldap_result.rc,
            has_cookie = next_cookie.is_some(),
            "LDAP search completed"
        );

        Ok(ChunkPage {
            entries,
            cookie: next_cookie,
        })
    }

    async fn reconnect(&mut self) -> HarvestResult<()> {
        if let Some(mut old) = self.ldap.take() {
            if let Err(e) = old.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }
        self.ldap = Some(self.create_connection().await?);
        info!(host = %self.config.host, "LDAP session reconnected");
        Ok(())
    }

    async fn test_connection(&mut self) -> HarvestResult<()> {
        self.ensure_connected().await?;
        let base_dn = self.config.base_dn.clone();
        let ldap = self
            .ldap
            .as_mut()
            .ok_or_else(|| HarvestError::connection_failed("no live LDAP connection"))?;

        let result = ldap
            .search(&base_dn, Scope::Base, "(objectClass=*)", vec!["dn"])
            .await
            .map_err(|e| HarvestError::connection_failed_with_source("test search failed", e))?;

        let SearchResult(entries, ldap_result) = result;
        if ldap_result.rc != RC_SUCCESS {
            return Err(HarvestError::connection_failed(format!(
                "test search failed with code {}: {}",
                ldap_result.rc, ldap_result.text
            )));
        }
        if entries.is_empty() {
            return Err(HarvestError::connection_failed(format!(
                "base DN '{base_dn}' not found or not accessible"
            )));
        }

        info!("LDAP connection test successful");
        Ok(())
    }
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("config", &self.config.redacted())
            .field("connected", &self.ldap.is_some())
            .finish()
    }
}
