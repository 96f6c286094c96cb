//! # LDAP Directory Harvester
//!
//! Enumerates large LDAP record sets (tens to hundreds of thousands of
//! entries) under server-enforced cumulative result caps, and streams
//! them chunk-by-chunk through content-hash change detection.
//!
//! Directory servers commonly cap the total number of entries one search
//! may return across paged continuations, which breaks standard
//! cookie-based pagination well before large result sets are exhausted.
//! The harvester works around this with a ladder of retrieval
//! strategies, downgrading one-directionally on protocol signals:
//!
//! 1. **Paged results (critical)**: the server pages the search and must
//!    reject the control if unsupported.
//! 2. **Cookie continuation**: explicit client-managed continuation
//!    cookies.
//! 3. **Range chunking**: independent bounded searches with an advancing
//!    inequality bound on the unique id attribute; one round trip per
//!    chunk, immune to cumulative caps.
//!
//! Each chunk is diffed against the previous run's content hashes and
//! persisted before the next chunk is fetched, so memory stays bounded by
//! one chunk (plus the id→hash index) regardless of result-set size, and
//! at most one chunk of work is ever uncommitted.
//!
//! ## Usage
//!
//! ```ignore
//! use corvus_connector_ldap::{HarvestRequest, HarvestRunner, LdapConfig, LdapSession};
//!
//! let config = LdapConfig::new("ldap.example.com", "dc=example,dc=com", "cn=svc,dc=example,dc=com")
//!     .with_password(password)
//!     .with_ssl();
//! let session = LdapSession::connect(config).await?;
//!
//! let request = HarvestRequest::new(
//!     "ou=people,dc=example,dc=com",
//!     "(objectClass=inetOrgPerson)",
//!     vec!["cn".into(), "sn".into(), "mail".into(), "memberOf".into()],
//! )
//! .with_id_attribute("entryUUID")
//! .with_chunk_size(500);
//!
//! let report = HarvestRunner::new(session, sink, tracker, request)?.run().await?;
//! println!("{}: {} new, {} changed", report.status, report.stats.created, report.stats.changed);
//! ```

pub mod config;
pub mod diff;
pub mod filter;
pub mod harvest;
pub mod paging;
pub mod session;
pub mod stats;

pub use config::{HarvestRequest, LdapConfig};
pub use diff::{content_hash, ChangeDetector};
pub use harvest::{CancelFlag, HarvestReport, HarvestRunner};
pub use paging::{ChunkStream, Continuation, PaginationState, StrategyDowngrade};
pub use session::LdapSession;
pub use stats::{EntryErrorDetail, HarvestRunStats};
