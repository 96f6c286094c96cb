//! # Source-Connector Framework
//!
//! Core abstractions for harvesting identity records from external
//! systems into corvus.
//!
//! This crate defines the protocol-agnostic pieces shared by all source
//! connectors: the entry model, the error taxonomy, and the collaborator
//! seams (live session, record persistence, run tracking). Protocol
//! crates such as `corvus-connector-ldap` supply the transport and the
//! harvesting engine on top of these interfaces.
//!
//! ## Architecture
//!
//! - [`DirectorySession`] - one live connection, one search at a time
//! - [`RecordSink`] - append-only change-record persistence
//! - [`RunTracker`] - run lifecycle notifications
//! - [`DirectoryEntry`] - attribute map with single/multi string values
//! - [`HarvestError`] - errors with transient/permanent/capability
//!   classification
//!
//! ## Example
//!
//! ```ignore
//! use corvus_connector::prelude::*;
//!
//! async fn fetch_one_page(session: &mut impl DirectorySession) -> HarvestResult<usize> {
//!     let query = ChunkQuery {
//!         base: "ou=people,dc=example,dc=com".into(),
//!         filter: "(objectClass=inetOrgPerson)".into(),
//!         attributes: vec!["uid".into(), "cn".into(), "mail".into()],
//!         id_attribute: "uid".into(),
//!         page: PageControl::Bounded { size: 500 },
//!     };
//!     let page = session.execute(&query).await?;
//!     Ok(page.entries.len())
//! }
//! ```
//!
//! [`DirectorySession`]: traits::DirectorySession
//! [`RecordSink`]: traits::RecordSink
//! [`RunTracker`]: traits::RunTracker
//! [`DirectoryEntry`]: entry::DirectoryEntry
//! [`HarvestError`]: error::HarvestError

pub mod entry;
pub mod error;
pub mod ids;
pub mod resilience;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use corvus_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::HarvestRunId;

    // Types and enums
    pub use crate::types::{ChangeKind, HarvestPhase, PagingStrategy, RunStatus, TerminalReason};

    // Error handling
    pub use crate::error::{HarvestError, HarvestResult};

    // Entry model
    pub use crate::entry::{AttributeValue, DirectoryEntry};

    // Collaborator traits
    pub use crate::traits::{
        ChangeRecord, ChunkPage, ChunkQuery, ContentHash, DirectorySession, HashIndex,
        PageControl, RecordSink, RunTracker,
    };

    // Resilience
    pub use crate::resilience::RetryConfig;
}

// Re-export async_trait for session/sink implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _id = HarvestRunId::new();
        let _strategy = PagingStrategy::PagedResults;
        let _kind = ChangeKind::New;
        let _phase = HarvestPhase::Initializing;
        let _entry = DirectoryEntry::new("u1").with("cn", "test");
        let _retry = RetryConfig::default();
        let _err = HarvestError::connection_failed("test");
    }
}
