//! The compliance audit surface.
//!
//! Reads the sealed audit chain for legal-hold and review purposes. The
//! surface is reachable only with a [`CompliancePrincipal`] — a distinct
//! type, so a family or partner credential cannot even express the call.
//! Every read verifies the hash chain first; a broken chain refuses to
//! serve and the failure stays on this channel.

use std::sync::Arc;

use veil_core::audit::{AuditError, AuditFilter, SealedAuditEntry, SealedAuditLog};
use veil_core::principal::CompliancePrincipal;

/// Compliance read surface over the sealed audit log.
pub struct ComplianceSurface {
    audit: Arc<SealedAuditLog>,
}

impl ComplianceSurface {
    /// Creates the surface over the sealed log.
    #[must_use]
    pub fn new(audit: Arc<SealedAuditLog>) -> Self {
        Self { audit }
    }

    /// Reads audit entries matching a filter, verifying chain integrity
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] if any historical entry has
    /// been tampered with; reads refuse from then on.
    pub fn audit_entries(
        &self,
        principal: &CompliancePrincipal,
        filter: &AuditFilter,
    ) -> Result<Vec<SealedAuditEntry>, AuditError> {
        self.audit.verify_chain()?;
        self.audit.query(principal, filter)
    }

    /// Re-verifies the whole chain without reading entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad entry.
    pub fn verify(&self) -> Result<(), AuditError> {
        self.audit.verify_chain()
    }
}
