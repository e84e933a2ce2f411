//! Principal types for the three access domains.
//!
//! Access control in the protection core is type-level, not rule-level: the
//! family, partner, and compliance domains are represented by distinct Rust
//! types with no common trait, so an API that requires a
//! [`CompliancePrincipal`] cannot be called with a family credential at all.
//! There is no conversion between principal types.
//!
//! Authentication itself is a collaborator concern; callers construct a
//! principal only after the surrounding system has verified the caller's
//! identity for that domain.

use std::fmt;

/// A guardian credential scoped to the family-visible domain.
///
/// Family principals can read the activity timeline for subjects in their
/// family and nothing else. No API in this crate accepts a
/// `FamilyPrincipal` for sealed-domain reads or blackout transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyPrincipal {
    /// Guardian account identifier.
    pub guardian_id: String,
    /// Family the guardian belongs to.
    pub family_id: String,
}

impl FamilyPrincipal {
    /// Creates a family principal for an authenticated guardian.
    #[must_use]
    pub fn new(guardian_id: impl Into<String>, family_id: impl Into<String>) -> Self {
        Self {
            guardian_id: guardian_id.into(),
            family_id: family_id.into(),
        }
    }
}

/// A verified external-partner credential.
///
/// Partner principals are the only callers allowed to extend or release a
/// signal blackout. They are distinct from family guardians and from
/// compliance reviewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerPrincipal {
    /// Partner organization identifier.
    pub partner_id: String,
}

impl PartnerPrincipal {
    /// Creates a partner principal for a verified partner caller.
    #[must_use]
    pub fn new(partner_id: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
        }
    }
}

impl fmt::Display for PartnerPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partner:{}", self.partner_id)
    }
}

/// A compliance reviewer credential.
///
/// The only principal type accepted by sealed-audit queries. Compliance
/// principals cannot transition blackouts and have no family-side surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompliancePrincipal {
    /// Reviewer identifier.
    pub reviewer_id: String,
}

impl CompliancePrincipal {
    /// Creates a compliance principal for a verified reviewer.
    #[must_use]
    pub fn new(reviewer_id: impl Into<String>) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
        }
    }
}

impl fmt::Display for CompliancePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compliance:{}", self.reviewer_id)
    }
}
