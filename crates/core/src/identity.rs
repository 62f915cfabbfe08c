//! Caller identity resolution.
//!
//! Intake operators rarely have an NHS number on the line. The resolver maps whatever partial
//! identity the caller gave into an existing `patient_id` by trying a fixed cascade of field
//! combinations, most specific first:
//!
//! | Step | Fields |
//! |------|--------|
//! | 1 | first name, last name, address |
//! | 2 | first name, last name |
//! | 3 | last name, address |
//! | 4 | first name, address |
//! | 5 | last name |
//!
//! A step is skipped when the candidate lacks any of its fields. Each step returns the lowest
//! matching `patient_id`, so the answer is deterministic for a given store. Step 5 can match
//! a different person who shares the surname; callers that need certainty must look up by NHS
//! number instead.

use crate::entities::PatientId;
use crate::store::{PatientFilter, Store};
use crate::text::NonEmptyText;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// CANDIDATE
// ============================================================================

/// Partial identity supplied by a caller. Blank fields are represented as `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub first_name: Option<NonEmptyText>,
    pub last_name: Option<NonEmptyText>,
    pub address: Option<NonEmptyText>,
}

impl IdentityCandidate {
    /// Builds a candidate from raw intake fields, treating blank text as absent.
    pub fn from_text(first_name: &str, last_name: &str, address: &str) -> Self {
        Self {
            first_name: NonEmptyText::new(first_name),
            last_name: NonEmptyText::new(last_name),
            address: NonEmptyText::new(address),
        }
    }
}

// ============================================================================
// CASCADE
// ============================================================================

/// One step of the resolution cascade: which identity fields must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CascadeStep {
    pub name: &'static str,
    pub first_name: bool,
    pub last_name: bool,
    pub address: bool,
}

impl CascadeStep {
    const fn new(name: &'static str, first_name: bool, last_name: bool, address: bool) -> Self {
        Self {
            name,
            first_name,
            last_name,
            address,
        }
    }

    /// The equality filter for this step, or `None` if the candidate lacks a required field.
    fn filter<'a>(&self, candidate: &'a IdentityCandidate) -> Option<PatientFilter<'a>> {
        fn pick<'a>(wanted: bool, field: &'a Option<NonEmptyText>) -> Option<Option<&'a str>> {
            match (wanted, field) {
                (false, _) => Some(None),
                (true, Some(text)) => Some(Some(text.as_str())),
                (true, None) => None,
            }
        }

        Some(PatientFilter {
            first_name: pick(self.first_name, &candidate.first_name)?,
            last_name: pick(self.last_name, &candidate.last_name)?,
            address: pick(self.address, &candidate.address)?,
        })
    }
}

/// Resolution order, most specific first.
pub const RESOLUTION_CASCADE: [CascadeStep; 5] = [
    CascadeStep::new("name_and_address", true, true, true),
    CascadeStep::new("full_name", true, true, false),
    CascadeStep::new("last_name_and_address", false, true, true),
    CascadeStep::new("first_name_and_address", true, false, true),
    CascadeStep::new("last_name", false, true, false),
];

// ============================================================================
// RESOLVER
// ============================================================================

/// Maps partial caller identity onto stored patients.
pub struct IdentityResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for IdentityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> IdentityResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolves `candidate` to a patient id.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvariantViolation` if the candidate has neither a last name nor an
    ///   address. No query is run in that case.
    /// - `CoreError::NotFound` if no cascade step matches.
    /// - `CoreError::Store` if a lookup fails.
    pub fn resolve(&self, candidate: &IdentityCandidate) -> CoreResult<PatientId> {
        if candidate.last_name.is_none() && candidate.address.is_none() {
            return Err(CoreError::InvariantViolation(
                "identity candidate needs a last name or an address".into(),
            ));
        }

        self.store.read("resolve_patient", |q| {
            for step in &RESOLUTION_CASCADE {
                let Some(filter) = step.filter(candidate) else {
                    continue;
                };
                tracing::debug!(step = step.name, "trying identity step");

                if let Some(patient_id) = q.find_patient_id(&filter)? {
                    tracing::info!(step = step.name, patient_id, "resolved caller identity");
                    return Ok(patient_id);
                }
            }
            Err(CoreError::not_found("patient", "no identity step matched"))
        })
    }
}
