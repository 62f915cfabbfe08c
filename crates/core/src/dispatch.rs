//! Ambulance dispatch.
//!
//! The engine owns the request/ambulance lifecycle:
//!
//! ```text
//! request:   PENDING --assign--> ACCEPTED --unassign--> COMPLETED
//!            PENDING --reject--> REJECTED
//! ambulance: AVAILABLE --assign--> ON_CALL --unassign--> AVAILABLE
//! ```
//!
//! Assignment and release each run as one store transaction. Every state change is a
//! compare-and-set, so a concurrent writer can make a transaction fail but never make it
//! double-book an ambulance. Lost races and busy locks are retried once before being surfaced.

use crate::constants::DISPATCH_ATTEMPTS;
use crate::entities::{
    AmbulanceId, AmbulanceRequest, HospitalId, NewAmbulanceRequest, RequestId,
};
use crate::error::{StoreError, StoreErrorKind};
use crate::hospitals::closest_hospital;
use crate::status::{AmbulanceStatus, EmergencyCallStatus, RequestStatus};
use crate::store::{Queries, Store};
use crate::{CoreError, CoreResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of [`DispatchEngine::assign_ambulance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Assignment {
    Assigned { ambulance_id: AmbulanceId },
    /// Every ambulance based at the request's hospital is busy. Nothing was written.
    NoAmbulanceAvailable,
}

/// Outcome of [`DispatchEngine::unassign_ambulance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Release {
    Released { ambulance_id: AmbulanceId },
    /// The request was already completed. Nothing was written.
    AlreadyCompleted,
}

// ============================================================================
// DISPATCH ENGINE
// ============================================================================

/// Assigns ambulances to requests and releases them again.
pub struct DispatchEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for DispatchEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> DispatchEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Assigns an available ambulance from the request's hospital to the request.
    ///
    /// On success the request is `ACCEPTED` and linked to the ambulance, the ambulance is
    /// `ON_CALL`, and the emergency call is `AMBULANCE_DISPATCHED`. These writes commit
    /// together or not at all.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The ambulance request to serve
    ///
    /// # Returns
    ///
    /// `Assignment::NoAmbulanceAvailable` when the hospital has no free ambulance.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the request does not exist.
    /// - `CoreError::InvariantViolation` if the request has no target hospital, or an
    ///   ambulance is free but the request is no longer pending.
    /// - `CoreError::Store` on a store failure, including a conflict that persisted through
    ///   the retry.
    pub fn assign_ambulance(&self, request_id: RequestId) -> CoreResult<Assignment> {
        let outcome = self.with_retry("assign_ambulance", request_id, |q| {
            assign_in(q, request_id)
        })?;

        match outcome {
            Assignment::Assigned { ambulance_id } => {
                tracing::info!(request_id, ambulance_id, "ambulance assigned");
            }
            Assignment::NoAmbulanceAvailable => {
                tracing::warn!(request_id, "no ambulance available for request");
            }
        }
        Ok(outcome)
    }

    /// Releases the ambulance linked to an accepted request and completes the request.
    ///
    /// The ambulance referenced by the request goes back to `AVAILABLE`, the request becomes
    /// `COMPLETED` and the emergency call `AMBULANCE_COMPLETED`. Calling this again for the same
    /// request returns `Release::AlreadyCompleted` and writes nothing.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the request does not exist.
    /// - `CoreError::InvariantViolation` if the request is pending or rejected, or its
    ///   ambulance is not on call.
    /// - `CoreError::Store` on a store failure.
    pub fn unassign_ambulance(&self, request_id: RequestId) -> CoreResult<Release> {
        let outcome = self.with_retry("unassign_ambulance", request_id, |q| {
            release_in(q, request_id)
        })?;

        match outcome {
            Release::Released { ambulance_id } => {
                tracing::info!(request_id, ambulance_id, "ambulance released");
            }
            Release::AlreadyCompleted => {
                tracing::info!(request_id, "request already completed");
            }
        }
        Ok(outcome)
    }

    /// Creates a `PENDING` request for an emergency call.
    ///
    /// When `request.hospital_id` is `None` the hospital nearest to the request location is
    /// targeted.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidInput` if the location is not a valid coordinate.
    /// - `CoreError::NotFound` if the emergency call or the named hospital does not exist, or
    ///   no hospital is registered.
    /// - `CoreError::Store` on a store failure.
    pub fn create_ambulance_request(
        &self,
        request: NewAmbulanceRequest,
    ) -> CoreResult<AmbulanceRequest> {
        request.location.validate()?;

        let now = Utc::now();
        let created = self.store.transaction("create_ambulance_request", |q| {
            if q.get_emergency_call(request.emergency_call_id)?.is_none() {
                return Err(CoreError::not_found(
                    "emergency call",
                    request.emergency_call_id,
                ));
            }

            let hospital_id = match request.hospital_id {
                Some(hospital_id) => {
                    if q.get_hospital(hospital_id)?.is_none() {
                        return Err(CoreError::not_found("regional hospital", hospital_id));
                    }
                    hospital_id
                }
                None => {
                    let hospitals = q.list_hospitals()?;
                    closest_hospital(&request.location, &hospitals)
                        .map(|hospital| hospital.hospital_id)
                        .ok_or_else(|| {
                            CoreError::not_found("regional hospital", "no hospitals registered")
                        })?
                }
            };

            let request_id = q.insert_ambulance_request(&request, hospital_id, now)?;
            Ok(AmbulanceRequest {
                request_id,
                emergency_call_id: request.emergency_call_id,
                hospital_id: Some(hospital_id),
                ambulance_id: None,
                severity: request.severity,
                location: request.location,
                status: RequestStatus::Pending,
                created_at: now,
                updated_at: now,
            })
        })?;

        tracing::info!(
            request_id = created.request_id,
            hospital_id = created.hospital_id,
            "ambulance request created"
        );
        Ok(created)
    }

    /// Moves a pending request to `REJECTED`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown request and `CoreError::InvariantViolation`
    /// if the request is not pending.
    pub fn reject_ambulance_request(&self, request_id: RequestId) -> CoreResult<AmbulanceRequest> {
        let rejected = self.store.transaction("reject_ambulance_request", |q| {
            let mut request = load_request(q, request_id)?;
            if request.status != RequestStatus::Pending {
                return Err(CoreError::InvariantViolation(format!(
                    "ambulance request {request_id} is {} and cannot be rejected",
                    request.status
                )));
            }

            let now = Utc::now();
            if !q.transition_ambulance_request(
                request_id,
                RequestStatus::Pending,
                RequestStatus::Rejected,
                now,
            )? {
                return Err(conflict(
                    "transition_ambulance_request",
                    format!("ambulance request {request_id} changed concurrently"),
                ));
            }

            request.status = RequestStatus::Rejected;
            request.updated_at = now;
            Ok(request)
        })?;

        tracing::info!(request_id, "ambulance request rejected");
        Ok(rejected)
    }

    pub fn get_ambulance_request(&self, request_id: RequestId) -> CoreResult<AmbulanceRequest> {
        self.store
            .read("get_ambulance_request", |q| load_request(q, request_id))
    }

    /// The request the ambulance is currently serving.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the ambulance has no accepted request.
    pub fn get_current_ambulance_request(
        &self,
        ambulance_id: AmbulanceId,
    ) -> CoreResult<AmbulanceRequest> {
        self.store.read("get_current_ambulance_request", |q| {
            q.accepted_request_for_ambulance(ambulance_id)?
                .ok_or_else(|| CoreError::not_found("accepted ambulance request", ambulance_id))
        })
    }

    /// Pending and accepted requests targeting the hospital, by request id.
    pub fn get_pending_or_accepted_requests(
        &self,
        hospital_id: HospitalId,
    ) -> CoreResult<Vec<AmbulanceRequest>> {
        self.store.read("get_pending_or_accepted_requests", |q| {
            Ok(q.list_ambulance_requests(
                hospital_id,
                &[RequestStatus::Pending, RequestStatus::Accepted],
            )?)
        })
    }

    /// Completed requests targeting the hospital, by request id.
    pub fn get_completed_requests(
        &self,
        hospital_id: HospitalId,
    ) -> CoreResult<Vec<AmbulanceRequest>> {
        self.store.read("get_completed_requests", |q| {
            Ok(q.list_ambulance_requests(hospital_id, &[RequestStatus::Completed])?)
        })
    }

    fn with_retry<T>(
        &self,
        op: &'static str,
        request_id: RequestId,
        body: impl Fn(&dyn Queries) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut attempt = 1;
        loop {
            match self.store.transaction(op, &body) {
                Err(e) if e.is_serialization_conflict() && attempt < DISPATCH_ATTEMPTS => {
                    tracing::warn!(op, request_id, attempt, "retrying after conflict: {}", e);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

// ============================================================================
// TRANSACTION BODIES
// ============================================================================

fn load_request(q: &dyn Queries, request_id: RequestId) -> CoreResult<AmbulanceRequest> {
    q.get_ambulance_request(request_id)?
        .ok_or_else(|| CoreError::not_found("ambulance request", request_id))
}

fn conflict(query: &'static str, detail: String) -> CoreError {
    StoreError::new(query, StoreErrorKind::Conflict(detail)).into()
}

fn assign_in(q: &dyn Queries, request_id: RequestId) -> CoreResult<Assignment> {
    let request = load_request(q, request_id)?;
    let Some(hospital_id) = request.hospital_id else {
        return Err(CoreError::InvariantViolation(format!(
            "ambulance request {request_id} has no target hospital"
        )));
    };

    let Some(ambulance_id) = q.select_available_ambulance(hospital_id)? else {
        return Ok(Assignment::NoAmbulanceAvailable);
    };

    let now = Utc::now();
    if !q.accept_ambulance_request(request_id, ambulance_id, now)? {
        return Err(CoreError::InvariantViolation(format!(
            "ambulance request {request_id} is {} and already handled",
            request.status
        )));
    }
    if !q.transition_ambulance_status(
        ambulance_id,
        AmbulanceStatus::Available,
        AmbulanceStatus::OnCall,
    )? {
        return Err(conflict(
            "transition_ambulance_status",
            format!("ambulance {ambulance_id} is no longer available"),
        ));
    }
    if !q.dispatch_emergency_call(request.emergency_call_id, ambulance_id, hospital_id)? {
        return Err(CoreError::InvariantViolation(format!(
            "emergency call {} for ambulance request {request_id} is missing",
            request.emergency_call_id
        )));
    }

    Ok(Assignment::Assigned { ambulance_id })
}

fn release_in(q: &dyn Queries, request_id: RequestId) -> CoreResult<Release> {
    let request = load_request(q, request_id)?;
    match request.status {
        RequestStatus::Accepted => {}
        RequestStatus::Completed => return Ok(Release::AlreadyCompleted),
        status @ (RequestStatus::Pending | RequestStatus::Rejected) => {
            return Err(CoreError::InvariantViolation(format!(
                "ambulance request {request_id} is {status} and has no ambulance to release"
            )));
        }
    }

    let Some(ambulance_id) = request.ambulance_id else {
        return Err(CoreError::InvariantViolation(format!(
            "accepted ambulance request {request_id} has no linked ambulance"
        )));
    };

    let now = Utc::now();
    if !q.transition_ambulance_request(
        request_id,
        RequestStatus::Accepted,
        RequestStatus::Completed,
        now,
    )? {
        return Err(conflict(
            "transition_ambulance_request",
            format!("ambulance request {request_id} changed concurrently"),
        ));
    }
    if !q.transition_ambulance_status(
        ambulance_id,
        AmbulanceStatus::OnCall,
        AmbulanceStatus::Available,
    )? {
        return Err(CoreError::InvariantViolation(format!(
            "ambulance {ambulance_id} linked to request {request_id} is not on call"
        )));
    }
    q.set_emergency_call_status(request.emergency_call_id, EmergencyCallStatus::Completed)?;

    Ok(Release::Released { ambulance_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entities::CallId;
    use crate::geo::GeoPoint;
    use crate::status::InjurySeverity;
    use crate::store::SqliteStore;
    use crate::test_support::{
        memory_store, seed_ambulance, seed_call, seed_hospital, seed_request, set_next_request_id,
    };
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Scenario {
        store: Arc<SqliteStore>,
        engine: DispatchEngine<SqliteStore>,
        hospital_id: HospitalId,
        ambulance_id: AmbulanceId,
        call_id: CallId,
        request_id: RequestId,
    }

    /// Hospital 1 with ambulance 1 available, and pending request 56 targeting hospital 1.
    fn scenario() -> Scenario {
        let store = memory_store();
        let hospital_id = seed_hospital(&store, "Royal Infirmary", GeoPoint::new(55.92, -3.13));
        let ambulance_id = seed_ambulance(&store, "AMB-001", hospital_id);
        let call_id = seed_call(&store, None);
        set_next_request_id(&store, 56);
        let request_id = seed_request(&store, call_id, hospital_id);

        Scenario {
            engine: DispatchEngine::new(Arc::clone(&store)),
            store,
            hospital_id,
            ambulance_id,
            call_id,
            request_id,
        }
    }

    fn ambulance_status(store: &SqliteStore, ambulance_id: AmbulanceId) -> AmbulanceStatus {
        store
            .read("test", |q| Ok(q.get_ambulance(ambulance_id)?.expect("ambulance exists")))
            .unwrap()
            .status
    }

    /// Wraps a store and fails the first `failures` write transactions with `Busy`.
    struct FlakyStore {
        inner: Arc<SqliteStore>,
        failures: usize,
        attempts: AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: Arc<SqliteStore>, failures: usize) -> Self {
            Self {
                inner,
                failures,
                attempts: AtomicUsize::new(0),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Store for FlakyStore {
        fn read<T>(
            &self,
            op: &'static str,
            f: impl FnOnce(&dyn Queries) -> CoreResult<T>,
        ) -> CoreResult<T> {
            self.inner.read(op, f)
        }

        fn transaction<T>(
            &self,
            op: &'static str,
            f: impl FnOnce(&dyn Queries) -> CoreResult<T>,
        ) -> CoreResult<T> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(StoreError::new(op, StoreErrorKind::Busy("locked".into())).into());
            }
            self.inner.transaction(op, f)
        }
    }

    fn flaky_engine(failures: usize) -> (Arc<FlakyStore>, DispatchEngine<FlakyStore>) {
        let s = scenario();
        let flaky = Arc::new(FlakyStore::new(s.store, failures));
        (Arc::clone(&flaky), DispatchEngine::new(flaky))
    }

    #[test]
    fn test_assign_retries_once_after_busy() {
        let (store, engine) = flaky_engine(1);

        let outcome = engine.assign_ambulance(56).expect("assign should succeed on retry");

        assert_eq!(outcome, Assignment::Assigned { ambulance_id: 1 });
        assert_eq!(store.attempts(), 2);
    }

    #[test]
    fn test_assign_surfaces_second_busy() {
        let (store, engine) = flaky_engine(2);

        let err = engine.assign_ambulance(56).expect_err("second busy should surface");

        assert!(matches!(
            err,
            CoreError::Store(StoreError { kind: StoreErrorKind::Busy(_), .. })
        ));
        assert_eq!(store.attempts(), 2);
        assert_eq!(
            engine.get_ambulance_request(56).unwrap().status,
            RequestStatus::Pending
        );
    }

    #[test]
    fn test_unassign_retries_once_after_busy() {
        let s = scenario();
        s.engine.assign_ambulance(56).expect("assign should succeed");
        let flaky = Arc::new(FlakyStore::new(Arc::clone(&s.store), 1));
        let engine = DispatchEngine::new(Arc::clone(&flaky));

        let outcome = engine.unassign_ambulance(56).expect("unassign should succeed on retry");

        assert_eq!(outcome, Release::Released { ambulance_id: 1 });
        assert_eq!(flaky.attempts(), 2);
        assert_eq!(ambulance_status(&s.store, 1), AmbulanceStatus::Available);
    }

    #[test]
    fn test_assign_links_available_ambulance() {
        let s = scenario();
        assert_eq!((s.hospital_id, s.ambulance_id, s.request_id), (1, 1, 56));

        let outcome = s.engine.assign_ambulance(56).expect("assign should succeed");
        assert_eq!(outcome, Assignment::Assigned { ambulance_id: 1 });

        let request = s.engine.get_ambulance_request(56).unwrap();
        assert_eq!(request.status, RequestStatus::Accepted);
        assert_eq!(request.ambulance_id, Some(1));
        assert_eq!(ambulance_status(&s.store, 1), AmbulanceStatus::OnCall);

        let call = s
            .store
            .read("call", |q| Ok(q.get_emergency_call(s.call_id)?.expect("call exists")))
            .unwrap();
        assert_eq!(call.status, EmergencyCallStatus::Dispatched);
        assert_eq!(call.assigned_ambulance_id, Some(1));
        assert_eq!(call.assigned_hospital_id, Some(1));
    }

    #[test]
    fn test_assign_again_reports_no_ambulance_and_leaves_request_unchanged() {
        let s = scenario();
        s.engine.assign_ambulance(s.request_id).unwrap();
        let before = s.engine.get_ambulance_request(s.request_id).unwrap();

        let outcome = s.engine.assign_ambulance(s.request_id).unwrap();

        assert_eq!(outcome, Assignment::NoAmbulanceAvailable);
        assert_eq!(s.engine.get_ambulance_request(s.request_id).unwrap(), before);
    }

    #[test]
    fn test_assign_already_linked_request_with_free_ambulance_is_rejected() {
        let s = scenario();
        let spare = seed_ambulance(&s.store, "AMB-002", s.hospital_id);
        s.engine.assign_ambulance(s.request_id).unwrap();

        let err = s
            .engine
            .assign_ambulance(s.request_id)
            .expect_err("accepted request must not take a second ambulance");

        assert!(matches!(err, CoreError::InvariantViolation(_)));
        assert_eq!(ambulance_status(&s.store, spare), AmbulanceStatus::Available);
    }

    #[test]
    fn test_assign_only_draws_from_request_hospital() {
        let s = scenario();
        let other = seed_hospital(&s.store, "Borders General", GeoPoint::new(55.59, -2.74));
        seed_ambulance(&s.store, "AMB-900", other);
        s.engine.assign_ambulance(s.request_id).unwrap();

        let second_call = seed_call(&s.store, None);
        let second = seed_request(&s.store, second_call, s.hospital_id);

        assert_eq!(
            s.engine.assign_ambulance(second).unwrap(),
            Assignment::NoAmbulanceAvailable
        );
    }

    #[test]
    fn test_assign_unknown_request_is_not_found() {
        let s = scenario();
        let err = s.engine.assign_ambulance(999).expect_err("unknown request");
        assert!(matches!(err, CoreError::NotFound { entity: "ambulance request", .. }));
    }

    #[test]
    fn test_unassign_completes_request_and_frees_ambulance() {
        let s = scenario();
        s.engine.assign_ambulance(56).unwrap();

        let outcome = s.engine.unassign_ambulance(56).expect("unassign should succeed");

        assert_eq!(outcome, Release::Released { ambulance_id: 1 });
        assert_eq!(
            s.engine.get_ambulance_request(56).unwrap().status,
            RequestStatus::Completed
        );
        assert_eq!(ambulance_status(&s.store, 1), AmbulanceStatus::Available);

        let call = s
            .store
            .read("call", |q| Ok(q.get_emergency_call(s.call_id)?.expect("call exists")))
            .unwrap();
        assert_eq!(call.status, EmergencyCallStatus::Completed);
    }

    #[test]
    fn test_unassign_is_idempotent() {
        let s = scenario();
        s.engine.assign_ambulance(s.request_id).unwrap();
        s.engine.unassign_ambulance(s.request_id).unwrap();

        // The freed ambulance is put back on call for a different request.
        let next_call = seed_call(&s.store, None);
        let next = seed_request(&s.store, next_call, s.hospital_id);
        s.engine.assign_ambulance(next).unwrap();

        let outcome = s.engine.unassign_ambulance(s.request_id).unwrap();

        assert_eq!(outcome, Release::AlreadyCompleted);
        assert_eq!(ambulance_status(&s.store, s.ambulance_id), AmbulanceStatus::OnCall);
        assert_eq!(
            s.engine.get_current_ambulance_request(s.ambulance_id).unwrap().request_id,
            next
        );
    }

    #[test]
    fn test_unassign_pending_request_is_rejected() {
        let s = scenario();
        let err = s
            .engine
            .unassign_ambulance(s.request_id)
            .expect_err("pending request has nothing to release");
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_failed_write_rolls_back_assignment() {
        let s = scenario();
        s.store
            .execute_raw(
                "CREATE TRIGGER refuse_dispatch BEFORE UPDATE ON emergency_calls \
                 BEGIN SELECT RAISE(ABORT, 'dispatch refused'); END;",
            )
            .unwrap();

        let err = s
            .engine
            .assign_ambulance(s.request_id)
            .expect_err("trigger should abort the assignment");

        assert!(matches!(err, CoreError::Store(_)));
        let request = s.engine.get_ambulance_request(s.request_id).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.ambulance_id, None);
        assert_eq!(ambulance_status(&s.store, s.ambulance_id), AmbulanceStatus::Available);
    }

    #[test]
    fn test_create_request_targets_nearest_hospital_by_default() {
        let store = memory_store();
        let near = seed_hospital(&store, "Origin General", GeoPoint::new(0.0, 0.0));
        seed_hospital(&store, "Far Infirmary", GeoPoint::new(10.0, 10.0));
        let call_id = seed_call(&store, None);
        let engine = DispatchEngine::new(store);

        let created = engine
            .create_ambulance_request(NewAmbulanceRequest {
                emergency_call_id: call_id,
                hospital_id: None,
                severity: InjurySeverity::Critical,
                location: GeoPoint::new(1.0, 1.0),
            })
            .expect("create should succeed");

        assert_eq!(created.hospital_id, Some(near));
        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(created.ambulance_id, None);
        assert_eq!(engine.get_ambulance_request(created.request_id).unwrap(), created);
    }

    #[test]
    fn test_create_request_for_unknown_call_is_not_found() {
        let store = memory_store();
        let hospital_id = seed_hospital(&store, "General", GeoPoint::new(0.0, 0.0));
        let engine = DispatchEngine::new(store);

        let err = engine
            .create_ambulance_request(NewAmbulanceRequest {
                emergency_call_id: 404,
                hospital_id: Some(hospital_id),
                severity: InjurySeverity::Low,
                location: GeoPoint::new(0.0, 0.0),
            })
            .expect_err("unknown call");
        assert!(matches!(err, CoreError::NotFound { entity: "emergency call", .. }));
    }

    #[test]
    fn test_reject_only_applies_to_pending_requests() {
        let s = scenario();
        let rejected = s.engine.reject_ambulance_request(s.request_id).unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let err = s
            .engine
            .reject_ambulance_request(s.request_id)
            .expect_err("rejected request cannot be rejected again");
        assert!(matches!(err, CoreError::InvariantViolation(_)));
        assert!(matches!(
            s.engine.unassign_ambulance(s.request_id),
            Err(CoreError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_request_listings_by_status() {
        let s = scenario();
        let second_call = seed_call(&s.store, None);
        let second = seed_request(&s.store, second_call, s.hospital_id);
        let third_call = seed_call(&s.store, None);
        let third = seed_request(&s.store, third_call, s.hospital_id);

        s.engine.assign_ambulance(s.request_id).unwrap();
        s.engine.unassign_ambulance(s.request_id).unwrap();
        s.engine.assign_ambulance(second).unwrap();

        let open: Vec<_> = s
            .engine
            .get_pending_or_accepted_requests(s.hospital_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.request_id, r.status))
            .collect();
        assert_eq!(
            open,
            vec![(second, RequestStatus::Accepted), (third, RequestStatus::Pending)]
        );

        let completed = s.engine.get_completed_requests(s.hospital_id).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].request_id, s.request_id);
    }

    #[test]
    fn test_current_request_without_assignment_is_not_found() {
        let s = scenario();
        assert!(matches!(
            s.engine.get_current_ambulance_request(s.ambulance_id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_assignments_never_double_book() {
        const AMBULANCES: usize = 3;
        const CALLERS: usize = 8;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = StoreConfig::new(
            temp_dir.path().to_path_buf(),
            "dispatch",
            Duration::from_secs(10),
        )
        .unwrap();
        let store = Arc::new(SqliteStore::open(&cfg).expect("file store should open"));

        let hospital_id = seed_hospital(&store, "Royal Infirmary", GeoPoint::new(55.92, -3.13));
        for n in 0..AMBULANCES {
            seed_ambulance(&store, &format!("AMB-{n:03}"), hospital_id);
        }
        let requests: Vec<RequestId> = (0..CALLERS)
            .map(|_| {
                let call_id = seed_call(&store, None);
                seed_request(&store, call_id, hospital_id)
            })
            .collect();

        let engine = DispatchEngine::new(Arc::clone(&store));
        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = requests
            .iter()
            .map(|&request_id| {
                let engine = engine.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.assign_ambulance(request_id)
                })
            })
            .collect();

        let outcomes: Vec<Assignment> = handles
            .into_iter()
            .map(|h| {
                h.join()
                    .expect("thread should not panic")
                    .expect("assignment should succeed")
            })
            .collect();

        let assigned: Vec<AmbulanceId> = outcomes
            .iter()
            .filter_map(|o| match o {
                Assignment::Assigned { ambulance_id } => Some(*ambulance_id),
                Assignment::NoAmbulanceAvailable => None,
            })
            .collect();
        let distinct: HashSet<AmbulanceId> = assigned.iter().copied().collect();

        assert_eq!(assigned.len(), AMBULANCES);
        assert_eq!(distinct.len(), AMBULANCES);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == Assignment::NoAmbulanceAvailable)
                .count(),
            CALLERS - AMBULANCES
        );

        for ambulance_id in distinct {
            let current = engine.get_current_ambulance_request(ambulance_id).unwrap();
            assert_eq!(current.ambulance_id, Some(ambulance_id));
            assert_eq!(ambulance_status(&store, ambulance_id), AmbulanceStatus::OnCall);
        }
        let open = engine.get_pending_or_accepted_requests(hospital_id).unwrap();
        assert_eq!(
            open.iter().filter(|r| r.status == RequestStatus::Accepted).count(),
            AMBULANCES
        );
    }
}
