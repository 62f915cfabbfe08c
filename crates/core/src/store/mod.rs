//! Entity store.
//!
//! Services never talk to a database directly. They are constructed with a [`Store`] and run
//! their work inside one of its two scopes:
//!
//! - [`Store::read`] for lookups that only need a consistent snapshot,
//! - [`Store::transaction`] for writes that must commit together or not at all.
//!
//! Inside a scope the service sees the object-safe [`Queries`] surface: single-statement,
//! row-level operations with no business rules. Decision logic (which ambulance, which patient)
//! lives in the services, so a test double only has to provide `Queries`.
//!
//! Status transitions are compare-and-set (`transition_*`, `accept_*`): they name the state
//! they expect and report whether a row actually moved.

mod schema;
mod sqlite;

pub use schema::SCHEMA;
pub use sqlite::SqliteStore;

use crate::entities::{
    Ambulance, AmbulanceId, AmbulanceRequest, AmbulanceStaff, CallId, CallOutDetail, CallOutId,
    EmergencyCall, HospitalId, MedicalRecord, NewAmbulance, NewAmbulanceRequest,
    NewAmbulanceStaff, NewCallOutDetail, NewEmergencyCall, NewMedicalRecord, NewPatient,
    NewRegionalHospital, Patient, PatientId, RecordId, RegionalHospital, RequestId, StaffId,
};
use crate::error::{CoreResult, StoreError};
use crate::status::{AmbulanceStatus, EmergencyCallStatus, RequestStatus};
use chrono::{DateTime, Utc};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Equality filter over patient identity columns. `None` fields are not filtered on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatientFilter<'a> {
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub address: Option<&'a str>,
}

/// A handle to the relational store, shared by every service.
///
/// Both scopes release their connection on every exit path. A transaction commits only when the
/// closure returns `Ok`; an `Err` or a panic inside the closure rolls it back.
pub trait Store: Send + Sync {
    /// Runs `f` against a consistent read snapshot.
    fn read<T>(&self, op: &'static str, f: impl FnOnce(&dyn Queries) -> CoreResult<T>)
        -> CoreResult<T>;

    /// Runs `f` inside a single atomic write transaction.
    ///
    /// Implementations must prevent two concurrent transactions from both observing and
    /// claiming the same row (write lock taken at begin, or serializable isolation).
    fn transaction<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn Queries) -> CoreResult<T>,
    ) -> CoreResult<T>;
}

/// Row-level operations available inside a store scope.
pub trait Queries {
    // ------------------------------------------------------------------
    // Patients and records
    // ------------------------------------------------------------------

    fn insert_patient(&self, patient: &NewPatient, created_at: DateTime<Utc>)
        -> StoreResult<PatientId>;

    fn get_patient(&self, patient_id: PatientId) -> StoreResult<Option<Patient>>;

    fn get_patient_by_nhs_number(&self, nhs_number: &str) -> StoreResult<Option<Patient>>;

    /// Lowest `patient_id` matching every present field of `filter`.
    fn find_patient_id(&self, filter: &PatientFilter<'_>) -> StoreResult<Option<PatientId>>;

    fn insert_medical_record(
        &self,
        record: &NewMedicalRecord,
        last_updated: DateTime<Utc>,
    ) -> StoreResult<RecordId>;

    /// The most recently updated record for the patient.
    fn latest_medical_record(&self, patient_id: PatientId) -> StoreResult<Option<MedicalRecord>>;

    /// Appends `detail_id` to the record's call-out list. Returns `false` if the record is gone.
    fn append_callout_id(&self, record_id: RecordId, detail_id: CallOutId) -> StoreResult<bool>;

    fn insert_callout(
        &self,
        detail: &NewCallOutDetail,
        created_at: DateTime<Utc>,
    ) -> StoreResult<CallOutId>;

    /// Call-out details whose ids are in `ids`, in the order of `ids`. Unknown ids are skipped.
    fn callouts_by_ids(&self, ids: &[CallOutId]) -> StoreResult<Vec<CallOutDetail>>;

    // ------------------------------------------------------------------
    // Emergency calls
    // ------------------------------------------------------------------

    fn insert_emergency_call(
        &self,
        call: &NewEmergencyCall,
        call_time: DateTime<Utc>,
    ) -> StoreResult<CallId>;

    fn get_emergency_call(&self, call_id: CallId) -> StoreResult<Option<EmergencyCall>>;

    /// Marks the call dispatched and records the assigned ambulance and hospital.
    fn dispatch_emergency_call(
        &self,
        call_id: CallId,
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
    ) -> StoreResult<bool>;

    fn set_emergency_call_status(
        &self,
        call_id: CallId,
        status: EmergencyCallStatus,
    ) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Hospitals
    // ------------------------------------------------------------------

    fn insert_hospital(
        &self,
        hospital: &NewRegionalHospital,
        created_at: DateTime<Utc>,
    ) -> StoreResult<HospitalId>;

    fn get_hospital(&self, hospital_id: HospitalId) -> StoreResult<Option<RegionalHospital>>;

    /// Every hospital, in store order (ascending id).
    fn list_hospitals(&self) -> StoreResult<Vec<RegionalHospital>>;

    // ------------------------------------------------------------------
    // Ambulances
    // ------------------------------------------------------------------

    fn insert_ambulance(&self, ambulance: &NewAmbulance) -> StoreResult<AmbulanceId>;

    fn get_ambulance(&self, ambulance_id: AmbulanceId) -> StoreResult<Option<Ambulance>>;

    fn list_ambulances_for_hospital(&self, hospital_id: HospitalId)
        -> StoreResult<Vec<Ambulance>>;

    /// One `AVAILABLE` ambulance based at `hospital_id`, lowest id first.
    fn select_available_ambulance(&self, hospital_id: HospitalId)
        -> StoreResult<Option<AmbulanceId>>;

    /// Moves the ambulance from `from` to `to`. Returns `false` if it was not in `from`.
    fn transition_ambulance_status(
        &self,
        ambulance_id: AmbulanceId,
        from: AmbulanceStatus,
        to: AmbulanceStatus,
    ) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Ambulance requests
    // ------------------------------------------------------------------

    /// Inserts a `PENDING`, unlinked request targeting `hospital_id`.
    fn insert_ambulance_request(
        &self,
        request: &NewAmbulanceRequest,
        hospital_id: HospitalId,
        now: DateTime<Utc>,
    ) -> StoreResult<RequestId>;

    fn get_ambulance_request(&self, request_id: RequestId)
        -> StoreResult<Option<AmbulanceRequest>>;

    /// Links the ambulance and moves the request `PENDING -> ACCEPTED`. Returns `false` if the
    /// request was not pending or already had an ambulance.
    fn accept_ambulance_request(
        &self,
        request_id: RequestId,
        ambulance_id: AmbulanceId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Moves the request from `from` to `to`. Returns `false` if it was not in `from`.
    fn transition_ambulance_request(
        &self,
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    fn accepted_request_for_ambulance(
        &self,
        ambulance_id: AmbulanceId,
    ) -> StoreResult<Option<AmbulanceRequest>>;

    /// Requests targeting `hospital_id` whose status is one of `statuses`, by id.
    fn list_ambulance_requests(
        &self,
        hospital_id: HospitalId,
        statuses: &[RequestStatus],
    ) -> StoreResult<Vec<AmbulanceRequest>>;

    // ------------------------------------------------------------------
    // Staff
    // ------------------------------------------------------------------

    fn insert_staff(&self, staff: &NewAmbulanceStaff) -> StoreResult<StaffId>;

    fn get_staff(&self, staff_id: StaffId) -> StoreResult<Option<AmbulanceStaff>>;

    fn list_staff_for_ambulance(&self, ambulance_id: AmbulanceId)
        -> StoreResult<Vec<AmbulanceStaff>>;

    fn set_staff_ambulance(
        &self,
        staff_id: StaffId,
        ambulance_id: Option<AmbulanceId>,
    ) -> StoreResult<bool>;
}
