//! Persisted entities and their insert shapes.
//!
//! Every row type has public fields so boundary crates (wire mapping, CLI output) can read and
//! build them directly. The `New*` types carry the caller-supplied columns of an insert; the
//! store assigns identifiers and, where noted, timestamps.

use crate::geo::GeoPoint;
use crate::status::{
    AmbulanceStatus, EmergencyCallStatus, InjurySeverity, RequestStatus, StaffRole,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type PatientId = i64;
pub type RecordId = i64;
pub type CallOutId = i64;
pub type CallId = i64;
pub type AmbulanceId = i64;
pub type RequestId = i64;
pub type StaffId = i64;
pub type HospitalId = i64;

// ============================================================================
// PATIENTS AND RECORDS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    /// National Health Service number; unique when present.
    pub nhs_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone_number: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub nhs_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone_number: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub record_id: RecordId,
    pub patient_id: PatientId,
    /// Call-out detail ids in insertion order. Append-only.
    pub callout_ids: Vec<CallOutId>,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub notes: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub patient_id: PatientId,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallOutDetail {
    pub detail_id: CallOutId,
    pub call_id: CallId,
    pub ambulance_id: AmbulanceId,
    pub action_taken: String,
    pub time_spent: Duration,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewCallOutDetail {
    pub call_id: CallId,
    pub ambulance_id: AmbulanceId,
    pub action_taken: String,
    pub time_spent: Duration,
    pub notes: String,
}

// ============================================================================
// CALLS AND REQUESTS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCall {
    pub call_id: CallId,
    /// Unresolved callers have no patient link.
    pub patient_id: Option<PatientId>,
    pub nhs_number: String,
    pub caller_name: String,
    pub caller_phone: String,
    pub call_time: DateTime<Utc>,
    pub medical_condition: String,
    pub location: GeoPoint,
    pub severity: InjurySeverity,
    pub status: EmergencyCallStatus,
    pub assigned_ambulance_id: Option<AmbulanceId>,
    pub assigned_hospital_id: Option<HospitalId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEmergencyCall {
    pub patient_id: Option<PatientId>,
    pub nhs_number: String,
    pub caller_name: String,
    pub caller_phone: String,
    /// Defaults to the insert time.
    pub call_time: Option<DateTime<Utc>>,
    pub medical_condition: String,
    pub location: GeoPoint,
    pub severity: InjurySeverity,
    pub status: EmergencyCallStatus,
    pub assigned_hospital_id: Option<HospitalId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmbulanceRequest {
    pub request_id: RequestId,
    pub emergency_call_id: CallId,
    /// Target hospital; resolved before insert when the caller does not supply one.
    pub hospital_id: Option<HospitalId>,
    /// Set only once the request has been accepted.
    pub ambulance_id: Option<AmbulanceId>,
    pub severity: InjurySeverity,
    pub location: GeoPoint,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewAmbulanceRequest {
    pub emergency_call_id: CallId,
    pub hospital_id: Option<HospitalId>,
    pub severity: InjurySeverity,
    pub location: GeoPoint,
}

// ============================================================================
// FLEET AND HOSPITALS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub ambulance_id: AmbulanceId,
    pub ambulance_number: String,
    pub current_location: GeoPoint,
    pub status: AmbulanceStatus,
    /// Home base. Only ambulances based at a request's hospital are eligible for it.
    pub regional_hospital_id: Option<HospitalId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewAmbulance {
    pub ambulance_number: String,
    pub current_location: GeoPoint,
    pub status: AmbulanceStatus,
    pub regional_hospital_id: Option<HospitalId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbulanceStaff {
    pub staff_id: StaffId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub role: StaffRole,
    pub ambulance_id: Option<AmbulanceId>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAmbulanceStaff {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub role: StaffRole,
    pub ambulance_id: Option<AmbulanceId>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalHospital {
    pub hospital_id: HospitalId,
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub email: String,
    pub location: GeoPoint,
    /// Bed capacity.
    pub capacity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRegionalHospital {
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub email: String,
    pub location: GeoPoint,
    pub capacity: i64,
}
