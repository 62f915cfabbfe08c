//! Dispatch wire messages (`kwik.v1`).
//!
//! Every enum reserves `0` for an unknown value. Nullable references are `optional` scalars so
//! "absent" and "zero" stay distinguishable.

use prost_types::{Duration, Timestamp};

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EmergencyCallStatus {
    Unknown = 0,
    Pending = 1,
    Dispatched = 2,
    Completed = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AmbulanceStatus {
    Unknown = 0,
    Available = 1,
    OnCall = 2,
    Maintenance = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum InjurySeverity {
    Unknown = 0,
    Low = 1,
    Moderate = 2,
    High = 3,
    Critical = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StaffRole {
    Unknown = 0,
    Paramedic = 1,
    Driver = 2,
    Operator = 3,
    HospitalStaff = 4,
    Other = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RequestStatus {
    Unknown = 0,
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    Completed = 4,
}

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Location {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Patient {
    #[prost(int64, tag = "1")]
    pub patient_id: i64,
    #[prost(string, optional, tag = "2")]
    pub nhs_number: Option<String>,
    #[prost(string, tag = "3")]
    pub first_name: String,
    #[prost(string, tag = "4")]
    pub last_name: String,
    /// `YYYY-MM-DD`, empty when unknown.
    #[prost(string, tag = "5")]
    pub date_of_birth: String,
    #[prost(string, tag = "6")]
    pub address: String,
    #[prost(string, tag = "7")]
    pub phone_number: String,
    #[prost(string, tag = "8")]
    pub email: String,
    #[prost(message, optional, tag = "9")]
    pub created_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CallOutDetail {
    #[prost(int64, tag = "1")]
    pub detail_id: i64,
    #[prost(int64, tag = "2")]
    pub call_id: i64,
    #[prost(int64, tag = "3")]
    pub ambulance_id: i64,
    #[prost(string, tag = "4")]
    pub action_taken: String,
    #[prost(message, optional, tag = "5")]
    pub time_spent: Option<Duration>,
    #[prost(string, tag = "6")]
    pub notes: String,
    #[prost(message, optional, tag = "7")]
    pub created_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MedicalRecord {
    #[prost(int64, tag = "1")]
    pub record_id: i64,
    #[prost(int64, tag = "2")]
    pub patient_id: i64,
    #[prost(int64, repeated, tag = "3")]
    pub callout_ids: Vec<i64>,
    #[prost(string, repeated, tag = "4")]
    pub conditions: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub medications: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub allergies: Vec<String>,
    #[prost(string, repeated, tag = "7")]
    pub notes: Vec<String>,
    #[prost(message, optional, tag = "8")]
    pub last_updated: Option<Timestamp>,
    /// Populated when the record is sent as part of a patient's history.
    #[prost(message, repeated, tag = "9")]
    pub callouts: Vec<CallOutDetail>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EmergencyCall {
    #[prost(int64, tag = "1")]
    pub call_id: i64,
    #[prost(int64, optional, tag = "2")]
    pub patient_id: Option<i64>,
    #[prost(string, tag = "3")]
    pub nhs_number: String,
    #[prost(string, tag = "4")]
    pub caller_name: String,
    #[prost(string, tag = "5")]
    pub caller_phone: String,
    #[prost(message, optional, tag = "6")]
    pub call_time: Option<Timestamp>,
    #[prost(string, tag = "7")]
    pub medical_condition: String,
    #[prost(message, optional, tag = "8")]
    pub location: Option<Location>,
    #[prost(enumeration = "InjurySeverity", tag = "9")]
    pub severity: i32,
    #[prost(enumeration = "EmergencyCallStatus", tag = "10")]
    pub status: i32,
    #[prost(int64, optional, tag = "11")]
    pub assigned_ambulance_id: Option<i64>,
    #[prost(int64, optional, tag = "12")]
    pub assigned_hospital_id: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Ambulance {
    #[prost(int64, tag = "1")]
    pub ambulance_id: i64,
    #[prost(string, tag = "2")]
    pub ambulance_number: String,
    #[prost(message, optional, tag = "3")]
    pub current_location: Option<Location>,
    #[prost(enumeration = "AmbulanceStatus", tag = "4")]
    pub status: i32,
    #[prost(int64, optional, tag = "5")]
    pub regional_hospital_id: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AmbulanceRequest {
    #[prost(int64, tag = "1")]
    pub request_id: i64,
    #[prost(int64, tag = "2")]
    pub emergency_call_id: i64,
    #[prost(int64, optional, tag = "3")]
    pub hospital_id: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub ambulance_id: Option<i64>,
    #[prost(enumeration = "InjurySeverity", tag = "5")]
    pub severity: i32,
    #[prost(message, optional, tag = "6")]
    pub location: Option<Location>,
    #[prost(enumeration = "RequestStatus", tag = "7")]
    pub status: i32,
    #[prost(message, optional, tag = "8")]
    pub created_at: Option<Timestamp>,
    #[prost(message, optional, tag = "9")]
    pub updated_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AmbulanceStaff {
    #[prost(int64, tag = "1")]
    pub staff_id: i64,
    #[prost(string, tag = "2")]
    pub first_name: String,
    #[prost(string, tag = "3")]
    pub last_name: String,
    #[prost(string, tag = "4")]
    pub phone_number: String,
    #[prost(string, tag = "5")]
    pub email: String,
    #[prost(enumeration = "StaffRole", tag = "6")]
    pub role: i32,
    #[prost(int64, optional, tag = "7")]
    pub ambulance_id: Option<i64>,
    #[prost(bool, tag = "8")]
    pub is_active: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegionalHospital {
    #[prost(int64, tag = "1")]
    pub hospital_id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub address: String,
    #[prost(string, tag = "4")]
    pub phone_number: String,
    #[prost(string, tag = "5")]
    pub email: String,
    #[prost(message, optional, tag = "6")]
    pub location: Option<Location>,
    #[prost(int64, tag = "7")]
    pub capacity: i64,
    #[prost(message, optional, tag = "8")]
    pub created_at: Option<Timestamp>,
}
