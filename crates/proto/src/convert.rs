//! Conversions between `kwik-core` entities and wire messages.
//!
//! Entity to message is infallible. Message to entity goes through `TryFrom` and rejects
//! unknown enum values, missing required timestamps and locations, and non-positive
//! identifiers.

use crate::pb;
use chrono::{DateTime, NaiveDate, Utc};
use kwik_core::entities::{
    Ambulance, AmbulanceRequest, AmbulanceStaff, CallOutDetail, EmergencyCall, MedicalRecord,
    Patient, RegionalHospital,
};
use kwik_core::history::MedicalHistory;
use kwik_core::status as core_status;
use kwik_core::GeoPoint;
use prost_types::{Duration as WireDuration, Timestamp};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown {field} value: {value}")]
    UnknownEnumValue { field: &'static str, value: i32 },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("{field} must be a positive identifier, got {value}")]
    InvalidIdentifier { field: &'static str, value: i64 },
    #[error("invalid timestamp in {0}")]
    InvalidTimestamp(&'static str),
    #[error("invalid duration in {0}")]
    InvalidDuration(&'static str),
    #[error("invalid date in {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },
}

pub type WireResult<T> = std::result::Result<T, WireError>;

// ============================================================================
// ENUMS
// ============================================================================

macro_rules! enum_mapping {
    ($name:ident, $decode:ident, $field:literal { $($variant:ident),+ $(,)? }) => {
        impl From<core_status::$name> for pb::$name {
            fn from(value: core_status::$name) -> Self {
                match value {
                    $( core_status::$name::$variant => pb::$name::$variant, )+
                }
            }
        }

        fn $decode(value: i32) -> WireResult<core_status::$name> {
            match pb::$name::try_from(value) {
                $( Ok(pb::$name::$variant) => Ok(core_status::$name::$variant), )+
                _ => Err(WireError::UnknownEnumValue {
                    field: $field,
                    value,
                }),
            }
        }
    };
}

enum_mapping!(EmergencyCallStatus, call_status, "emergency call status" {
    Pending,
    Dispatched,
    Completed,
});
enum_mapping!(AmbulanceStatus, ambulance_status, "ambulance status" {
    Available,
    OnCall,
    Maintenance,
});
enum_mapping!(InjurySeverity, severity, "injury severity" {
    Low,
    Moderate,
    High,
    Critical,
});
enum_mapping!(StaffRole, staff_role, "staff role" {
    Paramedic,
    Driver,
    Operator,
    HospitalStaff,
    Other,
});
enum_mapping!(RequestStatus, request_status, "request status" {
    Pending,
    Accepted,
    Rejected,
    Completed,
});

fn wire_enum(value: impl Into<i32>) -> i32 {
    value.into()
}

// ============================================================================
// SCALAR HELPERS
// ============================================================================

fn timestamp(at: DateTime<Utc>) -> Option<Timestamp> {
    Some(Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    })
}

fn from_timestamp(field: &'static str, ts: Option<Timestamp>) -> WireResult<DateTime<Utc>> {
    let ts = ts.ok_or(WireError::MissingField(field))?;
    let nanos = u32::try_from(ts.nanos).map_err(|_| WireError::InvalidTimestamp(field))?;
    DateTime::from_timestamp(ts.seconds, nanos).ok_or(WireError::InvalidTimestamp(field))
}

fn duration(value: Duration) -> Option<WireDuration> {
    Some(WireDuration {
        seconds: i64::try_from(value.as_secs()).unwrap_or(i64::MAX),
        nanos: value.subsec_nanos() as i32,
    })
}

fn from_duration(field: &'static str, value: Option<WireDuration>) -> WireResult<Duration> {
    let value = value.ok_or(WireError::MissingField(field))?;
    let seconds = u64::try_from(value.seconds).map_err(|_| WireError::InvalidDuration(field))?;
    let nanos = u32::try_from(value.nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .ok_or(WireError::InvalidDuration(field))?;
    Ok(Duration::new(seconds, nanos))
}

fn location(point: GeoPoint) -> Option<pb::Location> {
    Some(pb::Location {
        latitude: point.latitude,
        longitude: point.longitude,
    })
}

fn from_location(field: &'static str, value: Option<pb::Location>) -> WireResult<GeoPoint> {
    let value = value.ok_or(WireError::MissingField(field))?;
    Ok(GeoPoint::new(value.latitude, value.longitude))
}

fn id(field: &'static str, value: i64) -> WireResult<i64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(WireError::InvalidIdentifier { field, value })
    }
}

fn optional_id(field: &'static str, value: Option<i64>) -> WireResult<Option<i64>> {
    value.map(|v| id(field, v)).transpose()
}

// ============================================================================
// ENTITY -> MESSAGE
// ============================================================================

impl From<&Patient> for pb::Patient {
    fn from(p: &Patient) -> Self {
        Self {
            patient_id: p.patient_id,
            nhs_number: p.nhs_number.clone(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            date_of_birth: p
                .date_of_birth
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            address: p.address.clone(),
            phone_number: p.phone_number.clone(),
            email: p.email.clone(),
            created_at: timestamp(p.created_at),
        }
    }
}

impl From<&CallOutDetail> for pb::CallOutDetail {
    fn from(c: &CallOutDetail) -> Self {
        Self {
            detail_id: c.detail_id,
            call_id: c.call_id,
            ambulance_id: c.ambulance_id,
            action_taken: c.action_taken.clone(),
            time_spent: duration(c.time_spent),
            notes: c.notes.clone(),
            created_at: timestamp(c.created_at),
        }
    }
}

impl From<&MedicalRecord> for pb::MedicalRecord {
    fn from(r: &MedicalRecord) -> Self {
        Self {
            record_id: r.record_id,
            patient_id: r.patient_id,
            callout_ids: r.callout_ids.clone(),
            conditions: r.conditions.clone(),
            medications: r.medications.clone(),
            allergies: r.allergies.clone(),
            notes: r.notes.clone(),
            last_updated: timestamp(r.last_updated),
            callouts: Vec::new(),
        }
    }
}

impl From<&MedicalHistory> for pb::MedicalRecord {
    fn from(h: &MedicalHistory) -> Self {
        Self {
            callouts: h.callouts.iter().map(pb::CallOutDetail::from).collect(),
            ..pb::MedicalRecord::from(&h.record)
        }
    }
}

impl From<&EmergencyCall> for pb::EmergencyCall {
    fn from(c: &EmergencyCall) -> Self {
        Self {
            call_id: c.call_id,
            patient_id: c.patient_id,
            nhs_number: c.nhs_number.clone(),
            caller_name: c.caller_name.clone(),
            caller_phone: c.caller_phone.clone(),
            call_time: timestamp(c.call_time),
            medical_condition: c.medical_condition.clone(),
            location: location(c.location),
            severity: wire_enum(pb::InjurySeverity::from(c.severity)),
            status: wire_enum(pb::EmergencyCallStatus::from(c.status)),
            assigned_ambulance_id: c.assigned_ambulance_id,
            assigned_hospital_id: c.assigned_hospital_id,
        }
    }
}

impl From<&Ambulance> for pb::Ambulance {
    fn from(a: &Ambulance) -> Self {
        Self {
            ambulance_id: a.ambulance_id,
            ambulance_number: a.ambulance_number.clone(),
            current_location: location(a.current_location),
            status: wire_enum(pb::AmbulanceStatus::from(a.status)),
            regional_hospital_id: a.regional_hospital_id,
        }
    }
}

impl From<&AmbulanceRequest> for pb::AmbulanceRequest {
    fn from(r: &AmbulanceRequest) -> Self {
        Self {
            request_id: r.request_id,
            emergency_call_id: r.emergency_call_id,
            hospital_id: r.hospital_id,
            ambulance_id: r.ambulance_id,
            severity: wire_enum(pb::InjurySeverity::from(r.severity)),
            location: location(r.location),
            status: wire_enum(pb::RequestStatus::from(r.status)),
            created_at: timestamp(r.created_at),
            updated_at: timestamp(r.updated_at),
        }
    }
}

impl From<&AmbulanceStaff> for pb::AmbulanceStaff {
    fn from(s: &AmbulanceStaff) -> Self {
        Self {
            staff_id: s.staff_id,
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            phone_number: s.phone_number.clone(),
            email: s.email.clone(),
            role: wire_enum(pb::StaffRole::from(s.role)),
            ambulance_id: s.ambulance_id,
            is_active: s.is_active,
        }
    }
}

impl From<&RegionalHospital> for pb::RegionalHospital {
    fn from(h: &RegionalHospital) -> Self {
        Self {
            hospital_id: h.hospital_id,
            name: h.name.clone(),
            address: h.address.clone(),
            phone_number: h.phone_number.clone(),
            email: h.email.clone(),
            location: location(h.location),
            capacity: h.capacity,
            created_at: timestamp(h.created_at),
        }
    }
}

// ============================================================================
// MESSAGE -> ENTITY
// ============================================================================

impl TryFrom<pb::Patient> for Patient {
    type Error = WireError;

    fn try_from(p: pb::Patient) -> WireResult<Self> {
        let date_of_birth = match p.date_of_birth.trim() {
            "" => None,
            text => Some(NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| {
                WireError::InvalidDate {
                    field: "patient.date_of_birth",
                    value: text.to_owned(),
                }
            })?),
        };

        Ok(Self {
            patient_id: id("patient.patient_id", p.patient_id)?,
            nhs_number: p.nhs_number,
            first_name: p.first_name,
            last_name: p.last_name,
            date_of_birth,
            address: p.address,
            phone_number: p.phone_number,
            email: p.email,
            created_at: from_timestamp("patient.created_at", p.created_at)?,
        })
    }
}

impl TryFrom<pb::CallOutDetail> for CallOutDetail {
    type Error = WireError;

    fn try_from(c: pb::CallOutDetail) -> WireResult<Self> {
        Ok(Self {
            detail_id: id("call_out_detail.detail_id", c.detail_id)?,
            call_id: id("call_out_detail.call_id", c.call_id)?,
            ambulance_id: id("call_out_detail.ambulance_id", c.ambulance_id)?,
            action_taken: c.action_taken,
            time_spent: from_duration("call_out_detail.time_spent", c.time_spent)?,
            notes: c.notes,
            created_at: from_timestamp("call_out_detail.created_at", c.created_at)?,
        })
    }
}

impl TryFrom<pb::MedicalRecord> for MedicalRecord {
    type Error = WireError;

    /// Embedded call-outs are dropped; decode into [`MedicalHistory`] to keep them.
    fn try_from(r: pb::MedicalRecord) -> WireResult<Self> {
        Ok(Self {
            record_id: id("medical_record.record_id", r.record_id)?,
            patient_id: id("medical_record.patient_id", r.patient_id)?,
            callout_ids: r.callout_ids,
            conditions: r.conditions,
            medications: r.medications,
            allergies: r.allergies,
            notes: r.notes,
            last_updated: from_timestamp("medical_record.last_updated", r.last_updated)?,
        })
    }
}

impl TryFrom<pb::MedicalRecord> for MedicalHistory {
    type Error = WireError;

    fn try_from(mut r: pb::MedicalRecord) -> WireResult<Self> {
        let callouts = std::mem::take(&mut r.callouts)
            .into_iter()
            .map(CallOutDetail::try_from)
            .collect::<WireResult<Vec<_>>>()?;
        Ok(Self {
            record: MedicalRecord::try_from(r)?,
            callouts,
        })
    }
}

impl TryFrom<pb::EmergencyCall> for EmergencyCall {
    type Error = WireError;

    fn try_from(c: pb::EmergencyCall) -> WireResult<Self> {
        Ok(Self {
            call_id: id("emergency_call.call_id", c.call_id)?,
            patient_id: optional_id("emergency_call.patient_id", c.patient_id)?,
            nhs_number: c.nhs_number,
            caller_name: c.caller_name,
            caller_phone: c.caller_phone,
            call_time: from_timestamp("emergency_call.call_time", c.call_time)?,
            medical_condition: c.medical_condition,
            location: from_location("emergency_call.location", c.location)?,
            severity: severity(c.severity)?,
            status: call_status(c.status)?,
            assigned_ambulance_id: optional_id(
                "emergency_call.assigned_ambulance_id",
                c.assigned_ambulance_id,
            )?,
            assigned_hospital_id: optional_id(
                "emergency_call.assigned_hospital_id",
                c.assigned_hospital_id,
            )?,
        })
    }
}

impl TryFrom<pb::Ambulance> for Ambulance {
    type Error = WireError;

    fn try_from(a: pb::Ambulance) -> WireResult<Self> {
        Ok(Self {
            ambulance_id: id("ambulance.ambulance_id", a.ambulance_id)?,
            ambulance_number: a.ambulance_number,
            current_location: from_location("ambulance.current_location", a.current_location)?,
            status: ambulance_status(a.status)?,
            regional_hospital_id: optional_id(
                "ambulance.regional_hospital_id",
                a.regional_hospital_id,
            )?,
        })
    }
}

impl TryFrom<pb::AmbulanceRequest> for AmbulanceRequest {
    type Error = WireError;

    fn try_from(r: pb::AmbulanceRequest) -> WireResult<Self> {
        Ok(Self {
            request_id: id("ambulance_request.request_id", r.request_id)?,
            emergency_call_id: id("ambulance_request.emergency_call_id", r.emergency_call_id)?,
            hospital_id: optional_id("ambulance_request.hospital_id", r.hospital_id)?,
            ambulance_id: optional_id("ambulance_request.ambulance_id", r.ambulance_id)?,
            severity: severity(r.severity)?,
            location: from_location("ambulance_request.location", r.location)?,
            status: request_status(r.status)?,
            created_at: from_timestamp("ambulance_request.created_at", r.created_at)?,
            updated_at: from_timestamp("ambulance_request.updated_at", r.updated_at)?,
        })
    }
}

impl TryFrom<pb::AmbulanceStaff> for AmbulanceStaff {
    type Error = WireError;

    fn try_from(s: pb::AmbulanceStaff) -> WireResult<Self> {
        Ok(Self {
            staff_id: id("ambulance_staff.staff_id", s.staff_id)?,
            first_name: s.first_name,
            last_name: s.last_name,
            phone_number: s.phone_number,
            email: s.email,
            role: staff_role(s.role)?,
            ambulance_id: optional_id("ambulance_staff.ambulance_id", s.ambulance_id)?,
            is_active: s.is_active,
        })
    }
}

impl TryFrom<pb::RegionalHospital> for RegionalHospital {
    type Error = WireError;

    fn try_from(h: pb::RegionalHospital) -> WireResult<Self> {
        Ok(Self {
            hospital_id: id("regional_hospital.hospital_id", h.hospital_id)?,
            name: h.name,
            address: h.address,
            phone_number: h.phone_number,
            email: h.email,
            location: from_location("regional_hospital.location", h.location)?,
            capacity: h.capacity,
            created_at: from_timestamp("regional_hospital.created_at", h.created_at)?,
        })
    }
}
