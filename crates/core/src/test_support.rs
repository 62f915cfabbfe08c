//! Seeding helpers shared by the service tests.

use crate::entities::{
    AmbulanceId, CallId, HospitalId, NewAmbulance, NewAmbulanceRequest, NewEmergencyCall,
    NewMedicalRecord, NewPatient, NewRegionalHospital, PatientId, RecordId, RequestId,
};
use crate::geo::GeoPoint;
use crate::status::{AmbulanceStatus, InjurySeverity};
use crate::store::{SqliteStore, Store};
use chrono::Utc;
use std::sync::Arc;

pub(crate) fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().expect("in-memory store should open"))
}

pub(crate) fn seed_patient(
    store: &SqliteStore,
    first_name: &str,
    last_name: &str,
    address: &str,
) -> PatientId {
    let patient = NewPatient {
        first_name: first_name.into(),
        last_name: last_name.into(),
        address: address.into(),
        ..Default::default()
    };
    store
        .transaction("seed_patient", |q| Ok(q.insert_patient(&patient, Utc::now())?))
        .expect("seeding a patient should succeed")
}

pub(crate) fn seed_record(store: &SqliteStore, patient_id: PatientId) -> RecordId {
    let record = NewMedicalRecord {
        patient_id,
        conditions: vec!["hypertension".into()],
        ..Default::default()
    };
    store
        .transaction("seed_record", |q| {
            Ok(q.insert_medical_record(&record, Utc::now())?)
        })
        .expect("seeding a medical record should succeed")
}

pub(crate) fn seed_hospital(store: &SqliteStore, name: &str, at: GeoPoint) -> HospitalId {
    let hospital = NewRegionalHospital {
        name: name.into(),
        location: at,
        capacity: 50,
        ..Default::default()
    };
    store
        .transaction("seed_hospital", |q| Ok(q.insert_hospital(&hospital, Utc::now())?))
        .expect("seeding a hospital should succeed")
}

pub(crate) fn seed_ambulance(
    store: &SqliteStore,
    number: &str,
    hospital_id: HospitalId,
) -> AmbulanceId {
    let ambulance = NewAmbulance {
        ambulance_number: number.into(),
        current_location: GeoPoint::new(55.95, -3.19),
        status: AmbulanceStatus::Available,
        regional_hospital_id: Some(hospital_id),
    };
    store
        .transaction("seed_ambulance", |q| Ok(q.insert_ambulance(&ambulance)?))
        .expect("seeding an ambulance should succeed")
}

pub(crate) fn seed_call(store: &SqliteStore, patient_id: Option<PatientId>) -> CallId {
    let call = NewEmergencyCall {
        patient_id,
        caller_name: "Alex Reid".into(),
        medical_condition: "chest pain".into(),
        location: GeoPoint::new(55.95, -3.19),
        severity: InjurySeverity::High,
        ..Default::default()
    };
    store
        .transaction("seed_call", |q| Ok(q.insert_emergency_call(&call, Utc::now())?))
        .expect("seeding an emergency call should succeed")
}

pub(crate) fn seed_request(
    store: &SqliteStore,
    call_id: CallId,
    hospital_id: HospitalId,
) -> RequestId {
    let request = NewAmbulanceRequest {
        emergency_call_id: call_id,
        hospital_id: Some(hospital_id),
        severity: InjurySeverity::High,
        location: GeoPoint::new(55.95, -3.19),
    };
    store
        .transaction("seed_request", |q| {
            Ok(q.insert_ambulance_request(&request, hospital_id, Utc::now())?)
        })
        .expect("seeding an ambulance request should succeed")
}

/// Makes the next ambulance request id `next_id`.
pub(crate) fn set_next_request_id(store: &SqliteStore, next_id: RequestId) {
    store
        .execute_raw(&format!(
            "DELETE FROM sqlite_sequence WHERE name = 'ambulance_requests'; \
             INSERT INTO sqlite_sequence (name, seq) VALUES ('ambulance_requests', {});",
            next_id - 1
        ))
        .expect("setting the request id sequence should succeed");
}
