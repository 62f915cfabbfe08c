//! Patient medical history.
//!
//! A patient's history is their most recently updated medical record together with the
//! call-out details that record references. Call-outs are appended to that latest record as
//! crews file them.

use crate::entities::{
    CallId, CallOutDetail, MedicalRecord, NewCallOutDetail, NewMedicalRecord, Patient, PatientId,
};
use crate::store::{Queries, Store};
use crate::{CoreError, CoreResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// A medical record and the call-outs it references, in append order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MedicalHistory {
    pub record: MedicalRecord,
    pub callouts: Vec<CallOutDetail>,
}

/// Patient demographics plus their history, if it could be loaded.
///
/// A missing or unreadable medical record does not hide the patient: the failure is carried in
/// `history` instead.
#[derive(Debug)]
pub struct HistoricalPatientData {
    pub patient: Patient,
    pub history: CoreResult<MedicalHistory>,
}

/// Reads and extends patients' medical history.
pub struct HistoryService<S> {
    store: Arc<S>,
}

impl<S> Clone for HistoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> HistoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Loads a patient and, separately, their medical history.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the patient does not exist and `CoreError::Store` if
    /// the patient row cannot be read. History failures are returned inside the result.
    pub fn get_historical_data(&self, patient_id: PatientId) -> CoreResult<HistoricalPatientData> {
        let patient = self.store.read("get_patient", |q| {
            q.get_patient(patient_id)?
                .ok_or_else(|| CoreError::not_found("patient", patient_id))
        })?;

        let history = self.get_medical_history(patient_id);
        if let Err(e) = &history {
            tracing::warn!(patient_id, "medical history unavailable: {}", e);
        }

        Ok(HistoricalPatientData { patient, history })
    }

    /// The patient's latest medical record and its call-outs.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the patient has no medical record.
    pub fn get_medical_history(&self, patient_id: PatientId) -> CoreResult<MedicalHistory> {
        self.store
            .read("get_medical_history", |q| history_in(q, patient_id))
    }

    /// The medical history of the patient linked to an emergency call.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the call does not exist, has no linked patient, or the
    /// patient has no medical record.
    pub fn get_medical_history_by_emergency_call(
        &self,
        call_id: CallId,
    ) -> CoreResult<MedicalHistory> {
        self.store.read("get_medical_history_by_emergency_call", |q| {
            let patient_id = patient_for_call(q, call_id)?;
            history_in(q, patient_id)
        })
    }

    /// Records a call-out and appends it to the patient's latest medical record.
    ///
    /// The insert and the append commit together. The record's `last_updated` is left as is.
    ///
    /// # Arguments
    ///
    /// * `detail` - The call-out filed by the crew
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the emergency call is unknown, has no linked patient, or the
    ///   patient has no medical record. Nothing is written.
    /// - `CoreError::Store` if either write fails. Nothing is written.
    pub fn insert_new_callout(&self, detail: NewCallOutDetail) -> CoreResult<CallOutDetail> {
        let created_at = Utc::now();
        let (detail_id, record_id) = self.store.transaction("insert_new_callout", |q| {
            let patient_id = patient_for_call(q, detail.call_id)?;
            let record = q
                .latest_medical_record(patient_id)?
                .ok_or_else(|| CoreError::not_found("medical record", patient_id))?;

            let detail_id = q.insert_callout(&detail, created_at)?;
            if !q.append_callout_id(record.record_id, detail_id)? {
                return Err(CoreError::InvariantViolation(format!(
                    "medical record {} disappeared while appending call-out",
                    record.record_id
                )));
            }
            Ok((detail_id, record.record_id))
        })?;

        tracing::info!(detail_id, record_id, call_id = detail.call_id, "call-out recorded");

        Ok(CallOutDetail {
            detail_id,
            call_id: detail.call_id,
            ambulance_id: detail.ambulance_id,
            action_taken: detail.action_taken,
            // Stored at whole-second precision.
            time_spent: std::time::Duration::from_secs(detail.time_spent.as_secs()),
            notes: detail.notes,
            created_at,
        })
    }

    /// Opens a new medical record for an existing patient.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the patient does not exist.
    pub fn create_medical_record(&self, record: NewMedicalRecord) -> CoreResult<MedicalRecord> {
        let last_updated = Utc::now();
        let record_id = self.store.transaction("create_medical_record", |q| {
            if q.get_patient(record.patient_id)?.is_none() {
                return Err(CoreError::not_found("patient", record.patient_id));
            }
            Ok(q.insert_medical_record(&record, last_updated)?)
        })?;

        tracing::info!(record_id, patient_id = record.patient_id, "medical record created");

        Ok(MedicalRecord {
            record_id,
            patient_id: record.patient_id,
            callout_ids: Vec::new(),
            conditions: record.conditions,
            medications: record.medications,
            allergies: record.allergies,
            notes: record.notes,
            last_updated,
        })
    }
}

fn patient_for_call(q: &dyn Queries, call_id: CallId) -> CoreResult<PatientId> {
    let call = q
        .get_emergency_call(call_id)?
        .ok_or_else(|| CoreError::not_found("emergency call", call_id))?;
    call.patient_id
        .ok_or_else(|| CoreError::not_found("patient for emergency call", call_id))
}

fn history_in(q: &dyn Queries, patient_id: PatientId) -> CoreResult<MedicalHistory> {
    let record = q
        .latest_medical_record(patient_id)?
        .ok_or_else(|| CoreError::not_found("medical record", patient_id))?;
    let callouts = q.callouts_by_ids(&record.callout_ids)?;
    Ok(MedicalHistory { record, callouts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AmbulanceId;
    use crate::geo::GeoPoint;
    use crate::store::SqliteStore;
    use crate::test_support::{
        memory_store, seed_ambulance, seed_call, seed_hospital, seed_patient, seed_record,
    };
    use std::time::Duration;

    struct Fixture {
        store: Arc<SqliteStore>,
        service: HistoryService<SqliteStore>,
        ambulance_id: AmbulanceId,
    }

    fn fixture() -> Fixture {
        let store = memory_store();
        let hospital_id = seed_hospital(&store, "Royal Infirmary", GeoPoint::new(55.92, -3.13));
        let ambulance_id = seed_ambulance(&store, "AMB-001", hospital_id);
        Fixture {
            service: HistoryService::new(Arc::clone(&store)),
            store,
            ambulance_id,
        }
    }

    fn callout(call_id: CallId, ambulance_id: AmbulanceId, minutes: u64) -> NewCallOutDetail {
        NewCallOutDetail {
            call_id,
            ambulance_id,
            action_taken: "stabilised and transported".into(),
            time_spent: Duration::from_secs(minutes * 60),
            notes: "patient conscious on arrival".into(),
        }
    }

    fn stored_callouts(store: &SqliteStore) -> Vec<CallOutDetail> {
        store
            .read("all_callouts", |q| Ok(q.callouts_by_ids(&[1, 2, 3])?))
            .unwrap()
    }

    #[test]
    fn test_historical_data_includes_record_and_callouts() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "John", "Doe", "1 Main St");
        seed_record(&f.store, patient_id);
        let call_id = seed_call(&f.store, Some(patient_id));
        let first = f.service.insert_new_callout(callout(call_id, f.ambulance_id, 30)).unwrap();
        let second = f.service.insert_new_callout(callout(call_id, f.ambulance_id, 45)).unwrap();

        let data = f.service.get_historical_data(patient_id).unwrap();
        let history = data.history.expect("history should load");

        assert_eq!(data.patient.last_name, "Doe");
        assert_eq!(history.record.callout_ids, vec![first.detail_id, second.detail_id]);
        assert_eq!(history.callouts, vec![first, second]);
    }

    #[test]
    fn test_missing_record_is_soft_failure() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "Jane", "Roe", "4 Park Ln");

        let data = f
            .service
            .get_historical_data(patient_id)
            .expect("patient lookup should still succeed");

        assert_eq!(data.patient.patient_id, patient_id);
        assert!(matches!(
            data.history,
            Err(CoreError::NotFound { entity: "medical record", .. })
        ));
    }

    #[test]
    fn test_missing_patient_is_hard_failure() {
        let f = fixture();
        let err = f.service.get_historical_data(77).expect_err("unknown patient");
        assert!(matches!(err, CoreError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn test_callout_append_keeps_last_updated() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "John", "Doe", "1 Main St");
        seed_record(&f.store, patient_id);
        let call_id = seed_call(&f.store, Some(patient_id));
        let before = f.service.get_medical_history(patient_id).unwrap().record;

        f.service.insert_new_callout(callout(call_id, f.ambulance_id, 20)).unwrap();

        let after = f.service.get_medical_history(patient_id).unwrap().record;
        assert_eq!(after.last_updated, before.last_updated);
        assert_eq!(after.callout_ids.len(), 1);
    }

    #[test]
    fn test_callout_for_call_without_patient_writes_nothing() {
        let f = fixture();
        let call_id = seed_call(&f.store, None);

        let err = f
            .service
            .insert_new_callout(callout(call_id, f.ambulance_id, 10))
            .expect_err("call without patient");

        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(stored_callouts(&f.store).is_empty());
    }

    #[test]
    fn test_callout_for_patient_without_record_writes_nothing() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "Jane", "Roe", "4 Park Ln");
        let call_id = seed_call(&f.store, Some(patient_id));

        let err = f
            .service
            .insert_new_callout(callout(call_id, f.ambulance_id, 10))
            .expect_err("patient without record");

        assert!(matches!(err, CoreError::NotFound { entity: "medical record", .. }));
        assert!(stored_callouts(&f.store).is_empty());
    }

    #[test]
    fn test_failed_append_rolls_back_callout_insert() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "John", "Doe", "1 Main St");
        seed_record(&f.store, patient_id);
        let call_id = seed_call(&f.store, Some(patient_id));
        f.store
            .execute_raw(
                "CREATE TRIGGER refuse_append BEFORE UPDATE ON medical_records \
                 BEGIN SELECT RAISE(ABORT, 'append refused'); END;",
            )
            .unwrap();

        let err = f
            .service
            .insert_new_callout(callout(call_id, f.ambulance_id, 10))
            .expect_err("append should fail");

        assert!(matches!(err, CoreError::Store(_)));
        assert!(stored_callouts(&f.store).is_empty());
        assert!(f
            .service
            .get_medical_history(patient_id)
            .unwrap()
            .record
            .callout_ids
            .is_empty());
    }

    #[test]
    fn test_history_by_emergency_call() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "John", "Doe", "1 Main St");
        let record_id = seed_record(&f.store, patient_id);
        let call_id = seed_call(&f.store, Some(patient_id));
        let orphan_call = seed_call(&f.store, None);

        let history = f.service.get_medical_history_by_emergency_call(call_id).unwrap();
        assert_eq!(history.record.record_id, record_id);

        assert!(matches!(
            f.service.get_medical_history_by_emergency_call(orphan_call),
            Err(CoreError::NotFound { entity: "patient for emergency call", .. })
        ));
    }

    #[test]
    fn test_create_medical_record_becomes_latest() {
        let f = fixture();
        let patient_id = seed_patient(&f.store, "John", "Doe", "1 Main St");
        seed_record(&f.store, patient_id);

        let created = f
            .service
            .create_medical_record(NewMedicalRecord {
                patient_id,
                allergies: vec!["penicillin".into()],
                ..Default::default()
            })
            .unwrap();

        let history = f.service.get_medical_history(patient_id).unwrap();
        assert_eq!(history.record, created);
        assert!(history.callouts.is_empty());

        assert!(matches!(
            f.service.create_medical_record(NewMedicalRecord {
                patient_id: 999,
                ..Default::default()
            }),
            Err(CoreError::NotFound { entity: "patient", .. })
        ));
    }
}
