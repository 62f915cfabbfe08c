//! Patient registration and emergency call intake.

use crate::entities::{CallId, EmergencyCall, NewEmergencyCall, NewPatient, Patient, PatientId};
use crate::store::Store;
use crate::text::NonEmptyText;
use crate::{CoreError, CoreResult};
use chrono::Utc;
use std::sync::Arc;

/// Writes and reads the records created when a call comes in.
pub struct IntakeService<S> {
    store: Arc<S>,
}

impl<S> Clone for IntakeService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> IntakeService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers a patient.
    ///
    /// A blank NHS number is stored as absent.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidInput` if the first or last name is blank.
    /// - `CoreError::Store` with a `Constraint` kind if the NHS number is already registered.
    pub fn register_patient(&self, mut patient: NewPatient) -> CoreResult<Patient> {
        let first_name = NonEmptyText::new(&patient.first_name)
            .ok_or_else(|| CoreError::InvalidInput("first name cannot be empty".into()))?;
        let last_name = NonEmptyText::new(&patient.last_name)
            .ok_or_else(|| CoreError::InvalidInput("last name cannot be empty".into()))?;
        patient.first_name = first_name.as_str().to_owned();
        patient.last_name = last_name.as_str().to_owned();
        patient.nhs_number = patient
            .nhs_number
            .as_deref()
            .and_then(NonEmptyText::new)
            .map(|n| n.as_str().to_owned());

        let created_at = Utc::now();
        let patient_id = self.store.transaction("register_patient", |q| {
            Ok(q.insert_patient(&patient, created_at)?)
        })?;
        tracing::info!(patient_id, "registered patient");

        Ok(Patient {
            patient_id,
            nhs_number: patient.nhs_number,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            address: patient.address,
            phone_number: patient.phone_number,
            email: patient.email,
            created_at,
        })
    }

    pub fn get_patient_by_id(&self, patient_id: PatientId) -> CoreResult<Patient> {
        self.store.read("get_patient_by_id", |q| {
            q.get_patient(patient_id)?
                .ok_or_else(|| CoreError::not_found("patient", patient_id))
        })
    }

    pub fn find_patient_by_nhs_number(&self, nhs_number: &str) -> CoreResult<Patient> {
        let nhs_number = nhs_number.trim();
        self.store.read("find_patient_by_nhs_number", |q| {
            q.get_patient_by_nhs_number(nhs_number)?
                .ok_or_else(|| CoreError::not_found("patient with NHS number", nhs_number))
        })
    }

    /// Records an incoming emergency call.
    ///
    /// `call_time` defaults to now. New calls normally carry the default
    /// `AMBULANCE_PENDING` status.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidInput` if the location is not a valid coordinate.
    /// - `CoreError::NotFound` if a linked patient or hospital does not exist.
    pub fn insert_new_emergency_call(&self, call: NewEmergencyCall) -> CoreResult<EmergencyCall> {
        call.location.validate()?;
        let call_time = call.call_time.unwrap_or_else(Utc::now);

        let call_id = self.store.transaction("insert_new_emergency_call", |q| {
            if let Some(patient_id) = call.patient_id {
                if q.get_patient(patient_id)?.is_none() {
                    return Err(CoreError::not_found("patient", patient_id));
                }
            }
            if let Some(hospital_id) = call.assigned_hospital_id {
                if q.get_hospital(hospital_id)?.is_none() {
                    return Err(CoreError::not_found("regional hospital", hospital_id));
                }
            }
            Ok(q.insert_emergency_call(&call, call_time)?)
        })?;
        tracing::info!(call_id, severity = %call.severity, "emergency call recorded");

        Ok(EmergencyCall {
            call_id,
            patient_id: call.patient_id,
            nhs_number: call.nhs_number,
            caller_name: call.caller_name,
            caller_phone: call.caller_phone,
            call_time,
            medical_condition: call.medical_condition,
            location: call.location,
            severity: call.severity,
            status: call.status,
            assigned_ambulance_id: None,
            assigned_hospital_id: call.assigned_hospital_id,
        })
    }

    pub fn get_emergency_call(&self, call_id: CallId) -> CoreResult<EmergencyCall> {
        self.store.read("get_emergency_call", |q| {
            q.get_emergency_call(call_id)?
                .ok_or_else(|| CoreError::not_found("emergency call", call_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreErrorKind};
    use crate::geo::GeoPoint;
    use crate::status::{EmergencyCallStatus, InjurySeverity};
    use crate::test_support::memory_store;

    fn patient(nhs_number: Option<&str>) -> NewPatient {
        NewPatient {
            nhs_number: nhs_number.map(str::to_owned),
            first_name: " John ".into(),
            last_name: "Doe".into(),
            address: "123 Main St, Anytown".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_register_and_lookup_patient() {
        let intake = IntakeService::new(memory_store());

        let registered = intake
            .register_patient(patient(Some("9434765919")))
            .expect("register_patient should succeed");

        assert_eq!(registered.first_name, "John");
        assert_eq!(intake.get_patient_by_id(registered.patient_id).unwrap(), registered);
        assert_eq!(
            intake.find_patient_by_nhs_number(" 9434765919 ").unwrap(),
            registered
        );
    }

    #[test]
    fn test_blank_nhs_number_is_stored_as_absent() {
        let intake = IntakeService::new(memory_store());

        let a = intake.register_patient(patient(Some("  "))).unwrap();
        let b = intake.register_patient(patient(Some(""))).unwrap();

        assert_eq!(a.nhs_number, None);
        assert_eq!(b.nhs_number, None);
    }

    #[test]
    fn test_duplicate_nhs_number_is_a_constraint_error() {
        let intake = IntakeService::new(memory_store());
        intake.register_patient(patient(Some("4010232137"))).unwrap();

        let err = intake
            .register_patient(patient(Some("4010232137")))
            .expect_err("duplicate NHS number");
        assert!(matches!(
            err,
            CoreError::Store(StoreError {
                kind: StoreErrorKind::Constraint(_),
                ..
            })
        ));
    }

    #[test]
    fn test_register_rejects_blank_names() {
        let intake = IntakeService::new(memory_store());
        let mut nameless = patient(None);
        nameless.last_name = "   ".into();

        assert!(matches!(
            intake.register_patient(nameless),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_emergency_call_defaults_to_pending() {
        let intake = IntakeService::new(memory_store());
        let registered = intake.register_patient(patient(None)).unwrap();

        let call = intake
            .insert_new_emergency_call(NewEmergencyCall {
                patient_id: Some(registered.patient_id),
                caller_name: "Alex Reid".into(),
                caller_phone: "07700 900123".into(),
                medical_condition: "fall from ladder".into(),
                location: GeoPoint::new(55.95, -3.19),
                severity: InjurySeverity::Moderate,
                ..Default::default()
            })
            .expect("insert_new_emergency_call should succeed");

        assert_eq!(call.status, EmergencyCallStatus::Pending);
        assert_eq!(call.assigned_ambulance_id, None);
        assert_eq!(intake.get_emergency_call(call.call_id).unwrap(), call);
    }

    #[test]
    fn test_emergency_call_for_unknown_patient_is_not_found() {
        let intake = IntakeService::new(memory_store());

        let err = intake
            .insert_new_emergency_call(NewEmergencyCall {
                patient_id: Some(31),
                ..Default::default()
            })
            .expect_err("unknown patient");
        assert!(matches!(err, CoreError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn test_unknown_lookups_are_not_found() {
        let intake = IntakeService::new(memory_store());

        assert!(matches!(intake.get_patient_by_id(1), Err(CoreError::NotFound { .. })));
        assert!(matches!(
            intake.find_patient_by_nhs_number("0000000000"),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(intake.get_emergency_call(1), Err(CoreError::NotFound { .. })));
    }
}
