//! Ambulance fleet and crew registry.
//!
//! Status changes after registration belong to the dispatch engine; this module only registers
//! vehicles and crew and moves crew between vehicles.

use crate::entities::{
    Ambulance, AmbulanceId, AmbulanceStaff, HospitalId, NewAmbulance, NewAmbulanceStaff, StaffId,
};
use crate::store::{Queries, Store};
use crate::{CoreError, CoreResult};
use std::sync::Arc;

pub struct FleetService<S> {
    store: Arc<S>,
}

impl<S> Clone for FleetService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> FleetService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers an ambulance.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidInput` for a blank ambulance number or an invalid location.
    /// - `CoreError::NotFound` if the home hospital does not exist.
    /// - `CoreError::Store` with a `Constraint` kind if the number is already registered.
    pub fn register_ambulance(&self, mut ambulance: NewAmbulance) -> CoreResult<Ambulance> {
        ambulance.ambulance_number = ambulance.ambulance_number.trim().to_owned();
        if ambulance.ambulance_number.is_empty() {
            return Err(CoreError::InvalidInput("ambulance number cannot be empty".into()));
        }
        ambulance.current_location.validate()?;

        let ambulance_id = self.store.transaction("register_ambulance", |q| {
            if let Some(hospital_id) = ambulance.regional_hospital_id {
                require_hospital(q, hospital_id)?;
            }
            Ok(q.insert_ambulance(&ambulance)?)
        })?;
        tracing::info!(ambulance_id, number = %ambulance.ambulance_number, "registered ambulance");

        Ok(Ambulance {
            ambulance_id,
            ambulance_number: ambulance.ambulance_number,
            current_location: ambulance.current_location,
            status: ambulance.status,
            regional_hospital_id: ambulance.regional_hospital_id,
        })
    }

    pub fn get_ambulance(&self, ambulance_id: AmbulanceId) -> CoreResult<Ambulance> {
        self.store
            .read("get_ambulance", |q| require_ambulance(q, ambulance_id))
    }

    pub fn list_ambulances_for_hospital(
        &self,
        hospital_id: HospitalId,
    ) -> CoreResult<Vec<Ambulance>> {
        self.store.read("list_ambulances_for_hospital", |q| {
            Ok(q.list_ambulances_for_hospital(hospital_id)?)
        })
    }

    /// Registers a crew member, optionally already attached to an ambulance.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for blank names and `CoreError::NotFound` if the
    /// ambulance does not exist.
    pub fn register_staff(&self, mut staff: NewAmbulanceStaff) -> CoreResult<AmbulanceStaff> {
        staff.first_name = staff.first_name.trim().to_owned();
        staff.last_name = staff.last_name.trim().to_owned();
        if staff.first_name.is_empty() || staff.last_name.is_empty() {
            return Err(CoreError::InvalidInput(
                "staff first and last name are required".into(),
            ));
        }

        let staff_id = self.store.transaction("register_staff", |q| {
            if let Some(ambulance_id) = staff.ambulance_id {
                require_ambulance(q, ambulance_id)?;
            }
            Ok(q.insert_staff(&staff)?)
        })?;
        tracing::info!(staff_id, role = %staff.role, "registered ambulance staff");

        Ok(AmbulanceStaff {
            staff_id,
            first_name: staff.first_name,
            last_name: staff.last_name,
            phone_number: staff.phone_number,
            email: staff.email,
            role: staff.role,
            ambulance_id: staff.ambulance_id,
            is_active: staff.is_active,
        })
    }

    pub fn get_staff(&self, staff_id: StaffId) -> CoreResult<AmbulanceStaff> {
        self.store.read("get_staff", |q| require_staff(q, staff_id))
    }

    pub fn list_staff_for_ambulance(
        &self,
        ambulance_id: AmbulanceId,
    ) -> CoreResult<Vec<AmbulanceStaff>> {
        self.store.read("list_staff_for_ambulance", |q| {
            Ok(q.list_staff_for_ambulance(ambulance_id)?)
        })
    }

    /// Attaches a crew member to an ambulance, or detaches them with `None`.
    pub fn assign_staff_to_ambulance(
        &self,
        staff_id: StaffId,
        ambulance_id: Option<AmbulanceId>,
    ) -> CoreResult<AmbulanceStaff> {
        let staff = self.store.transaction("assign_staff_to_ambulance", |q| {
            let mut staff = require_staff(q, staff_id)?;
            if let Some(ambulance_id) = ambulance_id {
                require_ambulance(q, ambulance_id)?;
            }
            q.set_staff_ambulance(staff_id, ambulance_id)?;
            staff.ambulance_id = ambulance_id;
            Ok(staff)
        })?;
        tracing::info!(staff_id, ambulance_id, "updated staff assignment");
        Ok(staff)
    }
}

fn require_hospital(q: &dyn Queries, hospital_id: HospitalId) -> CoreResult<()> {
    match q.get_hospital(hospital_id)? {
        Some(_) => Ok(()),
        None => Err(CoreError::not_found("regional hospital", hospital_id)),
    }
}

fn require_ambulance(q: &dyn Queries, ambulance_id: AmbulanceId) -> CoreResult<Ambulance> {
    q.get_ambulance(ambulance_id)?
        .ok_or_else(|| CoreError::not_found("ambulance", ambulance_id))
}

fn require_staff(q: &dyn Queries, staff_id: StaffId) -> CoreResult<AmbulanceStaff> {
    q.get_staff(staff_id)?
        .ok_or_else(|| CoreError::not_found("ambulance staff", staff_id))
}
