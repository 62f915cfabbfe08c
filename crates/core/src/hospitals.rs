//! Regional hospital registry and nearest-hospital selection.

use crate::entities::{HospitalId, NewRegionalHospital, RegionalHospital};
use crate::geo::GeoPoint;
use crate::store::Store;
use crate::{CoreError, CoreResult};
use chrono::Utc;
use std::sync::Arc;

/// The hospital in `hospitals` closest to `point`.
///
/// Distance ties keep the earlier entry, so with store-ordered input the lowest `hospital_id`
/// wins.
pub fn closest_hospital<'a>(
    point: &GeoPoint,
    hospitals: &'a [RegionalHospital],
) -> Option<&'a RegionalHospital> {
    let mut best: Option<(&RegionalHospital, f64)> = None;
    for hospital in hospitals {
        let distance = point.distance_m(&hospital.location);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((hospital, distance)),
        }
    }
    best.map(|(hospital, _)| hospital)
}

/// Registry of regional hospitals.
pub struct HospitalDirectory<S> {
    store: Arc<S>,
}

impl<S> Clone for HospitalDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> HospitalDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Finds the hospital nearest to `point` by great-circle distance.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidInput` if `point` is not a valid coordinate.
    /// - `CoreError::NotFound` if no hospital is registered.
    /// - `CoreError::Store` if the hospital list cannot be read.
    pub fn nearest_hospital(&self, point: GeoPoint) -> CoreResult<RegionalHospital> {
        point.validate()?;

        let hospitals = self.store.read("nearest_hospital", |q| Ok(q.list_hospitals()?))?;
        let nearest = closest_hospital(&point, &hospitals)
            .cloned()
            .ok_or_else(|| CoreError::not_found("regional hospital", "no hospitals registered"))?;

        tracing::debug!(
            hospital_id = nearest.hospital_id,
            candidates = hospitals.len(),
            "selected nearest hospital"
        );
        Ok(nearest)
    }

    /// Registers a hospital.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for a blank name or an invalid location, and
    /// `CoreError::Store` if the insert fails.
    pub fn register_hospital(&self, hospital: NewRegionalHospital) -> CoreResult<RegionalHospital> {
        if hospital.name.trim().is_empty() {
            return Err(CoreError::InvalidInput("hospital name cannot be empty".into()));
        }
        hospital.location.validate()?;
        if hospital.capacity < 0 {
            return Err(CoreError::InvalidInput(format!(
                "hospital capacity cannot be negative: {}",
                hospital.capacity
            )));
        }

        let created_at = Utc::now();
        let hospital_id = self.store.transaction("register_hospital", |q| {
            Ok(q.insert_hospital(&hospital, created_at)?)
        })?;
        tracing::info!(hospital_id, "registered regional hospital");

        Ok(RegionalHospital {
            hospital_id,
            name: hospital.name,
            address: hospital.address,
            phone_number: hospital.phone_number,
            email: hospital.email,
            location: hospital.location,
            capacity: hospital.capacity,
            created_at,
        })
    }

    pub fn get_hospital(&self, hospital_id: HospitalId) -> CoreResult<RegionalHospital> {
        self.store.read("get_hospital", |q| {
            q.get_hospital(hospital_id)?
                .ok_or_else(|| CoreError::not_found("regional hospital", hospital_id))
        })
    }

    pub fn list_hospitals(&self) -> CoreResult<Vec<RegionalHospital>> {
        self.store.read("list_hospitals", |q| Ok(q.list_hospitals()?))
    }
}
