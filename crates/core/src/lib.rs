//! # Kwik Core
//!
//! Dispatch core for the KwikMedical emergency response system.
//!
//! This crate contains the business rules and persistence behind call intake and ambulance
//! dispatch:
//! - Resolving a caller's partial identity to a stored patient ([`identity`])
//! - Choosing the nearest regional hospital ([`hospitals`])
//! - Assigning and releasing ambulances atomically ([`dispatch`])
//! - Reading and extending patients' medical history ([`history`])
//! - Straight-line intake and fleet records ([`intake`], [`fleet`])
//!
//! Every service is constructed with a shared [`Store`](store::Store); the SQLite
//! implementation lives in [`store::SqliteStore`].
//!
//! **No wire or transport concerns**: protobuf mapping belongs in `kwik-proto`, process
//! startup and output formatting in `kwik-cli`.

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod history;
pub mod hospitals;
pub mod identity;
pub mod intake;
pub mod interval;
pub mod status;
pub mod store;
pub mod text;

#[cfg(test)]
mod test_support;

pub use config::StoreConfig;
pub use dispatch::{Assignment, DispatchEngine, Release};
pub use error::{CoreError, CoreResult, StoreError, StoreErrorKind};
pub use fleet::FleetService;
pub use geo::GeoPoint;
pub use history::{HistoricalPatientData, HistoryService, MedicalHistory};
pub use hospitals::HospitalDirectory;
pub use identity::{IdentityCandidate, IdentityResolver};
pub use intake::IntakeService;
pub use status::{AmbulanceStatus, EmergencyCallStatus, InjurySeverity, RequestStatus, StaffRole};
pub use store::{SqliteStore, Store};
pub use text::NonEmptyText;
