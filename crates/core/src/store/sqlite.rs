//! SQLite-backed [`Store`].
//!
//! A file-backed store opens one connection per scope (WAL journal, busy timeout) so callers on
//! different threads run truly in parallel and contend only on SQLite's own locks. Write scopes
//! begin with `BEGIN IMMEDIATE`, which takes the database write lock before the first read; two
//! assignment transactions therefore cannot both observe the same `AVAILABLE` ambulance.
//!
//! An in-memory store keeps a single connection behind a mutex and is meant for tests and
//! throwaway tooling.

use super::{PatientFilter, Queries, Store, StoreResult, SCHEMA};
use crate::config::StoreConfig;
use crate::entities::{
    Ambulance, AmbulanceId, AmbulanceRequest, AmbulanceStaff, CallId, CallOutDetail, CallOutId,
    EmergencyCall, HospitalId, MedicalRecord, NewAmbulance, NewAmbulanceRequest,
    NewAmbulanceStaff, NewCallOutDetail, NewEmergencyCall, NewMedicalRecord, NewPatient,
    NewRegionalHospital, Patient, PatientId, RecordId, RegionalHospital, RequestId, StaffId,
};
use crate::error::{CoreError, CoreResult, StoreError, StoreErrorKind};
use crate::geo::GeoPoint;
use crate::interval::{format_interval, parse_interval};
use crate::status::{
    AmbulanceStatus, EmergencyCallStatus, InjurySeverity, RequestStatus, StaffRole,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// STORE HANDLE
// ============================================================================

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

/// Relational store on SQLite.
#[derive(Debug)]
pub struct SqliteStore {
    backing: Backing,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `cfg` and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Store` if the database directory cannot be created, the database
    /// cannot be opened, or the schema cannot be applied.
    pub fn open(cfg: &StoreConfig) -> CoreResult<Self> {
        std::fs::create_dir_all(cfg.database_dir()).map_err(|e| {
            StoreError::new(
                "create_database_dir",
                StoreErrorKind::Backend(format!("{}: {e}", cfg.database_dir().display())),
            )
        })?;
        Self::open_path(cfg.database_path(), cfg.busy_timeout())
    }

    /// Opens the database file at `path` and applies the schema.
    pub fn open_path(path: impl AsRef<Path>, busy_timeout: Duration) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = connect_file(&path, busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sql_err("enable_wal"))?;
        conn.execute_batch(SCHEMA).map_err(sql_err("migrate"))?;

        tracing::info!("opened dispatch store at {}", path.display());

        Ok(Self {
            backing: Backing::File(path),
            busy_timeout,
        })
    }

    /// Creates a private in-memory database with the schema applied.
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err("open_in_memory"))?;
        configure(&conn, Duration::ZERO)?;
        conn.execute_batch(SCHEMA).map_err(sql_err("migrate"))?;

        Ok(Self {
            backing: Backing::Memory(Mutex::new(conn)),
            busy_timeout: Duration::ZERO,
        })
    }

    /// Re-applies the schema. Safe to call on an up-to-date database.
    pub fn migrate(&self) -> CoreResult<()> {
        let conn = self.acquire()?;
        conn.execute_batch(SCHEMA).map_err(sql_err("migrate"))?;
        Ok(())
    }

    /// Runs raw SQL outside any scope. Tests use it to install triggers and id offsets.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> CoreResult<()> {
        let conn = self.acquire()?;
        conn.execute_batch(sql).map_err(sql_err("execute_raw"))?;
        Ok(())
    }

    fn acquire(&self) -> StoreResult<Handle<'_>> {
        match &self.backing {
            Backing::File(path) => Ok(Handle::Owned(connect_file(path, self.busy_timeout)?)),
            // A panic inside a scope poisons the mutex only after the transaction guard has
            // rolled back, so the connection behind a poisoned lock is still consistent.
            Backing::Memory(shared) => Ok(Handle::Shared(
                shared.lock().unwrap_or_else(PoisonError::into_inner),
            )),
        }
    }
}

impl Store for SqliteStore {
    fn read<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn Queries) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut conn = self.acquire()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(sql_err("begin_read"))?;
        tracing::debug!(op, "read scope opened");

        let value = f(&SqliteQueries { conn: &tx })?;
        tx.commit().map_err(sql_err("end_read"))?;
        Ok(value)
    }

    fn transaction<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn Queries) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut conn = self.acquire()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err("begin_immediate"))?;
        tracing::debug!(op, "transaction opened");

        // Dropping `tx` without commit (including while unwinding) rolls back.
        match f(&SqliteQueries { conn: &tx }) {
            Ok(value) => {
                tx.commit().map_err(sql_err("commit"))?;
                tracing::debug!(op, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(op, "rollback failed: {}", rollback_err);
                }
                if matches!(e, CoreError::Store(_)) {
                    tracing::error!(op, "transaction rolled back: {}", e);
                } else {
                    tracing::debug!(op, "transaction rolled back: {}", e);
                }
                Err(e)
            }
        }
    }
}

enum Handle<'s> {
    Owned(Connection),
    Shared(MutexGuard<'s, Connection>),
}

impl Deref for Handle<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Handle::Owned(conn) => conn,
            Handle::Shared(guard) => guard,
        }
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        match self {
            Handle::Owned(conn) => conn,
            Handle::Shared(guard) => guard,
        }
    }
}

fn connect_file(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let conn = Connection::open(path).map_err(sql_err("open"))?;
    configure(&conn, busy_timeout)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> StoreResult<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(sql_err("busy_timeout"))?;
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(sql_err("foreign_keys"))?;
    Ok(())
}

fn sql_err(query: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::sqlite(query, e)
}

// ============================================================================
// COLUMN CODECS
// ============================================================================

macro_rules! text_enum_sql {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: CoreError| FromSqlError::Other(Box::new(e)))
                }
            }
        )+
    };
}

text_enum_sql!(
    AmbulanceStatus,
    EmergencyCallStatus,
    InjurySeverity,
    RequestStatus,
    StaffRole,
);

fn to_json<T: Serialize + ?Sized>(query: &'static str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::new(query, StoreErrorKind::Backend(e.to_string())))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn interval_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Duration> {
    let text: String = row.get(idx)?;
    parse_interval(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn point_columns(row: &Row<'_>, lat_idx: usize) -> rusqlite::Result<GeoPoint> {
    Ok(GeoPoint::new(row.get(lat_idx)?, row.get(lat_idx + 1)?))
}

// ============================================================================
// ROW MAPPERS
// ============================================================================

macro_rules! patient_columns {
    () => {
        "patient_id, nhs_number, first_name, last_name, date_of_birth, address, phone_number, \
         email, created_at"
    };
}

fn patient_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        nhs_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        address: row.get(5)?,
        phone_number: row.get(6)?,
        email: row.get(7)?,
        created_at: row.get(8)?,
    })
}

macro_rules! record_columns {
    () => {
        "record_id, patient_id, callout_ids, conditions, medications, allergies, notes, \
         last_updated"
    };
}

fn record_row(row: &Row<'_>) -> rusqlite::Result<MedicalRecord> {
    Ok(MedicalRecord {
        record_id: row.get(0)?,
        patient_id: row.get(1)?,
        callout_ids: json_column(row, 2)?,
        conditions: json_column(row, 3)?,
        medications: json_column(row, 4)?,
        allergies: json_column(row, 5)?,
        notes: json_column(row, 6)?,
        last_updated: row.get(7)?,
    })
}

macro_rules! callout_columns {
    () => {
        "detail_id, call_id, ambulance_id, action_taken, time_spent, notes, created_at"
    };
}

fn callout_row(row: &Row<'_>) -> rusqlite::Result<CallOutDetail> {
    Ok(CallOutDetail {
        detail_id: row.get(0)?,
        call_id: row.get(1)?,
        ambulance_id: row.get(2)?,
        action_taken: row.get(3)?,
        time_spent: interval_column(row, 4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

macro_rules! call_columns {
    () => {
        "call_id, patient_id, nhs_number, caller_name, caller_phone, call_time, \
         medical_condition, latitude, longitude, severity, status, assigned_ambulance_id, \
         assigned_hospital_id"
    };
}

fn call_row(row: &Row<'_>) -> rusqlite::Result<EmergencyCall> {
    Ok(EmergencyCall {
        call_id: row.get(0)?,
        patient_id: row.get(1)?,
        nhs_number: row.get(2)?,
        caller_name: row.get(3)?,
        caller_phone: row.get(4)?,
        call_time: row.get(5)?,
        medical_condition: row.get(6)?,
        location: point_columns(row, 7)?,
        severity: row.get(9)?,
        status: row.get(10)?,
        assigned_ambulance_id: row.get(11)?,
        assigned_hospital_id: row.get(12)?,
    })
}

macro_rules! hospital_columns {
    () => {
        "hospital_id, name, address, phone_number, email, latitude, longitude, capacity, \
         created_at"
    };
}

fn hospital_row(row: &Row<'_>) -> rusqlite::Result<RegionalHospital> {
    Ok(RegionalHospital {
        hospital_id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone_number: row.get(3)?,
        email: row.get(4)?,
        location: point_columns(row, 5)?,
        capacity: row.get(7)?,
        created_at: row.get(8)?,
    })
}

macro_rules! ambulance_columns {
    () => {
        "ambulance_id, ambulance_number, latitude, longitude, status, regional_hospital_id"
    };
}

fn ambulance_row(row: &Row<'_>) -> rusqlite::Result<Ambulance> {
    Ok(Ambulance {
        ambulance_id: row.get(0)?,
        ambulance_number: row.get(1)?,
        current_location: point_columns(row, 2)?,
        status: row.get(4)?,
        regional_hospital_id: row.get(5)?,
    })
}

macro_rules! request_columns {
    () => {
        "request_id, emergency_call_id, hospital_id, ambulance_id, severity, latitude, \
         longitude, status, created_at, updated_at"
    };
}

fn request_row(row: &Row<'_>) -> rusqlite::Result<AmbulanceRequest> {
    Ok(AmbulanceRequest {
        request_id: row.get(0)?,
        emergency_call_id: row.get(1)?,
        hospital_id: row.get(2)?,
        ambulance_id: row.get(3)?,
        severity: row.get(4)?,
        location: point_columns(row, 5)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

macro_rules! staff_columns {
    () => {
        "staff_id, first_name, last_name, phone_number, email, role, ambulance_id, is_active"
    };
}

fn staff_row(row: &Row<'_>) -> rusqlite::Result<AmbulanceStaff> {
    Ok(AmbulanceStaff {
        staff_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        phone_number: row.get(3)?,
        email: row.get(4)?,
        role: row.get(5)?,
        ambulance_id: row.get(6)?,
        is_active: row.get(7)?,
    })
}

// ============================================================================
// QUERIES
// ============================================================================

struct SqliteQueries<'c> {
    conn: &'c Connection,
}

impl SqliteQueries<'_> {
    fn insert(&self, query: &'static str, sql: &str, params: &[&dyn ToSql]) -> StoreResult<i64> {
        self.conn.execute(sql, params).map_err(sql_err(query))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Runs an UPDATE and reports whether exactly one row changed.
    fn update_one(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(sql, params).map_err(sql_err(query))?;
        Ok(changed == 1)
    }

    fn one<T>(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
        map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<Option<T>> {
        self.conn
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.query_row(params, map).optional())
            .map_err(sql_err(query))
    }

    fn many<T>(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<Vec<T>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(sql_err(query))?;
        let rows = stmt.query_map(params, map).map_err(sql_err(query))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(sql_err(query))
    }
}

impl Queries for SqliteQueries<'_> {
    fn insert_patient(
        &self,
        patient: &NewPatient,
        created_at: DateTime<Utc>,
    ) -> StoreResult<PatientId> {
        self.insert(
            "insert_patient",
            "INSERT INTO patients (nhs_number, first_name, last_name, date_of_birth, address, \
             phone_number, email, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                patient.nhs_number,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.address,
                patient.phone_number,
                patient.email,
                created_at,
            ],
        )
    }

    fn get_patient(&self, patient_id: PatientId) -> StoreResult<Option<Patient>> {
        self.one(
            "get_patient",
            concat!("SELECT ", patient_columns!(), " FROM patients WHERE patient_id = ?1"),
            params![patient_id],
            patient_row,
        )
    }

    fn get_patient_by_nhs_number(&self, nhs_number: &str) -> StoreResult<Option<Patient>> {
        self.one(
            "get_patient_by_nhs_number",
            concat!("SELECT ", patient_columns!(), " FROM patients WHERE nhs_number = ?1"),
            params![nhs_number],
            patient_row,
        )
    }

    fn find_patient_id(&self, filter: &PatientFilter<'_>) -> StoreResult<Option<PatientId>> {
        self.one(
            "find_patient_id",
            "SELECT patient_id FROM patients \
             WHERE (?1 IS NULL OR first_name = ?1) \
               AND (?2 IS NULL OR last_name = ?2) \
               AND (?3 IS NULL OR address = ?3) \
             ORDER BY patient_id LIMIT 1",
            params![filter.first_name, filter.last_name, filter.address],
            |row| row.get(0),
        )
    }

    fn insert_medical_record(
        &self,
        record: &NewMedicalRecord,
        last_updated: DateTime<Utc>,
    ) -> StoreResult<RecordId> {
        const QUERY: &str = "insert_medical_record";
        self.insert(
            QUERY,
            "INSERT INTO medical_records (patient_id, callout_ids, conditions, medications, \
             allergies, notes, last_updated) VALUES (?1, '[]', ?2, ?3, ?4, ?5, ?6)",
            params![
                record.patient_id,
                to_json(QUERY, &record.conditions)?,
                to_json(QUERY, &record.medications)?,
                to_json(QUERY, &record.allergies)?,
                to_json(QUERY, &record.notes)?,
                last_updated,
            ],
        )
    }

    fn latest_medical_record(&self, patient_id: PatientId) -> StoreResult<Option<MedicalRecord>> {
        self.one(
            "latest_medical_record",
            concat!(
                "SELECT ",
                record_columns!(),
                " FROM medical_records WHERE patient_id = ?1 \
                 ORDER BY last_updated DESC, record_id DESC LIMIT 1"
            ),
            params![patient_id],
            record_row,
        )
    }

    fn append_callout_id(&self, record_id: RecordId, detail_id: CallOutId) -> StoreResult<bool> {
        self.update_one(
            "append_callout_id",
            "UPDATE medical_records SET callout_ids = json_insert(callout_ids, '$[#]', ?2) \
             WHERE record_id = ?1",
            params![record_id, detail_id],
        )
    }

    fn insert_callout(
        &self,
        detail: &NewCallOutDetail,
        created_at: DateTime<Utc>,
    ) -> StoreResult<CallOutId> {
        self.insert(
            "insert_callout",
            "INSERT INTO call_out_details (call_id, ambulance_id, action_taken, time_spent, \
             notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                detail.call_id,
                detail.ambulance_id,
                detail.action_taken,
                format_interval(detail.time_spent),
                detail.notes,
                created_at,
            ],
        )
    }

    fn callouts_by_ids(&self, ids: &[CallOutId]) -> StoreResult<Vec<CallOutDetail>> {
        const QUERY: &str = "callouts_by_ids";
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.many(
            QUERY,
            concat!(
                "SELECT ",
                callout_columns!(),
                " FROM call_out_details \
                 JOIN json_each(?1) AS ids ON ids.value = call_out_details.detail_id \
                 ORDER BY ids.key"
            ),
            params![to_json(QUERY, ids)?],
            callout_row,
        )
    }

    fn insert_emergency_call(
        &self,
        call: &NewEmergencyCall,
        call_time: DateTime<Utc>,
    ) -> StoreResult<CallId> {
        self.insert(
            "insert_emergency_call",
            "INSERT INTO emergency_calls (patient_id, nhs_number, caller_name, caller_phone, \
             call_time, medical_condition, latitude, longitude, severity, status, \
             assigned_hospital_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                call.patient_id,
                call.nhs_number,
                call.caller_name,
                call.caller_phone,
                call_time,
                call.medical_condition,
                call.location.latitude,
                call.location.longitude,
                call.severity,
                call.status,
                call.assigned_hospital_id,
            ],
        )
    }

    fn get_emergency_call(&self, call_id: CallId) -> StoreResult<Option<EmergencyCall>> {
        self.one(
            "get_emergency_call",
            concat!("SELECT ", call_columns!(), " FROM emergency_calls WHERE call_id = ?1"),
            params![call_id],
            call_row,
        )
    }

    fn dispatch_emergency_call(
        &self,
        call_id: CallId,
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
    ) -> StoreResult<bool> {
        self.update_one(
            "dispatch_emergency_call",
            "UPDATE emergency_calls SET status = ?2, assigned_ambulance_id = ?3, \
             assigned_hospital_id = ?4 WHERE call_id = ?1",
            params![
                call_id,
                EmergencyCallStatus::Dispatched,
                ambulance_id,
                hospital_id
            ],
        )
    }

    fn set_emergency_call_status(
        &self,
        call_id: CallId,
        status: EmergencyCallStatus,
    ) -> StoreResult<bool> {
        self.update_one(
            "set_emergency_call_status",
            "UPDATE emergency_calls SET status = ?2 WHERE call_id = ?1",
            params![call_id, status],
        )
    }

    fn insert_hospital(
        &self,
        hospital: &NewRegionalHospital,
        created_at: DateTime<Utc>,
    ) -> StoreResult<HospitalId> {
        self.insert(
            "insert_hospital",
            "INSERT INTO regional_hospitals (name, address, phone_number, email, latitude, \
             longitude, capacity, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                hospital.name,
                hospital.address,
                hospital.phone_number,
                hospital.email,
                hospital.location.latitude,
                hospital.location.longitude,
                hospital.capacity,
                created_at,
            ],
        )
    }

    fn get_hospital(&self, hospital_id: HospitalId) -> StoreResult<Option<RegionalHospital>> {
        self.one(
            "get_hospital",
            concat!(
                "SELECT ",
                hospital_columns!(),
                " FROM regional_hospitals WHERE hospital_id = ?1"
            ),
            params![hospital_id],
            hospital_row,
        )
    }

    fn list_hospitals(&self) -> StoreResult<Vec<RegionalHospital>> {
        self.many(
            "list_hospitals",
            concat!(
                "SELECT ",
                hospital_columns!(),
                " FROM regional_hospitals ORDER BY hospital_id"
            ),
            params![],
            hospital_row,
        )
    }

    fn insert_ambulance(&self, ambulance: &NewAmbulance) -> StoreResult<AmbulanceId> {
        self.insert(
            "insert_ambulance",
            "INSERT INTO ambulances (ambulance_number, latitude, longitude, status, \
             regional_hospital_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ambulance.ambulance_number,
                ambulance.current_location.latitude,
                ambulance.current_location.longitude,
                ambulance.status,
                ambulance.regional_hospital_id,
            ],
        )
    }

    fn get_ambulance(&self, ambulance_id: AmbulanceId) -> StoreResult<Option<Ambulance>> {
        self.one(
            "get_ambulance",
            concat!("SELECT ", ambulance_columns!(), " FROM ambulances WHERE ambulance_id = ?1"),
            params![ambulance_id],
            ambulance_row,
        )
    }

    fn list_ambulances_for_hospital(
        &self,
        hospital_id: HospitalId,
    ) -> StoreResult<Vec<Ambulance>> {
        self.many(
            "list_ambulances_for_hospital",
            concat!(
                "SELECT ",
                ambulance_columns!(),
                " FROM ambulances WHERE regional_hospital_id = ?1 ORDER BY ambulance_id"
            ),
            params![hospital_id],
            ambulance_row,
        )
    }

    fn select_available_ambulance(
        &self,
        hospital_id: HospitalId,
    ) -> StoreResult<Option<AmbulanceId>> {
        self.one(
            "select_available_ambulance",
            "SELECT a.ambulance_id FROM ambulances a \
             JOIN regional_hospitals h ON h.hospital_id = a.regional_hospital_id \
             WHERE h.hospital_id = ?1 AND a.status = ?2 \
             ORDER BY a.ambulance_id LIMIT 1",
            params![hospital_id, AmbulanceStatus::Available],
            |row| row.get(0),
        )
    }

    fn transition_ambulance_status(
        &self,
        ambulance_id: AmbulanceId,
        from: AmbulanceStatus,
        to: AmbulanceStatus,
    ) -> StoreResult<bool> {
        self.update_one(
            "transition_ambulance_status",
            "UPDATE ambulances SET status = ?3 WHERE ambulance_id = ?1 AND status = ?2",
            params![ambulance_id, from, to],
        )
    }

    fn insert_ambulance_request(
        &self,
        request: &NewAmbulanceRequest,
        hospital_id: HospitalId,
        now: DateTime<Utc>,
    ) -> StoreResult<RequestId> {
        self.insert(
            "insert_ambulance_request",
            "INSERT INTO ambulance_requests (emergency_call_id, hospital_id, ambulance_id, \
             severity, latitude, longitude, status, created_at, updated_at) \
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                request.emergency_call_id,
                hospital_id,
                request.severity,
                request.location.latitude,
                request.location.longitude,
                RequestStatus::Pending,
                now,
            ],
        )
    }

    fn get_ambulance_request(
        &self,
        request_id: RequestId,
    ) -> StoreResult<Option<AmbulanceRequest>> {
        self.one(
            "get_ambulance_request",
            concat!(
                "SELECT ",
                request_columns!(),
                " FROM ambulance_requests WHERE request_id = ?1"
            ),
            params![request_id],
            request_row,
        )
    }

    fn accept_ambulance_request(
        &self,
        request_id: RequestId,
        ambulance_id: AmbulanceId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.update_one(
            "accept_ambulance_request",
            "UPDATE ambulance_requests SET ambulance_id = ?2, status = ?3, updated_at = ?4 \
             WHERE request_id = ?1 AND status = ?5 AND ambulance_id IS NULL",
            params![
                request_id,
                ambulance_id,
                RequestStatus::Accepted,
                now,
                RequestStatus::Pending,
            ],
        )
    }

    fn transition_ambulance_request(
        &self,
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.update_one(
            "transition_ambulance_request",
            "UPDATE ambulance_requests SET status = ?3, updated_at = ?4 \
             WHERE request_id = ?1 AND status = ?2",
            params![request_id, from, to, now],
        )
    }

    fn accepted_request_for_ambulance(
        &self,
        ambulance_id: AmbulanceId,
    ) -> StoreResult<Option<AmbulanceRequest>> {
        self.one(
            "accepted_request_for_ambulance",
            concat!(
                "SELECT ",
                request_columns!(),
                " FROM ambulance_requests WHERE ambulance_id = ?1 AND status = ?2 \
                 ORDER BY request_id LIMIT 1"
            ),
            params![ambulance_id, RequestStatus::Accepted],
            request_row,
        )
    }

    fn list_ambulance_requests(
        &self,
        hospital_id: HospitalId,
        statuses: &[RequestStatus],
    ) -> StoreResult<Vec<AmbulanceRequest>> {
        const QUERY: &str = "list_ambulance_requests";
        self.many(
            QUERY,
            concat!(
                "SELECT ",
                request_columns!(),
                " FROM ambulance_requests WHERE hospital_id = ?1 \
                 AND status IN (SELECT value FROM json_each(?2)) ORDER BY request_id"
            ),
            params![hospital_id, to_json(QUERY, statuses)?],
            request_row,
        )
    }

    fn insert_staff(&self, staff: &NewAmbulanceStaff) -> StoreResult<StaffId> {
        self.insert(
            "insert_staff",
            "INSERT INTO ambulance_staff (first_name, last_name, phone_number, email, role, \
             ambulance_id, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                staff.first_name,
                staff.last_name,
                staff.phone_number,
                staff.email,
                staff.role,
                staff.ambulance_id,
                staff.is_active,
            ],
        )
    }

    fn get_staff(&self, staff_id: StaffId) -> StoreResult<Option<AmbulanceStaff>> {
        self.one(
            "get_staff",
            concat!("SELECT ", staff_columns!(), " FROM ambulance_staff WHERE staff_id = ?1"),
            params![staff_id],
            staff_row,
        )
    }

    fn list_staff_for_ambulance(
        &self,
        ambulance_id: AmbulanceId,
    ) -> StoreResult<Vec<AmbulanceStaff>> {
        self.many(
            "list_staff_for_ambulance",
            concat!(
                "SELECT ",
                staff_columns!(),
                " FROM ambulance_staff WHERE ambulance_id = ?1 ORDER BY staff_id"
            ),
            params![ambulance_id],
            staff_row,
        )
    }

    fn set_staff_ambulance(
        &self,
        staff_id: StaffId,
        ambulance_id: Option<AmbulanceId>,
    ) -> StoreResult<bool> {
        self.update_one(
            "set_staff_ambulance",
            "UPDATE ambulance_staff SET ambulance_id = ?2 WHERE staff_id = ?1",
            params![staff_id, ambulance_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    fn hospital(name: &str) -> NewRegionalHospital {
        NewRegionalHospital {
            name: name.into(),
            location: GeoPoint::new(55.95, -3.19),
            capacity: 120,
            ..Default::default()
        }
    }

    fn ambulance(number: &str, hospital_id: HospitalId) -> NewAmbulance {
        NewAmbulance {
            ambulance_number: number.into(),
            current_location: GeoPoint::new(55.95, -3.19),
            status: AmbulanceStatus::Available,
            regional_hospital_id: Some(hospital_id),
        }
    }

    fn ambulance_status(store: &SqliteStore, id: AmbulanceId) -> AmbulanceStatus {
        store
            .read("test", |q| Ok(q.get_ambulance(id)?.expect("ambulance exists")))
            .expect("read should succeed")
            .status
    }

    #[test]
    fn test_in_memory_store_round_trips_rows() {
        let store = SqliteStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        let (hospital_id, patient) = store
            .transaction("seed", |q| {
                let hospital_id = q.insert_hospital(&hospital("Royal Infirmary"), now)?;
                let patient_id = q.insert_patient(
                    &NewPatient {
                        nhs_number: Some("9434765919".into()),
                        first_name: "John".into(),
                        last_name: "Doe".into(),
                        date_of_birth: chrono::NaiveDate::from_ymd_opt(1980, 4, 2),
                        address: "123 Main St, Anytown".into(),
                        ..Default::default()
                    },
                    now,
                )?;
                Ok((hospital_id, patient_id))
            })
            .expect("seed should commit");

        let (stored_hospital, stored_patient) = store
            .read("fetch", |q| {
                Ok((q.get_hospital(hospital_id)?, q.get_patient(patient)?))
            })
            .expect("read should succeed");

        let stored_hospital = stored_hospital.expect("hospital should exist");
        assert_eq!(stored_hospital.name, "Royal Infirmary");
        assert_eq!(stored_hospital.capacity, 120);
        assert_eq!(stored_hospital.created_at, now);

        let stored_patient = stored_patient.expect("patient should exist");
        assert_eq!(stored_patient.nhs_number.as_deref(), Some("9434765919"));
        assert_eq!(
            stored_patient.date_of_birth,
            chrono::NaiveDate::from_ymd_opt(1980, 4, 2)
        );
    }

    #[test]
    fn test_nhs_number_is_unique() {
        let store = SqliteStore::in_memory().unwrap();
        let patient = NewPatient {
            nhs_number: Some("4010232137".into()),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            ..Default::default()
        };

        store
            .transaction("first", |q| Ok(q.insert_patient(&patient, Utc::now())?))
            .expect("first insert should succeed");
        let err = store
            .transaction("second", |q| Ok(q.insert_patient(&patient, Utc::now())?))
            .expect_err("duplicate NHS number should fail");

        assert!(matches!(
            err,
            CoreError::Store(StoreError {
                kind: StoreErrorKind::Constraint(_),
                ..
            })
        ));
    }

    #[test]
    fn test_patients_without_nhs_number_do_not_collide() {
        let store = SqliteStore::in_memory().unwrap();
        let patient = NewPatient {
            first_name: "Unknown".into(),
            last_name: "Caller".into(),
            ..Default::default()
        };

        store
            .transaction("seed", |q| {
                q.insert_patient(&patient, Utc::now())?;
                q.insert_patient(&patient, Utc::now())?;
                Ok(())
            })
            .expect("NULL NHS numbers should not collide");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        let (hospital_id, ambulance_id) = store
            .transaction("seed", |q| {
                let h = q.insert_hospital(&hospital("General"), now)?;
                let a = q.insert_ambulance(&ambulance("AMB-1", h))?;
                Ok((h, a))
            })
            .unwrap();

        let err = store
            .transaction("failing", |q| {
                q.transition_ambulance_status(
                    ambulance_id,
                    AmbulanceStatus::Available,
                    AmbulanceStatus::OnCall,
                )?;
                Err::<(), _>(CoreError::InvariantViolation("abort".into()))
            })
            .expect_err("closure error should surface");

        assert!(matches!(err, CoreError::InvariantViolation(_)));
        assert_eq!(ambulance_status(&store, ambulance_id), AmbulanceStatus::Available);

        let pool = store
            .read("pool", |q| Ok(q.list_ambulances_for_hospital(hospital_id)?))
            .unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_panic() {
        let store = SqliteStore::in_memory().unwrap();
        let ambulance_id = store
            .transaction("seed", |q| {
                let h = q.insert_hospital(&hospital("General"), Utc::now())?;
                Ok(q.insert_ambulance(&ambulance("AMB-1", h))?)
            })
            .unwrap();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            store.transaction("panicking", |q| -> CoreResult<()> {
                q.transition_ambulance_status(
                    ambulance_id,
                    AmbulanceStatus::Available,
                    AmbulanceStatus::OnCall,
                )?;
                panic!("fatal condition inside transaction body");
            })
        }));

        assert!(outcome.is_err(), "panic should propagate to the caller");
        assert_eq!(ambulance_status(&store, ambulance_id), AmbulanceStatus::Available);
    }

    #[test]
    fn test_transition_is_compare_and_set() {
        let store = SqliteStore::in_memory().unwrap();
        let ambulance_id = store
            .transaction("seed", |q| {
                let h = q.insert_hospital(&hospital("General"), Utc::now())?;
                Ok(q.insert_ambulance(&ambulance("AMB-1", h))?)
            })
            .unwrap();

        let (first, second) = store
            .transaction("cas", |q| {
                let first = q.transition_ambulance_status(
                    ambulance_id,
                    AmbulanceStatus::Available,
                    AmbulanceStatus::OnCall,
                )?;
                let second = q.transition_ambulance_status(
                    ambulance_id,
                    AmbulanceStatus::Available,
                    AmbulanceStatus::OnCall,
                )?;
                Ok((first, second))
            })
            .unwrap();

        assert!(first);
        assert!(!second, "second transition from AVAILABLE should match no row");
    }

    #[test]
    fn test_callout_ids_append_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let patient_id = store
            .transaction("seed", |q| {
                let h = q.insert_hospital(&hospital("General"), now)?;
                let a = q.insert_ambulance(&ambulance("AMB-1", h))?;
                let p = q.insert_patient(
                    &NewPatient {
                        first_name: "John".into(),
                        last_name: "Doe".into(),
                        ..Default::default()
                    },
                    now,
                )?;
                let call = q.insert_emergency_call(
                    &NewEmergencyCall {
                        patient_id: Some(p),
                        ..Default::default()
                    },
                    now,
                )?;
                let record = q.insert_medical_record(
                    &NewMedicalRecord {
                        patient_id: p,
                        conditions: vec!["asthma".into()],
                        ..Default::default()
                    },
                    now,
                )?;
                for minutes in [30, 45] {
                    let detail = q.insert_callout(
                        &NewCallOutDetail {
                            call_id: call,
                            ambulance_id: a,
                            action_taken: "transported".into(),
                            time_spent: Duration::from_secs(minutes * 60),
                            notes: String::new(),
                        },
                        now,
                    )?;
                    assert!(q.append_callout_id(record, detail)?);
                }
                Ok(p)
            })
            .unwrap();

        let (record, callouts) = store
            .read("history", |q| {
                let record = q.latest_medical_record(patient_id)?.expect("record exists");
                let callouts = q.callouts_by_ids(&record.callout_ids)?;
                Ok((record, callouts))
            })
            .unwrap();

        assert_eq!(record.callout_ids.len(), 2);
        assert_eq!(record.conditions, vec!["asthma".to_string()]);
        assert_eq!(callouts.len(), 2);
        assert_eq!(callouts[0].time_spent, Duration::from_secs(30 * 60));
        assert_eq!(callouts[1].time_spent, Duration::from_secs(45 * 60));

        let reversed: Vec<CallOutId> = record.callout_ids.iter().rev().copied().collect();
        let callouts = store
            .read("history", |q| Ok(q.callouts_by_ids(&reversed)?))
            .unwrap();
        let ids: Vec<CallOutId> = callouts.iter().map(|c| c.detail_id).collect();
        assert_eq!(ids, reversed);
    }

    #[test]
    fn test_one_accepted_request_per_ambulance_is_enforced() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let err = store
            .transaction("double_accept", |q| {
                let h = q.insert_hospital(&hospital("General"), now)?;
                let a = q.insert_ambulance(&ambulance("AMB-1", h))?;
                let call = q.insert_emergency_call(&NewEmergencyCall::default(), now)?;
                let request = NewAmbulanceRequest {
                    emergency_call_id: call,
                    hospital_id: Some(h),
                    severity: InjurySeverity::High,
                    location: GeoPoint::default(),
                };
                let r1 = q.insert_ambulance_request(&request, h, now)?;
                let r2 = q.insert_ambulance_request(&request, h, now)?;
                assert!(q.accept_ambulance_request(r1, a, now)?);
                q.accept_ambulance_request(r2, a, now)?;
                Ok(())
            })
            .expect_err("second accepted request for one ambulance should violate the index");

        assert!(matches!(
            err,
            CoreError::Store(StoreError {
                kind: StoreErrorKind::Constraint(_),
                ..
            })
        ));
    }

    #[test]
    fn test_file_store_persists_across_handles() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = StoreConfig::new(
            temp_dir.path().join("nested"),
            "dispatch",
            Duration::from_secs(5),
        )
        .unwrap();

        let hospital_id = {
            let store = SqliteStore::open(&cfg).expect("file store should open");
            store
                .transaction("seed", |q| Ok(q.insert_hospital(&hospital("St Mary"), Utc::now())?))
                .unwrap()
        };

        let reopened = SqliteStore::open(&cfg).expect("reopen should succeed");
        reopened.migrate().expect("migrate should be idempotent");
        let hospitals = reopened.read("list", |q| Ok(q.list_hospitals()?)).unwrap();

        assert!(cfg.database_path().is_file());
        assert_eq!(hospitals.len(), 1);
        assert_eq!(hospitals[0].hospital_id, hospital_id);
    }
}
