use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kwik_core::entities::{
    NewAmbulance, NewAmbulanceRequest, NewAmbulanceStaff, NewCallOutDetail, NewEmergencyCall,
    NewMedicalRecord, NewPatient, NewRegionalHospital,
};
use kwik_core::{
    AmbulanceStatus, DispatchEngine, FleetService, GeoPoint, HistoryService, HospitalDirectory,
    IdentityCandidate, IdentityResolver, InjurySeverity, IntakeService, SqliteStore, StaffRole,
    StoreConfig,
};
use kwik_proto::{pb, Message};

#[derive(Parser)]
#[command(name = "kwik")]
#[command(about = "KwikMedical dispatch CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database (if needed) and apply the schema
    Init,
    /// Register a regional hospital
    RegisterHospital {
        name: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long, default_value = "")]
        address: String,
        /// Bed capacity
        #[arg(long, default_value_t = 0)]
        capacity: i64,
    },
    /// Register an ambulance
    RegisterAmbulance {
        /// Fleet number, e.g. AMB-001
        number: String,
        /// Home hospital
        #[arg(long)]
        hospital_id: Option<i64>,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Register a crew member
    RegisterStaff {
        first_name: String,
        last_name: String,
        #[arg(long, default_value = "PARAMEDIC")]
        role: StaffRole,
        #[arg(long)]
        ambulance_id: Option<i64>,
    },
    /// Attach a crew member to an ambulance (omit the ambulance to detach)
    AssignStaff {
        staff_id: i64,
        #[arg(long)]
        ambulance_id: Option<i64>,
    },
    /// Register a patient
    RegisterPatient {
        first_name: String,
        last_name: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        nhs_number: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        date_of_birth: Option<String>,
    },
    /// Open a new medical record for a patient
    NewRecord {
        patient_id: i64,
        /// Conditions (comma-separated)
        #[arg(long, default_value = "")]
        conditions: String,
        /// Allergies (comma-separated)
        #[arg(long, default_value = "")]
        allergies: String,
    },
    /// Record an incoming emergency call
    NewCall {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        patient_id: Option<i64>,
        #[arg(long, default_value = "LOW")]
        severity: InjurySeverity,
        #[arg(long, default_value = "")]
        condition: String,
        #[arg(long, default_value = "")]
        caller_name: String,
    },
    /// Resolve a caller's partial identity to a patient id
    Resolve {
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        address: String,
    },
    /// Find the hospital nearest to a point
    NearestHospital {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Create an ambulance request for an emergency call
    CreateRequest {
        call_id: i64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        /// Target hospital (defaults to the nearest one)
        #[arg(long)]
        hospital_id: Option<i64>,
        #[arg(long, default_value = "LOW")]
        severity: InjurySeverity,
    },
    /// Assign an available ambulance to a request
    Assign { request_id: i64 },
    /// Release the ambulance serving a request and complete it
    Unassign { request_id: i64 },
    /// Reject a pending request
    Reject { request_id: i64 },
    /// Show the request an ambulance is currently serving
    CurrentRequest { ambulance_id: i64 },
    /// List a hospital's open (or completed) requests
    Requests {
        hospital_id: i64,
        #[arg(long)]
        completed: bool,
    },
    /// List a hospital's ambulances
    Ambulances { hospital_id: i64 },
    /// Show a patient with their medical history
    History { patient_id: i64 },
    /// File a call-out against the call's patient record
    AddCallout {
        call_id: i64,
        ambulance_id: i64,
        /// Action taken on scene
        action: String,
        /// Time spent, in minutes
        minutes: u64,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Print an entity as a base64-encoded wire message
    Export { kind: ExportKind, id: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Call,
    Request,
    Ambulance,
    Hospital,
    Patient,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("kwik=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'kwik --help' for commands");
        return Ok(());
    };

    let cfg = StoreConfig::from_env().context("resolving store configuration")?;
    let store = Arc::new(
        SqliteStore::open(&cfg)
            .with_context(|| format!("opening {}", cfg.database_path().display()))?,
    );
    tracing::debug!(path = %cfg.database_path().display(), "store opened");

    run(command, store)
}

fn run(command: Commands, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    let intake = IntakeService::new(Arc::clone(&store));
    let hospitals = HospitalDirectory::new(Arc::clone(&store));
    let fleet = FleetService::new(Arc::clone(&store));
    let dispatch = DispatchEngine::new(Arc::clone(&store));
    let history = HistoryService::new(Arc::clone(&store));

    match command {
        Commands::Init => {
            store.migrate()?;
            println!("Store ready");
        }
        Commands::RegisterHospital {
            name,
            latitude,
            longitude,
            address,
            capacity,
        } => print_json(&hospitals.register_hospital(NewRegionalHospital {
            name,
            address,
            location: GeoPoint::new(latitude, longitude),
            capacity,
            ..Default::default()
        })?)?,
        Commands::RegisterAmbulance {
            number,
            hospital_id,
            latitude,
            longitude,
        } => print_json(&fleet.register_ambulance(NewAmbulance {
            ambulance_number: number,
            current_location: GeoPoint::new(latitude, longitude),
            status: AmbulanceStatus::Available,
            regional_hospital_id: hospital_id,
        })?)?,
        Commands::RegisterStaff {
            first_name,
            last_name,
            role,
            ambulance_id,
        } => print_json(&fleet.register_staff(NewAmbulanceStaff {
            first_name,
            last_name,
            phone_number: String::new(),
            email: String::new(),
            role,
            ambulance_id,
            is_active: true,
        })?)?,
        Commands::AssignStaff {
            staff_id,
            ambulance_id,
        } => print_json(&fleet.assign_staff_to_ambulance(staff_id, ambulance_id)?)?,
        Commands::RegisterPatient {
            first_name,
            last_name,
            address,
            nhs_number,
            date_of_birth,
        } => {
            let date_of_birth = date_of_birth
                .map(|raw| {
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .with_context(|| format!("invalid date of birth: {raw}"))
                })
                .transpose()?;
            print_json(&intake.register_patient(NewPatient {
                nhs_number,
                first_name,
                last_name,
                date_of_birth,
                address,
                ..Default::default()
            })?)?
        }
        Commands::NewRecord {
            patient_id,
            conditions,
            allergies,
        } => print_json(&history.create_medical_record(NewMedicalRecord {
            patient_id,
            conditions: split_list(&conditions),
            allergies: split_list(&allergies),
            ..Default::default()
        })?)?,
        Commands::NewCall {
            latitude,
            longitude,
            patient_id,
            severity,
            condition,
            caller_name,
        } => print_json(&intake.insert_new_emergency_call(NewEmergencyCall {
            patient_id,
            caller_name,
            medical_condition: condition,
            location: GeoPoint::new(latitude, longitude),
            severity,
            ..Default::default()
        })?)?,
        Commands::Resolve {
            first_name,
            last_name,
            address,
        } => {
            let resolver = IdentityResolver::new(Arc::clone(&store));
            let candidate = IdentityCandidate::from_text(&first_name, &last_name, &address);
            print_json(&json!({ "patient_id": resolver.resolve(&candidate)? }))?
        }
        Commands::NearestHospital {
            latitude,
            longitude,
        } => print_json(&hospitals.nearest_hospital(GeoPoint::new(latitude, longitude))?)?,
        Commands::CreateRequest {
            call_id,
            latitude,
            longitude,
            hospital_id,
            severity,
        } => print_json(&dispatch.create_ambulance_request(NewAmbulanceRequest {
            emergency_call_id: call_id,
            hospital_id,
            severity,
            location: GeoPoint::new(latitude, longitude),
        })?)?,
        Commands::Assign { request_id } => print_json(&dispatch.assign_ambulance(request_id)?)?,
        Commands::Unassign { request_id } => {
            print_json(&dispatch.unassign_ambulance(request_id)?)?
        }
        Commands::Reject { request_id } => {
            print_json(&dispatch.reject_ambulance_request(request_id)?)?
        }
        Commands::CurrentRequest { ambulance_id } => {
            print_json(&dispatch.get_current_ambulance_request(ambulance_id)?)?
        }
        Commands::Requests {
            hospital_id,
            completed,
        } => {
            let requests = if completed {
                dispatch.get_completed_requests(hospital_id)?
            } else {
                dispatch.get_pending_or_accepted_requests(hospital_id)?
            };
            print_json(&requests)?
        }
        Commands::Ambulances { hospital_id } => {
            print_json(&fleet.list_ambulances_for_hospital(hospital_id)?)?
        }
        Commands::History { patient_id } => {
            let data = history.get_historical_data(patient_id)?;
            let history = match &data.history {
                Ok(history) => json!(history),
                Err(e) => json!({ "error": e.to_string() }),
            };
            print_json(&json!({ "patient": data.patient, "history": history }))?
        }
        Commands::AddCallout {
            call_id,
            ambulance_id,
            action,
            minutes,
            notes,
        } => print_json(&history.insert_new_callout(NewCallOutDetail {
            call_id,
            ambulance_id,
            action_taken: action,
            time_spent: Duration::from_secs(minutes * 60),
            notes,
        })?)?,
        Commands::Export { kind, id } => {
            let bytes = match kind {
                ExportKind::Call => pb::EmergencyCall::from(&intake.get_emergency_call(id)?)
                    .encode_to_vec(),
                ExportKind::Request => {
                    pb::AmbulanceRequest::from(&dispatch.get_ambulance_request(id)?)
                        .encode_to_vec()
                }
                ExportKind::Ambulance => {
                    pb::Ambulance::from(&fleet.get_ambulance(id)?).encode_to_vec()
                }
                ExportKind::Hospital => {
                    pb::RegionalHospital::from(&hospitals.get_hospital(id)?).encode_to_vec()
                }
                ExportKind::Patient => {
                    pb::Patient::from(&intake.get_patient_by_id(id)?).encode_to_vec()
                }
            };
            println!("{}", STANDARD.encode(bytes));
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
