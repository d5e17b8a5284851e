use clap::{Parser, Subcommand};
use ipd_core::config::{
    admission_prefix_from_env_value, business_day_offset_from_env_value,
    lock_wait_timeout_from_env_value, pool_size_from_env_value,
};
use ipd_core::model::{
    Admission, AdmissionRequest, AdmissionState, AdmissionType, BedStatus, BedType, BulkBeds, DischargeDetails,
    DischargeRequest, NewWard, TransferReason, TransferRequest, WardType,
};
use ipd_core::{
    AdmissionId, BedId, CoreConfig, EncounterId, FacilityId, InpatientService, NonEmptyText,
    PatientId, PostgresStore, StaffId, WardId,
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ipd")]
#[command(about = "Inpatient bed and ward management CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the database schema
    Migrate,
    /// Create a ward
    CreateWard {
        /// Ward name
        name: String,
        /// Short ward code, e.g. MED-A
        code: String,
        /// general, pediatric, maternity, icu, surgical, private or isolation
        ward_type: WardType,
        /// Owning facility (optional)
        #[arg(long)]
        facility: Option<FacilityId>,
        /// Floor number (optional)
        #[arg(long)]
        floor: Option<i32>,
    },
    /// Add numbered beds to a ward
    AddBeds {
        /// Ward ID
        ward_id: WardId,
        /// Number of beds to add
        count: u32,
        /// Bed number prefix, e.g. A- gives A-01, A-02, ...
        #[arg(long, default_value = "")]
        prefix: String,
        /// standard, private, icu, pediatric, maternity or isolation
        #[arg(long, default_value = "standard")]
        bed_type: BedType,
        /// Daily rate in minor currency units
        #[arg(long, default_value_t = 0)]
        daily_rate_cents: i64,
    },
    /// Show occupancy per ward
    Occupancy {
        /// Restrict to one facility (optional)
        #[arg(long)]
        facility: Option<FacilityId>,
    },
    /// List beds that can be claimed now
    AvailableBeds {
        /// Restrict to one ward (optional)
        #[arg(long)]
        ward: Option<WardId>,
    },
    /// Admit a patient to a bed
    Admit {
        /// Patient ID
        patient_id: PatientId,
        /// Encounter ID
        encounter_id: EncounterId,
        /// Ward ID
        ward_id: WardId,
        /// Bed ID
        bed_id: BedId,
        /// Admitting staff member ID
        admitted_by: StaffId,
        /// Reason for admission
        reason: String,
        /// elective, emergency or transfer
        #[arg(long, default_value = "elective")]
        admission_type: AdmissionType,
        /// Owning facility (optional)
        #[arg(long)]
        facility: Option<FacilityId>,
        /// Attending doctor ID (optional)
        #[arg(long)]
        attending: Option<StaffId>,
    },
    /// Discharge an admitted patient
    Discharge {
        /// Admission ID
        admission_id: AdmissionId,
        /// Discharging staff member ID
        closed_by: StaffId,
        /// Discharge summary (optional)
        #[arg(long)]
        summary: Option<String>,
    },
    /// Move an admitted patient to another bed
    Transfer {
        /// Admission ID
        admission_id: AdmissionId,
        /// Destination ward ID
        to_ward_id: WardId,
        /// Destination bed ID
        to_bed_id: BedId,
        /// Staff member performing the transfer
        transferred_by: StaffId,
        /// clinical, patient_request, bed_management, isolation, step_down or step_up
        #[arg(long, default_value = "clinical")]
        reason: TransferReason,
        /// Free-text notes (optional)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Set a bed's operational status
    BedStatus {
        /// Bed ID
        bed_id: BedId,
        /// available, reserved, maintenance or cleaning
        status: BedStatus,
    },
}

/// Builds the service from the environment.
///
/// Reads `DATABASE_URL`, `IPD_LOCK_WAIT_TIMEOUT_MS`, `IPD_ADMISSION_PREFIX`,
/// `IPD_BUSINESS_DAY_OFFSET` and `IPD_POOL_SIZE`.
fn connect() -> Result<(InpatientService, Arc<PostgresStore>), Box<dyn std::error::Error>> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let cfg = Arc::new(CoreConfig::new(
        lock_wait_timeout_from_env_value(std::env::var("IPD_LOCK_WAIT_TIMEOUT_MS").ok())?,
        admission_prefix_from_env_value(std::env::var("IPD_ADMISSION_PREFIX").ok())?,
        business_day_offset_from_env_value(std::env::var("IPD_BUSINESS_DAY_OFFSET").ok())?,
    )?);
    // One command needs one connection at a time.
    let pool_size = pool_size_from_env_value(std::env::var("IPD_POOL_SIZE").ok())?.min(2);
    let store = Arc::new(PostgresStore::connect(&database_url, pool_size, &cfg)?);
    Ok((InpatientService::new(cfg, store.clone()), store))
}

/// Reports the recorded closing time, not the time the command finished.
fn discharge_line(admission: &Admission) -> String {
    match &admission.state {
        AdmissionState::Closed { closed_at, .. } => format!(
            "Discharged {} at {}",
            admission.admission_number,
            closed_at.format("%Y-%m-%d %H:%M")
        ),
        AdmissionState::Active { .. } => {
            format!("Admission {} is still active", admission.admission_number)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'ipd --help' for commands");
        return Ok(());
    };

    let (service, store) = connect()?;

    match command {
        Commands::Migrate => match store.migrate() {
            Ok(()) => println!("Schema is up to date"),
            Err(e) => eprintln!("Error migrating schema: {}", e),
        },
        Commands::CreateWard {
            name,
            code,
            ward_type,
            facility,
            floor,
        } => {
            let new = NewWard {
                facility_id: facility,
                name: NonEmptyText::new(name)?,
                code: NonEmptyText::new(code)?,
                ward_type,
                floor,
                description: None,
            };
            match service.create_ward(new) {
                Ok(ward) => println!("Created ward {} with ID: {}", ward.code, ward.id),
                Err(e) => eprintln!("Error creating ward: {}", e),
            }
        }
        Commands::AddBeds {
            ward_id,
            count,
            prefix,
            bed_type,
            daily_rate_cents,
        } => {
            let bulk = BulkBeds {
                ward_id,
                prefix,
                count,
                bed_type,
                daily_rate_cents,
            };
            match service.bulk_create_beds(bulk) {
                Ok(beds) => {
                    for bed in beds {
                        println!("Bed {} ID: {}", bed.bed_number, bed.id);
                    }
                }
                Err(e) => eprintln!("Error adding beds: {}", e),
            }
        }
        Commands::Occupancy { facility } => match service.ward_occupancy(facility) {
            Ok(report) if report.is_empty() => println!("No wards found."),
            Ok(report) => {
                for ward in report {
                    println!(
                        "{} ({}): {}/{} occupied, {} free, {}%",
                        ward.name,
                        ward.code,
                        ward.occupied_beds,
                        ward.total_beds,
                        ward.unoccupied_beds,
                        ward.occupancy_rate
                    );
                }
            }
            Err(e) => eprintln!("Error reading occupancy: {}", e),
        },
        Commands::AvailableBeds { ward } => match service.available_beds(ward) {
            Ok(beds) if beds.is_empty() => println!("No available beds."),
            Ok(beds) => {
                for bed in beds {
                    println!(
                        "Bed {} ({}) ID: {}, Ward: {}",
                        bed.bed_number, bed.bed_type, bed.id, bed.ward_id
                    );
                }
            }
            Err(e) => eprintln!("Error listing available beds: {}", e),
        },
        Commands::Admit {
            patient_id,
            encounter_id,
            ward_id,
            bed_id,
            admitted_by,
            reason,
            admission_type,
            facility,
            attending,
        } => {
            let request = AdmissionRequest {
                facility_id: facility,
                patient_id,
                encounter_id,
                ward_id,
                bed_id,
                admission_type,
                admitted_by,
                attending_doctor_id: attending,
                admission_reason: NonEmptyText::new(reason)?,
                admission_diagnosis: None,
            };
            match service.create_admission(request) {
                Ok(admission) => println!(
                    "Admitted as {} with ID: {}",
                    admission.admission_number, admission.id
                ),
                Err(e) => eprintln!("Error admitting patient: {}", e),
            }
        }
        Commands::Discharge {
            admission_id,
            closed_by,
            summary,
        } => {
            let request = DischargeRequest {
                closed_by,
                details: DischargeDetails {
                    summary,
                    ..DischargeDetails::default()
                },
            };
            match service.discharge_admission(admission_id, request) {
                Ok(admission) => println!("{}", discharge_line(&admission)),
                Err(e) => eprintln!("Error discharging admission: {}", e),
            }
        }
        Commands::Transfer {
            admission_id,
            to_ward_id,
            to_bed_id,
            transferred_by,
            reason,
            notes,
        } => {
            let request = TransferRequest {
                to_ward_id,
                to_bed_id,
                reason,
                notes,
                transferred_by,
            };
            match service.transfer_admission(admission_id, request) {
                Ok(admission) => println!(
                    "Transferred {} to bed {}",
                    admission.admission_number,
                    admission.placement().bed_id
                ),
                Err(e) => eprintln!("Error transferring admission: {}", e),
            }
        }
        Commands::BedStatus { bed_id, status } => match service.set_bed_status(bed_id, status) {
            Ok(bed) => println!("Bed {} is now {}", bed.bed_number, bed.status),
            Err(e) => eprintln!("Error setting bed status: {}", e),
        },
    }

    Ok(())
}
