//! Postgres backend.
//!
//! Each transaction holds one pooled connection for its lifetime. Row locks are
//! `SELECT ... FOR UPDATE`; the sequence scope is a transaction-scoped advisory lock, since the
//! scope may have no rows to lock yet. `lock_timeout` is set per transaction so that lock waits
//! surface as [`IpdError::Busy`].

use super::{InpatientStore, StoreTx};
use crate::config::CoreConfig;
use crate::model::{
    Admission, AdmissionFilter, AdmissionPage, AdmissionState, AdmissionStatus, Bed, BedCounts,
    BedStatus, BedTransfer, ClosureOutcome, DischargeDetails, EncounterStatus, Placement, Ward,
    WardFilter,
};
use crate::{IpdError, IpdResult};
use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::{
    AdmissionId, BedId, EncounterId, FacilityId, PatientId, StaffId, TransferId, WardId,
};
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use std::time::Duration;
use uuid::Uuid;

type Manager = PostgresConnectionManager<NoTls>;

const SCHEMA: &str = include_str!("schema.sql");

const WARD_COLUMNS: &str = "id, facility_id, name, code, ward_type, status, floor, description, \
     total_beds, occupied_beds, created_at";
const BED_COLUMNS: &str =
    "id, ward_id, bed_number, bed_type, status, daily_rate_cents, retired_at, created_at";
const ADMISSION_COLUMNS: &str = "id, admission_number, facility_id, patient_id, encounter_id, \
     admission_type, status, ward_id, bed_id, admitted_at, admitted_by, attending_doctor_id, \
     admission_reason, admission_diagnosis, transfer_count, closed_at, closed_by, \
     discharge_summary, discharge_diagnosis, discharge_instructions";
const TRANSFER_COLUMNS: &str = "id, admission_id, from_ward_id, from_bed_id, to_ward_id, \
     to_bed_id, reason, notes, transferred_at, transferred_by";

/// Postgres-backed [`InpatientStore`].
pub struct PostgresStore {
    pool: Pool<Manager>,
    lock_wait_timeout: Duration,
}

impl PostgresStore {
    /// Opens a connection pool against `database_url`.
    pub fn connect(database_url: &str, pool_size: u32, cfg: &CoreConfig) -> IpdResult<Self> {
        let config = database_url
            .parse::<postgres::Config>()
            .map_err(|e| IpdError::InvalidInput(format!("invalid DATABASE_URL: {}", e)))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = pool_builder(pool_size, cfg).build(manager)?;
        Ok(Self::from_pool(pool, cfg))
    }

    fn from_pool(pool: Pool<Manager>, cfg: &CoreConfig) -> Self {
        Self {
            pool,
            lock_wait_timeout: cfg.lock_wait_timeout(),
        }
    }

    /// Creates the tables and indexes if they do not exist.
    pub fn migrate(&self) -> IpdResult<()> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(SCHEMA)?;
        tracing::info!("ipd schema migrated");
        Ok(())
    }
}

impl InpatientStore for PostgresStore {
    fn begin(&self) -> IpdResult<Box<dyn StoreTx + '_>> {
        // Checkout only fails once the pool timeout has passed, so it is a lock wait like any
        // other.
        let mut conn = self.pool.get().map_err(|e| {
            tracing::warn!("connection pool checkout timed out: {}", e);
            IpdError::Busy("connection pool".into())
        })?;
        conn.batch_execute("BEGIN ISOLATION LEVEL READ COMMITTED")?;
        let mut tx = PgTx { conn, done: false };
        // SET cannot take bind parameters.
        tx.conn.batch_execute(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_wait_timeout.as_millis()
        ))?;
        Ok(Box::new(tx))
    }
}

/// Pool settings: checkout waits no longer than a row lock would.
fn pool_builder(pool_size: u32, cfg: &CoreConfig) -> r2d2::Builder<Manager> {
    Pool::builder()
        .max_size(pool_size)
        .connection_timeout(cfg.lock_wait_timeout())
}

struct PgTx {
    conn: PooledConnection<Manager>,
    done: bool,
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = self.conn.batch_execute("ROLLBACK") {
            tracing::warn!("rollback failed: {:?}", e);
        }
    }
}

fn opt_uuid<T>(id: Option<T>, f: impl Fn(&T) -> Uuid) -> Option<Uuid> {
    id.as_ref().map(f)
}

fn to_i32(value: u32, column: &str) -> IpdResult<i32> {
    i32::try_from(value).map_err(|_| IpdError::Storage(format!("{} out of range", column)))
}

fn to_u32(value: i32, column: &str) -> IpdResult<u32> {
    u32::try_from(value).map_err(|_| IpdError::Storage(format!("negative {} in storage", column)))
}

fn text(value: String) -> IpdResult<NonEmptyText> {
    Ok(NonEmptyText::new(value)?)
}

fn ward_from_row(row: &Row) -> IpdResult<Ward> {
    Ok(Ward {
        id: WardId::from_uuid(row.try_get("id")?),
        facility_id: row
            .try_get::<_, Option<Uuid>>("facility_id")?
            .map(FacilityId::from_uuid),
        name: text(row.try_get("name")?)?,
        code: text(row.try_get("code")?)?,
        ward_type: row.try_get::<_, String>("ward_type")?.parse()?,
        status: row.try_get::<_, String>("status")?.parse()?,
        floor: row.try_get("floor")?,
        description: row.try_get("description")?,
        total_beds: to_u32(row.try_get("total_beds")?, "total_beds")?,
        occupied_beds: to_u32(row.try_get("occupied_beds")?, "occupied_beds")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bed_from_row(row: &Row) -> IpdResult<Bed> {
    Ok(Bed {
        id: BedId::from_uuid(row.try_get("id")?),
        ward_id: WardId::from_uuid(row.try_get("ward_id")?),
        bed_number: text(row.try_get("bed_number")?)?,
        bed_type: row.try_get::<_, String>("bed_type")?.parse()?,
        status: row.try_get::<_, String>("status")?.parse()?,
        daily_rate_cents: row.try_get("daily_rate_cents")?,
        retired_at: row.try_get("retired_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn admission_from_row(row: &Row) -> IpdResult<Admission> {
    let placement = Placement {
        ward_id: WardId::from_uuid(row.try_get("ward_id")?),
        bed_id: BedId::from_uuid(row.try_get("bed_id")?),
    };
    let status: AdmissionStatus = row.try_get::<_, String>("status")?.parse()?;
    let outcome = match status {
        AdmissionStatus::Admitted => None,
        AdmissionStatus::Discharged => Some(ClosureOutcome::Discharged),
        AdmissionStatus::Absconded => Some(ClosureOutcome::Absconded),
        AdmissionStatus::Deceased => Some(ClosureOutcome::Deceased),
    };
    let state = match outcome {
        None => AdmissionState::Active { placement },
        Some(outcome) => {
            let closed_at: Option<DateTime<Utc>> = row.try_get("closed_at")?;
            let closed_by: Option<Uuid> = row.try_get("closed_by")?;
            let (Some(closed_at), Some(closed_by)) = (closed_at, closed_by) else {
                return Err(IpdError::Storage(
                    "closed admission without closed_at/closed_by".into(),
                ));
            };
            AdmissionState::Closed {
                outcome,
                last_placement: placement,
                closed_at,
                closed_by: StaffId::from_uuid(closed_by),
                details: DischargeDetails {
                    summary: row.try_get("discharge_summary")?,
                    diagnosis: row.try_get("discharge_diagnosis")?,
                    instructions: row.try_get("discharge_instructions")?,
                },
            }
        }
    };

    Ok(Admission {
        id: AdmissionId::from_uuid(row.try_get("id")?),
        admission_number: row.try_get("admission_number")?,
        facility_id: row
            .try_get::<_, Option<Uuid>>("facility_id")?
            .map(FacilityId::from_uuid),
        patient_id: PatientId::from_uuid(row.try_get("patient_id")?),
        encounter_id: EncounterId::from_uuid(row.try_get("encounter_id")?),
        admission_type: row.try_get::<_, String>("admission_type")?.parse()?,
        admitted_at: row.try_get("admitted_at")?,
        admitted_by: StaffId::from_uuid(row.try_get("admitted_by")?),
        attending_doctor_id: row
            .try_get::<_, Option<Uuid>>("attending_doctor_id")?
            .map(StaffId::from_uuid),
        admission_reason: text(row.try_get("admission_reason")?)?,
        admission_diagnosis: row.try_get("admission_diagnosis")?,
        transfer_count: to_u32(row.try_get("transfer_count")?, "transfer_count")?,
        state,
    })
}

fn transfer_from_row(row: &Row) -> IpdResult<BedTransfer> {
    Ok(BedTransfer {
        id: TransferId::from_uuid(row.try_get("id")?),
        admission_id: AdmissionId::from_uuid(row.try_get("admission_id")?),
        from: Placement {
            ward_id: WardId::from_uuid(row.try_get("from_ward_id")?),
            bed_id: BedId::from_uuid(row.try_get("from_bed_id")?),
        },
        to: Placement {
            ward_id: WardId::from_uuid(row.try_get("to_ward_id")?),
            bed_id: BedId::from_uuid(row.try_get("to_bed_id")?),
        },
        reason: row.try_get::<_, String>("reason")?.parse()?,
        notes: row.try_get("notes")?,
        transferred_at: row.try_get("transferred_at")?,
        transferred_by: StaffId::from_uuid(row.try_get("transferred_by")?),
    })
}

impl PgTx {
    fn query_one_opt<T>(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
        map: fn(&Row) -> IpdResult<T>,
    ) -> IpdResult<Option<T>> {
        self.conn
            .query_opt(sql, params)?
            .as_ref()
            .map(map)
            .transpose()
    }

    fn query_all<T>(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
        map: fn(&Row) -> IpdResult<T>,
    ) -> IpdResult<Vec<T>> {
        self.conn.query(sql, params)?.iter().map(map).collect()
    }

    fn exists(&mut self, sql: &str, id: Uuid) -> IpdResult<bool> {
        Ok(self.conn.query_opt(sql, &[&id])?.is_some())
    }

    fn write_admission(&mut self, sql: &str, admission: &Admission) -> IpdResult<u64> {
        let placement = admission.placement();
        let (closed_at, closed_by, details) = match &admission.state {
            AdmissionState::Active { .. } => (None, None, DischargeDetails::default()),
            AdmissionState::Closed {
                closed_at,
                closed_by,
                details,
                ..
            } => (Some(*closed_at), Some(closed_by.uuid()), details.clone()),
        };
        let transfer_count = to_i32(admission.transfer_count, "transfer_count")?;
        Ok(self.conn.execute(
            sql,
            &[
                &admission.id.uuid(),
                &admission.admission_number,
                &opt_uuid(admission.facility_id, FacilityId::uuid),
                &admission.patient_id.uuid(),
                &admission.encounter_id.uuid(),
                &admission.admission_type.as_str(),
                &admission.status().as_str(),
                &placement.ward_id.uuid(),
                &placement.bed_id.uuid(),
                &admission.admitted_at,
                &admission.admitted_by.uuid(),
                &opt_uuid(admission.attending_doctor_id, StaffId::uuid),
                &admission.admission_reason.as_str(),
                &admission.admission_diagnosis,
                &transfer_count,
                &closed_at,
                &closed_by,
                &details.summary,
                &details.diagnosis,
                &details.instructions,
            ],
        )?)
    }
}

fn require_row(updated: u64, entity: &'static str, id: impl std::fmt::Display) -> IpdResult<()> {
    if updated == 0 {
        return Err(IpdError::not_found(entity, id));
    }
    Ok(())
}

impl StoreTx for PgTx {
    fn lock_sequence_scope(
        &mut self,
        facility_id: Option<FacilityId>,
        stem: &str,
    ) -> IpdResult<u32> {
        let facility = opt_uuid(facility_id, FacilityId::uuid);
        let key = match facility {
            Some(f) => format!("ipd-sequence:{}:{}", f.simple(), stem),
            None => format!("ipd-sequence::{}", stem),
        };
        self.conn
            .execute("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))", &[&key])?;
        let row = self.conn.query_one(
            "SELECT count(*) FROM ipd_admissions \
             WHERE facility_id IS NOT DISTINCT FROM $1 AND admission_number LIKE $2::text || '%'",
            &[&facility, &stem],
        )?;
        let count: i64 = row.try_get(0)?;
        u32::try_from(count).map_err(|_| IpdError::Storage("sequence count overflow".into()))
    }

    fn lock_admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>> {
        let sql = format!(
            "SELECT {} FROM ipd_admissions WHERE id = $1 FOR UPDATE",
            ADMISSION_COLUMNS
        );
        self.query_one_opt(&sql, &[&id.uuid()], admission_from_row)
    }

    fn lock_bed(&mut self, id: BedId) -> IpdResult<Option<Bed>> {
        let sql = format!("SELECT {} FROM ipd_beds WHERE id = $1 FOR UPDATE", BED_COLUMNS);
        self.query_one_opt(&sql, &[&id.uuid()], bed_from_row)
    }

    fn lock_ward(&mut self, id: WardId) -> IpdResult<Option<Ward>> {
        let sql = format!("SELECT {} FROM ipd_wards WHERE id = $1 FOR UPDATE", WARD_COLUMNS);
        self.query_one_opt(&sql, &[&id.uuid()], ward_from_row)
    }

    fn ward(&mut self, id: WardId) -> IpdResult<Option<Ward>> {
        let sql = format!("SELECT {} FROM ipd_wards WHERE id = $1", WARD_COLUMNS);
        self.query_one_opt(&sql, &[&id.uuid()], ward_from_row)
    }

    fn wards(&mut self, filter: &WardFilter) -> IpdResult<Vec<Ward>> {
        let sql = format!(
            "SELECT {} FROM ipd_wards \
             WHERE ($1::uuid IS NULL OR facility_id = $1) \
               AND ($2::text IS NULL OR ward_type = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY name",
            WARD_COLUMNS
        );
        let facility = opt_uuid(filter.facility_id, FacilityId::uuid);
        let ward_type = filter.ward_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());
        self.query_all(&sql, &[&facility, &ward_type, &status], ward_from_row)
    }

    fn bed(&mut self, id: BedId) -> IpdResult<Option<Bed>> {
        let sql = format!("SELECT {} FROM ipd_beds WHERE id = $1", BED_COLUMNS);
        self.query_one_opt(&sql, &[&id.uuid()], bed_from_row)
    }

    fn beds_in_ward(&mut self, ward_id: WardId) -> IpdResult<Vec<Bed>> {
        let sql = format!(
            "SELECT {} FROM ipd_beds WHERE ward_id = $1 ORDER BY bed_number",
            BED_COLUMNS
        );
        self.query_all(&sql, &[&ward_id.uuid()], bed_from_row)
    }

    fn available_beds(&mut self, ward_id: Option<WardId>) -> IpdResult<Vec<Bed>> {
        let sql = format!(
            "SELECT {} FROM ipd_beds \
             WHERE status = $1 AND retired_at IS NULL AND ($2::uuid IS NULL OR ward_id = $2) \
             ORDER BY bed_number",
            BED_COLUMNS
        );
        let ward = opt_uuid(ward_id, WardId::uuid);
        self.query_all(
            &sql,
            &[&BedStatus::Available.as_str(), &ward],
            bed_from_row,
        )
    }

    fn count_beds(&mut self, ward_id: WardId) -> IpdResult<BedCounts> {
        let row = self.conn.query_one(
            "SELECT count(*), count(*) FILTER (WHERE status = $2) \
             FROM ipd_beds WHERE ward_id = $1 AND retired_at IS NULL",
            &[&ward_id.uuid(), &BedStatus::Occupied.as_str()],
        )?;
        let total: i64 = row.try_get(0)?;
        let occupied: i64 = row.try_get(1)?;
        let convert = |n: i64| {
            u32::try_from(n).map_err(|_| IpdError::Storage("bed count out of range".into()))
        };
        Ok(BedCounts {
            total: convert(total)?,
            occupied: convert(occupied)?,
        })
    }

    fn admission(&mut self, id: AdmissionId) -> IpdResult<Option<Admission>> {
        let sql = format!("SELECT {} FROM ipd_admissions WHERE id = $1", ADMISSION_COLUMNS);
        self.query_one_opt(&sql, &[&id.uuid()], admission_from_row)
    }

    fn active_admission_for_patient(
        &mut self,
        patient_id: PatientId,
    ) -> IpdResult<Option<Admission>> {
        let sql = format!(
            "SELECT {} FROM ipd_admissions WHERE patient_id = $1 AND status = $2 LIMIT 1",
            ADMISSION_COLUMNS
        );
        self.query_one_opt(
            &sql,
            &[&patient_id.uuid(), &AdmissionStatus::Admitted.as_str()],
            admission_from_row,
        )
    }

    fn admissions(&mut self, filter: &AdmissionFilter) -> IpdResult<AdmissionPage> {
        const WHERE: &str = "WHERE status = $1 \
             AND ($2::uuid IS NULL OR ward_id = $2) \
             AND ($3::uuid IS NULL OR patient_id = $3)";
        let status = filter.status.as_str();
        let ward = opt_uuid(filter.ward_id, WardId::uuid);
        let patient = opt_uuid(filter.patient_id, PatientId::uuid);

        let total: i64 = self
            .conn
            .query_one(
                &format!("SELECT count(*) FROM ipd_admissions {}", WHERE),
                &[&status, &ward, &patient],
            )?
            .try_get(0)?;

        let limit = i64::from(filter.limit);
        let offset = i64::try_from(filter.offset())
            .map_err(|_| IpdError::InvalidInput("page out of range".into()))?;
        let sql = format!(
            "SELECT {} FROM ipd_admissions {} \
             ORDER BY admitted_at DESC, admission_number DESC LIMIT $4 OFFSET $5",
            ADMISSION_COLUMNS, WHERE
        );
        let data = self.query_all(
            &sql,
            &[&status, &ward, &patient, &limit, &offset],
            admission_from_row,
        )?;
        Ok(AdmissionPage {
            data,
            total: total.max(0) as u64,
        })
    }

    fn transfers_for_admission(&mut self, id: AdmissionId) -> IpdResult<Vec<BedTransfer>> {
        let sql = format!(
            "SELECT {} FROM ipd_bed_transfers WHERE admission_id = $1 ORDER BY transferred_at",
            TRANSFER_COLUMNS
        );
        self.query_all(&sql, &[&id.uuid()], transfer_from_row)
    }

    fn insert_ward(&mut self, ward: &Ward) -> IpdResult<()> {
        let sql = format!(
            "INSERT INTO ipd_wards ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            WARD_COLUMNS
        );
        let total = to_i32(ward.total_beds, "total_beds")?;
        let occupied = to_i32(ward.occupied_beds, "occupied_beds")?;
        self.conn.execute(
            &sql,
            &[
                &ward.id.uuid(),
                &opt_uuid(ward.facility_id, FacilityId::uuid),
                &ward.name.as_str(),
                &ward.code.as_str(),
                &ward.ward_type.as_str(),
                &ward.status.as_str(),
                &ward.floor,
                &ward.description,
                &total,
                &occupied,
                &ward.created_at,
            ],
        )?;
        Ok(())
    }

    fn update_ward(&mut self, ward: &Ward) -> IpdResult<()> {
        let total = to_i32(ward.total_beds, "total_beds")?;
        let occupied = to_i32(ward.occupied_beds, "occupied_beds")?;
        let updated = self.conn.execute(
            "UPDATE ipd_wards SET facility_id = $2, name = $3, code = $4, ward_type = $5, \
             status = $6, floor = $7, description = $8, total_beds = $9, occupied_beds = $10 \
             WHERE id = $1",
            &[
                &ward.id.uuid(),
                &opt_uuid(ward.facility_id, FacilityId::uuid),
                &ward.name.as_str(),
                &ward.code.as_str(),
                &ward.ward_type.as_str(),
                &ward.status.as_str(),
                &ward.floor,
                &ward.description,
                &total,
                &occupied,
            ],
        )?;
        require_row(updated, "ward", ward.id)
    }

    fn insert_bed(&mut self, bed: &Bed) -> IpdResult<()> {
        let sql = format!(
            "INSERT INTO ipd_beds ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            BED_COLUMNS
        );
        self.conn.execute(
            &sql,
            &[
                &bed.id.uuid(),
                &bed.ward_id.uuid(),
                &bed.bed_number.as_str(),
                &bed.bed_type.as_str(),
                &bed.status.as_str(),
                &bed.daily_rate_cents,
                &bed.retired_at,
                &bed.created_at,
            ],
        )?;
        Ok(())
    }

    fn update_bed(&mut self, bed: &Bed) -> IpdResult<()> {
        let updated = self.conn.execute(
            "UPDATE ipd_beds SET ward_id = $2, bed_number = $3, bed_type = $4, status = $5, \
             daily_rate_cents = $6, retired_at = $7 WHERE id = $1",
            &[
                &bed.id.uuid(),
                &bed.ward_id.uuid(),
                &bed.bed_number.as_str(),
                &bed.bed_type.as_str(),
                &bed.status.as_str(),
                &bed.daily_rate_cents,
                &bed.retired_at,
            ],
        )?;
        require_row(updated, "bed", bed.id)
    }

    fn insert_admission(&mut self, admission: &Admission) -> IpdResult<()> {
        let sql = format!(
            "INSERT INTO ipd_admissions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
             $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            ADMISSION_COLUMNS
        );
        self.write_admission(&sql, admission)?;
        Ok(())
    }

    fn update_admission(&mut self, admission: &Admission) -> IpdResult<()> {
        let updated = self.write_admission(
            "UPDATE ipd_admissions SET admission_number = $2, facility_id = $3, \
             patient_id = $4, encounter_id = $5, admission_type = $6, status = $7, \
             ward_id = $8, bed_id = $9, admitted_at = $10, admitted_by = $11, \
             attending_doctor_id = $12, admission_reason = $13, admission_diagnosis = $14, \
             transfer_count = $15, closed_at = $16, closed_by = $17, discharge_summary = $18, \
             discharge_diagnosis = $19, discharge_instructions = $20 WHERE id = $1",
            admission,
        )?;
        require_row(updated, "admission", admission.id)
    }

    fn insert_transfer(&mut self, transfer: &BedTransfer) -> IpdResult<()> {
        let sql = format!(
            "INSERT INTO ipd_bed_transfers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            TRANSFER_COLUMNS
        );
        self.conn.execute(
            &sql,
            &[
                &transfer.id.uuid(),
                &transfer.admission_id.uuid(),
                &transfer.from.ward_id.uuid(),
                &transfer.from.bed_id.uuid(),
                &transfer.to.ward_id.uuid(),
                &transfer.to.bed_id.uuid(),
                &transfer.reason.as_str(),
                &transfer.notes,
                &transfer.transferred_at,
                &transfer.transferred_by.uuid(),
            ],
        )?;
        Ok(())
    }

    fn patient_exists(&mut self, id: PatientId) -> IpdResult<bool> {
        self.exists("SELECT 1 FROM patients WHERE id = $1", id.uuid())
    }

    fn encounter_exists(&mut self, id: EncounterId) -> IpdResult<bool> {
        self.exists("SELECT 1 FROM encounters WHERE id = $1", id.uuid())
    }

    fn staff_exists(&mut self, id: StaffId) -> IpdResult<bool> {
        self.exists("SELECT 1 FROM staff WHERE id = $1", id.uuid())
    }

    fn set_encounter_status(
        &mut self,
        id: EncounterId,
        status: EncounterStatus,
        at: DateTime<Utc>,
    ) -> IpdResult<()> {
        let updated = self.conn.execute(
            "UPDATE encounters SET status = $2, status_changed_at = $3 WHERE id = $1",
            &[&id.uuid(), &status.as_str(), &at],
        )?;
        require_row(updated, "encounter", id)
    }

    fn commit(self: Box<Self>) -> IpdResult<()> {
        let mut tx = self;
        tx.conn.batch_execute("COMMIT")?;
        tx.done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Tests marked `#[ignore]` need a scratch database:
    //! `DATABASE_URL=postgres://... cargo test -p ipd-core -- --ignored`.

    use super::*;
    use crate::model::{
        AdmissionRequest, AdmissionType, BedType, BulkBeds, DischargeRequest, NewWard,
        TransferReason, TransferRequest, WardType,
    };
    use crate::InpatientService;
    use chrono::FixedOffset;
    use ipd_types::SequencePrefix;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    static MIGRATED: Mutex<bool> = Mutex::new(false);

    fn config(lock_wait: Duration) -> CoreConfig {
        CoreConfig::new(
            lock_wait,
            SequencePrefix::new("PGT").unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
        .expect("config should be valid")
    }

    /// Connects to `DATABASE_URL` and brings the schema up once per test process.
    fn connect(lock_wait: Duration) -> Option<Arc<PostgresStore>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };
        let store = PostgresStore::connect(&url, 12, &config(lock_wait))
            .expect("connect should succeed");
        let mut migrated = MIGRATED.lock().unwrap();
        if !*migrated {
            store.migrate().expect("migrate should succeed");
            *migrated = true;
        }
        Some(Arc::new(store))
    }

    struct Fixture {
        store: Arc<PostgresStore>,
        service: InpatientService,
        facility: FacilityId,
        staff: StaffId,
    }

    impl Fixture {
        fn new(lock_wait: Duration) -> Option<Self> {
            let store = connect(lock_wait)?;
            let service = InpatientService::new(Arc::new(config(lock_wait)), store.clone());
            let staff = StaffId::new();
            let fixture = Self {
                store,
                service,
                // A fresh facility gives each test its own sequence scope.
                facility: FacilityId::new(),
                staff,
            };
            fixture.seed("INSERT INTO staff (id) VALUES ($1)", staff.uuid());
            Some(fixture)
        }

        fn seed(&self, sql: &str, id: Uuid) {
            let mut conn = self.store.pool.get().expect("checkout should succeed");
            conn.execute(sql, &[&id]).expect("seed should succeed");
        }

        fn ward(&self, beds: u32) -> (Ward, Vec<Bed>) {
            let ward = self
                .service
                .create_ward(NewWard {
                    facility_id: Some(self.facility),
                    name: NonEmptyText::new("Postgres ward").unwrap(),
                    code: NonEmptyText::new("PGW").unwrap(),
                    ward_type: WardType::General,
                    floor: Some(1),
                    description: Some("test".into()),
                })
                .expect("create ward should succeed");
            let beds = self
                .service
                .bulk_create_beds(BulkBeds {
                    ward_id: ward.id,
                    prefix: "P-".into(),
                    count: beds,
                    bed_type: BedType::Standard,
                    daily_rate_cents: 150_000,
                })
                .expect("bulk create should succeed");
            (ward, beds)
        }

        fn request(&self, ward: WardId, bed: BedId) -> AdmissionRequest {
            let patient = PatientId::new();
            let encounter = EncounterId::new();
            self.seed("INSERT INTO patients (id) VALUES ($1)", patient.uuid());
            self.seed("INSERT INTO encounters (id) VALUES ($1)", encounter.uuid());
            AdmissionRequest {
                facility_id: Some(self.facility),
                patient_id: patient,
                encounter_id: encounter,
                ward_id: ward,
                bed_id: bed,
                admission_type: AdmissionType::Emergency,
                admitted_by: self.staff,
                attending_doctor_id: Some(self.staff),
                admission_reason: NonEmptyText::new("observation").unwrap(),
                admission_diagnosis: Some("fever".into()),
            }
        }

        fn race(&self, requests: Vec<AdmissionRequest>) -> Vec<IpdResult<Admission>> {
            let barrier = Arc::new(Barrier::new(requests.len()));
            let handles: Vec<_> = requests
                .into_iter()
                .map(|request| {
                    let service = self.service.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        service.create_admission(request)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        }
    }

    #[test]
    fn test_pool_checkout_timeout_is_busy() {
        let cfg = config(Duration::from_millis(200));
        let manager = PostgresConnectionManager::new(
            "host=127.0.0.1 port=9 user=ipd connect_timeout=1"
                .parse::<postgres::Config>()
                .unwrap(),
            NoTls,
        );
        let pool = pool_builder(1, &cfg).build_unchecked(manager);
        let store = PostgresStore::from_pool(pool, &cfg);

        let started = std::time::Instant::now();
        assert!(matches!(store.begin(), Err(IpdError::Busy(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_concurrent_admissions_to_one_bed_only_one_wins() {
        const N: usize = 8;
        let Some(f) = Fixture::new(Duration::from_secs(5)) else {
            return;
        };
        let (ward, beds) = f.ward(1);
        let requests = (0..N).map(|_| f.request(ward.id, beds[0].id)).collect();

        let results = f.race(requests);
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let unavailable = results
            .iter()
            .filter(|r| matches!(r, Err(IpdError::BedUnavailable { .. })))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(unavailable, N - 1);

        let ward = f.service.get_ward(ward.id).expect("get ward should succeed");
        assert_eq!((ward.total_beds, ward.occupied_beds), (1, 1));
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_concurrent_admissions_get_distinct_numbers() {
        const N: usize = 10;
        let Some(f) = Fixture::new(Duration::from_secs(5)) else {
            return;
        };
        let (ward, beds) = f.ward(N as u32);
        let requests = beds.iter().map(|b| f.request(ward.id, b.id)).collect();

        let numbers: HashSet<String> = f
            .race(requests)
            .into_iter()
            .map(|r| r.expect("admission should succeed").admission_number)
            .collect();
        assert_eq!(numbers.len(), N);
        assert!(numbers.iter().all(|n| n.starts_with("PGT") && n.len() == 15));
        assert!(numbers.iter().any(|n| n.ends_with("0001")));
        assert!(numbers.iter().any(|n| n.ends_with("0010")));
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_held_row_lock_gives_busy() {
        let Some(f) = Fixture::new(Duration::from_millis(300)) else {
            return;
        };
        let (_, beds) = f.ward(1);

        let mut holder = f.store.begin().expect("begin should succeed");
        holder
            .lock_bed(beds[0].id)
            .expect("lock should succeed")
            .expect("bed should exist");

        let mut waiter = f.store.begin().expect("begin should succeed");
        let err = waiter
            .lock_bed(beds[0].id)
            .expect_err("second lock should time out");
        assert!(matches!(err, IpdError::Busy(_)));
        assert!(err.is_retryable());
        drop(waiter);
        drop(holder);

        let mut after = f.store.begin().expect("begin should succeed");
        assert!(after.lock_bed(beds[0].id).expect("lock should succeed").is_some());
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_rows_round_trip_through_lifecycle() {
        let Some(f) = Fixture::new(Duration::from_secs(5)) else {
            return;
        };
        let (ward, beds) = f.ward(2);
        let created = f
            .service
            .create_admission(f.request(ward.id, beds[0].id))
            .expect("admission should succeed");

        let moved = f
            .service
            .transfer_admission(
                created.id,
                TransferRequest {
                    to_ward_id: ward.id,
                    to_bed_id: beds[1].id,
                    reason: TransferReason::Isolation,
                    notes: Some("moved to side room".into()),
                    transferred_by: f.staff,
                },
            )
            .expect("transfer should succeed");
        assert_eq!(moved.transfer_count, 1);

        let closed = f
            .service
            .discharge_admission(
                created.id,
                DischargeRequest {
                    closed_by: f.staff,
                    details: DischargeDetails {
                        summary: Some("recovered".into()),
                        ..DischargeDetails::default()
                    },
                },
            )
            .expect("discharge should succeed");

        let read = f.service.get_admission(created.id).expect("get should succeed");
        assert_eq!(read.status(), AdmissionStatus::Discharged);
        assert_eq!(read.admission_number, created.admission_number);
        assert_eq!(read.facility_id, Some(f.facility));
        assert_eq!(read.attending_doctor_id, Some(f.staff));
        assert_eq!(read.admission_diagnosis.as_deref(), Some("fever"));
        assert_eq!(read.placement().bed_id, beds[1].id);
        assert_eq!(read.transfer_count, 1);
        match (&read.state, &closed.state) {
            (
                AdmissionState::Closed {
                    closed_at: stored_at,
                    closed_by,
                    details,
                    ..
                },
                AdmissionState::Closed { closed_at, .. },
            ) => {
                assert_eq!(*closed_by, f.staff);
                assert_eq!(details.summary.as_deref(), Some("recovered"));
                // Postgres keeps microseconds.
                assert_eq!((*stored_at - *closed_at).num_milliseconds(), 0);
            }
            other => panic!("expected closed admissions, got {:?}", other),
        }

        let history = f
            .service
            .transfer_history(created.id)
            .expect("history should succeed");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from.bed_id, beds[0].id);
        assert_eq!(history[0].reason, TransferReason::Isolation);

        let bed = f.service.get_bed(beds[1].id).expect("get bed should succeed");
        assert_eq!(bed.status, BedStatus::Cleaning);
        assert_eq!(bed.daily_rate_cents, 150_000);

        let ward = f.service.get_ward(ward.id).expect("get ward should succeed");
        assert_eq!((ward.total_beds, ward.occupied_beds), (2, 0));
        assert_eq!(ward.floor, Some(1));
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_schema_refuses_second_open_admission_on_bed() {
        let Some(f) = Fixture::new(Duration::from_secs(5)) else {
            return;
        };
        let (ward, beds) = f.ward(1);
        let first = f
            .service
            .create_admission(f.request(ward.id, beds[0].id))
            .expect("admission should succeed");

        // Bypasses the bed pool to reach the partial unique index directly.
        let mut duplicate = first.clone();
        duplicate.id = AdmissionId::new();
        duplicate.admission_number = format!("{}X", first.admission_number);

        let mut tx = f.store.begin().expect("begin should succeed");
        let err = tx
            .insert_admission(&duplicate)
            .expect_err("insert should violate the index");
        match err {
            IpdError::Postgres(e) => {
                assert_eq!(e.code(), Some(&postgres::error::SqlState::UNIQUE_VIOLATION))
            }
            other => panic!("expected unique violation, got {:?}", other),
        }
    }
}
