use crate::model::{AdmissionStatus, BedStatus};
use ipd_uuid::{AdmissionId, BedId, PatientId};

#[derive(Debug, thiserror::Error)]
pub enum IpdError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("bed {bed_id} is not available (status: {status})")]
    BedUnavailable { bed_id: BedId, status: BedStatus },
    #[error("admission {admission_id} is not currently admitted (status: {status})")]
    NotAdmitted {
        admission_id: AdmissionId,
        status: AdmissionStatus,
    },
    #[error("patient {patient_id} already has an active admission {admission_id}")]
    PatientAlreadyAdmitted {
        patient_id: PatientId,
        admission_id: AdmissionId,
    },
    #[error("timed out waiting for lock on {0}")]
    Busy(String),
    #[error("sequence exhausted for scope {scope}")]
    SequenceExhausted { scope: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid text: {0}")]
    Text(#[from] ipd_types::TextError),
    #[error("invalid identifier: {0}")]
    Uuid(#[from] ipd_uuid::UuidError),

    #[error("postgres error: {0}")]
    Postgres(postgres::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

impl IpdError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        IpdError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true when the failed operation made no writes and may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpdError::Busy(_))
    }

    /// Returns true for errors the caller can resolve by choosing different input
    /// (another bed, another admission) rather than by retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IpdError::BedUnavailable { .. }
                | IpdError::NotAdmitted { .. }
                | IpdError::PatientAlreadyAdmitted { .. }
                | IpdError::SequenceExhausted { .. }
        )
    }
}

impl From<postgres::Error> for IpdError {
    fn from(err: postgres::Error) -> Self {
        use postgres::error::SqlState;

        match err.code() {
            Some(code) if *code == SqlState::LOCK_NOT_AVAILABLE => {
                IpdError::Busy("postgres row lock (lock_timeout exceeded)".into())
            }
            Some(code) if *code == SqlState::T_R_DEADLOCK_DETECTED => {
                IpdError::Busy("postgres row lock (deadlock detected)".into())
            }
            _ => IpdError::Postgres(err),
        }
    }
}

pub type IpdResult<T> = std::result::Result<T, IpdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_retryable_and_conflicts_are_not() {
        assert!(IpdError::Busy("bed".into()).is_retryable());

        let conflict = IpdError::BedUnavailable {
            bed_id: BedId::new(),
            status: BedStatus::Occupied,
        };
        assert!(!conflict.is_retryable());
        assert!(conflict.is_conflict());
    }

    #[test]
    fn test_not_admitted_message_names_status() {
        let err = IpdError::NotAdmitted {
            admission_id: AdmissionId::new(),
            status: AdmissionStatus::Discharged,
        };
        assert!(err.to_string().contains("discharged"));
    }
}
