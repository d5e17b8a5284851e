//! Date-scoped reference numbers such as `ADM202401150007`.
//!
//! The next number in a scope is the count of existing numbers in that scope plus one, taken
//! under an exclusive scope lock held by the caller's transaction. A rolled-back transaction
//! discards its number, so gaps are possible but duplicates are not.

use crate::constants::{MAX_SEQUENCE_VALUE, SEQUENCE_DIGITS};
use crate::store::StoreTx;
use crate::{IpdError, IpdResult};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use ipd_types::SequencePrefix;
use ipd_uuid::FacilityId;
use std::fmt;

/// The facility and prefix a counter belongs to. Together with a business day this is one
/// independent sequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceScope {
    pub facility_id: Option<FacilityId>,
    pub prefix: SequencePrefix,
}

impl SequenceScope {
    pub fn new(facility_id: Option<FacilityId>, prefix: SequencePrefix) -> Self {
        Self {
            facility_id,
            prefix,
        }
    }

    /// Prefix plus business day, the part shared by every number minted in the scope that day.
    pub fn stem(&self, day: NaiveDate) -> String {
        format!("{}{}", self.prefix, day.format("%Y%m%d"))
    }
}

impl fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.facility_id {
            Some(facility) => write!(f, "{}@{}", self.prefix, facility),
            None => write!(f, "{}", self.prefix),
        }
    }
}

/// A minted reference number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceNumber {
    pub value: String,
    pub ordinal: u32,
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// The calendar day `now` falls on in the facility's business-day offset.
pub fn business_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Formats `<PREFIX><YYYYMMDD><NNNN>`.
///
/// Fails with [`IpdError::SequenceExhausted`] when `ordinal` does not fit in the counter width.
pub fn format_sequence_number(
    scope: &SequenceScope,
    day: NaiveDate,
    ordinal: u32,
) -> IpdResult<SequenceNumber> {
    if ordinal == 0 || ordinal > MAX_SEQUENCE_VALUE {
        return Err(IpdError::SequenceExhausted {
            scope: format!("{} {}", scope, day.format("%Y-%m-%d")),
        });
    }
    Ok(SequenceNumber {
        value: format!(
            "{}{:0width$}",
            scope.stem(day),
            ordinal,
            width = SEQUENCE_DIGITS
        ),
        ordinal,
    })
}

/// Mints the next number in `scope` for `day`.
///
/// Must be the first lock the transaction takes. The scope lock is held until the transaction
/// ends, so the caller must insert the row carrying the number before committing.
pub fn next_sequence_number(
    tx: &mut dyn StoreTx,
    scope: &SequenceScope,
    day: NaiveDate,
) -> IpdResult<SequenceNumber> {
    let existing = tx.lock_sequence_scope(scope.facility_id, &scope.stem(day))?;
    let number = format_sequence_number(scope, day, existing.saturating_add(1))?;
    tracing::debug!("minted sequence number {}", number);
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scope() -> SequenceScope {
        SequenceScope::new(None, SequencePrefix::new("ADM").unwrap())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_format_pads_counter() {
        let number = format_sequence_number(&scope(), day(), 7).expect("format should succeed");
        assert_eq!(number.value, "ADM202401150007");
        assert_eq!(number.ordinal, 7);
    }

    #[test]
    fn test_format_rejects_overflow() {
        assert!(format_sequence_number(&scope(), day(), 9_999).is_ok());
        let err = format_sequence_number(&scope(), day(), 10_000)
            .expect_err("five digit counter should be refused");
        assert!(matches!(err, IpdError::SequenceExhausted { .. }));
    }

    #[test]
    fn test_business_day_uses_offset() {
        let late_utc = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let nairobi = FixedOffset::east_opt(3 * 3600).unwrap();

        assert_eq!(business_day(late_utc, utc), day());
        assert_eq!(
            business_day(late_utc, nairobi),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_stem_is_prefix_and_date() {
        assert_eq!(scope().stem(day()), "ADM20240115");
    }
}
