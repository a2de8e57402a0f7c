//! Canonical time zone conversion.
//!
//! Records are stored as naive wall-clock timestamps in one configured
//! canonical zone. Writes convert the UTC instant into that zone and drop
//! the offset; reads reattach the zone and hand back the UTC instant.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Convert a UTC instant into the naive wall-clock timestamp stored in the
/// database.
pub fn to_db_time(tz: Tz, dt: DateTime<Utc>) -> NaiveDateTime {
    dt.with_timezone(&tz).naive_local()
}

/// Reinterpret a stored naive timestamp in the canonical zone and return
/// the UTC instant.
///
/// During a DST fold the earlier of the two candidate instants wins; a
/// timestamp falling into a DST gap (which the write path never produces)
/// is read back as if the zone were UTC.
pub fn from_db_time(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}
