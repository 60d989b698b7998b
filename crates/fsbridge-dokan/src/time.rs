//! FILETIME conversion.
//!
//! FILETIME counts 100-nanosecond intervals since January 1, 1601 (UTC).

use crate::ffi::FileTime;
use chrono::{DateTime, TimeZone, Utc};

/// Ticks between 1601-01-01 and the Unix epoch
pub const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Convert a timestamp to FILETIME ticks. Times before 1601 clamp to zero.
pub fn to_ticks(dt: DateTime<Utc>) -> u64 {
    let unix_ticks = match dt.timestamp_nanos_opt() {
        Some(nanos) => nanos / 100,
        None => dt.timestamp().saturating_mul(TICKS_PER_SECOND),
    };
    unix_ticks.saturating_add(UNIX_EPOCH_TICKS).max(0) as u64
}

/// Convert a timestamp to a split FILETIME.
pub fn to_filetime(dt: DateTime<Utc>) -> FileTime {
    let ticks = to_ticks(dt);
    FileTime {
        dwLowDateTime: ticks as u32,
        dwHighDateTime: (ticks >> 32) as u32,
    }
}

/// FILETIME for an optional timestamp; unknown times are zero.
pub fn to_filetime_opt(dt: Option<DateTime<Utc>>) -> FileTime {
    dt.map(to_filetime).unwrap_or_default()
}

/// Convert a FILETIME back to a chrono DateTime.
pub fn from_filetime(ft: FileTime) -> Option<DateTime<Utc>> {
    let ticks = ((ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64) as i64;
    let unix_ticks = ticks - UNIX_EPOCH_TICKS;
    let seconds = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;

    Utc.timestamp_opt(seconds, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(to_ticks(epoch), UNIX_EPOCH_TICKS as u64);
    }

    #[test]
    fn test_known_date() {
        // January 1, 2020 00:00:00 UTC
        let dt = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let ft = to_filetime(dt);
        let ticks = (ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64;
        assert_eq!(ticks, 132_223_104_000_000_000);

        let back = from_filetime(ft).unwrap();
        assert_eq!(back.year(), 2020);
        assert_eq!(back, dt);
    }

    #[test]
    fn test_sub_second_precision() {
        let dt = Utc.timestamp_opt(1, 123_456_700).unwrap();
        assert_eq!(
            to_ticks(dt),
            UNIX_EPOCH_TICKS as u64 + TICKS_PER_SECOND as u64 + 1_234_567
        );
    }

    #[test]
    fn test_unknown_time_is_zero() {
        assert_eq!(to_filetime_opt(None), FileTime::default());
    }
}
