use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use uuid::Uuid;

use crate::state::AppState;

/// Local wall-clock minute at which the per-location arrival count restarts.
const RESET_HOUR: i64 = 23;
const RESET_MINUTE: i64 = 59;

/// Start of the day window containing `now`: the most recent local 23:59 at
/// or before `now`.
pub fn window_start(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::default());
    let local_reset = local_midnight + Duration::minutes(RESET_HOUR * 60 + RESET_MINUTE);
    let reset = (local_reset - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc();

    if now >= reset {
        reset
    } else {
        reset - Duration::days(1)
    }
}

pub fn arrivals_today(
    state: &AppState,
    location_id: Uuid,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> u32 {
    let start = window_start(now, offset);
    let count = state
        .packages
        .iter()
        .filter(|entry| {
            let package = entry.value();
            package.location_id == location_id
                && package.created_at >= start
                && package.created_at <= now
        })
        .count();

    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn next_ordinal(
    state: &AppState,
    location_id: Uuid,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> u32 {
    arrivals_today(state, location_id, now, offset).saturating_add(1)
}
