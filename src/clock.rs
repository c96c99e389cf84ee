use time::Date;
use time::OffsetDateTime;
use time::UtcOffset;

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock, truncated to whole milliseconds so that every timestamp it produces survives a
/// round trip through storage unchanged.
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();

        now.replace_millisecond(now.millisecond())
            .expect("millisecond is in range")
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// The calendar date of `t` in the user's time zone, or in UTC when the local offset can't be
/// determined.
pub fn local_date(t: OffsetDateTime) -> Date {
    match UtcOffset::current_local_offset() {
        Ok(offset) => t.to_offset(offset).date(),
        Err(_) => t.date(),
    }
}
