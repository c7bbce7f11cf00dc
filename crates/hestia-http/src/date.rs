//! RFC 1123 date formatting for the `Date`, `Expires` and related headers.

use std::time::{SystemTime, UNIX_EPOCH};

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formats the current time as an RFC 1123 date in GMT.
#[must_use]
pub fn http_date_now() -> String {
    http_date(SystemTime::now())
}

/// Formats a timestamp as an RFC 1123 date, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
#[must_use]
pub fn http_date(at: SystemTime) -> String {
    let secs_since_epoch = at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    // Civil-from-days, anchored at 2000-03-01 so leap handling stays in
    // whole 400/100/4-year cycles.
    const LEAPOCH: i64 = 11017;
    const DAYS_PER_400Y: i64 = 365 * 400 + 97;
    const DAYS_PER_100Y: i64 = 365 * 100 + 24;
    const DAYS_PER_4Y: i64 = 365 * 4 + 1;

    let days = (secs_since_epoch / 86400) as i64 - LEAPOCH;
    let secs_of_day = secs_since_epoch % 86400;

    let mut qc_cycles = days / DAYS_PER_400Y;
    let mut remdays = days % DAYS_PER_400Y;
    if remdays < 0 {
        remdays += DAYS_PER_400Y;
        qc_cycles -= 1;
    }

    let mut c_cycles = remdays / DAYS_PER_100Y;
    if c_cycles == 4 {
        c_cycles -= 1;
    }
    remdays -= c_cycles * DAYS_PER_100Y;

    let mut q_cycles = remdays / DAYS_PER_4Y;
    if q_cycles == 25 {
        q_cycles -= 1;
    }
    remdays -= q_cycles * DAYS_PER_4Y;

    let mut remyears = remdays / 365;
    if remyears == 4 {
        remyears -= 1;
    }
    remdays -= remyears * 365;

    let mut year = 2000 + remyears + 4 * q_cycles + 100 * c_cycles + 400 * qc_cycles;

    // Month lengths starting from March.
    let month_lengths = [31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 29];
    let mut month = 0;
    for len in month_lengths {
        month += 1;
        if remdays < len {
            break;
        }
        remdays -= len;
    }
    let day_of_month = remdays + 1;
    let month = if month + 2 > 12 {
        year += 1;
        month - 10
    } else {
        month + 2
    };

    let mut weekday = (3 + days) % 7;
    if weekday <= 0 {
        weekday += 7;
    }

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        DAY_NAMES[(weekday - 1) as usize],
        day_of_month,
        MONTH_NAMES[(month - 1) as usize],
        year,
        secs_of_day / 3600,
        (secs_of_day / 60) % 60,
        secs_of_day % 60,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(epoch: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(epoch)
    }

    #[test]
    fn test_epoch() {
        assert_eq!(http_date(at(0)), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_rfc_example() {
        // The classic example date from RFC 2616.
        assert_eq!(http_date(at(784_111_777)), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_leap_day() {
        assert_eq!(http_date(at(1_582_934_400)), "Sat, 29 Feb 2020 00:00:00 GMT");
    }

    #[test]
    fn test_recent_date() {
        assert_eq!(http_date(at(1_704_067_200)), "Mon, 01 Jan 2024 00:00:00 GMT");
    }
}
