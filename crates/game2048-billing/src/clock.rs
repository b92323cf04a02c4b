//! Unix-second arithmetic and the wall-clock formats the gateways expect.

/// Seconds per day
pub const DAY: u64 = 86_400;

/// VNPay timestamps are Vietnam local time
pub const GMT7_OFFSET: u64 = 7 * 3_600;

/// Civil date for a count of days since 1970-01-01 (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn split(secs: u64) -> (i64, u32, u32, u64, u64, u64) {
    let days = (secs / DAY) as i64;
    let rem = secs % DAY;
    let (y, m, d) = civil_from_days(days);
    (y, m, d, rem / 3_600, rem % 3_600 / 60, rem % 60)
}

/// `YYYYMMDDHHMMSS` in GMT+7
pub fn vnpay_timestamp(unix_secs: u64) -> String {
    let (y, m, d, hh, mm, ss) = split(unix_secs + GMT7_OFFSET);
    format!("{:04}{:02}{:02}{:02}{:02}{:02}", y, m, d, hh, mm, ss)
}

/// `YYYY-MM-DD HH:MM:SS` in UTC
pub fn display_timestamp(unix_secs: u64) -> String {
    let (y, m, d, hh, mm, ss) = split(unix_secs);
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, hh, mm, ss)
}
