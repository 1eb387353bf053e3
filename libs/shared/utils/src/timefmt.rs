use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

pub const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

const SPANISH_DAYS: [&str; 7] = [
    "Lunes", "Martes", "Miercoles", "Jueves", "Viernes", "Sabado", "Domingo",
];

const SPANISH_MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio",
    "julio", "agosto", "septiembre", "octubre", "noviembre", "diciembre",
];

/// Parse a practice timezone string, falling back to Eastern.
pub fn practice_timezone(timezone_str: &str) -> Tz {
    timezone_str.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Invalid timezone '{}', falling back to America/New_York", timezone_str);
        chrono_tz::America::New_York
    })
}

/// Today's date as seen on the practice's wall clock.
pub fn today_in_timezone(timezone_str: &str) -> NaiveDate {
    Utc::now().with_timezone(&practice_timezone(timezone_str)).date_naive()
}

/// Interpret a naive (date, time) on the practice's wall clock and return
/// the corresponding instant. Ambiguous local times (DST fold) resolve to
/// the earlier instant; skipped local times shift forward.
pub fn local_to_utc(
    date: NaiveDate,
    time: NaiveTime,
    timezone_str: &str,
) -> chrono::DateTime<Utc> {
    use chrono::TimeZone;

    let tz = practice_timezone(timezone_str);
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc::now())
        }
    }
}

/// Second-precision UTC timestamp safe for query-string filters.
pub fn format_ts_utc(ts: chrono::DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// "9:00 AM" style, no leading zero on the hour.
pub fn format_time_12h(t: NaiveTime) -> String {
    let hour = t.hour();
    let minute = t.minute();
    let period = if hour < 12 { "AM" } else { "PM" };
    let mut display_hour = if hour <= 12 { hour } else { hour - 12 };
    if display_hour == 0 {
        display_hour = 12;
    }
    format!("{}:{:02} {}", display_hour, minute, period)
}

/// "Monday, February 24, 2025" (no leading zero on the day).
pub fn format_date_long(d: NaiveDate) -> String {
    format!(
        "{}, {} {}, {}",
        DAY_NAMES[d.weekday().num_days_from_monday() as usize],
        d.format("%B"),
        d.day(),
        d.year(),
    )
}

/// Format an appointment's date and time for SMS display.
///
/// English: "Monday, February 24, 2025" / "9:00 AM"
/// Spanish: "Lunes, 24 de febrero de 2025" / "9:00 AM"
///
/// Returns (formatted_date, formatted_time).
pub fn format_appointment_datetime(
    appt_date: NaiveDate,
    appt_time: NaiveTime,
    language: &str,
) -> (String, String) {
    let formatted_time = format_time_12h(appt_time);

    let formatted_date = if language == "es" {
        let day_name = SPANISH_DAYS[appt_date.weekday().num_days_from_monday() as usize];
        let month_name = SPANISH_MONTHS[appt_date.month0() as usize];
        format!("{}, {} de {} de {}", day_name, appt_date.day(), month_name, appt_date.year())
    } else {
        format_date_long(appt_date)
    };

    (formatted_date, formatted_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_twelve_hour_times() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(format_time_12h(t(9, 0)), "9:00 AM");
        assert_eq!(format_time_12h(t(0, 30)), "12:30 AM");
        assert_eq!(format_time_12h(t(12, 0)), "12:00 PM");
        assert_eq!(format_time_12h(t(14, 15)), "2:15 PM");
    }

    #[test]
    fn formats_bilingual_dates() {
        let d = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap();
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let (en_date, en_time) = format_appointment_datetime(d, t, "en");
        assert_eq!(en_date, "Monday, February 24, 2025");
        assert_eq!(en_time, "9:00 AM");

        let (es_date, _) = format_appointment_datetime(d, t, "es");
        assert_eq!(es_date, "Lunes, 24 de febrero de 2025");
    }

    #[test]
    fn falls_back_to_eastern_on_bad_timezone() {
        assert_eq!(practice_timezone("Not/AZone"), chrono_tz::America::New_York);
        assert_eq!(practice_timezone("America/Chicago"), chrono_tz::America::Chicago);
    }
}
