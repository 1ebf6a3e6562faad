//! Calendar helpers for the weekly board.
//!
//! Weeks start on Monday. A Monday-Friday span "belongs" to whichever month
//! holds the majority of its working days, which drives the `Week N` labels.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Fallback formats tried after the slash/dash forms.
const FALLBACK_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
const FALLBACK_DATE_FORMATS: &[&str] = &["%a %b %d %Y", "%b %d %Y", "%B %d, %Y", "%b %d, %Y"];

/// Parse a date in `MM/DD/YYYY`, `YYYY-MM-DD`, or a handful of textual forms.
///
/// A string with exactly three `/` fields is month/day/year; one with exactly
/// three `-` fields is year/month/day, decided purely by field count. Invalid
/// components (`13/45/2024`) yield `None` rather than rolling over.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let slash: Vec<&str> = input.split('/').collect();
    if slash.len() == 3 {
        let month = parse_field(slash[0])?;
        let day = parse_field(slash[1])?;
        let year = parse_field(slash[2])?;
        return ymd(year, month, day);
    }

    let dash: Vec<&str> = input.split('-').collect();
    if dash.len() == 3 {
        let year = parse_field(dash[0])?;
        let month = parse_field(dash[1])?;
        let day = parse_field(dash[2])?;
        return ymd(year, month, day);
    }

    parse_fallback(input)
}

fn parse_field(field: &str) -> Option<i64> {
    field.trim().parse::<i64>().ok()
}

fn ymd(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    // Two-digit years land in the 1900s.
    let year = if (0..=99).contains(&year) {
        1900 + year
    } else {
        year
    };
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(month).ok()?;
    let day = u32::try_from(day).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_fallback(input: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return Some(date);
        }
    }
    None
}

/// Monday of the week containing `date` (Sunday counts as day 7).
pub fn get_monday(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().number_from_monday() - 1;
    date - Duration::days(i64::from(offset))
}

/// Monday of the week containing `moment`, at 00:00:00.000.
pub fn monday_midnight(moment: NaiveDateTime) -> NaiveDateTime {
    get_monday(moment.date()).and_time(NaiveTime::MIN)
}

/// The Monday-Saturday columns shown for a week.
pub fn week_dates(monday: NaiveDate) -> Vec<NaiveDate> {
    (0..6).map(|i| monday + Duration::days(i)).collect()
}

/// Month (1-12) holding the majority of the Monday-Friday span.
pub fn week_month(monday: NaiveDate) -> u32 {
    let mut counts: Vec<(u32, u32)> = Vec::with_capacity(2);
    for i in 0..5 {
        let month = (monday + Duration::days(i)).month();
        match counts.iter_mut().find(|(m, _)| *m == month) {
            Some((_, n)) => *n += 1,
            None => counts.push((month, 1)),
        }
    }

    let mut major = monday.month();
    let mut best = counts
        .iter()
        .find(|(m, _)| *m == major)
        .map(|(_, n)| *n)
        .unwrap_or(0);
    for (month, n) in counts {
        if n > best {
            best = n;
            major = month;
        }
    }
    major
}

/// 1-based ordinal of the week within `month`.
///
/// Week 1 is the first Monday-week whose majority month is `month`.
pub fn week_of_month(monday: NaiveDate, month: u32) -> u32 {
    // Thursday always falls in the majority month, so its year is the right one.
    let year = (monday + Duration::days(3)).year();
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 1;
    };

    let mut start = get_monday(first);
    // A majority week always begins within the first week of the month.
    for _ in 0..2 {
        if week_month(start) == month {
            break;
        }
        start += Duration::days(7);
    }

    let diff_days = (monday - start).num_days();
    let week = 1 + diff_days.div_euclid(7);
    week.max(1) as u32
}

/// Header text such as `Week 2: Mar 11 - Mar 16, 2024`.
pub fn week_label(monday: NaiveDate) -> String {
    let monday = get_monday(monday);
    let week = week_of_month(monday, week_month(monday));
    let end = monday + Duration::days(5);
    format!(
        "Week {}: {} - {}",
        week,
        monday.format("%b %-d"),
        end.format("%b %-d, %Y")
    )
}

/// `YYYY-MM-DD`.
pub fn local_date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `MM/DD/YYYY`.
pub fn format_mm_dd_yyyy(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}
