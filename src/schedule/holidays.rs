// Public holiday calendar used by `includeHolidays` schedules

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;
use tracing::warn;

/// Regions with a built-in holiday table
const SUPPORTED_REGIONS: &[&str] = &["se"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayCalendar {
    region: String,
    extra: BTreeSet<NaiveDate>,
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::new("se", Vec::new())
    }
}

impl HolidayCalendar {
    pub fn new(region: &str, extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        let region = region.to_ascii_lowercase();
        if !SUPPORTED_REGIONS.contains(&region.as_str()) {
            warn!(region = %region, "No built-in holidays for region, using configured dates only");
        }
        Self {
            region,
            extra: extra.into_iter().collect(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.extra.contains(&date) {
            return true;
        }
        match self.region.as_str() {
            "se" => swedish_holidays(date.year()).contains(&date),
            _ => false,
        }
    }
}

/// Easter Sunday by the anonymous Gregorian computus
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// First date on or after `from` that falls on `weekday`
fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let offset = (7 + weekday.num_days_from_monday() as i64
        - from.weekday().num_days_from_monday() as i64)
        % 7;
    from + Duration::days(offset)
}

fn swedish_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let fixed = [
        (1, 1),   // Nyårsdagen
        (1, 6),   // Trettondedag jul
        (5, 1),   // Första maj
        (6, 6),   // Nationaldagen
        (12, 24), // Julafton
        (12, 25), // Juldagen
        (12, 26), // Annandag jul
        (12, 31), // Nyårsafton
    ];
    let mut days: BTreeSet<NaiveDate> = fixed
        .iter()
        .filter_map(|&(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        .collect();

    if let Some(easter) = easter_sunday(year) {
        for offset in [-2, 0, 1, 39, 49] {
            days.insert(easter + Duration::days(offset));
        }
    }

    if let Some(june_19) = NaiveDate::from_ymd_opt(year, 6, 19) {
        let midsummer_eve = next_weekday(june_19, Weekday::Fri);
        days.insert(midsummer_eve);
        days.insert(midsummer_eve + Duration::days(1));
    }

    if let Some(october_31) = NaiveDate::from_ymd_opt(year, 10, 31) {
        days.insert(next_weekday(october_31, Weekday::Sat));
    }

    days
}
