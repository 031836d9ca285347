use crate::error::{ReportError, Result};
use chrono::{Datelike, Days, NaiveDate};

/// Wire format for every date the report API accepts.
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_report_date(field: &str, value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReportError::validation(field, "is required"));
    }

    NaiveDate::parse_from_str(trimmed, REPORT_DATE_FORMAT).map_err(|_| {
        ReportError::validation(
            field,
            format!("invalid date '{}'. Expected YYYY-MM-DD", trimmed),
        )
    })
}

pub fn format_report_date(date: NaiveDate) -> String {
    date.format(REPORT_DATE_FORMAT).to_string()
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// The default report period: the first of the month through `today`.
pub fn month_to_date(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (first_day_of_month(today), today)
}

/// The whole calendar month containing `date`.
pub fn month_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = first_day_of_month(date);
    let end = last_day_of_month(date.year(), date.month()).unwrap_or(date);
    (start, end)
}
