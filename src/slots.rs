//! Expansion of working hours into bookable slots.
//!
//! Everything here is pure: the calendar store decides when to call it and
//! what to persist.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::{error::BookingError, models::Slot};

pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 240;

/// One weekly working-hours entry. `weekday` counts from Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

impl WorkingHours {
    pub fn applies_to(&self, weekday: Weekday) -> bool {
        self.enabled && u32::from(self.weekday) == weekday.num_days_from_monday()
    }
}

/// Caller-supplied slot boundaries for a day override.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    pub start_time: String,
    pub end_time: String,
}

/// Parses a strict `HH:MM` wall-clock time into minutes since midnight.
pub fn parse_clock(value: &str) -> Result<u32, BookingError> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(BookingError::InvalidInput(format!("{value:?} is not HH:MM")));
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| BookingError::InvalidInput(format!("{value:?} is not HH:MM")))?;
    Ok(time.hour() * 60 + time.minute())
}

pub fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn validate_duration(minutes: u32) -> Result<(), BookingError> {
    if (MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(BookingError::InvalidInput(format!(
            "slot duration must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES} minutes"
        )))
    }
}

pub fn validate_hours(hours: &[WorkingHours]) -> Result<(), BookingError> {
    let mut seen = [false; 7];
    for entry in hours {
        let index = usize::from(entry.weekday);
        if index >= seen.len() {
            return Err(BookingError::InvalidInput(format!(
                "weekday {} is out of range 0..=6",
                entry.weekday
            )));
        }
        if seen[index] {
            return Err(BookingError::InvalidInput(format!(
                "weekday {} is listed twice",
                entry.weekday
            )));
        }
        seen[index] = true;
        if parse_clock(&entry.start_time)? >= parse_clock(&entry.end_time)? {
            return Err(BookingError::InvalidInput(format!(
                "working hours for weekday {} end before they start",
                entry.weekday
            )));
        }
    }
    Ok(())
}

/// Cuts `[start, end)` into contiguous slots of `duration` minutes. A trailing
/// remainder shorter than `duration` is dropped rather than clipped.
pub fn generate_slots(start: &str, end: &str, duration: u32) -> Result<Vec<Slot>, BookingError> {
    validate_duration(duration)?;
    let start = parse_clock(start)?;
    let end = parse_clock(end)?;
    if start >= end {
        return Err(BookingError::InvalidInput(
            "working hours end before they start".into(),
        ));
    }

    let mut slots = Vec::with_capacity(((end - start) / duration) as usize);
    let mut cursor = start;
    while cursor + duration <= end {
        slots.push(Slot::open(format_clock(cursor), format_clock(cursor + duration)));
        cursor += duration;
    }
    Ok(slots)
}

/// Slots for `date` from the doctor's weekly hours.
pub fn day_slots(
    hours: &[WorkingHours],
    date: NaiveDate,
    duration: u32,
) -> Result<Vec<Slot>, BookingError> {
    let entry = hours
        .iter()
        .find(|entry| entry.applies_to(date.weekday()))
        .ok_or(BookingError::DayNotWorking(date))?;
    generate_slots(&entry.start_time, &entry.end_time, duration)
}

/// Validates an explicit slot list and returns it ordered by start time.
pub fn explicit_slots(specs: &[SlotSpec]) -> Result<Vec<Slot>, BookingError> {
    let mut bounds = Vec::with_capacity(specs.len());
    for spec in specs {
        let start = parse_clock(&spec.start_time)?;
        let end = parse_clock(&spec.end_time)?;
        if start >= end {
            return Err(BookingError::InvalidInput(format!(
                "slot {}-{} ends before it starts",
                spec.start_time, spec.end_time
            )));
        }
        bounds.push((start, end));
    }
    bounds.sort_unstable();

    for pair in bounds.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(BookingError::InvalidInput(format!(
                "slots starting at {} and {} overlap",
                format_clock(pair[0].0),
                format_clock(pair[1].0)
            )));
        }
    }

    Ok(bounds
        .into_iter()
        .map(|(start, end)| Slot::open(format_clock(start), format_clock(end)))
        .collect())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp and reduces it to the UTC day.
pub fn parse_day(value: &str) -> Result<NaiveDate, BookingError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|stamp| stamp.with_timezone(&chrono::Utc).date_naive())
        .map_err(|_| BookingError::InvalidInput(format!("{value:?} is not a calendar date")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday_hours(start: &str, end: &str) -> Vec<WorkingHours> {
        vec![WorkingHours {
            weekday: 0,
            start_time: start.into(),
            end_time: end.into(),
            enabled: true,
        }]
    }

    #[test]
    fn full_day_yields_sixteen_half_hours() {
        let slots = generate_slots("09:00", "17:00", 30).unwrap();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0].start_time, "09:00");
        assert_eq!(slots[0].end_time, "09:30");
        assert_eq!(slots[15].start_time, "16:30");
        assert_eq!(slots[15].end_time, "17:00");
        assert!(slots.iter().all(|slot| slot.is_available && slot.reservation_id.is_none()));
    }

    #[test]
    fn slots_are_contiguous() {
        let slots = generate_slots("08:15", "12:45", 45).unwrap();
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        for slot in &slots {
            let len = parse_clock(&slot.end_time).unwrap() - parse_clock(&slot.start_time).unwrap();
            assert_eq!(len, 45);
        }
    }

    #[test]
    fn trailing_remainder_is_dropped() {
        let slots = generate_slots("09:00", "10:20", 30).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.last().unwrap().end_time, "10:00");
    }

    #[test]
    fn range_shorter_than_duration_is_empty() {
        assert!(generate_slots("09:00", "09:20", 30).unwrap().is_empty());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(generate_slots("10:00", "09:00", 30).is_err());
        assert!(generate_slots("09:00", "17:00", 0).is_err());
        assert!(generate_slots("9:00", "17:00", 30).is_err());
        assert!(generate_slots("09:00", "24:00", 30).is_err());
    }

    #[test]
    fn day_slots_follow_weekday() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let tuesday = monday.succ_opt().unwrap();
        let hours = monday_hours("09:00", "10:00");

        let slots = day_slots(&hours, monday, 30).unwrap();
        assert_eq!(slots.len(), 2);

        let err = day_slots(&hours, tuesday, 30).unwrap_err();
        assert!(matches!(err, BookingError::DayNotWorking(date) if date == tuesday));
    }

    #[test]
    fn disabled_entries_do_not_count() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let mut hours = monday_hours("09:00", "10:00");
        hours[0].enabled = false;
        assert!(matches!(
            day_slots(&hours, monday, 30),
            Err(BookingError::DayNotWorking(_))
        ));
    }

    #[test]
    fn explicit_slots_are_sorted_and_checked() {
        let specs = vec![
            SlotSpec { start_time: "14:00".into(), end_time: "14:30".into() },
            SlotSpec { start_time: "09:00".into(), end_time: "09:45".into() },
        ];
        let slots = explicit_slots(&specs).unwrap();
        assert_eq!(slots[0].start_time, "09:00");
        assert_eq!(slots[1].start_time, "14:00");

        let overlapping = vec![
            SlotSpec { start_time: "09:00".into(), end_time: "10:00".into() },
            SlotSpec { start_time: "09:30".into(), end_time: "10:30".into() },
        ];
        assert!(explicit_slots(&overlapping).is_err());
    }

    #[test]
    fn hours_validation() {
        let mut hours = monday_hours("09:00", "17:00");
        assert!(validate_hours(&hours).is_ok());
        hours.push(hours[0].clone());
        assert!(validate_hours(&hours).is_err());
        assert!(validate_hours(&monday_hours("17:00", "09:00")).is_err());
        let mut sunday_plus = monday_hours("09:00", "10:00");
        sunday_plus[0].weekday = 7;
        assert!(validate_hours(&sunday_plus).is_err());
    }

    #[test]
    fn days_parse_from_dates_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(parse_day("2025-03-03").unwrap(), expected);
        assert_eq!(parse_day("2025-03-03T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_day("2025-03-03T23:30:00-02:00").unwrap(), expected.succ_opt().unwrap());
        assert!(parse_day("03/03/2025").is_err());
    }
}
