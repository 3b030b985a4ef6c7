//! Pure wall-clock arithmetic: shift matching, late/early/overtime minutes,
//! month enumeration. No I/O; everything operates on the organization's
//! local time.

use crate::model::shift::Shift;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// A check-out closer than this to its check-in is rejected.
pub const MIN_PUNCH_GAP_SECS: i64 = 10;

const MINUTES_PER_DAY: i64 = 1440;

fn minutes_of(t: NaiveTime) -> i64 {
    t.hour() as i64 * 60 + t.minute() as i64
}

/// Minutes since the most recent occurrence of `start`, wrapped to a day.
fn minutes_since(now: NaiveTime, start: NaiveTime) -> i64 {
    (minutes_of(now) - minutes_of(start)).rem_euclid(MINUTES_PER_DAY)
}

/// Pick the shift whose start time is closest to `now`, preferring a shift
/// already in progress over a future one; equal distance breaks toward the
/// earlier start time. Returns the shift and the raw late minutes
/// (max(0, now - start); grace is the caller's concern).
pub fn match_shift<'a>(now: NaiveTime, shifts: &'a [Shift]) -> Option<(&'a Shift, i64)> {
    let mut best: Option<(&Shift, i64, bool, i64)> = None;

    for shift in shifts {
        let since_start = minutes_since(now, shift.start_time);
        let until_start = MINUTES_PER_DAY - since_start;
        let in_progress = since_start < shift.duration_minutes;
        let distance = since_start.min(until_start);

        let candidate = (shift, distance, in_progress, minutes_of(shift.start_time));
        let better = match best {
            None => true,
            Some((_, best_distance, best_in_progress, best_start)) => {
                if in_progress != best_in_progress {
                    in_progress
                } else if distance != best_distance {
                    distance < best_distance
                } else {
                    candidate.3 < best_start
                }
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    best.map(|(shift, _, in_progress, _)| {
        let since_start = minutes_since(now, shift.start_time);
        let until_start = MINUTES_PER_DAY - since_start;
        // Late only when the shift has started: either it is running, or its
        // start is closer behind us than ahead of us.
        let late = if in_progress || since_start <= until_start {
            since_start
        } else {
            0
        };
        (shift, late)
    })
}

/// Grace forgives lateness up to the threshold entirely.
pub fn apply_grace(late_minutes: i64, grace_minutes: i64) -> i64 {
    if late_minutes <= grace_minutes { 0 } else { late_minutes }
}

/// Shift end as an instant, anchored to the attendance date. Overnight
/// shifts end on the following day.
pub fn shift_end_on(date: NaiveDate, shift: &Shift) -> NaiveDateTime {
    let end = date.and_time(shift.end_time);
    if shift.crosses_midnight() {
        end + Duration::days(1)
    } else {
        end
    }
}

pub fn early_exit_minutes(check_out: NaiveDateTime, shift_end: NaiveDateTime) -> i64 {
    (shift_end - check_out).num_minutes().max(0)
}

pub fn overtime_minutes(total_minutes: i64, expected_minutes: i64) -> i64 {
    (total_minutes - expected_minutes).max(0)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month");
    (next - first).num_days() as u32
}

/// Every date of the month, both endpoints inclusive.
pub fn enumerate_month(year: i32, month: u32) -> Vec<NaiveDate> {
    (1..=days_in_month(year, month))
        .map(|day| NaiveDate::from_ymd_opt(year, month, day).expect("valid day"))
        .collect()
}

/// Whole calendar months from `from` to `to`, ignoring days-of-month.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

/// Financial year label for a date, April–March, e.g. `"2025-26"`.
pub fn financial_year(date: NaiveDate) -> String {
    let start_year = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{:02}", start_year, (start_year + 1) % 100)
}

/// First day of the financial year containing `date`.
pub fn financial_year_start(date: NaiveDate) -> NaiveDate {
    let start_year = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    NaiveDate::from_ymd_opt(start_year, 4, 1).expect("valid date")
}

/// Completed years between `born` and `on`.
pub fn age_years(born: NaiveDate, on: NaiveDate) -> u32 {
    let mut age = on.year() - born.year();
    if (on.month(), on.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shift::Shift;

    fn shift(id: u64, start: &str, end: &str, duration: i64) -> Shift {
        Shift {
            id,
            organization_id: 1,
            name: format!("shift-{id}"),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            duration_minutes: duration,
            paid_break_minutes: 60,
        }
    }

    fn t(s: &str) -> NaiveTime {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn late_check_in_against_single_shift() {
        let shifts = vec![shift(1, "09:00", "18:00", 540)];
        let (matched, late) = match_shift(t("09:12"), &shifts).unwrap();
        assert_eq!(matched.id, 1);
        assert_eq!(late, 12);
    }

    #[test]
    fn early_check_in_is_not_late() {
        let shifts = vec![shift(1, "09:00", "18:00", 540)];
        let (_, late) = match_shift(t("08:40"), &shifts).unwrap();
        assert_eq!(late, 0);
    }

    #[test]
    fn nearest_shift_wins() {
        let shifts = vec![
            shift(1, "06:00", "14:00", 480),
            shift(2, "14:00", "22:00", 480),
        ];
        let (matched, _) = match_shift(t("13:40"), &shifts).unwrap();
        // 06:00 shift is still in progress at 13:40, so it wins over the
        // 14:00 shift that is 20 minutes away.
        assert_eq!(matched.id, 1);

        let (matched, late) = match_shift(t("14:25"), &shifts).unwrap();
        assert_eq!(matched.id, 2);
        assert_eq!(late, 25);
    }

    #[test]
    fn equal_distance_prefers_earlier_start() {
        // Both shifts ended; 12:00 is 120 minutes from both starts.
        let shifts = vec![
            shift(2, "14:00", "15:00", 60),
            shift(1, "10:00", "11:00", 60),
        ];
        let (matched, _) = match_shift(t("12:00"), &shifts).unwrap();
        assert_eq!(matched.id, 1);
    }

    #[test]
    fn night_shift_check_in_after_midnight_is_in_progress() {
        let shifts = vec![shift(1, "22:00", "06:00", 480)];
        let (matched, late) = match_shift(t("01:30"), &shifts).unwrap();
        assert_eq!(matched.id, 1);
        assert_eq!(late, 210);
    }

    #[test]
    fn grace_forgives_up_to_threshold() {
        assert_eq!(apply_grace(12, 15), 0);
        assert_eq!(apply_grace(15, 15), 0);
        assert_eq!(apply_grace(16, 15), 16);
    }

    #[test]
    fn overnight_shift_end_lands_on_next_day() {
        let night = shift(1, "22:00", "06:00", 480);
        let end = shift_end_on(d("2026-03-02"), &night);
        assert_eq!(end, d("2026-03-03").and_time(t("06:00")));

        let day = shift(2, "09:00", "18:00", 540);
        let end = shift_end_on(d("2026-03-02"), &day);
        assert_eq!(end, d("2026-03-02").and_time(t("18:00")));
    }

    #[test]
    fn early_exit_clamps_at_zero() {
        let end = d("2026-03-02").and_time(t("18:00"));
        assert_eq!(early_exit_minutes(d("2026-03-02").and_time(t("17:30")), end), 30);
        assert_eq!(early_exit_minutes(d("2026-03-02").and_time(t("18:05")), end), 0);
    }

    #[test]
    fn overtime_clamps_at_zero() {
        assert_eq!(overtime_minutes(600, 540), 60);
        assert_eq!(overtime_minutes(533, 540), 0);
    }

    #[test]
    fn month_enumeration_is_inclusive() {
        let march = enumerate_month(2026, 3);
        assert_eq!(march.len(), 31);
        assert_eq!(march[0], d("2026-03-01"));
        assert_eq!(march[30], d("2026-03-31"));

        // 2024 is a leap year
        assert_eq!(enumerate_month(2024, 2).len(), 29);
        assert_eq!(enumerate_month(2026, 2).len(), 28);
    }

    #[test]
    fn months_between_ignores_days() {
        assert_eq!(months_between(d("2025-01-15"), d("2026-03-01")), 14);
        assert_eq!(months_between(d("2026-03-01"), d("2026-03-31")), 0);
    }

    #[test]
    fn financial_year_rolls_in_april() {
        assert_eq!(financial_year(d("2026-03-31")), "2025-26");
        assert_eq!(financial_year(d("2026-04-01")), "2026-27");
        assert_eq!(financial_year_start(d("2026-03-31")), d("2025-04-01"));
    }

    #[test]
    fn age_respects_birthday_not_yet_reached() {
        assert_eq!(age_years(d("1990-06-15"), d("2026-06-14")), 35);
        assert_eq!(age_years(d("1990-06-15"), d("2026-06-15")), 36);
    }
}
