use crate::error::EngineResult;
use crate::model::attendance::Attendance;
use crate::model::holiday::{Holiday, WeekOffPattern};
use crate::utils::money::round2;
use crate::utils::settings_cache;
use crate::utils::time_math::enumerate_month;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use sqlx::MySqlPool;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Present,
    HalfDayPresent,
    Absent,
    Leave,
    HalfDayLeave,
    Holiday,
    WeekOff,
    /// Non-working day re-classified as loss-of-pay because both neighbours
    /// are absences.
    SandwichAbsent,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayEntry {
    pub date: NaiveDate,
    pub status: DayStatus,
    /// Set on leave days backed by a paid leave type.
    pub paid_leave: bool,
    pub working_minutes: i64,
}

/// What payroll needs from a month of attendance.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub month: u32,
    pub year: i32,
    pub working_days: u32,
    pub present_days: u32,
    pub half_day_present: u32,
    pub absent_days: u32,
    /// All overlaid leave days, full = 1, half = 0.5, paid or not.
    pub leave_days: Decimal,
    pub half_day_leaves: u32,
    pub lop_days: Decimal,
    pub week_off_days: u32,
    pub holiday_days: u32,
    pub sandwich_absent_days: u32,
    pub late_days: u32,
    pub early_exit_days: u32,
    pub overtime_hours: Decimal,
    pub payable_days: Decimal,
    pub day_wise: Vec<DayEntry>,
}

/// A leave application clipped to what the aggregator needs.
#[derive(Debug, Clone)]
pub struct LeaveSpan {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub is_half_day: bool,
    pub is_paid: bool,
}

pub struct MonthInputs<'a> {
    pub year: i32,
    pub month: u32,
    pub holidays: &'a [Holiday],
    pub patterns: &'a [WeekOffPattern],
    pub leaves: &'a [LeaveSpan],
    pub attendance: &'a [Attendance],
    pub min_hours_for_half_day: Decimal,
    pub sandwich_enabled: bool,
}

/// Build the per-day timeline and summary. Pure; every input is
/// pre-materialized so the pass is O(days + leaves + attendance).
pub fn build_month(inputs: &MonthInputs) -> MonthlySummary {
    let dates = enumerate_month(inputs.year, inputs.month);

    let holiday_dates: HashSet<NaiveDate> = inputs.holidays.iter().map(|h| h.date).collect();

    // date -> (minutes, any-late, any-early, overtime-minutes)
    let mut worked: HashMap<NaiveDate, (i64, bool, bool, i64)> = HashMap::new();
    for row in inputs.attendance {
        if row.check_in_time.is_none() {
            continue;
        }
        let entry = worked.entry(row.attendance_date).or_insert((0, false, false, 0));
        entry.0 += row.total_working_minutes;
        entry.1 |= row.late_minutes > 0;
        entry.2 |= row.early_exit_minutes > 0;
        entry.3 += row.overtime_minutes;
    }

    let half_day_minutes = inputs.min_hours_for_half_day * dec!(60);

    let mut day_wise: Vec<DayEntry> = Vec::with_capacity(dates.len());
    let mut is_working_base: Vec<bool> = Vec::with_capacity(dates.len());

    for date in &dates {
        let date = *date;
        let is_holiday = holiday_dates.contains(&date);
        let is_week_off = !is_holiday && inputs.patterns.iter().any(|p| p.matches(date));
        let base_working = !is_holiday && !is_week_off;
        is_working_base.push(base_working);

        let leave = inputs
            .leaves
            .iter()
            .find(|span| span.from <= date && date <= span.to);

        let presence = worked.get(&date).copied();

        let (status, paid_leave, minutes) = if let Some((minutes, _, _, _)) = presence {
            // Attendance wins the day, on working and non-working days alike.
            let status = if Decimal::from(minutes) < half_day_minutes {
                DayStatus::HalfDayPresent
            } else {
                DayStatus::Present
            };
            (status, false, minutes)
        } else if is_holiday {
            (DayStatus::Holiday, false, 0)
        } else if is_week_off {
            (DayStatus::WeekOff, false, 0)
        } else if let Some(span) = leave {
            let status = if span.is_half_day {
                DayStatus::HalfDayLeave
            } else {
                DayStatus::Leave
            };
            (status, span.is_paid, 0)
        } else {
            (DayStatus::Absent, false, 0)
        };

        day_wise.push(DayEntry {
            date,
            status,
            paid_leave,
            working_minutes: minutes,
        });
    }

    if inputs.sandwich_enabled {
        reclassify_sandwich_runs(&mut day_wise);
    }

    // Counts and the payable reduction.
    let mut summary = MonthlySummary {
        month: inputs.month,
        year: inputs.year,
        working_days: 0,
        present_days: 0,
        half_day_present: 0,
        absent_days: 0,
        leave_days: Decimal::ZERO,
        half_day_leaves: 0,
        lop_days: Decimal::ZERO,
        week_off_days: 0,
        holiday_days: 0,
        sandwich_absent_days: 0,
        late_days: 0,
        early_exit_days: 0,
        overtime_hours: Decimal::ZERO,
        payable_days: Decimal::ZERO,
        day_wise: Vec::new(),
    };

    let mut credit = Decimal::ZERO;
    let mut overtime_minutes: i64 = 0;

    for (entry, base_working) in day_wise.iter().zip(is_working_base.iter().copied()) {
        if let Some((_, late, early, ot)) = worked.get(&entry.date) {
            if *late {
                summary.late_days += 1;
            }
            if *early {
                summary.early_exit_days += 1;
            }
            overtime_minutes += ot;
        }

        match entry.status {
            DayStatus::Present => {
                summary.present_days += 1;
                if base_working {
                    credit += Decimal::ONE;
                }
            }
            DayStatus::HalfDayPresent => {
                summary.half_day_present += 1;
                if base_working {
                    credit += dec!(0.5);
                }
            }
            DayStatus::Absent => summary.absent_days += 1,
            DayStatus::Leave => {
                summary.leave_days += Decimal::ONE;
                if entry.paid_leave {
                    credit += Decimal::ONE;
                }
            }
            DayStatus::HalfDayLeave => {
                summary.leave_days += dec!(0.5);
                summary.half_day_leaves += 1;
                if entry.paid_leave {
                    credit += dec!(0.5);
                }
            }
            DayStatus::Holiday => summary.holiday_days += 1,
            DayStatus::WeekOff => summary.week_off_days += 1,
            DayStatus::SandwichAbsent => summary.sandwich_absent_days += 1,
        }
        if base_working {
            summary.working_days += 1;
        }
    }

    let working = Decimal::from(summary.working_days);
    summary.lop_days = working - credit;
    summary.overtime_hours = round2(Decimal::from(overtime_minutes) / dec!(60));

    let sandwich = Decimal::from(summary.sandwich_absent_days);
    summary.payable_days = (credit - sandwich).clamp(Decimal::ZERO, working);
    summary.day_wise = day_wise;
    summary
}

/// A weekend or holiday run with an absence on both sides becomes LOP.
/// Runs touching the month boundary are left alone; a leave on either side
/// does not trigger the rule.
fn reclassify_sandwich_runs(day_wise: &mut [DayEntry]) {
    let is_non_working =
        |entry: &DayEntry| matches!(entry.status, DayStatus::Holiday | DayStatus::WeekOff);

    let mut i = 0;
    while i < day_wise.len() {
        if !is_non_working(&day_wise[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < day_wise.len() && is_non_working(&day_wise[i]) {
            i += 1;
        }
        let end = i; // exclusive

        let absent_before =
            start > 0 && day_wise[start - 1].status == DayStatus::Absent;
        let absent_after = end < day_wise.len() && day_wise[end].status == DayStatus::Absent;

        if absent_before && absent_after {
            for entry in &mut day_wise[start..end] {
                entry.status = DayStatus::SandwichAbsent;
            }
        }
    }
}

/// Fetch shell: gathers the month's rows and policies, then runs
/// `build_month`.
pub async fn aggregate_month(
    pool: &MySqlPool,
    employee_id: u64,
    month: u32,
    year: i32,
) -> EngineResult<MonthlySummary> {
    let employee = super::employee_by_id(pool, employee_id).await?;
    let settings = settings_cache::settings_for(pool, employee.organization_id).await?;

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        crate::error::EngineError::internal(format!("invalid month {month}/{year}"))
    })?;
    let last = *enumerate_month(year, month)
        .last()
        .expect("month has at least one day");

    let holidays = super::holidays_between(pool, employee.organization_id, first, last).await?;
    let patterns: Vec<WeekOffPattern> = super::week_off_policies_for(pool, employee_id)
        .await?
        .into_iter()
        .map(|p| p.pattern.0)
        .collect();

    let leaves: Vec<(NaiveDate, NaiveDate, bool, bool)> = sqlx::query_as(
        r#"
        SELECT a.from_date, a.to_date, a.is_half_day, t.is_paid
        FROM leave_applications a
        INNER JOIN leave_types t ON t.id = a.leave_type_id
        WHERE a.employee_id = ? AND a.status IN ('pending', 'approved')
          AND a.from_date <= ? AND a.to_date >= ?
        "#,
    )
    .bind(employee_id)
    .bind(last)
    .bind(first)
    .fetch_all(pool)
    .await?;
    let leaves: Vec<LeaveSpan> = leaves
        .into_iter()
        .map(|(from, to, is_half_day, is_paid)| LeaveSpan {
            from: from.max(first),
            to: to.min(last),
            is_half_day,
            is_paid,
        })
        .collect();

    let sql = format!(
        "SELECT {} FROM attendance \
         WHERE employee_id = ? AND attendance_date BETWEEN ? AND ? \
         ORDER BY attendance_date, id",
        super::attendance::ATTENDANCE_COLUMNS
    );
    let attendance: Vec<Attendance> = sqlx::query_as::<_, Attendance>(&sql)
        .bind(employee_id)
        .bind(first)
        .bind(last)
        .fetch_all(pool)
        .await?;

    Ok(build_month(&MonthInputs {
        year,
        month,
        holidays: &holidays,
        patterns: &patterns,
        leaves: &leaves,
        attendance: &attendance,
        min_hours_for_half_day: settings.min_hours_for_half_day,
        sandwich_enabled: settings.sandwich_rule_enabled,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn present(date: &str, minutes: i64) -> Attendance {
        present_with(date, minutes, 0, 0)
    }

    fn present_with(date: &str, minutes: i64, late: i64, overtime: i64) -> Attendance {
        let date = d(date);
        Attendance {
            id: 0,
            employee_id: 1,
            organization_id: 1,
            attendance_date: date,
            check_in_time: Some(date.and_hms_opt(9, 0, 0).unwrap()),
            check_out_time: Some(date.and_hms_opt(18, 0, 0).unwrap()),
            shift_id: Some(1),
            late_minutes: late,
            early_exit_minutes: 0,
            overtime_minutes: overtime,
            total_working_minutes: minutes,
            status: AttendanceStatus::Present,
            remarks: None,
        }
    }

    fn weekend() -> Vec<WeekOffPattern> {
        vec![WeekOffPattern::Weekly {
            weekdays: vec!["sat".into(), "sun".into()],
        }]
    }

    /// Presence on every working day of March 2026 except the listed dates.
    fn full_attendance_except(skip: &[&str]) -> Vec<Attendance> {
        let skip: HashSet<NaiveDate> = skip.iter().map(|s| d(s)).collect();
        let patterns = weekend();
        enumerate_month(2026, 3)
            .into_iter()
            .filter(|date| !patterns.iter().any(|p| p.matches(*date)))
            .filter(|date| !skip.contains(date))
            .map(|date| present(&date.to_string(), 533))
            .collect()
    }

    fn inputs<'a>(
        leaves: &'a [LeaveSpan],
        attendance: &'a [Attendance],
        sandwich: bool,
    ) -> MonthInputs<'a> {
        MonthInputs {
            year: 2026,
            month: 3,
            holidays: &[],
            patterns: weekend_static(),
            leaves,
            attendance,
            min_hours_for_half_day: dec!(4),
            sandwich_enabled: sandwich,
        }
    }

    fn weekend_static() -> &'static [WeekOffPattern] {
        use std::sync::OnceLock;
        static PATTERNS: OnceLock<Vec<WeekOffPattern>> = OnceLock::new();
        PATTERNS.get_or_init(weekend)
    }

    #[test]
    fn full_month_of_presence_is_fully_payable() {
        let attendance = full_attendance_except(&[]);
        let summary = build_month(&inputs(&[], &attendance, false));

        // March 2026: 31 days, 4 Saturdays + 5 Sundays off.
        assert_eq!(summary.working_days, 22);
        assert_eq!(summary.present_days, 22);
        assert_eq!(summary.absent_days, 0);
        assert_eq!(summary.payable_days, dec!(22));
        assert_eq!(summary.lop_days, dec!(0));
    }

    #[test]
    fn sandwich_weekend_between_absences_counts_as_lop() {
        // Fri 2026-03-06 and Mon 2026-03-09 absent, Sat+Sun week-off.
        let attendance = full_attendance_except(&["2026-03-06", "2026-03-09"]);
        let summary = build_month(&inputs(&[], &attendance, true));

        assert_eq!(summary.sandwich_absent_days, 2);
        assert_eq!(summary.absent_days, 2);
        assert_eq!(summary.lop_days, dec!(2));
        // LOP for the window: Fri + Mon + 2 sandwich days = 4.
        assert_eq!(summary.payable_days, dec!(22) - dec!(4));

        let sat = summary
            .day_wise
            .iter()
            .find(|e| e.date == d("2026-03-07"))
            .unwrap();
        assert_eq!(sat.status, DayStatus::SandwichAbsent);
    }

    #[test]
    fn sandwich_disabled_keeps_weekend_as_week_off() {
        let attendance = full_attendance_except(&["2026-03-06", "2026-03-09"]);
        let summary = build_month(&inputs(&[], &attendance, false));

        assert_eq!(summary.sandwich_absent_days, 0);
        assert_eq!(summary.payable_days, dec!(20));
    }

    #[test]
    fn leave_on_one_side_does_not_trigger_sandwich() {
        let attendance = full_attendance_except(&["2026-03-06", "2026-03-09"]);
        let leaves = vec![LeaveSpan {
            from: d("2026-03-06"),
            to: d("2026-03-06"),
            is_half_day: false,
            is_paid: true,
        }];
        let summary = build_month(&inputs(&leaves, &attendance, true));

        assert_eq!(summary.sandwich_absent_days, 0);
        // Friday is paid leave, Monday absent.
        assert_eq!(summary.payable_days, dec!(21));
    }

    #[test]
    fn paid_leave_keeps_the_day_payable_and_unpaid_does_not() {
        let attendance = full_attendance_except(&["2026-03-10", "2026-03-11"]);
        let leaves = vec![
            LeaveSpan {
                from: d("2026-03-10"),
                to: d("2026-03-10"),
                is_half_day: false,
                is_paid: true,
            },
            LeaveSpan {
                from: d("2026-03-11"),
                to: d("2026-03-11"),
                is_half_day: false,
                is_paid: false,
            },
        ];
        let summary = build_month(&inputs(&leaves, &attendance, false));

        assert_eq!(summary.leave_days, dec!(2));
        assert_eq!(summary.lop_days, dec!(1)); // only the unpaid day
        assert_eq!(summary.payable_days, dec!(21));
    }

    #[test]
    fn half_day_leave_forfeits_half_a_day() {
        let attendance = full_attendance_except(&["2026-03-10"]);
        let leaves = vec![LeaveSpan {
            from: d("2026-03-10"),
            to: d("2026-03-10"),
            is_half_day: true,
            is_paid: true,
        }];
        let summary = build_month(&inputs(&leaves, &attendance, false));

        assert_eq!(summary.half_day_leaves, 1);
        assert_eq!(summary.payable_days, dec!(21.5));
    }

    #[test]
    fn short_presence_counts_as_half_day() {
        // 3 hours on the 10th, under the 4-hour half-day floor.
        let mut attendance = full_attendance_except(&["2026-03-10"]);
        attendance.push(present("2026-03-10", 180));
        let summary = build_month(&inputs(&[], &attendance, false));

        assert_eq!(summary.half_day_present, 1);
        assert_eq!(summary.payable_days, dec!(21.5));
        assert_eq!(summary.lop_days, dec!(0.5));
    }

    #[test]
    fn empty_month_clamps_payable_at_zero() {
        let summary = build_month(&inputs(&[], &[], true));
        assert_eq!(summary.present_days, 0);
        assert_eq!(summary.absent_days, 22);
        assert_eq!(summary.payable_days, dec!(0));
    }

    #[test]
    fn late_and_overtime_roll_into_the_summary() {
        let mut attendance = full_attendance_except(&["2026-03-10"]);
        attendance.push(present_with("2026-03-10", 600, 12, 60));
        let summary = build_month(&inputs(&[], &attendance, false));

        assert_eq!(summary.late_days, 1);
        assert_eq!(summary.overtime_hours, dec!(1.00));
        assert_eq!(summary.payable_days, dec!(22));
    }

    #[test]
    fn holiday_days_are_not_working_days() {
        let holidays = vec![Holiday {
            id: 1,
            organization_id: 1,
            name: "Holi".into(),
            date: d("2026-03-04"),
            is_paid: true,
        }];
        let attendance = full_attendance_except(&["2026-03-04"]);
        let summary = build_month(&MonthInputs {
            year: 2026,
            month: 3,
            holidays: &holidays,
            patterns: weekend_static(),
            leaves: &[],
            attendance: &attendance,
            min_hours_for_half_day: dec!(4),
            sandwich_enabled: false,
        });

        assert_eq!(summary.holiday_days, 1);
        assert_eq!(summary.working_days, 21);
        assert_eq!(summary.payable_days, dec!(21));
    }
}
