use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    Holiday,
    WeekOff,
    HalfDay,
}

/// One check-in/out pair for an employee on a date. `check_out_time` stays
/// NULL while the shift is open; the closing punch or the auto-checkout job
/// fills it and derives the minute fields.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: u64,
    pub employee_id: u64,
    pub organization_id: u64,
    pub attendance_date: NaiveDate,
    pub check_in_time: Option<NaiveDateTime>,
    pub check_out_time: Option<NaiveDateTime>,
    pub shift_id: Option<u64>,
    pub late_minutes: i64,
    pub early_exit_minutes: i64,
    pub overtime_minutes: i64,
    pub total_working_minutes: i64,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

impl Attendance {
    pub fn is_open(&self) -> bool {
        self.check_in_time.is_some() && self.check_out_time.is_none()
    }
}
