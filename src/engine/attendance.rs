use crate::error::{EngineError, EngineResult};
use crate::model::attendance::{Attendance, AttendanceStatus};
use crate::model::shift::Shift;
use crate::utils::time_math::{
    apply_grace, early_exit_minutes, overtime_minutes, shift_end_on, MIN_PUNCH_GAP_SECS,
};
use crate::utils::settings_cache;
use chrono::{Datelike, NaiveDateTime};
use sqlx::{MySqlConnection, MySqlPool};

pub(crate) const ATTENDANCE_COLUMNS: &str = "id, employee_id, organization_id, attendance_date, \
     check_in_time, check_out_time, shift_id, late_minutes, early_exit_minutes, \
     overtime_minutes, total_working_minutes, status, remarks";

/// Punches within this window of an existing transition are replays, not new
/// events.
const DUPLICATE_WINDOW_SECS: i64 = 1;

#[derive(Debug, Clone)]
pub enum PunchOutcome {
    CheckedIn(Attendance),
    CheckedOut(Attendance),
    /// Replayed punch; carries the row the original transition produced.
    Duplicate(Attendance),
}

/// Minute fields derived when a row closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseDerivation {
    pub total_working_minutes: i64,
    pub early_exit_minutes: i64,
    pub overtime_minutes: i64,
}

/// Pure close arithmetic, shared by the closing punch, the admin edit and the
/// auto-checkout jobs. `date` anchors overnight shift ends to the next day.
pub fn derive_close(
    check_in: NaiveDateTime,
    check_out: NaiveDateTime,
    date: chrono::NaiveDate,
    shift: Option<&Shift>,
) -> CloseDerivation {
    let total_working_minutes = (check_out - check_in).num_minutes().max(0);

    let (early, overtime) = match shift {
        Some(shift) => {
            let end = shift_end_on(date, shift);
            (
                early_exit_minutes(check_out, end),
                overtime_minutes(total_working_minutes, shift.duration_minutes),
            )
        }
        None => (0, 0),
    };

    CloseDerivation {
        total_working_minutes,
        early_exit_minutes: early,
        overtime_minutes: overtime,
    }
}

async fn latest_row_for_update(
    conn: &mut MySqlConnection,
    employee_id: u64,
    date: chrono::NaiveDate,
) -> EngineResult<Option<Attendance>> {
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
         WHERE employee_id = ? AND attendance_date = ? \
         ORDER BY id DESC LIMIT 1 FOR UPDATE"
    );
    Ok(sqlx::query_as::<_, Attendance>(&sql)
        .bind(employee_id)
        .bind(date)
        .fetch_optional(conn)
        .await?)
}

pub(crate) async fn shift_by_id(
    conn: &mut MySqlConnection,
    shift_id: u64,
) -> EngineResult<Option<Shift>> {
    Ok(sqlx::query_as::<_, Shift>(
        "SELECT id, organization_id, name, start_time, end_time, duration_minutes, \
         paid_break_minutes FROM shifts WHERE id = ?",
    )
    .bind(shift_id)
    .fetch_optional(conn)
    .await?)
}

async fn row_by_id(conn: &mut MySqlConnection, id: u64) -> EngineResult<Attendance> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
    sqlx::query_as::<_, Attendance>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "attendance",
            id,
        })
}

/// Write the closing half of a row and its derived minutes. The caller holds
/// the row lock.
pub(crate) async fn close_row(
    conn: &mut MySqlConnection,
    row: &Attendance,
    shift: Option<&Shift>,
    check_out: NaiveDateTime,
    remark: Option<&str>,
) -> EngineResult<Attendance> {
    let check_in = row
        .check_in_time
        .ok_or_else(|| EngineError::internal(format!("attendance {} has no check-in", row.id)))?;

    let derived = derive_close(check_in, check_out, row.attendance_date, shift);

    let remarks = match (row.remarks.as_deref(), remark) {
        (Some(old), Some(new)) => Some(format!("{old}; {new}")),
        (None, Some(new)) => Some(new.to_string()),
        (existing, None) => existing.map(str::to_string),
    };

    sqlx::query(
        r#"
        UPDATE attendance
        SET check_out_time = ?, total_working_minutes = ?, early_exit_minutes = ?,
            overtime_minutes = ?, remarks = ?
        WHERE id = ?
        "#,
    )
    .bind(check_out)
    .bind(derived.total_working_minutes)
    .bind(derived.early_exit_minutes)
    .bind(derived.overtime_minutes)
    .bind(&remarks)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;

    row_by_id(conn, row.id).await
}

/// A single punch: opens a row when none is open for the day, closes the open
/// one otherwise. One transaction; concurrent punches for the same employee
/// serialize on the row lock, so one lands as check-in and the other as
/// check-out.
pub async fn punch(pool: &MySqlPool, employee_id: u64, at: NaiveDateTime) -> EngineResult<PunchOutcome> {
    let employee = super::employee_by_id(pool, employee_id).await?;

    // Resolve outside the transaction; it reads caches, not locked rows.
    let resolved = super::resolver::resolve(pool, &employee, at).await?;

    let mut tx = pool.begin().await?;
    let latest = latest_row_for_update(&mut tx, employee_id, at.date()).await?;

    match latest {
        Some(row) if row.is_open() => {
            let check_in = row.check_in_time.expect("open row has check-in");
            let gap_secs = (at - check_in).num_seconds();

            if gap_secs.abs() <= DUPLICATE_WINDOW_SECS {
                tx.commit().await?;
                return Ok(PunchOutcome::Duplicate(row));
            }
            if gap_secs < MIN_PUNCH_GAP_SECS {
                return Err(EngineError::TooShortPunch(gap_secs));
            }

            let shift = match row.shift_id {
                Some(id) => shift_by_id(&mut tx, id).await?,
                None => None,
            };
            let closed = close_row(&mut tx, &row, shift.as_ref(), at, None).await?;
            tx.commit().await?;
            Ok(PunchOutcome::CheckedOut(closed))
        }
        Some(row) => {
            // Day already has a closed pair; a replay of either of its
            // transitions is a duplicate, anything else opens the next pair.
            let replayed = [row.check_in_time, row.check_out_time]
                .into_iter()
                .flatten()
                .any(|instant| (at - instant).num_seconds().abs() <= DUPLICATE_WINDOW_SECS);
            if replayed {
                tx.commit().await?;
                return Ok(PunchOutcome::Duplicate(row));
            }
            let opened = open_row(&mut tx, &employee, at, &resolved).await?;
            tx.commit().await?;
            Ok(PunchOutcome::CheckedIn(opened))
        }
        None => {
            let opened = open_row(&mut tx, &employee, at, &resolved).await?;
            tx.commit().await?;
            Ok(PunchOutcome::CheckedIn(opened))
        }
    }
}

async fn open_row(
    conn: &mut MySqlConnection,
    employee: &crate::model::employee::Employee,
    at: NaiveDateTime,
    resolved: &super::resolver::Resolved,
) -> EngineResult<Attendance> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance
            (employee_id, organization_id, attendance_date, check_in_time, shift_id,
             late_minutes, early_exit_minutes, overtime_minutes, total_working_minutes, status)
        VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?)
        "#,
    )
    .bind(employee.id)
    .bind(employee.organization_id)
    .bind(at.date())
    .bind(at)
    .bind(resolved.shift.as_ref().map(|s| s.id))
    .bind(resolved.late_minutes)
    .bind(AttendanceStatus::Present)
    .execute(&mut *conn)
    .await?;

    row_by_id(conn, result.last_insert_id()).await
}

/// Administrator edit of either punch instant. Re-derives every minute field.
/// Refused once the row's month has a finalized payroll record.
pub async fn edit(
    pool: &MySqlPool,
    attendance_id: u64,
    new_check_in: Option<NaiveDateTime>,
    new_check_out: Option<NaiveDateTime>,
) -> EngineResult<Attendance> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ? FOR UPDATE"
    );
    let row: Attendance = sqlx::query_as::<_, Attendance>(&sql)
        .bind(attendance_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "attendance",
            id: attendance_id,
        })?;

    let month = row.attendance_date.month();
    let year = row.attendance_date.year();
    let frozen: Option<(u64,)> = sqlx::query_as(
        "SELECT id FROM payroll_records \
         WHERE employee_id = ? AND month = ? AND year = ? AND finalized_at IS NOT NULL",
    )
    .bind(row.employee_id)
    .bind(month)
    .bind(year)
    .fetch_optional(&mut *tx)
    .await?;
    if frozen.is_some() {
        return Err(EngineError::PayrollFrozen {
            attendance_id,
            month,
            year,
        });
    }

    let check_in = new_check_in.or(row.check_in_time);
    let check_out = new_check_out.or(row.check_out_time);

    let shift = match row.shift_id {
        Some(id) => shift_by_id(&mut tx, id).await?,
        None => None,
    };

    let settings = settings_cache::settings_for(pool, row.organization_id).await?;

    let late_minutes = match (check_in, shift.as_ref()) {
        (Some(check_in), Some(shift)) => {
            let start = row.attendance_date.and_time(shift.start_time);
            apply_grace(
                (check_in - start).num_minutes().max(0),
                settings.late_grace_minutes,
            )
        }
        _ => row.late_minutes,
    };

    let derived = match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => {
            let gap_secs = (check_out - check_in).num_seconds();
            if gap_secs < MIN_PUNCH_GAP_SECS {
                return Err(EngineError::TooShortPunch(gap_secs));
            }
            derive_close(check_in, check_out, row.attendance_date, shift.as_ref())
        }
        _ => CloseDerivation {
            total_working_minutes: 0,
            early_exit_minutes: 0,
            overtime_minutes: 0,
        },
    };

    sqlx::query(
        r#"
        UPDATE attendance
        SET check_in_time = ?, check_out_time = ?, late_minutes = ?,
            total_working_minutes = ?, early_exit_minutes = ?, overtime_minutes = ?
        WHERE id = ?
        "#,
    )
    .bind(check_in)
    .bind(check_out)
    .bind(late_minutes)
    .bind(derived.total_working_minutes)
    .bind(derived.early_exit_minutes)
    .bind(derived.overtime_minutes)
    .bind(attendance_id)
    .execute(&mut *tx)
    .await?;

    let updated = row_by_id(&mut tx, attendance_id).await?;
    tx.commit().await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn shift(start: &str, end: &str, duration: i64) -> Shift {
        Shift {
            id: 1,
            organization_id: 1,
            name: "day".into(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            duration_minutes: duration,
            paid_break_minutes: 60,
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn late_check_in_normal_close() {
        // Shift 09:00-18:00, punches at 09:12 and 18:05.
        let day = shift("09:00", "18:00", 540);
        let derived = derive_close(
            dt("2026-03-02 09:12:00"),
            dt("2026-03-02 18:05:00"),
            d("2026-03-02"),
            Some(&day),
        );
        assert_eq!(derived.total_working_minutes, 533);
        assert_eq!(derived.early_exit_minutes, 0);
        assert_eq!(derived.overtime_minutes, 0);
    }

    #[test]
    fn early_exit_is_measured_against_shift_end() {
        let day = shift("09:00", "18:00", 540);
        let derived = derive_close(
            dt("2026-03-02 09:00:00"),
            dt("2026-03-02 17:15:00"),
            d("2026-03-02"),
            Some(&day),
        );
        assert_eq!(derived.early_exit_minutes, 45);
        assert_eq!(derived.overtime_minutes, 0);
    }

    #[test]
    fn overtime_past_scheduled_duration() {
        let day = shift("09:00", "18:00", 540);
        let derived = derive_close(
            dt("2026-03-02 09:00:00"),
            dt("2026-03-02 19:30:00"),
            d("2026-03-02"),
            Some(&day),
        );
        assert_eq!(derived.total_working_minutes, 630);
        assert_eq!(derived.overtime_minutes, 90);
        assert_eq!(derived.early_exit_minutes, 0);
    }

    #[test]
    fn night_shift_close_spans_midnight() {
        // Check-in Monday 22:05, auto-closed at shift end Tuesday 06:00.
        let night = shift("22:00", "06:00", 480);
        let derived = derive_close(
            dt("2026-03-02 22:05:00"),
            dt("2026-03-03 06:00:00"),
            d("2026-03-02"),
            Some(&night),
        );
        assert_eq!(derived.total_working_minutes, 475);
        assert_eq!(derived.early_exit_minutes, 0);
        assert_eq!(derived.overtime_minutes, 0);
    }

    #[test]
    fn close_without_shift_only_totals() {
        let derived = derive_close(
            dt("2026-03-02 10:00:00"),
            dt("2026-03-02 16:00:00"),
            d("2026-03-02"),
            None,
        );
        assert_eq!(derived.total_working_minutes, 360);
        assert_eq!(derived.early_exit_minutes, 0);
        assert_eq!(derived.overtime_minutes, 0);
    }
}
