use crate::error::{EngineError, EngineResult};
use crate::model::holiday::WeekOffPattern;
use crate::model::leave::{
    AccrualFrequency, EmployeeLeaveBalance, LeaveApplication, LeaveStatus, LeaveType,
};
use crate::utils::money::{percent_of, round2};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::{MySqlConnection, MySqlPool};
use std::collections::HashSet;

const BALANCE_COLUMNS: &str = "id, employee_id, leave_type_id, year, assigned, used, pending, \
     carried_forward, accrued, last_accrued_at, carry_forward_expiry_date, is_active";

const APPLICATION_COLUMNS: &str = "id, employee_id, leave_type_id, from_date, to_date, \
     is_half_day, total_days, status, reason, applied_at, reviewed_by, reviewed_at, \
     reviewer_comments";

pub(crate) const LEAVE_TYPE_COLUMNS: &str = "id, admin_id, code, name, default_count, is_paid, \
     is_accrual_enabled, accrual_rate, accrual_frequency, is_carry_forward_enabled, \
     carry_forward_cap, carry_forward_validity_months, is_encashment_enabled, encashment_cap, \
     encashment_percentage, min_advance_days, max_consecutive_days, include_weekends, \
     include_holidays, is_active";

#[derive(Debug, Clone)]
pub struct ApplyLeaveRequest {
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub is_half_day: bool,
    pub reason: Option<String>,
    /// Organization-local now; advance-days checks measure from this.
    pub applied_at: NaiveDateTime,
}

/// Days an application consumes, net of weekends and holidays the leave type
/// excludes. A half-day application consumes half a day.
pub fn count_leave_days(
    from: NaiveDate,
    to: NaiveDate,
    is_half_day: bool,
    leave_type: &LeaveType,
    week_off_patterns: &[WeekOffPattern],
    holidays: &HashSet<NaiveDate>,
) -> Decimal {
    if is_half_day {
        return dec!(0.5);
    }

    let mut days = Decimal::ZERO;
    let mut date = from;
    while date <= to {
        let week_off = week_off_patterns.iter().any(|p| p.matches(date));
        let holiday = holidays.contains(&date);

        let counted = (!week_off || leave_type.include_weekends)
            && (!holiday || leave_type.include_holidays);
        if counted {
            days += Decimal::ONE;
        }
        date += Duration::days(1);
    }
    days
}

/// Accrual period key, unique per tick: `2026-08`, `2026-Q3`, `2026`.
pub fn period_key(frequency: AccrualFrequency, on: NaiveDate) -> String {
    match frequency {
        AccrualFrequency::Monthly => format!("{}-{:02}", on.year(), on.month()),
        AccrualFrequency::Quarterly => format!("{}-Q{}", on.year(), (on.month() - 1) / 3 + 1),
        AccrualFrequency::Yearly => on.year().to_string(),
    }
}

/// Period keys of the year that have started on or before `today`.
pub fn periods_up_to(frequency: AccrualFrequency, today: NaiveDate) -> Vec<String> {
    match frequency {
        AccrualFrequency::Monthly => (1..=today.month())
            .map(|m| format!("{}-{:02}", today.year(), m))
            .collect(),
        AccrualFrequency::Quarterly => (1..=(today.month() - 1) / 3 + 1)
            .map(|q| format!("{}-Q{}", today.year(), q))
            .collect(),
        AccrualFrequency::Yearly => vec![today.year().to_string()],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncashmentQuote {
    pub encashable_days: Decimal,
    pub amount: Decimal,
}

/// Quote the payout for encashing `days` at `daily_rate`, bounded by the
/// type's cap and the current balance.
pub fn encashment_quote(
    leave_type: &LeaveType,
    balance: Decimal,
    days: Decimal,
    daily_rate: Decimal,
) -> EngineResult<EncashmentQuote> {
    if !leave_type.is_encashment_enabled {
        return Err(EngineError::Policy(format!(
            "leave type {} is not encashable",
            leave_type.code
        )));
    }
    let encashable_days = days.min(leave_type.encashment_cap).min(balance).max(Decimal::ZERO);
    let amount = round2(percent_of(
        daily_rate * encashable_days,
        leave_type.encashment_percentage,
    ));
    Ok(EncashmentQuote {
        encashable_days,
        amount,
    })
}

pub(crate) async fn leave_type_by_id(
    pool: &MySqlPool,
    leave_type_id: u64,
) -> EngineResult<LeaveType> {
    let sql = format!("SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE id = ? AND is_active = 1");
    sqlx::query_as::<_, LeaveType>(&sql)
        .bind(leave_type_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "leave type",
            id: leave_type_id,
        })
}

async fn balance_for_update(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
) -> EngineResult<Option<EmployeeLeaveBalance>> {
    let sql = format!(
        "SELECT {BALANCE_COLUMNS} FROM employee_leave_balances \
         WHERE employee_id = ? AND leave_type_id = ? AND year = ? AND is_active = 1 \
         FOR UPDATE"
    );
    Ok(sqlx::query_as::<_, EmployeeLeaveBalance>(&sql)
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(year)
        .fetch_optional(conn)
        .await?)
}

/// Create the (employee, type, year) balance row. At most one active row may
/// exist; a second assignment is a conflict.
pub async fn assign(
    pool: &MySqlPool,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
    requested: Option<Decimal>,
) -> EngineResult<EmployeeLeaveBalance> {
    super::employee_by_id(pool, employee_id).await?;
    let leave_type = leave_type_by_id(pool, leave_type_id).await?;

    let assigned = match requested {
        Some(requested) => requested.min(leave_type.default_count),
        None => leave_type.default_count,
    };

    let mut tx = pool.begin().await?;
    if balance_for_update(&mut tx, employee_id, leave_type_id, year)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "leave balance already assigned for employee {employee_id}, type {}, year {year}",
            leave_type.code
        )));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO employee_leave_balances
            (employee_id, leave_type_id, year, assigned, used, pending,
             carried_forward, accrued, is_active)
        VALUES (?, ?, ?, ?, 0, 0, 0, 0, 1)
        "#,
    )
    .bind(employee_id)
    .bind(leave_type_id)
    .bind(year)
    .bind(assigned)
    .execute(&mut *tx)
    .await?;

    let id = result.last_insert_id();
    let sql = format!("SELECT {BALANCE_COLUMNS} FROM employee_leave_balances WHERE id = ?");
    let row = sqlx::query_as::<_, EmployeeLeaveBalance>(&sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(row)
}

async fn acquire_apply_lock(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
) -> EngineResult<()> {
    // Advisory lock serializes application creation per (employee, type,
    // year) so the overlap check and the balance sync stay consistent.
    let key = format!("leave_apply:{employee_id}:{leave_type_id}:{year}");
    let (locked,): (Option<i64>,) = sqlx::query_as("SELECT GET_LOCK(?, 5)")
        .bind(&key)
        .fetch_one(conn)
        .await?;
    if locked != Some(1) {
        return Err(EngineError::internal(format!(
            "timed out acquiring leave lock {key}"
        )));
    }
    Ok(())
}

async fn release_apply_lock(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
) -> EngineResult<()> {
    let key = format!("leave_apply:{employee_id}:{leave_type_id}:{year}");
    sqlx::query("DO RELEASE_LOCK(?)")
        .bind(&key)
        .execute(conn)
        .await?;
    Ok(())
}

/// File a leave application. Validates overlap, advance-days, consecutive-days
/// and balance before persisting as `pending`.
pub async fn apply(pool: &MySqlPool, req: ApplyLeaveRequest) -> EngineResult<LeaveApplication> {
    if req.from_date > req.to_date {
        return Err(EngineError::Policy("from_date is after to_date".into()));
    }
    if req.is_half_day && req.from_date != req.to_date {
        return Err(EngineError::Policy(
            "a half-day application must cover a single date".into(),
        ));
    }

    let employee = super::employee_by_id(pool, req.employee_id).await?;
    let leave_type = leave_type_by_id(pool, req.leave_type_id).await?;
    let year = req.from_date.year();

    let patterns: Vec<WeekOffPattern> = super::week_off_policies_for(pool, req.employee_id)
        .await?
        .into_iter()
        .map(|p| p.pattern.0)
        .collect();
    let holidays: HashSet<NaiveDate> = super::holidays_between(
        pool,
        employee.organization_id,
        req.from_date,
        req.to_date,
    )
    .await?
    .into_iter()
    .map(|h| h.date)
    .collect();

    let total_days = count_leave_days(
        req.from_date,
        req.to_date,
        req.is_half_day,
        &leave_type,
        &patterns,
        &holidays,
    );
    if total_days <= Decimal::ZERO {
        return Err(EngineError::Policy(
            "the requested range contains no countable leave day".into(),
        ));
    }

    if leave_type.min_advance_days > 0 {
        let notice = (req.from_date - req.applied_at.date()).num_days();
        if notice < leave_type.min_advance_days as i64 {
            return Err(EngineError::Policy(format!(
                "{} requires {} days notice, got {notice}",
                leave_type.code, leave_type.min_advance_days
            )));
        }
    }
    if leave_type.max_consecutive_days > 0
        && total_days > Decimal::from(leave_type.max_consecutive_days)
    {
        return Err(EngineError::Policy(format!(
            "{} allows at most {} consecutive days",
            leave_type.code, leave_type.max_consecutive_days
        )));
    }

    let mut tx = pool.begin().await?;
    acquire_apply_lock(&mut tx, req.employee_id, req.leave_type_id, year).await?;

    let overlap_result = check_overlap_and_insert(&mut tx, &req, total_days, year).await;
    // The advisory lock is connection-scoped; release before surfacing any
    // error so a failed apply never parks the key.
    release_apply_lock(&mut tx, req.employee_id, req.leave_type_id, year).await?;
    let application = overlap_result?;

    tx.commit().await?;
    Ok(application)
}

async fn check_overlap_and_insert(
    conn: &mut MySqlConnection,
    req: &ApplyLeaveRequest,
    total_days: Decimal,
    year: i32,
) -> EngineResult<LeaveApplication> {
    let (overlapping,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM leave_applications
        WHERE employee_id = ? AND status <> 'cancelled'
          AND from_date <= ? AND to_date >= ?
        "#,
    )
    .bind(req.employee_id)
    .bind(req.to_date)
    .bind(req.from_date)
    .fetch_one(&mut *conn)
    .await?;
    if overlapping > 0 {
        return Err(EngineError::Conflict(format!(
            "an existing application overlaps {}..{}",
            req.from_date, req.to_date
        )));
    }

    let balance = balance_for_update(conn, req.employee_id, req.leave_type_id, year)
        .await?
        .ok_or_else(|| {
            EngineError::Policy(format!(
                "no leave balance assigned for employee {} in {year}",
                req.employee_id
            ))
        })?;
    if balance.balance() < total_days {
        return Err(EngineError::Policy(format!(
            "insufficient balance: {} available, {total_days} requested",
            balance.balance()
        )));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_applications
            (employee_id, leave_type_id, from_date, to_date, is_half_day,
             total_days, status, reason, applied_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(req.employee_id)
    .bind(req.leave_type_id)
    .bind(req.from_date)
    .bind(req.to_date)
    .bind(req.is_half_day)
    .bind(total_days)
    .bind(&req.reason)
    .bind(req.applied_at)
    .execute(&mut *conn)
    .await?;

    sync_on(conn, req.employee_id, req.leave_type_id, year).await?;

    let sql = format!("SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ?");
    Ok(sqlx::query_as::<_, LeaveApplication>(&sql)
        .bind(result.last_insert_id())
        .fetch_one(conn)
        .await?)
}

/// Review an application. Only `pending` rows move; entering or leaving the
/// balance-consuming statuses re-syncs the balance row.
pub async fn transition(
    pool: &MySqlPool,
    application_id: u64,
    new_status: LeaveStatus,
    reviewed_by: u64,
    comments: Option<String>,
    at: NaiveDateTime,
) -> EngineResult<LeaveApplication> {
    if new_status == LeaveStatus::Pending {
        return Err(EngineError::Policy(
            "an application cannot transition back to pending".into(),
        ));
    }

    let mut tx = pool.begin().await?;
    let sql = format!(
        "SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ? FOR UPDATE"
    );
    let application: LeaveApplication = sqlx::query_as::<_, LeaveApplication>(&sql)
        .bind(application_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "leave application",
            id: application_id,
        })?;

    if application.status != LeaveStatus::Pending {
        return Err(EngineError::Conflict(format!(
            "application {application_id} is already {}",
            application.status
        )));
    }

    sqlx::query(
        r#"
        UPDATE leave_applications
        SET status = ?, reviewed_by = ?, reviewed_at = ?, reviewer_comments = ?
        WHERE id = ?
        "#,
    )
    .bind(new_status)
    .bind(reviewed_by)
    .bind(at)
    .bind(&comments)
    .bind(application_id)
    .execute(&mut *tx)
    .await?;

    // pending -> anything crosses the balance-consuming boundary.
    sync_on(
        &mut tx,
        application.employee_id,
        application.leave_type_id,
        application.from_date.year(),
    )
    .await?;

    let sql = format!("SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ?");
    let updated = sqlx::query_as::<_, LeaveApplication>(&sql)
        .bind(application_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(updated)
}

/// Authoritative balance re-aggregation: `used` is the sum of total_days over
/// pending + approved applications of the year, `pending` over pending only.
/// Replaces any incrementally-maintained counter and fixes drift.
pub async fn sync(
    pool: &MySqlPool,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
) -> EngineResult<()> {
    let mut tx = pool.begin().await?;
    sync_on(&mut tx, employee_id, leave_type_id, year).await?;
    tx.commit().await?;
    Ok(())
}

async fn sync_on(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
) -> EngineResult<()> {
    let (used,): (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_days), 0) FROM leave_applications
        WHERE employee_id = ? AND leave_type_id = ?
          AND status IN ('pending', 'approved') AND YEAR(from_date) = ?
        "#,
    )
    .bind(employee_id)
    .bind(leave_type_id)
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    let (pending,): (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_days), 0) FROM leave_applications
        WHERE employee_id = ? AND leave_type_id = ?
          AND status = 'pending' AND YEAR(from_date) = ?
        "#,
    )
    .bind(employee_id)
    .bind(leave_type_id)
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE employee_leave_balances
        SET used = ?, pending = ?
        WHERE employee_id = ? AND leave_type_id = ? AND year = ? AND is_active = 1
        "#,
    )
    .bind(used)
    .bind(pending)
    .bind(employee_id)
    .bind(leave_type_id)
    .bind(year)
    .execute(conn)
    .await?;
    Ok(())
}

/// One accrual tick. Idempotent per period: the accrual log carries a unique
/// (employee, type, period) key, and a duplicate insert turns the tick into a
/// no-op. Returns whether anything was accrued.
pub async fn accrue(
    pool: &MySqlPool,
    employee_id: u64,
    leave_type: &LeaveType,
    period: &str,
    today: NaiveDate,
) -> EngineResult<bool> {
    if !leave_type.is_accrual_enabled || leave_type.accrual_rate <= Decimal::ZERO {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO leave_accrual_log (employee_id, leave_type_id, period_key, amount, accrued_on)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(leave_type.id)
    .bind(period)
    .bind(leave_type.accrual_rate)
    .bind(today)
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
            // Period already accrued.
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    let updated = sqlx::query(
        r#"
        UPDATE employee_leave_balances
        SET accrued = accrued + ?, assigned = assigned + ?, last_accrued_at = ?
        WHERE employee_id = ? AND leave_type_id = ? AND year = ? AND is_active = 1
        "#,
    )
    .bind(leave_type.accrual_rate)
    .bind(leave_type.accrual_rate)
    .bind(today)
    .bind(employee_id)
    .bind(leave_type.id)
    .bind(today.year())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        // First accrual for an employee never assigned this year: open the
        // year's row with the accrued amount.
        sqlx::query(
            r#"
            INSERT INTO employee_leave_balances
                (employee_id, leave_type_id, year, assigned, used, pending,
                 carried_forward, accrued, last_accrued_at, is_active)
            VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?, 1)
            "#,
        )
        .bind(employee_id)
        .bind(leave_type.id)
        .bind(today.year())
        .bind(leave_type.accrual_rate)
        .bind(leave_type.accrual_rate)
        .bind(today)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Year-rollover migration of the closing balance, bounded by the type's cap.
/// Safe to re-run: a year whose next-year row already carries a forward
/// amount is skipped. Returns the carried amount.
pub async fn carry_forward(
    pool: &MySqlPool,
    employee_id: u64,
    leave_type: &LeaveType,
    from_year: i32,
) -> EngineResult<Decimal> {
    if !leave_type.is_carry_forward_enabled {
        return Ok(Decimal::ZERO);
    }
    let to_year = from_year + 1;

    let mut tx = pool.begin().await?;
    let closing = balance_for_update(&mut tx, employee_id, leave_type.id, from_year)
        .await?
        .map(|b| b.balance())
        .unwrap_or(Decimal::ZERO);
    let carried = closing.min(leave_type.carry_forward_cap).max(Decimal::ZERO);
    if carried <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }

    let expiry = NaiveDate::from_ymd_opt(to_year, 1, 1).expect("valid date")
        + Duration::days(30 * leave_type.carry_forward_validity_months as i64);

    match balance_for_update(&mut tx, employee_id, leave_type.id, to_year).await? {
        Some(next) if next.carried_forward > Decimal::ZERO => {
            // Rollover already ran for this pair of years.
            return Ok(next.carried_forward);
        }
        Some(_) => {
            sqlx::query(
                r#"
                UPDATE employee_leave_balances
                SET carried_forward = ?, assigned = assigned + ?, carry_forward_expiry_date = ?
                WHERE employee_id = ? AND leave_type_id = ? AND year = ? AND is_active = 1
                "#,
            )
            .bind(carried)
            .bind(carried)
            .bind(expiry)
            .bind(employee_id)
            .bind(leave_type.id)
            .bind(to_year)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO employee_leave_balances
                    (employee_id, leave_type_id, year, assigned, used, pending,
                     carried_forward, accrued, carry_forward_expiry_date, is_active)
                VALUES (?, ?, ?, ?, 0, 0, ?, 0, ?, 1)
                "#,
            )
            .bind(employee_id)
            .bind(leave_type.id)
            .bind(to_year)
            .bind(leave_type.default_count + carried)
            .bind(carried)
            .bind(expiry)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(carried)
}
