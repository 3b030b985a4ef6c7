use crate::config::Config;
use crate::engine::attendance::{self, ATTENDANCE_COLUMNS};
use crate::engine::{depreciation, leave, payroll};
use crate::error::EngineResult;
use crate::model::asset::Asset;
use crate::model::attendance::Attendance;
use crate::model::leave::LeaveType;
use crate::model::payroll::AutoCheckoutMode;
use crate::model::shift::Shift;
use crate::utils::settings_cache;
use crate::utils::time_math::shift_end_on;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::StreamExt;
use sqlx::MySqlPool;

type JobOutcome = EngineResult<(u64, Vec<String>)>;

/// Instant at which the shift-wise closer fires for a row: shift end on the
/// row's own date plus grace. The close itself backdates to the shift end.
pub(crate) fn shiftwise_trigger(date: NaiveDate, shift: &Shift, grace_minutes: i64) -> NaiveDateTime {
    shift_end_on(date, shift) + Duration::minutes(grace_minutes)
}

/// The month before the one containing `date`, as (year, month).
pub(crate) fn previous_period(date: NaiveDate) -> (i32, u32) {
    if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    }
}

/// Close one still-open row, re-deriving its minute fields. Returns false
/// when the row was already closed (a re-run within the same tick) or the
/// close instant would precede the check-in.
async fn close_item(
    pool: &MySqlPool,
    row_id: u64,
    check_out: NaiveDateTime,
    remark: &str,
) -> EngineResult<bool> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
         WHERE id = ? AND check_out_time IS NULL FOR UPDATE"
    );
    let row: Option<Attendance> = sqlx::query_as::<_, Attendance>(&sql)
        .bind(row_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Ok(false);
    };
    let Some(check_in) = row.check_in_time else {
        return Ok(false);
    };
    if check_out <= check_in {
        return Ok(false);
    }

    let shift = match row.shift_id {
        Some(id) => attendance::shift_by_id(&mut tx, id).await?,
        None => None,
    };
    attendance::close_row(&mut tx, &row, shift.as_ref(), check_out, Some(remark)).await?;
    tx.commit().await?;
    Ok(true)
}

/// Fixed-time closer: for every organization on the general policy whose
/// cutoff has passed, close today's open rows at the cutoff.
pub(super) async fn general_auto_checkout(pool: &MySqlPool, now: NaiveDateTime) -> JobOutcome {
    let mut processed = 0u64;
    let mut errors = Vec::new();

    let orgs: Vec<(u64, NaiveTime)> = sqlx::query_as(
        "SELECT organization_id, general_checkout_time FROM payroll_settings \
         WHERE auto_checkout_mode = 'general'",
    )
    .fetch_all(pool)
    .await?;

    for (organization_id, cutoff) in orgs {
        if now.time() < cutoff {
            continue;
        }
        let check_out = now.date().and_time(cutoff);

        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE organization_id = ? AND attendance_date = ? \
               AND check_in_time IS NOT NULL AND check_out_time IS NULL"
        );
        let rows: Vec<Attendance> = sqlx::query_as::<_, Attendance>(&sql)
            .bind(organization_id)
            .bind(now.date())
            .fetch_all(pool)
            .await?;

        for row in rows {
            match close_item(pool, row.id, check_out, "auto checkout (general)").await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => errors.push(format!("attendance {}: {e}", row.id)),
            }
        }
    }

    Ok((processed, errors))
}

/// Per-shift closer: candidate rows are today's and yesterday's, so a night
/// shift that rolled past midnight is still absorbed. Once grace has passed
/// the row closes at the shift end itself, not at the grace mark.
pub(super) async fn shiftwise_auto_checkout(
    pool: &MySqlPool,
    config: &Config,
    now: NaiveDateTime,
) -> JobOutcome {
    let mut processed = 0u64;
    let mut errors = Vec::new();

    let today = now.date();
    let yesterday = today - Duration::days(1);

    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
         WHERE attendance_date IN (?, ?) AND shift_id IS NOT NULL \
           AND check_in_time IS NOT NULL AND check_out_time IS NULL"
    );
    let rows: Vec<Attendance> = sqlx::query_as::<_, Attendance>(&sql)
        .bind(yesterday)
        .bind(today)
        .fetch_all(pool)
        .await?;

    for row in rows {
        let outcome: EngineResult<bool> = async {
            let settings = settings_cache::settings_for(pool, row.organization_id).await?;
            // An organization on the fixed-time policy is the general
            // closer's business; `off` disables auto-close entirely.
            match settings.auto_checkout_mode {
                AutoCheckoutMode::Shiftwise => {}
                AutoCheckoutMode::General | AutoCheckoutMode::Off => return Ok(false),
            }
            let grace = if settings.is_default() {
                config.shiftwise_grace_minutes
            } else {
                settings.shiftwise_grace_minutes
            };

            let Some(shift_id) = row.shift_id else {
                return Ok(false);
            };
            let shift: Option<Shift> = sqlx::query_as(
                "SELECT id, organization_id, name, start_time, end_time, duration_minutes, \
                 paid_break_minutes FROM shifts WHERE id = ?",
            )
            .bind(shift_id)
            .fetch_optional(pool)
            .await?;
            let Some(shift) = shift else {
                return Ok(false);
            };

            if now < shiftwise_trigger(row.attendance_date, &shift, grace) {
                return Ok(false);
            }
            let check_out = shift_end_on(row.attendance_date, &shift);
            close_item(pool, row.id, check_out, "auto checkout (shift-wise)").await
        }
        .await;

        match outcome {
            Ok(true) => processed += 1,
            Ok(false) => {}
            Err(e) => errors.push(format!("attendance {}: {e}", row.id)),
        }
    }

    Ok((processed, errors))
}

/// Nightly accrual walk: every accrual-enabled leave type, every employee
/// holding a balance this year, every period that has started. The accrual
/// log makes each (employee, type, period) tick a one-shot.
pub(super) async fn leave_accrual(pool: &MySqlPool, now: NaiveDateTime) -> JobOutcome {
    let mut processed = 0u64;
    let mut errors = Vec::new();
    let today = now.date();

    let sql = format!(
        "SELECT {} FROM leave_types WHERE is_accrual_enabled = 1 AND is_active = 1",
        leave::LEAVE_TYPE_COLUMNS
    );
    let types: Vec<LeaveType> = sqlx::query_as::<_, LeaveType>(&sql).fetch_all(pool).await?;

    for leave_type in &types {
        let mut stream = sqlx::query_as::<_, (u64,)>(
            "SELECT employee_id FROM employee_leave_balances \
             WHERE leave_type_id = ? AND year = ? AND is_active = 1",
        )
        .bind(leave_type.id)
        .bind(today.year())
        .fetch(pool);

        while let Some(row) = stream.next().await {
            let (employee_id,) = match row {
                Ok(row) => row,
                Err(e) => {
                    errors.push(format!("type {}: {e}", leave_type.code));
                    continue;
                }
            };
            for period in leave::periods_up_to(leave_type.accrual_frequency, today) {
                match leave::accrue(pool, employee_id, leave_type, &period, today).await {
                    Ok(true) => processed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        errors.push(format!("employee {employee_id} period {period}: {e}"))
                    }
                }
            }
        }
    }

    Ok((processed, errors))
}

/// On each organization's payroll day, generate the previous month for every
/// active employee without a finalized record. One employee failing never
/// stops the batch.
pub(super) async fn monthly_payroll(
    pool: &MySqlPool,
    config: &Config,
    now: NaiveDateTime,
) -> JobOutcome {
    let mut processed = 0u64;
    let mut errors = Vec::new();

    let orgs: Vec<(u64,)> =
        sqlx::query_as("SELECT DISTINCT organization_id FROM employees WHERE status = 'active'")
            .fetch_all(pool)
            .await?;

    for (organization_id,) in orgs {
        let settings = match settings_cache::settings_for(pool, organization_id).await {
            Ok(settings) => settings,
            Err(e) => {
                errors.push(format!("organization {organization_id}: {e}"));
                continue;
            }
        };
        let payroll_day = if settings.is_default() {
            config.payroll_day_of_month
        } else {
            settings.payroll_day_of_month
        };
        if now.day() != payroll_day {
            continue;
        }

        let (year, month) = previous_period(now.date());

        let employees: Vec<(u64,)> = sqlx::query_as(
            "SELECT id FROM employees WHERE organization_id = ? AND status = 'active'",
        )
        .bind(organization_id)
        .fetch_all(pool)
        .await?;

        for (employee_id,) in employees {
            let finalized: Option<(u64,)> = match sqlx::query_as(
                "SELECT id FROM payroll_records \
                 WHERE employee_id = ? AND month = ? AND year = ? AND finalized_at IS NOT NULL",
            )
            .bind(employee_id)
            .bind(month)
            .bind(year)
            .fetch_optional(pool)
            .await
            {
                Ok(row) => row,
                Err(e) => {
                    errors.push(format!("employee {employee_id}: {e}"));
                    continue;
                }
            };
            if finalized.is_some() {
                continue;
            }

            match payroll::generate(pool, employee_id, month, year, now).await {
                Ok(_) => processed += 1,
                Err(e) => errors.push(format!("employee {employee_id}: {e}")),
            }
        }
    }

    Ok((processed, errors))
}

/// Book every complete, unrecorded month for every active asset.
pub(super) async fn asset_depreciation(pool: &MySqlPool, now: NaiveDateTime) -> JobOutcome {
    let mut processed = 0u64;
    let mut errors = Vec::new();

    let assets: Vec<Asset> = sqlx::query_as(
        "SELECT id, organization_id, name, purchase_price, purchase_date, depreciation_method, \
         depreciation_rate, salvage_value, useful_life_months, status \
         FROM assets WHERE status = 'active'",
    )
    .fetch_all(pool)
    .await?;

    for asset in &assets {
        match depreciation::process_asset(pool, asset, now.date()).await {
            Ok(months) => processed += months as u64,
            Err(e) => errors.push(format!("asset {}: {e}", asset.id)),
        }
    }

    Ok((processed, errors))
}

/// Flip due notifications from `scheduled` to `sent`. Delivery channels are
/// a collaborator's concern.
pub(super) async fn scheduled_notifications(pool: &MySqlPool, now: NaiveDateTime) -> JobOutcome {
    let result = sqlx::query(
        "UPDATE notifications SET status = 'sent', sent_at = ? \
         WHERE status = 'scheduled' AND scheduled_at <= ?",
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok((result.rows_affected(), Vec::new()))
}
