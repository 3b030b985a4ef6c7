use crate::error::EngineResult;
use crate::model::employee::Employee;
use crate::model::payroll::PayrollSettings;
use crate::model::shift::Shift;
use crate::utils::time_math::{apply_grace, match_shift};
use crate::utils::{settings_cache, shift_cache};
use chrono::NaiveDateTime;
use sqlx::MySqlPool;
use std::sync::Arc;

/// Everything a punch needs to know about the instant it lands on: the
/// nearest assigned shift, lateness after grace, organization policy and the
/// day's holiday / week-off classification.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub shift: Option<Shift>,
    pub late_minutes: i64,
    pub settings: Arc<PayrollSettings>,
    pub is_holiday: bool,
    pub is_week_off: bool,
}

pub async fn resolve(
    pool: &MySqlPool,
    employee: &Employee,
    at: NaiveDateTime,
) -> EngineResult<Resolved> {
    let settings = settings_cache::settings_for(pool, employee.organization_id).await?;

    let shifts = shift_cache::shifts_for(pool, employee.id).await?;
    let (shift, late_minutes) = match match_shift(at.time(), &shifts) {
        Some((shift, late)) => (
            Some(shift.clone()),
            apply_grace(late, settings.late_grace_minutes),
        ),
        None => (None, 0),
    };

    let date = at.date();
    let is_holiday = !super::holidays_between(pool, employee.organization_id, date, date)
        .await?
        .is_empty();

    let is_week_off = super::week_off_policies_for(pool, employee.id)
        .await?
        .iter()
        .any(|policy| policy.pattern.0.matches(date));

    Ok(Resolved {
        shift,
        late_minutes,
        settings,
        is_holiday,
        is_week_off,
    })
}
