//! The engine operations layer. These functions are the ingress surface the
//! REST collaborator, the scheduler and tests call directly:
//! punch / edit (attendance), assign / apply / transition (leave),
//! aggregate_month, generate (payroll), run_job (scheduler).

pub mod aggregate;
pub mod attendance;
pub mod depreciation;
pub mod leave;
pub mod payroll;
pub mod resolver;

use crate::error::{EngineError, EngineResult};
use crate::model::employee::Employee;
use crate::model::holiday::{Holiday, WeekOffPolicy};
use sqlx::MySqlPool;

pub(crate) const EMPLOYEE_COLUMNS: &str = "id, organization_id, admin_id, employee_code, \
     joining_date, date_of_birth, gender, designation, status";

pub(crate) async fn employee_by_id(pool: &MySqlPool, employee_id: u64) -> EngineResult<Employee> {
    let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?");
    sqlx::query_as::<_, Employee>(&sql)
        .bind(employee_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "employee",
            id: employee_id,
        })
}

pub(crate) async fn holidays_between(
    pool: &MySqlPool,
    organization_id: u64,
    from: chrono::NaiveDate,
    to: chrono::NaiveDate,
) -> EngineResult<Vec<Holiday>> {
    Ok(sqlx::query_as::<_, Holiday>(
        r#"
        SELECT id, organization_id, name, date, is_paid
        FROM holidays
        WHERE organization_id = ? AND date BETWEEN ? AND ?
        ORDER BY date
        "#,
    )
    .bind(organization_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn week_off_policies_for(
    pool: &MySqlPool,
    employee_id: u64,
) -> EngineResult<Vec<WeekOffPolicy>> {
    Ok(sqlx::query_as::<_, WeekOffPolicy>(
        r#"
        SELECT w.id, w.organization_id, w.name, w.pattern
        FROM week_off_policies w
        INNER JOIN employee_week_offs ew ON ew.week_off_policy_id = w.id
        WHERE ew.employee_id = ?
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?)
}
