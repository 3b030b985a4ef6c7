use crate::error::EngineResult;
use crate::model::shift::Shift;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// employee_id -> assigned shift set. Invalidated on assignment mutation or
/// after the TTL.
static SHIFT_CACHE: Lazy<Cache<u64, Arc<Vec<Shift>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(300)) // 5 min TTL
        .build()
});

pub async fn shifts_for(pool: &MySqlPool, employee_id: u64) -> EngineResult<Arc<Vec<Shift>>> {
    if let Some(shifts) = SHIFT_CACHE.get(&employee_id).await {
        return Ok(shifts);
    }

    let shifts: Vec<Shift> = sqlx::query_as::<_, Shift>(
        r#"
        SELECT s.id, s.organization_id, s.name, s.start_time, s.end_time,
               s.duration_minutes, s.paid_break_minutes
        FROM shifts s
        INNER JOIN employee_shifts es ON es.shift_id = s.id
        WHERE es.employee_id = ?
        ORDER BY s.start_time
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?;

    let shifts = Arc::new(shifts);
    SHIFT_CACHE.insert(employee_id, shifts.clone()).await;
    Ok(shifts)
}

/// Call after any mutation of the employee's shift assignments.
pub async fn invalidate(employee_id: u64) {
    SHIFT_CACHE.invalidate(&employee_id).await;
}
