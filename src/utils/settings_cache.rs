use crate::error::EngineResult;
use crate::model::payroll::PayrollSettings;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// organization_id -> payroll settings. Short TTL keeps settings edits
/// visible within a minute without a read per punch.
static SETTINGS_CACHE: Lazy<Cache<u64, Arc<PayrollSettings>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(60))
        .build()
});

/// Settings for the organization, falling back to statutory defaults when no
/// row was ever saved.
pub async fn settings_for(
    pool: &MySqlPool,
    organization_id: u64,
) -> EngineResult<Arc<PayrollSettings>> {
    if let Some(settings) = SETTINGS_CACHE.get(&organization_id).await {
        return Ok(settings);
    }

    let row: Option<PayrollSettings> = sqlx::query_as::<_, PayrollSettings>(
        "SELECT * FROM payroll_settings WHERE organization_id = ?",
    )
    .bind(organization_id)
    .fetch_optional(pool)
    .await?;

    let settings = Arc::new(row.unwrap_or_else(|| PayrollSettings::defaults_for(organization_id)));
    SETTINGS_CACHE.insert(organization_id, settings.clone()).await;
    Ok(settings)
}

pub async fn invalidate(organization_id: u64) {
    SETTINGS_CACHE.invalidate(&organization_id).await;
}
