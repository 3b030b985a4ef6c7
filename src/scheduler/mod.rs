//! Periodic dispatcher. Every job is idempotent: a second run inside the
//! same tick window closes, accrues or generates nothing. Per-item failures
//! never abort a job loop; they accumulate into the job's status.

mod jobs;

use crate::config::Config;
use crate::error::EngineResult;
use serde::Serialize;
use sqlx::MySqlPool;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    GeneralAutoCheckout,
    ShiftwiseAutoCheckout,
    LeaveAccrual,
    MonthlyPayroll,
    AssetDepreciation,
    ScheduledNotifications,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobName,
    pub run_id: Uuid,
    pub success: bool,
    pub processed_count: u64,
    pub errors: Vec<String>,
}

/// Run one named job to completion and report what it did. This is the
/// `RunJob` ingress; the daemon loops call it on their ticks.
pub async fn run_job(
    pool: &MySqlPool,
    config: &Config,
    name: JobName,
    now: chrono::NaiveDateTime,
) -> JobStatus {
    let run_id = Uuid::new_v4();
    let result: EngineResult<(u64, Vec<String>)> = match name {
        JobName::GeneralAutoCheckout => jobs::general_auto_checkout(pool, now).await,
        JobName::ShiftwiseAutoCheckout => jobs::shiftwise_auto_checkout(pool, config, now).await,
        JobName::LeaveAccrual => jobs::leave_accrual(pool, now).await,
        JobName::MonthlyPayroll => jobs::monthly_payroll(pool, config, now).await,
        JobName::AssetDepreciation => jobs::asset_depreciation(pool, now).await,
        JobName::ScheduledNotifications => jobs::scheduled_notifications(pool, now).await,
    };

    let status = match result {
        Ok((processed_count, errors)) => JobStatus {
            job: name,
            run_id,
            success: errors.is_empty(),
            processed_count,
            errors,
        },
        Err(e) => JobStatus {
            job: name,
            run_id,
            success: false,
            processed_count: 0,
            errors: vec![e.to_string()],
        },
    };

    if status.success {
        info!(job = %name, run_id = %run_id, processed = status.processed_count, "job finished");
    } else {
        error!(
            job = %name,
            run_id = %run_id,
            processed = status.processed_count,
            errors = ?status.errors,
            "job finished with errors"
        );
    }
    status
}

fn spawn_loop(
    pool: MySqlPool,
    config: Config,
    names: Vec<JobName>,
    tick_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = config.local_now();
            for name in &names {
                run_job(&pool, &config, *name, now).await;
            }
        }
    })
}

/// The daemon: one interval loop per job cadence, running until the process
/// exits.
pub async fn run(pool: MySqlPool, config: Config) {
    info!("scheduler starting");

    let handles = vec![
        spawn_loop(
            pool.clone(),
            config.clone(),
            vec![JobName::GeneralAutoCheckout, JobName::ShiftwiseAutoCheckout],
            config.auto_checkout_tick_secs,
        ),
        spawn_loop(
            pool.clone(),
            config.clone(),
            vec![JobName::LeaveAccrual],
            config.accrual_tick_secs,
        ),
        spawn_loop(
            pool.clone(),
            config.clone(),
            vec![JobName::MonthlyPayroll, JobName::AssetDepreciation],
            config.monthly_tick_secs,
        ),
        spawn_loop(
            pool.clone(),
            config.clone(),
            vec![JobName::ScheduledNotifications],
            config.notification_tick_secs,
        ),
    ];

    futures::future::join_all(handles).await;
}
