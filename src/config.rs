use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,

    /// Offset of organization-local wall clock from UTC, in minutes.
    pub tz_offset_minutes: i64,

    // Fallbacks for organizations that never saved payroll settings; a
    // settings row always wins.
    pub shiftwise_grace_minutes: i64,
    pub payroll_day_of_month: u32,

    // Tick intervals, seconds.
    pub auto_checkout_tick_secs: u64,
    pub accrual_tick_secs: u64,
    pub monthly_tick_secs: u64,
    pub notification_tick_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            tz_offset_minutes: env::var("TZ_OFFSET_MINUTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap(),

            shiftwise_grace_minutes: env::var("SHIFTWISE_GRACE_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap(),

            payroll_day_of_month: env::var("PAYROLL_DAY_OF_MONTH")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap(),

            auto_checkout_tick_secs: env::var("AUTO_CHECKOUT_TICK_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap(),

            accrual_tick_secs: env::var("ACCRUAL_TICK_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap(),

            monthly_tick_secs: env::var("MONTHLY_TICK_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap(),

            notification_tick_secs: env::var("NOTIFICATION_TICK_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap(),
        }
    }

    /// Organization-local now, derived from UTC plus the configured offset.
    pub fn local_now(&self) -> chrono::NaiveDateTime {
        chrono::Utc::now().naive_utc() + chrono::Duration::minutes(self.tz_offset_minutes)
    }
}
