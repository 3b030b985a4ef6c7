use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shift {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Scheduled span from start to end, minutes. Includes paid break.
    pub duration_minutes: i64,
    pub paid_break_minutes: i64,
}

impl Shift {
    /// end < start means the shift runs past midnight into the next day.
    pub fn crosses_midnight(&self) -> bool {
        self.end_time < self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(start: &str, end: &str) -> Shift {
        Shift {
            id: 1,
            organization_id: 1,
            name: "test".into(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            duration_minutes: 540,
            paid_break_minutes: 60,
        }
    }

    #[test]
    fn day_shift_does_not_cross_midnight() {
        assert!(!shift("09:00", "18:00").crosses_midnight());
    }

    #[test]
    fn night_shift_crosses_midnight() {
        assert!(shift("22:00", "06:00").crosses_midnight());
    }
}
