use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccrualFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// Statuses that consume balance; `sync` re-aggregates over these.
    pub fn counts_against_balance(&self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveType {
    pub id: u64,
    pub admin_id: u64,
    /// Unique per admin among active types.
    pub code: String,
    pub name: String,
    pub default_count: Decimal,
    pub is_paid: bool,
    pub is_accrual_enabled: bool,
    pub accrual_rate: Decimal,
    pub accrual_frequency: AccrualFrequency,
    pub is_carry_forward_enabled: bool,
    pub carry_forward_cap: Decimal,
    pub carry_forward_validity_months: u32,
    pub is_encashment_enabled: bool,
    pub encashment_cap: Decimal,
    pub encashment_percentage: Decimal,
    pub min_advance_days: u32,
    pub max_consecutive_days: u32,
    /// When set, weekends inside an application still consume balance.
    pub include_weekends: bool,
    pub include_holidays: bool,
    pub is_active: bool,
}

/// At most one active row per (employee, leave type, year).
/// `used` is derived by `sync`, never incremented ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeLeaveBalance {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub year: i32,
    pub assigned: Decimal,
    pub used: Decimal,
    pub pending: Decimal,
    pub carried_forward: Decimal,
    pub accrued: Decimal,
    pub last_accrued_at: Option<NaiveDate>,
    pub carry_forward_expiry_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl EmployeeLeaveBalance {
    pub fn balance(&self) -> Decimal {
        self.assigned - self.used
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveApplication {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub is_half_day: bool,
    pub total_days: Decimal,
    pub status: LeaveStatus,
    pub reason: Option<String>,
    pub applied_at: NaiveDateTime,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub reviewer_comments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_is_assigned_minus_used() {
        let row = EmployeeLeaveBalance {
            id: 1,
            employee_id: 1,
            leave_type_id: 1,
            year: 2026,
            assigned: dec!(10),
            used: dec!(4),
            pending: dec!(0),
            carried_forward: dec!(0),
            accrued: dec!(0),
            last_accrued_at: None,
            carry_forward_expiry_date: None,
            is_active: true,
        };
        assert_eq!(row.balance(), dec!(6));
    }

    #[test]
    fn only_pending_and_approved_consume_balance() {
        assert!(LeaveStatus::Pending.counts_against_balance());
        assert!(LeaveStatus::Approved.counts_against_balance());
        assert!(!LeaveStatus::Rejected.counts_against_balance());
        assert!(!LeaveStatus::Cancelled.counts_against_balance());
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        let s: LeaveStatus = "approved".parse().unwrap();
        assert_eq!(s, LeaveStatus::Approved);
        assert_eq!(s.to_string(), "approved");
    }
}
