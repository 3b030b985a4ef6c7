use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AutoCheckoutMode {
    Off,
    /// Close every open row at a fixed organization-wide time.
    General,
    /// Close each open row at its own shift end once grace has passed.
    Shiftwise,
}

/// Organization-level payroll constants and toggles. Absence of a row falls
/// back to `PayrollSettings::defaults_for`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayrollSettings {
    pub id: u64,
    pub organization_id: u64,

    pub pf_enabled: bool,
    pub pf_employee_percentage: Decimal,
    pub pf_employer_percentage: Decimal,
    pub pf_max_limit: Decimal,

    pub esi_enabled: bool,
    pub esi_employee_percentage: Decimal,
    pub esi_employer_percentage: Decimal,
    pub esi_max_limit: Decimal,

    pub pt_enabled: bool,
    pub pt_state: Option<String>,

    pub tds_enabled: bool,
    pub lwf_enabled: bool,
    pub lwf_employee_amount: Decimal,

    pub overtime_enabled: bool,
    pub overtime_factor: Decimal,
    pub bonus_enabled: bool,
    pub gratuity_enabled: bool,

    pub working_days_per_month: u32,
    pub min_hours_for_half_day: Decimal,
    pub sandwich_rule_enabled: bool,

    pub auto_checkout_mode: AutoCheckoutMode,
    pub general_checkout_time: NaiveTime,
    pub shiftwise_grace_minutes: i64,
    pub late_grace_minutes: i64,
    pub payroll_day_of_month: u32,
}

impl PayrollSettings {
    /// True for the fallback produced by `defaults_for`; a persisted row
    /// always has a non-zero id.
    pub fn is_default(&self) -> bool {
        self.id == 0
    }

    /// Statutory defaults used when an organization never saved settings.
    pub fn defaults_for(organization_id: u64) -> Self {
        Self {
            id: 0,
            organization_id,
            pf_enabled: true,
            pf_employee_percentage: dec!(12),
            pf_employer_percentage: dec!(12),
            pf_max_limit: dec!(15000),
            esi_enabled: true,
            esi_employee_percentage: dec!(0.75),
            esi_employer_percentage: dec!(3.25),
            esi_max_limit: dec!(21000),
            pt_enabled: false,
            pt_state: None,
            tds_enabled: true,
            lwf_enabled: false,
            lwf_employee_amount: dec!(0),
            overtime_enabled: false,
            overtime_factor: dec!(1.5),
            bonus_enabled: false,
            gratuity_enabled: true,
            working_days_per_month: 26,
            min_hours_for_half_day: dec!(4),
            sandwich_rule_enabled: false,
            // Abandoned open rows are closed at shift end by default; an
            // organization opts into the fixed-time variant or turns the
            // closer off.
            auto_checkout_mode: AutoCheckoutMode::Shiftwise,
            general_checkout_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            shiftwise_grace_minutes: 30,
            late_grace_minutes: 0,
            payroll_day_of_month: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfessionalTaxSlab {
    pub id: u64,
    pub state: String,
    pub from_salary: Decimal,
    /// NULL means the slab is open-ended.
    pub to_salary: Option<Decimal>,
    pub monthly_tax: Decimal,
    /// Data-driven gender reduction; no shipped slab sets it.
    pub gender: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    General,
    Senior,
    SuperSenior,
}

impl AgeGroup {
    /// Age bracket at the start of the financial year.
    pub fn for_age(age_years: u32) -> Self {
        if age_years >= 80 {
            AgeGroup::SuperSenior
        } else if age_years >= 60 {
            AgeGroup::Senior
        } else {
            AgeGroup::General
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TdsSlab {
    pub id: u64,
    /// April–March, `"2025-26"` form.
    pub financial_year: String,
    pub age_group: AgeGroup,
    pub from_income: Decimal,
    pub to_income: Option<Decimal>,
    pub rate_percentage: Decimal,
}

/// Frozen output of one payroll generation. Unique per
/// (employee, month, year); regeneration replaces the row in one transaction
/// unless `finalized_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayrollRecord {
    pub id: u64,
    pub employee_id: u64,
    pub organization_id: u64,
    pub month: u32,
    pub year: i32,
    pub earnings: sqlx::types::Json<BTreeMap<String, Decimal>>,
    pub deductions: sqlx::types::Json<BTreeMap<String, Decimal>>,
    pub gross: Decimal,
    pub total_deductions: Decimal,
    pub net: Decimal,
    pub payable_days: Decimal,
    pub working_days: Decimal,
    pub audit: sqlx::types::Json<serde_json::Value>,
    pub generated_at: NaiveDateTime,
    pub finalized_at: Option<NaiveDateTime>,
}

/// Month/year pair used in logs, remarks and job windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{:02}/{}", month, year)]
pub struct PayPeriod {
    pub month: u32,
    pub year: i32,
}

impl PayPeriod {
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid period")
    }
}
