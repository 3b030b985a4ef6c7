use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Component code payroll treats as the basic salary. BASIC anchors
/// percentage-of-basic components and is never prorated.
pub const BASIC_CODE: &str = "BASIC";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Earning,
    Deduction,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    Fixed,
    PercentageOfBasic,
    PercentageOfGross,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalaryComponent {
    pub id: u64,
    pub organization_id: u64,
    pub code: String,
    pub name: String,
    pub component_type: ComponentType,
    pub calculation_type: CalculationType,
    pub calculation_value: Decimal,
    pub is_pf_applicable: bool,
    pub is_esi_applicable: bool,
    pub prorate_on_attendance: bool,
    /// Ordering hint; BASIC carries the lowest priority so it resolves first.
    pub priority: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalaryStructure {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StructureComponent {
    pub id: u64,
    pub structure_id: u64,
    pub component_id: u64,
    pub amount: Decimal,
}

/// Active row: `effective_from <= today` and `effective_to` unset or in the
/// future.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeSalaryStructure {
    pub id: u64,
    pub employee_id: u64,
    pub structure_id: u64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

/// Per-employee override of one component's amount inside a window.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeSalaryComponent {
    pub id: u64,
    pub employee_id: u64,
    pub component_id: u64,
    pub amount: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}
