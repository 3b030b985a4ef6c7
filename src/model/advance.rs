use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdvanceType {
    /// Deducted in full (or by installment when one is set).
    Advance,
    /// Amortized strictly by installment while a remainder exists.
    Loan,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeAdvance {
    pub id: u64,
    pub employee_id: u64,
    pub advance_type: AdvanceType,
    pub principal: Decimal,
    pub remaining: Decimal,
    pub installment: Option<Decimal>,
    pub status: String,
}

impl EmployeeAdvance {
    /// Amount this payroll run deducts for the advance/loan.
    pub fn due_installment(&self) -> Decimal {
        if self.remaining <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        match self.advance_type {
            AdvanceType::Advance => match self.installment {
                Some(inst) => self.remaining.min(inst),
                None => self.remaining,
            },
            AdvanceType::Loan => match self.installment {
                Some(inst) => self.remaining.min(inst),
                None => Decimal::ZERO,
            },
        }
    }
}
