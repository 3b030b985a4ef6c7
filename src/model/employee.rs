use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Employee master row. Shift and week-off assignments live in the
/// `employee_shifts` / `employee_week_offs` join tables; resolvers fetch them
/// on demand instead of embedding them here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: u64,
    pub organization_id: u64,
    pub admin_id: u64,
    pub employee_code: String,
    pub joining_date: NaiveDate,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub designation: Option<String>,
    pub status: String,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
