use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DepreciationMethod {
    StraightLine,
    /// Written-down value (declining balance).
    Wdv,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub purchase_price: Decimal,
    pub purchase_date: NaiveDate,
    pub depreciation_method: DepreciationMethod,
    /// Annual rate, percent. Used by WDV.
    pub depreciation_rate: Decimal,
    pub salvage_value: Decimal,
    /// Used by straight-line.
    pub useful_life_months: Option<u32>,
    pub status: String,
}

/// One row per (organization, asset, month, year).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssetDepreciation {
    pub id: u64,
    pub organization_id: u64,
    pub asset_id: u64,
    pub month: u32,
    pub year: i32,
    pub depreciation_amount: Decimal,
    pub accumulated_depreciation: Decimal,
    pub book_value: Decimal,
}
