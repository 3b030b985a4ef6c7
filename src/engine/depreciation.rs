use crate::error::{EngineError, EngineResult};
use crate::model::asset::{Asset, AssetDepreciation, DepreciationMethod};
use crate::utils::money::round2;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::MySqlPool;

/// One month of depreciation for the asset given the book value it enters
/// the month with. Clamped so the book value never drops below the salvage
/// floor (or zero).
pub fn monthly_depreciation(asset: &Asset, book_value: Decimal) -> EngineResult<Decimal> {
    let floor = asset.salvage_value.max(Decimal::ZERO);
    if book_value <= floor {
        return Ok(Decimal::ZERO);
    }

    let raw = match asset.depreciation_method {
        DepreciationMethod::StraightLine => {
            let life = asset.useful_life_months.unwrap_or(0);
            if life == 0 {
                return Err(EngineError::Policy(format!(
                    "asset {} has no useful life for straight-line depreciation",
                    asset.id
                )));
            }
            (asset.purchase_price - floor) / Decimal::from(life)
        }
        DepreciationMethod::Wdv => book_value * asset.depreciation_rate / dec!(100) / dec!(12),
    };

    Ok(round2(raw.min(book_value - floor)))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Book every unrecorded month for the asset, strictly before the month of
/// `today` so an in-progress month is never booked. Returns the number of
/// months written.
pub async fn process_asset(pool: &MySqlPool, asset: &Asset, today: NaiveDate) -> EngineResult<u32> {
    let last: Option<(u32, i32, Decimal)> = sqlx::query_as(
        "SELECT month, year, accumulated_depreciation FROM asset_depreciations \
         WHERE asset_id = ? ORDER BY year DESC, month DESC LIMIT 1",
    )
    .bind(asset.id)
    .fetch_optional(pool)
    .await?;

    let (mut year, mut month, mut accumulated) = match last {
        Some((m, y, acc)) => {
            let (ny, nm) = next_month(y, m);
            (ny, nm, acc)
        }
        None => (
            asset.purchase_date.year(),
            asset.purchase_date.month(),
            Decimal::ZERO,
        ),
    };

    let mut written = 0u32;
    while (year, month) < (today.year(), today.month()) {
        let book_value = asset.purchase_price - accumulated;
        let amount = monthly_depreciation(asset, book_value)?;
        if amount <= Decimal::ZERO {
            break;
        }
        accumulated += amount;

        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO asset_depreciations
                (organization_id, asset_id, month, year, depreciation_amount,
                 accumulated_depreciation, book_value)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.organization_id)
        .bind(asset.id)
        .bind(month)
        .bind(year)
        .bind(amount)
        .bind(accumulated)
        .bind(asset.purchase_price - accumulated)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        written += 1;
        let (ny, nm) = next_month(year, month);
        year = ny;
        month = nm;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(method: DepreciationMethod) -> Asset {
        Asset {
            id: 1,
            organization_id: 1,
            name: "laptop".into(),
            purchase_price: dec!(60000),
            purchase_date: "2025-01-15".parse().unwrap(),
            depreciation_method: method,
            depreciation_rate: dec!(40),
            salvage_value: dec!(0),
            useful_life_months: Some(24),
            status: "active".into(),
        }
    }

    #[test]
    fn straight_line_is_constant_per_month() {
        let a = asset(DepreciationMethod::StraightLine);
        assert_eq!(monthly_depreciation(&a, dec!(60000)).unwrap(), dec!(2500.00));
        assert_eq!(monthly_depreciation(&a, dec!(10000)).unwrap(), dec!(2500.00));
    }

    #[test]
    fn straight_line_without_life_is_refused() {
        let mut a = asset(DepreciationMethod::StraightLine);
        a.useful_life_months = None;
        assert!(monthly_depreciation(&a, dec!(60000)).is_err());
    }

    #[test]
    fn wdv_declines_with_book_value() {
        let a = asset(DepreciationMethod::Wdv);
        // 40% p.a. on 60000 -> 2000/month at full book value
        assert_eq!(monthly_depreciation(&a, dec!(60000)).unwrap(), dec!(2000.00));
        assert_eq!(monthly_depreciation(&a, dec!(30000)).unwrap(), dec!(1000.00));
    }

    #[test]
    fn final_month_is_clamped_to_the_remaining_book_value() {
        let a = asset(DepreciationMethod::StraightLine);
        assert_eq!(monthly_depreciation(&a, dec!(1200)).unwrap(), dec!(1200.00));
        assert_eq!(monthly_depreciation(&a, dec!(0)).unwrap(), dec!(0));
    }

    #[test]
    fn salvage_value_floors_the_book_value() {
        let mut a = asset(DepreciationMethod::StraightLine);
        a.salvage_value = dec!(6000);
        // (60000 - 6000) / 24 = 2250
        assert_eq!(monthly_depreciation(&a, dec!(60000)).unwrap(), dec!(2250.00));
        // Book value at the floor depreciates no further.
        assert_eq!(monthly_depreciation(&a, dec!(6000)).unwrap(), dec!(0));
        // Just above the floor: clamp to the gap.
        assert_eq!(monthly_depreciation(&a, dec!(6100)).unwrap(), dec!(100.00));
    }
}
