use crate::engine::aggregate::{self, MonthlySummary};
use crate::error::{EngineError, EngineResult};
use crate::model::advance::{AdvanceType, EmployeeAdvance};
use crate::model::payroll::{
    AgeGroup, PayPeriod, PayrollRecord, PayrollSettings, ProfessionalTaxSlab, TdsSlab,
};
use crate::model::salary::{CalculationType, ComponentType, BASIC_CODE};
use crate::utils::money::{percent_of, round2};
use crate::utils::settings_cache;
use crate::utils::time_math::{age_years, enumerate_month, financial_year, financial_year_start};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::MySqlPool;
use std::collections::BTreeMap;

/// A structure component flattened for calculation: the effective value
/// (structure amount or employee override) plus the flags payroll needs.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub component_id: u64,
    pub code: String,
    pub component_type: ComponentType,
    pub calculation_type: CalculationType,
    pub value: Decimal,
    pub is_pf_applicable: bool,
    pub is_esi_applicable: bool,
    pub prorate_on_attendance: bool,
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct PayrollInputs {
    pub employee_id: u64,
    pub organization_id: u64,
    pub period: PayPeriod,
    pub joining_date: NaiveDate,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub components: Vec<ResolvedComponent>,
    pub settings: PayrollSettings,
    pub summary: MonthlySummary,
    pub pt_slabs: Vec<ProfessionalTaxSlab>,
    /// Pre-filtered for the period's financial year and the employee's age
    /// group.
    pub tds_slabs: Vec<TdsSlab>,
    pub advances: Vec<EmployeeAdvance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancePayment {
    pub advance_id: u64,
    pub amount: Decimal,
    pub new_remaining: Decimal,
}

#[derive(Debug, Clone)]
pub struct PayrollBreakdown {
    pub earnings: BTreeMap<String, Decimal>,
    pub deductions: BTreeMap<String, Decimal>,
    pub gross: Decimal,
    pub total_deductions: Decimal,
    pub net: Decimal,
    pub payable_days: Decimal,
    pub working_days: Decimal,
    pub audit: serde_json::Value,
    pub advance_payments: Vec<AdvancePayment>,
}

/// Marginal tax over the annualized income. Slabs carry 1-based lower
/// bounds (`250001`), so the taxable span of a slab is
/// `min(income, to) - (from - 1)`.
pub fn tds_annual_tax(slabs: &[TdsSlab], annual_income: Decimal) -> Decimal {
    let mut ordered: Vec<&TdsSlab> = slabs.iter().collect();
    ordered.sort_by_key(|s| s.from_income);

    let mut tax = Decimal::ZERO;
    for slab in ordered {
        let lower = if slab.from_income <= Decimal::ONE {
            Decimal::ZERO
        } else {
            slab.from_income - Decimal::ONE
        };
        let upper = match slab.to_income {
            Some(to) => annual_income.min(to),
            None => annual_income,
        };
        let span = (upper - lower).max(Decimal::ZERO);
        tax += percent_of(span, slab.rate_percentage);
    }
    tax
}

/// Monthly professional tax for the state and gross. A slab restricted to the
/// employee's gender wins over the generic one.
pub fn pt_monthly_tax(
    slabs: &[ProfessionalTaxSlab],
    state: &str,
    gross: Decimal,
    gender: Option<&str>,
) -> Option<Decimal> {
    let in_range = |slab: &&ProfessionalTaxSlab| {
        slab.state == state
            && gross >= slab.from_salary
            && slab.to_salary.map_or(true, |to| gross <= to)
    };

    if let Some(g) = gender {
        if let Some(slab) = slabs
            .iter()
            .filter(in_range)
            .find(|s| s.gender.as_deref() == Some(g))
        {
            return Some(slab.monthly_tax);
        }
    }
    slabs
        .iter()
        .filter(in_range)
        .find(|s| s.gender.is_none())
        .map(|s| s.monthly_tax)
}

fn sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, |acc, v| acc + v)
}

/// The full calculation, pure over its inputs. Re-running on the same inputs
/// yields an identical breakdown.
pub fn compute(inputs: &PayrollInputs) -> EngineResult<PayrollBreakdown> {
    let settings = &inputs.settings;
    let summary = &inputs.summary;

    let working_days = if summary.working_days > 0 {
        summary.working_days
    } else {
        settings.working_days_per_month
    };
    if working_days == 0 {
        return Err(EngineError::InconsistentAttendance {
            employee_id: inputs.employee_id,
            month: inputs.period.month,
            year: inputs.period.year,
            reason: "no working days in the period".into(),
        });
    }
    let working = Decimal::from(working_days);
    let payable = summary.payable_days;
    let factor = payable / working;

    let mut components = inputs.components.clone();
    components.sort_by_key(|c| c.priority);

    let mut earnings: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut basic = Decimal::ZERO;

    // Pass 1: fixed and percentage-of-basic. BASIC resolves first by
    // priority and is never prorated; payable days already carry the
    // unpaid-absence reduction.
    for c in components
        .iter()
        .filter(|c| c.component_type == ComponentType::Earning)
        .filter(|c| c.calculation_type != CalculationType::PercentageOfGross)
    {
        let mut amount = match c.calculation_type {
            CalculationType::Fixed => c.value,
            CalculationType::PercentageOfBasic => percent_of(basic, c.value),
            CalculationType::PercentageOfGross => unreachable!(),
        };
        if c.code == BASIC_CODE {
            basic = amount;
        } else if c.prorate_on_attendance {
            amount *= factor;
        }
        earnings.insert(c.code.clone(), round2(amount));
    }

    // Pass 2: percentage-of-gross over the pass-1 sum.
    let pass1_gross = sum(earnings.values().copied());
    for c in components
        .iter()
        .filter(|c| c.component_type == ComponentType::Earning)
        .filter(|c| c.calculation_type == CalculationType::PercentageOfGross)
    {
        let mut amount = percent_of(pass1_gross, c.value);
        if c.prorate_on_attendance {
            amount *= factor;
        }
        earnings.insert(c.code.clone(), round2(amount));
    }

    // Overtime is paid on top and never prorated.
    if settings.overtime_enabled && summary.overtime_hours > Decimal::ZERO && basic > Decimal::ZERO
    {
        let hourly = basic / (working * dec!(8));
        let amount = round2(hourly * settings.overtime_factor * summary.overtime_hours);
        if amount > Decimal::ZERO {
            earnings.insert("OVERTIME".to_string(), amount);
        }
    }

    let gross = round2(sum(earnings.values().copied()));

    let mut deductions: BTreeMap<String, Decimal> = BTreeMap::new();

    // Structure-defined deductions evaluate like earnings.
    for c in components
        .iter()
        .filter(|c| c.component_type == ComponentType::Deduction)
    {
        let mut amount = match c.calculation_type {
            CalculationType::Fixed => c.value,
            CalculationType::PercentageOfBasic => percent_of(basic, c.value),
            CalculationType::PercentageOfGross => percent_of(gross, c.value),
        };
        if c.prorate_on_attendance {
            amount *= factor;
        }
        let amount = round2(amount);
        if amount > Decimal::ZERO {
            deductions.insert(c.code.clone(), amount);
        }
    }

    // PF on the flagged earnings, capped.
    let pf_base = sum(
        components
            .iter()
            .filter(|c| c.component_type == ComponentType::Earning && c.is_pf_applicable)
            .filter_map(|c| earnings.get(&c.code).copied()),
    );
    if settings.pf_enabled && pf_base > Decimal::ZERO {
        let capped = pf_base.min(settings.pf_max_limit);
        let pf = round2(percent_of(capped, settings.pf_employee_percentage));
        if pf > Decimal::ZERO {
            deductions.insert("PF".to_string(), pf);
        }
    }

    // ESI applies only under the wage ceiling; with no flagged component the
    // base is the gross.
    let flagged_esi = sum(
        components
            .iter()
            .filter(|c| c.component_type == ComponentType::Earning && c.is_esi_applicable)
            .filter_map(|c| earnings.get(&c.code).copied()),
    );
    let esi_base = if flagged_esi > Decimal::ZERO {
        flagged_esi
    } else {
        gross
    };
    if settings.esi_enabled && esi_base > Decimal::ZERO && esi_base <= settings.esi_max_limit {
        let esi = round2(percent_of(esi_base, settings.esi_employee_percentage));
        if esi > Decimal::ZERO {
            deductions.insert("ESI".to_string(), esi);
        }
    }

    let mut pt_applied = None;
    if settings.pt_enabled {
        if let Some(state) = settings.pt_state.as_deref() {
            if let Some(pt) =
                pt_monthly_tax(&inputs.pt_slabs, state, gross, inputs.gender.as_deref())
            {
                if pt > Decimal::ZERO {
                    deductions.insert("PT".to_string(), round2(pt));
                    pt_applied = Some(state.to_string());
                }
            }
        }
    }

    let annual_gross = gross * dec!(12);
    let mut annual_tds = Decimal::ZERO;
    if settings.tds_enabled && !inputs.tds_slabs.is_empty() {
        annual_tds = tds_annual_tax(&inputs.tds_slabs, annual_gross);
        let monthly = round2(annual_tds / dec!(12));
        if monthly > Decimal::ZERO {
            deductions.insert("TDS".to_string(), monthly);
        }
    }

    if settings.lwf_enabled && settings.lwf_employee_amount > Decimal::ZERO {
        deductions.insert("LWF".to_string(), round2(settings.lwf_employee_amount));
    }

    // Advance and loan recoveries.
    let mut advance_payments = Vec::new();
    let mut advance_total = Decimal::ZERO;
    let mut loan_total = Decimal::ZERO;
    for advance in inputs.advances.iter().filter(|a| a.status == "active") {
        let due = advance.due_installment();
        if due <= Decimal::ZERO {
            continue;
        }
        match advance.advance_type {
            AdvanceType::Advance => advance_total += due,
            AdvanceType::Loan => loan_total += due,
        }
        advance_payments.push(AdvancePayment {
            advance_id: advance.id,
            amount: due,
            new_remaining: advance.remaining - due,
        });
    }
    if advance_total > Decimal::ZERO {
        deductions.insert("ADVANCE".to_string(), round2(advance_total));
    }
    if loan_total > Decimal::ZERO {
        deductions.insert("LOAN".to_string(), round2(loan_total));
    }

    let total_deductions = round2(sum(deductions.values().copied()));
    let net = gross - total_deductions;

    // Reference figure only, never deducted.
    let period_end = *enumerate_month(inputs.period.year, inputs.period.month)
        .last()
        .expect("month has days");
    let years_of_service = age_years(inputs.joining_date, period_end);
    let gratuity_reference = if settings.gratuity_enabled && basic > Decimal::ZERO {
        round2(basic * dec!(15) / dec!(26) * Decimal::from(years_of_service))
    } else {
        Decimal::ZERO
    };

    let audit = serde_json::json!({
        "payable_days": payable,
        "working_days": working,
        "proration_factor": factor.round_dp(6),
        "pf_base": pf_base,
        "esi_base": esi_base,
        "pt_state": pt_applied,
        "financial_year": financial_year(inputs.period.first_day()),
        "annual_gross": annual_gross,
        "annual_tds": annual_tds,
        "overtime_hours": summary.overtime_hours,
        "years_of_service": years_of_service,
        "gratuity_reference": gratuity_reference,
    });

    Ok(PayrollBreakdown {
        earnings,
        deductions,
        gross,
        total_deductions,
        net,
        payable_days: payable,
        working_days: working,
        audit,
        advance_payments,
    })
}

#[derive(sqlx::FromRow)]
struct ComponentRow {
    component_id: u64,
    code: String,
    component_type: ComponentType,
    calculation_type: CalculationType,
    calculation_value: Decimal,
    amount: Decimal,
    is_pf_applicable: bool,
    is_esi_applicable: bool,
    prorate_on_attendance: bool,
    priority: i32,
}

async fn resolve_components(
    pool: &MySqlPool,
    employee_id: u64,
    on: NaiveDate,
) -> EngineResult<Vec<ResolvedComponent>> {
    let structure: Option<(u64,)> = sqlx::query_as(
        r#"
        SELECT structure_id FROM employee_salary_structures
        WHERE employee_id = ? AND effective_from <= ?
          AND (effective_to IS NULL OR effective_to >= ?)
        ORDER BY effective_from DESC
        LIMIT 1
        "#,
    )
    .bind(employee_id)
    .bind(on)
    .bind(on)
    .fetch_optional(pool)
    .await?;

    let (structure_id,) = structure.ok_or(EngineError::NoStructure { employee_id, on })?;

    let rows: Vec<ComponentRow> = sqlx::query_as::<_, ComponentRow>(
        r#"
        SELECT c.id AS component_id, c.code, c.component_type, c.calculation_type,
               c.calculation_value, sc.amount, c.is_pf_applicable, c.is_esi_applicable,
               c.prorate_on_attendance, c.priority
        FROM structure_components sc
        INNER JOIN salary_components c ON c.id = sc.component_id
        WHERE sc.structure_id = ? AND c.is_active = 1
        ORDER BY c.priority
        "#,
    )
    .bind(structure_id)
    .fetch_all(pool)
    .await?;

    let overrides: Vec<(u64, Decimal)> = sqlx::query_as(
        r#"
        SELECT component_id, amount FROM employee_salary_components
        WHERE employee_id = ? AND effective_from <= ?
          AND (effective_to IS NULL OR effective_to >= ?)
        "#,
    )
    .bind(employee_id)
    .bind(on)
    .bind(on)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let overridden = overrides
                .iter()
                .find(|(id, _)| *id == row.component_id)
                .map(|(_, amount)| *amount);
            // An employee override replaces the component's amount outright.
            let (calculation_type, value) = match overridden {
                Some(amount) => (CalculationType::Fixed, amount),
                None => match row.calculation_type {
                    CalculationType::Fixed => (CalculationType::Fixed, row.amount),
                    other => (other, row.calculation_value),
                },
            };
            ResolvedComponent {
                component_id: row.component_id,
                code: row.code,
                component_type: row.component_type,
                calculation_type,
                value,
                is_pf_applicable: row.is_pf_applicable,
                is_esi_applicable: row.is_esi_applicable,
                prorate_on_attendance: row.prorate_on_attendance,
                priority: row.priority,
            }
        })
        .collect())
}

/// Generate and persist the month's payroll record for one employee. The
/// write is a single transaction keyed by (employee, month, year); an
/// existing record is replaced unless it was finalized.
pub async fn generate(
    pool: &MySqlPool,
    employee_id: u64,
    month: u32,
    year: i32,
    generated_at: NaiveDateTime,
) -> EngineResult<PayrollRecord> {
    if !(1..=12).contains(&month) {
        return Err(EngineError::Policy(format!("invalid month {month}")));
    }
    let employee = super::employee_by_id(pool, employee_id).await?;
    let period = PayPeriod { month, year };
    let first = period.first_day();

    let components = resolve_components(pool, employee_id, first).await?;
    let summary = aggregate::aggregate_month(pool, employee_id, month, year).await?;
    let settings = settings_cache::settings_for(pool, employee.organization_id).await?;

    let pt_slabs: Vec<ProfessionalTaxSlab> = match settings.pt_state.as_deref() {
        Some(state) if settings.pt_enabled => sqlx::query_as::<_, ProfessionalTaxSlab>(
            "SELECT id, state, from_salary, to_salary, monthly_tax, gender \
             FROM professional_tax_slabs WHERE state = ? ORDER BY from_salary",
        )
        .bind(state)
        .fetch_all(pool)
        .await?,
        _ => Vec::new(),
    };

    let age_group = match employee.date_of_birth {
        Some(dob) => AgeGroup::for_age(age_years(dob, financial_year_start(first))),
        None => AgeGroup::General,
    };
    let tds_slabs: Vec<TdsSlab> = if settings.tds_enabled {
        sqlx::query_as::<_, TdsSlab>(
            "SELECT id, financial_year, age_group, from_income, to_income, rate_percentage \
             FROM tds_slabs WHERE financial_year = ? AND age_group = ? ORDER BY from_income",
        )
        .bind(financial_year(first))
        .bind(age_group)
        .fetch_all(pool)
        .await?
    } else {
        Vec::new()
    };

    let advances: Vec<EmployeeAdvance> = sqlx::query_as::<_, EmployeeAdvance>(
        "SELECT id, employee_id, advance_type, principal, remaining, installment, status \
         FROM employee_advances WHERE employee_id = ? AND status = 'active'",
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?;

    let breakdown = compute(&PayrollInputs {
        employee_id,
        organization_id: employee.organization_id,
        period,
        joining_date: employee.joining_date,
        date_of_birth: employee.date_of_birth,
        gender: employee.gender.clone(),
        components,
        settings: (*settings).clone(),
        summary,
        pt_slabs,
        tds_slabs,
        advances,
    })?;

    persist(pool, &employee, period, &breakdown, generated_at).await
}

async fn persist(
    pool: &MySqlPool,
    employee: &crate::model::employee::Employee,
    period: PayPeriod,
    breakdown: &PayrollBreakdown,
    generated_at: NaiveDateTime,
) -> EngineResult<PayrollRecord> {
    let mut tx = pool.begin().await?;

    let existing: Option<(u64, Option<NaiveDateTime>)> = sqlx::query_as(
        "SELECT id, finalized_at FROM payroll_records \
         WHERE employee_id = ? AND month = ? AND year = ? FOR UPDATE",
    )
    .bind(employee.id)
    .bind(period.month)
    .bind(period.year)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((id, finalized_at)) = existing {
        if finalized_at.is_some() {
            return Err(EngineError::Conflict(format!(
                "payroll {period} for employee {} is finalized",
                employee.id
            )));
        }
        sqlx::query("DELETE FROM payroll_records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO payroll_records
            (employee_id, organization_id, month, year, earnings, deductions,
             gross, total_deductions, net, payable_days, working_days, audit, generated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee.id)
    .bind(employee.organization_id)
    .bind(period.month)
    .bind(period.year)
    .bind(sqlx::types::Json(&breakdown.earnings))
    .bind(sqlx::types::Json(&breakdown.deductions))
    .bind(breakdown.gross)
    .bind(breakdown.total_deductions)
    .bind(breakdown.net)
    .bind(breakdown.payable_days)
    .bind(breakdown.working_days)
    .bind(sqlx::types::Json(&breakdown.audit))
    .bind(generated_at)
    .execute(&mut *tx)
    .await?;

    for payment in &breakdown.advance_payments {
        let status = if payment.new_remaining <= Decimal::ZERO {
            "closed"
        } else {
            "active"
        };
        sqlx::query("UPDATE employee_advances SET remaining = ?, status = ? WHERE id = ?")
            .bind(payment.new_remaining)
            .bind(status)
            .bind(payment.advance_id)
            .execute(&mut *tx)
            .await?;
    }

    let record: PayrollRecord = sqlx::query_as::<_, PayrollRecord>(
        "SELECT id, employee_id, organization_id, month, year, earnings, deductions, gross, \
         total_deductions, net, payable_days, working_days, audit, generated_at, finalized_at \
         FROM payroll_records WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(record)
}

/// Lock a record against regeneration and attendance edits for its month.
pub async fn finalize(
    pool: &MySqlPool,
    employee_id: u64,
    month: u32,
    year: i32,
    at: NaiveDateTime,
) -> EngineResult<()> {
    let result = sqlx::query(
        "UPDATE payroll_records SET finalized_at = ? \
         WHERE employee_id = ? AND month = ? AND year = ? AND finalized_at IS NULL",
    )
    .bind(at)
    .bind(employee_id)
    .bind(month)
    .bind(year)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::Conflict(format!(
            "no open payroll record for employee {employee_id} in {month}/{year}"
        )));
    }
    Ok(())
}

/// Administrative reversal of `finalize`, re-opening the month for
/// regeneration and attendance edits.
pub async fn unlock(
    pool: &MySqlPool,
    employee_id: u64,
    month: u32,
    year: i32,
) -> EngineResult<()> {
    let result = sqlx::query(
        "UPDATE payroll_records SET finalized_at = NULL \
         WHERE employee_id = ? AND month = ? AND year = ? AND finalized_at IS NOT NULL",
    )
    .bind(employee_id)
    .bind(month)
    .bind(year)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::Conflict(format!(
            "no finalized payroll record for employee {employee_id} in {month}/{year}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(working: u32, payable: Decimal) -> MonthlySummary {
        MonthlySummary {
            month: 3,
            year: 2026,
            working_days: working,
            present_days: 0,
            half_day_present: 0,
            absent_days: 0,
            leave_days: Decimal::ZERO,
            half_day_leaves: 0,
            lop_days: Decimal::ZERO,
            week_off_days: 0,
            holiday_days: 0,
            sandwich_absent_days: 0,
            late_days: 0,
            early_exit_days: 0,
            overtime_hours: Decimal::ZERO,
            payable_days: payable,
            day_wise: Vec::new(),
        }
    }

    fn settings() -> PayrollSettings {
        let mut s = PayrollSettings::defaults_for(1);
        s.pf_enabled = false;
        s.esi_enabled = false;
        s.tds_enabled = false;
        s.gratuity_enabled = false;
        s
    }

    fn component(
        code: &str,
        calc: CalculationType,
        value: Decimal,
        prorate: bool,
        priority: i32,
    ) -> ResolvedComponent {
        ResolvedComponent {
            component_id: priority as u64,
            code: code.into(),
            component_type: ComponentType::Earning,
            calculation_type: calc,
            value,
            is_pf_applicable: code == BASIC_CODE,
            is_esi_applicable: false,
            prorate_on_attendance: prorate,
            priority,
        }
    }

    fn inputs(
        components: Vec<ResolvedComponent>,
        settings: PayrollSettings,
        summary: MonthlySummary,
    ) -> PayrollInputs {
        PayrollInputs {
            employee_id: 1,
            organization_id: 1,
            period: PayPeriod { month: 3, year: 2026 },
            joining_date: "2020-01-01".parse().unwrap(),
            date_of_birth: Some("1990-06-15".parse().unwrap()),
            gender: None,
            components,
            settings,
            summary,
            pt_slabs: Vec::new(),
            tds_slabs: Vec::new(),
            advances: Vec::new(),
        }
    }

    #[test]
    fn proration_spares_basic_and_halves_the_rest() {
        // BASIC 20000 fixed, HRA 40% of basic, SPECIAL 5000 fixed; 13 of 26
        // payable days.
        let components = vec![
            component(BASIC_CODE, CalculationType::Fixed, dec!(20000), false, 1),
            component("HRA", CalculationType::PercentageOfBasic, dec!(40), true, 2),
            component("SPECIAL", CalculationType::Fixed, dec!(5000), true, 3),
        ];
        let mut s = settings();
        s.pf_enabled = true;

        let breakdown = compute(&inputs(components, s, summary(26, dec!(13)))).unwrap();

        assert_eq!(breakdown.earnings["BASIC"], dec!(20000.00));
        assert_eq!(breakdown.earnings["HRA"], dec!(4000.00));
        assert_eq!(breakdown.earnings["SPECIAL"], dec!(2500.00));
        assert_eq!(breakdown.gross, dec!(26500.00));
        // PF 12% on min(20000, 15000)
        assert_eq!(breakdown.deductions["PF"], dec!(1800.00));
        assert_eq!(breakdown.net, dec!(26500.00) - dec!(1800.00));
    }

    #[test]
    fn basic_is_never_prorated_even_when_flagged() {
        let components = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(20000),
            true,
            1,
        )];
        let breakdown = compute(&inputs(components, settings(), summary(26, dec!(13)))).unwrap();
        assert_eq!(breakdown.earnings["BASIC"], dec!(20000.00));
    }

    #[test]
    fn percentage_of_gross_runs_on_the_pass_one_sum() {
        let components = vec![
            component(BASIC_CODE, CalculationType::Fixed, dec!(10000), false, 1),
            component("SPL", CalculationType::PercentageOfGross, dec!(10), false, 2),
        ];
        let breakdown = compute(&inputs(components, settings(), summary(26, dec!(26)))).unwrap();
        assert_eq!(breakdown.earnings["SPL"], dec!(1000.00));
        assert_eq!(breakdown.gross, dec!(11000.00));
    }

    #[test]
    fn tds_slab_walk_annualizes_and_divides() {
        // Slabs: 0-250k @ 0%, 250001-500k @ 5%, 500001-1M @ 20%.
        let slabs = vec![
            TdsSlab {
                id: 1,
                financial_year: "2025-26".into(),
                age_group: AgeGroup::General,
                from_income: dec!(0),
                to_income: Some(dec!(250000)),
                rate_percentage: dec!(0),
            },
            TdsSlab {
                id: 2,
                financial_year: "2025-26".into(),
                age_group: AgeGroup::General,
                from_income: dec!(250001),
                to_income: Some(dec!(500000)),
                rate_percentage: dec!(5),
            },
            TdsSlab {
                id: 3,
                financial_year: "2025-26".into(),
                age_group: AgeGroup::General,
                from_income: dec!(500001),
                to_income: Some(dec!(1000000)),
                rate_percentage: dec!(20),
            },
        ];
        assert_eq!(tds_annual_tax(&slabs, dec!(900000)), dec!(92500));

        // Through the full calculation: gross 75000 -> annual 900000.
        let components = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(75000),
            false,
            1,
        )];
        let mut s = settings();
        s.tds_enabled = true;
        let mut input = inputs(components, s, summary(26, dec!(26)));
        input.tds_slabs = slabs;
        let breakdown = compute(&input).unwrap();
        assert_eq!(breakdown.deductions["TDS"], dec!(7708.33));
    }

    #[test]
    fn esi_applies_only_under_the_ceiling() {
        let mut s = settings();
        s.esi_enabled = true;

        let under = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(20000),
            false,
            1,
        )];
        let breakdown = compute(&inputs(under, s.clone(), summary(26, dec!(26)))).unwrap();
        // 0.75% of 20000
        assert_eq!(breakdown.deductions["ESI"], dec!(150.00));

        let over = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(30000),
            false,
            1,
        )];
        let breakdown = compute(&inputs(over, s, summary(26, dec!(26)))).unwrap();
        assert!(!breakdown.deductions.contains_key("ESI"));
    }

    #[test]
    fn pt_prefers_gender_specific_slab() {
        let slabs = vec![
            ProfessionalTaxSlab {
                id: 1,
                state: "KA".into(),
                from_salary: dec!(15000),
                to_salary: None,
                monthly_tax: dec!(200),
                gender: None,
            },
            ProfessionalTaxSlab {
                id: 2,
                state: "KA".into(),
                from_salary: dec!(15000),
                to_salary: None,
                monthly_tax: dec!(150),
                gender: Some("female".into()),
            },
        ];
        assert_eq!(
            pt_monthly_tax(&slabs, "KA", dec!(20000), Some("female")),
            Some(dec!(150))
        );
        assert_eq!(
            pt_monthly_tax(&slabs, "KA", dec!(20000), None),
            Some(dec!(200))
        );
        assert_eq!(pt_monthly_tax(&slabs, "MH", dec!(20000), None), None);
        assert_eq!(pt_monthly_tax(&slabs, "KA", dec!(10000), None), None);
    }

    #[test]
    fn advances_and_loans_amortize_separately() {
        let components = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(50000),
            false,
            1,
        )];
        let mut input = inputs(components, settings(), summary(26, dec!(26)));
        input.advances = vec![
            EmployeeAdvance {
                id: 1,
                employee_id: 1,
                advance_type: AdvanceType::Advance,
                principal: dec!(5000),
                remaining: dec!(5000),
                installment: None,
                status: "active".into(),
            },
            EmployeeAdvance {
                id: 2,
                employee_id: 1,
                advance_type: AdvanceType::Loan,
                principal: dec!(24000),
                remaining: dec!(1000),
                installment: Some(dec!(2000)),
                status: "active".into(),
            },
        ];
        let breakdown = compute(&input).unwrap();
        assert_eq!(breakdown.deductions["ADVANCE"], dec!(5000.00));
        assert_eq!(breakdown.deductions["LOAN"], dec!(1000.00));
        assert_eq!(
            breakdown.advance_payments,
            vec![
                AdvancePayment {
                    advance_id: 1,
                    amount: dec!(5000),
                    new_remaining: dec!(0),
                },
                AdvancePayment {
                    advance_id: 2,
                    amount: dec!(1000),
                    new_remaining: dec!(0),
                },
            ]
        );
    }

    #[test]
    fn overtime_pays_time_and_a_half_unprorated() {
        let components = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(20800),
            false,
            1,
        )];
        let mut s = settings();
        s.overtime_enabled = true;
        let mut month = summary(26, dec!(13));
        month.overtime_hours = dec!(10);
        let breakdown = compute(&inputs(components, s, month)).unwrap();
        // hourly 20800 / 208 = 100; 100 * 1.5 * 10
        assert_eq!(breakdown.earnings["OVERTIME"], dec!(1500.00));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let components = vec![
            component(BASIC_CODE, CalculationType::Fixed, dec!(20000), false, 1),
            component("HRA", CalculationType::PercentageOfBasic, dec!(40), true, 2),
        ];
        let mut s = settings();
        s.pf_enabled = true;
        s.tds_enabled = true;

        let input = inputs(components, s, summary(26, dec!(17.5)));
        let first = compute(&input).unwrap();
        let second = compute(&input).unwrap();

        assert_eq!(
            serde_json::to_string(&first.earnings).unwrap(),
            serde_json::to_string(&second.earnings).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.deductions).unwrap(),
            serde_json::to_string(&second.deductions).unwrap()
        );
        assert_eq!(first.audit.to_string(), second.audit.to_string());
        assert_eq!(first.gross, second.gross);
        assert_eq!(first.net, second.net);
    }

    #[test]
    fn zero_working_days_is_inconsistent() {
        let mut s = settings();
        s.working_days_per_month = 0;
        let err = compute(&inputs(Vec::new(), s, summary(0, dec!(0)))).unwrap_err();
        assert!(matches!(err, EngineError::InconsistentAttendance { .. }));
    }

    #[test]
    fn gratuity_reference_lands_in_the_audit_not_the_deductions() {
        let components = vec![component(
            BASIC_CODE,
            CalculationType::Fixed,
            dec!(26000),
            false,
            1,
        )];
        let mut s = settings();
        s.gratuity_enabled = true;
        let breakdown = compute(&inputs(components, s, summary(26, dec!(26)))).unwrap();

        // (26000 * 15 / 26) * 6 years of service (2020-01-01 .. 2026-03-31)
        assert_eq!(
            breakdown.audit["gratuity_reference"],
            serde_json::json!(dec!(90000.00))
        );
        assert!(!breakdown.deductions.contains_key("GRATUITY"));
    }
}
