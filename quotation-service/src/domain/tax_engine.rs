//! Tax calculation engine.
//!
//! Turns a taxable base plus a resolved rate into a component breakdown
//! and a total. The engine is agnostic to how the resolver split the
//! rate: it only rounds and sums the components it is given, so a single
//! 18% component and two 9% components yield the same total with a
//! different breakdown shape.

use crate::models::{TaxRate, TaxRateComponent};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Distinguishes the two zero-amount outcomes: both yield no tax, but
/// they must round-trip through reporting unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTreatment {
    Taxable,
    Exempt,
    ZeroRated,
}

/// One component line of a calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxComponentAmount {
    pub name: String,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Full calculation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxBreakdown {
    pub treatment: TaxTreatment,
    pub components: Vec<TaxComponentAmount>,
    /// Sum of the rounded component amounts, never separately rounded,
    /// so the displayed breakdown always adds up to the displayed total.
    pub total_tax: Decimal,
}

impl TaxBreakdown {
    pub fn none() -> Self {
        Self::with_treatment(TaxTreatment::Taxable)
    }

    pub fn exempt() -> Self {
        Self::with_treatment(TaxTreatment::Exempt)
    }

    pub fn zero_rated() -> Self {
        Self::with_treatment(TaxTreatment::ZeroRated)
    }

    fn with_treatment(treatment: TaxTreatment) -> Self {
        TaxBreakdown {
            treatment,
            components: Vec::new(),
            total_tax: Decimal::ZERO,
        }
    }
}

/// Round to the currency minor unit, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the tax on `taxable_base` under `rate`.
pub fn calculate(taxable_base: Decimal, rate: &TaxRate) -> TaxBreakdown {
    if rate.is_exempt || rate.is_zero_rated {
        let treatment = if rate.is_exempt {
            TaxTreatment::Exempt
        } else {
            TaxTreatment::ZeroRated
        };
        return TaxBreakdown {
            treatment,
            components: Vec::new(),
            total_tax: Decimal::ZERO,
        };
    }

    let components: Vec<TaxComponentAmount> = rate
        .components
        .iter()
        .map(|c: &TaxRateComponent| TaxComponentAmount {
            name: c.name.clone(),
            rate: c.rate,
            amount: round_money(taxable_base * c.rate / Decimal::ONE_HUNDRED),
        })
        .collect();

    let total_tax = components.iter().map(|c| c.amount).sum();

    TaxBreakdown {
        treatment: TaxTreatment::Taxable,
        components,
        total_tax,
    }
}
