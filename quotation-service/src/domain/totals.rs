//! Quotation-level monetary totals.
//!
//! Totals are a pure function of line items, discount percentage and the
//! resolved tax rate; the aggregate's monetary columns are only ever
//! written from the output of `compute_totals`.

use crate::domain::tax_engine::{self, TaxBreakdown};
use crate::models::{CreateLineItem, TaxRate};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotationTotals {
    pub sub_total: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax: TaxBreakdown,
    pub total_amount: Decimal,
}

/// Compute all monetary fields for a quotation.
///
/// `discount_amount` is capped at `sub_total`, so percentages above 100
/// never drive the taxable amount negative. A quotation-level exempt or
/// zero-rated flag suppresses the resolved rate entirely; exempt takes
/// precedence when both are set.
pub fn compute_totals(
    line_items: &[CreateLineItem],
    discount_percentage: Decimal,
    tax_exempt: bool,
    tax_zero_rated: bool,
    rate: Option<&TaxRate>,
) -> QuotationTotals {
    let sub_total: Decimal = line_items.iter().map(|item| item.amount()).sum();

    let discount_amount = tax_engine::round_money(
        sub_total * discount_percentage / Decimal::ONE_HUNDRED,
    )
    .min(sub_total);

    let taxable_amount = sub_total - discount_amount;

    let tax = if tax_exempt {
        TaxBreakdown::exempt()
    } else if tax_zero_rated {
        TaxBreakdown::zero_rated()
    } else {
        match rate {
            Some(rate) => tax_engine::calculate(taxable_amount, rate),
            None => TaxBreakdown::none(),
        }
    };

    let total_amount = taxable_amount + tax.total_tax;

    QuotationTotals {
        sub_total,
        discount_percentage,
        discount_amount,
        taxable_amount,
        tax,
        total_amount,
    }
}
