//! Tax rate resolution and write-time configuration validation.
//!
//! Resolution is a pure function over the framework's rate set and the
//! jurisdiction parent chain; uniqueness of the matching rate per
//! specificity tuple and date is an invariant maintained by the write
//! path (`validate_no_overlap`), so resolution never arbitrates between
//! overlapping candidates.

use crate::models::{Jurisdiction, TaxRate, TaxRateComponent};
use anyhow::anyhow;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Resolve the applicable rate for a quotation.
///
/// `jurisdiction_chain` is child-first, ending at the country root; pass
/// an empty slice when the quotation has no jurisdiction. Each chain
/// member exhausts both its (jurisdiction, category) and
/// jurisdiction-only tuples before its parent is consulted; rates are
/// never blended across levels. After the chain, category-only and then
/// the framework default are tried.
pub fn resolve<'a>(
    rates: &'a [TaxRate],
    jurisdiction_chain: &[Uuid],
    category_id: Option<Uuid>,
    as_of: NaiveDate,
) -> Option<&'a TaxRate> {
    let effective = |r: &&TaxRate| r.is_effective_on(as_of);

    for jurisdiction_id in jurisdiction_chain {
        if let Some(cat) = category_id {
            if let Some(rate) = rates
                .iter()
                .filter(effective)
                .find(|r| r.jurisdiction_id == Some(*jurisdiction_id) && r.category_id == Some(cat))
            {
                return Some(rate);
            }
        }
        if let Some(rate) = rates
            .iter()
            .filter(effective)
            .find(|r| r.jurisdiction_id == Some(*jurisdiction_id) && r.category_id.is_none())
        {
            return Some(rate);
        }
    }

    if let Some(cat) = category_id {
        if let Some(rate) = rates
            .iter()
            .filter(effective)
            .find(|r| r.jurisdiction_id.is_none() && r.category_id == Some(cat))
        {
            return Some(rate);
        }
    }

    rates
        .iter()
        .filter(effective)
        .find(|r| r.jurisdiction_id.is_none() && r.category_id.is_none())
}

/// Inclusive-bounds interval intersection; `None` end = open-ended.
fn intervals_intersect(
    a_from: NaiveDate,
    a_to: Option<NaiveDate>,
    b_from: NaiveDate,
    b_to: Option<NaiveDate>,
) -> bool {
    let a_end_before_b = a_to.map_or(false, |end| end < b_from);
    let b_end_before_a = b_to.map_or(false, |end| end < a_from);
    !(a_end_before_b || b_end_before_a)
}

/// Reject a proposed rate whose interval overlaps an existing rate of the
/// same (jurisdiction, category) tuple. `existing` must already be
/// scoped to the target framework.
pub fn validate_no_overlap(
    existing: &[TaxRate],
    jurisdiction_id: Option<Uuid>,
    category_id: Option<Uuid>,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
) -> Result<(), AppError> {
    if let Some(to) = effective_to {
        if to < effective_from {
            return Err(AppError::BadRequest(anyhow!(
                "effective_to {} precedes effective_from {}",
                to,
                effective_from
            )));
        }
    }

    for rate in existing {
        if rate.jurisdiction_id != jurisdiction_id || rate.category_id != category_id {
            continue;
        }
        if intervals_intersect(
            rate.effective_from,
            rate.effective_to,
            effective_from,
            effective_to,
        ) {
            return Err(AppError::ConfigurationConflict(anyhow!(
                "tax rate '{}' already covers {} to {} for this jurisdiction/category",
                rate.name,
                rate.effective_from,
                rate.effective_to
                    .map_or_else(|| "open-ended".to_string(), |d| d.to_string()),
            )));
        }
    }

    Ok(())
}

/// Component rates must sum to the declared rate. Exempt and zero-rated
/// rates carry no components.
pub fn validate_components(
    rate: Decimal,
    is_exempt: bool,
    is_zero_rated: bool,
    components: &[TaxRateComponent],
) -> Result<(), AppError> {
    if is_exempt || is_zero_rated {
        if !components.is_empty() {
            return Err(AppError::BadRequest(anyhow!(
                "exempt and zero-rated rates must not declare components"
            )));
        }
        return Ok(());
    }

    if components.is_empty() {
        return Err(AppError::BadRequest(anyhow!(
            "a taxable rate requires at least one component"
        )));
    }

    let sum: Decimal = components.iter().map(|c| c.rate).sum();
    if sum != rate {
        return Err(AppError::BadRequest(anyhow!(
            "component rates sum to {} but the declared rate is {}",
            sum,
            rate
        )));
    }

    Ok(())
}

/// Validate a proposed jurisdiction parent: no self-parenting, no
/// cross-country parenting, no cycles. `all` is the country's existing
/// jurisdiction set.
pub fn validate_jurisdiction_parent(
    jurisdiction_id: Option<Uuid>,
    country_id: Uuid,
    parent_id: Uuid,
    all: &[Jurisdiction],
) -> Result<(), AppError> {
    if jurisdiction_id == Some(parent_id) {
        return Err(AppError::ConfigurationConflict(anyhow!(
            "a jurisdiction cannot be its own parent"
        )));
    }

    let parent = all
        .iter()
        .find(|j| j.jurisdiction_id == parent_id)
        .ok_or_else(|| AppError::NotFound(anyhow!("parent jurisdiction {} not found", parent_id)))?;

    if parent.country_id != country_id {
        return Err(AppError::ConfigurationConflict(anyhow!(
            "parent jurisdiction belongs to a different country"
        )));
    }

    // Walk up from the proposed parent; hitting the jurisdiction being
    // edited means the edge would close a cycle.
    let mut cursor = Some(parent);
    let mut hops = 0;
    while let Some(j) = cursor {
        if jurisdiction_id == Some(j.jurisdiction_id) {
            return Err(AppError::ConfigurationConflict(anyhow!(
                "jurisdiction parenting would create a cycle"
            )));
        }
        hops += 1;
        if hops > all.len() {
            return Err(AppError::ConfigurationConflict(anyhow!(
                "jurisdiction hierarchy already contains a cycle"
            )));
        }
        cursor = j
            .parent_id
            .and_then(|pid| all.iter().find(|x| x.jurisdiction_id == pid));
    }

    Ok(())
}

/// Build the child-first parent chain for a jurisdiction, ending at the
/// country root.
pub fn jurisdiction_chain(start: Uuid, all: &[Jurisdiction]) -> Vec<Uuid> {
    let mut chain = Vec::new();
    let mut cursor = all.iter().find(|j| j.jurisdiction_id == start);
    while let Some(j) = cursor {
        if chain.contains(&j.jurisdiction_id) {
            break;
        }
        chain.push(j.jurisdiction_id);
        cursor = j
            .parent_id
            .and_then(|pid| all.iter().find(|x| x.jurisdiction_id == pid));
    }
    chain
}
