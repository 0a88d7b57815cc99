//! Tax resolution specificity, the calculation engine's rounding
//! contract, and end-to-end quotation totals.

mod common;

use chrono::Utc;
use common::{date, draft_input, harness, item, member};
use proptest::prelude::*;
use quotation_service::domain::tax_engine::{self, TaxTreatment};
use quotation_service::domain::tax_resolver::{jurisdiction_chain, resolve, validate_no_overlap};
use quotation_service::domain::{compute_totals, TaxBreakdown};
use quotation_service::models::{
    CreateCountry, CreateTaxFramework, CreateTaxRate, Jurisdiction, QuotationStatus, TaxContext,
    TaxRate, TaxRateComponent,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn rate(
    jurisdiction_id: Option<Uuid>,
    category_id: Option<Uuid>,
    name: &str,
    components: Vec<(&str, Decimal)>,
) -> TaxRate {
    let components: Vec<TaxRateComponent> = components
        .into_iter()
        .map(|(n, r)| TaxRateComponent {
            name: n.to_string(),
            rate: r,
        })
        .collect();
    TaxRate {
        tax_rate_id: Uuid::new_v4(),
        framework_id: Uuid::new_v4(),
        jurisdiction_id,
        category_id,
        name: name.to_string(),
        rate: components.iter().map(|c| c.rate).sum(),
        is_exempt: false,
        is_zero_rated: false,
        effective_from: date(2025, 1, 1),
        effective_to: None,
        components,
        created_utc: Utc::now(),
    }
}

fn jurisdiction(country_id: Uuid, parent_id: Option<Uuid>) -> Jurisdiction {
    Jurisdiction {
        jurisdiction_id: Uuid::new_v4(),
        country_id,
        parent_id,
        name: "test".to_string(),
        created_utc: Utc::now(),
    }
}

#[test]
fn resolution_prefers_the_most_specific_tuple() {
    let jur = Uuid::new_v4();
    let cat = Uuid::new_v4();
    let as_of = date(2025, 6, 1);

    let rates = vec![
        rate(None, None, "default", vec![("GST", dec!(18))]),
        rate(None, Some(cat), "category", vec![("GST", dec!(12))]),
        rate(Some(jur), None, "jurisdiction", vec![("GST", dec!(10))]),
        rate(Some(jur), Some(cat), "both", vec![("GST", dec!(5))]),
    ];

    let hit = resolve(&rates, &[jur], Some(cat), as_of).unwrap();
    assert_eq!(hit.name, "both");

    let hit = resolve(&rates, &[jur], None, as_of).unwrap();
    assert_eq!(hit.name, "jurisdiction");

    let hit = resolve(&rates, &[], Some(cat), as_of).unwrap();
    assert_eq!(hit.name, "category");

    let hit = resolve(&rates, &[], None, as_of).unwrap();
    assert_eq!(hit.name, "default");
}

#[test]
fn parent_rate_applies_only_when_the_child_has_none() {
    let country = Uuid::new_v4();
    let parent = jurisdiction(country, None);
    let child = jurisdiction(country, Some(parent.jurisdiction_id));
    let all = vec![parent.clone(), child.clone()];
    let as_of = date(2025, 6, 1);

    let chain = jurisdiction_chain(child.jurisdiction_id, &all);
    assert_eq!(chain, vec![child.jurisdiction_id, parent.jurisdiction_id]);

    let parent_only = vec![
        rate(None, None, "default", vec![("GST", dec!(18))]),
        rate(
            Some(parent.jurisdiction_id),
            None,
            "parent",
            vec![("GST", dec!(12))],
        ),
    ];
    assert_eq!(
        resolve(&parent_only, &chain, None, as_of).unwrap().name,
        "parent"
    );

    let mut with_child = parent_only.clone();
    with_child.push(rate(
        Some(child.jurisdiction_id),
        None,
        "child",
        vec![("GST", dec!(10))],
    ));
    assert_eq!(
        resolve(&with_child, &chain, None, as_of).unwrap().name,
        "child"
    );
}

#[test]
fn child_category_rate_beats_parent_jurisdiction_rate() {
    let country = Uuid::new_v4();
    let parent = jurisdiction(country, None);
    let child = jurisdiction(country, Some(parent.jurisdiction_id));
    let all = vec![parent.clone(), child.clone()];
    let cat = Uuid::new_v4();
    let chain = jurisdiction_chain(child.jurisdiction_id, &all);

    // The child's jurisdiction-only rate outranks the parent's more
    // category-specific one: the chain is exhausted level by level.
    let rates = vec![
        rate(Some(child.jurisdiction_id), None, "child-any", vec![("GST", dec!(10))]),
        rate(
            Some(parent.jurisdiction_id),
            Some(cat),
            "parent-cat",
            vec![("GST", dec!(5))],
        ),
    ];
    assert_eq!(
        resolve(&rates, &chain, Some(cat), date(2025, 6, 1)).unwrap().name,
        "child-any"
    );
}

#[test]
fn resolution_respects_effective_dates() {
    let old = TaxRate {
        effective_to: Some(date(2025, 6, 30)),
        ..rate(None, None, "old", vec![("GST", dec!(15))])
    };
    let new = TaxRate {
        effective_from: date(2025, 7, 1),
        ..rate(None, None, "new", vec![("GST", dec!(18))])
    };
    let rates = vec![old, new];

    assert_eq!(resolve(&rates, &[], None, date(2025, 6, 30)).unwrap().name, "old");
    assert_eq!(resolve(&rates, &[], None, date(2025, 7, 1)).unwrap().name, "new");
    assert!(resolve(&rates, &[], None, date(2024, 12, 31)).is_none());
}

#[test]
fn split_and_single_component_rates_agree_on_the_total() {
    let split = rate(None, None, "GST 18", vec![("CGST", dec!(9)), ("SGST", dec!(9))]);
    let single = rate(None, None, "GST 18", vec![("IGST", dec!(18))]);

    let a = tax_engine::calculate(dec!(9000), &split);
    let b = tax_engine::calculate(dec!(9000), &single);

    assert_eq!(a.total_tax, dec!(1620));
    assert_eq!(b.total_tax, dec!(1620));
    assert_eq!(a.components.len(), 2);
    assert_eq!(b.components.len(), 1);
    assert_eq!(a.components[0].amount, dec!(810));
    assert_eq!(a.components[1].amount, dec!(810));
}

#[test]
fn component_amounts_round_half_up() {
    // 333.33 * 9% = 29.9997, rounds to 30.00; the total is the sum of
    // the rounded parts, not a rounding of the raw sum.
    let split = rate(None, None, "GST 18", vec![("CGST", dec!(9)), ("SGST", dec!(9))]);
    let breakdown = tax_engine::calculate(dec!(333.33), &split);
    assert_eq!(breakdown.components[0].amount, dec!(30.00));
    assert_eq!(breakdown.total_tax, dec!(60.00));

    // Midpoint rounds away from zero: 0.125 -> 0.13.
    assert_eq!(tax_engine::round_money(dec!(0.125)), dec!(0.13));
}

#[test]
fn exempt_and_zero_rated_are_distinct_zero_outcomes() {
    let exempt = TaxBreakdown::exempt();
    let zero = TaxBreakdown::zero_rated();
    assert_eq!(exempt.total_tax, Decimal::ZERO);
    assert_eq!(zero.total_tax, Decimal::ZERO);
    assert_eq!(exempt.treatment, TaxTreatment::Exempt);
    assert_eq!(zero.treatment, TaxTreatment::ZeroRated);
}

#[test]
fn totals_cap_the_discount_at_the_subtotal() {
    let items = vec![item("A", dec!(1), dec!(100))];
    let totals = compute_totals(&items, dec!(150), false, false, None);
    assert_eq!(totals.discount_amount, dec!(100));
    assert_eq!(totals.taxable_amount, Decimal::ZERO);
    assert_eq!(totals.total_amount, Decimal::ZERO);
}

#[test]
fn exempt_takes_precedence_over_zero_rated() {
    let items = vec![item("A", dec!(1), dec!(100))];
    let totals = compute_totals(&items, Decimal::ZERO, true, true, None);
    assert_eq!(totals.tax.treatment, TaxTreatment::Exempt);
}

#[tokio::test]
async fn quotation_totals_with_a_configured_framework() {
    let h = harness();
    let actor_id = Uuid::new_v4();

    let country = h
        .tax_config
        .create_country(
            CreateCountry {
                code: "IN".to_string(),
                name: "India".to_string(),
            },
            actor_id,
        )
        .await
        .unwrap();
    let framework = h
        .tax_config
        .create_framework(
            CreateTaxFramework {
                country_id: country.country_id,
                name: "GST".to_string(),
                component_names: vec!["CGST".to_string(), "SGST".to_string()],
            },
            actor_id,
        )
        .await
        .unwrap();
    h.tax_config
        .create_tax_rate(
            CreateTaxRate {
                framework_id: framework.framework_id,
                jurisdiction_id: None,
                category_id: None,
                name: "GST 18".to_string(),
                rate: dec!(18),
                is_exempt: false,
                is_zero_rated: false,
                effective_from: date(2025, 1, 1),
                effective_to: None,
                components: vec![
                    TaxRateComponent {
                        name: "CGST".to_string(),
                        rate: dec!(9),
                    },
                    TaxRateComponent {
                        name: "SGST".to_string(),
                        rate: dec!(9),
                    },
                ],
            },
            actor_id,
        )
        .await
        .unwrap();

    let mut input = draft_input(actor_id, vec![item("Implementation", dec!(1), dec!(10000))]);
    input.discount_percentage = dec!(10);
    input.tax = TaxContext {
        country_id: Some(country.country_id),
        ..TaxContext::default()
    };

    let view = h.quotations.create(input).await.unwrap();
    let q = &view.quotation;

    assert_eq!(q.sub_total, dec!(10000));
    assert_eq!(q.discount_amount, dec!(1000));
    assert_eq!(q.taxable_amount, dec!(9000));
    assert_eq!(q.total_tax, dec!(1620));
    assert_eq!(q.total_amount, dec!(10620));

    let components = q.tax_breakdown["components"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["name"], "CGST");

    // The calculation itself left an audit trail.
    let audit = h.store.audit_entries().await;
    assert!(audit.iter().any(|e| e.action == "tax_calculated"));
}

#[tokio::test]
async fn exempt_quotation_skips_tax_entirely() {
    let h = harness();
    let owner = Uuid::new_v4();

    let mut input = draft_input(owner, vec![item("A", dec!(1), dec!(500))]);
    input.tax = TaxContext {
        tax_exempt: true,
        ..TaxContext::default()
    };

    let view = h.quotations.create(input).await.unwrap();
    assert_eq!(view.quotation.status(), QuotationStatus::Draft);
    assert!(view.quotation.tax_exempt);
    assert_eq!(view.quotation.total_tax, Decimal::ZERO);
    assert_eq!(view.quotation.total_amount, dec!(500));
    assert_eq!(view.quotation.tax_breakdown["treatment"], "exempt");

    // Still fetchable by the owner with intact flags.
    let fetched = h
        .quotations
        .get(view.quotation.quotation_id, &member(owner))
        .await
        .unwrap();
    assert!(fetched.quotation.tax_exempt);
}

fn decimal_in_cents(max_units: i64) -> impl Strategy<Value = Decimal> {
    (0..max_units * 100).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    /// The displayed breakdown always adds up to the displayed total.
    #[test]
    fn breakdown_components_sum_to_total_tax(
        base in decimal_in_cents(1_000_000),
        component_rates in proptest::collection::vec(1u32..2500, 1..5)
    ) {
        let components: Vec<(String, Decimal)> = component_rates
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("C{i}"), Decimal::new(*r as i64, 2)))
            .collect();
        let named: Vec<(&str, Decimal)> =
            components.iter().map(|(n, r)| (n.as_str(), *r)).collect();
        let rate = rate(None, None, "prop", named);

        let breakdown = tax_engine::calculate(base, &rate);
        let summed: Decimal = breakdown.components.iter().map(|c| c.amount).sum();
        prop_assert_eq!(summed, breakdown.total_tax);
        for c in &breakdown.components {
            // Rounded to the minor unit.
            prop_assert_eq!(c.amount, tax_engine::round_money(c.amount));
        }
    }

    /// Totals identities hold for arbitrary discounts, including >100%.
    #[test]
    fn totals_identities(
        unit_rate in decimal_in_cents(100_000),
        discount in 0u32..200
    ) {
        let items = vec![item("A", dec!(1), unit_rate)];
        let totals = compute_totals(&items, Decimal::from(discount), false, false, None);
        prop_assert!(totals.discount_amount <= totals.sub_total);
        prop_assert!(totals.taxable_amount >= Decimal::ZERO);
        prop_assert_eq!(
            totals.taxable_amount,
            totals.sub_total - totals.discount_amount
        );
        prop_assert_eq!(totals.total_amount, totals.taxable_amount + totals.tax.total_tax);
    }

    /// Two intervals accepted by the overlap validator never intersect.
    #[test]
    fn overlap_validator_is_symmetric(
        a_start in 0i64..1000, a_len in 0i64..500,
        b_start in 0i64..1000, b_len in 0i64..500
    ) {
        let base = date(2020, 1, 1);
        let a_from = base + chrono::Duration::days(a_start);
        let a_to = Some(a_from + chrono::Duration::days(a_len));
        let b_from = base + chrono::Duration::days(b_start);
        let b_to = Some(b_from + chrono::Duration::days(b_len));

        let existing = vec![TaxRate {
            effective_from: a_from,
            effective_to: a_to,
            ..rate(None, None, "a", vec![("GST", dec!(18))])
        }];

        let forward = validate_no_overlap(&existing, None, None, b_from, b_to).is_ok();

        let reversed = vec![TaxRate {
            effective_from: b_from,
            effective_to: b_to,
            ..rate(None, None, "b", vec![("GST", dec!(18))])
        }];
        let backward = validate_no_overlap(&reversed, None, None, a_from, a_to).is_ok();

        prop_assert_eq!(forward, backward);
        // Disjoint iff one ends strictly before the other starts.
        let disjoint = a_to.unwrap() < b_from || b_to.unwrap() < a_from;
        prop_assert_eq!(forward, disjoint);
    }
}
