//! Line-item and document totals.
//!
//! Pure functions only. Input that is missing, unparseable or non-finite
//! degrades to zero instead of failing; negative amounts pass through.

use serde::Serialize;

use crate::model::LineItem;

/// Default VAT percentage for new documents.
pub const DEFAULT_VAT_RATE: f64 = 5.0;

/// The derived money fields of a quote or purchase order.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub vat_amount: f64,
    pub total_amount: f64,
}

pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Parses user-typed quantities, prices and rates; anything unreadable is 0.
pub fn parse_amount(input: &str) -> f64 {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',' && *c != '$').collect();
    cleaned.parse::<f64>().map(sanitize).unwrap_or(0.0)
}

/// `quantity × price`; a product that overflows counts as 0, like any
/// other non-finite amount.
pub fn line_total(quantity: f64, price: f64) -> f64 {
    sanitize(sanitize(quantity) * sanitize(price))
}

/// Computes subtotal, VAT and grand total in one step.
///
/// The subtotal sums the stored per-item totals, so callers must keep each
/// item's `total` in step with its quantity and price (see [`LineItem::set_quantity`]).
pub fn compute(items: &[LineItem], vat_rate: f64) -> Totals {
    let subtotal: f64 = items.iter().map(|item| sanitize(item.total)).sum();
    let vat_amount = subtotal * sanitize(vat_rate) / 100.0;
    Totals {
        subtotal,
        vat_amount,
        total_amount: subtotal + vat_amount,
    }
}

/// Recomputes every item total and the document totals from scratch.
pub fn recompute(items: &mut [LineItem], vat_rate: f64) -> Totals {
    for item in items.iter_mut() {
        item.total = line_total(item.quantity, item.price);
    }
    compute(items, vat_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn single_item_at_five_percent() {
        let items = vec![LineItem::new("A", 2.0, 10.0)];
        let totals = compute(&items, 5.0);
        assert_eq!(totals.subtotal, 20.0);
        assert!((totals.vat_amount - 1.0).abs() < EPS);
        assert!((totals.total_amount - 21.0).abs() < EPS);
    }

    #[test]
    fn subtotal_includes_zero_rows_and_ignores_order() {
        let items = vec![
            LineItem::new("A", 3.0, 2.5),
            LineItem::new("free", 0.0, 99.0),
            LineItem::new("B", 1.0, 0.0),
            LineItem::new("C", 4.0, 1.25),
        ];
        let mut reversed = items.clone();
        reversed.reverse();
        let forward = compute(&items, 7.5);
        let backward = compute(&reversed, 7.5);
        assert!((forward.subtotal - 12.5).abs() < EPS);
        assert!((forward.subtotal - backward.subtotal).abs() < EPS);
        assert!((forward.vat_amount - 12.5 * 7.5 / 100.0).abs() < EPS);
        assert!((forward.total_amount - (forward.subtotal + forward.vat_amount)).abs() < EPS);
    }

    #[test]
    fn empty_list_is_all_zero() {
        assert_eq!(compute(&[], 5.0), Totals::default());
    }

    #[test]
    fn zero_rate_means_no_vat() {
        let totals = compute(&[LineItem::new("A", 1.0, 100.0)], 0.0);
        assert_eq!(totals.vat_amount, 0.0);
        assert_eq!(totals.total_amount, 100.0);
    }

    #[test]
    fn unparseable_input_reads_as_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);
        assert_eq!(parse_amount(" 12.5 "), 12.5);
        assert_eq!(parse_amount("$1,250.00"), 1250.0);
    }

    #[test]
    fn negative_amounts_are_not_clamped() {
        let totals = compute(&[LineItem::new("refund", 1.0, -10.0)], 10.0);
        assert_eq!(totals.subtotal, -10.0);
        assert!((totals.total_amount + 11.0).abs() < EPS);
    }

    #[test]
    fn non_finite_values_degrade_to_zero() {
        assert_eq!(line_total(f64::NAN, 3.0), 0.0);
        assert_eq!(line_total(2.0, f64::INFINITY), 0.0);
        assert_eq!(compute(&[LineItem::new("A", 1.0, 10.0)], f64::NAN).vat_amount, 0.0);
    }

    #[test]
    fn overflowing_line_agrees_with_subtotal() {
        let items = vec![LineItem::new("big", 1e200, 1e200), LineItem::new("A", 2.0, 10.0)];
        assert_eq!(items[0].total, 0.0);
        let totals = compute(&items, 5.0);
        let sum_of_lines: f64 = items.iter().map(|i| i.total).sum();
        assert_eq!(totals.subtotal, sum_of_lines);
        assert_eq!(totals.subtotal, 20.0);
    }

    #[test]
    fn recompute_repairs_stale_item_totals() {
        let mut items = vec![LineItem { description: "A".into(), quantity: 2.0, price: 10.0, total: 0.0 }];
        let totals = recompute(&mut items, 5.0);
        assert_eq!(items[0].total, 20.0);
        assert_eq!(totals.subtotal, 20.0);
    }
}
