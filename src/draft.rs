//! Editor state for one quote or purchase order being authored.
//!
//! A `Draft` is owned by the editing session and threaded through
//! [`Draft::apply`]; every edit returns a new draft whose totals already
//! match its items and VAT rate.

use crate::model::LineItem;
use crate::totals::{self, Totals};

#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    items: Vec<LineItem>,
    vat_rate: f64,
    totals: Totals,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    AddItem,
    RemoveItem(usize),
    Description(usize, String),
    Quantity(usize, f64),
    Price(usize, f64),
    VatRate(f64),
}

impl Draft {
    /// A new document: one blank row.
    pub fn new(vat_rate: f64) -> Self {
        Self::from_parts(vec![LineItem::blank()], vat_rate)
    }

    /// Loads an existing document for editing.
    pub fn from_parts(mut items: Vec<LineItem>, vat_rate: f64) -> Self {
        let totals = totals::recompute(&mut items, vat_rate);
        Self { items, vat_rate, totals }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn vat_rate(&self) -> f64 {
        self.vat_rate
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn into_parts(self) -> (Vec<LineItem>, f64) {
        (self.items, self.vat_rate)
    }

    /// Applies one edit. Out-of-range indexes are ignored, and the last
    /// remaining row cannot be removed.
    pub fn apply(mut self, edit: Edit) -> Self {
        match edit {
            Edit::AddItem => self.items.push(LineItem::blank()),
            Edit::RemoveItem(index) => {
                if self.items.len() > 1 && index < self.items.len() {
                    self.items.remove(index);
                }
            }
            Edit::Description(index, text) => {
                if let Some(item) = self.items.get_mut(index) {
                    item.description = text;
                }
                // Totals cannot change.
                return self;
            }
            Edit::Quantity(index, quantity) => {
                if let Some(item) = self.items.get_mut(index) {
                    item.set_quantity(quantity);
                }
            }
            Edit::Price(index, price) => {
                if let Some(item) = self.items.get_mut(index) {
                    item.set_price(price);
                }
            }
            Edit::VatRate(rate) => self.vat_rate = rate,
        }
        self.totals = totals::compute(&self.items, self.vat_rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Draft {
        Draft::from_parts(vec![LineItem::new("A", 2.0, 10.0), LineItem::new("B", 1.0, 5.0)], 5.0)
    }

    #[test]
    fn new_draft_has_one_blank_row() {
        let draft = Draft::new(5.0);
        assert_eq!(draft.items().len(), 1);
        assert_eq!(draft.items()[0].quantity, 1.0);
        assert_eq!(draft.totals(), Totals::default());
    }

    #[test]
    fn quantity_edit_updates_item_and_document_totals() {
        let draft = sample().apply(Edit::Quantity(0, 3.0));
        assert_eq!(draft.items()[0].total, 30.0);
        let totals = draft.totals();
        assert_eq!(totals.subtotal, 35.0);
        assert!((totals.vat_amount - 1.75).abs() < 1e-9);
        assert!((totals.total_amount - 36.75).abs() < 1e-9);
    }

    #[test]
    fn price_edit_updates_totals() {
        let draft = sample().apply(Edit::Price(1, 15.0));
        assert_eq!(draft.items()[1].total, 15.0);
        assert_eq!(draft.totals().subtotal, 35.0);
    }

    #[test]
    fn description_edit_leaves_totals_alone() {
        let before = sample();
        let after = before.clone().apply(Edit::Description(0, "Renamed".into()));
        assert_eq!(after.items()[0].description, "Renamed");
        assert_eq!(after.totals(), before.totals());
    }

    #[test]
    fn vat_rate_edit_recomputes_vat_and_total() {
        let draft = sample().apply(Edit::VatRate(20.0));
        assert_eq!(draft.vat_rate(), 20.0);
        assert!((draft.totals().vat_amount - 5.0).abs() < 1e-9);
        assert!((draft.totals().total_amount - 30.0).abs() < 1e-9);
    }

    #[test]
    fn removing_rows_keeps_the_last_one() {
        let draft = sample().apply(Edit::RemoveItem(0));
        assert_eq!(draft.items().len(), 1);
        assert_eq!(draft.totals().subtotal, 5.0);

        let draft = draft.apply(Edit::RemoveItem(0));
        assert_eq!(draft.items().len(), 1);

        let draft = draft.apply(Edit::Quantity(0, 0.0));
        assert_eq!(draft.totals().subtotal, 0.0);
        assert_eq!(draft.totals().total_amount, 0.0);
    }

    #[test]
    fn added_row_is_blank_and_counts_as_zero() {
        let before = sample();
        let after = before.clone().apply(Edit::AddItem);
        assert_eq!(after.items().len(), 3);
        assert_eq!(after.totals(), before.totals());
    }

    #[test]
    fn out_of_range_edits_are_ignored() {
        let before = sample();
        let after = before.clone().apply(Edit::Price(9, 100.0)).apply(Edit::RemoveItem(9));
        assert_eq!(after, before);
    }
}
