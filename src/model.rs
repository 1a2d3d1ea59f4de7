use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::totals::{self, Totals};

/// Placeholder shown wherever a document's company reference no longer resolves.
pub const NO_COMPANY: &str = "No Company";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    // Images are self-contained data URLs; empty means "not set".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seal: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The company fields embedded alongside a quote or purchase order.
///
/// List reads carry only id, name and logo; single-record reads also fill
/// the contact block.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CompanySummary {
    pub id: String,
    pub name: String,
    pub logo: String,
    pub signature: String,
    pub seal: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl CompanySummary {
    pub fn brief(company: &Company) -> Self {
        Self {
            id: company.id.clone(),
            name: company.name.clone(),
            logo: company.logo.clone(),
            signature: String::new(),
            seal: String::new(),
            address: None,
            phone: None,
            email: None,
        }
    }

    pub fn detailed(company: &Company) -> Self {
        Self {
            signature: company.signature.clone(),
            seal: company.seal.clone(),
            address: Some(company.address.clone()),
            phone: Some(company.phone.clone()),
            email: Some(company.email.clone()),
            ..Self::brief(company)
        }
    }
}

/// One row of a document's item table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            price,
            total: totals::line_total(quantity, price),
        }
    }

    /// A fresh editor row.
    pub fn blank() -> Self {
        Self::new("", 1.0, 0.0)
    }

    pub fn set_quantity(&mut self, quantity: f64) {
        self.quantity = quantity;
        self.total = totals::line_total(self.quantity, self.price);
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
        self.total = totals::line_total(self.quantity, self.price);
    }
}

// Accepts numbers, numeric strings, null, or anything else (read as 0).
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => totals::sanitize(n),
        Some(Raw::Text(s)) => totals::parse_amount(&s),
        Some(Raw::Other(_)) | None => 0.0,
    })
}

/// Customer snapshot copied onto a document, independent of any company record.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BillTo {
    pub name: String,
    pub address: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub id: String,
    pub company_id: String,
    pub quote_number: String,
    pub po_number: Option<String>,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    pub vat_rate: f64,
    pub totals: Totals,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrder {
    pub id: String,
    pub company_id: String,
    pub quote_id: Option<String>,
    pub po_number: String,
    pub quote_number: Option<String>,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    pub vat_rate: f64,
    pub totals: Totals,
    pub notes: String,
    pub status: PoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase-order status. Advisory only: any value may follow any other.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PoStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl PoStatus {
    pub const ALL: [PoStatus; 4] = [Self::Pending, Self::Approved, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status '{0}' (expected pending, approved, completed or cancelled)")]
pub struct ParseStatusError(String);

impl FromStr for PoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Quote,
    PurchaseOrder,
}

impl DocumentKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Quote => "QUOTE",
            Self::PurchaseOrder => "PURCHASE ORDER",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::PurchaseOrder => "purchase order",
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Quote => "Quote",
            Self::PurchaseOrder => "PurchaseOrder",
        }
    }
}

/// A quote as read back from the store, with its company resolved.
#[derive(Debug, Clone)]
pub struct QuoteView {
    pub quote: Quote,
    pub company: Option<CompanySummary>,
}

#[derive(Debug, Clone)]
pub struct PurchaseOrderView {
    pub order: PurchaseOrder,
    pub company: Option<CompanySummary>,
}

impl QuoteView {
    pub fn company_name(&self) -> &str {
        self.company.as_ref().map_or(NO_COMPANY, |c| c.name.as_str())
    }
}

impl PurchaseOrderView {
    pub fn company_name(&self) -> &str {
        self.company.as_ref().map_or(NO_COMPANY, |c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Approved".parse::<PoStatus>().unwrap(), PoStatus::Approved);
        assert_eq!(" cancelled ".parse::<PoStatus>().unwrap(), PoStatus::Cancelled);
        assert!("shipped".parse::<PoStatus>().is_err());
    }

    #[test]
    fn status_defaults_to_pending() {
        assert_eq!(PoStatus::default(), PoStatus::Pending);
    }

    #[test]
    fn line_item_recomputes_total_on_edit() {
        let mut item = LineItem::new("Widget", 2.0, 10.0);
        assert_eq!(item.total, 20.0);
        item.set_quantity(3.0);
        assert_eq!(item.total, 30.0);
        item.set_price(1.5);
        assert_eq!(item.total, 4.5);
    }

    #[test]
    fn line_item_reads_missing_or_garbage_amounts_as_zero() {
        let items: Vec<LineItem> = serde_json::from_str(
            r#"[{"description":"A"},{"description":"B","quantity":"abc","price":null},{"quantity":"2","price":true}]"#,
        )
        .unwrap();
        assert_eq!(items[0].quantity, 0.0);
        assert_eq!(items[1].quantity, 0.0);
        assert_eq!(items[1].price, 0.0);
        assert_eq!(items[2].quantity, 2.0);
        assert_eq!(items[2].price, 0.0);
        assert_eq!(items[2].description, "");
    }

    #[test]
    fn summaries_differ_in_contact_detail() {
        let now = Utc::now();
        let company = Company {
            id: "c1".into(),
            name: "Acme".into(),
            logo: "data:image/png;base64,AA==".into(),
            signature: String::new(),
            seal: String::new(),
            address: "1 Main St".into(),
            phone: "555".into(),
            email: "a@acme.test".into(),
            created_at: now,
            updated_at: now,
        };
        let brief = CompanySummary::brief(&company);
        assert_eq!(brief.name, "Acme");
        assert!(brief.address.is_none());
        let full = CompanySummary::detailed(&company);
        assert_eq!(full.address.as_deref(), Some("1 Main St"));
        assert_eq!(full.logo, company.logo);
    }
}
