//! Creation, numbering, updates and quote-to-purchase-order conversion.
//!
//! Company references are weak: deleting a company never touches the
//! documents that point at it, and reads resolve a dangling reference to
//! no company at all. The same holds for a purchase order's `quote_id`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::model::{
    BillTo, Company, CompanySummary, LineItem, PoStatus, PurchaseOrder, PurchaseOrderView, Quote,
    QuoteView,
};
use crate::store::{Collection, PurchaseOrderRow, QuoteRow, RecordStore};
use crate::totals::{self, DEFAULT_VAT_RATE};

pub const QUOTE_PREFIX: &str = "Q";
pub const PO_PREFIX: &str = "PO";

/// Default display number: `<prefix>-<unix millis>`.
///
/// Two documents created in the same millisecond receive the same number.
/// Numbers are for display and cross-reference only; ids are the keys.
pub fn default_number(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.timestamp_millis())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn supplied(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct CompanyInput {
    pub name: String,
    pub logo: String,
    pub signature: String,
    pub seal: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyPatch {
    pub name: Option<String>,
    pub logo: Option<String>,
    pub signature: Option<String>,
    pub seal: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QuoteInput {
    pub company_id: String,
    pub quote_number: Option<String>,
    pub po_number: Option<String>,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    pub vat_rate: Option<f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Default)]
pub struct QuotePatch {
    pub company_id: Option<String>,
    pub quote_number: Option<String>,
    pub po_number: Option<Option<String>>,
    pub bill_to: Option<BillTo>,
    pub items: Option<Vec<LineItem>>,
    pub vat_rate: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderInput {
    pub company_id: String,
    pub quote_id: Option<String>,
    pub po_number: Option<String>,
    pub quote_number: Option<String>,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    pub vat_rate: Option<f64>,
    pub notes: String,
    pub status: Option<PoStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderPatch {
    pub company_id: Option<String>,
    pub po_number: Option<String>,
    pub quote_number: Option<Option<String>>,
    pub bill_to: Option<BillTo>,
    pub items: Option<Vec<LineItem>>,
    pub vat_rate: Option<f64>,
    pub notes: Option<String>,
    pub status: Option<PoStatus>,
}

/// Record counts shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub companies: usize,
    pub quotes: usize,
    pub purchase_orders: usize,
    /// Quotes per company id; dangling references are not counted.
    pub quotes_by_company: HashMap<String, usize>,
    /// (count, summed total amount) per status.
    pub orders_by_status: HashMap<PoStatus, (usize, f64)>,
}

pub struct Ledger<S> {
    store: S,
    default_vat_rate: f64,
}

impl<S: RecordStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store, default_vat_rate: DEFAULT_VAT_RATE }
    }

    pub fn with_default_vat_rate(mut self, rate: f64) -> Self {
        self.default_vat_rate = rate;
        self
    }

    pub fn default_vat_rate(&self) -> f64 {
        self.default_vat_rate
    }

    // ==========================================
    // Companies
    // ==========================================

    pub fn list_companies(&self) -> Result<Vec<Company>, LedgerError> {
        Ok(self.store.list()?)
    }

    pub fn get_company(&self, id: &str) -> Result<Company, LedgerError> {
        Ok(self.store.get(id)?)
    }

    pub fn create_company(&self, input: CompanyInput) -> Result<Company, LedgerError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::validation("company name is required"));
        }
        let now = Utc::now();
        let company = Company {
            id: new_id(),
            name,
            logo: input.logo,
            signature: input.signature,
            seal: input.seal,
            address: input.address,
            phone: input.phone,
            email: input.email,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&company)?;
        info!(id = %company.id, name = %company.name, "company created");
        Ok(company)
    }

    pub fn update_company(&self, id: &str, patch: CompanyPatch) -> Result<Company, LedgerError> {
        let mut company: Company = self.store.get(id)?;
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(LedgerError::validation("company name is required"));
            }
            company.name = name;
        }
        let fields = [
            (patch.logo, &mut company.logo),
            (patch.signature, &mut company.signature),
            (patch.seal, &mut company.seal),
            (patch.address, &mut company.address),
            (patch.phone, &mut company.phone),
            (patch.email, &mut company.email),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        company.updated_at = Utc::now();
        self.store.replace(&company)?;
        info!(id = %company.id, "company updated");
        Ok(company)
    }

    fn company_detail(&self, company_id: &str) -> Result<Option<CompanySummary>, StoreError> {
        let company: Option<Company> = self.store.find(company_id)?;
        Ok(company.as_ref().map(CompanySummary::detailed))
    }

    fn company_index(&self) -> Result<HashMap<String, CompanySummary>, StoreError> {
        Ok(self
            .store
            .list::<Company>()?
            .iter()
            .map(|c| (c.id.clone(), CompanySummary::brief(c)))
            .collect())
    }

    fn check_company_ref(&self, company_id: &str) -> Result<String, LedgerError> {
        let company_id = company_id.trim();
        if company_id.is_empty() {
            return Err(LedgerError::validation("a company must be selected"));
        }
        if self.store.find::<Company>(company_id)?.is_none() {
            warn!(company_id, "document references a company that does not exist");
        }
        Ok(company_id.to_string())
    }

    // ==========================================
    // Quotes
    // ==========================================

    pub fn list_quotes(&self) -> Result<Vec<QuoteView>, LedgerError> {
        let companies = self.company_index()?;
        Ok(self
            .store
            .list::<QuoteRow>()?
            .into_iter()
            .filter_map(|row| match row.decode() {
                Ok(quote) => {
                    let company = companies.get(&quote.company_id).cloned();
                    Some(QuoteView { quote, company })
                }
                Err(e) => {
                    warn!(error = %e, "skipping quote with unreadable items");
                    None
                }
            })
            .collect())
    }

    pub fn get_quote(&self, id: &str) -> Result<QuoteView, LedgerError> {
        let quote = self.load_quote(id)?;
        let company = self.company_detail(&quote.company_id)?;
        Ok(QuoteView { quote, company })
    }

    fn load_quote(&self, id: &str) -> Result<Quote, LedgerError> {
        Ok(self.store.get::<QuoteRow>(id)?.decode()?)
    }

    pub fn create_quote(&self, input: QuoteInput) -> Result<Quote, LedgerError> {
        let company_id = self.check_company_ref(&input.company_id)?;
        let now = Utc::now();
        let mut items = input.items;
        let vat_rate = input.vat_rate.unwrap_or(self.default_vat_rate);
        let totals = totals::recompute(&mut items, vat_rate);

        let quote = Quote {
            id: new_id(),
            company_id,
            quote_number: supplied(input.quote_number).unwrap_or_else(|| default_number(QUOTE_PREFIX, now)),
            po_number: supplied(input.po_number),
            bill_to: input.bill_to,
            items,
            vat_rate,
            totals,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&QuoteRow::encode(&quote)?)?;
        info!(id = %quote.id, number = %quote.quote_number, total = quote.totals.total_amount, "quote created");
        Ok(quote)
    }

    pub fn update_quote(&self, id: &str, patch: QuotePatch) -> Result<Quote, LedgerError> {
        let mut quote = self.load_quote(id)?;
        if let Some(company_id) = patch.company_id {
            quote.company_id = self.check_company_ref(&company_id)?;
        }
        if let Some(number) = patch.quote_number {
            quote.quote_number = supplied(Some(number))
                .ok_or_else(|| LedgerError::validation("quote number cannot be blank"))?;
        }
        if let Some(po_number) = patch.po_number {
            quote.po_number = supplied(po_number);
        }
        if let Some(bill_to) = patch.bill_to {
            quote.bill_to = bill_to;
        }
        if let Some(items) = patch.items {
            quote.items = items;
        }
        if let Some(rate) = patch.vat_rate {
            quote.vat_rate = rate;
        }
        if let Some(notes) = patch.notes {
            quote.notes = notes;
        }
        quote.totals = totals::recompute(&mut quote.items, quote.vat_rate);
        quote.updated_at = Utc::now();

        self.store.replace(&QuoteRow::encode(&quote)?)?;
        info!(id = %quote.id, "quote updated");
        Ok(quote)
    }

    // ==========================================
    // Purchase orders
    // ==========================================

    pub fn list_purchase_orders(&self) -> Result<Vec<PurchaseOrderView>, LedgerError> {
        let companies = self.company_index()?;
        Ok(self
            .store
            .list::<PurchaseOrderRow>()?
            .into_iter()
            .filter_map(|row| match row.decode() {
                Ok(order) => {
                    let company = companies.get(&order.company_id).cloned();
                    Some(PurchaseOrderView { order, company })
                }
                Err(e) => {
                    warn!(error = %e, "skipping purchase order with unreadable items");
                    None
                }
            })
            .collect())
    }

    pub fn get_purchase_order(&self, id: &str) -> Result<PurchaseOrderView, LedgerError> {
        let order = self.load_purchase_order(id)?;
        let company = self.company_detail(&order.company_id)?;
        Ok(PurchaseOrderView { order, company })
    }

    fn load_purchase_order(&self, id: &str) -> Result<PurchaseOrder, LedgerError> {
        Ok(self.store.get::<PurchaseOrderRow>(id)?.decode()?)
    }

    pub fn create_purchase_order(&self, input: PurchaseOrderInput) -> Result<PurchaseOrder, LedgerError> {
        let company_id = self.check_company_ref(&input.company_id)?;
        if input.po_number.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(LedgerError::validation("PO number cannot be blank"));
        }
        let now = Utc::now();
        let mut items = input.items;
        let vat_rate = input.vat_rate.unwrap_or(self.default_vat_rate);
        let totals = totals::recompute(&mut items, vat_rate);

        let order = PurchaseOrder {
            id: new_id(),
            company_id,
            quote_id: supplied(input.quote_id),
            po_number: supplied(input.po_number).unwrap_or_else(|| default_number(PO_PREFIX, now)),
            quote_number: supplied(input.quote_number),
            bill_to: input.bill_to,
            items,
            vat_rate,
            totals,
            notes: input.notes,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.insert_purchase_order(&order)?;
        Ok(order)
    }

    fn insert_purchase_order(&self, order: &PurchaseOrder) -> Result<(), LedgerError> {
        self.store.insert(&PurchaseOrderRow::encode(order)?)?;
        info!(
            id = %order.id,
            number = %order.po_number,
            quote_id = order.quote_id.as_deref().unwrap_or("-"),
            "purchase order created"
        );
        Ok(())
    }

    pub fn update_purchase_order(&self, id: &str, patch: PurchaseOrderPatch) -> Result<PurchaseOrder, LedgerError> {
        let mut order = self.load_purchase_order(id)?;
        if let Some(company_id) = patch.company_id {
            order.company_id = self.check_company_ref(&company_id)?;
        }
        if let Some(number) = patch.po_number {
            order.po_number = supplied(Some(number))
                .ok_or_else(|| LedgerError::validation("PO number cannot be blank"))?;
        }
        if let Some(quote_number) = patch.quote_number {
            order.quote_number = supplied(quote_number);
        }
        if let Some(bill_to) = patch.bill_to {
            order.bill_to = bill_to;
        }
        if let Some(items) = patch.items {
            order.items = items;
        }
        if let Some(rate) = patch.vat_rate {
            order.vat_rate = rate;
        }
        if let Some(notes) = patch.notes {
            order.notes = notes;
        }
        if let Some(status) = patch.status {
            order.status = status;
        }
        order.totals = totals::recompute(&mut order.items, order.vat_rate);
        order.updated_at = Utc::now();

        self.store.replace(&PurchaseOrderRow::encode(&order)?)?;
        info!(id = %order.id, status = %order.status, "purchase order updated");
        Ok(order)
    }

    /// Sets the status unconditionally. Status is advisory, so there is no
    /// transition graph to consult.
    pub fn set_status(&self, id: &str, status: PoStatus) -> Result<PurchaseOrder, LedgerError> {
        let mut order = self.load_purchase_order(id)?;
        let previous = order.status;
        order.status = status;
        order.updated_at = Utc::now();
        self.store.replace(&PurchaseOrderRow::encode(&order)?)?;
        info!(id = %order.id, from = %previous, to = %status, "purchase order status set");
        Ok(order)
    }

    /// Derives a new pending purchase order from a quote.
    ///
    /// Money fields are copied from the quote as they stand, not
    /// recomputed. The quote itself is not modified, and converting the
    /// same quote again yields another independent order.
    pub fn convert_quote(&self, quote_id: &str) -> Result<PurchaseOrder, LedgerError> {
        let quote = self.load_quote(quote_id)?;
        let now = Utc::now();
        let order = PurchaseOrder {
            id: new_id(),
            company_id: quote.company_id,
            quote_id: Some(quote.id),
            po_number: default_number(PO_PREFIX, now),
            quote_number: Some(quote.quote_number),
            bill_to: quote.bill_to,
            items: quote.items,
            vat_rate: quote.vat_rate,
            totals: quote.totals,
            notes: quote.notes,
            status: PoStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.insert_purchase_order(&order)?;
        Ok(order)
    }

    // ==========================================
    // Shared
    // ==========================================

    /// Deletes one record. Nothing referencing it is touched.
    pub fn delete(&self, collection: Collection, id: &str) -> Result<bool, LedgerError> {
        let removed = self.store.delete(collection, id)?;
        if removed {
            info!(%collection, id, "record deleted");
        } else {
            warn!(%collection, id, "delete requested for a record that does not exist");
        }
        Ok(removed)
    }

    pub fn overview(&self) -> Result<Overview, LedgerError> {
        let companies = self.list_companies()?;
        let quotes = self.store.list::<QuoteRow>()?;
        let orders = self.store.list::<PurchaseOrderRow>()?;

        let mut overview = Overview {
            companies: companies.len(),
            quotes: quotes.len(),
            purchase_orders: orders.len(),
            ..Overview::default()
        };
        for company in &companies {
            let count = quotes.iter().filter(|q| q.company_id == company.id).count();
            overview.quotes_by_company.insert(company.id.clone(), count);
        }
        for order in &orders {
            let entry = overview.orders_by_status.entry(order.status).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += order.total_amount;
        }
        Ok(overview)
    }
}
