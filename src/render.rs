//! Turns a quote or purchase order into typst markup.
//!
//! The layout lives in a tera template (`templates/document.tera`); a copy
//! is written into the data root on first use so it can be customised.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tera::{Context, Tera, Value};
use tracing::info;

use crate::error::RenderError;
use crate::image;
use crate::model::{BillTo, CompanySummary, DocumentKind, LineItem, PurchaseOrderView, QuoteView};
use crate::totals::Totals;

const TEMPLATE_NAME: &str = "document.tera";

// Embed template at compile time to ensure availability
const DEFAULT_TEMPLATE: &str = include_str!("../templates/document.tera");

/// Page geometry for the single-page rule, in millimetres (A4 portrait).
///
/// Content up to `max_height_mm` tall is placed at full scale; taller
/// content is squeezed vertically to `scaled_height_mm`, offset by
/// `scaled_offset_mm` from the top edge.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct PageFit {
    pub page_width_mm: f64,
    pub max_height_mm: f64,
    pub scaled_height_mm: f64,
    pub scaled_offset_mm: f64,
}

impl PageFit {
    pub const A4: PageFit = PageFit {
        page_width_mm: 210.0,
        max_height_mm: 295.0,
        scaled_height_mm: 290.0,
        scaled_offset_mm: 5.0,
    };
}

/// Everything the layout needs from one document.
#[derive(Debug, Clone)]
pub struct Sheet<'a> {
    pub kind: DocumentKind,
    pub number: &'a str,
    pub cross_ref: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub bill_to: &'a BillTo,
    pub items: &'a [LineItem],
    pub vat_rate: f64,
    pub totals: Totals,
    pub notes: &'a str,
    pub company: Option<&'a CompanySummary>,
}

impl<'a> Sheet<'a> {
    pub fn quote(view: &'a QuoteView) -> Self {
        let quote = &view.quote;
        Self {
            kind: DocumentKind::Quote,
            number: &quote.quote_number,
            cross_ref: quote.po_number.as_deref(),
            created_at: quote.created_at,
            bill_to: &quote.bill_to,
            items: &quote.items,
            vat_rate: quote.vat_rate,
            totals: quote.totals,
            notes: &quote.notes,
            company: view.company.as_ref(),
        }
    }

    pub fn purchase_order(view: &'a PurchaseOrderView) -> Self {
        let order = &view.order;
        Self {
            kind: DocumentKind::PurchaseOrder,
            number: &order.po_number,
            cross_ref: order.quote_number.as_deref(),
            created_at: order.created_at,
            bill_to: &order.bill_to,
            items: &order.items,
            vat_rate: order.vat_rate,
            totals: order.totals,
            notes: &order.notes,
            company: view.company.as_ref(),
        }
    }

    /// The creation date as seen in the local timezone, matching listings.
    pub fn issue_date(&self) -> NaiveDate {
        self.created_at.with_timezone(&Local).date_naive()
    }

    /// `Quote_<number>_<date>.pdf` or `PurchaseOrder_<number>_<date>.pdf`.
    pub fn file_name(&self, date: NaiveDate) -> String {
        let number: String = self
            .number
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
            .collect();
        format!("{}_{}_{}.pdf", self.kind.file_prefix(), number, date.format("%Y-%m-%d"))
    }
}

#[derive(Serialize)]
struct CrossRef {
    label: &'static str,
    number: String,
}

#[derive(Serialize)]
struct CompanyBlock {
    name: String,
    address: String,
    phone: String,
    email: String,
    logo: Option<String>,
    signature: Option<String>,
    seal: Option<String>,
}

#[derive(Serialize)]
struct ItemRow {
    description: String,
    quantity: String,
    price: String,
    total: String,
}

#[derive(Serialize)]
struct DocumentContext {
    title: &'static str,
    noun: &'static str,
    number_label: &'static str,
    number: String,
    cross_ref: Option<CrossRef>,
    date: String,
    generated_on: String,
    company: CompanyBlock,
    bill_to: BillTo,
    items: Vec<ItemRow>,
    subtotal: String,
    vat_label: String,
    vat_amount: String,
    total: String,
    notes: String,
    fit: PageFit,
}

/// Typst source plus the image files it refers to by name.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub source: String,
    pub assets: Vec<(String, Vec<u8>)>,
}

impl RenderedDocument {
    pub const SOURCE_NAME: &'static str = "document.typ";

    /// Writes the source and its assets into `dir`, returning the source path.
    pub fn write_to(&self, dir: &Path) -> Result<std::path::PathBuf, RenderError> {
        for (name, bytes) in &self.assets {
            let path = dir.join(name);
            fs::write(&path, bytes).map_err(|source| RenderError::Io { path, source })?;
        }
        let path = dir.join(Self::SOURCE_NAME);
        fs::write(&path, &self.source).map_err(|source| RenderError::Io { path: path.clone(), source })?;
        Ok(path)
    }
}

/// Single display format for money: `$1,234.56`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// `Month D, YYYY`.
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Quotes a value as a typst string literal.
fn typst_str(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(Value::String(out))
}

pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Uses the built-in layout only.
    pub fn builtin() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?;
        Ok(Self::with_filters(tera))
    }

    /// Loads `<dir>/document.tera`, seeding it with the built-in layout
    /// when it does not exist yet.
    pub fn from_dir(dir: &Path) -> Result<Self, RenderError> {
        let path = dir.join(TEMPLATE_NAME);
        if !path.exists() {
            fs::create_dir_all(dir).map_err(|source| RenderError::Io { path: dir.to_path_buf(), source })?;
            fs::write(&path, DEFAULT_TEMPLATE).map_err(|source| RenderError::Io { path: path.clone(), source })?;
            info!(path = %path.display(), "initialized default document template");
        }
        let mut tera = Tera::default();
        tera.add_template_file(&path, Some(TEMPLATE_NAME))?;
        Ok(Self::with_filters(tera))
    }

    fn with_filters(mut tera: Tera) -> Self {
        tera.register_filter("typst_str", typst_str);
        Self { tera }
    }

    pub fn render(&self, sheet: &Sheet<'_>, today: NaiveDate) -> Result<RenderedDocument, RenderError> {
        let mut assets = Vec::new();
        let mut company = match sheet.company {
            Some(c) => CompanyBlock {
                name: c.name.clone(),
                address: c.address.clone().unwrap_or_default(),
                phone: c.phone.clone().unwrap_or_default(),
                email: c.email.clone().unwrap_or_default(),
                logo: None,
                signature: None,
                seal: None,
            },
            None => CompanyBlock {
                name: "Company Name".to_string(),
                address: String::new(),
                phone: String::new(),
                email: String::new(),
                logo: None,
                signature: None,
                seal: None,
            },
        };
        if let Some(c) = sheet.company {
            company.logo = embed("logo", &c.logo, &mut assets)?;
            company.signature = embed("signature", &c.signature, &mut assets)?;
            company.seal = embed("seal", &c.seal, &mut assets)?;
        }

        let bill_to = BillTo {
            name: if sheet.bill_to.name.trim().is_empty() {
                "Customer Name".to_string()
            } else {
                sheet.bill_to.name.clone()
            },
            ..sheet.bill_to.clone()
        };

        let cross_ref = sheet.cross_ref.filter(|n| !n.trim().is_empty()).map(|number| CrossRef {
            label: match sheet.kind {
                DocumentKind::Quote => "PO #:",
                DocumentKind::PurchaseOrder => "Quote #:",
            },
            number: number.to_string(),
        });

        let context_data = DocumentContext {
            title: sheet.kind.title(),
            noun: sheet.kind.noun(),
            number_label: match sheet.kind {
                DocumentKind::Quote => "Quote #:",
                DocumentKind::PurchaseOrder => "PO #:",
            },
            number: sheet.number.to_string(),
            cross_ref,
            date: format_long_date(sheet.issue_date()),
            generated_on: format_long_date(today),
            company,
            bill_to,
            items: sheet
                .items
                .iter()
                .map(|item| ItemRow {
                    description: item.description.clone(),
                    quantity: item.quantity.to_string(),
                    price: format_currency(item.price),
                    total: format_currency(item.total),
                })
                .collect(),
            subtotal: format_currency(sheet.totals.subtotal),
            vat_label: format!("VAT ({}%)", sheet.vat_rate),
            vat_amount: format_currency(sheet.totals.vat_amount),
            total: format_currency(sheet.totals.total_amount),
            notes: sheet.notes.to_string(),
            fit: PageFit::A4,
        };

        let context = Context::from_serialize(&context_data)?;
        let source = self.tera.render(TEMPLATE_NAME, &context)?;
        Ok(RenderedDocument { source, assets })
    }
}

// Decodes an inline image into an asset file; empty means "not set".
fn embed(role: &str, data_url: &str, assets: &mut Vec<(String, Vec<u8>)>) -> Result<Option<String>, RenderError> {
    if data_url.trim().is_empty() {
        return Ok(None);
    }
    let decoded = image::decode(data_url)?;
    let name = format!("{role}.{}", decoded.extension());
    assets.push((name.clone(), decoded.bytes));
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PoStatus, PurchaseOrder, Quote};
    use chrono::TimeZone;

    fn quote_view(company: Option<CompanySummary>) -> QuoteView {
        let created = Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap();
        QuoteView {
            quote: Quote {
                id: "q1".into(),
                company_id: "c1".into(),
                quote_number: "Q-1700000000000".into(),
                po_number: None,
                bill_to: BillTo { name: "Bob \"The\" Builder".into(), address: "2 Side St\nSpringfield".into(), contact: String::new() },
                items: vec![LineItem::new("A", 2.0, 10.0), LineItem::new("B", 1.5, 1000.0)],
                vat_rate: 5.0,
                totals: Totals { subtotal: 1520.0, vat_amount: 76.0, total_amount: 1596.0 },
                notes: String::new(),
                created_at: created,
                updated_at: created,
            },
            company,
        }
    }

    fn acme() -> CompanySummary {
        CompanySummary {
            id: "c1".into(),
            name: "Acme".into(),
            logo: image::encode("image/png", b"png-bytes"),
            signature: String::new(),
            seal: image::encode("image/jpeg", b"jpeg-bytes"),
            address: Some("1 Main St".into()),
            phone: Some("555-0100".into()),
            email: Some(String::new()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    #[test]
    fn currency_format() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(21.0), "$21.00");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-12.0), "-$12.00");
        assert_eq!(format_currency(-0.001), "$0.00");
    }

    #[test]
    fn file_names_follow_document_kind() {
        let view = quote_view(None);
        assert_eq!(Sheet::quote(&view).file_name(today()), "Quote_Q-1700000000000_2026-03-05.pdf");

        let order = PurchaseOrderView {
            order: PurchaseOrder {
                id: "p1".into(),
                company_id: "c1".into(),
                quote_id: None,
                po_number: "PO/2026/1".into(),
                quote_number: None,
                bill_to: BillTo::default(),
                items: Vec::new(),
                vat_rate: 5.0,
                totals: Totals::default(),
                notes: String::new(),
                status: PoStatus::Pending,
                created_at: view.quote.created_at,
                updated_at: view.quote.created_at,
            },
            company: None,
        };
        assert_eq!(Sheet::purchase_order(&order).file_name(today()), "PurchaseOrder_PO-2026-1_2026-03-05.pdf");
    }

    #[test]
    fn document_date_uses_the_local_calendar_day() {
        let mut view = quote_view(None);
        let late = Utc.with_ymd_and_hms(2026, 3, 4, 23, 30, 0).unwrap();
        view.quote.created_at = late;
        let sheet = Sheet::quote(&view);

        let local_day = late.with_timezone(&Local).date_naive();
        assert_eq!(sheet.issue_date(), local_day);
        let source = Renderer::builtin().unwrap().render(&sheet, today()).unwrap().source;
        assert!(source.contains(&format_long_date(local_day)));
    }

    #[test]
    fn renders_layout_with_company_and_totals() {
        let view = quote_view(Some(acme()));
        let doc = Renderer::builtin().unwrap().render(&Sheet::quote(&view), today()).unwrap();

        assert!(doc.source.contains(r#"#"QUOTE""#));
        assert!(doc.source.contains(r#"#"Acme""#));
        assert!(doc.source.contains(r#"Phone: #"555-0100""#));
        assert!(!doc.source.contains("Email:"));
        assert!(doc.source.contains(r#"#"$1,596.00""#));
        assert!(doc.source.contains(r#"#"VAT (5%)""#));
        assert!(doc.source.contains(r#"#"March 4, 2026""#));
        assert!(doc.source.contains(r#"Generated on #"March 5, 2026""#));
        assert!(doc.source.contains(r#"#"quote" is valid for 30 days"#));
        assert!(doc.source.contains("Company Seal"));
    }

    #[test]
    fn images_become_asset_files() {
        let view = quote_view(Some(acme()));
        let doc = Renderer::builtin().unwrap().render(&Sheet::quote(&view), today()).unwrap();

        let names: Vec<&str> = doc.assets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["logo.png", "seal.jpg"]);
        assert_eq!(doc.assets[0].1, b"png-bytes");
        assert!(doc.source.contains(r#"image("logo.png""#));
        assert!(doc.source.contains(r#"image("seal.jpg""#));
    }

    #[test]
    fn user_text_is_escaped() {
        let view = quote_view(None);
        let doc = Renderer::builtin().unwrap().render(&Sheet::quote(&view), today()).unwrap();
        assert!(doc.source.contains(r#"#"Bob \"The\" Builder""#));
        assert!(doc.source.contains(r#"#"2 Side St\nSpringfield""#));
    }

    #[test]
    fn missing_company_uses_placeholders() {
        let view = quote_view(None);
        let doc = Renderer::builtin().unwrap().render(&Sheet::quote(&view), today()).unwrap();
        assert!(doc.source.contains(r#"#"Company Name""#));
        assert!(doc.assets.is_empty());
        assert!(!doc.source.contains("Company Seal"));
    }

    #[test]
    fn purchase_order_shows_quote_reference() {
        let view = quote_view(None);
        let order = PurchaseOrderView {
            order: PurchaseOrder {
                id: "p1".into(),
                company_id: "c1".into(),
                quote_id: Some("q1".into()),
                po_number: "PO-1".into(),
                quote_number: Some("Q-1".into()),
                bill_to: BillTo::default(),
                items: view.quote.items.clone(),
                vat_rate: 5.0,
                totals: view.quote.totals,
                notes: "Deliver by Friday".into(),
                status: PoStatus::Approved,
                created_at: view.quote.created_at,
                updated_at: view.quote.created_at,
            },
            company: None,
        };
        let doc = Renderer::builtin().unwrap().render(&Sheet::purchase_order(&order), today()).unwrap();
        assert!(doc.source.contains(r#"#"PURCHASE ORDER""#));
        assert!(doc.source.contains(r#"*#"PO #:"* #"PO-1""#));
        assert!(doc.source.contains(r#"*#"Quote #:"* #"Q-1""#));
        assert!(doc.source.contains(r#"#"Customer Name""#));
        assert!(doc.source.contains("Notes & Remarks:"));
    }

    #[test]
    fn page_fit_constants_reach_the_template() {
        let view = quote_view(None);
        let doc = Renderer::builtin().unwrap().render(&Sheet::quote(&view), today()).unwrap();
        assert!(doc.source.contains("if height <= 295"));
        assert!(doc.source.contains("scale(y: 290"));
    }

    #[test]
    fn template_is_seeded_into_the_data_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        Renderer::from_dir(&templates).unwrap();
        let seeded = fs::read_to_string(templates.join(TEMPLATE_NAME)).unwrap();
        assert_eq!(seeded, DEFAULT_TEMPLATE);
    }

    #[test]
    fn write_to_places_source_next_to_assets() {
        let dir = tempfile::TempDir::new().unwrap();
        let doc = RenderedDocument { source: "= hi".into(), assets: vec![("logo.png".into(), vec![1, 2, 3])] };
        let path = doc.write_to(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "= hi");
        assert_eq!(fs::read(dir.path().join("logo.png")).unwrap(), [1, 2, 3]);
    }
}
