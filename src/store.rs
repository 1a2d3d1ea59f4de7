//! Durable record storage.
//!
//! Each record lives in its own TOML file under
//! `<data_root>/data/<collection>/<id>.toml`. Quote and purchase-order
//! rows keep their item list as a JSON string; [`encode_items`] and
//! [`decode_items`] are the only places that cross that boundary.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{BillTo, Company, LineItem, PoStatus, PurchaseOrder, Quote};
use crate::totals::Totals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Companies,
    Quotes,
    PurchaseOrders,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::Companies, Self::Quotes, Self::PurchaseOrders];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Companies => "companies",
            Self::Quotes => "quotes",
            Self::PurchaseOrders => "purchase-orders",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s.trim())
            .ok_or_else(|| StoreError::UnknownCollection(s.to_string()))
    }
}

/// A value that can be persisted in one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

pub trait RecordStore {
    /// All records of one collection, newest `created_at` first.
    fn list<R: Record>(&self) -> Result<Vec<R>, StoreError>;

    fn find<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError>;

    /// Writes a new record. The write is all-or-nothing.
    fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError>;

    /// Overwrites an existing record; fails with `NotFound` if it is absent.
    fn replace<R: Record>(&self, record: &R) -> Result<(), StoreError>;

    /// Removes a record by id. Returns whether anything was removed.
    fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    fn get<R: Record>(&self, id: &str) -> Result<R, StoreError> {
        self.find(id)?.ok_or_else(|| StoreError::NotFound {
            collection: R::COLLECTION.name(),
            id: id.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn open(data_root: &Path) -> Result<Self, StoreError> {
        let data_dir = data_root.join("data");
        for collection in Collection::ALL {
            let dir = data_dir.join(collection.name());
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        debug!(path = %data_dir.display(), "record store opened");
        Ok(Self { data_dir })
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.name())
    }

    fn record_path(&self, collection: Collection, id: &str) -> Result<PathBuf, StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::MissingId(collection.name()));
        }
        // Ids become file names; anything else cannot name a stored record.
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(StoreError::NotFound { collection: collection.name(), id: id.to_string() });
        }
        Ok(self.collection_dir(collection).join(format!("{id}.toml")))
    }

    fn read<R: Record>(path: &Path) -> Result<R, StoreError> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        toml::from_str(&content).map_err(|e| StoreError::decode(path, e))
    }

    fn write<R: Record>(&self, path: &Path, record: &R) -> Result<(), StoreError> {
        let body = toml::to_string_pretty(record).map_err(|e| StoreError::Encode(e.to_string()))?;
        let dir = self.collection_dir(R::COLLECTION);
        let mut staged = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        staged
            .write_all(body.as_bytes())
            .map_err(|e| StoreError::io(staged.path(), e))?;
        staged.persist(path).map_err(|e| StoreError::io(path, e.error))?;
        debug!(path = %path.display(), "record written");
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn list<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let dir = self.collection_dir(R::COLLECTION);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            // One damaged file must not hide the rest of the collection.
            match Self::read::<R>(&path) {
                Ok(record) => records.push(record),
                Err(e @ StoreError::Decode { .. }) => warn!(error = %e, "skipping unreadable record"),
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(records)
    }

    fn find<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let path = match self.record_path(R::COLLECTION, id) {
            Ok(path) => path,
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let path = self.record_path(R::COLLECTION, record.id())?;
        self.write(&path, record)
    }

    fn replace<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let path = self.record_path(R::COLLECTION, record.id())?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                collection: R::COLLECTION.name(),
                id: record.id().to_string(),
            });
        }
        self.write(&path, record)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let path = match self.record_path(collection, id) {
            Ok(path) => path,
            Err(StoreError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

// ==========================================
// Items codec
// ==========================================

pub fn encode_items(items: &[LineItem]) -> Result<String, StoreError> {
    serde_json::to_string(items).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Decodes a stored item list; an empty string is an empty list.
pub fn decode_items(encoded: &str) -> Result<Vec<LineItem>, serde_json::Error> {
    if encoded.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(encoded)
}

fn decode_row_items(collection: Collection, id: &str, encoded: &str) -> Result<Vec<LineItem>, StoreError> {
    decode_items(encoded).map_err(|e| StoreError::decode(format!("{collection}/{id}"), e))
}

// ==========================================
// Rows
// ==========================================

impl Record for Company {
    const COLLECTION: Collection = Collection::Companies;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRow {
    pub id: String,
    pub company_id: String,
    pub quote_number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub po_number: String,
    #[serde(default)]
    pub bill_to: String,
    #[serde(default)]
    pub bill_to_address: String,
    #[serde(default)]
    pub bill_to_contact: String,
    #[serde(default)]
    pub items: String,
    #[serde(default)]
    pub subtotal: f64,
    pub vat_rate: f64,
    #[serde(default)]
    pub vat_amount: f64,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderRow {
    pub id: String,
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    pub po_number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub quote_number: String,
    #[serde(default)]
    pub bill_to: String,
    #[serde(default)]
    pub bill_to_address: String,
    #[serde(default)]
    pub bill_to_contact: String,
    #[serde(default)]
    pub items: String,
    #[serde(default)]
    pub subtotal: f64,
    pub vat_rate: f64,
    #[serde(default)]
    pub vat_amount: f64,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: PoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for QuoteRow {
    const COLLECTION: Collection = Collection::Quotes;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for PurchaseOrderRow {
    const COLLECTION: Collection = Collection::PurchaseOrders;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

impl QuoteRow {
    pub fn encode(quote: &Quote) -> Result<Self, StoreError> {
        Ok(Self {
            id: quote.id.clone(),
            company_id: quote.company_id.clone(),
            quote_number: quote.quote_number.clone(),
            po_number: quote.po_number.clone().unwrap_or_default(),
            bill_to: quote.bill_to.name.clone(),
            bill_to_address: quote.bill_to.address.clone(),
            bill_to_contact: quote.bill_to.contact.clone(),
            items: encode_items(&quote.items)?,
            subtotal: quote.totals.subtotal,
            vat_rate: quote.vat_rate,
            vat_amount: quote.totals.vat_amount,
            total_amount: quote.totals.total_amount,
            notes: quote.notes.clone(),
            created_at: quote.created_at,
            updated_at: quote.updated_at,
        })
    }

    pub fn decode(self) -> Result<Quote, StoreError> {
        let items = decode_row_items(Collection::Quotes, &self.id, &self.items)?;
        Ok(Quote {
            items,
            id: self.id,
            company_id: self.company_id,
            quote_number: self.quote_number,
            po_number: non_empty(self.po_number),
            bill_to: BillTo {
                name: self.bill_to,
                address: self.bill_to_address,
                contact: self.bill_to_contact,
            },
            vat_rate: self.vat_rate,
            totals: Totals {
                subtotal: self.subtotal,
                vat_amount: self.vat_amount,
                total_amount: self.total_amount,
            },
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PurchaseOrderRow {
    pub fn encode(order: &PurchaseOrder) -> Result<Self, StoreError> {
        Ok(Self {
            id: order.id.clone(),
            company_id: order.company_id.clone(),
            quote_id: order.quote_id.clone(),
            po_number: order.po_number.clone(),
            quote_number: order.quote_number.clone().unwrap_or_default(),
            bill_to: order.bill_to.name.clone(),
            bill_to_address: order.bill_to.address.clone(),
            bill_to_contact: order.bill_to.contact.clone(),
            items: encode_items(&order.items)?,
            subtotal: order.totals.subtotal,
            vat_rate: order.vat_rate,
            vat_amount: order.totals.vat_amount,
            total_amount: order.totals.total_amount,
            notes: order.notes.clone(),
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }

    pub fn decode(self) -> Result<PurchaseOrder, StoreError> {
        let items = decode_row_items(Collection::PurchaseOrders, &self.id, &self.items)?;
        Ok(PurchaseOrder {
            items,
            id: self.id,
            company_id: self.company_id,
            quote_id: self.quote_id.and_then(non_empty),
            po_number: self.po_number,
            quote_number: non_empty(self.quote_number),
            bill_to: BillTo {
                name: self.bill_to,
                address: self.bill_to_address,
                contact: self.bill_to_contact,
            },
            vat_rate: self.vat_rate,
            totals: Totals {
                subtotal: self.subtotal,
                vat_amount: self.vat_amount,
                total_amount: self.total_amount,
            },
            notes: self.notes,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn company(id: &str, name: &str, created_at: DateTime<Utc>) -> Company {
        Company {
            id: id.into(),
            name: name.into(),
            logo: String::new(),
            signature: String::new(),
            seal: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            created_at,
            updated_at: created_at,
        }
    }

    fn setup() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_then_find() {
        let (_dir, store) = setup();
        let acme = company("c1", "Acme", Utc::now());
        store.insert(&acme).unwrap();
        let found: Company = store.get("c1").unwrap();
        assert_eq!(found, acme);
    }

    #[test]
    fn list_is_newest_first() {
        let (_dir, store) = setup();
        let now = Utc::now();
        store.insert(&company("old", "Old", now - Duration::days(2))).unwrap();
        store.insert(&company("new", "New", now)).unwrap();
        store.insert(&company("mid", "Mid", now - Duration::days(1))).unwrap();

        let names: Vec<String> = store.list::<Company>().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["New", "Mid", "Old"]);
    }

    #[test]
    fn list_skips_unreadable_files() {
        let (dir, store) = setup();
        store.insert(&company("ok", "Good", Utc::now())).unwrap();
        fs::write(dir.path().join("data/companies/broken.toml"), "name = ").unwrap();

        let names: Vec<String> = store.list::<Company>().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Good"]);
        assert!(matches!(store.get::<Company>("broken"), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn missing_record_is_not_found() {
        let (_dir, store) = setup();
        assert!(store.find::<Company>("nope").unwrap().is_none());
        assert!(matches!(store.get::<Company>("nope"), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.get::<Company>("../etc"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn empty_id_is_rejected() {
        let (_dir, store) = setup();
        assert!(matches!(store.delete(Collection::Quotes, ""), Err(StoreError::MissingId("quotes"))));
        assert!(matches!(store.insert(&company(" ", "Blank", Utc::now())), Err(StoreError::MissingId(_))));
    }

    #[test]
    fn replace_requires_existing_record() {
        let (_dir, store) = setup();
        let acme = company("c1", "Acme", Utc::now());
        assert!(matches!(store.replace(&acme), Err(StoreError::NotFound { .. })));
        store.insert(&acme).unwrap();
        let renamed = Company { name: "Acme Ltd".into(), ..acme };
        store.replace(&renamed).unwrap();
        assert_eq!(store.get::<Company>("c1").unwrap().name, "Acme Ltd");
    }

    #[test]
    fn delete_reports_whether_it_removed_something() {
        let (_dir, store) = setup();
        store.insert(&company("c1", "Acme", Utc::now())).unwrap();
        assert!(store.delete(Collection::Companies, "c1").unwrap());
        assert!(!store.delete(Collection::Companies, "c1").unwrap());
        assert!(store.list::<Company>().unwrap().is_empty());
    }

    #[test]
    fn collection_names_parse() {
        assert_eq!("purchase-orders".parse::<Collection>().unwrap(), Collection::PurchaseOrders);
        assert!(matches!("invoices".parse::<Collection>(), Err(StoreError::UnknownCollection(_))));
    }

    #[test]
    fn items_survive_the_storage_encoding() {
        let items = vec![
            LineItem::new("Design, phase 1", 2.0, 10.0),
            LineItem::new("Ünïcode \"quoted\"", 0.5, 3.25),
            LineItem::new("", 0.0, 0.0),
        ];
        let decoded = decode_items(&encode_items(&items).unwrap()).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn empty_encoded_items_are_an_empty_list() {
        assert!(decode_items("").unwrap().is_empty());
        assert!(decode_items("[]").unwrap().is_empty());
        assert!(decode_items("{not json").is_err());
    }

    #[test]
    fn quote_row_round_trips_through_disk() {
        let (_dir, store) = setup();
        let now = Utc::now();
        let quote = Quote {
            id: "q1".into(),
            company_id: "c1".into(),
            quote_number: "Q-1".into(),
            po_number: None,
            bill_to: BillTo { name: "Bob".into(), address: "2 Side St".into(), contact: "555".into() },
            items: vec![LineItem::new("A", 2.0, 10.0)],
            vat_rate: 5.0,
            totals: Totals { subtotal: 20.0, vat_amount: 1.0, total_amount: 21.0 },
            notes: "thanks".into(),
            created_at: now,
            updated_at: now,
        };
        store.insert(&QuoteRow::encode(&quote).unwrap()).unwrap();
        let back = store.get::<QuoteRow>("q1").unwrap().decode().unwrap();
        assert_eq!(back, quote);
    }

    #[test]
    fn corrupt_items_surface_as_decode_errors() {
        let now = Utc::now();
        let row = QuoteRow {
            id: "q1".into(),
            company_id: "c1".into(),
            quote_number: "Q-1".into(),
            po_number: String::new(),
            bill_to: String::new(),
            bill_to_address: String::new(),
            bill_to_contact: String::new(),
            items: "not json".into(),
            subtotal: 0.0,
            vat_rate: 5.0,
            vat_amount: 0.0,
            total_amount: 0.0,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(row.decode(), Err(StoreError::Decode { .. })));
    }
}
