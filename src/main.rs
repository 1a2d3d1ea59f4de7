mod config;
mod draft;
mod error;
mod export;
mod image;
mod lifecycle;
mod model;
mod render;
mod store;
mod totals;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Attribute, Cell, Color, Table};
use inquire::{Confirm, InquireError, Select, Text};
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppSettings;
use crate::draft::{Draft, Edit};
use crate::export::{Exporter, Typst, open_and_reveal};
use crate::lifecycle::{
    CompanyInput, CompanyPatch, Ledger, PO_PREFIX, PurchaseOrderInput, PurchaseOrderPatch, QUOTE_PREFIX,
    QuoteInput, QuotePatch, default_number,
};
use crate::model::{BillTo, Company, LineItem, PoStatus, PurchaseOrderView, QuoteView};
use crate::render::{Renderer, Sheet, format_currency};
use crate::store::{Collection, FileStore};
use crate::totals::{Totals, parse_amount};

// ==========================================
// Constants
// ==========================================
const NEW_COMPANY_OPT: &str = "➕ Add New Company";
const GREEN: Color = Color::Rgb { r: 4, g: 120, b: 87 };
const RED: Color = Color::Rgb { r: 185, g: 28, b: 28 };

// ==========================================
// Structs & Enums
// ==========================================

#[derive(Parser)]
#[command(name = "quote-desk", about = "Companies, quotes and purchase orders, with PDF export")]
struct Cli {
    /// Data directory to use instead of the configured one
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new company
    AddCompany,
    /// Edit a company
    EditCompany { id: Option<String> },
    /// List all companies
    Companies,
    /// Create a new quote
    NewQuote,
    /// Edit a quote
    EditQuote { id: Option<String> },
    /// List all quotes
    Quotes,
    /// Create a new purchase order
    NewPo,
    /// Edit a purchase order
    EditPo { id: Option<String> },
    /// List all purchase orders
    Pos,
    /// Create a purchase order from a quote
    Convert { quote_id: Option<String> },
    /// Set a purchase order's status (any status may follow any other)
    Status {
        po_id: Option<String>,
        status: Option<PoStatus>,
    },
    /// Delete a record (companies, quotes or purchase-orders)
    Delete { collection: Collection, id: Option<String> },
    /// Show a quote or purchase order
    Show { collection: Collection, id: Option<String> },
    /// Export a quote or purchase order as PDF
    Export { collection: Collection, id: Option<String> },
    /// Print a quote or purchase order
    Print { collection: Collection, id: Option<String> },
    /// Show record counts and purchase-order totals
    Summary,
    /// Configure data directory
    Config,
}

struct App {
    ledger: Ledger<FileStore>,
    settings: AppSettings,
}

// Choices shown in Select prompts.
enum CompanyChoice {
    New,
    Existing(Company),
}

impl fmt::Display for CompanyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str(NEW_COMPANY_OPT),
            Self::Existing(c) => write!(f, "{} ({})", c.name, short_id(&c.id)),
        }
    }
}

struct QuoteChoice(QuoteView);

impl fmt::Display for QuoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = &self.0.quote;
        write!(
            f,
            "{} | {} | {} | {}",
            q.quote_number,
            self.0.company_name(),
            format_currency(q.totals.total_amount),
            q.created_at.with_timezone(&Local).format("%Y-%m-%d")
        )
    }
}

struct OrderChoice(PurchaseOrderView);

impl fmt::Display for OrderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0.order;
        write!(
            f,
            "{} | {} | {} | {} | {}",
            o.po_number,
            self.0.company_name(),
            o.status,
            format_currency(o.totals.total_amount),
            o.created_at.with_timezone(&Local).format("%Y-%m-%d")
        )
    }
}

// ==========================================
// Main Function
// ==========================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        return ExitCode::SUCCESS;
    };

    match run(command, cli.data_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_cancellation(&e) => {
            println!("Cancelled");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_cancellation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<InquireError>(),
        Some(InquireError::OperationCanceled | InquireError::OperationInterrupted)
    )
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Commands, data_root: Option<PathBuf>) -> anyhow::Result<()> {
    // 1. Initialize configuration
    let settings_path = config::config_path();
    let stored = config::load_settings(&settings_path)?;
    init_tracing(stored.as_ref().map_or(config::DEFAULT_LOG_LEVEL, |s| s.log_level()));

    // 2. Open the record store (every command except `config`)
    let open = |stored| open_app(&settings_path, stored, data_root);

    match command {
        Commands::Config => {
            setup_config_wizard(&settings_path, stored)?;
        }
        Commands::AddCompany => {
            add_company_wizard(&open(stored)?)?;
        }
        Commands::EditCompany { id } => edit_company_wizard(&open(stored)?, id)?,
        Commands::Companies => list_companies(&open(stored)?)?,
        Commands::NewQuote => new_quote_wizard(&open(stored)?)?,
        Commands::EditQuote { id } => edit_quote_wizard(&open(stored)?, id)?,
        Commands::Quotes => list_quotes(&open(stored)?)?,
        Commands::NewPo => new_po_wizard(&open(stored)?)?,
        Commands::EditPo { id } => edit_po_wizard(&open(stored)?, id)?,
        Commands::Pos => list_purchase_orders(&open(stored)?)?,
        Commands::Convert { quote_id } => convert_quote(&open(stored)?, quote_id)?,
        Commands::Status { po_id, status } => change_status(&open(stored)?, po_id, status)?,
        Commands::Delete { collection, id } => delete_record(&open(stored)?, collection, id)?,
        Commands::Show { collection, id } => show_document(&open(stored)?, collection, id)?,
        Commands::Export { collection, id } => export_document(&open(stored)?, collection, id, Output::File)?,
        Commands::Print { collection, id } => export_document(&open(stored)?, collection, id, Output::Printer)?,
        Commands::Summary => show_summary(&open(stored)?)?,
    }
    Ok(())
}

fn open_app(
    settings_path: &std::path::Path,
    stored: Option<AppSettings>,
    data_root: Option<PathBuf>,
) -> anyhow::Result<App> {
    let mut settings = match (stored, &data_root) {
        (Some(settings), _) => settings,
        (None, Some(_)) => AppSettings::default(),
        (None, None) => setup_config_wizard(settings_path, None)?,
    };
    if let Some(root) = data_root {
        settings.data_root = root.to_string_lossy().to_string();
    }

    let store = FileStore::open(&settings.data_root())
        .with_context(|| format!("failed to open data directory {}", settings.data_root().display()))?;
    let ledger = Ledger::new(store).with_default_vat_rate(settings.vat_rate());
    Ok(App { ledger, settings })
}

// ==========================================
// 1. Company Logic
// ==========================================

fn add_company_wizard(app: &App) -> anyhow::Result<Company> {
    println!("\n--- Creating New Company ---");
    let name = Text::new("Company Name:")
        .with_validator(inquire::required!("Company name is required"))
        .prompt()?;
    let address = Text::new("Address (Optional):").prompt()?;
    let phone = Text::new("Phone (Optional):").prompt()?;
    let email = Text::new("Email (Optional):").prompt()?;

    let logo = prompt_image("Logo", "")?;
    let signature = prompt_image("Signature", "")?;
    let seal = prompt_image("Seal", "")?;

    let company = app.ledger.create_company(CompanyInput {
        name,
        logo,
        signature,
        seal,
        address,
        phone,
        email,
    })?;
    println!("✅ Company created successfully: {} ({})", company.name, short_id(&company.id));
    Ok(company)
}

fn edit_company_wizard(app: &App, id: Option<String>) -> anyhow::Result<()> {
    let company = match id {
        Some(id) => app.ledger.get_company(&id)?,
        None => {
            let companies = app.ledger.list_companies()?;
            if companies.is_empty() {
                println!("❌ No companies found.");
                return Ok(());
            }
            let options = companies.into_iter().map(CompanyChoice::Existing).collect();
            match Select::new("Select Company to Edit:", options).prompt()? {
                CompanyChoice::Existing(c) => c,
                CompanyChoice::New => return Ok(()),
            }
        }
    };

    println!("\n--- Editing {} ---", company.name);
    let patch = CompanyPatch {
        name: Some(
            Text::new("Company Name:")
                .with_default(&company.name)
                .with_validator(inquire::required!("Company name is required"))
                .prompt()?,
        ),
        address: Some(Text::new("Address:").with_default(&company.address).prompt()?),
        phone: Some(Text::new("Phone:").with_default(&company.phone).prompt()?),
        email: Some(Text::new("Email:").with_default(&company.email).prompt()?),
        logo: Some(prompt_image("Logo", &company.logo)?),
        signature: Some(prompt_image("Signature", &company.signature)?),
        seal: Some(prompt_image("Seal", &company.seal)?),
    };
    let updated = app.ledger.update_company(&company.id, patch)?;
    println!("✅ Company updated: {}", updated.name);
    Ok(())
}

/// Asks for an image file; returns the data URL to store (possibly unchanged or empty).
fn prompt_image(label: &str, current: &str) -> anyhow::Result<String> {
    let choose = format!("Choose {} file…", label.to_lowercase());
    let options = if current.is_empty() {
        vec!["Skip".to_string(), choose.clone()]
    } else {
        vec!["Keep current".to_string(), choose.clone(), "Remove".to_string()]
    };
    let answer = Select::new(&format!("{label}:"), options).prompt()?;

    if answer == "Remove" {
        return Ok(String::new());
    }
    if answer != choose {
        return Ok(current.to_string());
    }

    let picked = rfd::FileDialog::new()
        .set_title(format!("Select {label} Image"))
        .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "svg"])
        .pick_file();
    let path = match picked {
        Some(path) => path,
        None => {
            println!("❌ No file selected. Falling back to manual input.");
            let typed = Text::new("Image path (leave empty to skip):").prompt()?;
            if typed.trim().is_empty() {
                return Ok(current.to_string());
            }
            PathBuf::from(config::expand_home_dir(typed.trim()))
        }
    };

    match image::encode_file(&path) {
        Ok(data_url) => Ok(data_url),
        Err(e) => {
            println!("⚠️  {e}; keeping previous {}.", label.to_lowercase());
            Ok(current.to_string())
        }
    }
}

fn select_or_create_company(app: &App) -> anyhow::Result<Company> {
    let mut options = vec![CompanyChoice::New];
    options.extend(app.ledger.list_companies()?.into_iter().map(CompanyChoice::Existing));

    match Select::new("Please Select Company (Type to Filter):", options).prompt()? {
        CompanyChoice::New => add_company_wizard(app),
        CompanyChoice::Existing(company) => Ok(company),
    }
}

fn list_companies(app: &App) -> anyhow::Result<()> {
    let companies = app.ledger.list_companies()?;
    if companies.is_empty() {
        println!("(None found)");
        return Ok(());
    }
    let overview = app.ledger.overview()?;

    let mut table = Table::new();
    table.set_header(vec!["Name", "Phone", "Email", "Quotes", "Id"]);
    for company in &companies {
        let quotes = overview.quotes_by_company.get(&company.id).copied().unwrap_or(0);
        table.add_row(vec![
            Cell::new(&company.name).add_attribute(Attribute::Bold),
            Cell::new(&company.phone),
            Cell::new(&company.email),
            Cell::new(quotes),
            Cell::new(&company.id),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==========================================
// 2. Data Entry Helpers
// ==========================================

fn prompt_bill_to(current: &BillTo) -> anyhow::Result<BillTo> {
    println!("\n--- Bill To ---");
    Ok(BillTo {
        name: Text::new("Customer Name:").with_default(&current.name).prompt()?,
        address: Text::new("Address:").with_default(&current.address).prompt()?,
        contact: Text::new("Contact Number:").with_default(&current.contact).prompt()?,
    })
}

fn prompt_amount(label: &str, default: f64) -> anyhow::Result<f64> {
    let input = Text::new(label).with_default(&default.to_string()).prompt()?;
    Ok(parse_amount(&input))
}

fn print_totals(draft: &Draft) {
    print_totals_line(draft.vat_rate(), draft.totals());
}

fn print_totals_line(vat_rate: f64, totals: Totals) {
    let Totals { subtotal, vat_amount, total_amount } = totals;
    println!(
        "   Subtotal {} | VAT ({}%) {} | Total {}",
        format_currency(subtotal),
        vat_rate,
        format_currency(vat_amount),
        format_currency(total_amount)
    );
}

fn prompt_row(draft: Draft, index: usize) -> anyhow::Result<Draft> {
    let Some(item) = draft.items().get(index).cloned() else {
        return Ok(draft);
    };
    let description = Text::new("Description:").with_default(&item.description).prompt()?;
    let quantity = prompt_amount("Quantity:", item.quantity)?;
    let price = prompt_amount("Price ($):", item.price)?;

    let draft = draft
        .apply(Edit::Description(index, description))
        .apply(Edit::Quantity(index, quantity))
        .apply(Edit::Price(index, price));
    print_totals(&draft);
    Ok(draft)
}

/// Item entry for a new document: fills the first row, then keeps adding
/// rows until an empty description is entered.
fn enter_items(mut draft: Draft) -> anyhow::Result<Draft> {
    println!("\n--- Enter Items ---");
    println!("(Leave Description empty to finish)");

    let mut index = 0;
    loop {
        let desc = Text::new("Description (leave empty to finish):").prompt()?;
        if desc.trim().is_empty() {
            break;
        }
        if index > 0 {
            draft = draft.apply(Edit::AddItem);
        }
        let quantity = prompt_amount("Quantity:", 1.0)?;
        let price = prompt_amount("Price ($):", 0.0)?;
        draft = draft
            .apply(Edit::Description(index, desc))
            .apply(Edit::Quantity(index, quantity))
            .apply(Edit::Price(index, price));
        print_totals(&draft);
        index += 1;
    }

    let rate = prompt_amount("VAT Rate (%):", draft.vat_rate())?;
    let draft = draft.apply(Edit::VatRate(rate));
    print_totals(&draft);
    Ok(draft)
}

/// Menu-driven item editing for an existing document.
fn revise_items(mut draft: Draft) -> anyhow::Result<Draft> {
    const ADD: &str = "Add item";
    const EDIT: &str = "Edit item";
    const REMOVE: &str = "Remove item";
    const VAT: &str = "Change VAT rate";
    const DONE: &str = "Done";

    loop {
        print_items(&draft);
        let mut actions = vec![ADD, EDIT];
        if draft.items().len() > 1 {
            actions.push(REMOVE);
        }
        actions.extend([VAT, DONE]);

        match Select::new("Items:", actions).prompt()? {
            ADD => {
                draft = draft.apply(Edit::AddItem);
                let last = draft.items().len() - 1;
                draft = prompt_row(draft, last)?;
            }
            EDIT => {
                let index = pick_row(&draft, "Select Item to Edit:")?;
                draft = prompt_row(draft, index)?;
            }
            REMOVE => {
                let index = pick_row(&draft, "Select Item to Remove:")?;
                draft = draft.apply(Edit::RemoveItem(index));
            }
            VAT => {
                let rate = prompt_amount("VAT Rate (%):", draft.vat_rate())?;
                draft = draft.apply(Edit::VatRate(rate));
            }
            _ => return Ok(draft),
        }
    }
}

fn pick_row(draft: &Draft, prompt: &str) -> anyhow::Result<usize> {
    let options: Vec<String> = draft
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {} ({} × {})", i + 1, item.description, item.quantity, format_currency(item.price)))
        .collect();
    let choice = Select::new(prompt, options).raw_prompt()?;
    Ok(choice.index)
}

fn print_items(draft: &Draft) {
    print_item_table(draft.items());
    print_totals(draft);
}

fn print_item_table(items: &[LineItem]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Description", "Qty", "Price", "Total"]);
    for (i, item) in items.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&item.description),
            Cell::new(item.quantity),
            Cell::new(format_currency(item.price)),
            Cell::new(format_currency(item.total)),
        ]);
    }
    println!("{table}");
}

fn optional(input: String) -> Option<String> {
    if input.trim().is_empty() { None } else { Some(input.trim().to_string()) }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ==========================================
// 3. Quote Logic
// ==========================================

fn new_quote_wizard(app: &App) -> anyhow::Result<()> {
    let company = select_or_create_company(app)?;
    println!("✅ Selected Company: {}", company.name);

    let quote_number = Text::new("Quote Number (leave empty for automatic):").prompt()?;
    let po_number = Text::new("PO Reference (Optional):").prompt()?;
    let bill_to = prompt_bill_to(&BillTo::default())?;
    let draft = enter_items(Draft::new(app.ledger.default_vat_rate()))?;
    let notes = Text::new("Notes & Remarks (Optional):").prompt()?;

    let (items, vat_rate) = draft.into_parts();
    let quote = app.ledger.create_quote(QuoteInput {
        company_id: company.id,
        quote_number: optional(quote_number),
        po_number: optional(po_number),
        bill_to,
        items,
        vat_rate: Some(vat_rate),
        notes,
    })?;
    println!("✅ Quote created: {} ({})", quote.quote_number, format_currency(quote.totals.total_amount));

    if Confirm::new("Export PDF now?").with_default(true).prompt()? {
        export_document(app, Collection::Quotes, Some(quote.id), Output::File)?;
    }
    Ok(())
}

fn select_quote(app: &App, id: Option<String>, prompt: &str) -> anyhow::Result<Option<QuoteView>> {
    if let Some(id) = id {
        return Ok(Some(app.ledger.get_quote(&id)?));
    }
    let quotes = app.ledger.list_quotes()?;
    if quotes.is_empty() {
        println!("❌ No quotes found.");
        return Ok(None);
    }
    let options = quotes.into_iter().map(QuoteChoice).collect();
    let QuoteChoice(picked) = Select::new(prompt, options).with_page_size(10).prompt()?;
    // Re-read to get the full company block.
    Ok(Some(app.ledger.get_quote(&picked.quote.id)?))
}

fn edit_quote_wizard(app: &App, id: Option<String>) -> anyhow::Result<()> {
    let Some(view) = select_quote(app, id, "Select Quote to Edit:")? else {
        return Ok(());
    };
    let quote = view.quote;
    println!("\n--- Editing Quote {} ({}) ---", quote.quote_number, view.company.as_ref().map_or(model::NO_COMPANY, |c| c.name.as_str()));

    let company_id = if Confirm::new("Change company?").with_default(false).prompt()? {
        Some(select_or_create_company(app)?.id)
    } else {
        None
    };
    let quote_number = Text::new("Quote Number:")
        .with_default(&quote.quote_number)
        .with_validator(inquire::required!("Quote number is required"))
        .prompt()?;
    let po_number = Text::new("PO Reference:")
        .with_default(quote.po_number.as_deref().unwrap_or(""))
        .prompt()?;
    let bill_to = prompt_bill_to(&quote.bill_to)?;
    let draft = revise_items(Draft::from_parts(quote.items.clone(), quote.vat_rate))?;
    let notes = Text::new("Notes & Remarks:").with_default(&quote.notes).prompt()?;

    let (items, vat_rate) = draft.into_parts();
    let updated = app.ledger.update_quote(
        &quote.id,
        QuotePatch {
            company_id,
            quote_number: Some(quote_number),
            po_number: Some(optional(po_number)),
            bill_to: Some(bill_to),
            items: Some(items),
            vat_rate: Some(vat_rate),
            notes: Some(notes),
        },
    )?;
    println!("✅ Quote updated: {} ({})", updated.quote_number, format_currency(updated.totals.total_amount));
    Ok(())
}

fn list_quotes(app: &App) -> anyhow::Result<()> {
    let quotes = app.ledger.list_quotes()?;
    if quotes.is_empty() {
        println!("(None found)");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Quote #", "PO #", "Company", "Bill To", "Total", "Date", "Id"]);
    for view in &quotes {
        let q = &view.quote;
        table.add_row(vec![
            Cell::new(&q.quote_number).add_attribute(Attribute::Bold),
            Cell::new(q.po_number.as_deref().unwrap_or("-")),
            Cell::new(view.company_name()),
            Cell::new(&q.bill_to.name),
            Cell::new(format_currency(q.totals.total_amount)),
            Cell::new(q.created_at.with_timezone(&Local).format("%Y-%m-%d")),
            Cell::new(&q.id),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn convert_quote(app: &App, quote_id: Option<String>) -> anyhow::Result<()> {
    let Some(view) = select_quote(app, quote_id, "Select Quote to Convert:")? else {
        return Ok(());
    };
    let order = app.ledger.convert_quote(&view.quote.id)?;
    println!(
        "✅ Purchase Order {} created from Quote {} ({})",
        order.po_number,
        view.quote.quote_number,
        format_currency(order.totals.total_amount)
    );
    Ok(())
}

// ==========================================
// 4. Purchase Order Logic
// ==========================================

fn prompt_status(current: PoStatus) -> anyhow::Result<PoStatus> {
    let cursor = PoStatus::ALL.iter().position(|s| *s == current).unwrap_or(0);
    Ok(Select::new("Status:", PoStatus::ALL.to_vec()).with_starting_cursor(cursor).prompt()?)
}

fn new_po_wizard(app: &App) -> anyhow::Result<()> {
    let company = select_or_create_company(app)?;
    println!("✅ Selected Company: {}", company.name);

    let po_number = Text::new("PO Number:")
        .with_default(&default_number(PO_PREFIX, Utc::now()))
        .with_validator(inquire::required!("PO number is required"))
        .prompt()?;
    let quote_number = Text::new("Quote Reference (Optional):")
        .with_placeholder(&format!("{QUOTE_PREFIX}-12345"))
        .prompt()?;
    let status = prompt_status(PoStatus::default())?;
    let bill_to = prompt_bill_to(&BillTo::default())?;
    let draft = enter_items(Draft::new(app.ledger.default_vat_rate()))?;
    let notes = Text::new("Notes & Remarks (Optional):").prompt()?;

    let (items, vat_rate) = draft.into_parts();
    let order = app.ledger.create_purchase_order(PurchaseOrderInput {
        company_id: company.id,
        quote_id: None,
        po_number: Some(po_number),
        quote_number: optional(quote_number),
        bill_to,
        items,
        vat_rate: Some(vat_rate),
        notes,
        status: Some(status),
    })?;
    println!("✅ Purchase Order created: {} ({})", order.po_number, format_currency(order.totals.total_amount));

    if Confirm::new("Export PDF now?").with_default(true).prompt()? {
        export_document(app, Collection::PurchaseOrders, Some(order.id), Output::File)?;
    }
    Ok(())
}

fn select_purchase_order(app: &App, id: Option<String>, prompt: &str) -> anyhow::Result<Option<PurchaseOrderView>> {
    if let Some(id) = id {
        return Ok(Some(app.ledger.get_purchase_order(&id)?));
    }
    let orders = app.ledger.list_purchase_orders()?;
    if orders.is_empty() {
        println!("❌ No purchase orders found.");
        return Ok(None);
    }
    let options = orders.into_iter().map(OrderChoice).collect();
    let OrderChoice(picked) = Select::new(prompt, options).with_page_size(10).prompt()?;
    Ok(Some(app.ledger.get_purchase_order(&picked.order.id)?))
}

fn edit_po_wizard(app: &App, id: Option<String>) -> anyhow::Result<()> {
    let Some(view) = select_purchase_order(app, id, "Select Purchase Order to Edit:")? else {
        return Ok(());
    };
    let order = view.order;
    println!("\n--- Editing Purchase Order {} ---", order.po_number);

    let company_id = if Confirm::new("Change company?").with_default(false).prompt()? {
        Some(select_or_create_company(app)?.id)
    } else {
        None
    };
    let po_number = Text::new("PO Number:")
        .with_default(&order.po_number)
        .with_validator(inquire::required!("PO number is required"))
        .prompt()?;
    let quote_number = Text::new("Quote Reference:")
        .with_default(order.quote_number.as_deref().unwrap_or(""))
        .prompt()?;
    let status = prompt_status(order.status)?;
    let bill_to = prompt_bill_to(&order.bill_to)?;
    let draft = revise_items(Draft::from_parts(order.items.clone(), order.vat_rate))?;
    let notes = Text::new("Notes & Remarks:").with_default(&order.notes).prompt()?;

    let (items, vat_rate) = draft.into_parts();
    let updated = app.ledger.update_purchase_order(
        &order.id,
        PurchaseOrderPatch {
            company_id,
            po_number: Some(po_number),
            quote_number: Some(optional(quote_number)),
            bill_to: Some(bill_to),
            items: Some(items),
            vat_rate: Some(vat_rate),
            notes: Some(notes),
            status: Some(status),
        },
    )?;
    println!("✅ Purchase Order updated: {} [{}]", updated.po_number, updated.status);
    Ok(())
}

fn status_cell(status: PoStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        PoStatus::Completed => cell.fg(GREEN),
        PoStatus::Cancelled => cell.fg(RED),
        _ => cell,
    }
}

fn list_purchase_orders(app: &App) -> anyhow::Result<()> {
    let orders = app.ledger.list_purchase_orders()?;
    if orders.is_empty() {
        println!("(None found)");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["PO #", "Quote #", "Company", "Status", "Total", "Date", "Id"]);
    for view in &orders {
        let o = &view.order;
        table.add_row(vec![
            Cell::new(&o.po_number).add_attribute(Attribute::Bold),
            Cell::new(o.quote_number.as_deref().unwrap_or("-")),
            Cell::new(view.company_name()),
            status_cell(o.status),
            Cell::new(format_currency(o.totals.total_amount)),
            Cell::new(o.created_at.with_timezone(&Local).format("%Y-%m-%d")),
            Cell::new(&o.id),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn change_status(app: &App, po_id: Option<String>, status: Option<PoStatus>) -> anyhow::Result<()> {
    let Some(view) = select_purchase_order(app, po_id, "Select Purchase Order:")? else {
        return Ok(());
    };
    let status = match status {
        Some(status) => status,
        None => prompt_status(view.order.status)?,
    };
    let order = app.ledger.set_status(&view.order.id, status)?;
    println!("✅ {} is now {}", order.po_number, order.status);
    Ok(())
}

// ==========================================
// 5. Delete / Show / Export
// ==========================================

fn delete_record(app: &App, collection: Collection, id: Option<String>) -> anyhow::Result<()> {
    let (id, label) = match (collection, id) {
        (_, Some(id)) => (id.clone(), id),
        (Collection::Companies, None) => {
            let companies = app.ledger.list_companies()?;
            if companies.is_empty() {
                println!("❌ No companies found.");
                return Ok(());
            }
            let options = companies.into_iter().map(CompanyChoice::Existing).collect();
            match Select::new("Select Company to Delete:", options).prompt()? {
                CompanyChoice::Existing(c) => (c.id, c.name),
                CompanyChoice::New => return Ok(()),
            }
        }
        (Collection::Quotes, None) => match select_quote(app, None, "Select Quote to Delete:")? {
            Some(view) => (view.quote.id, view.quote.quote_number),
            None => return Ok(()),
        },
        (Collection::PurchaseOrders, None) => {
            match select_purchase_order(app, None, "Select Purchase Order to Delete:")? {
                Some(view) => (view.order.id, view.order.po_number),
                None => return Ok(()),
            }
        }
    };

    if !Confirm::new(&format!("Are you sure you want to delete {label}?")).with_default(false).prompt()? {
        println!("Cancelled");
        return Ok(());
    }
    if app.ledger.delete(collection, &id)? {
        println!("✅ Deleted {label}");
    } else {
        println!("❌ Nothing to delete: no {collection} record {id}");
    }
    Ok(())
}

enum Loaded {
    Quote(QuoteView),
    Order(PurchaseOrderView),
}

impl Loaded {
    fn sheet(&self) -> Sheet<'_> {
        match self {
            Self::Quote(view) => Sheet::quote(view),
            Self::Order(view) => Sheet::purchase_order(view),
        }
    }
}

fn load_document(app: &App, collection: Collection, id: Option<String>) -> anyhow::Result<Option<Loaded>> {
    Ok(match collection {
        Collection::Quotes => select_quote(app, id, "Select Quote:")?.map(Loaded::Quote),
        Collection::PurchaseOrders => select_purchase_order(app, id, "Select Purchase Order:")?.map(Loaded::Order),
        Collection::Companies => bail!("only quotes and purchase-orders can be rendered"),
    })
}

fn show_document(app: &App, collection: Collection, id: Option<String>) -> anyhow::Result<()> {
    let Some(doc) = load_document(app, collection, id)? else {
        return Ok(());
    };
    let sheet = doc.sheet();

    println!("\n{} {}", sheet.kind.title(), sheet.number);
    if let Loaded::Order(view) = &doc {
        println!("Status: {}", view.order.status);
    }
    if let Some(reference) = sheet.cross_ref {
        println!("Reference: {reference}");
    }
    println!("Date: {}", render::format_long_date(sheet.issue_date()));

    match sheet.company {
        Some(c) => {
            println!("\nFrom: {}", c.name);
            for line in [c.address.as_deref(), c.phone.as_deref(), c.email.as_deref()].into_iter().flatten() {
                if !line.is_empty() {
                    println!("      {line}");
                }
            }
        }
        None => println!("\nFrom: {}", model::NO_COMPANY),
    }
    println!("\nBill To: {}", sheet.bill_to.name);
    for line in [&sheet.bill_to.address, &sheet.bill_to.contact] {
        if !line.is_empty() {
            println!("         {line}");
        }
    }

    print_item_table(sheet.items);
    print_totals_line(sheet.vat_rate, sheet.totals);
    if !sheet.notes.is_empty() {
        println!("\nNotes: {}", sheet.notes);
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Output {
    File,
    Printer,
}

fn export_document(app: &App, collection: Collection, id: Option<String>, output: Output) -> anyhow::Result<()> {
    let Some(doc) = load_document(app, collection, id)? else {
        return Ok(());
    };
    let sheet = doc.sheet();
    let renderer = match Renderer::from_dir(&app.settings.template_dir()) {
        Ok(renderer) => renderer,
        Err(e) => {
            warn!(error = %e, "custom template unusable, falling back to the built-in layout");
            Renderer::builtin()?
        }
    };
    let exporter = Exporter::new(renderer, Typst::new(), app.settings.output_root());
    let today = Utc::now().date_naive();

    println!("\n🔨 Compiling PDF...");
    let result = match output {
        Output::File => exporter.export(&sheet, today).map(|path| {
            println!("✅ PDF Generated: {}", path.display());
            open_and_reveal(&path);
        }),
        Output::Printer => exporter.print(&sheet, today).map(|()| println!("✅ Sent to printer.")),
    };
    if let Err(e) = result {
        error!(error = %e, number = sheet.number, "export failed");
        bail!("export failed: {e}");
    }
    Ok(())
}

// ==========================================
// 6. Summary Logic
// ==========================================

fn show_summary(app: &App) -> anyhow::Result<()> {
    let overview = app.ledger.overview()?;

    let mut counts = Table::new();
    counts.set_header(vec!["Companies", "Quotes", "Purchase Orders"]);
    counts.add_row(vec![overview.companies, overview.quotes, overview.purchase_orders]);
    println!("\n--- Records ---");
    println!("{counts}");

    let mut table = Table::new();
    table.set_header(vec![Cell::new("Status"), Cell::new("Orders"), Cell::new("Total")]);
    let mut grand_count = 0;
    let mut grand_total = 0.0;
    for status in PoStatus::ALL {
        let (count, total) = overview.orders_by_status.get(&status).copied().unwrap_or((0, 0.0));
        grand_count += count;
        grand_total += total;
        table.add_row(vec![status_cell(status), Cell::new(count), Cell::new(format_currency(total))]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(grand_count).add_attribute(Attribute::Bold),
        Cell::new(format_currency(grand_total)).add_attribute(Attribute::Bold),
    ]);
    println!("\n--- Purchase Orders by Status ---");
    println!("{table}");

    let companies = app.ledger.list_companies()?;
    if !companies.is_empty() {
        let mut ranked: Vec<(&Company, usize)> = companies
            .iter()
            .map(|c| (c, overview.quotes_by_company.get(&c.id).copied().unwrap_or(0)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));

        let mut company_table = Table::new();
        company_table.set_header(vec!["Company", "Quotes"]);
        for (company, count) in ranked {
            company_table.add_row(vec![Cell::new(&company.name), Cell::new(count)]);
        }
        println!("\n--- Quotes per Company ---");
        println!("{company_table}");
    }
    Ok(())
}

// ==========================================
// 7. Config
// ==========================================

fn setup_config_wizard(path: &std::path::Path, current: Option<AppSettings>) -> anyhow::Result<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let mut settings = current.unwrap_or_default();

    println!("📂 Opening folder picker...");
    let picked_path = rfd::FileDialog::new()
        .set_title("Select Root Data Directory")
        .pick_folder();

    settings.data_root = match picked_path {
        Some(path) => path.to_string_lossy().to_string(),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            Text::new("Enter Root Data Directory:").with_default(&settings.data_root).prompt()?
        }
    };
    let rate = Text::new("Default VAT Rate (%):")
        .with_default(&settings.vat_rate().to_string())
        .prompt()?;
    settings.default_vat_rate = Some(parse_amount(&rate));

    config::save_settings(path, &settings)?;
    println!("✅ Settings saved.");
    Ok(settings)
}
