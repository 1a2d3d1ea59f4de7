//! PDF export and printing through the `typst` compiler.
//!
//! The compiler is probed once, on first use, and the answer is reused for
//! the rest of the session. An export either lands a finished PDF in the
//! output directory or leaves nothing behind.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use slug::slugify;
use tracing::{debug, info};

use crate::error::ExportError;
use crate::render::{Renderer, Sheet};

pub struct Typst {
    command: Vec<OsString>,
    version: OnceLock<Option<String>>,
}

impl Typst {
    pub fn new() -> Self {
        Self::with_command(["typst"])
    }

    /// A custom invocation: the program followed by any leading arguments.
    pub fn with_command<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            version: OnceLock::new(),
        }
    }

    fn base(&self) -> Option<Command> {
        let (program, args) = self.command.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Some(cmd)
    }

    /// The compiler's version line, probed on first call only.
    pub fn version(&self) -> Result<&str, ExportError> {
        self.version
            .get_or_init(|| {
                let output = self.base()?.arg("--version").stderr(Stdio::null()).output().ok()?;
                if !output.status.success() {
                    return None;
                }
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!(%version, "typst available");
                Some(version)
            })
            .as_deref()
            .ok_or(ExportError::ToolMissing)
    }

    pub fn compile(&self, source: &Path, output: &Path) -> Result<(), ExportError> {
        self.version()?;
        let mut cmd = self.base().ok_or(ExportError::ToolMissing)?;
        let status = cmd
            .arg("compile")
            .arg(source)
            .arg(output)
            .status()
            .map_err(|_| ExportError::ToolMissing)?;
        if status.success() && output.exists() {
            Ok(())
        } else {
            Err(ExportError::Compile(source.to_path_buf()))
        }
    }
}

impl Default for Typst {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Exporter {
    renderer: Renderer,
    typst: Typst,
    output_root: PathBuf,
}

impl Exporter {
    pub fn new(renderer: Renderer, typst: Typst, output_root: PathBuf) -> Self {
        Self { renderer, typst, output_root }
    }

    /// `<output_root>/<year>/<company-slug>`.
    pub fn output_dir(&self, sheet: &Sheet<'_>, today: NaiveDate) -> PathBuf {
        let company = sheet
            .company
            .map(|c| slugify(&c.name))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "no-company".to_string());
        self.output_root.join(today.year().to_string()).join(company)
    }

    /// Renders and compiles into a scratch directory, returning the PDF path
    /// inside it. The directory is removed when the guard drops.
    fn build(&self, sheet: &Sheet<'_>, today: NaiveDate, scratch_parent: &Path) -> Result<(tempfile::TempDir, PathBuf), ExportError> {
        // Fail before touching the filesystem when the compiler is absent.
        self.typst.version()?;

        let rendered = self.renderer.render(sheet, today)?;
        let scratch = tempfile::Builder::new()
            .prefix(".render-")
            .tempdir_in(scratch_parent)
            .map_err(|e| ExportError::io(scratch_parent, e))?;
        let source = rendered.write_to(scratch.path())?;
        let pdf = scratch.path().join("document.pdf");
        self.typst.compile(&source, &pdf)?;
        Ok((scratch, pdf))
    }

    /// Writes `Quote_<n>_<date>.pdf` / `PurchaseOrder_<n>_<date>.pdf`.
    /// The year and company folders are only created once the PDF exists.
    pub fn export(&self, sheet: &Sheet<'_>, today: NaiveDate) -> Result<PathBuf, ExportError> {
        self.typst.version()?;
        let root = &self.output_root;
        fs::create_dir_all(root).map_err(|e| ExportError::io(root, e))?;

        let (_scratch, pdf) = self.build(sheet, today, root)?;
        let dir = self.output_dir(sheet, today);
        fs::create_dir_all(&dir).map_err(|e| ExportError::io(&dir, e))?;
        let target = dir.join(sheet.file_name(today));
        fs::rename(&pdf, &target).map_err(|e| ExportError::io(&target, e))?;
        info!(path = %target.display(), "document exported");
        Ok(target)
    }

    /// Compiles to a scratch PDF and hands it to the system print spooler.
    pub fn print(&self, sheet: &Sheet<'_>, today: NaiveDate) -> Result<(), ExportError> {
        let (_scratch, pdf) = self.build(sheet, today, &std::env::temp_dir())?;
        let status = print_command(&pdf)
            .status()
            .map_err(|e| ExportError::io(&pdf, e))?;
        if !status.success() {
            return Err(ExportError::Print(pdf));
        }
        info!(number = sheet.number, "document sent to printer");
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn print_command(pdf: &Path) -> Command {
    let mut cmd = Command::new("lp");
    cmd.arg(pdf);
    cmd
}

#[cfg(target_os = "windows")]
fn print_command(pdf: &Path) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-Command", "Start-Process", "-Verb", "Print", "-Wait", "-FilePath"]);
    cmd.arg(pdf);
    cmd
}

// Helper: Open file and reveal in Finder/Explorer
pub fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(format!("/select,{}", path.to_string_lossy())).spawn().ok();

    #[cfg(target_os = "linux")]
    if let Some(parent) = path.parent() {
        Command::new("xdg-open").arg(parent).spawn().ok();
    }

    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BillTo, CompanySummary, DocumentKind, LineItem};
    use crate::totals::Totals;
    use chrono::Utc;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    fn with_sheet<T>(company: Option<&CompanySummary>, f: impl FnOnce(&Sheet<'_>) -> T) -> T {
        let bill_to = BillTo::default();
        let items = vec![LineItem::new("A", 2.0, 10.0)];
        let sheet = Sheet {
            kind: DocumentKind::Quote,
            number: "Q-42",
            cross_ref: None,
            created_at: Utc::now(),
            bill_to: &bill_to,
            items: &items,
            vat_rate: 5.0,
            totals: Totals { subtotal: 20.0, vat_amount: 1.0, total_amount: 21.0 },
            notes: "",
            company,
        };
        f(&sheet)
    }

    fn acme() -> CompanySummary {
        CompanySummary {
            id: "c1".into(),
            name: "Acme & Sons".into(),
            logo: String::new(),
            signature: String::new(),
            seal: String::new(),
            address: None,
            phone: None,
            email: None,
        }
    }

    #[test]
    fn missing_compiler_leaves_no_artifact() {
        let out = TempDir::new().unwrap();
        let exporter = Exporter::new(
            Renderer::builtin().unwrap(),
            Typst::with_command(["quote-desk-no-such-typst"]),
            out.path().to_path_buf(),
        );
        let result = with_sheet(None, |sheet| exporter.export(sheet, today()));
        assert!(matches!(result, Err(ExportError::ToolMissing)));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn output_dir_groups_by_year_and_company() {
        let exporter = Exporter::new(Renderer::builtin().unwrap(), Typst::new(), PathBuf::from("/out"));
        let company = acme();
        let dir = with_sheet(Some(&company), |sheet| exporter.output_dir(sheet, today()));
        assert_eq!(dir, PathBuf::from("/out/2026/acme-sons"));
        let orphan = with_sheet(None, |sheet| exporter.output_dir(sheet, today()));
        assert_eq!(orphan, PathBuf::from("/out/2026/no-company"));
    }

    #[cfg(unix)]
    fn fake_typst(dir: &Path, body: &str) -> Typst {
        let script = dir.join("fake-typst.sh");
        fs::write(&script, body).unwrap();
        Typst::with_command([OsString::from("sh"), script.into_os_string()])
    }

    #[cfg(unix)]
    #[test]
    fn export_moves_compiled_pdf_into_place() {
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let typst = fake_typst(
            tools.path(),
            "if [ \"$1\" = \"--version\" ]; then echo 'typst 0.0.0'; exit 0; fi\ncp \"$2\" \"$3\"\n",
        );
        assert_eq!(typst.version().unwrap(), "typst 0.0.0");

        let exporter = Exporter::new(Renderer::builtin().unwrap(), typst, out.path().to_path_buf());
        let company = acme();
        let path = with_sheet(Some(&company), |sheet| exporter.export(sheet, today())).unwrap();

        assert_eq!(path, out.path().join("2026/acme-sons/Quote_Q-42_2026-03-05.pdf"));
        // The fake compiler copies its input, so the "PDF" is the typst source.
        assert!(fs::read_to_string(&path).unwrap().contains(r#"#"QUOTE""#));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        let root_entries: Vec<_> = fs::read_dir(out.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(root_entries, vec![std::ffi::OsString::from("2026")]);
    }

    #[cfg(unix)]
    #[test]
    fn failed_compile_leaves_no_artifact() {
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let typst = fake_typst(
            tools.path(),
            "if [ \"$1\" = \"--version\" ]; then echo 'typst 0.0.0'; exit 0; fi\nexit 1\n",
        );
        let exporter = Exporter::new(Renderer::builtin().unwrap(), typst, out.path().to_path_buf());
        let result = with_sheet(None, |sheet| exporter.export(sheet, today()));
        assert!(matches!(result, Err(ExportError::Compile(_))));
        assert!(!out.path().join("2026").exists());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn compiler_is_probed_once() {
        let tools = TempDir::new().unwrap();
        let typst = fake_typst(tools.path(), "echo 'typst 1.0.0'\n");
        assert_eq!(typst.version().unwrap(), "typst 1.0.0");
        // Changing the tool afterwards has no effect on this session.
        fs::write(tools.path().join("fake-typst.sh"), "exit 1\n").unwrap();
        assert_eq!(typst.version().unwrap(), "typst 1.0.0");
    }
}
