use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::DocumentId;
use doc_store::{Library, StoreConfig};
use pdf_engine::{default_engine, PdfEngine, RenderRequest};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use viewer_core::{ViewerConfig, ViewerController};

#[derive(Debug, Parser)]
#[command(name = "readshelf")]
#[command(about = "Readshelf document library")]
pub struct Cli {
    /// Database file; defaults to READSHELF_DB or the per-user data directory.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Store a PDF in the library.
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Display name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Print metadata for every stored document.
    List,
    /// Remove a document and its metadata.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Open a document at its saved page, optionally move, and save progress.
    Read {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(long)]
        page: Option<i64>,
    },
    /// Render one page of a stored document to PNG.
    Render {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct ReadOutput {
    id: String,
    page: u32,
    page_count: u32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Upload { file, name } => run_upload(&open_library(cli.db)?, &file, name),
        Commands::List => run_list(&open_library(cli.db)?),
        Commands::Delete { id } => run_delete(&open_library(cli.db)?, &id),
        Commands::Read { id, page } => run_read(open_library(cli.db)?, &id, page),
        Commands::Render { id, page, output } => {
            run_render(&open_library(cli.db)?, &id, page, &output)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_library(db: Option<PathBuf>) -> Result<Library> {
    let config = match db {
        Some(path) => StoreConfig::with_path(path),
        None => StoreConfig::from_env().context("failed to resolve database location")?,
    };
    log::debug!("using database {}", config.database_path().display());

    Library::from_config(&config).context("failed to open document library")
}

fn run_upload(library: &Library, file: &Path, name: Option<String>) -> Result<()> {
    ensure_file_exists(file)?;
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let mut engine = default_engine();
    let handle = engine.open(bytes.clone()).context("failed to open PDF")?;
    engine.close(handle)?;

    let name = name.unwrap_or_else(|| {
        file.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
    });
    let meta = library.upload(&name, &bytes).context("failed to store document")?;

    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn run_list(library: &Library) -> Result<()> {
    let entries = library.list().context("failed to list documents")?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run_delete(library: &Library, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    if !library.delete(&id).context("failed to delete document")? {
        anyhow::bail!("document not found: {id}");
    }

    println!("deleted:{id}");
    Ok(())
}

fn run_read(library: Library, id: &str, page: Option<i64>) -> Result<()> {
    let id = parse_id(id)?;
    let config = ViewerConfig::from_env().context("invalid viewer configuration")?;
    let settle = config.jump_settle + config.debounce;

    let mut viewer = ViewerController::new(library, default_engine(), config);
    let now = Instant::now();
    viewer.open(id.clone(), now).with_context(|| format!("failed to open {id}"))?;

    if let Some(page) = page {
        viewer.goto_page(page, now);
    }
    viewer.scroll_settled(now + settle);
    viewer.tick(now + settle);

    let payload = ReadOutput {
        id: id.to_string(),
        page: viewer.current_page().unwrap_or(1),
        page_count: viewer.page_count().unwrap_or(0),
    };
    viewer.close();
    viewer.library().progress().flush().context("failed to save reading position")?;

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_render(library: &Library, id: &str, page: u32, output: &Path) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let id = parse_id(id)?;
    let bytes = library.read(&id).with_context(|| format!("failed to load {id}"))?;
    let scale = ViewerConfig::from_env().context("invalid viewer configuration")?.render_scale;

    let mut engine = default_engine();
    let handle = engine.open(bytes).context("failed to open PDF")?;
    let image = engine
        .render_page(handle, RenderRequest { page_index: page - 1, scale })
        .context("failed to render page")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    engine.close(handle)?;

    Ok(())
}

fn parse_id(raw: &str) -> Result<DocumentId> {
    DocumentId::parse(raw).with_context(|| format!("invalid document id: {raw:?}"))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
