use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use pageink::document::ImageDirService;
use pageink::persistence::{InkKey, JsonFileStore, PersistenceGateway};
use pageink::settings::Settings;
use pageink::{Lifecycle, Viewer};

/// How long a render may take before the CLI gives up
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "pageink", version, about = "Render and inspect annotated document pages")]
struct Cli {
    /// Log file
    #[arg(long, default_value = "pageink.log", global = true)]
    log_file: PathBuf,

    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Settings file (default: the user's config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one page of an image-directory document with its ink and
    /// markers into a PNG
    Render {
        /// Directory holding one image per page
        pages_dir: PathBuf,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long)]
        scale: Option<f32>,

        /// Annotation store root (default: the user's data directory)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Document id annotations are stored under (default: directory name)
        #[arg(long)]
        document: Option<String>,

        #[arg(long, default_value = "default")]
        user: String,

        #[arg(long, short, default_value = "page.png")]
        out: PathBuf,
    },

    /// Print a document's markers and per-page stroke counts as JSON
    Inspect {
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long)]
        document: String,

        /// Only this user's ink (default: every user)
        #[arg(long)]
        user: Option<String>,
    },
}

fn initialize_panic_handler() {
    better_panic::install();
}

fn open_store(root: Option<PathBuf>) -> Result<JsonFileStore> {
    match root {
        Some(root) => Ok(JsonFileStore::new(root)),
        None => JsonFileStore::default_location()
            .context("Could not determine data directory; pass --store"),
    }
}

fn load_settings(path: Option<&Path>) -> Settings {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

fn main() -> Result<()> {
    initialize_panic_handler();
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?,
    )?;
    info!("Starting pageink");

    let settings = load_settings(cli.config.as_deref());
    let result = match cli.command {
        Commands::Render {
            pages_dir,
            page,
            scale,
            store,
            document,
            user,
            out,
        } => render(
            &settings,
            &pages_dir,
            RenderArgs {
                page,
                scale,
                store,
                document,
                user,
                out,
            },
        ),
        Commands::Inspect {
            store,
            document,
            user,
        } => inspect(store, &document, user.as_deref()),
    };

    if let Err(err) = &result {
        error!("{err:?}");
    }
    info!("Shutting down pageink");
    result
}

struct RenderArgs {
    page: usize,
    scale: Option<f32>,
    store: Option<PathBuf>,
    document: Option<String>,
    user: String,
    out: PathBuf,
}

fn render(settings: &Settings, pages_dir: &Path, args: RenderArgs) -> Result<()> {
    let store = open_store(args.store)?;
    let document_id = match args.document {
        Some(id) => id,
        None => pages_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("Cannot derive a document id from the pages directory; pass --document")?,
    };
    let reference = pages_dir.to_string_lossy().into_owned();

    let mut viewer = Viewer::new(
        Arc::new(ImageDirService::new()),
        Arc::new(store),
        args.user,
        settings.viewer_config(),
    );
    viewer.load_document(document_id.as_str(), &reference);
    settle(&mut viewer)?;

    if args.page != viewer.current_page() {
        viewer.go_to_page(args.page);
    }
    if let Some(scale) = args.scale {
        viewer.set_scale(scale);
    }
    settle(&mut viewer)?;

    let image = viewer
        .compose_current()
        .context("No page surface available to compose")?;
    image
        .save(&args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    let ink = viewer.ink_layer().map_or(0, |layer| layer.len());
    let markers = viewer.markers().on_page(viewer.current_page()).count();
    println!(
        "Rendered page {}/{} of {document_id} at scale {} ({}x{}, {ink} strokes, {markers} markers) to {}",
        viewer.current_page(),
        viewer.page_count(),
        viewer.scale(),
        image.width(),
        image.height(),
        args.out.display()
    );
    Ok(())
}

fn settle(viewer: &mut Viewer) -> Result<()> {
    if !viewer.wait_idle(RENDER_TIMEOUT) {
        bail!("Timed out waiting for the document");
    }
    if let Lifecycle::Failed { message } = viewer.lifecycle() {
        bail!("Failed to load document: {message}");
    }
    if let Some(notice) = viewer.notifications().current() {
        eprintln!("warning: {}", notice.message);
    }
    Ok(())
}

fn inspect(store: Option<PathBuf>, document_id: &str, user: Option<&str>) -> Result<()> {
    let store = open_store(store)?;
    let markers = store
        .load_markers(document_id)
        .with_context(|| format!("Failed to load markers of {document_id}"))?;

    let users = match user {
        Some(user) => vec![user.to_string()],
        None => store.ink_users(document_id)?,
    };
    let mut ink = serde_json::Map::new();
    for user in users {
        let mut pages = serde_json::Map::new();
        for page in store.ink_pages(document_id, &user)? {
            let key = InkKey::new(document_id, page, user.as_str());
            let strokes = store
                .load_ink_layer(&key)
                .with_context(|| format!("Failed to load ink {key}"))?
                .map_or(0, |layer| layer.strokes.len());
            pages.insert(page.to_string(), serde_json::Value::from(strokes));
        }
        ink.insert(user, serde_json::Value::Object(pages));
    }

    let report = serde_json::json!({
        "document": document_id,
        "markers": markers,
        "ink": ink,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
