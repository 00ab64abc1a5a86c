//! `snips` command line front-end
//!
//! Headless stand-in for the library browser: every command opens the
//! configured user's library, does one thing, and exits.

use clap::{Parser, Subcommand};
use snip_library::config::{list_users, LibraryConfig};
use snip_library::coordinator::create::CreateRequest;
use snip_library::logging::init_logging;
use snip_library::preview::loader::ConsumerId;
use snip_library::state::name::{self, display_name};
use snip_library::store::collaborators::{ExistingImages, FileImport};
use snip_library::{LibrarySession, NameField, PreviewStatus, SnipName, SnipRecord};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::error;
use walkdir::WalkDir;

/// How long `show` waits for background decoding
const PREVIEW_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "snips")]
#[command(about = "Manage a library of reusable node snips")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Library root, one directory per user
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Library owner
    #[arg(long, global = true)]
    user: Option<String>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the users that have a library
    Users,
    /// List snips, newest first
    List {
        /// Match identifier, summary or keywords
        #[arg(long)]
        search: Option<String>,
        /// Group by an identifier field (context, type, name, source, version)
        #[arg(long)]
        group: Option<NameField>,
        /// Only snips from this source
        #[arg(long)]
        source: Option<String>,
    },
    /// Show one snip and decode its previews
    Show { identifier: String },
    /// Import an exported snip file
    Create {
        #[arg(long)]
        context: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        source: String,
        #[arg(long, default_value_t = 1)]
        version: u8,
        /// Exported snip file to import
        #[arg(long)]
        from: PathBuf,
        #[arg(long, default_value = "")]
        summary: String,
        /// Directory of rendered frames for the flipbook
        #[arg(long)]
        frames: Option<PathBuf>,
        /// Still image for the snapshot
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Rename a snip, either to a full identifier or by changing one field
    Rename {
        identifier: String,
        #[arg(long, conflicts_with_all = ["field", "value"])]
        to: Option<String>,
        #[arg(long, requires = "value")]
        field: Option<NameField>,
        #[arg(long, requires = "field")]
        value: Option<String>,
    },
    /// Delete a snip and its previews
    Delete { identifier: String },
    /// Replace a snip's summary
    Describe { identifier: String, summary: String },
    /// Replace or remove a snip's flipbook
    Flipbook {
        identifier: String,
        /// Directory of rendered frames
        #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
        frames: Option<PathBuf>,
        #[arg(long)]
        clear: bool,
    },
    /// Replace or remove a snip's snapshot
    Snapshot {
        identifier: String,
        #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
        image: Option<PathBuf>,
        #[arg(long)]
        clear: bool,
    },
    /// Report index records whose snip file is missing
    Verify,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match LibraryConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(user) = &cli.user {
        config.user = user.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(message) = run(cli.command, config) {
        error!("{}", message);
        eprintln!("❌ {}", message);
        process::exit(1);
    }
}

fn run(command: Commands, config: LibraryConfig) -> Result<(), String> {
    if let Commands::Users = command {
        for user in list_users(&config.root, &config.user) {
            let marker = if user == config.user { "*" } else { " " };
            println!("{} {}", marker, user);
        }
        return Ok(());
    }

    let mut session = LibrarySession::open(config).map_err(|e| e.to_string())?;
    if let Some(warning) = session.load_warning() {
        println!("⚠️  {}", warning);
    }

    match command {
        Commands::Users => {}
        Commands::List { search, group, source } => {
            let records: Vec<&SnipRecord> = session
                .search(search.as_deref().unwrap_or(""))
                .into_iter()
                .filter(|record| match &source {
                    Some(wanted) => name::parse(&record.identifier)
                        .map(|parsed| &parsed.source == wanted)
                        .unwrap_or(false),
                    None => true,
                })
                .collect();

            match group {
                Some(field) => {
                    for (key, members) in session.group_by(field) {
                        let members: Vec<&&SnipRecord> = members
                            .iter()
                            .filter(|record| records.iter().any(|r| r.identifier == record.identifier))
                            .collect();
                        if members.is_empty() {
                            continue;
                        }
                        let heading = match field {
                            NameField::Context | NameField::Version => key.clone(),
                            _ => display_name(&key),
                        };
                        println!("📂 {}", heading);
                        for record in members {
                            println!("   {}", line(record));
                        }
                    }
                }
                None => {
                    for record in &records {
                        println!("{}", line(record));
                    }
                }
            }
            println!("{} snip(s)", records.len());
        }
        Commands::Show { identifier } => {
            let record = session
                .find(&identifier)
                .cloned()
                .ok_or_else(|| format!("snip '{}' not found", identifier))?;
            print_record(&record);
            let set = session.store().artifact_set(&identifier);
            for (label, path) in [("snip", &set.snip), ("flipbook", &set.flipbook_pattern), ("snapshot", &set.snapshot)] {
                let state = if path.exists() || (label == "flipbook" && set.flipbook_dir.is_dir()) {
                    "✅"
                } else {
                    "·"
                };
                println!("   {} {:<9} {}", state, label, path.display());
            }

            let entry = match session
                .request_preview(ConsumerId(0), &identifier)
                .map_err(|e| e.to_string())?
            {
                PreviewStatus::Ready(entry) => Some(entry),
                PreviewStatus::Pending(_) => session.wait_for_preview(PREVIEW_WAIT).map(|ready| ready.entry),
            };
            match entry {
                Some(entry) => {
                    let snapshot = entry
                        .snapshot
                        .as_ref()
                        .map(|img| format!("{}x{}", img.width(), img.height()))
                        .unwrap_or_else(|| "none".to_string());
                    println!("🖼️  preview: {} frame(s), snapshot {}", entry.frames.len(), snapshot);
                }
                None => println!("🖼️  preview: not ready"),
            }
        }
        Commands::Create {
            context,
            kind,
            name,
            source,
            version,
            from,
            summary,
            frames,
            snapshot,
        } => {
            let name = SnipName::new(&context, &kind, &name, &source, version).map_err(|e| e.to_string())?;
            let saver = FileImport { source: from };
            let capture = ExistingImages {
                frames_dir: frames,
                snapshot,
            };
            let outcome = session
                .create(CreateRequest {
                    name,
                    summary,
                    selected_items: Vec::new(),
                    saver: &saver,
                    capture: Some(&capture),
                })
                .map_err(|e| e.to_string())?;
            for warning in &outcome.warnings {
                println!("⚠️  {}", warning);
            }
            println!(
                "✅ created {} ({} frame(s), snapshot: {})",
                outcome.record.identifier,
                outcome.frames,
                if outcome.record.snapshot.is_some() { "yes" } else { "no" }
            );
        }
        Commands::Rename {
            identifier,
            to,
            field,
            value,
        } => {
            let outcome = match (to, field, value) {
                (Some(to), _, _) => session.rename(&identifier, &to),
                (None, Some(field), Some(value)) => session.rename_field(&identifier, field, &value),
                _ => return Err("give --to, or --field with --value".to_string()),
            }
            .map_err(|e| e.to_string())?;

            if outcome.is_noop() {
                println!("Nothing to do, name unchanged");
                return Ok(());
            }
            for dropped in &outcome.dropped {
                println!("⚠️  {}", dropped);
            }
            println!("✅ renamed {} -> {}", outcome.from, outcome.to);
        }
        Commands::Delete { identifier } => {
            let outcome = session.delete(&identifier).map_err(|e| e.to_string())?;
            for leftover in &outcome.leftovers {
                println!("⚠️  {}", leftover);
            }
            println!("🗑️  deleted {} ({} file artifact(s))", outcome.identifier, outcome.removed.len());
        }
        Commands::Describe { identifier, summary } => {
            let record = session.describe(&identifier, &summary).map_err(|e| e.to_string())?;
            println!("✅ {} keywords: {}", record.identifier, record.keywords.join(", "));
        }
        Commands::Flipbook {
            identifier,
            frames,
            clear,
        } => {
            let record = match frames {
                Some(dir) if !clear => {
                    let frames = image_files(&dir);
                    session.set_flipbook(&identifier, &frames)
                }
                _ => session.clear_flipbook(&identifier),
            }
            .map_err(|e| e.to_string())?;
            println!("✅ {} flipbook: {}", record.identifier, record.flipbook.as_deref().unwrap_or("none"));
        }
        Commands::Snapshot {
            identifier,
            image,
            clear,
        } => {
            let record = match image {
                Some(path) if !clear => session.set_snapshot(&identifier, &path),
                _ => session.clear_snapshot(&identifier),
            }
            .map_err(|e| e.to_string())?;
            println!("✅ {} snapshot: {}", record.identifier, record.snapshot.as_deref().unwrap_or("none"));
        }
        Commands::Verify => {
            let missing = session.verify();
            if missing.is_empty() {
                println!("✅ every record has its snip file");
            } else {
                for record in &missing {
                    println!("❌ {}", record.identifier);
                }
                return Err(format!("{} record(s) without a snip file", missing.len()));
            }
        }
    }

    Ok(())
}

fn line(record: &SnipRecord) -> String {
    let title = name::parse(&record.identifier)
        .map(|parsed| display_name(&parsed.name))
        .unwrap_or_else(|_| record.identifier.clone());
    format!("{:<40} {:<24} {} {}", record.identifier, title, record.date, record.time)
}

fn print_record(record: &SnipRecord) {
    println!("📄 {}", record.identifier);
    println!("   user:     {}", record.user);
    println!("   file:     {}/{}.{}", record.path, record.identifier, record.ext);
    println!("   size:     {} bytes", record.size);
    println!("   saved:    {} {}", record.date, record.time);
    println!("   flipbook: {}", record.flipbook.as_deref().unwrap_or("none"));
    println!("   snapshot: {}", record.snapshot.as_deref().unwrap_or("none"));
    println!("   summary:  {}", record.summary);
    println!("   keywords: {}", record.keywords.join(", "));
}

/// PNG and JPEG files of a directory, in name order
fn image_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| matches!(ext.to_string_lossy().to_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false)
        })
        .collect()
}
