use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use media_catalog::assets::lifecycle::ThumbnailRequest;
use media_catalog::assets::worker::{Completion, Completions};
use media_catalog::state::data::{split_list, EntryDraft};
use media_catalog::state::library::{BrowseQuery, SortOrder};
use media_catalog::state::transfer::export_entries;
use media_catalog::{logging, AssetLifecycle, CatalogConfig, Entry, Library};

/// Media Catalog - keep a local collection of titles with posters and screenshots
#[derive(Parser)]
#[command(name = "media-catalog")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Catalog root (holds catalog.json, copies/, thumbnails/ and deletion.log)
    #[arg(long, env = "MEDIA_CATALOG_ROOT")]
    root: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an entry
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        poster: String,
        /// Comma separated screenshot paths
        #[arg(long, default_value = "")]
        screenshots: String,
        /// Comma separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Edit an entry; omitted fields keep their current value
    Edit {
        title: String,
        #[arg(long)]
        new_title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        poster: Option<String>,
        #[arg(long)]
        screenshots: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete one or more entries together with their images
    Delete {
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// List entries
    List {
        #[arg(short, long, default_value = "")]
        search: String,
        /// Only entries carrying any of these tags
        #[arg(short, long)]
        tag: Vec<String>,
        #[arg(long, value_enum, default_value_t = Sort::Az)]
        sort: Sort,
    },
    /// List every tag in use
    Tags,
    /// Replace the tags of several entries
    SetTags {
        /// Comma separated tags
        #[arg(long)]
        tags: String,
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Export entries to a JSON file
    Export {
        path: PathBuf,
        /// Only these titles (default: everything)
        #[arg(long)]
        title: Vec<String>,
    },
    /// Import entries from a JSON file, replacing the collection
    Import { path: PathBuf },
    /// Remove copies and thumbnails no entry references
    Reconcile,
    /// Re-render every entry's thumbnails
    Regenerate,
    /// Print the thumbnail for an image, rendering it if needed
    Thumbnail { asset: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Sort {
    /// Title A-Z
    Az,
    /// Title Z-A
    Za,
    /// Newest first
    Date,
}

impl From<Sort> for SortOrder {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Az => SortOrder::TitleAsc,
            Sort::Za => SortOrder::TitleDesc,
            Sort::Date => SortOrder::DateAdded,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match cli.root {
        Some(root) => CatalogConfig::with_root(root),
        None => CatalogConfig::default(),
    };
    let (assets, mut completions) = AssetLifecycle::from_config(&config)
        .with_context(|| format!("Failed to prepare catalog at {}", config.root.display()))?;
    let mut library = Library::open(&config.db_path).context("Failed to open catalog")?;

    match cli.command {
        Commands::Add {
            title,
            description,
            poster,
            screenshots,
            tags,
        } => {
            let draft = EntryDraft::new(title)
                .description(description)
                .poster(poster)
                .screenshots(split_list(&screenshots))
                .tags(split_list(&tags));
            let entry = assets.create(&mut library, draft)?;
            println!("✅ Added '{}'", entry.title);
        }
        Commands::Edit {
            title,
            new_title,
            description,
            poster,
            screenshots,
            tags,
        } => {
            let Some(current) = library.find_by_title(&title).cloned() else {
                bail!("No entry titled '{}'", title);
            };
            let draft = EntryDraft {
                title: new_title.unwrap_or(current.title),
                description: description.unwrap_or(current.description),
                poster_path: poster.unwrap_or(current.poster_path),
                screenshots_paths: screenshots
                    .map(|s| split_list(&s))
                    .unwrap_or(current.screenshots_paths),
                tags: tags.map(|t| split_list(&t)).unwrap_or(current.tags),
            };
            let entry = assets.update(&mut library, &title, draft)?;
            println!("✅ Updated '{}'", entry.title);
        }
        Commands::Delete { titles } => {
            let report = assets.delete_many(&mut library, &titles);
            for entry in &report.deleted {
                println!("🗑️  Deleted '{}'", entry.title);
            }
            for (title, err) in &report.failed {
                eprintln!("⚠️  {}: {}", title, err);
            }
        }
        Commands::List { search, tag, sort } => {
            let query = BrowseQuery {
                text: search,
                tags: tag,
                sort: sort.into(),
            };
            for entry in library.browse(&query) {
                print_entry(entry);
            }
        }
        Commands::Tags => {
            for tag in library.tags() {
                println!("{}", tag);
            }
        }
        Commands::SetTags { tags, titles } => {
            let changed = library.set_tags(&titles, &split_list(&tags))?;
            println!("🏷️  Updated tags on {} entries", changed);
        }
        Commands::Export { path, title } => {
            let selection = (!title.is_empty()).then_some(title.as_slice());
            let entries = library.export(selection);
            let written = export_entries(&entries, &path)?;
            println!("📤 Exported {} entries to {}", entries.len(), written.display());
        }
        Commands::Import { path } => {
            let report = library
                .import_path(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!("📥 Imported {}, skipped {}", report.imported, report.skipped);
            for error in &report.errors {
                eprintln!("   {}", error);
            }
        }
        Commands::Reconcile => {
            let report = assets.reconcile(&library);
            println!(
                "🧹 Copies: removed {}, kept {}, failed {}",
                report.copies.removed.len(),
                report.copies.kept.len(),
                report.copies.failed.len()
            );
            println!(
                "🧹 Thumbnails: removed {}, kept {}, failed {}",
                report.thumbnails.removed.len(),
                report.thumbnails.kept.len(),
                report.thumbnails.failed.len()
            );
        }
        Commands::Regenerate => {
            let queued = assets.regenerate_all(&library);
            println!("⏳ Regenerating thumbnails for {} entries...", queued);
        }
        Commands::Thumbnail { asset } => {
            if let ThumbnailRequest::Ready(path) = assets.request_thumbnail(&asset) {
                println!("{}", path.display());
            }
        }
    }

    drain(&mut completions);
    Ok(())
}

/// Wait for background jobs and report their results on this thread
fn drain(completions: &mut Completions) {
    while let Some(completion) = completions.wait_next() {
        match completion {
            Completion::Regenerated { title, report } => {
                println!(
                    "📸 '{}': {} thumbnails ready, {} failed",
                    title,
                    report.created.len(),
                    report.failed.len()
                );
                for (path, reason) in report.failed {
                    eprintln!("   {}: {}", path.display(), reason);
                }
            }
            Completion::Rendered { asset, result } => match result {
                Ok(path) => println!("{}", path.display()),
                Err(e) => eprintln!("❌ {}: {}", asset.display(), e),
            },
            Completion::Crashed { message, .. } => eprintln!("❌ Asset job crashed: {}", message),
        }
    }
}

fn print_entry(entry: &Entry) {
    println!("{}", entry.title);
    if !entry.description.is_empty() {
        println!("    {}", entry.description);
    }
    if !entry.tags.is_empty() {
        println!("    tags: {}", entry.tags.join(", "));
    }
    println!(
        "    added {} | poster: {} | {} screenshots",
        entry.added_date,
        if entry.poster_path.is_empty() { "-" } else { &entry.poster_path },
        entry.screenshots_paths.len()
    );
}
