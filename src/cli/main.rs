use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use chara_card::card::{CardVersion, CharacterCard};
use chara_card::png::GenerateOptions;
use chara_card::scan::{self, AnnotationIndex};
use chara_card::{config, jpeg, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "chara-card",
    version,
    about = "Read, embed and hash character-card metadata in PNG and JPEG images"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Display the embedded character card (or JPEG source URL)
    #[arg(long = "show-card")]
    show_card: bool,

    /// Print the metadata-invariant content hash of each image
    #[arg(long)]
    hash: bool,

    /// Scan directories and print annotation records keyed by content hash
    #[arg(long)]
    scan: bool,

    /// Embed the card JSON from FILE into each PNG
    #[arg(long = "write-card", value_name = "FILE")]
    write_card: Option<PathBuf>,

    /// Card schema to embed with --write-card (v2 or v3; default from config).
    /// A v3 write keeps the assets already embedded in each file
    #[arg(long = "card-version", value_name = "VERSION")]
    card_version: Option<CardVersion>,

    /// Record URL as the source of each JPEG (XMP)
    #[arg(long = "tag-source", value_name = "URL")]
    tag_source: Option<String>,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.write.dry_run = true;
    }

    // Handle --scan (directories, not individual files)
    if cli.scan {
        return run_scan(&cli, &config);
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    if cli.hash {
        return run_hash(&cli, &images, &config);
    }

    if cli.show_card {
        return run_show(&cli, &images);
    }

    if cli.write_card.is_none() && cli.tag_source.is_none() {
        anyhow::bail!(
            "Nothing to do. Use --show-card, --hash, --scan, --write-card or --tag-source."
        );
    }

    log::info!("Found {} image(s) to process", images.len());
    if config.write.dry_run {
        log::info!("DRY RUN: no files will be modified");
    }

    let card_json = match &cli.write_card {
        Some(file) => Some(
            std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read card file {}", file.display()))?,
        ),
        None => None,
    };
    let version = cli.card_version.unwrap_or(config.write.default_version);

    let total = images.len();
    let mut failed = 0usize;
    let mut results = Vec::new();

    for (i, image_path) in images.iter().enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, image_path.display());

        let outcome = match pipeline::ImageKind::from_path(image_path) {
            Some(pipeline::ImageKind::Png) => card_json.as_deref().map(|json| {
                let written = card_options(image_path, version).and_then(|options| {
                    pipeline::write_card(image_path, json, &options, &config.write)
                });
                ("card", written)
            }),
            Some(pipeline::ImageKind::Jpeg) => cli
                .tag_source
                .as_deref()
                .map(|url| ("source", pipeline::tag_source(image_path, url, &config.write))),
            None => None,
        };

        let Some((what, outcome)) = outcome else {
            log::info!("  Skipped: nothing to write for this format");
            continue;
        };

        match outcome {
            Ok(result) => {
                if result.dry_run {
                    log::info!("  Would write {what} ({} bytes)", result.bytes);
                } else {
                    log::info!("  Wrote: {what}");
                }
                if let Some(ref backup) = result.backup_path {
                    log::info!("  Backup: {}", backup.display());
                }
                results.push(serde_json::json!({
                    "path": image_path.display().to_string(),
                    "written": what,
                    "bytes": result.bytes,
                    "dry_run": result.dry_run,
                    "backup_path": result.backup_path.as_ref().map(|p| p.display().to_string()),
                    "error": null,
                }));
            }
            Err(e) => {
                log::error!("  Error: {e:#}");
                failed += 1;
                results.push(serde_json::json!({
                    "path": image_path.display().to_string(),
                    "written": null,
                    "error": format!("{e:#}"),
                }));
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    let success = results.len() - failed;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

/// Options for embedding a card into `path`; v3 carries over the file's assets.
fn card_options(path: &Path, version: CardVersion) -> Result<GenerateOptions> {
    match version {
        CardVersion::V2 => Ok(GenerateOptions::v2()),
        CardVersion::V3 => Ok(GenerateOptions::v3(pipeline::existing_assets(path)?)),
    }
}

fn run_hash(cli: &Cli, images: &[PathBuf], config: &config::Config) -> Result<()> {
    let results = pipeline::hash_images(images, config.scan.threads)?;

    if cli.json {
        let json: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "hash": r.hash,
                    "error": r.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    for r in &results {
        match (&r.hash, &r.error) {
            (Some(hash), _) => println!("{hash}  {}", r.path.display()),
            (None, Some(err)) => log::error!("{}: {err}", r.path.display()),
            (None, None) => {}
        }
    }
    Ok(())
}

fn run_scan(cli: &Cli, config: &config::Config) -> Result<()> {
    let index = AnnotationIndex::new();

    for root in &cli.paths {
        if !root.is_dir() {
            log::warn!("Skipping non-directory: {}", root.display());
            continue;
        }
        let summary = scan::scan_project(root, config.scan.project_id, &index, &config.scan)?;
        log::info!(
            "{}: {} file(s), {} new, {} merged, {} unchanged, {} failed",
            root.display(),
            summary.files,
            summary.created,
            summary.merged,
            summary.unchanged,
            summary.failed
        );
    }

    if cli.json {
        println!("{}", index.to_json()?);
    } else {
        for record in index.records() {
            println!("{}  {}", record.content_hash, record.relative_paths.join(", "));
        }
    }
    Ok(())
}

fn run_show(cli: &Cli, images: &[PathBuf]) -> Result<()> {
    let mut json = Vec::new();

    for image_path in images {
        match pipeline::ImageKind::from_path(image_path) {
            Some(pipeline::ImageKind::Jpeg) => {
                let source = read_source_url(image_path)?;
                if cli.json {
                    json.push(serde_json::json!({
                        "path": image_path.display().to_string(),
                        "source_url": source,
                    }));
                } else {
                    print_header(image_path);
                    match source {
                        Some(url) => print_row("SourceUrl", &url),
                        None => println!("  {DIM}(no source URL recorded){RESET}"),
                    }
                    println!();
                }
            }
            _ => {
                let read = pipeline::read_card(image_path)?;
                if cli.json {
                    json.push(serde_json::json!({
                        "path": image_path.display().to_string(),
                        "version": read.as_ref().map(|r| r.payload.version),
                        "card": read.as_ref().map(|r| &r.card),
                        "assets": read
                            .as_ref()
                            .map(|r| r.payload.assets.keys().collect::<Vec<_>>()),
                    }));
                } else {
                    print_header(image_path);
                    match read {
                        Some(read) => {
                            let assets = read.payload.assets.len();
                            print_card(&read.card, read.payload.version, assets)
                        }
                        None => println!("  {DIM}(no character card found){RESET}"),
                    }
                    println!();
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}

fn read_source_url(path: &Path) -> Result<Option<String>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let packet = jpeg::read_xmp(&bytes)
        .with_context(|| format!("Failed to parse JPEG {}", path.display()))?;
    Ok(packet.as_deref().and_then(jpeg::source_url))
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

fn print_header(path: &Path) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));
}

/// Print a normalized card, organized by section.
fn print_card(card: &CharacterCard, version: CardVersion, assets: usize) {
    println!("  {BOLD}Card{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_row("Schema", version.as_str());
    if assets > 0 {
        print_row("Assets", &assets.to_string());
    }

    let fields: [(&str, &str); 13] = [
        ("Name", &card.name),
        ("Gender", &card.gender),
        ("Creator", &card.creator),
        ("CharacterVersion", &card.character_version),
        ("Description", &card.description),
        ("FullDescription", &card.full_description),
        ("Personality", &card.personality),
        ("Scenario", &card.scenario),
        ("FirstMessage", &card.first_mes),
        ("ExampleDialogue", &card.example_dialogue),
        ("SystemPrompt", &card.system_prompt),
        ("PostHistory", &card.post_history_instructions),
        ("CreatorNotes", &card.creator_notes),
    ];
    for (tag, val) in fields {
        if !val.is_empty() {
            print_row(tag, val);
        }
    }

    if !card.tags.is_empty() {
        print_row("Tags", &card.tags.join("; "));
    }
    for (i, greeting) in card.alternate_greetings.iter().enumerate() {
        print_row(&format!("AltGreeting[{}]", i + 1), greeting);
    }
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
