use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::card::{self, AssetMap, CardVersion, CharacterCard, CharacterPayload};
use crate::config::WriteConfig;
use crate::hash::{self, ImageFormat};
use crate::jpeg;
use crate::png::{self, GenerateOptions};

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// The container type of an image file.
///
/// - **PNG** files can carry character cards and are content-hashed by chunk.
/// - **JPEG** files can be tagged with a source URL (XMP) and are
///   content-hashed by segment.
///
/// # Example
///
/// ```rust
/// use chara_card::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("card.PNG")), Some(ImageKind::Png));
/// assert_eq!(ImageKind::from_path(Path::new("photo.jpeg")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("anim.gif")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Determine the image kind from the file contents.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        hash::detect(bytes).map(|format| match format {
            ImageFormat::Png => Self::Png,
            ImageFormat::Jpeg => Self::Jpeg,
        })
    }
}

/// Character data read from a file, in every stage of decoding.
#[derive(Debug, Clone)]
pub struct CardRead {
    /// What the PNG walker found.
    pub payload: CharacterPayload,
    /// The card JSON text.
    pub json: String,
    /// The normalized card.
    pub card: CharacterCard,
}

/// Outcome of a write to an image file.
#[derive(Debug, Default)]
pub struct WriteResult {
    /// Size of the rebuilt image.
    pub bytes: usize,
    /// Backup created before writing, if any.
    pub backup_path: Option<PathBuf>,
    /// `true` when nothing was written because of dry-run mode.
    pub dry_run: bool,
}

/// Content hash of one file.
#[derive(Debug)]
pub struct HashResult {
    pub path: PathBuf,
    pub hash: Option<String>,
    pub error: Option<String>,
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only `.png`, `.jpg` and `.jpeg` files are
/// included.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
pub(crate) fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Create a backup of the original file, unless one already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

fn read_image(path: &Path) -> Result<(Vec<u8>, ImageKind)> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image file {}", path.display()))?;
    let kind = ImageKind::from_bytes(&bytes)
        .with_context(|| format!("Not a PNG or JPEG file: {}", path.display()))?;
    Ok((bytes, kind))
}

fn commit(path: &Path, output: Vec<u8>, config: &WriteConfig) -> Result<WriteResult> {
    let mut result = WriteResult {
        bytes: output.len(),
        ..Default::default()
    };

    if config.dry_run {
        log::info!("DRY RUN: {} left unchanged", path.display());
        result.dry_run = true;
        return Ok(result);
    }

    if config.backup_originals {
        match backup_file(path) {
            Ok(backup) => result.backup_path = Some(backup),
            Err(e) => log::warn!("Failed to backup {}: {e}", path.display()),
        }
    }

    std::fs::write(path, &output)
        .with_context(|| format!("Failed to write image file {}", path.display()))?;
    Ok(result)
}

/// Read and normalize the character card embedded in an image file.
///
/// Returns `Ok(None)` when the file carries no card (including every JPEG).
pub fn read_card(path: &Path) -> Result<Option<CardRead>> {
    let (bytes, kind) = read_image(path)?;
    if kind == ImageKind::Jpeg {
        log::debug!("{} is a JPEG; cards are only stored in PNG", path.display());
        return Ok(None);
    }

    let Some(payload) = png::parse(&bytes)
        .with_context(|| format!("Failed to parse PNG {}", path.display()))?
    else {
        return Ok(None);
    };

    let json = card::decode_payload(&payload).context("Failed to decode card payload")?;
    let card = card::normalize(&json).context("Failed to parse card JSON")?;

    Ok(Some(CardRead {
        payload,
        json,
        card,
    }))
}

/// Embed card JSON into a PNG file, replacing any card already there.
///
/// The JSON is validated first. For v2 it is Base64-encoded before embedding,
/// which is what readers of the `chara` keyword expect.
pub fn write_card(
    path: &Path,
    card_json: &str,
    options: &GenerateOptions,
    config: &WriteConfig,
) -> Result<WriteResult> {
    card::normalize(card_json).context("Card JSON is invalid")?;

    let (bytes, kind) = read_image(path)?;
    if kind != ImageKind::Png {
        anyhow::bail!(
            "Character cards can only be embedded in PNG files: {}",
            path.display()
        );
    }

    let payload = match options.version {
        CardVersion::V2 => STANDARD.encode(card_json.as_bytes()),
        CardVersion::V3 => card_json.to_string(),
    };

    let output = png::generate(&bytes, &payload, options)
        .with_context(|| format!("Failed to embed card in {}", path.display()))?;
    commit(path, output, config)
}

/// Assets currently embedded in a PNG, empty when it has none.
///
/// [`png::generate`] drops every asset chunk, so a v3 rewrite that should
/// keep them passes these back in through [`GenerateOptions::v3`].
pub fn existing_assets(path: &Path) -> Result<AssetMap> {
    let (bytes, kind) = read_image(path)?;
    if kind != ImageKind::Png {
        return Ok(AssetMap::new());
    }
    let payload = png::parse(&bytes)
        .with_context(|| format!("Failed to parse PNG {}", path.display()))?;
    Ok(payload.map(|p| p.assets).unwrap_or_default())
}

/// Record a JPEG's source URL in a new XMP segment.
pub fn tag_source(path: &Path, url: &str, config: &WriteConfig) -> Result<WriteResult> {
    let (bytes, kind) = read_image(path)?;
    if kind != ImageKind::Jpeg {
        anyhow::bail!("Source tagging needs a JPEG file: {}", path.display());
    }

    let packet = jpeg::build_source_xmp(url);
    let output = jpeg::inject_xmp(&bytes, &packet)
        .with_context(|| format!("Failed to tag {}", path.display()))?;
    commit(path, output, config)
}

/// Content hash of one file.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hash::digest(&bytes))
}

/// Build the hashing worker pool; `0` threads means one per core.
pub(crate) fn worker_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("hash-{i}"))
        .build()
        .context("Failed to build hashing thread pool")
}

/// Hash many files in parallel. Results are returned in input order.
pub fn hash_images(paths: &[PathBuf], threads: usize) -> Result<Vec<HashResult>> {
    let pool = worker_pool(threads)?;
    log::debug!(
        "Hashing {} file(s) on {} thread(s)",
        paths.len(),
        pool.current_num_threads()
    );

    let results = pool.install(|| {
        paths
            .par_iter()
            .map(|path| match hash_file(path) {
                Ok(hash) => HashResult {
                    path: path.clone(),
                    hash: Some(hash),
                    error: None,
                },
                Err(e) => HashResult {
                    path: path.clone(),
                    hash: None,
                    error: Some(format!("{e:#}")),
                },
            })
            .collect()
    });

    Ok(results)
}
