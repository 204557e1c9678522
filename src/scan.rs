//! Project scanning: directory tree, content hashing and annotation records.
//!
//! A scan walks a project root into a [`DirTree`], hashes every supported
//! image on a worker pool and registers each digest in an [`AnnotationIndex`].
//! Records are keyed by content hash, so a file that is moved, renamed or has
//! its card rewritten keeps its annotations.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::pipeline::{self, is_supported_image};

/// One directory in a [`DirTree`].
#[derive(Debug, Clone, Default)]
pub struct DirNode {
    /// Directory name; empty for the root.
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Supported image files directly inside this directory, sorted by name.
    pub files: Vec<PathBuf>,
}

/// Directory hierarchy stored as an arena of [`DirNode`]s.
///
/// Index `0` is always the root.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
    nodes: Vec<DirNode>,
}

impl DirTree {
    /// Walk `root` and record every directory and supported image below it.
    ///
    /// Unreadable entries are logged and skipped.
    pub fn build(root: &Path, follow_links: bool) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Not a directory: {}", root.display());
        }

        let mut nodes = vec![DirNode::default()];
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        index.insert(root.to_path_buf(), 0);

        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(follow_links)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };

            let path = entry.path();
            let Some(&parent) = path.parent().and_then(|p| index.get(p)) else {
                log::warn!("No parent recorded for {}", path.display());
                continue;
            };

            if entry.file_type().is_dir() {
                let id = nodes.len();
                nodes.push(DirNode {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    parent: Some(parent),
                    ..Default::default()
                });
                nodes[parent].children.push(id);
                index.insert(path.to_path_buf(), id);
            } else if entry.file_type().is_file() && is_supported_image(path) {
                nodes[parent].files.push(path.to_path_buf());
            }
        }

        log::debug!(
            "Built tree of {} director(ies) under {}",
            nodes.len(),
            root.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            nodes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn nodes(&self) -> &[DirNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> Option<&DirNode> {
        self.nodes.get(id)
    }

    /// Full path of directory `id`, rebuilt from its ancestors.
    pub fn dir_path(&self, id: usize) -> Option<PathBuf> {
        let mut names = Vec::new();
        let mut current = self.nodes.get(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = &self.nodes[parent];
        }

        let mut path = self.root.clone();
        path.extend(names.iter().rev());
        Some(path)
    }

    /// Every image in the tree, depth-first in name order.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            out.extend(node.files.iter().cloned());
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Path of `file` relative to the root, `/`-separated.
    pub fn relative_path(&self, file: &Path) -> Option<String> {
        relative_path(&self.root, file)
    }
}

fn relative_path(root: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// User annotations for one image, keyed by its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub content_hash: String,
    pub project_id: i64,
    /// Every location the image has been seen at, in discovery order.
    pub relative_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AnnotationRecord {
    pub fn new(content_hash: &str, project_id: i64, relative_path: &str) -> Self {
        Self {
            content_hash: content_hash.to_string(),
            project_id,
            relative_paths: vec![relative_path.to_string()],
            tags: None,
            links: None,
            starred: false,
            notes: None,
        }
    }
}

/// What [`AnnotationIndex::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First sighting of this hash.
    Created,
    /// Known hash, new path appended.
    Merged,
    /// Known hash and path.
    Unchanged,
}

/// In-memory annotation registry.
///
/// Registration is an upsert under one lock, so two scans that find the same
/// image at different paths both end up in `relative_paths`.
#[derive(Debug, Default)]
pub struct AnnotationIndex {
    records: Mutex<HashMap<String, AnnotationRecord>>,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = AnnotationRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.content_hash.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    /// Load records from the JSON written by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let records: Vec<AnnotationRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Insert `hash` or merge `relative_path` into its existing record.
    ///
    /// An existing record keeps its original `project_id`.
    pub fn register(&self, hash: &str, project_id: i64, relative_path: &str) -> Registration {
        let mut records = self.records.lock();
        match records.entry(hash.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(AnnotationRecord::new(hash, project_id, relative_path));
                Registration::Created
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.relative_paths.iter().any(|p| p == relative_path) {
                    return Registration::Unchanged;
                }
                log::debug!("{hash}: also found at {relative_path}");
                record.relative_paths.push(relative_path.to_string());
                Registration::Merged
            }
        }
    }

    pub fn get(&self, hash: &str) -> Option<AnnotationRecord> {
        self.records.lock().get(hash).cloned()
    }

    /// Snapshot of all records, sorted by hash.
    pub fn records(&self) -> Vec<AnnotationRecord> {
        let mut out: Vec<_> = self.records.lock().values().cloned().collect();
        out.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        out
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.records())?)
    }
}

/// Counts from one [`scan_project`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: usize,
    pub created: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Hash every image under `root` and register it in `index`.
pub fn scan_project(
    root: &Path,
    project_id: i64,
    index: &AnnotationIndex,
    config: &ScanConfig,
) -> Result<ScanSummary> {
    let tree = DirTree::build(root, config.follow_links)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    let files = tree.files();
    let pool = pipeline::worker_pool(config.threads)?;

    log::info!(
        "Scanning {} image(s) under {} ({} thread(s))",
        files.len(),
        root.display(),
        pool.current_num_threads()
    );

    let created = AtomicUsize::new(0);
    let merged = AtomicUsize::new(0);
    let unchanged = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    pool.install(|| {
        files.par_iter().for_each(|path| {
            let Some(rel) = tree.relative_path(path) else {
                failed.fetch_add(1, Ordering::Relaxed);
                return;
            };
            match pipeline::hash_file(path) {
                Ok(hash) => {
                    let counter = match index.register(&hash, project_id, &rel) {
                        Registration::Created => &created,
                        Registration::Merged => &merged,
                        Registration::Unchanged => &unchanged,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!("{rel}: {e:#}");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    });

    Ok(ScanSummary {
        files: files.len(),
        created: created.into_inner(),
        merged: merged.into_inner(),
        unchanged: unchanged.into_inner(),
        failed: failed.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::chunk::{IDAT, IEND, IHDR, SIGNATURE, TEXT, write_chunk};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn png(pixels: &[u8], text: Option<&[u8]>) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        write_chunk(&mut out, &IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut out, &IDAT, pixels).unwrap();
        if let Some(text) = text {
            write_chunk(&mut out, &TEXT, text).unwrap();
        }
        write_chunk(&mut out, &IEND, &[]).unwrap();
        out
    }

    /// root/{a.png, notes.txt, chars/{b.png, old/c.png}, empty/}
    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("chars/old")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::write(root.join("a.png"), png(b"one", None)).unwrap();
        fs::write(root.join("notes.txt"), b"hi").unwrap();
        fs::write(root.join("chars/b.png"), png(b"two", None)).unwrap();
        // Same pixels as a.png, different metadata.
        fs::write(root.join("chars/old/c.png"), png(b"one", Some(b"chara\0e30="))).unwrap();
        dir
    }

    // ── DirTree ──────────────────────────────────────────────────────

    #[test]
    fn tree_shape() {
        let dir = project();
        let tree = DirTree::build(dir.path(), true).unwrap();

        let names: Vec<_> = tree.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["", "chars", "old", "empty"]);

        let root = tree.node(0).unwrap();
        assert_eq!(root.parent, None);
        assert_eq!(root.children, [1, 3]);
        assert_eq!(root.files, [dir.path().join("a.png")]);

        let old = tree.node(2).unwrap();
        assert_eq!(old.parent, Some(1));
        assert_eq!(tree.dir_path(2).unwrap(), dir.path().join("chars/old"));
        assert!(tree.node(3).unwrap().files.is_empty());
    }

    #[test]
    fn tree_files_and_relative_paths() {
        let dir = project();
        let tree = DirTree::build(dir.path(), false).unwrap();
        let rel: Vec<_> = tree
            .files()
            .iter()
            .map(|f| tree.relative_path(f).unwrap())
            .collect();
        assert_eq!(rel, ["a.png", "chars/b.png", "chars/old/c.png"]);
        assert_eq!(tree.relative_path(Path::new("/elsewhere/x.png")), None);
    }

    #[test]
    fn tree_rejects_file_root() {
        let dir = project();
        assert!(DirTree::build(&dir.path().join("a.png"), true).is_err());
    }

    // ── AnnotationIndex ──────────────────────────────────────────────

    #[test]
    fn register_created_merged_unchanged() {
        let index = AnnotationIndex::new();
        assert_eq!(index.register("abc", 7, "a.png"), Registration::Created);
        assert_eq!(index.register("abc", 9, "b.png"), Registration::Merged);
        assert_eq!(index.register("abc", 7, "a.png"), Registration::Unchanged);

        let record = index.get("abc").unwrap();
        assert_eq!(record.project_id, 7);
        assert_eq!(record.relative_paths, ["a.png", "b.png"]);
        assert!(!record.starred);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn concurrent_registration_keeps_every_path() {
        let index = Arc::new(AnnotationIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || index.register("same", 1, &format!("dir{i}/x.png")))
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            outcomes.iter().filter(|r| **r == Registration::Created).count(),
            1
        );
        assert_eq!(index.get("same").unwrap().relative_paths.len(), 8);
    }

    #[test]
    fn record_json_is_camel_case() {
        let mut record = AnnotationRecord::new("ff00", 3, "x/y.png");
        record.tags = Some(vec!["fav".into()]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contentHash": "ff00",
                "projectId": 3,
                "relativePaths": ["x/y.png"],
                "tags": ["fav"],
                "starred": false
            })
        );
    }

    #[test]
    fn index_json_round_trip() {
        let index = AnnotationIndex::new();
        index.register("b", 1, "b.png");
        index.register("a", 1, "a.png");

        let json = index.to_json().unwrap();
        let loaded = AnnotationIndex::from_json(&json).unwrap();
        assert_eq!(loaded.records(), index.records());
        assert_eq!(loaded.records()[0].content_hash, "a");
    }

    // ── scan_project ─────────────────────────────────────────────────

    #[test]
    fn scan_groups_identical_pixels() {
        let dir = project();
        let index = AnnotationIndex::new();
        let config = ScanConfig {
            threads: 2,
            ..Default::default()
        };

        let summary = scan_project(dir.path(), 5, &index, &config).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.merged, 1);
        assert_eq!(summary.failed, 0);

        let shared = index
            .records()
            .into_iter()
            .find(|r| r.relative_paths.len() == 2)
            .unwrap();
        let mut paths = shared.relative_paths.clone();
        paths.sort();
        assert_eq!(paths, ["a.png", "chars/old/c.png"]);
        assert_eq!(shared.project_id, 5);
    }

    #[test]
    fn rescan_is_unchanged() {
        let dir = project();
        let index = AnnotationIndex::new();
        let config = ScanConfig::default();

        scan_project(dir.path(), 1, &index, &config).unwrap();
        let again = scan_project(dir.path(), 1, &index, &config).unwrap();
        assert_eq!(again.created + again.merged, 0);
        assert_eq!(again.unchanged, 3);
        assert_eq!(index.len(), 2);
    }
}
