//! Builds the catalog snapshot from a target directory and manages duplicates.
//!
//! Files are grouped by copy-group id (see [`fs_scan::copy_group_id`]); the first
//! file of a group in name order is the one that gets transferred, the rest are
//! listed as duplicates.

use crate::catalog::format_representation;
use crate::fs_scan::{self, ScannedFile};
use crate::types::Representation;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

pub const INDEX_FILE: &str = "index.json";
pub const DUPLICATES_FILE: &str = "duplicates.txt";
pub const DELETES_FILE: &str = "deletes.txt";

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub recursive: bool,
    pub by_content: bool,
    pub with_metadata: bool,
    pub workers: Option<usize>,
}

#[derive(Debug, Default)]
pub struct CatalogIndex {
    /// item_id -> [representation]
    pub index: BTreeMap<String, Vec<String>>,
    /// Relative paths of every non-first representation.
    pub duplicates: Vec<String>,
}

struct Probe {
    rel_path: String,
    size: u64,
    mtime_unix_ms: i64,
    quick_hash: Option<String>,
}

/// `<res_dir>/<target_dir with '/' replaced by '_'>`
pub fn results_dir(res_dir: &Path, target_dir: &Path) -> PathBuf {
    let key = target_dir
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .replace(['/', '\\'], "_");
    res_dir.join(key)
}

fn probe(f: &ScannedFile, by_content: bool) -> Result<Probe> {
    if by_content {
        let st = fs_scan::stat_file(&f.abs_path)?;
        return Ok(Probe {
            rel_path: f.rel_path.clone(),
            size: st.size,
            mtime_unix_ms: st.mtime_unix_ms,
            quick_hash: Some(st.quick_hash),
        });
    }

    let meta = fs::metadata(&f.abs_path)
        .with_context(|| format!("metadata {}", f.abs_path.display()))?;
    let mtime_unix_ms = meta
        .modified()?
        .duration_since(std::time::SystemTime::UNIX_EPOCH)?
        .as_millis() as i64;

    Ok(Probe {
        rel_path: f.rel_path.clone(),
        size: meta.len(),
        mtime_unix_ms,
        quick_hash: None,
    })
}

/// EXIF-style `YYYY:MM:DD HH:MM:SS` in local time.
fn exif_datetime(mtime_unix_ms: i64) -> Option<String> {
    let fmt = format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from_unix_timestamp_nanos(mtime_unix_ms as i128 * 1_000_000)
        .ok()?
        .to_offset(offset)
        .format(&fmt)
        .ok()
}

pub fn build_index(target_root: &Path, opts: IndexOptions) -> Result<CatalogIndex> {
    if !target_root.is_dir() {
        return Err(anyhow!("Target dir not found: {}", target_root.display()));
    }

    let (files, skipped_dirs) = fs_scan::list_files(target_root, opts.recursive)?;
    for d in &skipped_dirs {
        info!(dir = %d.display(), "skip directory");
    }

    let workers = opts.workers.unwrap_or_else(num_cpus::get).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| anyhow!("rayon threadpool build failed: {}", e))?;

    info!(
        root = %target_root.display(),
        files = files.len(),
        workers,
        by_content = opts.by_content,
        "indexing target dir"
    );

    // par_iter().collect() giữ nguyên thứ tự => group ổn định
    let probes: Vec<Result<Probe>> =
        pool.install(|| files.par_iter().map(|f| probe(f, opts.by_content)).collect());

    let mut out = CatalogIndex::default();
    for p in probes {
        let p = p?;
        let id = fs_scan::copy_group_id(Path::new(&p.rel_path), p.size, p.quick_hash.as_deref());
        let group = out.index.entry(id.clone()).or_default();

        if group.is_empty() {
            let metadata = if opts.with_metadata {
                exif_datetime(p.mtime_unix_ms).map(|dt| json!({ "DateTime": dt }))
            } else {
                None
            };
            group.push(format_representation(&Representation {
                location: p.rel_path,
                metadata,
            }));
        } else {
            debug!(path = %p.rel_path, id = %id, "found duplicate");
            out.duplicates.push(p.rel_path.clone());
            group.push(p.rel_path);
        }
    }

    info!(
        items = out.index.len(),
        duplicates = out.duplicates.len(),
        "index built"
    );
    Ok(out)
}

/// Ghi index.json + duplicates.txt vào results dir. Trả về đường dẫn index.json.
pub fn write_index(dir: &Path, idx: &CatalogIndex) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let index_file = dir.join(INDEX_FILE);
    let s = serde_json::to_string_pretty(&idx.index)?;
    fs::write(&index_file, s).with_context(|| format!("write {}", index_file.display()))?;
    info!(path = %index_file.display(), "catalog snapshot saved");

    let dup_file = dir.join(DUPLICATES_FILE);
    fs::write(&dup_file, idx.duplicates.join("\n"))
        .with_context(|| format!("write {}", dup_file.display()))?;
    info!(
        path = %dup_file.display(),
        count = idx.duplicates.len(),
        "duplicate names saved"
    );

    Ok(index_file)
}

/// Xoá các file trong duplicates.txt, ghi lại danh sách vào deletes.txt.
pub fn delete_duplicates(target_root: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let dup_file = dir.join(DUPLICATES_FILE);
    let s = fs::read_to_string(&dup_file)
        .with_context(|| format!("read {}", dup_file.display()))?;

    let names: Vec<&str> = s
        .lines()
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .filter(|l| !l.trim().is_empty())
        .collect();
    info!(count = names.len(), path = %dup_file.display(), "deleting listed duplicates");

    let mut deleted = Vec::new();
    for name in names {
        let p = target_root.join(name);
        match fs::remove_file(&p) {
            Ok(()) => {
                debug!(path = %p.display(), "deleted duplicate");
                deleted.push(p);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %p.display(), "duplicate already gone");
            }
            Err(e) => return Err(e).with_context(|| format!("delete {}", p.display())),
        }
    }

    let deletes_file = dir.join(DELETES_FILE);
    let mut body = String::new();
    for p in &deleted {
        body.push_str(&p.to_string_lossy());
        body.push('\n');
    }
    fs::write(&deletes_file, body)
        .with_context(|| format!("write {}", deletes_file.display()))?;
    info!(
        count = deleted.len(),
        path = %deletes_file.display(),
        "saved deleted file names"
    );

    Ok(deleted)
}
