use crate::catalog::Catalog;
use crate::eligibility::{ContentClass, EligibilityFilter};
use crate::engine::CheckpointEngine;
use crate::indexer::{self, IndexOptions};
use crate::server::{self, AppIdentity, ServerState};
use crate::types::{DestinationIds, NextUpload};
use crate::uploader::{DirectoryUploader, Uploader};

use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const PROGRESS_LOG_FILE: &str = "progress.jsonl";

/// Resolved settings for one process run. Passed explicitly to every command.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target_root: PathBuf,
    pub res_dir: PathBuf,
    pub catalog: PathBuf,
    pub progress_log: PathBuf,
    pub required_class: ContentClass,

    /// Destination album, overrides the one carried over from the log.
    pub album: Option<String>,
    pub destination_root: PathBuf,

    pub identity: AppIdentity,
    pub port: u16,
}

impl AppConfig {
    /// `<res_dir>/<target>`: index.json, duplicates.txt, progress.jsonl mặc định nằm ở đây.
    pub fn results_dir(&self) -> PathBuf {
        indexer::results_dir(&self.res_dir, &self.target_root)
    }
}

/* =========================
   Catalog snapshot
   ========================= */

pub fn index(cfg: &AppConfig, opts: IndexOptions) -> Result<()> {
    let idx = indexer::build_index(&cfg.target_root, opts)?;
    let out_dir = cfg.results_dir();
    let index_file = indexer::write_index(&out_dir, &idx)?;

    println!("Catalog snapshot : {}", index_file.display());
    println!("Items            : {}", idx.index.len());
    println!("Duplicates       : {}", idx.duplicates.len());

    if index_file != cfg.catalog {
        warn!(
            written = %index_file.display(),
            configured = %cfg.catalog.display(),
            "configured catalog path differs from the snapshot just written"
        );
    }
    Ok(())
}

pub fn delete_duplicates(cfg: &AppConfig) -> Result<()> {
    let deleted = indexer::delete_duplicates(&cfg.target_root, &cfg.results_dir())?;
    println!("Deleted {} duplicate file(s) from {}", deleted.len(), cfg.target_root.display());
    Ok(())
}

/* =========================
   Checkpoint engine
   ========================= */

/// Load the catalog and open the progress log. A catalog that fails to load
/// stops the process: nothing is served from a partial catalog.
pub fn open_engine(cfg: &AppConfig) -> Result<CheckpointEngine> {
    let catalog = Catalog::load(&cfg.catalog)?;
    let filter = EligibilityFilter::new(cfg.required_class.clone());
    let engine = CheckpointEngine::new(catalog, &cfg.target_root, &cfg.progress_log, filter)
        .with_context(|| format!("open progress log {}", cfg.progress_log.display()))?
        .with_album(cfg.album.clone());
    Ok(engine)
}

pub fn next(cfg: &AppConfig) -> Result<()> {
    let engine = open_engine(cfg)?;
    let next = engine.next_upload()?;
    println!("{}", serde_json::to_string_pretty(&next.to_json()?)?);
    Ok(())
}

/// Record a transfer that was done outside this process.
pub fn record(cfg: &AppConfig, index: usize, album: Option<String>, item: String) -> Result<()> {
    let engine = open_engine(cfg)?;
    let ids = DestinationIds {
        destination_album_id: album,
        destination_item_id: item,
    };
    let rec = engine.record_current(index, &ids)?;
    println!("{}", serde_json::to_string_pretty(&rec)?);
    Ok(())
}

pub fn status(cfg: &AppConfig) -> Result<()> {
    let engine = open_engine(cfg)?;
    let s = engine.summary()?;

    println!("=== PROGRESS ===");
    println!("Catalog      : {} ({} items)", cfg.catalog.display(), s.catalog_len);
    println!(
        "Progress log : {} ({} records)",
        engine.progress_log_path().display(),
        s.records
    );
    println!(
        "Last index   : {}",
        s.last_index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Resume at    : {}", s.resume_index);
    println!(
        "Album        : {}",
        s.destination_album_id.as_deref().unwrap_or("-")
    );
    println!(
        "Remaining    : {} eligible ({})",
        s.remaining_eligible,
        cfg.required_class.as_str()
    );
    Ok(())
}

/// next -> upload -> record, until exhausted or `limit` items are done.
///
/// Stops at the first failure. An upload whose completion could not be
/// recorded is reported as an error; it will be offered again on resume.
pub fn run_uploads(engine: &CheckpointEngine, uploader: &dyn Uploader, limit: Option<usize>) -> Result<usize> {
    let mut done = 0usize;

    loop {
        if limit.is_some_and(|l| done >= l) {
            info!(done, "upload limit reached");
            break;
        }

        let descriptor = match engine.next_upload()? {
            NextUpload::Ready(d) => d,
            NextUpload::Exhausted => {
                println!("No more items.");
                break;
            }
        };

        let ids = uploader
            .upload(&descriptor)
            .with_context(|| format!("upload catalog index {}", descriptor.catalog_index))?;

        engine.record_completion(&descriptor, &ids).with_context(|| {
            format!(
                "uploaded {} but could not record it; it will be uploaded again on resume",
                descriptor.local_path
            )
        })?;

        println!(
            "  [{}] {} -> {}/{}",
            descriptor.catalog_index,
            descriptor.local_path,
            ids.destination_album_id.as_deref().unwrap_or("-"),
            ids.destination_item_id
        );
        done += 1;
    }

    println!("DONE: uploaded={}", done);
    Ok(done)
}

pub fn run(cfg: &AppConfig, limit: Option<usize>) -> Result<()> {
    let engine = open_engine(cfg)?;
    let uploader = DirectoryUploader::new(&cfg.target_root, &cfg.destination_root, cfg.album.clone());
    run_uploads(&engine, &uploader, limit)?;
    Ok(())
}

pub async fn serve(cfg: &AppConfig) -> Result<()> {
    let engine = open_engine(cfg)?;
    info!(
        target_root = %engine.target_root().display(),
        items = engine.catalog().len(),
        "deploying face-manager"
    );

    let state = Arc::new(ServerState::new(engine, cfg.identity.clone()));
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port));
    server::serve(addr, state).await
}
