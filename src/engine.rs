//! Checkpoint engine: "what to transfer next" and "this one is done".
//!
//! Holds no state between calls beyond the loaded catalog. Every call re-reads
//! the progress log tail, so a crash at any point resumes from the last
//! durable record.
//!
//! Callers must serialize calls against one progress log (one process, or an
//! external lock); the engine itself does not lock the file.

use crate::catalog::Catalog;
use crate::eligibility::{EligibilityFilter, Scan};
use crate::error::EngineError;
use crate::types::{
    DestinationIds, NextUpload, NextUploadDescriptor, ProgressRecord, ProgressSummary,
};
use crate::{fs_scan, progress_log, resume};
use serde_json::Value;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

pub struct CheckpointEngine {
    catalog: Catalog,
    target_root: PathBuf,
    progress_log: PathBuf,
    filter: EligibilityFilter,
    /// Overrides the album carried over from the last record.
    album_override: Option<String>,
}

impl CheckpointEngine {
    /// Create the engine, creating an empty progress log if there is none.
    pub fn new(
        catalog: Catalog,
        target_root: impl Into<PathBuf>,
        progress_log: impl Into<PathBuf>,
        filter: EligibilityFilter,
    ) -> Result<Self, EngineError> {
        let progress_log = progress_log.into();
        progress_log::ensure_exists(&progress_log)?;

        Ok(Self {
            catalog,
            target_root: target_root.into(),
            progress_log,
            filter,
            album_override: None,
        })
    }

    pub fn with_album(mut self, album: Option<String>) -> Self {
        self.album_override = album;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn progress_log_path(&self) -> &Path {
        &self.progress_log
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn next_upload(&self) -> Result<NextUpload, EngineError> {
        // RESOLVING_POSITION
        let last = progress_log::last_record(&self.progress_log)?;
        if let Some(rec) = &last {
            self.matches_catalog(rec);
        }
        let pos = resume::resolve(self.catalog.len(), last.as_ref());
        debug!(
            resume_index = pos.index,
            album = ?pos.destination_album_id,
            "resolved resume position"
        );

        // SCANNING_CATALOG
        let candidate = match self.filter.advance(&self.catalog, pos.index) {
            Scan::Found(c) => c,
            Scan::Exhausted { position } => {
                info!(position, catalog_len = self.catalog.len(), "no more items");
                return Ok(NextUpload::Exhausted);
            }
        };

        // FOUND -> DESCRIPTOR_READY
        let Some(rep) = self
            .catalog
            .entry_at(candidate.position)
            .and_then(|e| e.primary())
        else {
            // advance only accepts entries with a representation
            return Ok(NextUpload::Exhausted);
        };

        let abs = self.target_root.join(&rep.location);
        let size_bytes = fs_scan::file_size(&abs).map_err(|source| EngineError::Stat {
            path: abs.clone(),
            source,
        })?;

        let descriptor = NextUploadDescriptor {
            local_path: rep.location.clone(),
            catalog_index: candidate.position,
            content_type: candidate.content_type,
            size_bytes,
            caption: caption_from(candidate.metadata.as_ref()),
            metadata: candidate.metadata,
            destination_album_id: self
                .album_override
                .clone()
                .or(pos.destination_album_id),
            destination_item_id: None,
        };

        debug!(
            catalog_index = descriptor.catalog_index,
            path = %descriptor.local_path,
            size = descriptor.size_bytes,
            "next upload ready"
        );
        Ok(NextUpload::Ready(descriptor))
    }

    /// Append the completion of a transfer done by the uploader.
    ///
    /// Call exactly once per successful transfer. A failure here means the
    /// item will be offered again on the next resume.
    pub fn record_completion(
        &self,
        descriptor: &NextUploadDescriptor,
        ids: &DestinationIds,
    ) -> Result<ProgressRecord, EngineError> {
        let record = ProgressRecord {
            local_path: descriptor.local_path.clone(),
            catalog_index: descriptor.catalog_index,
            destination_album_id: ids
                .destination_album_id
                .clone()
                .or_else(|| descriptor.destination_album_id.clone()),
            destination_item_id: ids.destination_item_id.clone(),
            caption: descriptor.caption.clone(),
            item_id: self
                .catalog
                .ordered_ids()
                .get(descriptor.catalog_index)
                .cloned(),
            completed_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        };

        progress_log::append(&self.progress_log, &record)?;
        info!(
            catalog_index = record.catalog_index,
            path = %record.local_path,
            album = ?record.destination_album_id,
            item = %record.destination_item_id,
            "completion recorded"
        );
        Ok(record)
    }

    /// Record a completion reported from outside the process.
    ///
    /// Only accepted for the item the engine would hand out right now. The
    /// record is built from the re-derived descriptor; the caller only
    /// supplies the destination ids.
    pub fn record_current(
        &self,
        catalog_index: usize,
        ids: &DestinationIds,
    ) -> Result<ProgressRecord, EngineError> {
        match self.next_upload()? {
            NextUpload::Ready(d) if d.catalog_index == catalog_index => {
                self.record_completion(&d, ids)
            }
            NextUpload::Ready(d) => Err(EngineError::StaleCompletion {
                expected: Some(d.catalog_index),
                got: catalog_index,
            }),
            NextUpload::Exhausted => Err(EngineError::StaleCompletion {
                expected: None,
                got: catalog_index,
            }),
        }
    }

    /// Whether `rec` still points at the same item in this catalog.
    ///
    /// A snapshot rebuilt since the record was written can shift indices; the
    /// resume point then follows the index, so this only warns.
    fn matches_catalog(&self, rec: &ProgressRecord) -> bool {
        let Some(recorded) = rec.item_id.as_deref() else {
            // record cũ, không có item_id
            return true;
        };
        let current = self.catalog.ordered_ids().get(rec.catalog_index);
        if current.map(String::as_str) == Some(recorded) {
            return true;
        }
        warn!(
            catalog_index = rec.catalog_index,
            recorded_item = %recorded,
            catalog_item = ?current,
            "last record does not match the catalog at its index; was the snapshot rebuilt?"
        );
        false
    }

    pub fn summary(&self) -> Result<ProgressSummary, EngineError> {
        let records = progress_log::records(&self.progress_log)?;
        let last = progress_log::last_record(&self.progress_log)?;
        let pos = resume::resolve(self.catalog.len(), last.as_ref());

        Ok(ProgressSummary {
            catalog_len: self.catalog.len(),
            records: records.len(),
            last_index: last.as_ref().map(|r| r.catalog_index),
            resume_index: pos.index,
            destination_album_id: self.album_override.clone().or(pos.destination_album_id),
            remaining_eligible: self.filter.count_from(&self.catalog, pos.index),
        })
    }
}

fn caption_from(metadata: Option<&Value>) -> Option<String> {
    metadata?
        .get("ImageDescription")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::ContentClass;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: CheckpointEngine,
    }

    fn fixture(entries: &[(&str, &str)], files: &[(&str, usize)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("target");
        fs::create_dir_all(&root).unwrap();
        for (name, size) in files {
            fs::write(root.join(name), vec![0u8; *size]).unwrap();
        }

        let raw: BTreeMap<String, Vec<String>> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect();
        let catalog = Catalog::from_raw(raw).unwrap();
        let log = dir.path().join("res/progress.jsonl");

        let engine = CheckpointEngine::new(
            catalog,
            root,
            log,
            EligibilityFilter::new(ContentClass::default()),
        )
        .unwrap();
        Fixture { _dir: dir, engine }
    }

    fn scenario() -> Fixture {
        fixture(
            &[
                ("a", "img1.jpg"),
                ("b", "doc.pdf"),
                ("c", r#"img2.jpg//{"DateTime":"2020:01:01 10:00:00"}"#),
            ],
            &[("img1.jpg", 10), ("doc.pdf", 20), ("img2.jpg", 30)],
        )
    }

    fn ready(n: NextUpload) -> NextUploadDescriptor {
        match n {
            NextUpload::Ready(d) => d,
            NextUpload::Exhausted => panic!("expected a descriptor"),
        }
    }

    fn ids(album: &str, item: &str) -> DestinationIds {
        DestinationIds {
            destination_album_id: Some(album.into()),
            destination_item_id: item.into(),
        }
    }

    #[test]
    fn walks_the_catalog_and_resumes_from_log() {
        let fx = scenario();
        let e = &fx.engine;

        let first = ready(e.next_upload().unwrap());
        assert_eq!(first.local_path, "img1.jpg");
        assert_eq!(first.catalog_index, 0);
        assert_eq!(first.content_type, "image/jpeg");
        assert_eq!(first.size_bytes, 10);
        assert_eq!(first.metadata, None);
        assert_eq!(first.destination_album_id, None);

        // idempotent until a completion is recorded
        assert_eq!(ready(e.next_upload().unwrap()), first);

        e.record_completion(&first, &ids("album-1", "p0")).unwrap();

        let second = ready(e.next_upload().unwrap());
        assert_eq!(second.local_path, "img2.jpg");
        assert_eq!(second.catalog_index, 2);
        assert_eq!(
            second.metadata,
            Some(json!({"DateTime": "2020:01:01 10:00:00"}))
        );
        // album sticks from the previous record
        assert_eq!(second.destination_album_id.as_deref(), Some("album-1"));

        e.record_completion(&second, &ids("album-1", "p2")).unwrap();
        assert_eq!(e.next_upload().unwrap(), NextUpload::Exhausted);
        assert_eq!(
            e.next_upload().unwrap().to_json().unwrap(),
            json!({"message": "no more items"})
        );
    }

    #[test]
    fn fresh_engine_on_same_log_resumes() {
        let fx = scenario();
        let first = ready(fx.engine.next_upload().unwrap());
        let rec = fx
            .engine
            .record_completion(&first, &ids("album-1", "p0"))
            .unwrap();
        assert_eq!(rec.item_id.as_deref(), Some("a"));
        assert!(rec.completed_at.is_some());

        // simulate a restart: new engine, same files
        let restarted = CheckpointEngine::new(
            fx.engine.catalog().clone(),
            fx.engine.target_root().to_path_buf(),
            fx.engine.progress_log_path().to_path_buf(),
            EligibilityFilter::new(ContentClass::default()),
        )
        .unwrap();
        assert_eq!(ready(restarted.next_upload().unwrap()).catalog_index, 2);
        assert_eq!(
            progress_log::last_record(restarted.progress_log_path()).unwrap(),
            Some(rec)
        );
    }

    #[test]
    fn album_override_beats_carry_over() {
        let fx = scenario();
        let first = ready(fx.engine.next_upload().unwrap());
        fx.engine
            .record_completion(&first, &ids("album-1", "p0"))
            .unwrap();

        let engine = fx.engine.with_album(Some("album-2".into()));
        let next = ready(engine.next_upload().unwrap());
        assert_eq!(next.destination_album_id.as_deref(), Some("album-2"));
    }

    #[test]
    fn replayed_completion_is_rejected() {
        let fx = scenario();
        let first = ready(fx.engine.next_upload().unwrap());
        fx.engine
            .record_current(first.catalog_index, &ids("album-1", "p0"))
            .unwrap();

        match fx.engine.record_current(first.catalog_index, &ids("album-1", "p0")) {
            Err(EngineError::StaleCompletion { expected, got }) => {
                assert_eq!(expected, Some(2));
                assert_eq!(got, 0);
            }
            other => panic!("expected stale completion, got {other:?}"),
        }
        assert_eq!(fx.engine.summary().unwrap().records, 1);
    }

    #[test]
    fn missing_file_is_stat_error() {
        let fx = fixture(&[("a", "gone.jpg")], &[]);
        assert!(matches!(
            fx.engine.next_upload(),
            Err(EngineError::Stat { .. })
        ));
    }

    #[test]
    fn empty_catalog_is_exhausted() {
        let fx = fixture(&[], &[]);
        assert_eq!(fx.engine.next_upload().unwrap(), NextUpload::Exhausted);
    }

    #[test]
    fn caption_from_metadata() {
        let fx = fixture(
            &[("a", r#"x.png//{"ImageDescription":" sunset "}"#)],
            &[("x.png", 1)],
        );
        let d = ready(fx.engine.next_upload().unwrap());
        assert_eq!(d.caption.as_deref(), Some("sunset"));
        assert_eq!(d.content_type, "image/png");
    }

    #[test]
    fn summary_counts_remaining() {
        let fx = scenario();
        let s = fx.engine.summary().unwrap();
        assert_eq!(s.catalog_len, 3);
        assert_eq!(s.records, 0);
        assert_eq!(s.last_index, None);
        assert_eq!(s.remaining_eligible, 2);

        let first = ready(fx.engine.next_upload().unwrap());
        fx.engine
            .record_completion(&first, &ids("album-1", "p0"))
            .unwrap();
        let s = fx.engine.summary().unwrap();
        assert_eq!(s.records, 1);
        assert_eq!(s.last_index, Some(0));
        assert_eq!(s.resume_index, 1);
        assert_eq!(s.remaining_eligible, 1);
        assert_eq!(s.destination_album_id.as_deref(), Some("album-1"));
    }

    #[test]
    fn external_completion_uses_derived_descriptor() {
        let fx = scenario();
        let rec = fx
            .engine
            .record_current(0, &ids("album-1", "p0"))
            .unwrap();
        assert_eq!(rec.local_path, "img1.jpg");
        assert_eq!(rec.item_id.as_deref(), Some("a"));
        assert_eq!(rec.destination_item_id, "p0");

        let last = progress_log::last_record(fx.engine.progress_log_path()).unwrap();
        assert_eq!(last, Some(rec));
    }

    #[test]
    fn torn_multibyte_tail_keeps_summary_working() {
        use std::io::Write;

        let fx = scenario();
        let first = ready(fx.engine.next_upload().unwrap());
        fx.engine
            .record_completion(&first, &ids("album-1", "p0"))
            .unwrap();

        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(fx.engine.progress_log_path())
            .unwrap();
        f.write_all(b"{\"local_path\":\"\xe1\xba").unwrap();
        drop(f);

        assert_eq!(ready(fx.engine.next_upload().unwrap()).catalog_index, 2);
        let s = fx.engine.summary().unwrap();
        assert_eq!(s.records, 1);
        assert_eq!(s.last_index, Some(0));
    }

    #[test]
    fn shifted_snapshot_is_detected() {
        let fx = scenario();
        let mut rec = fx
            .engine
            .record_current(0, &ids("album-1", "p0"))
            .unwrap();
        assert!(fx.engine.matches_catalog(&rec));

        rec.item_id = Some("zzz".into());
        assert!(!fx.engine.matches_catalog(&rec));

        rec.item_id = None;
        assert!(fx.engine.matches_catalog(&rec));

        rec.item_id = Some("a".into());
        rec.catalog_index = 99;
        assert!(!fx.engine.matches_catalog(&rec));
    }
}
