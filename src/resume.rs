use crate::types::{ProgressRecord, ResumePosition};

/// Resume position from the last completed record.
///
/// The destination album is sticky: it carries over from the last record
/// until the caller picks another one.
/// A position past `catalog_len` is returned as is; see
/// [`ResumePosition::is_exhausted`].
pub fn resolve(catalog_len: usize, last: Option<&ProgressRecord>) -> ResumePosition {
    let pos = match last {
        None => ResumePosition::default(),
        Some(rec) => ResumePosition {
            index: rec.catalog_index.saturating_add(1),
            destination_album_id: rec.destination_album_id.clone(),
        },
    };
    if pos.is_exhausted(catalog_len) {
        tracing::debug!(index = pos.index, catalog_len, "resume position is past the catalog end");
    }
    pos
}

impl ResumePosition {
    pub fn is_exhausted(&self, catalog_len: usize) -> bool {
        self.index >= catalog_len
    }
}
