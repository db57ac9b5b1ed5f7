use crate::error::CatalogLoadError;
use crate::types::{CatalogEntry, METADATA_DELIMITER, Representation};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Immutable, ordered snapshot of transfer candidates.
///
/// Order is the lexicographic order of `item_id`, so the same snapshot always
/// yields the same index for the same item across restarts.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ids: Vec<String>,
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogLoadError> {
        let s = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&s).map_err(|source| CatalogLoadError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_raw(raw)?;
        info!(
            path = %path.display(),
            items = catalog.len(),
            "loaded catalog snapshot"
        );
        Ok(catalog)
    }

    /// Build from an in-memory `item_id -> [representation]` map.
    pub fn from_raw(raw: BTreeMap<String, Vec<String>>) -> Result<Self, CatalogLoadError> {
        let mut entries = BTreeMap::new();

        for (item_id, reps) in raw {
            let representations = reps
                .iter()
                .map(|r| parse_representation(&item_id, r))
                .collect::<Result<Vec<_>, _>>()?;

            if representations.is_empty() {
                debug!(item_id = %item_id, "catalog entry has no representation");
            }

            entries.insert(
                item_id.clone(),
                CatalogEntry {
                    item_id,
                    representations,
                },
            );
        }

        // BTreeMap iterates in key order => ids are already sorted
        let ids = entries.keys().cloned().collect();
        Ok(Self { ids, entries })
    }

    pub fn ordered_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn entry(&self, item_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(item_id)
    }

    pub fn entry_at(&self, index: usize) -> Option<&CatalogEntry> {
        self.ids.get(index).and_then(|id| self.entry(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Parse `location[//metadata_json]`. Tách ở delimiter đầu tiên.
pub fn parse_representation(
    item_id: &str,
    raw: &str,
) -> Result<Representation, CatalogLoadError> {
    let Some((location, meta)) = raw.split_once(METADATA_DELIMITER) else {
        return Ok(Representation {
            location: raw.to_string(),
            metadata: None,
        });
    };

    let meta = meta.trim();
    let metadata = if meta.is_empty() {
        None
    } else {
        let v = serde_json::from_str(meta).map_err(|source| CatalogLoadError::Metadata {
            item_id: item_id.to_string(),
            representation: raw.to_string(),
            source,
        })?;
        Some(v)
    };

    Ok(Representation {
        location: location.to_string(),
        metadata,
    })
}

/// Inverse of [`parse_representation`].
pub fn format_representation(rep: &Representation) -> String {
    match &rep.metadata {
        Some(m) => format!("{}{}{}", rep.location, METADATA_DELIMITER, m),
        None => rep.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_snapshot(dir: &Path, body: &str) -> std::path::PathBuf {
        let p = dir.join("index.json");
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        p
    }

    #[test]
    fn ordered_ids_are_sorted_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_snapshot(
            dir.path(),
            r#"{"c": ["c.jpg"], "a": ["a.jpg"], "b": ["b.png", "b (1).png"]}"#,
        );

        let cat = Catalog::load(&p).unwrap();
        assert_eq!(cat.ordered_ids(), ["a", "b", "c"]);
        assert_eq!(cat.ordered_ids(), Catalog::load(&p).unwrap().ordered_ids());
        assert_eq!(cat.len(), 3);
        assert_eq!(cat.entry_at(1).unwrap().item_id, "b");
        assert_eq!(cat.entry("b").unwrap().representations.len(), 2);
        assert_eq!(cat.entry("b").unwrap().primary().unwrap().location, "b.png");
    }

    #[test]
    fn representation_with_metadata() {
        let rep =
            parse_representation("c", r#"img2.jpg//{"DateTime":"2020:01:01 10:00:00"}"#).unwrap();
        assert_eq!(rep.location, "img2.jpg");
        assert_eq!(rep.metadata, Some(json!({"DateTime": "2020:01:01 10:00:00"})));
        assert_eq!(
            format_representation(&rep),
            r#"img2.jpg//{"DateTime":"2020:01:01 10:00:00"}"#
        );
    }

    #[test]
    fn empty_metadata_part_is_none() {
        let rep = parse_representation("x", "x.jpg//").unwrap();
        assert_eq!(rep.location, "x.jpg");
        assert!(rep.metadata.is_none());
    }

    #[test]
    fn malformed_metadata_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_snapshot(dir.path(), r#"{"a": ["a.jpg//{not json"]}"#);
        match Catalog::load(&p) {
            Err(CatalogLoadError::Metadata { item_id, .. }) => assert_eq!(item_id, "a"),
            other => panic!("expected metadata error, got {other:?}"),
        }
    }

    #[test]
    fn missing_or_malformed_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Catalog::load(&dir.path().join("nope.json")),
            Err(CatalogLoadError::Read { .. })
        ));

        let p = write_snapshot(dir.path(), r#"["a.jpg"]"#);
        assert!(matches!(
            Catalog::load(&p),
            Err(CatalogLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_representation_list_is_kept() {
        let mut raw = BTreeMap::new();
        raw.insert("a".to_string(), vec![]);
        let cat = Catalog::from_raw(raw).unwrap();
        assert_eq!(cat.len(), 1);
        assert!(cat.entry_at(0).unwrap().primary().is_none());
    }
}
