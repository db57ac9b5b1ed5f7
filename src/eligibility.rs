use crate::catalog::Catalog;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub const UNKNOWN: &str = "unknown";

/// Maps a location string to a MIME-like content type, or [`UNKNOWN`].
pub trait Classifier {
    fn classify(&self, location: &str) -> String;
}

/// Classify theo đuôi file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

impl Classifier for ExtensionClassifier {
    fn classify(&self, location: &str) -> String {
        let ext = Path::new(location)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        let ct = match ext.as_str() {
            "jpg" | "jpeg" | "jpe" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "heic" => "image/heic",
            "heif" => "image/heif",
            "avif" => "image/avif",
            "mp4" | "m4v" => "video/mp4",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            "json" => "application/json",
            _ => UNKNOWN,
        };
        ct.to_string()
    }
}

/// Required content-type class: `image/*`, an exact type, or `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentClass(String);

impl ContentClass {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into().trim().to_lowercase())
    }

    pub fn matches(&self, content_type: &str) -> bool {
        if content_type == UNKNOWN {
            return false;
        }
        let ct = content_type.to_lowercase();
        match self.0.as_str() {
            "*" | "*/*" => true,
            p => match p.strip_suffix("/*") {
                Some(major) => ct.split('/').next() == Some(major),
                None => ct == p,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentClass {
    fn default() -> Self {
        Self::new("image/*")
    }
}

/// An accepted catalog position.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub position: usize,
    pub content_type: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scan {
    Found(Candidate),
    /// No eligible entry at or after the start; `position` is where the scan stopped.
    Exhausted { position: usize },
}

pub struct EligibilityFilter<C = ExtensionClassifier> {
    classifier: C,
    required: ContentClass,
}

impl EligibilityFilter<ExtensionClassifier> {
    pub fn new(required: ContentClass) -> Self {
        Self::with_classifier(ExtensionClassifier, required)
    }
}

impl<C: Classifier> EligibilityFilter<C> {
    pub fn with_classifier(classifier: C, required: ContentClass) -> Self {
        Self {
            classifier,
            required,
        }
    }

    /// Walk forward from `position` to the first eligible entry.
    ///
    /// Never looks below `position` and stops at the catalog end, so the
    /// result depends only on the catalog and the start position.
    pub fn advance(&self, catalog: &Catalog, position: usize) -> Scan {
        let len = catalog.len();
        let mut pos = position;

        while pos < len {
            if let Some(c) = self.check(catalog, pos) {
                return Scan::Found(c);
            }
            pos += 1;
        }

        Scan::Exhausted { position: pos }
    }

    /// Count eligible entries in `[position, len)`.
    pub fn count_from(&self, catalog: &Catalog, position: usize) -> usize {
        (position..catalog.len())
            .filter(|&i| self.check(catalog, i).is_some())
            .count()
    }

    fn check(&self, catalog: &Catalog, pos: usize) -> Option<Candidate> {
        let entry = catalog.entry_at(pos)?;
        let Some(rep) = entry.primary() else {
            debug!(position = pos, item_id = %entry.item_id, "skip entry without representation");
            return None;
        };

        let content_type = declared_type(rep.metadata.as_ref())
            .unwrap_or_else(|| self.classifier.classify(&rep.location));

        if !self.required.matches(&content_type) {
            debug!(
                position = pos,
                location = %rep.location,
                content_type = %content_type,
                required = %self.required.as_str(),
                "skip ineligible entry"
            );
            return None;
        }

        Some(Candidate {
            position: pos,
            content_type,
            metadata: rep.metadata.clone(),
        })
    }
}

/// Content type declared in metadata (`MimeType`), if any.
fn declared_type(metadata: Option<&Value>) -> Option<String> {
    metadata?
        .get("MimeType")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn catalog(entries: &[(&str, &str)]) -> Catalog {
        let raw: BTreeMap<String, Vec<String>> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect();
        Catalog::from_raw(raw).unwrap()
    }

    fn found_at(scan: Scan) -> Option<usize> {
        match scan {
            Scan::Found(c) => Some(c.position),
            Scan::Exhausted { .. } => None,
        }
    }

    #[test]
    fn class_matching() {
        let img = ContentClass::new("image/*");
        assert!(img.matches("image/jpeg"));
        assert!(img.matches("IMAGE/PNG"));
        assert!(!img.matches("video/mp4"));
        assert!(!img.matches(UNKNOWN));

        assert!(ContentClass::new("video/mp4").matches("video/mp4"));
        assert!(!ContentClass::new("video/mp4").matches("video/quicktime"));
        assert!(ContentClass::new("*").matches("application/pdf"));
        assert!(!ContentClass::new("*").matches(UNKNOWN));
    }

    #[test]
    fn classify_by_extension() {
        let c = ExtensionClassifier;
        assert_eq!(c.classify("a/b/IMG_1.JPG"), "image/jpeg");
        assert_eq!(c.classify("x.png"), "image/png");
        assert_eq!(c.classify("doc.pdf"), "application/pdf");
        assert_eq!(c.classify("noext"), UNKNOWN);
    }

    #[test]
    fn skips_ineligible_positions() {
        // indices 1 and 3 are ineligible
        let cat = catalog(&[
            ("a", "0.jpg"),
            ("b", "1.pdf"),
            ("c", "2.png"),
            ("d", "3.txt"),
            ("e", "4.gif"),
        ]);
        let f = EligibilityFilter::new(ContentClass::default());

        assert_eq!(found_at(f.advance(&cat, 0)), Some(0));
        assert_eq!(found_at(f.advance(&cat, 1)), Some(2));
        assert_eq!(found_at(f.advance(&cat, 3)), Some(4));
        assert_eq!(f.advance(&cat, 5), Scan::Exhausted { position: 5 });
        assert_eq!(f.advance(&cat, 42), Scan::Exhausted { position: 42 });
        assert_eq!(f.count_from(&cat, 0), 3);
    }

    #[test]
    fn trailing_ineligible_entries_exhaust() {
        let cat = catalog(&[("a", "0.jpg"), ("b", "1.pdf"), ("c", "2.txt")]);
        let f = EligibilityFilter::new(ContentClass::default());
        assert_eq!(f.advance(&cat, 1), Scan::Exhausted { position: 3 });
    }

    #[test]
    fn advance_is_repeatable() {
        let cat = catalog(&[("a", "0.pdf"), ("b", "1.jpg")]);
        let f = EligibilityFilter::new(ContentClass::default());
        assert_eq!(f.advance(&cat, 0), f.advance(&cat, 0));
    }

    #[test]
    fn declared_type_wins_over_extension() {
        let cat = catalog(&[
            ("a", r#"blob.bin//{"MimeType":"image/heic"}"#),
            ("b", r#"fake.jpg//{"MimeType":"application/zip"}"#),
        ]);
        let f = EligibilityFilter::new(ContentClass::default());
        match f.advance(&cat, 0) {
            Scan::Found(c) => {
                assert_eq!(c.position, 0);
                assert_eq!(c.content_type, "image/heic");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.advance(&cat, 1), Scan::Exhausted { position: 2 });
    }

    #[test]
    fn custom_classifier() {
        struct Everything;
        impl Classifier for Everything {
            fn classify(&self, _: &str) -> String {
                "image/raw".into()
            }
        }
        let cat = catalog(&[("a", "x.pdf")]);
        let f = EligibilityFilter::with_classifier(Everything, ContentClass::default());
        assert_eq!(found_at(f.advance(&cat, 0)), Some(0));
    }
}
