//! Request identity and canonical artifact naming.
//!
//! The request id is an opaque token carried explicitly through every
//! pipeline stage. Filenames follow the
//! `{timestamp}_{request_id}_diagram.png` convention as a presentation and
//! export concern; parsing an id back out of a filename exists only for the
//! legacy `GET /api/diagram/{request_id}` lookup path.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffix shared by every canonical diagram filename.
pub const DIAGRAM_SUFFIX: &str = "_diagram";

/// Subdirectory of the output dir that canonical artifacts live in.
pub const GENERATED_SUBDIR: &str = "generated-diagrams";

/// Identity of one end-to-end pipeline invocation.
#[derive(Debug, Clone)]
pub struct DiagramRequest {
    /// Opaque unique token. No underscores, so the filename convention
    /// stays parseable.
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl DiagramRequest {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Canonical artifact filename: `{timestamp}_{id}_diagram.png`.
    pub fn diagram_filename(&self) -> String {
        format!(
            "{}_{}{}.png",
            self.created_at.format("%Y%m%d_%H%M%S"),
            self.id,
            DIAGRAM_SUFFIX
        )
    }

    /// Canonical expected artifact path under the output directory.
    pub fn expected_path(&self, output_dir: &Path) -> PathBuf {
        output_dir
            .join(GENERATED_SUBDIR)
            .join(self.diagram_filename())
    }

    /// Scratch filename for the uploaded document.
    pub fn upload_filename(&self, original: &str) -> String {
        format!("{}_{}", self.id, sanitize_filename(original))
    }
}

impl Default for DiagramRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the request id from a canonical diagram filename.
///
/// Understands `{YYYYMMDD}_{HHMMSS}_{id}_diagram.ext` and the legacy
/// `{id}_diagram.ext` layout. Returns `None` for names that do not carry
/// the `_diagram` suffix.
pub fn request_id_from_filename(filename: &str) -> Option<String> {
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    let stem = stem.strip_suffix(DIAGRAM_SUFFIX)?;

    let parts: Vec<&str> = stem.split('_').collect();
    match parts.len() {
        // timestamp_time_id
        3 => Some(parts[2].to_string()),
        // legacy: bare id
        1 if !parts[0].is_empty() => Some(parts[0].to_string()),
        _ => parts.last().filter(|p| !p.is_empty()).map(|p| p.to_string()),
    }
}

/// Strip path separators and other hostile characters from a client-supplied
/// filename before it is joined onto the scratch directory.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." {
        "upload.pdf".to_string()
    } else {
        base
    }
}
