//! Plain-text detection records: one `<label> <x> <y> <width> <height>` line
//! per detection.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::detect::{BoundingBox, Detection};

pub fn format_detections(detections: &[Detection]) -> String {
    let mut out = String::new();
    for d in detections {
        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            d.label, d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height
        );
    }
    out
}

pub fn write_detections(path: &Path, detections: &[Detection]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, format_detections(detections))
        .with_context(|| format!("write detections to {}", path.display()))
}

fn parse_line(line: &str) -> Option<Detection> {
    let mut fields = line.split_whitespace();
    let label = fields.next()?;
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let width = fields.next()?.parse().ok()?;
    let height = fields.next()?.parse().ok()?;
    let bbox = BoundingBox::new(x, y, width, height);
    bbox.is_valid().then(|| Detection::new(label, bbox))
}

/// Parse record text; blank lines are ignored, malformed ones skipped with a warning.
pub fn parse_detections(text: &str, origin: &str) -> Vec<Detection> {
    let mut detections = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(d) => detections.push(d),
            None => log::warn!("{}:{}: skipping malformed detection line", origin, lineno + 1),
        }
    }
    detections
}

pub fn read_detections(path: &Path) -> Result<Vec<Detection>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read detections from {}", path.display()))?;
    Ok(parse_detections(&text, &path.display().to_string()))
}
