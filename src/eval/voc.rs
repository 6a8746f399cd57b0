//! Pascal VOC ground-truth records.
//!
//! Only `<filename>` and the `<object>` entries are read. Unknown elements,
//! element order and surrounding whitespace do not matter, and decimal
//! coordinates are rounded to the nearest pixel.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::BoundingBox;

/// One labelled ground-truth box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub label: String,
    pub bbox: BoundingBox,
    /// Image the box belongs to.
    pub source: String,
}

impl Annotation {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bbox,
            source: source.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VocDocument {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default, rename = "object")]
    objects: Vec<VocObject>,
}

#[derive(Debug, Deserialize)]
struct VocObject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bndbox: Option<VocBox>,
}

#[derive(Debug, Deserialize)]
struct VocBox {
    xmin: Option<String>,
    ymin: Option<String>,
    xmax: Option<String>,
    ymax: Option<String>,
}

fn coordinate(value: &Option<String>) -> Option<i32> {
    let v: f64 = value.as_deref()?.trim().parse().ok()?;
    v.is_finite().then(|| v.round() as i32)
}

impl VocBox {
    fn to_bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_corners(
            coordinate(&self.xmin)?,
            coordinate(&self.ymin)?,
            coordinate(&self.xmax)?,
            coordinate(&self.ymax)?,
        )
    }
}

/// Parse a VOC document. `fallback_source` names the image when the record
/// has no usable `<filename>`. Objects without a name or with an empty box
/// are dropped.
pub fn parse_voc_str(xml: &str, fallback_source: &str) -> Result<Vec<Annotation>> {
    let doc: VocDocument = quick_xml::de::from_str(xml).context("parse VOC annotation")?;
    let source = doc
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback_source)
        .to_string();

    let mut annotations = Vec::with_capacity(doc.objects.len());
    for object in &doc.objects {
        let label = object.name.as_deref().map(str::trim).unwrap_or_default();
        if label.is_empty() {
            continue;
        }
        let Some(bbox) = object.bndbox.as_ref().and_then(VocBox::to_bbox) else {
            log::debug!("{}: dropping '{}' without a usable box", source, label);
            continue;
        };
        annotations.push(Annotation::new(label, bbox, source.clone()));
    }
    Ok(annotations)
}

/// Read the ground truth at `path`.
///
/// `Ok(None)` when there is no record. A record that exists but cannot be
/// read or parsed yields an empty set with a warning.
pub fn load_annotations(path: &Path) -> Result<Option<Vec<Annotation>>> {
    if !path.exists() {
        return Ok(None);
    }
    let stem = crate::ingest::images::file_stem(path);
    let parsed = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))
        .and_then(|xml| parse_voc_str(&xml, &stem));
    match parsed {
        Ok(annotations) => Ok(Some(annotations)),
        Err(err) => {
            log::warn!("malformed ground truth {}: {:#}", path.display(), err);
            Ok(Some(Vec::new()))
        }
    }
}

/// Ground-truth record path for an image stem.
pub fn annotation_path(annotations_dir: &Path, stem: &str) -> std::path::PathBuf {
    annotations_dir.join(format!("{}.xml", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<annotation>
    <folder>images</folder>
    <filename>frame_0001.jpg</filename>
    <size><width>640</width><height>480</height><depth>3</depth></size>
    <object>
        <name>vehicle</name>
        <pose>Unspecified</pose>
        <bndbox>
            <xmin>10</xmin>
            <ymin>20</ymin>
            <xmax>110</xmax>
            <ymax>80</ymax>
        </bndbox>
    </object>
    <object>
        <name>vehicle</name>
        <bndbox><xmin>200</xmin><ymin>220</ymin><xmax>260</xmax><ymax>300</ymax></bndbox>
    </object>
</annotation>"#;

    #[test]
    fn parses_objects_and_filename() {
        let anns = parse_voc_str(SAMPLE, "fallback").unwrap();
        assert_eq!(
            anns,
            vec![
                Annotation::new("vehicle", BoundingBox::new(10, 20, 100, 60), "frame_0001.jpg"),
                Annotation::new("vehicle", BoundingBox::new(200, 220, 60, 80), "frame_0001.jpg"),
            ]
        );
    }

    #[test]
    fn tolerates_order_whitespace_and_decimals() {
        let xml = r#"<annotation>
  <object>
    <bndbox>
      <ymax> 80.4 </ymax><xmax>110.6</xmax>
      <ymin>20</ymin><xmin> 10 </xmin>
    </bndbox>
    <difficult>0</difficult>
    <name> car </name>
  </object>
  <filename>x.png</filename>
  <object><name>car</name><bndbox><xmin>1</xmin><ymin>1</ymin><xmax>5</xmax><ymax>5</ymax></bndbox></object>
</annotation>"#;
        let anns = parse_voc_str(xml, "x").unwrap();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].label, "car");
        assert_eq!(anns[0].bbox, BoundingBox::new(10, 20, 101, 60));
        assert_eq!(anns[0].source, "x.png");
        assert_eq!(anns[1].bbox, BoundingBox::new(1, 1, 4, 4));
    }

    #[test]
    fn drops_unnamed_and_empty_objects() {
        let xml = r#"<annotation>
  <object><name></name><bndbox><xmin>0</xmin><ymin>0</ymin><xmax>5</xmax><ymax>5</ymax></bndbox></object>
  <object><name>vehicle</name><bndbox><xmin>9</xmin><ymin>0</ymin><xmax>9</xmax><ymax>5</ymax></bndbox></object>
  <object><name>vehicle</name></object>
  <object><name>vehicle</name><bndbox><xmin>0</xmin><ymin>0</ymin><xmax>3</xmax><ymax>3</ymax></bndbox></object>
</annotation>"#;
        let anns = parse_voc_str(xml, "stem").unwrap();
        assert_eq!(anns, vec![Annotation::new("vehicle", BoundingBox::new(0, 0, 3, 3), "stem")]);
    }

    #[test]
    fn missing_record_is_none_and_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_annotations(&dir.path().join("absent.xml")).unwrap(), None);

        let broken = dir.path().join("broken.xml");
        std::fs::write(&broken, "<annotation><object><name>car</name>").unwrap();
        assert_eq!(load_annotations(&broken).unwrap(), Some(Vec::new()));

        let good = annotation_path(dir.path(), "good");
        std::fs::write(&good, SAMPLE).unwrap();
        assert_eq!(load_annotations(&good).unwrap().unwrap().len(), 2);
    }
}
