use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;

/// File extensions (lower case) picked up from an image directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// One image file plus its decode outcome.
#[derive(Debug)]
pub struct ImageEntry {
    pub path: PathBuf,
    /// File name without extension; names every artifact derived from the image.
    pub stem: String,
    pub image: Result<DynamicImage>,
}

/// Counters for a directory walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub listed: usize,
    pub decoded: usize,
    pub failed: usize,
}

/// Sorted directory of still images.
pub struct ImageDirSource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    stats: IngestStats,
}

impl ImageDirSource {
    /// List `dir`. Fails when the directory cannot be read; an empty
    /// directory is not an error.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(anyhow!("image directory {} does not exist", dir.display()));
        }
        let mut paths = Vec::new();
        let read = std::fs::read_dir(&dir)
            .with_context(|| format!("read image directory {}", dir.display()))?;
        for entry in read {
            let entry = entry.with_context(|| format!("list {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() && is_supported(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("found {} images in {}", paths.len(), dir.display());
        let stats = IngestStats {
            listed: paths.len(),
            ..IngestStats::default()
        };
        Ok(Self {
            dir,
            paths,
            cursor: 0,
            stats,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }
}

impl Iterator for ImageDirSource {
    type Item = ImageEntry;

    fn next(&mut self) -> Option<ImageEntry> {
        let path = self.paths.get(self.cursor)?.clone();
        self.cursor += 1;
        let image = image::open(&path).with_context(|| format!("decode {}", path.display()));
        match image {
            Ok(_) => self.stats.decoded += 1,
            Err(_) => self.stats.failed += 1,
        }
        Some(ImageEntry {
            stem: file_stem(&path),
            path,
            image,
        })
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn lists_images_sorted_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))
            .save(dir.path().join("a.BMP"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.dir(), dir.path());
        let stems: Vec<String> = source.map(|e| e.stem).collect();
        assert_eq!(stems, vec!["a", "b"]);
    }

    #[test]
    fn corrupt_file_is_reported_and_walk_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.jpg"), b"garbage").unwrap();
        RgbImage::from_pixel(5, 5, Rgb([9, 9, 9]))
            .save(dir.path().join("0002.png"))
            .unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        let first = source.next().unwrap();
        assert_eq!(first.stem, "0001");
        assert!(first.image.is_err());
        let second = source.next().unwrap();
        assert_eq!(second.image.unwrap().width(), 5);
        assert!(source.next().is_none());
        assert_eq!(
            source.stats(),
            &IngestStats {
                listed: 2,
                decoded: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDirSource::open(dir.path().join("absent")).is_err());
    }
}
