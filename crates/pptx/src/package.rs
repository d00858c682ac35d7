//! In-memory model of an OOXML package.
//!
//! A .pptx file is a ZIP archive of parts. The model holds every entry in
//! original order; deletes and replacements only touch the in-memory map,
//! and nothing is written until [`PptxPackage::serialize`] produces a fresh
//! archive. Paths are never renamed, so the serialized entry set is always
//! a subset of the opened one.

use slimdeck_core::{Error, Result};
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Parts that every OOXML presentation must carry.
const REQUIRED_PARTS: [&str; 2] = ["[Content_Types].xml", "ppt/presentation.xml"];

/// One named entry of the package.
#[derive(Debug, Clone)]
struct Entry {
    path: String,
    bytes: Vec<u8>,
}

/// An opened presentation package.
#[derive(Debug)]
pub struct PptxPackage {
    entries: Vec<Entry>,
}

impl PptxPackage {
    /// Open and validate a package from raw bytes.
    ///
    /// Fails with `InvalidArchive` when the bytes are not a readable ZIP or
    /// a required part is missing.
    pub fn open(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::InvalidArchive(format!("failed to open ZIP: {e}")))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| Error::InvalidArchive(format!("failed to read entry {index}: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)
                .map_err(|e| Error::InvalidArchive(format!("failed to read {}: {e}", file.name())))?;
            entries.push(Entry {
                path: file.name().to_string(),
                bytes,
            });
        }

        let package = Self { entries };
        for part in REQUIRED_PARTS {
            if !package.contains(part) {
                return Err(Error::InvalidArchive(format!("missing required part {part}")));
            }
        }
        Ok(package)
    }

    /// Number of entries currently in the package.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all uncompressed entry sizes.
    pub fn byte_size(&self) -> u64 {
        self.entries.iter().map(|e| e.bytes.len() as u64).sum()
    }

    /// Entry paths in original archive order.
    pub fn entry_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Paths matching a predicate, collected in original order.
    pub fn paths_where(&self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| predicate(&e.path))
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    /// Raw bytes of an entry.
    pub fn read(&self, path: &str) -> Result<&[u8]> {
        self.position(path)
            .map(|i| self.entries[i].bytes.as_slice())
            .ok_or_else(|| Error::MissingEntry(path.to_string()))
    }

    /// UTF-8 contents of an XML part.
    pub fn read_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::XmlError(format!("{path} is not valid UTF-8: {e}")))
    }

    /// Replace an existing entry's bytes in memory.
    pub fn replace(&mut self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let index = self
            .position(path)
            .ok_or_else(|| Error::MissingEntry(path.to_string()))?;
        self.entries[index].bytes = bytes;
        Ok(())
    }

    /// Delete an entry in memory. Returns whether it existed.
    pub fn delete(&mut self, path: &str) -> bool {
        match self.position(path) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Write the package out as a ZIP with maximum-ratio deflate.
    ///
    /// Entries are written in their original order with fixed options, so
    /// the same entry set always serializes to the same bytes. The callback
    /// receives (entries written, total entries).
    pub fn serialize(&self, mut progress: impl FnMut(usize, usize)) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));

        let total = self.entries.len();
        for (index, entry) in self.entries.iter().enumerate() {
            writer
                .start_file(entry.path.clone(), options)
                .map_err(|e| Error::ZipError(format!("{}: {e}", entry.path)))?;
            writer
                .write_all(&entry.bytes)
                .map_err(|e| Error::ZipError(format!("{}: {e}", entry.path)))?;
            progress(index + 1, total);
        }

        let cursor = writer
            .finish()
            .map_err(|e| Error::ZipError(format!("failed to finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::package_bytes_from_parts as minimal_package_bytes;

    #[test]
    fn test_open_rejects_garbage() {
        let err = PptxPackage::open(b"not a zip at all").unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(_)));
    }

    #[test]
    fn test_open_requires_presentation_part() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = PptxPackage::open(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(_)));
    }

    #[test]
    fn test_read_replace_delete() {
        let bytes = minimal_package_bytes(&[("ppt/media/image1.png", b"imagebytes")]);
        let mut package = PptxPackage::open(&bytes).unwrap();

        assert_eq!(package.read("ppt/media/image1.png").unwrap(), b"imagebytes");
        assert!(matches!(
            package.read("ppt/media/missing.png").unwrap_err(),
            Error::MissingEntry(_)
        ));

        package.replace("ppt/media/image1.png", b"smaller".to_vec()).unwrap();
        assert_eq!(package.read("ppt/media/image1.png").unwrap(), b"smaller");
        assert!(matches!(
            package.replace("ppt/media/missing.png", Vec::new()).unwrap_err(),
            Error::MissingEntry(_)
        ));

        assert!(package.delete("ppt/media/image1.png"));
        assert!(!package.delete("ppt/media/image1.png"));
        assert!(!package.contains("ppt/media/image1.png"));
    }

    #[test]
    fn test_serialize_round_trip_preserves_untouched_bytes() {
        let bytes = minimal_package_bytes(&[("ppt/slides/slide1.xml", b"<p:sld/>")]);
        let package = PptxPackage::open(&bytes).unwrap();

        let mut seen = Vec::new();
        let out = package.serialize(|done, total| seen.push((done, total))).unwrap();
        assert_eq!(seen.last(), Some(&(3, 3)));

        let reopened = PptxPackage::open(&out).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.read("ppt/slides/slide1.xml").unwrap(), b"<p:sld/>");
        assert_eq!(
            package.entry_paths().collect::<Vec<_>>(),
            reopened.entry_paths().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let bytes = minimal_package_bytes(&[("ppt/media/image1.png", &[7u8; 4096])]);
        let package = PptxPackage::open(&bytes).unwrap();
        let first = package.serialize(|_, _| {}).unwrap();
        let second = package.serialize(|_, _| {}).unwrap();
        assert_eq!(first, second);
    }
}
