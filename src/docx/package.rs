use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DocError, Result};
use crate::ir::PartName;

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const BODY_ENTRY: &str = "word/document.xml";

static HEADER_FOOTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/(header|footer)(\d+)\.xml$").expect("header/footer regex"));

/// A document package held in memory, entries in archive order.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxEntry {
    pub fn file(name: &str, data: impl Into<Vec<u8>>) -> Self {
        DocxEntry {
            name: name.to_string(),
            data: data.into(),
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        }
    }
}

impl DocxPackage {
    /// Opens a package buffer. Fails when the buffer is not a zip archive or the
    /// main document part is missing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DocError::PackageFormat(format!("not a zip archive: {e}")))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| DocError::PackageFormat(format!("zip entry {i}: {e}")))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| DocError::PackageFormat(format!("read {}: {e}", file.name())))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        let pkg = Self { entries };
        if pkg.entry(BODY_ENTRY).is_none() {
            return Err(DocError::PackageFormat(format!("missing {BODY_ENTRY}")));
        }
        Ok(pkg)
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let bytes =
            std::fs::read(path).with_context(|| format!("open docx: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("read docx: {}", path.display()))
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name && !e.is_dir)
    }

    /// Raw XML of the body, then every `word/headerN.xml` and `word/footerN.xml`,
    /// headers and footers ordered by N.
    pub fn text_parts(&self) -> Result<Vec<(PartName, &[u8])>> {
        let body = self
            .entry(BODY_ENTRY)
            .ok_or_else(|| DocError::PackageFormat(format!("missing {BODY_ENTRY}")))?;
        let mut extra: Vec<(PartName, &[u8])> = self
            .entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| part_name_for_entry(&e.name).map(|p| (p, e.data.as_slice())))
            .filter(|(p, _)| *p != PartName::Body)
            .collect();
        extra.sort_by_key(|(p, _)| *p);

        let mut parts = vec![(PartName::Body, body.data.as_slice())];
        parts.extend(extra);
        Ok(parts)
    }

    pub fn part_xml(&self, part: PartName) -> Option<&[u8]> {
        self.entry(&part.entry_name()).map(|e| e.data.as_slice())
    }

    /// Re-zips every entry in its original order and with its original
    /// compression; entries named in `replacements` get the new bytes.
    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        use anyhow::Context;

        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        self.to_bytes_with_replacements(&HashMap::new())
    }
}

/// Maps a zip entry name to the part it holds, if it is a text part.
pub fn part_name_for_entry(name: &str) -> Option<PartName> {
    if name == BODY_ENTRY {
        return Some(PartName::Body);
    }
    let caps = HEADER_FOOTER_RE.captures(name)?;
    let n = caps[2].parse::<u32>().ok()?;
    match &caps[1] {
        "header" => Some(PartName::Header(n)),
        _ => Some(PartName::Footer(n)),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn package(entries: &[(&str, &str)]) -> Vec<u8> {
        DocxPackage {
            entries: entries
                .iter()
                .map(|(n, d)| DocxEntry::file(n, d.as_bytes()))
                .collect(),
        }
        .to_bytes()
        .expect("zip")
    }

    #[test]
    fn parts_are_body_then_headers_then_footers_numerically() {
        let bytes = package(&[
            ("[Content_Types].xml", "<Types/>"),
            ("word/footer1.xml", "<w:ftr/>"),
            ("word/header10.xml", "<w:hdr/>"),
            ("word/document.xml", "<w:document/>"),
            ("word/header2.xml", "<w:hdr/>"),
            ("word/headers.xml", "<x/>"),
            ("word/styles.xml", "<w:styles/>"),
        ]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");
        let names: Vec<PartName> = pkg
            .text_parts()
            .expect("parts")
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(
            names,
            vec![
                PartName::Body,
                PartName::Header(2),
                PartName::Header(10),
                PartName::Footer(1)
            ]
        );
    }

    #[test]
    fn missing_body_is_a_format_error() {
        let bytes = package(&[("word/header1.xml", "<w:hdr/>")]);
        assert!(matches!(
            DocxPackage::from_bytes(&bytes),
            Err(DocError::PackageFormat(_))
        ));
    }

    #[test]
    fn garbage_is_a_format_error() {
        assert!(matches!(
            DocxPackage::from_bytes(b"definitely not a zip"),
            Err(DocError::PackageFormat(_))
        ));
    }

    #[test]
    fn rewrite_keeps_order_and_untouched_bytes() {
        let bytes = package(&[
            ("[Content_Types].xml", "<Types/>"),
            ("word/document.xml", "<old/>"),
            ("word/media/image1.png", "PNGDATA"),
        ]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");
        let mut repl = HashMap::new();
        repl.insert("word/document.xml".to_string(), b"<new/>".to_vec());
        let out = DocxPackage::from_bytes(&pkg.to_bytes_with_replacements(&repl).expect("zip"))
            .expect("reopen");

        let names: Vec<&str> = out.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "word/document.xml", "word/media/image1.png"]
        );
        assert_eq!(out.part_xml(PartName::Body), Some(&b"<new/>"[..]));
        assert_eq!(
            out.entry("word/media/image1.png").map(|e| e.data.clone()),
            Some(b"PNGDATA".to_vec())
        );
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        assert_eq!(sha256_hex(b"abc").len(), 64);
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_ne!(sha256_hex(b"abc"), sha256_hex(b"abd"));
    }
}
