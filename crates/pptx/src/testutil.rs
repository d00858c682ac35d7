//! Fixture builders shared by the unit tests.

use crate::package::PptxPackage;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// ZIP bytes for a minimal valid package plus the given extra parts.
pub(crate) fn package_bytes_from_parts(extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    let mut parts: Vec<(&str, &[u8])> = vec![
        ("[Content_Types].xml", b"<Types/>".as_slice()),
        ("ppt/presentation.xml", b"<p:presentation/>".as_slice()),
    ];
    parts.extend_from_slice(extra);
    for (path, bytes) in parts {
        writer.start_file(path, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// An opened minimal package plus the given extra parts.
pub(crate) fn package_from_parts(extra: &[(&str, &[u8])]) -> PptxPackage {
    PptxPackage::open(&package_bytes_from_parts(extra)).unwrap()
}

/// A `.rels` document mapping ids to targets.
pub(crate) fn relationships_xml(pairs: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, target) in pairs {
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="{target}"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// A slide document with one picture per entry; each entry is the embed
/// relationship id plus optional `srcRect` attributes (e.g. `l="50000"`).
pub(crate) fn slide_xml(pictures: &[(&str, Option<&str>)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>"#,
    );
    for (rel_id, src_rect) in pictures {
        xml.push_str(&format!(r#"<p:pic><p:blipFill><a:blip r:embed="{rel_id}"/>"#));
        if let Some(attrs) = src_rect {
            xml.push_str(&format!("<a:srcRect {attrs}/>"));
        }
        xml.push_str(r#"<a:stretch><a:fillRect/></a:stretch></p:blipFill></p:pic>"#);
    }
    xml.push_str("</p:spTree></p:cSld></p:sld>");
    xml
}

/// PNG bytes of a busy opaque gradient.
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}
