//! Crop recovery from slide XML.
//!
//! A picture on a slide is a `blipFill` holding a `blip` with an `r:embed`
//! relationship id; an optional sibling `srcRect` describes the visible
//! sub-region as edge insets in parts-per-100,000. We scan every slide for
//! those pairs, resolve the relationship id to a concrete media path through
//! the slide's `_rels` part, and plan one baked crop per media file. Once a
//! crop is baked into the image the originating `srcRect` elements are
//! stripped so a viewer does not apply the crop a second time.

use crate::package::PptxPackage;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use slimdeck_core::{Error, Result};
use slimdeck_media::CropRect;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

/// One slide's reference to a cropped image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropReference {
    /// Slide part carrying the `srcRect`.
    pub slide_path: String,

    /// Relationship id of the embedded image within that slide.
    pub rel_id: String,
}

/// A crop to bake into one media file, with every slide reference that
/// agrees on it.
#[derive(Debug, Clone)]
pub struct PlannedCrop {
    /// Absolute media path inside the package.
    pub image_path: String,

    /// The agreed crop rectangle.
    pub rect: CropRect,

    /// All references whose `srcRect` must be stripped once baked.
    pub refs: Vec<CropReference>,
}

/// Outcome of scanning all slides.
#[derive(Debug, Default)]
pub struct CropPlan {
    /// Crops to bake, one per media path.
    pub crops: Vec<PlannedCrop>,

    /// Media paths excluded because slides disagreed on the rectangle.
    pub conflicting: Vec<String>,
}

impl CropPlan {
    /// The planned crop for a media path, if any.
    pub fn crop_for(&self, image_path: &str) -> Option<&PlannedCrop> {
        self.crops.iter().find(|c| c.image_path == image_path)
    }
}

/// Scan every slide part and plan which crops can be baked.
///
/// When multiple references to one media file carry the *same* rectangle
/// they collapse into a single planned crop; when rectangles differ, the
/// file is excluded entirely: baking one slide's crop would corrupt every
/// other slide's view of the shared image. A reference without a `srcRect`
/// counts as the full-image rectangle, so it conflicts with any crop.
pub fn extract_crop_plan(package: &PptxPackage) -> CropPlan {
    let mut by_path: HashMap<String, PlannedCrop> = HashMap::new();
    let mut conflicting: HashSet<String> = HashSet::new();

    let mut slide_paths = package.paths_where(|p| {
        p.starts_with("ppt/slides/") && p.ends_with(".xml") && !p.contains("_rels")
    });
    slide_paths.sort();

    for slide_path in slide_paths {
        let found = match scan_slide(package, &slide_path) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("skipping crop scan of {slide_path}: {e}");
                continue;
            }
        };
        if found.is_empty() {
            continue;
        }

        let rel_targets = match slide_relationship_targets(package, &slide_path) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("cannot resolve relationships for {slide_path}: {e}");
                continue;
            }
        };

        for (rel_id, rect) in found {
            let Some(image_path) = rel_targets.get(&rel_id) else {
                log::warn!("{slide_path}: no relationship target for {rel_id}");
                continue;
            };
            if !package.contains(image_path) {
                log::warn!("{slide_path}: crop target {image_path} not in package");
                continue;
            }

            let reference = CropReference {
                slide_path: slide_path.clone(),
                rel_id,
            };
            match by_path.get_mut(image_path) {
                Some(planned) if planned.rect == rect => planned.refs.push(reference),
                Some(_) => {
                    log::warn!(
                        "{image_path}: conflicting crop rectangles across slides; leaving uncropped"
                    );
                    conflicting.insert(image_path.clone());
                }
                None => {
                    by_path.insert(
                        image_path.clone(),
                        PlannedCrop {
                            image_path: image_path.clone(),
                            rect,
                            refs: vec![reference],
                        },
                    );
                }
            }
        }
    }

    let mut crops: Vec<PlannedCrop> = by_path
        .into_values()
        .filter(|c| !conflicting.contains(&c.image_path) && !c.rect.is_empty())
        .collect();
    crops.sort_by(|a, b| a.image_path.cmp(&b.image_path));

    let mut conflicting: Vec<String> = conflicting.into_iter().collect();
    conflicting.sort();

    CropPlan { crops, conflicting }
}

/// Remove the `srcRect` elements for the given relationship ids from one
/// slide part, leaving every other byte of the document intact.
pub fn strip_src_rects(
    package: &mut PptxPackage,
    slide_path: &str,
    rel_ids: &HashSet<String>,
) -> Result<usize> {
    let content = package.read_string(slide_path)?;
    let mut reader = Reader::from_str(&content);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut current_embed: Option<String> = None;
    let mut stripped = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"blip" =>
            {
                current_embed = embed_attribute(e);
                writer
                    .write_event(event.clone())
                    .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"srcRect" => {
                if current_embed.as_ref().is_some_and(|id| rel_ids.contains(id)) {
                    stripped += 1;
                } else {
                    writer
                        .write_event(event.clone())
                        .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
                }
            }
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"srcRect" => {
                let end = e.to_end().into_owned();
                if current_embed.as_ref().is_some_and(|id| rel_ids.contains(id)) {
                    reader
                        .read_to_end(end.name())
                        .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
                    stripped += 1;
                } else {
                    writer
                        .write_event(event.clone())
                        .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"blipFill" => {
                current_embed = None;
                writer
                    .write_event(event.clone())
                    .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
            }
            other => {
                writer
                    .write_event(other)
                    .map_err(|e| Error::XmlError(format!("{slide_path}: {e}")))?;
            }
        }
    }

    if stripped > 0 {
        package.replace(slide_path, writer.into_inner().into_inner())?;
    }
    Ok(stripped)
}

/// Scan one slide for (relationship id, crop rectangle) pairs.
///
/// Every blip reference is recorded: a picture without a `srcRect` carries
/// the full-image (empty) rectangle, so it participates in the conflict
/// rule against any cropped reference to the same media.
fn scan_slide(package: &PptxPackage, slide_path: &str) -> Result<Vec<(String, CropRect)>> {
    let content = package.read_string(slide_path)?;
    let mut reader = Reader::from_str(&content);
    reader.trim_text(true);

    let mut found = Vec::new();
    let mut in_blip_fill = false;
    let mut current_embed: Option<String> = None;
    let mut current_rect = CropRect::from_src_rect(0, 0, 0, 0);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"blipFill" => {
                        in_blip_fill = true;
                        current_embed = None;
                        current_rect = CropRect::from_src_rect(0, 0, 0, 0);
                    }
                    b"blip" if in_blip_fill => {
                        current_embed = embed_attribute(e);
                    }
                    b"srcRect" if in_blip_fill => {
                        current_rect = src_rect_attributes(e);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == b"blipFill" => {
                in_blip_fill = false;
                if let Some(rel_id) = current_embed.take() {
                    found.push((rel_id, current_rect));
                }
                current_rect = CropRect::from_src_rect(0, 0, 0, 0);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlError(format!("{slide_path}: {e}"))),
            _ => {}
        }
    }

    Ok(found)
}

/// Relationship id -> normalized media path for one slide's `_rels` part.
fn slide_relationship_targets(
    package: &PptxPackage,
    slide_path: &str,
) -> Result<HashMap<String, String>> {
    let file_name = slide_path
        .rsplit('/')
        .next()
        .ok_or_else(|| Error::XmlError(format!("malformed slide path {slide_path}")))?;
    let rels_path = format!("ppt/slides/_rels/{file_name}.rels");
    let content = package.read_string(&rels_path)?;

    let mut map = HashMap::new();
    let mut reader = Reader::from_str(&content);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => {
                            target = Some(String::from_utf8_lossy(&attr.value).to_string())
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    map.insert(id, normalize_target(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlError(format!("{rels_path}: {e}"))),
            _ => {}
        }
    }

    Ok(map)
}

/// Resolve a relationship target against the `ppt/` root.
fn normalize_target(target: &str) -> String {
    if let Some(rest) = target.strip_prefix("../") {
        format!("ppt/{rest}")
    } else if let Some(rest) = target.strip_prefix('/') {
        rest.to_string()
    } else {
        format!("ppt/{target}")
    }
}

/// Pull the `r:embed` value off a `blip` element.
fn embed_attribute(e: &quick_xml::events::BytesStart) -> Option<String> {
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) == b"embed" {
            return Some(String::from_utf8_lossy(&attr.value).to_string());
        }
    }
    None
}

/// Parse `l`/`t`/`r`/`b` off a `srcRect` element; missing attributes are 0.
fn src_rect_attributes(e: &quick_xml::events::BytesStart) -> CropRect {
    let mut l = 0i64;
    let mut t = 0i64;
    let mut r = 0i64;
    let mut b = 0i64;
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value);
        let Ok(parsed) = value.parse::<i64>() else {
            continue;
        };
        match attr.key.as_ref() {
            b"l" => l = parsed,
            b"t" => t = parsed,
            b"r" => r = parsed,
            b"b" => b = parsed,
            _ => {}
        }
    }
    CropRect::from_src_rect(l, t, r, b)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{package_from_parts, relationships_xml, slide_xml};

    #[test]
    fn test_extracts_resolved_crop() {
        let slide = slide_xml(&[("rId2", Some(r#"l="10000" t="10000" r="10000" b="10000""#))]);
        let rels = relationships_xml(&[("rId2", "../media/image1.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels.as_bytes()),
            ("ppt/media/image1.png", b"img"),
        ]);

        let plan = extract_crop_plan(&package);
        assert_eq!(plan.crops.len(), 1);
        assert!(plan.conflicting.is_empty());

        let crop = &plan.crops[0];
        assert_eq!(crop.image_path, "ppt/media/image1.png");
        assert_eq!(crop.rect, CropRect::from_src_rect(10_000, 10_000, 10_000, 10_000));
        assert_eq!(
            crop.refs,
            vec![CropReference {
                slide_path: "ppt/slides/slide1.xml".into(),
                rel_id: "rId2".into()
            }]
        );
    }

    #[test]
    fn test_missing_attributes_default_to_zero() {
        let slide = slide_xml(&[("rId2", Some(r#"l="50000""#))]);
        let rels = relationships_xml(&[("rId2", "../media/image1.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels.as_bytes()),
            ("ppt/media/image1.png", b"img"),
        ]);

        let plan = extract_crop_plan(&package);
        assert_eq!(plan.crops[0].rect, CropRect::from_src_rect(50_000, 0, 0, 0));
    }

    #[test]
    fn test_uncropped_pictures_are_ignored() {
        let slide = slide_xml(&[("rId2", None)]);
        let rels = relationships_xml(&[("rId2", "../media/image1.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels.as_bytes()),
            ("ppt/media/image1.png", b"img"),
        ]);

        assert!(extract_crop_plan(&package).crops.is_empty());
    }

    #[test]
    fn test_identical_crops_on_shared_media_collapse() {
        let attrs = r#"l="20000""#;
        let slide1 = slide_xml(&[("rId2", Some(attrs))]);
        let slide2 = slide_xml(&[("rId7", Some(attrs))]);
        let rels1 = relationships_xml(&[("rId2", "../media/shared.png")]);
        let rels2 = relationships_xml(&[("rId7", "../media/shared.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide1.as_bytes()),
            ("ppt/slides/slide2.xml", slide2.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels1.as_bytes()),
            ("ppt/slides/_rels/slide2.xml.rels", rels2.as_bytes()),
            ("ppt/media/shared.png", b"img"),
        ]);

        let plan = extract_crop_plan(&package);
        assert_eq!(plan.crops.len(), 1);
        assert_eq!(plan.crops[0].refs.len(), 2);
    }

    #[test]
    fn test_uncropped_reference_conflicts_with_a_crop() {
        // slide1 shows the full image, slide2 crops it; baking the crop
        // would corrupt slide1's view, so the path is disqualified.
        let slide1 = slide_xml(&[("rId2", None)]);
        let slide2 = slide_xml(&[("rId7", Some(r#"l="50000""#))]);
        let rels1 = relationships_xml(&[("rId2", "../media/shared.png")]);
        let rels2 = relationships_xml(&[("rId7", "../media/shared.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide1.as_bytes()),
            ("ppt/slides/slide2.xml", slide2.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels1.as_bytes()),
            ("ppt/slides/_rels/slide2.xml.rels", rels2.as_bytes()),
            ("ppt/media/shared.png", b"img"),
        ]);

        let plan = extract_crop_plan(&package);
        assert!(plan.crops.is_empty());
        assert_eq!(plan.conflicting, vec!["ppt/media/shared.png".to_string()]);
    }

    #[test]
    fn test_conflicting_crops_disqualify_the_media_path() {
        let slide1 = slide_xml(&[("rId2", Some(r#"l="20000""#))]);
        let slide2 = slide_xml(&[("rId7", Some(r#"l="40000""#))]);
        let rels1 = relationships_xml(&[("rId2", "../media/shared.png")]);
        let rels2 = relationships_xml(&[("rId7", "../media/shared.png")]);
        let package = package_from_parts(&[
            ("ppt/slides/slide1.xml", slide1.as_bytes()),
            ("ppt/slides/slide2.xml", slide2.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels1.as_bytes()),
            ("ppt/slides/_rels/slide2.xml.rels", rels2.as_bytes()),
            ("ppt/media/shared.png", b"img"),
        ]);

        let plan = extract_crop_plan(&package);
        assert!(plan.crops.is_empty());
        assert_eq!(plan.conflicting, vec!["ppt/media/shared.png".to_string()]);
    }

    #[test]
    fn test_strip_removes_only_targeted_src_rects() {
        let slide = slide_xml(&[
            ("rId2", Some(r#"l="10000""#)),
            ("rId3", Some(r#"t="30000""#)),
        ]);
        let mut package =
            package_from_parts(&[("ppt/slides/slide1.xml", slide.as_bytes())]);

        let targets = HashSet::from(["rId2".to_string()]);
        let stripped = strip_src_rects(&mut package, "ppt/slides/slide1.xml", &targets).unwrap();
        assert_eq!(stripped, 1);

        let rewritten = package.read_string("ppt/slides/slide1.xml").unwrap();
        // rId2's srcRect is gone; rId3's survives.
        assert!(!rewritten.contains(r#"l="10000""#));
        assert!(rewritten.contains(r#"t="30000""#));
        assert!(rewritten.contains(r#"r:embed="rId2""#));
    }

    #[test]
    fn test_strip_with_no_targets_leaves_part_untouched() {
        let slide = slide_xml(&[("rId2", Some(r#"l="10000""#))]);
        let mut package =
            package_from_parts(&[("ppt/slides/slide1.xml", slide.as_bytes())]);
        let before = package.read("ppt/slides/slide1.xml").unwrap().to_vec();

        let stripped =
            strip_src_rects(&mut package, "ppt/slides/slide1.xml", &HashSet::new()).unwrap();
        assert_eq!(stripped, 0);
        assert_eq!(package.read("ppt/slides/slide1.xml").unwrap(), &before[..]);
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("../media/image1.png"), "ppt/media/image1.png");
        assert_eq!(normalize_target("/ppt/media/image1.png"), "ppt/media/image1.png");
        assert_eq!(normalize_target("media/image1.png"), "ppt/media/image1.png");
    }
}
