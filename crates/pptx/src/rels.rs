//! Reachable-media resolution and the unused-media sweep.
//!
//! Decks reference media transitively through three relationship tiers:
//! slides, slide layouts, and slide masters. A coarse mark-and-sweep over
//! those tiers is enough in practice: anything a visible slide can show is
//! linked from one of them. The sweep tolerates over-retention (media kept
//! because a layout nobody uses still links it) but must never delete media
//! a slide can actually display, so an unreadable relationship part disables
//! the sweep for the whole run.

use crate::package::PptxPackage;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;

/// Relationship part directories scanned for media targets.
const RELS_TIERS: [&str; 3] = [
    "ppt/slides/_rels/",
    "ppt/slideLayouts/_rels/",
    "ppt/slideMasters/_rels/",
];

/// Extensions the sweep may delete when unreferenced.
const SWEEPABLE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "svg"];

/// Extensions the transcode engine can process.
const RASTER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Whether a path is an image the sweep is allowed to delete.
pub fn is_sweepable_media(path: &str) -> bool {
    path.starts_with("ppt/media/") && has_extension(path, &SWEEPABLE_EXTENSIONS)
}

/// Whether a path is a raster image the transcode engine handles.
pub fn is_raster_media(path: &str) -> bool {
    path.starts_with("ppt/media/") && has_extension(path, &RASTER_EXTENSIONS)
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    match path.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        }
        None => false,
    }
}

/// Media reachable from the three relationship tiers.
#[derive(Debug, Default)]
pub struct MediaReachability {
    /// Normalized `ppt/media/...` paths with at least one incoming edge.
    pub reachable: HashSet<String>,

    /// Whether any relationship part could not be read or parsed.
    pub degraded: bool,
}

/// What the sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Paths deleted from the package.
    pub removed: Vec<String>,

    /// True when a degraded scan forced the sweep to be skipped.
    pub skipped_degraded: bool,
}

/// Union all `../media/` relationship targets across the three tiers.
pub fn collect_reachable_media(package: &PptxPackage) -> MediaReachability {
    let mut reachability = MediaReachability::default();

    for tier in RELS_TIERS {
        let rels_parts =
            package.paths_where(|path| path.starts_with(tier) && path.ends_with(".rels"));
        for part in rels_parts {
            match read_media_targets(package, &part) {
                Ok(targets) => reachability.reachable.extend(targets),
                Err(message) => {
                    log::warn!("skipping unreadable relationship part {part}: {message}");
                    reachability.degraded = true;
                }
            }
        }
    }

    reachability
}

/// Delete every sweepable media entry with no incoming relationship edge.
pub fn sweep_unused_media(package: &mut PptxPackage) -> SweepReport {
    let reachability = collect_reachable_media(package);
    if reachability.degraded {
        // Missing edges mean we cannot tell used from unused; keep everything.
        log::warn!("relationship scan degraded; keeping all media");
        return SweepReport {
            removed: Vec::new(),
            skipped_degraded: true,
        };
    }

    let unused = package
        .paths_where(|path| is_sweepable_media(path) && !reachability.reachable.contains(path));

    let mut report = SweepReport::default();
    for path in unused {
        if package.delete(&path) {
            log::debug!("removed unreferenced media {path}");
            report.removed.push(path);
        }
    }
    report
}

/// Extract normalized media targets from one relationship part.
///
/// Structural extraction only: we walk `Relationship` elements and read
/// their `Target` attributes, ignoring everything else in the document.
fn read_media_targets(package: &PptxPackage, part: &str) -> std::result::Result<Vec<String>, String> {
    let content = package.read_string(part).map_err(|e| e.to_string())?;

    let mut targets = Vec::new();
    let mut reader = Reader::from_str(&content);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"Target" {
                        let target = String::from_utf8_lossy(&attr.value);
                        if let Some(media) = target.strip_prefix("../media/") {
                            targets.push(format!("ppt/media/{media}"));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("error parsing relationships: {e}")),
            _ => {}
        }
    }

    Ok(targets)
}
