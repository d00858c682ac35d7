//! Error types for PPTX recompression.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while recompressing a presentation.
///
/// Run-fatal variants are `InvalidArchive`, `UnsupportedFileType`,
/// `ZipError` and `Aborted`; everything else is recovered per part or
/// per image by the pipeline (the original bytes are kept and the failure is
/// logged).
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or write the underlying file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The submitted file is not a .pptx presentation.
    #[error("Unsupported file type: {0} (only .pptx files are supported)")]
    UnsupportedFileType(String),

    /// The input is not a readable ZIP package or lacks required OOXML parts.
    #[error("Invalid or corrupted archive: {0}")]
    InvalidArchive(String),

    /// A referenced entry does not exist in the package.
    #[error("Entry not found in archive: {0}")]
    MissingEntry(String),

    /// Failed to parse an XML part.
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// A crop rectangle resolved to pixel bounds outside the source image.
    #[error("Crop out of bounds for {path}: x={x} y={y} w={width} h={height} against {image_width}x{image_height}")]
    CropOutOfBounds {
        path: String,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        image_width: u32,
        image_height: u32,
    },

    /// Failed to decode an embedded image.
    #[error("Image decode error: {0}")]
    DecodeError(String),

    /// Failed to re-encode an image to any candidate format.
    #[error("Image encode error: {0}")]
    EncodeError(String),

    /// ZIP error while writing the final package.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// The run was aborted before completion.
    #[error("Compression aborted")]
    Aborted,
}

impl Error {
    /// Whether this error aborts the whole run.
    ///
    /// Per-image and per-part failures are recoverable: the pipeline keeps
    /// the original bytes and continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::IoError(_)
                | Error::UnsupportedFileType(_)
                | Error::InvalidArchive(_)
                | Error::ZipError(_)
                | Error::Aborted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::InvalidArchive("not a zip".into()).is_fatal());
        assert!(Error::UnsupportedFileType("deck.key".into()).is_fatal());
        assert!(Error::ZipError("write failed".into()).is_fatal());
        assert!(Error::Aborted.is_fatal());

        assert!(!Error::DecodeError("bad header".into()).is_fatal());
        assert!(!Error::EncodeError("unsupported color".into()).is_fatal());
        assert!(!Error::MissingEntry("ppt/media/image9.png".into()).is_fatal());
        assert!(!Error::XmlError("truncated".into()).is_fatal());
    }

    #[test]
    fn test_crop_out_of_bounds_message() {
        let err = Error::CropOutOfBounds {
            path: "ppt/media/image1.png".into(),
            x: 60,
            y: 0,
            width: -20,
            height: 100,
            image_width: 100,
            image_height: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("ppt/media/image1.png"));
        assert!(msg.contains("100x100"));
    }
}
