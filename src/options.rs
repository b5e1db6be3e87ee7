//! Settings for opening and creating datasets.

use std::fmt;

use encoding::EncodingRef;

/// Configuration passed to readers and writers.
///
/// Nothing here is global: two readers may decode the same ".dbf" with
/// different encodings.
#[derive(Clone, Copy)]
pub struct ShapefileOptions {
    /// Encoding of Character fields in the ".dbf".
    pub encoding: EncodingRef,

    /// Reject records whose stored bounding box (and Z/M ranges) disagree
    /// with the coordinates they contain.
    pub validate_bounding_boxes: bool,

    /// Advance past deleted ".dbf" rows (and their shapes) instead of
    /// yielding them.
    pub skip_deleted: bool,
}

impl Default for ShapefileOptions {
    fn default() -> Self {
        ShapefileOptions {
            encoding: encoding::all::WINDOWS_1252,
            validate_bounding_boxes: false,
            skip_deleted: false,
        }
    }
}

// encoding::EncodingRef does not implement std::fmt::Debug
impl fmt::Debug for ShapefileOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ShapefileOptions")
            .field("encoding", &self.encoding.name())
            .field("validate_bounding_boxes", &self.validate_bounding_boxes)
            .field("skip_deleted", &self.skip_deleted)
            .finish()
    }
}

impl ShapefileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn encoding(mut self, encoding: EncodingRef) -> Self {
        self.encoding = encoding;
        self
    }

    /// Looks up an encoding by its WHATWG label ("utf-8", "latin1", ...).
    ///
    /// Returns None for labels the `encoding` crate doesn't know.
    pub fn with_encoding_label(self, label: &str) -> Option<Self> {
        encoding::label::encoding_from_whatwg_label(label).map(|e| self.encoding(e))
    }

    #[must_use]
    pub fn validate_bounding_boxes(mut self, value: bool) -> Self {
        self.validate_bounding_boxes = value;
        self
    }

    #[must_use]
    pub fn skip_deleted(mut self, value: bool) -> Self {
        self.skip_deleted = value;
        self
    }
}
