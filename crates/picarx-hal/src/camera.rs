//! Image snapshots returned by the sensor gateway.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Pixel/container format of a [`Snapshot`]'s bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Compressed JPEG, as produced by the Picar-X camera module.
    Jpeg,
    /// Raw 8-bit greyscale, row-major.
    Gray8,
}

impl ImageEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
            ImageEncoding::Gray8 => "application/octet-stream",
        }
    }
}

/// An opaque captured frame handed to the vision service.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn new(width: u32, height: u32, encoding: ImageEncoding, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            width,
            height,
            encoding,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_get_distinct_ids() {
        let a = Snapshot::new(2, 2, ImageEncoding::Gray8, vec![0u8; 4]);
        let b = Snapshot::new(2, 2, ImageEncoding::Gray8, vec![0u8; 4]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.data.len(), 4);
        assert_eq!(ImageEncoding::Jpeg.mime_type(), "image/jpeg");
    }
}
