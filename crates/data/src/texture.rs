//! Ship texture wire format and per-material texture packs.
//!
//! Texture buffers use the current unpadded layout:
//!
//! ```text
//! [width:u32][height:u32][inversionFlag:u8][pixels: width*height*4 RGBA]
//! ```
//!
//! An older revision padded the flag to four bytes plus six dead bytes; it is
//! not supported here.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::reader::ByteReader;

/// A decoded RGBA image. `inversion` means the rows are stored bottom-up and
/// must be flipped before upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipTexture {
    pub width: u32,
    pub height: u32,
    pub inversion: bool,
    pub pixels: Vec<u8>,
}

const HEADER_LEN: usize = 4 + 4 + 1;

impl ShipTexture {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let (Some(width), Some(height), Some(flag)) = (r.u32(), r.u32(), r.u8()) else {
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: HEADER_LEN,
                len: bytes.len(),
            });
        };

        if flag > 1 {
            tracing::warn!(flag, "unexpected inversion flag value");
        }
        let inversion = flag == 1;

        let pixel_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .unwrap_or(usize::MAX);
        let Some(pixels) = r.bytes(pixel_len) else {
            return Err(DecodeError::Truncated {
                offset: HEADER_LEN,
                needed: pixel_len,
                len: bytes.len(),
            });
        };
        if r.remaining() != 0 {
            tracing::warn!(trailing = r.remaining(), "trailing bytes after pixel data");
        }

        Ok(Self {
            width,
            height,
            inversion,
            pixels: pixels.to_vec(),
        })
    }

    /// Inverse of [`ShipTexture::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.pixels.len());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(self.inversion as u8);
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// Optional per-material shading metadata, served as JSON next to the
/// texture channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureMeta {
    pub diffuse_color: [f32; 4],
    pub opacity: [f32; 2],
}

impl TextureMeta {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Everything one material contributes to shading: the required base color
/// image plus optional light/bump channels and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturePack {
    pub base: ShipTexture,
    pub light: Option<ShipTexture>,
    pub bump: Option<ShipTexture>,
    pub meta: Option<TextureMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(width: u32, height: u32, inversion: bool) -> ShipTexture {
        let pixels = (0..width * height * 4).map(|i| (i % 251) as u8).collect();
        ShipTexture {
            width,
            height,
            inversion,
            pixels,
        }
    }

    #[test]
    fn roundtrip() {
        for tex in [sample(4, 2, true), sample(1, 1, false), sample(3, 5, false)] {
            let decoded = ShipTexture::decode(&tex.encode()).unwrap();
            assert_eq!(decoded, tex);
            assert_eq!(
                decoded.pixels.len(),
                (decoded.width * decoded.height * 4) as usize
            );
        }
    }

    #[test]
    fn inversion_flag_policy() {
        let mut bytes = sample(1, 1, false).encode();
        bytes[8] = 1;
        assert!(ShipTexture::decode(&bytes).unwrap().inversion);
        bytes[8] = 0;
        assert!(!ShipTexture::decode(&bytes).unwrap().inversion);
        // Out-of-range values log a mismatch and fall back to false.
        bytes[8] = 7;
        assert!(!ShipTexture::decode(&bytes).unwrap().inversion);
    }

    #[test]
    fn truncated_pixels_are_fatal() {
        let bytes = sample(4, 4, false).encode();
        assert!(ShipTexture::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn meta_parses_wire_names() {
        let meta = TextureMeta::from_json(
            br#"{"diffuse_color": [0.1, 0.2, 0.3, 1.0], "opacity": [0.9, 0.5]}"#,
        )
        .unwrap();
        assert_eq!(meta.diffuse_color[2], 0.3);
        assert_eq!(meta.opacity, [0.9, 0.5]);
    }
}
