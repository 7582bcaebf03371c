//! Raw e-paper frames in the EPBM format the client streams to its panel.
//!
//! Layout: `"EPBM"` magic, width (u16 BE), height (u16 BE), then one palette
//! index byte per pixel in row-major order.

use crate::utils::error::{FrameError, Result};

pub const EPBM_MAGIC: &[u8; 4] = b"EPBM";
pub const EPBM_HEADER_LEN: usize = 8;

/// Six-colour panel palette, values as the firmware expects them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpdColor {
    Black = 0,
    White = 1,
    Green = 2,
    Blue = 3,
    Red = 4,
    Yellow = 5,
}

impl EpdColor {
    pub const ALL: [EpdColor; 6] = [
        EpdColor::Black,
        EpdColor::White,
        EpdColor::Green,
        EpdColor::Blue,
        EpdColor::Red,
        EpdColor::Yellow,
    ];

    /// sRGB used for quantisation and previews. Matches the SVG named
    /// colours so flat fills map without dithering noise.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            EpdColor::Black => [0, 0, 0],
            EpdColor::White => [255, 255, 255],
            EpdColor::Green => [0, 128, 0],
            EpdColor::Blue => [0, 0, 255],
            EpdColor::Red => [255, 0, 0],
            EpdColor::Yellow => [255, 255, 0],
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpdBitmap {
    width: u16,
    height: u16,
    data: Vec<u8>,
}

impl EpdBitmap {
    pub fn new(width: u16, height: u16) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            data: vec![EpdColor::White as u8; size],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u16, y: u16, color: EpdColor) {
        if x < self.width && y < self.height {
            let index = y as usize * self.width as usize + x as usize;
            self.data[index] = color as u8;
        }
    }

    pub fn get_pixel(&self, x: u16, y: u16) -> Option<EpdColor> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        EpdColor::from_u8(self.data[index])
    }

    pub fn encoded_len(&self) -> usize {
        EPBM_HEADER_LEN + self.data.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(EPBM_MAGIC);
        bytes.extend_from_slice(&self.width.to_be_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EPBM_HEADER_LEN {
            return Err(FrameError::DecodeError {
                message: format!("header needs {} bytes, got {}", EPBM_HEADER_LEN, bytes.len()),
            });
        }
        if &bytes[..4] != EPBM_MAGIC {
            return Err(FrameError::DecodeError {
                message: "missing EPBM magic".to_string(),
            });
        }

        let width = u16::from_be_bytes([bytes[4], bytes[5]]);
        let height = u16::from_be_bytes([bytes[6], bytes[7]]);
        let data = &bytes[EPBM_HEADER_LEN..];
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::DecodeError {
                message: format!(
                    "{}x{} frame needs {} pixel bytes, got {}",
                    width,
                    height,
                    expected,
                    data.len()
                ),
            });
        }
        if let Some(pos) = data.iter().position(|&b| EpdColor::from_u8(b).is_none()) {
            return Err(FrameError::DecodeError {
                message: format!("unknown colour index {} at pixel {}", data[pos], pos),
            });
        }

        Ok(Self {
            width,
            height,
            data: data.to_vec(),
        })
    }
}

/// Colour bars across the top half and a white bottom half. Served whenever
/// a real frame cannot be produced so the device still gets a valid image.
pub fn generate_test_bitmap(width: u16, height: u16) -> EpdBitmap {
    let mut bitmap = EpdBitmap::new(width, height);
    let bar_width = width / 6;

    for (i, &color) in EpdColor::ALL.iter().enumerate() {
        let x1 = i as u16 * bar_width;
        let x2 = ((i + 1) as u16 * bar_width).min(width);
        for y in 0..height / 2 {
            for x in x1..x2 {
                bitmap.set_pixel(x, y, color);
            }
        }
    }

    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bitmap_is_white() {
        let bitmap = EpdBitmap::new(4, 3);
        assert_eq!(bitmap.pixels().len(), 12);
        assert!(bitmap.pixels().iter().all(|&p| p == EpdColor::White as u8));
    }

    #[test]
    fn test_set_pixel_ignores_out_of_bounds() {
        let mut bitmap = EpdBitmap::new(2, 2);
        bitmap.set_pixel(1, 1, EpdColor::Red);
        bitmap.set_pixel(2, 0, EpdColor::Black);
        bitmap.set_pixel(0, 5, EpdColor::Black);

        assert_eq!(bitmap.get_pixel(1, 1), Some(EpdColor::Red));
        assert_eq!(bitmap.get_pixel(2, 0), None);
        assert_eq!(bitmap.pixels().iter().filter(|&&p| p == 0).count(), 0);
    }

    #[test]
    fn test_to_bytes_header_layout() {
        let bitmap = EpdBitmap::new(800, 480);
        let bytes = bitmap.to_bytes();

        assert_eq!(&bytes[..4], b"EPBM");
        assert_eq!(&bytes[4..6], &[0x03, 0x20]);
        assert_eq!(&bytes[6..8], &[0x01, 0xE0]);
        assert_eq!(bytes.len(), 8 + 800 * 480);
    }

    #[test]
    fn test_from_bytes_rejects_corrupt_frames() {
        let mut bytes = EpdBitmap::new(3, 2).to_bytes();

        assert!(EpdBitmap::from_bytes(&bytes[..5]).is_err());
        assert!(EpdBitmap::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(EpdBitmap::from_bytes(&bad_magic).is_err());

        bytes[EPBM_HEADER_LEN + 2] = 9;
        let err = EpdBitmap::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown colour index 9"));
    }

    #[test]
    fn test_test_pattern_bars() {
        let bitmap = generate_test_bitmap(600, 100);

        for (i, color) in EpdColor::ALL.iter().enumerate() {
            let x = i as u16 * 100 + 50;
            assert_eq!(bitmap.get_pixel(x, 10), Some(*color));
        }
        assert_eq!(bitmap.get_pixel(50, 75), Some(EpdColor::White));

        let decoded = EpdBitmap::from_bytes(&bitmap.to_bytes()).unwrap();
        assert_eq!(decoded, bitmap);
    }
}
