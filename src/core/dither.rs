use crate::core::bitmap::{EpdBitmap, EpdColor};

/// Nearest palette entry by squared RGB distance.
pub fn quantize(rgb: [f32; 3]) -> EpdColor {
    let mut best = EpdColor::White;
    let mut best_distance = f32::MAX;

    for color in EpdColor::ALL {
        let [r, g, b] = color.rgb();
        let dr = rgb[0] - r as f32;
        let dg = rgb[1] - g as f32;
        let db = rgb[2] - b as f32;
        let distance = dr * dr + dg * dg + db * db;
        if distance < best_distance {
            best_distance = distance;
            best = color;
        }
    }

    best
}

/// Floyd–Steinberg error diffusion of an RGB(A) buffer onto the panel
/// palette. `channels` is 3 or 4; alpha is ignored.
pub fn dither(pixels: &[u8], channels: usize, width: u16, height: u16) -> EpdBitmap {
    let w = width as usize;
    let h = height as usize;
    let mut bitmap = EpdBitmap::new(width, height);

    let mut buffer: Vec<[f32; 3]> = pixels
        .chunks_exact(channels)
        .take(w * h)
        .map(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
        .collect();
    if buffer.len() < w * h {
        buffer.resize(w * h, [255.0; 3]);
    }

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let old = buffer[idx].map(|c| c.clamp(0.0, 255.0));
            let color = quantize(old);
            bitmap.set_pixel(x as u16, y as u16, color);

            let new = color.rgb();
            let error = [
                old[0] - new[0] as f32,
                old[1] - new[1] as f32,
                old[2] - new[2] as f32,
            ];

            let mut spread = |nx: usize, ny: usize, factor: f32| {
                let n = &mut buffer[ny * w + nx];
                for c in 0..3 {
                    n[c] += error[c] * factor;
                }
            };

            if x + 1 < w {
                spread(x + 1, y, 7.0 / 16.0);
            }
            if y + 1 < h {
                if x > 0 {
                    spread(x - 1, y + 1, 3.0 / 16.0);
                }
                spread(x, y + 1, 5.0 / 16.0);
                if x + 1 < w {
                    spread(x + 1, y + 1, 1.0 / 16.0);
                }
            }
        }
    }

    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rgb: [u8; 3], width: u16, height: u16) -> Vec<u8> {
        let mut pixels = Vec::new();
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        pixels
    }

    #[test]
    fn test_quantize_exact_palette_colours() {
        for color in EpdColor::ALL {
            let [r, g, b] = color.rgb();
            assert_eq!(quantize([r as f32, g as f32, b as f32]), color);
        }
    }

    #[test]
    fn test_quantize_near_colours() {
        assert_eq!(quantize([20.0, 10.0, 15.0]), EpdColor::Black);
        assert_eq!(quantize([240.0, 250.0, 235.0]), EpdColor::White);
        assert_eq!(quantize([230.0, 30.0, 20.0]), EpdColor::Red);
        assert_eq!(quantize([250.0, 240.0, 40.0]), EpdColor::Yellow);
    }

    #[test]
    fn test_flat_palette_fill_survives_dithering() {
        for color in EpdColor::ALL {
            let bitmap = dither(&solid(color.rgb(), 8, 8), 4, 8, 8);
            assert!(bitmap.pixels().iter().all(|&p| p == color as u8), "{:?}", color);
        }
    }

    #[test]
    fn test_half_red_mixes_black_and_red() {
        let bitmap = dither(&solid([128, 0, 0], 32, 32), 4, 32, 32);
        let black = bitmap.pixels().iter().filter(|&&p| p == EpdColor::Black as u8).count();
        let red = bitmap.pixels().iter().filter(|&&p| p == EpdColor::Red as u8).count();

        assert_eq!(black + red, 32 * 32);
        assert!(black > 300 && black < 724, "black = {}", black);
        assert!(red > 300 && red < 724, "red = {}", red);
    }

    #[test]
    fn test_short_buffer_pads_with_white() {
        let bitmap = dither(&[0, 0, 0], 3, 2, 1);
        assert_eq!(bitmap.get_pixel(0, 0), Some(EpdColor::Black));
        assert_eq!(bitmap.get_pixel(1, 0), Some(EpdColor::White));
    }
}
