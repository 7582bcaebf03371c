use crate::core::bitmap::{EpdBitmap, EpdColor};
use crate::core::dither;
use crate::utils::error::{FrameError, Result};
use resvg::{tiny_skia, usvg};
use std::io::Cursor;
use std::sync::Arc;

/// Font database shared by every render. Loading system fonts is slow, so
/// it happens once at start-up.
#[derive(Clone)]
pub struct FontBook {
    db: Arc<usvg::fontdb::Database>,
}

impl FontBook {
    pub fn system() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!("Loaded {} font faces", db.len());
        Self { db: Arc::new(db) }
    }

    /// No fonts: text is dropped from the raster but shapes still render.
    pub fn empty() -> Self {
        Self {
            db: Arc::new(usvg::fontdb::Database::new()),
        }
    }

    pub fn face_count(&self) -> usize {
        self.db.len()
    }
}

impl Default for FontBook {
    fn default() -> Self {
        Self::system()
    }
}

/// Rasterises `svg` at `width`x`height` on white and dithers it onto the
/// panel palette.
pub fn render_svg_to_bitmap(svg: &str, width: u16, height: u16, fonts: &FontBook) -> Result<EpdBitmap> {
    let options = usvg::Options {
        fontdb: fonts.db.clone(),
        ..usvg::Options::default()
    };

    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| FrameError::RenderError {
        message: format!("SVG parse failed: {}", e),
    })?;

    let mut pixmap = tiny_skia::Pixmap::new(width as u32, height as u32).ok_or_else(|| {
        FrameError::RenderError {
            message: format!("cannot allocate {}x{} pixmap", width, height),
        }
    })?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // 背景不透明，premultiplied 與原值相同
    Ok(dither::dither(pixmap.data(), 4, width, height))
}

/// PNG preview of a dithered frame using the palette colours.
pub fn bitmap_to_png(bitmap: &EpdBitmap) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_fn(bitmap.width() as u32, bitmap.height() as u32, |x, y| {
        let color = bitmap
            .get_pixel(x as u16, y as u16)
            .unwrap_or(EpdColor::White);
        image::Rgb(color.rgb())
    });

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| FrameError::RenderError {
            message: format!("PNG encoding failed: {}", e),
        })?;
    Ok(bytes)
}
