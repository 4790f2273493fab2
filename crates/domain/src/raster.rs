//! Canvas clipping and transparency trimming for rendered layer rasters.
//!
//! Every function takes the raster by value and hands back the very same
//! buffer when no crop is needed, so the common "already fits" path never
//! copies pixels.

use image::{imageops, RgbaImage};

use crate::{RasterError, Rect};

/// A raster together with its top-left position on the document canvas.
#[derive(Debug, Clone)]
pub struct Placed {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

impl Placed {
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            i64::from(self.image.width()),
            i64::from(self.image.height()),
        )
    }
}

/// Tight bounding box of the pixels whose alpha is above zero. Coordinates
/// are inclusive and relative to the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransparencyBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub found_opaque: bool,
}

impl TransparencyBounds {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// True when the box already spans the whole `width` x `height` image.
    pub fn is_tight(&self, width: u32, height: u32) -> bool {
        self.min_x == 0
            && self.min_y == 0
            && self.max_x + 1 >= width
            && self.max_y + 1 >= height
    }
}

/// Intersects the raster placed at (`layer_x`, `layer_y`) with the canvas
/// `[0, canvas_width) x [0, canvas_height)`.
pub fn clip_to_canvas(
    image: RgbaImage,
    layer_x: i64,
    layer_y: i64,
    canvas_width: u32,
    canvas_height: u32,
) -> Result<Placed, RasterError> {
    let placement = Rect::new(
        layer_x,
        layer_y,
        i64::from(image.width()),
        i64::from(image.height()),
    );
    let canvas = Rect::new(0, 0, i64::from(canvas_width), i64::from(canvas_height));
    let visible = placement
        .intersect(&canvas)
        .ok_or(RasterError::OutsideCanvas)?;

    if visible == placement {
        return Ok(Placed {
            image,
            x: layer_x,
            y: layer_y,
        });
    }

    let crop_x = (visible.x - layer_x) as u32;
    let crop_y = (visible.y - layer_y) as u32;
    let cropped = imageops::crop_imm(
        &image,
        crop_x,
        crop_y,
        visible.width as u32,
        visible.height as u32,
    )
    .to_image();

    Ok(Placed {
        image: cropped,
        x: visible.x,
        y: visible.y,
    })
}

/// Single full pass over every pixel. When nothing is opaque the box is left
/// at its inverted starting values and `found_opaque` is false.
pub fn analyze_transparency(image: &RgbaImage) -> TransparencyBounds {
    let mut bounds = TransparencyBounds {
        min_x: image.width(),
        min_y: image.height(),
        max_x: 0,
        max_y: 0,
        found_opaque: false,
    };

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds.found_opaque = true;
        bounds.min_x = bounds.min_x.min(x);
        bounds.min_y = bounds.min_y.min(y);
        bounds.max_x = bounds.max_x.max(x);
        bounds.max_y = bounds.max_y.max(y);
    }

    bounds
}

/// Crops to `bounds` when the box is strictly smaller than the image. A tight
/// box, or one with no opaque pixels, returns the buffer untouched.
pub fn trim(image: RgbaImage, bounds: &TransparencyBounds) -> RgbaImage {
    if !bounds.found_opaque || bounds.is_tight(image.width(), image.height()) {
        return image;
    }
    imageops::crop_imm(
        &image,
        bounds.min_x,
        bounds.min_y,
        bounds.width(),
        bounds.height(),
    )
    .to_image()
}

/// Trims a placed raster and shifts its canvas offset by the crop origin.
pub fn trim_placed(placed: Placed, bounds: &TransparencyBounds) -> Placed {
    let width = placed.image.width();
    let height = placed.image.height();
    if !bounds.found_opaque || bounds.is_tight(width, height) {
        return placed;
    }
    Placed {
        image: trim(placed.image, bounds),
        x: placed.x + i64::from(bounds.min_x),
        y: placed.y + i64::from(bounds.min_y),
    }
}

/// Crops the canvas-space rectangle `rect` out of a full-canvas image. Parts
/// of the rectangle outside the image are dropped; `None` when nothing is left.
pub fn crop_rect(image: &RgbaImage, rect: &Rect) -> Option<RgbaImage> {
    let canvas = Rect::new(0, 0, i64::from(image.width()), i64::from(image.height()));
    let visible = rect.intersect(&canvas)?;
    Some(
        imageops::crop_imm(
            image,
            visible.x as u32,
            visible.y as u32,
            visible.width as u32,
            visible.height as u32,
        )
        .to_image(),
    )
}
