//! Image crop/resize/convert helpers shared by the engines

use anyhow::Result;
use image::{imageops, DynamicImage, ImageBuffer, Rgb, RgbImage};

use super::math::rotate_point;

/// Axis-aligned pixel rectangle. Coordinates may be negative or exceed the
/// frame before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Full-frame rectangle
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Scale the rectangle about its center into a square of side
    /// `max(w, h) * factor`
    pub fn expand_to_square(&self, factor: f32) -> Self {
        let cx = self.x + self.w / 2;
        let cy = self.y + self.h / 2;
        let side = (self.w.max(self.h) as f32 * factor) as i32;
        Self::new(cx - side / 2, cy - side / 2, side, side)
    }

    /// Intersect with a `width` x `height` frame
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let x = self.x.max(0);
        let y = self.y.max(0);
        let w = (self.x + self.w).min(width as i32) - x;
        let h = (self.y + self.h).min(height as i32) - y;
        Self::new(x, y, w.max(0), h.max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Rectangle with a rotation around its center, in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub rotation: f32,
}

/// Aspect-ratio handling for [`crop_resize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Resize the crop to the destination size, ignoring aspect ratio
    Stretch,
    /// Shrink the crop (centered) to the destination aspect, cutting edges
    Cut,
    /// Fit the crop inside the destination, padding with black (letterbox)
    Expand,
}

/// Scale and offset bookkeeping for mapping letterboxed coordinates back to
/// the cropped source region
#[derive(Debug, Clone, Copy)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl LetterboxInfo {
    pub fn new(source: (u32, u32), target: (u32, u32)) -> Self {
        let (src_w, src_h) = source;
        let (dst_w, dst_h) = target;
        let scale = f32::min(dst_w as f32 / src_w as f32, dst_h as f32 / src_h as f32);
        let new_w = (src_w as f32 * scale) as u32;
        let new_h = (src_h as f32 * scale) as u32;
        Self {
            scale,
            offset_x: (dst_w - new_w) / 2,
            offset_y: (dst_h - new_h) / 2,
            source_width: src_w,
            source_height: src_h,
        }
    }

    /// Map letterboxed coordinates back to the source region
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x as f32) / self.scale,
            (y - self.offset_y as f32) / self.scale,
        )
    }
}

/// Crop `crop` out of `src` and bring it to `dst_w` x `dst_h` according to
/// `mode`. The crop rectangle is clamped to the frame first.
pub fn crop_resize(
    src: &RgbImage,
    crop: Rect,
    dst_w: u32,
    dst_h: u32,
    mode: CropMode,
) -> Result<RgbImage> {
    let crop = crop.clamped(src.width(), src.height());
    if crop.is_empty() {
        anyhow::bail!("empty crop region after clamping to {}x{}", src.width(), src.height());
    }

    let crop = match mode {
        CropMode::Stretch | CropMode::Expand => crop,
        CropMode::Cut => cut_to_aspect(crop, dst_w, dst_h),
    };

    let region = imageops::crop_imm(src, crop.x as u32, crop.y as u32, crop.w as u32, crop.h as u32)
        .to_image();

    let out = match mode {
        CropMode::Stretch | CropMode::Cut => {
            imageops::resize(&region, dst_w, dst_h, imageops::FilterType::Triangle)
        }
        CropMode::Expand => {
            let info = LetterboxInfo::new((crop.w as u32, crop.h as u32), (dst_w, dst_h));
            let new_w = ((crop.w as f32 * info.scale) as u32).max(1);
            let new_h = ((crop.h as f32 * info.scale) as u32).max(1);
            let resized = imageops::resize(&region, new_w, new_h, imageops::FilterType::Triangle);
            let mut canvas = ImageBuffer::from_pixel(dst_w, dst_h, Rgb([0u8, 0, 0]));
            imageops::overlay(&mut canvas, &resized, info.offset_x as i64, info.offset_y as i64);
            canvas
        }
    };
    Ok(out)
}

/// Center the crop on the same spot but trim it to the destination aspect
fn cut_to_aspect(crop: Rect, dst_w: u32, dst_h: u32) -> Rect {
    let crop_aspect = crop.w as f32 / crop.h as f32;
    let dst_aspect = dst_w as f32 / dst_h as f32;
    if crop_aspect > dst_aspect {
        let new_w = ((crop.h as f32 * dst_aspect) as i32).max(1);
        Rect::new(crop.x + (crop.w - new_w) / 2, crop.y, new_w, crop.h)
    } else {
        let new_h = ((crop.w as f32 / dst_aspect) as i32).max(1);
        Rect::new(crop.x, crop.y + (crop.h - new_h) / 2, crop.w, new_h)
    }
}

/// Extract a rotated rectangle from `src` with bilinear sampling. Pixels
/// falling outside the frame come out black.
pub fn rotate_crop(src: &RgbImage, rect: &RotatedRect) -> RgbImage {
    let out_w = rect.w.round().max(1.0) as u32;
    let out_h = rect.h.round().max(1.0) as u32;
    let mut output = ImageBuffer::from_pixel(out_w, out_h, Rgb([0u8, 0, 0]));

    for y in 0..out_h {
        for x in 0..out_w {
            // output pixel relative to the rect center, rotated into the frame
            let ux = x as f32 - rect.w / 2.0 + 0.5;
            let uy = y as f32 - rect.h / 2.0 + 0.5;
            let (sx, sy) = rotate_point(ux, uy, 0.0, 0.0, rect.rotation);
            let src_x = rect.cx + sx - 0.5;
            let src_y = rect.cy + sy - 0.5;

            if src_x >= 0.0
                && src_x < (src.width() - 1) as f32
                && src_y >= 0.0
                && src_y < (src.height() - 1) as f32
            {
                output.put_pixel(x, y, sample_bilinear(src, src_x, src_y));
            }
        }
    }

    output
}

fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x as u32;
    let y0 = y as u32;
    let x1 = x0 + 1;
    let y1 = y0 + 1;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0, y0);
    let p01 = src.get_pixel(x0, y1);
    let p10 = src.get_pixel(x1, y0);
    let p11 = src.get_pixel(x1, y1);

    let mut pixel = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        pixel[c] = v.clamp(0.0, 255.0) as u8;
    }
    Rgb(pixel)
}

/// Decode image from bytes with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)?;
    Ok(apply_exif_orientation(data, image))
}

/// Apply EXIF orientation to correct image rotation. Phones often store the
/// orientation tag instead of rotating pixels.
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1) as u8,
        Err(_) => 1,
    };

    match orientation {
        1 => image,
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Encode image to PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        ImageBuffer::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn test_rect_clamped() {
        let r = Rect::new(-10, -10, 50, 50).clamped(30, 40);
        assert_eq!(r, Rect::new(0, 0, 30, 40));

        let r = Rect::new(20, 20, 50, 50).clamped(30, 40);
        assert_eq!(r, Rect::new(20, 20, 10, 20));
    }

    #[test]
    fn test_rect_expand_to_square() {
        let r = Rect::new(10, 20, 10, 20).expand_to_square(2.0);
        assert_eq!(r.w, 40);
        assert_eq!(r.h, 40);
        // still centered on (15, 30)
        assert_eq!(r.x + r.w / 2, 15);
        assert_eq!(r.y + r.h / 2, 30);
    }

    #[test]
    fn test_crop_resize_stretch_dims() {
        let src = gradient_image(100, 50);
        let out = crop_resize(&src, Rect::full(100, 50), 64, 64, CropMode::Stretch).unwrap();
        assert_eq!(out.dimensions(), (64, 64));
    }

    #[test]
    fn test_crop_resize_cut_trims_wide_sides() {
        // 100x50 source cut to a square keeps the middle 50x50 columns
        let src = gradient_image(100, 50);
        let out = crop_resize(&src, Rect::full(100, 50), 50, 50, CropMode::Cut).unwrap();
        assert_eq!(out.dimensions(), (50, 50));
        // left column of the output comes from x=25 in the source
        let got = out.get_pixel(0, 0)[0] as i32;
        let expected = src.get_pixel(25, 0)[0] as i32;
        assert!((got - expected).abs() <= 1);
    }

    #[test]
    fn test_crop_resize_expand_letterboxes() {
        // 100x50 source expanded into a square pads top and bottom
        let src = ImageBuffer::from_pixel(100, 50, Rgb([200u8, 0, 0]));
        let out = crop_resize(&src, Rect::full(100, 50), 100, 100, CropMode::Expand).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        // padding rows are black, content rows keep the source color
        assert_eq!(*out.get_pixel(50, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(50, 99), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(50, 50), Rgb([200, 0, 0]));
    }

    #[test]
    fn test_crop_resize_empty_region_fails() {
        let src = gradient_image(10, 10);
        assert!(crop_resize(&src, Rect::new(20, 20, 5, 5), 8, 8, CropMode::Stretch).is_err());
    }

    #[test]
    fn test_letterbox_round_trip() {
        let info = LetterboxInfo::new((200, 100), (256, 256));
        // source center ends up at the letterbox center
        let cx = info.offset_x as f32 + 100.0 * info.scale;
        let (sx, _sy) = info.to_source(cx, 128.0);
        assert!((sx - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_rotate_crop_zero_rotation_matches_plain_crop() {
        let src = gradient_image(64, 64);
        let rect = RotatedRect {
            cx: 32.0,
            cy: 32.0,
            w: 16.0,
            h: 16.0,
            rotation: 0.0,
        };
        let out = rotate_crop(&src, &rect);
        assert_eq!(out.dimensions(), (16, 16));
        // center pixel of the crop is the center of the source
        let center = out.get_pixel(8, 8);
        let expected = src.get_pixel(32, 32);
        assert!((center[0] as i32 - expected[0] as i32).abs() <= 1);
        assert!((center[1] as i32 - expected[1] as i32).abs() <= 1);
    }
}
