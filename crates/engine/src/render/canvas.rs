use crate::geom::{Delta, Orientation, Pos, Rect};

use super::LoadedImage;

/// Borrowed RGBA8 frame with clipped drawing helpers.
pub struct Canvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.frame[..]
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        (offset + 4 <= self.frame.len()).then_some(offset)
    }

    pub fn write_pixel_clipped(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if let Some(offset) = self.offset(x, y) {
            self.frame[offset..offset + 4].copy_from_slice(&color);
        }
    }

    /// Mixes `color` over the existing pixel using its alpha scaled by `alpha`.
    pub fn blend_pixel_clipped(&mut self, x: i32, y: i32, color: [u8; 4], alpha: f32) {
        let Some(offset) = self.offset(x, y) else {
            return;
        };
        let a = (color[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        if a >= 1.0 {
            self.frame[offset..offset + 3].copy_from_slice(&color[..3]);
            self.frame[offset + 3] = 255;
            return;
        }
        for channel in 0..3 {
            let dst = self.frame[offset + channel] as f32;
            let src = color[channel] as f32;
            self.frame[offset + channel] = (src * a + dst * (1.0 - a)).round() as u8;
        }
        self.frame[offset + 3] = 255;
    }

    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let end = rect.opposite_corner();
        let left = rect.origin.x.max(0);
        let top = rect.origin.y.max(0);
        let right = end.x.min(self.width as i32 - 1);
        let bottom = end.y.min(self.height as i32 - 1);
        for y in top..=bottom {
            for x in left..=right {
                self.blend_pixel_clipped(x, y, color, 1.0);
            }
        }
    }

    pub fn draw_rect_outline(&mut self, rect: Rect, color: [u8; 4]) {
        let end = rect.opposite_corner();
        for x in rect.origin.x..=end.x {
            self.write_pixel_clipped(x, rect.origin.y, color);
            self.write_pixel_clipped(x, end.y, color);
        }
        for y in rect.origin.y..=end.y {
            self.write_pixel_clipped(rect.origin.x, y, color);
            self.write_pixel_clipped(end.x, y, color);
        }
    }

    /// Draws `image` transformed by `orientation`, centered on `center2`
    /// (doubled screen coordinates).
    pub fn blit_oriented(
        &mut self,
        image: &LoadedImage,
        center2: Pos,
        orientation: Orientation,
        alpha: f32,
    ) {
        if image.width == 0 || image.height == 0 {
            return;
        }
        if image.rgba.len() < image.width as usize * image.height as usize * 4 {
            return;
        }
        let src_size = Delta::new(image.width as i32, image.height as i32);
        let dst_size = orientation.apply(src_size).abs();
        let origin = Pos::new(
            center2.x - dst_size.dx + 1,
            center2.y - dst_size.dy + 1,
        )
        .div_floor(2);
        let inverse = orientation.inverse();

        for dy in 0..dst_size.dy {
            for dx in 0..dst_size.dx {
                // Work in doubled coordinates around the center so mirrored
                // and rotated pixels land exactly.
                let offset2 = Delta::new(2 * dx - (dst_size.dx - 1), 2 * dy - (dst_size.dy - 1));
                let src2 = inverse.apply(offset2);
                let sx = (src2.dx + src_size.dx - 1) / 2;
                let sy = (src2.dy + src_size.dy - 1) / 2;
                let src = (sy as usize * image.width as usize + sx as usize) * 4;
                let color = [
                    image.rgba[src],
                    image.rgba[src + 1],
                    image.rgba[src + 2],
                    image.rgba[src + 3],
                ];
                self.blend_pixel_clipped(origin.x + dx, origin.y + dy, color, alpha);
            }
        }
    }
}
