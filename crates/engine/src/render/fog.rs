use std::thread;

use tracing::warn;

use crate::geom::{Delta, Pos};

use super::raster::fill_triangle_fan;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogConfig {
    /// Dilation radius of the visibility mask, in pixels.
    pub expand_size: usize,
    /// Box blur radius applied to the dilated mask.
    pub blur_size: usize,
    /// Box blur radius applied to the hidden part of the previous frame.
    pub frame_blur_size: usize,
    /// Multiplier applied to the trail every frame.
    pub frame_darken_alpha: f32,
    /// Threads used for the row-parallel filter passes.
    pub workers: usize,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            expand_size: 6,
            blur_size: 6,
            frame_blur_size: 2,
            frame_darken_alpha: 0.98,
            workers: thread::available_parallelism().map_or(4, |n| n.get().min(8)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Max,
    Mean,
}

/// Combines the freshly rendered scene with what was seen before: visible
/// parts are shown as-is, the rest fades out from earlier frames.
pub struct FogCompositor {
    width: usize,
    height: usize,
    config: FogConfig,
    mask: Vec<f32>,
    mask_scratch: Vec<f32>,
    trail: Vec<f32>,
    trail_scratch: Vec<f32>,
    prev: Vec<f32>,
    warned_short_buffer: bool,
}

impl FogCompositor {
    pub fn new(width: usize, height: usize, config: FogConfig) -> Self {
        let pixels = width * height;
        Self {
            width,
            height,
            config,
            mask: vec![0.0; pixels],
            mask_scratch: vec![0.0; pixels],
            trail: vec![0.0; pixels * 3],
            trail_scratch: vec![0.0; pixels * 3],
            prev: vec![0.0; pixels * 3],
            warned_short_buffer: false,
        }
    }

    pub fn config(&self) -> &FogConfig {
        &self.config
    }

    /// Forgets all previous frames.
    pub fn reset(&mut self) {
        self.prev.fill(0.0);
    }

    /// Produces the displayed frame. `polygon` and `center` are in screen
    /// pixels; `scroll_delta` is how far the view moved since the last call.
    pub fn composite(
        &mut self,
        scene_rgba: &[u8],
        polygon: &[Pos],
        center: Pos,
        scroll_delta: Delta,
        out_rgba: &mut [u8],
    ) {
        let (w, h) = (self.width, self.height);
        let pixels = w * h;
        if scene_rgba.len() < pixels * 4 || out_rgba.len() < pixels * 4 {
            if !self.warned_short_buffer {
                self.warned_short_buffer = true;
                warn!(
                    width = w,
                    height = h,
                    scene_len = scene_rgba.len(),
                    out_len = out_rgba.len(),
                    "fog_frame_skipped_short_buffer"
                );
            }
            return;
        }
        let workers = self.config.workers.max(1);

        self.mask.fill(0.0);
        let points: Vec<(f32, f32)> = polygon
            .iter()
            .map(|p| (p.x as f32 + 0.5, p.y as f32 + 0.5))
            .collect();
        let center = (center.x as f32 + 0.5, center.y as f32 + 0.5);
        fill_triangle_fan(&mut self.mask, w, h, center, &points);

        for (filter, radius) in [
            (Filter::Max, self.config.expand_size),
            (Filter::Mean, self.config.blur_size),
        ] {
            for axis in [Axis::Horizontal, Axis::Vertical] {
                filter_pass(
                    &self.mask,
                    &mut self.mask_scratch,
                    (w, h, 1),
                    axis,
                    filter,
                    radius,
                    workers,
                );
                std::mem::swap(&mut self.mask, &mut self.mask_scratch);
            }
        }

        // Only what is hidden now may trail, masked before blurring.
        shift_into(&self.prev, &mut self.trail, w, h, scroll_delta);
        for (i, pixel) in self.trail.chunks_exact_mut(3).enumerate() {
            let hidden = 1.0 - self.mask[i].clamp(0.0, 1.0);
            pixel.iter_mut().for_each(|value| *value *= hidden);
        }
        for axis in [Axis::Horizontal, Axis::Vertical] {
            filter_pass(
                &self.trail,
                &mut self.trail_scratch,
                (w, h, 3),
                axis,
                Filter::Mean,
                self.config.frame_blur_size,
                workers,
            );
            std::mem::swap(&mut self.trail, &mut self.trail_scratch);
        }

        let darken = self.config.frame_darken_alpha;
        for i in 0..pixels {
            let visible = self.mask[i].clamp(0.0, 1.0);
            for c in 0..3 {
                let scene = scene_rgba[i * 4 + c] as f32;
                let trail = self.trail[i * 3 + c] * darken;
                let value = (scene * visible + trail).clamp(0.0, 255.0);
                self.prev[i * 3 + c] = value;
                out_rgba[i * 4 + c] = value.round() as u8;
            }
            out_rgba[i * 4 + 3] = 255;
        }
    }
}

/// Moves the previous frame so it stays aligned with the world after the
/// view scrolled by `delta`. Uncovered pixels become black.
fn shift_into(src: &[f32], dst: &mut [f32], width: usize, height: usize, delta: Delta) {
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let (sx, sy) = (x + delta.dx, y + delta.dy);
            let out = (y * w + x) as usize * 3;
            if sx < 0 || sy < 0 || sx >= w || sy >= h {
                dst[out..out + 3].fill(0.0);
            } else {
                let from = (sy * w + sx) as usize * 3;
                dst[out..out + 3].copy_from_slice(&src[from..from + 3]);
            }
        }
    }
}

/// One separable filter pass along `axis`. Output rows are split across
/// scoped worker threads; all of them finish before this returns.
fn filter_pass(
    src: &[f32],
    dst: &mut [f32],
    (width, height, channels): (usize, usize, usize),
    axis: Axis,
    filter: Filter,
    radius: usize,
    workers: usize,
) {
    let row_len = width * channels;
    if radius == 0 || row_len == 0 || height == 0 {
        dst.copy_from_slice(src);
        return;
    }
    let rows_per_chunk = height.div_ceil(workers.max(1));
    let radius = radius as isize;

    let process_row = |y: usize, out: &mut [f32]| {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = match filter {
                    Filter::Max => f32::MIN,
                    Filter::Mean => 0.0,
                };
                for k in -radius..=radius {
                    let (sx, sy) = match axis {
                        Axis::Horizontal => (x as isize + k, y as isize),
                        Axis::Vertical => (x as isize, y as isize + k),
                    };
                    let in_bounds =
                        sx >= 0 && sy >= 0 && sx < width as isize && sy < height as isize;
                    match filter {
                        Filter::Max => {
                            if in_bounds {
                                let index = (sy as usize * width + sx as usize) * channels + c;
                                acc = acc.max(src[index]);
                            }
                        }
                        Filter::Mean => {
                            // Clamp to the edge so the border does not darken.
                            let cx = sx.clamp(0, width as isize - 1) as usize;
                            let cy = sy.clamp(0, height as isize - 1) as usize;
                            acc += src[(cy * width + cx) * channels + c];
                        }
                    }
                }
                out[x * channels + c] = match filter {
                    Filter::Max => acc,
                    Filter::Mean => acc / (2 * radius + 1) as f32,
                };
            }
        }
    };

    if workers <= 1 {
        for (y, out) in dst.chunks_mut(row_len).enumerate() {
            process_row(y, out);
        }
        return;
    }
    let process_row = &process_row;
    thread::scope(|scope| {
        for (chunk_index, chunk) in dst.chunks_mut(rows_per_chunk * row_len).enumerate() {
            scope.spawn(move || {
                for (i, out) in chunk.chunks_mut(row_len).enumerate() {
                    process_row(chunk_index * rows_per_chunk + i, out);
                }
            });
        }
    });
}
