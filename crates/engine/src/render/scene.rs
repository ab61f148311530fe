use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use image::ImageReader;
use tracing::warn;

use crate::geom::{Delta, Pos, Rect};
use crate::image_refs::validate_image_ref;
use crate::level::TILE_SIZE;
use crate::world::{Contents, World};

use super::{Canvas, LoadedImage};

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];
const TILE_FALLBACK_SOLID_COLOR: [u8; 4] = [92, 96, 112, 255];
const TILE_FALLBACK_OPEN_COLOR: [u8; 4] = [22, 24, 32, 255];

/// Draws the loaded part of a [`World`] as seen from its scroll position.
pub struct SceneRenderer {
    image_root: PathBuf,
    image_cache: HashMap<String, Option<LoadedImage>>,
    warned_missing_images: HashSet<String>,
}

impl SceneRenderer {
    pub fn new(image_root: PathBuf) -> Self {
        Self {
            image_root,
            image_cache: HashMap::new(),
            warned_missing_images: HashSet::new(),
        }
    }

    /// Loads and caches the image once. Failures are cached too and warned
    /// about only the first time.
    pub fn image(&mut self, key: &str) -> Option<&LoadedImage> {
        if !self.image_cache.contains_key(key) {
            let loaded = match resolve_image_path(&self.image_root, key)
                .and_then(|path| load_image_rgba(&path).map_err(|reason| (Some(path), reason)))
            {
                Ok(image) => Some(image),
                Err((path, reason)) => {
                    warn_image_load_once(
                        &mut self.warned_missing_images,
                        key,
                        path.as_deref(),
                        &reason,
                    );
                    None
                }
            };
            self.image_cache.insert(key.to_string(), loaded);
        }
        self.image_cache.get(key).and_then(Option::as_ref)
    }

    pub fn cached_image_count(&self) -> usize {
        self.image_cache.values().filter(|image| image.is_some()).count()
    }

    /// Top-left world pixel shown at screen (0, 0).
    pub fn screen_origin(world: &World, canvas: &Canvas<'_>) -> Pos {
        world.scroll_pos() - Delta::new(canvas.width() as i32 / 2, canvas.height() as i32 / 2)
    }

    pub fn render(&mut self, world: &World, canvas: &mut Canvas<'_>) {
        canvas.clear(CLEAR_COLOR);
        let origin = Self::screen_origin(world, canvas);

        let mut tiles: Vec<_> = world.tiles().collect();
        tiles.sort_by_key(|(pos, _)| *pos);
        for (pos, tile) in tiles {
            let rect = Rect::new(
                Pos::new(pos.x * TILE_SIZE, pos.y * TILE_SIZE) - origin.as_delta(),
                Delta::new(TILE_SIZE, TILE_SIZE),
            );
            let drawn = match tile.image.as_deref() {
                Some(key) => match self.image(key) {
                    Some(image) => {
                        canvas.blit_oriented(image, rect.center2(), tile.orientation, 1.0);
                        true
                    }
                    None => false,
                },
                None => false,
            };
            if !drawn {
                let color = if tile.contents.intersects(Contents::SOLID) {
                    TILE_FALLBACK_SOLID_COLOR
                } else {
                    TILE_FALLBACK_OPEN_COLOR
                };
                canvas.fill_rect(rect, color);
            }
        }

        let mut entities: Vec<_> = world.entities().collect();
        entities.sort_by_key(|entity| (entity.z_index, entity.id));
        for entity in &entities {
            let rect = entity.rect();
            let screen = Rect::new(rect.origin - origin.as_delta(), rect.size);
            let drawn = match entity.image.as_deref() {
                Some(key) => match self.image(key) {
                    Some(image) => {
                        canvas.blit_oriented(
                            image,
                            screen.center2(),
                            entity.orientation,
                            entity.alpha,
                        );
                        true
                    }
                    None => false,
                },
                None => false,
            };
            if !drawn && entity.fallback_rgba[3] > 0 {
                let [r, g, b, a] = entity.fallback_rgba;
                let alpha = (a as f32 * entity.alpha.clamp(0.0, 1.0)).round() as u8;
                canvas.fill_rect(screen, [r, g, b, alpha]);
            }
        }

        for entity in &entities {
            if let Some(behavior) = world.behavior(entity.id) {
                behavior.draw_overlay(world, entity.id, canvas);
            }
        }
    }
}

fn resolve_image_path(
    image_root: &Path,
    key: &str,
) -> Result<PathBuf, (Option<PathBuf>, String)> {
    validate_image_ref(key).map_err(|error| (None, format!("invalid_key:{error}")))?;
    Ok(image_root.join(key))
}

fn load_image_rgba(path: &Path) -> Result<LoadedImage, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn warn_image_load_once(
    warned_keys: &mut HashSet<String>,
    key: &str,
    resolved_path: Option<&Path>,
    reason: &str,
) {
    if !warned_keys.insert(key.to_string()) {
        return;
    }
    let path_display = resolved_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unresolved>".to_string());
    warn!(
        image = key,
        path = %path_display,
        reason,
        "renderer_image_load_failed_using_fallback"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::test_support::{grid_level, probe_registry};
    use crate::world::WorldConfig;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    #[test]
    fn image_cache_loads_once_and_remembers_failures() {
        let temp = TempDir::new().expect("temp");
        let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2, 3, Rgba([10, 20, 30, 255]));
        buffer.save(temp.path().join("box.png")).expect("write png");

        let mut renderer = SceneRenderer::new(temp.path().to_path_buf());
        let image = renderer.image("box.png").expect("loads");
        assert_eq!((image.width, image.height), (2, 3));
        assert!(renderer.image("missing.png").is_none());
        assert!(renderer.image("../escape.png").is_none());
        assert_eq!(renderer.cached_image_count(), 1);
        assert_eq!(renderer.warned_missing_images.len(), 2);

        assert!(renderer.image("missing.png").is_none());
        assert_eq!(renderer.warned_missing_images.len(), 2);
    }

    #[test]
    fn render_uses_fallback_colors_without_images() {
        let level = grid_level(
            &["#####", "#...#", "#####"],
            r#"<object id="1" type="Player" x="20" y="20" width="8" height="8"/>"#,
        );
        let (registry, _) = probe_registry(&["Player"]);
        let config = WorldConfig {
            screen_width: 64,
            screen_height: 48,
            ..WorldConfig::default()
        };
        let world = World::new(level, registry, config).expect("world");
        let temp = TempDir::new().expect("temp");
        let mut renderer = SceneRenderer::new(temp.path().to_path_buf());
        let mut frame = vec![0u8; 64 * 48 * 4];
        let mut canvas = Canvas::new(&mut frame, 64, 48);

        renderer.render(&world, &mut canvas);

        // The player's center (23, 23) sits in the middle of the 64x48 screen.
        let origin = SceneRenderer::screen_origin(&world, &canvas);
        assert_eq!(origin, Pos::new(-9, -1));
        let red_at = |x: usize, y: usize| canvas.pixels()[(y * 64 + x) * 4];
        // Open floor tile (1, 1) covers screen (25..41, 17..33), the wall
        // tile (1, 0) above it covers screen (25..41, 1..17).
        assert_eq!(red_at(30, 20), TILE_FALLBACK_OPEN_COLOR[0]);
        assert_eq!(red_at(30, 5), TILE_FALLBACK_SOLID_COLOR[0]);
    }
}
