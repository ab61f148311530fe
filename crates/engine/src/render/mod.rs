mod canvas;
mod fog;
mod raster;
mod scene;

pub use canvas::Canvas;
pub use fog::{FogCompositor, FogConfig};
pub use scene::SceneRenderer;

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}
