//! Frame composition
//!
//! Turns resolved per-pixel state into an RGBA8 [`Frame`]. Pixels that no
//! point reached, or whose accumulator has zero weight, receive the
//! background color.

use std::path::Path;

use image::RgbaImage;

use crate::projector::{AccumulationCell, DepthCell};
use crate::{AtomicBufferU64, ComputeError, Dispatcher};

/// Row-major RGBA8 image with a top-left origin
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Frame filled with an opaque color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (0..width as usize * height as usize)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Self { width, height, pixels }
    }

    /// Wrap tightly packed RGBA8 bytes
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ComputeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ComputeError::InvalidConfig(format!(
                "frame of {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA of pixel `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// RGB of pixel `(x, y)`
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let [r, g, b, _] = self.pixel(x, y);
        [r, g, b]
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Write the frame as PNG
    pub fn save_png(&self, path: &Path) -> Result<(), ComputeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(cloudproj_core::CloudError::from)?;
        }
        image::save_buffer(path, &self.pixels, self.width, self.height, image::ColorType::Rgba8)?;
        log::info!("Saved {}x{} frame to {}", self.width, self.height, path.display());
        Ok(())
    }
}

/// Resolves projector buffers into frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCompositor {
    pub background: [u8; 3],
}

impl FrameCompositor {
    pub fn new(background: [u8; 3]) -> Self {
        Self { background }
    }

    /// Background from a normalized `[0, 1]` RGB triple
    pub fn from_unit_color(color: [f32; 3]) -> Self {
        Self::new(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    }

    fn assemble(&self, width: u32, height: u32, colors: Vec<Option<[u8; 3]>>) -> Frame {
        let pixels = colors
            .into_iter()
            .flat_map(|c| {
                let [r, g, b] = c.unwrap_or(self.background);
                [r, g, b, 255]
            })
            .collect();
        Frame { width, height, pixels }
    }

    /// Standard path: look up the winning slot of every pixel
    pub fn compose_depth<F>(
        &self,
        dispatcher: &Dispatcher,
        cells: &AtomicBufferU64,
        width: u32,
        height: u32,
        color_of_slot: F,
    ) -> Frame
    where
        F: Fn(u32) -> Option<[u8; 3]> + Send + Sync,
    {
        let colors = dispatcher.map(cells.len(), |i| {
            DepthCell::decode(cells.load(i)).and_then(|(_, slot)| color_of_slot(slot))
        });
        self.assemble(width, height, colors)
    }

    /// High-quality path: average the accumulated colors
    pub fn compose_accumulation(
        &self,
        dispatcher: &Dispatcher,
        accum_a: &AtomicBufferU64,
        accum_b: &AtomicBufferU64,
        width: u32,
        height: u32,
    ) -> Frame {
        let colors = dispatcher.map(accum_a.len(), |i| {
            AccumulationCell::resolve(accum_a.load(i), accum_b.load(i))
        });
        self.assemble(width, height, colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame() {
        let frame = Frame::filled(3, 2, [1, 2, 3]);
        assert_eq!(frame.as_bytes().len(), 24);
        assert_eq!(frame.pixel(2, 1), [1, 2, 3, 255]);
    }

    #[test]
    fn test_from_rgba_checks_size() {
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Frame::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_unit_background() {
        let compositor = FrameCompositor::from_unit_color([0.4, 0.4, 0.4]);
        assert_eq!(compositor.background, [102, 102, 102]);
    }

    #[test]
    fn test_compose_depth_uses_background_for_misses() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let cells = AtomicBufferU64::from_slice(&[DepthCell::encode(0.5, 7), DepthCell::EMPTY]);
        let frame = FrameCompositor::new([9, 9, 9]).compose_depth(&dispatcher, &cells, 2, 1, |slot| {
            (slot == 7).then_some([200, 0, 0])
        });
        assert_eq!(frame.rgb(0, 0), [200, 0, 0]);
        assert_eq!(frame.rgb(1, 0), [9, 9, 9]);
    }

    #[test]
    fn test_compose_accumulation_zero_weight() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let (a, b) = AccumulationCell::encode([10, 20, 30]);
        let accum_a = AtomicBufferU64::from_slice(&[a, 0]);
        let accum_b = AtomicBufferU64::from_slice(&[b, 0]);
        let frame = FrameCompositor::new([5, 6, 7]).compose_accumulation(&dispatcher, &accum_a, &accum_b, 2, 1);
        assert_eq!(frame.rgb(0, 0), [10, 20, 30]);
        assert_eq!(frame.rgb(1, 0), [5, 6, 7]);
    }

    #[test]
    fn test_png_round_trip() {
        let path = std::env::temp_dir().join(format!("cloudproj_frame_{}.png", std::process::id()));
        let frame = Frame::filled(4, 3, [10, 200, 30]);
        frame.save_png(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(3, 2).0, [10, 200, 30, 255]);
        std::fs::remove_file(&path).ok();
    }
}
