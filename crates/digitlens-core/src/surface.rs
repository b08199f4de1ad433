use crate::{PipelineError, PipelineResult};

pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];
pub const OPAQUE_BLACK: Rgba = [0, 0, 0, 255];

/// Row-major RGBA8 pixel buffer standing in for a host drawing surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaSurface {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RgbaSurface {
    /// Allocates a fully transparent surface.
    pub fn new(width: usize, height: usize) -> PipelineResult<Self> {
        let len = byte_len(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; len],
        })
    }

    pub fn from_rgba(width: usize, height: usize, pixels: Vec<u8>) -> PipelineResult<Self> {
        let len = byte_len(width, height)?;
        if pixels.len() != len {
            return Err(PipelineError::SurfaceUnavailable(format!(
                "{width}x{height} surface needs {len} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Changes the surface size and resets every pixel to transparent,
    /// the way assigning a canvas width/height does.
    pub fn resize(&mut self, width: usize, height: usize) -> PipelineResult<()> {
        let len = byte_len(width, height)?;
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(len, 0);
        Ok(())
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgba {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: usize, y: usize, rgba: Rgba) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }

    pub fn fill(&mut self, rgba: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Fills the intersection of the rectangle with the surface.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, rgba: Rgba) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                self.put_pixel(px, py, rgba);
            }
        }
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} surface",
            self.width,
            self.height
        );
        (y * self.width + x) * 4
    }
}

fn byte_len(width: usize, height: usize) -> PipelineResult<usize> {
    if width == 0 || height == 0 {
        return Err(PipelineError::SurfaceUnavailable(format!(
            "cannot create a {width}x{height} surface"
        )));
    }
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            PipelineError::SurfaceUnavailable(format!("{width}x{height} surface is too large"))
        })
}
