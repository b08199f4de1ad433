//! Canvas to model-input conversion.

use digitlens_core::{PipelineResult, Rgba, RgbaSurface, Tensor, OPAQUE_BLACK};

/// Side length of the square model input.
pub const INPUT_SIZE: usize = 28;
pub const INPUT_DIMS: [usize; 4] = [1, 1, INPUT_SIZE, INPUT_SIZE];

/// Shrinks `source` to 28x28 and maps its red channel to `[0, 1]`.
///
/// Strokes are achromatic, so red carries the full intensity. The result is
/// shaped `[1, 1, 28, 28]`.
pub fn preprocess(source: &RgbaSurface) -> PipelineResult<Tensor> {
    let scaled = resample_nearest(source, INPUT_SIZE, INPUT_SIZE)?;
    let data = scaled
        .pixels()
        .chunks_exact(4)
        .map(|px| f32::from(px[0]) / 255.0)
        .collect();
    Tensor::new(&INPUT_DIMS, data)
}

/// Draws `source` onto a fresh opaque-black surface of the given size with
/// nearest-neighbor sampling. No smoothing is applied so stroke edges stay
/// hard.
pub fn resample_nearest(
    source: &RgbaSurface,
    width: usize,
    height: usize,
) -> PipelineResult<RgbaSurface> {
    let mut target = RgbaSurface::new(width, height)?;
    target.fill(OPAQUE_BLACK);

    for dy in 0..height {
        let sy = nearest_index(dy, height, source.height());
        for dx in 0..width {
            let sx = nearest_index(dx, width, source.width());
            target.put_pixel(dx, dy, over_black(source.pixel(sx, sy)));
        }
    }
    Ok(target)
}

// floor((dst_index + 0.5) * src_len / dst_len), sampling at pixel centers
fn nearest_index(dst_index: usize, dst_len: usize, src_len: usize) -> usize {
    ((2 * dst_index + 1) * src_len / (2 * dst_len)).min(src_len - 1)
}

fn over_black([r, g, b, a]: Rgba) -> Rgba {
    let a = u32::from(a);
    let blend = |c: u8| ((u32::from(c) * a + 127) / 255) as u8;
    [blend(r), blend(g), blend(b), 255]
}
