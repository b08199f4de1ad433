//! Turns activation tensors into images.
//!
//! Rank-4 feature maps `[batch, channels, height, width]` render one
//! grayscale image per channel at native resolution. Rank-2 feature vectors
//! `[batch, features]` render as a colored bar chart.

use digitlens_core::{PipelineError, PipelineResult, Rgba, RgbaSurface, Tensor};
use serde::Serialize;
use tracing::error;

pub const DEFAULT_MAX_CHANNELS: usize = 16;
/// Feature vectors wider than this are cut off, not resampled.
pub const MAX_BARS: usize = 256;
pub const BAR_CHART_HEIGHT: usize = 100;
pub const BAR_CHART_BACKGROUND: Rgba = [0x11, 0x11, 0x11, 255];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationShape {
    FeatureMap {
        channels: usize,
        height: usize,
        width: usize,
    },
    FeatureVector {
        length: usize,
    },
}

impl ActivationShape {
    pub fn of(tensor: &Tensor) -> Option<Self> {
        match *tensor.dims() {
            [_, channels, height, width] => Some(Self::FeatureMap {
                channels,
                height,
                width,
            }),
            [_, length] => Some(Self::FeatureVector { length }),
            _ => None,
        }
    }

    pub fn dimensions(self) -> Dimensions {
        match self {
            Self::FeatureMap {
                channels,
                height,
                width,
            } => Dimensions {
                width,
                height,
                channels,
            },
            Self::FeatureVector { length } => Dimensions {
                width: length,
                height: 1,
                channels: 1,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

/// Display dimensions of an activation. Unsupported ranks report all zeros.
pub fn dimensions_of(tensor: &Tensor) -> Dimensions {
    ActivationShape::of(tensor)
        .map(ActivationShape::dimensions)
        .unwrap_or_default()
}

/// Short size caption, e.g. `12×12 × 32 channels` or `128 features`.
pub fn dimensions_text(tensor: &Tensor) -> String {
    match ActivationShape::of(tensor) {
        Some(ActivationShape::FeatureMap {
            channels,
            height,
            width,
        }) => format!("{width}×{height} × {channels} channels"),
        Some(ActivationShape::FeatureVector { length }) => format!("{length} features"),
        None => String::new(),
    }
}

/// Draws one channel of `tensor` into `surface`.
///
/// Values are min-max scaled with the range clamped to at least 1, so a
/// channel whose values span less than 1 renders dim rather than stretched
/// to full black-to-white.
///
/// On error the surface is left exactly as it was.
pub fn render_channel(
    tensor: &Tensor,
    surface: &mut RgbaSurface,
    channel: usize,
) -> PipelineResult<()> {
    let result = match ActivationShape::of(tensor) {
        Some(ActivationShape::FeatureMap {
            channels,
            height,
            width,
        }) => render_feature_map(tensor, surface, channel, channels, height, width),
        Some(ActivationShape::FeatureVector { length }) => {
            render_bar_chart(tensor.data(), surface, length)
        }
        None => Err(PipelineError::UnsupportedRank(tensor.rank())),
    };
    if let Err(err) = &result {
        error!(error = %err, dims = ?tensor.dims(), channel, "cannot render activation");
    }
    result
}

fn render_feature_map(
    tensor: &Tensor,
    surface: &mut RgbaSurface,
    channel: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> PipelineResult<()> {
    if channel >= channels {
        return Err(PipelineError::InvalidChannelIndex {
            index: channel,
            channels,
        });
    }

    let plane = width * height;
    let offset = channel * plane;
    let values = tensor
        .data()
        .get(offset..offset + plane)
        .ok_or_else(|| PipelineError::UnexpectedShape {
            name: "activation".to_string(),
            dims: tensor.dims().to_vec(),
            expected: "a non-empty batch".to_string(),
        })?;

    surface.resize(width, height)?;
    let (min, range) = normalization(values);
    for (i, &v) in values.iter().enumerate() {
        let level = (((v - min) / range) * 255.0).floor() as u8;
        surface.put_pixel(i % width, i / width, [level, level, level, 255]);
    }
    Ok(())
}

fn render_bar_chart(values: &[f32], surface: &mut RgbaSurface, length: usize) -> PipelineResult<()> {
    let bars = length.min(MAX_BARS).min(values.len());
    surface.resize(bars, BAR_CHART_HEIGHT)?;
    surface.fill(BAR_CHART_BACKGROUND);

    let (min, range) = normalization(values);
    for (x, &v) in values.iter().take(bars).enumerate() {
        let norm = ((v - min) / range).clamp(0.0, 1.0);
        let bar = ((norm * BAR_CHART_HEIGHT as f32).round() as usize).min(BAR_CHART_HEIGHT);
        let color = hsl_to_rgba(240.0 * (1.0 - norm), 1.0, 0.5);
        surface.fill_rect(x, BAR_CHART_HEIGHT - bar, 1, bar, color);
    }
    Ok(())
}

// Minimum and divisor for min-max scaling. The divisor is at least 1 so a
// constant plane renders flat instead of dividing by zero. Planes whose
// spread is below 1 are therefore not stretched to full contrast.
fn normalization(values: &[f32]) -> (f32, f32) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    (min, (max - min).max(1.0))
}

fn hsl_to_rgba(hue: f32, saturation: f32, lightness: f32) -> Rgba {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = hue.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b), 255]
}

/// One tile of a feature grid.
#[derive(Clone, Debug, PartialEq)]
pub enum GridItem {
    Channel {
        index: usize,
        label: String,
        surface: RgbaSurface,
    },
    Overflow {
        omitted: usize,
        label: String,
    },
}

/// Ordered container of rendered channels.
#[derive(Clone, Debug, Default)]
pub struct FeatureGrid {
    items: Vec<GridItem>,
}

impl FeatureGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[GridItem] {
        &self.items
    }

    pub fn channels(&self) -> impl Iterator<Item = (usize, &RgbaSurface)> {
        self.items.iter().filter_map(|item| match item {
            GridItem::Channel { index, surface, .. } => Some((*index, surface)),
            GridItem::Overflow { .. } => None,
        })
    }

    pub fn omitted(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                GridItem::Overflow { omitted, .. } => *omitted,
                GridItem::Channel { .. } => 0,
            })
            .sum()
    }

    fn push(&mut self, item: GridItem) {
        self.items.push(item);
    }
}

/// Renders up to `max_channels` channels of `tensor` into `grid`, replacing
/// its contents. Channels past the limit are only counted in an overflow
/// notice; open them one at a time with [`render_channel`].
pub fn render_grid(
    tensor: &Tensor,
    grid: &mut FeatureGrid,
    max_channels: usize,
) -> PipelineResult<()> {
    grid.clear();

    let Dimensions {
        width,
        height,
        channels,
    } = dimensions_of(tensor);

    for index in 0..channels.min(max_channels) {
        let mut surface = RgbaSurface::new(width, height)?;
        render_channel(tensor, &mut surface, index)?;
        grid.push(GridItem::Channel {
            index,
            label: format!("Ch {index}"),
            surface,
        });
    }

    if channels > max_channels {
        let omitted = channels - max_channels;
        grid.push(GridItem::Overflow {
            omitted,
            label: format!("+{omitted} more channels"),
        });
    }
    Ok(())
}
