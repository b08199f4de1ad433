use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use digitlens_core::RgbaSurface;
use digitlens_runtime::visualize::{render_grid, FeatureGrid, GridItem};
use digitlens_runtime::PredictionResult;
use tracing::{info, warn};

/// Renders every collected layer as a channel grid and writes one PAM image
/// per rendered channel to `<dir>/<layer>/ch<NNN>.pam`.
pub fn write_layer_grids(
    dir: &Path,
    result: &PredictionResult,
    max_channels: usize,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut grid = FeatureGrid::new();

    for (layer, tensor) in &result.activations {
        if let Err(err) = render_grid(tensor, &mut grid, max_channels) {
            warn!(layer = %layer, error = %err, "skipping layer");
            continue;
        }

        let layer_dir = dir.join(layer);
        fs::create_dir_all(&layer_dir)
            .with_context(|| format!("failed to create {}", layer_dir.display()))?;

        for item in grid.items() {
            match item {
                GridItem::Channel { index, surface, .. } => {
                    let path = layer_dir.join(format!("ch{index:03}.pam"));
                    write_pam(&path, surface)?;
                    written.push(path);
                }
                GridItem::Overflow { label, .. } => {
                    info!(layer = %layer, "{label} not written");
                }
            }
        }
    }
    Ok(written)
}

/// Netpbm PAM with an RGB_ALPHA tuple type.
pub fn write_pam(path: &Path, surface: &RgbaSurface) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write!(
        out,
        "P7\nWIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
        surface.width(),
        surface.height()
    )?;
    out.write_all(surface.pixels())?;
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pam_header_then_pixels() -> Result<()> {
        let mut surface = RgbaSurface::new(2, 1)?;
        surface.put_pixel(1, 0, [9, 8, 7, 255]);
        let path = std::env::temp_dir().join(format!("digitlens-{}.pam", std::process::id()));

        write_pam(&path, &surface)?;
        let bytes = fs::read(&path)?;
        fs::remove_file(&path)?;

        let header = "P7\nWIDTH 2\nHEIGHT 1\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n";
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(&bytes[header.len()..], &[0, 0, 0, 0, 9, 8, 7, 255]);
        Ok(())
    }
}
