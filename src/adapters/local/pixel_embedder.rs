//! Local image embedder: a downscaled RGB thumbnail used as the vector.

use crate::domain::errors::CapabilityError;
use crate::ports::capabilities::ImageEmbedder;
use async_trait::async_trait;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

const GRID: u32 = 8;
pub const DIMENSION: usize = (GRID * GRID * 3) as usize;

/// Embeds frames as an L2-normalized `GRID`x`GRID` RGB thumbnail.
///
/// Decoding runs on the blocking pool, one frame at a time per process.
#[derive(Clone)]
pub struct PixelEmbedder {
    gate: Arc<Semaphore>,
}

impl PixelEmbedder {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(1)),
        }
    }
}

impl Default for PixelEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn embed_file(frame: &Path) -> Result<Vec<f32>, CapabilityError> {
    let img = image::open(frame).map_err(|e| match e {
        image::ImageError::IoError(io) => CapabilityError::io(frame, io),
        other => CapabilityError::Processing(format!("{}: {}", frame.display(), other)),
    })?;
    let thumb = img.resize_exact(GRID, GRID, FilterType::Triangle).to_rgb8();

    let mut vector: Vec<f32> = thumb.pixels().flat_map(|p| p.0).map(|c| c as f32 / 255.0).collect();
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    Ok(vector)
}

#[async_trait]
impl ImageEmbedder for PixelEmbedder {
    async fn embed_image(&self, frame: &Path) -> Result<Vec<f32>, CapabilityError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CapabilityError::Unavailable(e.to_string()))?;
        let frame: PathBuf = frame.to_path_buf();
        tokio::task::spawn_blocking(move || embed_file(&frame))
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("embedding task: {}", e)))?
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}
