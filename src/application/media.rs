//! Concurrent validation, transcoding and upload of report photos.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use image::{DynamicImage, ImageError, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType};
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::assets::{AssetJanitor, AssetStore, AssetStoreError};
use super::error::ErrorKind;

pub const DEFAULT_MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_EDGE_PX: u32 = 1800;
pub const DEFAULT_JPEG_QUALITY: u8 = 60;
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSettings {
    pub max_file_bytes: usize,
    pub max_edge_px: u32,
    pub jpeg_quality: u8,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_edge_px: DEFAULT_MAX_EDGE_PX,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub filename: String,
    pub data: Bytes,
}

impl MediaPart {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("`{filename}` is {size} bytes, limit is {limit}")]
    TooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },
    #[error("`{filename}` is empty")]
    Empty { filename: String },
    #[error("`{filename}` is not a JPEG or PNG image")]
    Unsupported { filename: String },
    #[error("failed to decode `{filename}`: {source}")]
    Decode {
        filename: String,
        source: ImageError,
    },
    #[error("failed to encode `{filename}`: {source}")]
    Encode {
        filename: String,
        source: ImageError,
    },
    #[error("failed to upload `{filename}`: {source}")]
    Upload {
        filename: String,
        source: AssetStoreError,
    },
    #[error("image task failed: {message}")]
    Task { message: String },
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::TooLarge { .. } | MediaError::Empty { .. } => ErrorKind::ValidationFailed,
            MediaError::Unsupported { .. } => ErrorKind::UnsupportedMedia,
            MediaError::Decode { .. }
            | MediaError::Encode { .. }
            | MediaError::Upload { .. }
            | MediaError::Task { .. } => ErrorKind::InternalFault,
        }
    }
}

/// A batch in which at least one file failed.
#[derive(Debug, Error)]
#[error("{failed} of {total} images failed, first: {first}")]
pub struct MediaBatchError {
    pub first: MediaError,
    pub failed: usize,
    pub total: usize,
    /// URLs that had uploaded before the batch was declared failed and were
    /// handed over for deletion.
    pub compensated: Vec<String>,
}

impl MediaBatchError {
    pub fn kind(&self) -> ErrorKind {
        self.first.kind()
    }
}

#[derive(Clone)]
pub struct MediaProcessor {
    store: Arc<dyn AssetStore>,
    janitor: AssetJanitor,
    settings: MediaSettings,
}

impl MediaProcessor {
    pub fn new(store: Arc<dyn AssetStore>, janitor: AssetJanitor, settings: MediaSettings) -> Self {
        Self {
            store,
            janitor,
            settings,
        }
    }

    pub fn settings(&self) -> MediaSettings {
        self.settings
    }

    pub fn janitor(&self) -> &AssetJanitor {
        &self.janitor
    }

    /// Processes every part on its own task and waits for all of them.
    ///
    /// A failing part does not cancel its siblings. They run to completion and
    /// anything they uploaded is handed to the janitor once the batch is known
    /// to have failed. The first failure drained from the set classifies the
    /// batch. URL order follows completion order, not input order.
    pub async fn process(&self, parts: Vec<MediaPart>) -> Result<Vec<String>, MediaBatchError> {
        let total = parts.len();
        let mut tasks = JoinSet::new();
        for part in parts {
            let store = self.store.clone();
            let settings = self.settings;
            tasks.spawn(async move { process_part(store.as_ref(), settings, part).await });
        }

        let mut uploaded = Vec::with_capacity(total);
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(url)) => uploaded.push(url),
                Ok(Err(err)) => failures.push(err),
                Err(err) => failures.push(MediaError::Task {
                    message: err.to_string(),
                }),
            }
        }

        let failed = failures.len();
        let mut failures = failures.into_iter();
        let Some(first) = failures.next() else {
            counter!("civic_reports_media_uploaded_total").increment(total as u64);
            debug!(target = "civic_reports::media", count = total, "images stored");
            return Ok(uploaded);
        };

        counter!("civic_reports_media_failed_total").increment(failed as u64);
        for other in failures {
            warn!(
                target = "civic_reports::media",
                error = %other,
                "additional image failure in batch"
            );
        }

        self.janitor.dispatch("media batch failed", uploaded.clone());
        Err(MediaBatchError {
            first,
            failed,
            total,
            compensated: uploaded,
        })
    }
}

async fn process_part(
    store: &dyn AssetStore,
    settings: MediaSettings,
    part: MediaPart,
) -> Result<String, MediaError> {
    let MediaPart { filename, data } = part;

    check_size(&filename, data.len(), settings.max_file_bytes)?;
    let format = sniff(&data).ok_or_else(|| MediaError::Unsupported {
        filename: filename.clone(),
    })?;

    let encoded = {
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || transcode(&filename, &data, format, settings))
            .await
            .map_err(|err| MediaError::Task {
                message: err.to_string(),
            })??
    };

    let name = asset_name(SystemTime::now());
    store
        .upload(&name, encoded, JPEG_CONTENT_TYPE)
        .await
        .map_err(|source| MediaError::Upload { filename, source })
}

fn check_size(filename: &str, size: usize, limit: usize) -> Result<(), MediaError> {
    if size == 0 {
        return Err(MediaError::Empty {
            filename: filename.to_string(),
        });
    }
    if size > limit {
        return Err(MediaError::TooLarge {
            filename: filename.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Identifies JPEG and PNG payloads by their signature.
pub fn sniff(data: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(data) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Some(format),
        _ => None,
    }
}

/// Decodes, shrinks and re-encodes an image as JPEG.
pub fn transcode(
    filename: &str,
    data: &[u8],
    format: ImageFormat,
    settings: MediaSettings,
) -> Result<Bytes, MediaError> {
    let image = image::load_from_memory_with_format(data, format).map_err(|source| {
        MediaError::Decode {
            filename: filename.to_string(),
            source,
        }
    })?;

    let image = fit_within(image, settings.max_edge_px);
    let rgb = image.to_rgb8();

    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, settings.jpeg_quality);
    encoder
        .encode_image(&rgb)
        .map_err(|source| MediaError::Encode {
            filename: filename.to_string(),
            source,
        })?;

    Ok(Bytes::from(encoded))
}

fn fit_within(image: DynamicImage, max_edge: u32) -> DynamicImage {
    match target_dimensions(image.width(), image.height(), max_edge) {
        Some((width, height)) => image.resize_exact(width, height, FilterType::Lanczos3),
        None => image,
    }
}

/// Size after clamping the long edge to `max_edge`, or `None` when the image
/// already fits. Landscape and square images clamp the width, portrait ones
/// the height.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    let (long, short) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };
    if long <= max_edge {
        return None;
    }

    let scaled_short =
        ((u64::from(short) * u64::from(max_edge) + u64::from(long) / 2) / u64::from(long)).max(1);
    let scaled_short = scaled_short as u32;

    if width >= height {
        Some((max_edge, scaled_short))
    } else {
        Some((scaled_short, max_edge))
    }
}

/// Object name: base64 of the big-endian seconds and nanoseconds of `now`,
/// a four digit random suffix and the `.jpg` extension. Always 25 characters.
pub fn asset_name(now: SystemTime) -> String {
    let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let mut stamp = [0u8; 12];
    stamp[..8].copy_from_slice(&elapsed.as_secs().to_be_bytes());
    stamp[8..].copy_from_slice(&elapsed.subsec_nanos().to_be_bytes());
    let suffix: u16 = rand::random_range(0..10_000);
    format!("{}-{suffix:04}.jpg", URL_SAFE_NO_PAD.encode(stamp))
}
