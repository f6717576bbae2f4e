//! Shared types for the blockpress compression pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resample::ResampleFilter;

/// Re-export `DynamicImage` so callers can hand images to the pipeline
/// without depending on `image` directly.
pub use image::DynamicImage;

/// Re-export `RgbImage`, the pipeline's output pixel matrix.
pub use image::RgbImage;

/// Re-export `GrayImage` for restored 8-bit channel planes.
pub use image::GrayImage;

/// A single-channel floating point intensity plane.
///
/// Planes carry luma/chroma values in `[0, 255]` before the block
/// transform and values shifted by -128 afterwards; nothing clamps them
/// until final reassembly.
pub type Plane = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Unique identifier of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    /// Create an identifier from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ImageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One of the three planes an image is split into.
///
/// The numeric order is the interleaving order of the internal
/// Y/Cr/Cb representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelIndex {
    /// Channel 0: luma (Y).
    Luma,
    /// Channel 1: red-difference chroma (Cr).
    ChromaRed,
    /// Channel 2: blue-difference chroma (Cb).
    ChromaBlue,
}

impl ChannelIndex {
    /// All channels in index order.
    pub const ALL: [Self; 3] = [Self::Luma, Self::ChromaRed, Self::ChromaBlue];

    /// Position of this channel in an interleaved pixel.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Luma => 0,
            Self::ChromaRed => 1,
            Self::ChromaBlue => 2,
        }
    }

    /// Whether this channel uses the luma quantization table.
    #[must_use]
    pub const fn is_luma(self) -> bool {
        matches!(self, Self::Luma)
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Luma => f.write_str("Y"),
            Self::ChromaRed => f.write_str("Cr"),
            Self::ChromaBlue => f.write_str("Cb"),
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// JPEG quality factor in `1..=100`.
///
/// Higher values select smaller quantization steps. Quality 100 yields
/// a step size of 1 for every coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    /// Lowest accepted quality.
    pub const MIN: Self = Self(1);
    /// Highest accepted quality.
    pub const MAX: Self = Self(100);
    /// Default quality.
    pub const DEFAULT: Self = Self(99);

    /// Validate a raw quality factor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NumericDomain`] if `value` is outside
    /// `1..=100`.
    pub const fn new(value: u8) -> Result<Self, PipelineError> {
        if value >= Self::MIN.0 && value <= Self::MAX.0 {
            Ok(Self(value))
        } else {
            Err(PipelineError::NumericDomain { quality: value })
        }
    }

    /// The raw quality factor.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Quality {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// How DCT coefficients are quantized in the block transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    /// Standard luma/chroma tables scaled by a quality factor.
    Standard(Quality),
    /// The same step size for every coefficient of every channel.
    Uniform(u16),
    /// Skip quantization entirely; the transform round trip is lossless
    /// up to floating point error.
    Disabled,
}

impl Default for Quantization {
    fn default() -> Self {
        Self::Standard(Quality::DEFAULT)
    }
}

/// Chroma plane resolution relative to luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    /// Full-resolution chroma (4:4:4).
    #[default]
    None,
    /// Chroma halved in both axes (4:2:0).
    Half,
}

impl ChromaSubsampling {
    /// Factor by which chroma planes are smaller than the image.
    #[must_use]
    pub const fn factor(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Half => 2,
        }
    }
}

/// Configuration for the compression pipeline.
///
/// Every field has a default exposed as an associated constant so that
/// front ends can reuse them without drifting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length of the square transform blocks. The block transformer
    /// only supports [`crate::dct::BLOCK_SIZE`].
    pub block_size: u32,

    /// Coefficient quantization applied to every block.
    pub quantization: Quantization,

    /// Resolution of the two chroma planes.
    pub chroma_subsampling: ChromaSubsampling,

    /// Filter used to shrink chroma planes and to grow them back during
    /// channel reassembly.
    pub resample_filter: ResampleFilter,

    /// Number of partitions records are spread across.
    pub partitions: usize,

    /// Worker threads. `0` lets rayon pick one per core.
    pub threads: usize,
}

impl PipelineConfig {
    /// Default block side length.
    pub const DEFAULT_BLOCK_SIZE: u32 = 8;
    /// Default quantization.
    pub const DEFAULT_QUANTIZATION: Quantization = Quantization::Standard(Quality::DEFAULT);
    /// Default chroma subsampling.
    pub const DEFAULT_CHROMA_SUBSAMPLING: ChromaSubsampling = ChromaSubsampling::None;
    /// Default resample filter.
    pub const DEFAULT_RESAMPLE_FILTER: ResampleFilter = ResampleFilter::Triangle;
    /// Default partition count.
    pub const DEFAULT_PARTITIONS: usize = 16;
    /// Default worker thread count (automatic).
    pub const DEFAULT_THREADS: usize = 0;

    /// Check every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an unsupported block
    /// size, a zero uniform step, or zero partitions.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.block_size != crate::dct::BLOCK_SIZE {
            return Err(PipelineError::InvalidConfig(format!(
                "block size {} is not supported (only {})",
                self.block_size,
                crate::dct::BLOCK_SIZE,
            )));
        }
        if self.quantization == Quantization::Uniform(0) {
            return Err(PipelineError::InvalidConfig(
                "uniform quantization step must be at least 1".to_string(),
            ));
        }
        if self.partitions == 0 {
            return Err(PipelineError::InvalidConfig(
                "partition count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            quantization: Self::DEFAULT_QUANTIZATION,
            chroma_subsampling: Self::DEFAULT_CHROMA_SUBSAMPLING,
            resample_filter: Self::DEFAULT_RESAMPLE_FILTER,
            partitions: Self::DEFAULT_PARTITIONS,
            threads: Self::DEFAULT_THREADS,
        }
    }
}

/// Pipeline stage at which a record failed.
///
/// Variants are ordered as the stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Ingest and block-aligned truncation.
    Ingest,
    /// RGB to Y/Cr/Cb plane split.
    ColorTransform,
    /// Plane to block tiling.
    Blocking,
    /// Per-block DCT and quantization round trip.
    Transform,
    /// Blocks merged back into planes.
    BlockReassembly,
    /// Planes merged back into an RGB image.
    ChannelReassembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingest => "ingest",
            Self::ColorTransform => "color transform",
            Self::Blocking => "blocking",
            Self::Transform => "block transform",
            Self::BlockReassembly => "block reassembly",
            Self::ChannelReassembly => "channel reassembly",
        };
        f.write_str(name)
    }
}

/// A single image that could not be processed.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordFailure {
    /// The image that failed.
    pub image: ImageId,
    /// Where it failed.
    pub stage: Stage,
    /// Why it failed.
    pub error: PipelineError,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.image, self.stage, self.error)
    }
}

/// Result of compressing a collection of images.
///
/// Images that failed appear only in `failures`; every other input
/// appears exactly once in `images`.
#[derive(Debug, Default)]
pub struct CompressionReport {
    /// Reconstructed images, sorted by id.
    pub images: Vec<(ImageId, RgbImage)>,
    /// Per-image failures, sorted by id.
    pub failures: Vec<RecordFailure>,
}

impl CompressionReport {
    /// Returns `true` if no image failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Look up a reconstructed image by id.
    #[must_use]
    pub fn image(&self, id: &ImageId) -> Option<&RgbImage> {
        self.images
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, image)| image)
    }
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image does not have exactly three color channels.
    #[error("expected 3 color channels, found {channels}")]
    InvalidShape {
        /// Number of channels the image actually has.
        channels: u8,
    },

    /// A plane is not a whole number of blocks in some direction.
    #[error("plane of {rows}x{cols} is not divisible into {block_size}x{block_size} blocks")]
    UnalignedDimension {
        /// Plane row count.
        rows: u32,
        /// Plane column count.
        cols: u32,
        /// Block side length.
        block_size: u32,
    },

    /// Truncating to block alignment leaves no pixels.
    #[error("image of {width}x{height} is smaller than one {alignment}x{alignment} block")]
    ImageTooSmall {
        /// Source width.
        width: u32,
        /// Source height.
        height: u32,
        /// Required alignment.
        alignment: u32,
    },

    /// Final reassembly received fewer than three channels.
    #[error("expected 3 channels at reassembly, found {present}")]
    MissingChannel {
        /// Number of channels that arrived.
        present: usize,
    },

    /// Two records claimed the same channel of one image.
    #[error("channel {channel} was reassembled twice")]
    DuplicateChannel {
        /// The repeated channel.
        channel: ChannelIndex,
    },

    /// Another image in the same batch already uses this id.
    #[error("image id {id} appears more than once in the batch")]
    DuplicateImage {
        /// The repeated id.
        id: ImageId,
    },

    /// The quality factor is outside `1..=100`.
    #[error("quality factor {quality} is outside 1..=100")]
    NumericDomain {
        /// The rejected quality factor.
        quality: u8,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread pool could not be started.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidShape { channels: u8 },
    UnalignedDimension { rows: u32, cols: u32, block_size: u32 },
    ImageTooSmall { width: u32, height: u32, alignment: u32 },
    MissingChannel { present: usize },
    DuplicateChannel { channel: ChannelIndex },
    DuplicateImage { id: ImageId },
    NumericDomain { quality: u8 },
    InvalidConfig(String),
    ThreadPool(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidShape { channels } => PipelineErrorProxy::InvalidShape {
                channels: *channels,
            },
            Self::UnalignedDimension {
                rows,
                cols,
                block_size,
            } => PipelineErrorProxy::UnalignedDimension {
                rows: *rows,
                cols: *cols,
                block_size: *block_size,
            },
            Self::ImageTooSmall {
                width,
                height,
                alignment,
            } => PipelineErrorProxy::ImageTooSmall {
                width: *width,
                height: *height,
                alignment: *alignment,
            },
            Self::MissingChannel { present } => {
                PipelineErrorProxy::MissingChannel { present: *present }
            }
            Self::DuplicateChannel { channel } => {
                PipelineErrorProxy::DuplicateChannel { channel: *channel }
            }
            Self::DuplicateImage { id } => PipelineErrorProxy::DuplicateImage { id: id.clone() },
            Self::NumericDomain { quality } => {
                PipelineErrorProxy::NumericDomain { quality: *quality }
            }
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::ThreadPool(s) => PipelineErrorProxy::ThreadPool(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The original image::ImageError cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidShape { channels } => Self::InvalidShape { channels },
            PipelineErrorProxy::UnalignedDimension {
                rows,
                cols,
                block_size,
            } => Self::UnalignedDimension {
                rows,
                cols,
                block_size,
            },
            PipelineErrorProxy::ImageTooSmall {
                width,
                height,
                alignment,
            } => Self::ImageTooSmall {
                width,
                height,
                alignment,
            },
            PipelineErrorProxy::MissingChannel { present } => Self::MissingChannel { present },
            PipelineErrorProxy::DuplicateChannel { channel } => Self::DuplicateChannel { channel },
            PipelineErrorProxy::DuplicateImage { id } => Self::DuplicateImage { id },
            PipelineErrorProxy::NumericDomain { quality } => Self::NumericDomain { quality },
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::ThreadPool(s) => Self::ThreadPool(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- ImageId tests ---

    #[test]
    fn image_id_display_matches_source() {
        let id = ImageId::from("cat.png");
        assert_eq!(id.to_string(), "cat.png");
        assert_eq!(id.as_str(), "cat.png");
    }

    #[test]
    fn image_ids_order_lexicographically() {
        let mut ids = vec![ImageId::new("b"), ImageId::new("a"), ImageId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![ImageId::new("a"), ImageId::new("b"), ImageId::new("c")]);
    }

    // --- ChannelIndex tests ---

    #[test]
    fn channel_indices_are_dense() {
        for (i, channel) in ChannelIndex::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }

    #[test]
    fn only_channel_zero_is_luma() {
        assert!(ChannelIndex::Luma.is_luma());
        assert!(!ChannelIndex::ChromaRed.is_luma());
        assert!(!ChannelIndex::ChromaBlue.is_luma());
    }

    // --- Quality tests ---

    #[test]
    fn quality_accepts_bounds() {
        assert_eq!(Quality::new(1).unwrap().get(), 1);
        assert_eq!(Quality::new(100).unwrap().get(), 100);
    }

    #[test]
    fn quality_rejects_zero_and_above_hundred() {
        assert!(matches!(
            Quality::new(0),
            Err(PipelineError::NumericDomain { quality: 0 })
        ));
        assert!(matches!(
            Quality::new(101),
            Err(PipelineError::NumericDomain { quality: 101 })
        ));
    }

    #[test]
    fn quality_deserialize_validates() {
        let ok: Quality = serde_json::from_str("75").unwrap();
        assert_eq!(ok.get(), 75);
        assert!(serde_json::from_str::<Quality>("0").is_err());
        assert!(serde_json::from_str::<Quality>("150").is_err());
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.block_size, 8);
        assert_eq!(
            config.quantization,
            Quantization::Standard(Quality::new(99).unwrap())
        );
        assert_eq!(config.chroma_subsampling, ChromaSubsampling::None);
        assert_eq!(config.resample_filter, ResampleFilter::Triangle);
        assert_eq!(config.partitions, 16);
        assert_eq!(config.threads, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unsupported_block_size() {
        let config = PipelineConfig {
            block_size: 16,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_partitions() {
        let config = PipelineConfig {
            partitions: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_uniform_step() {
        let config = PipelineConfig {
            quantization: Quantization::Uniform(0),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            block_size: 8,
            quantization: Quantization::Uniform(12),
            chroma_subsampling: ChromaSubsampling::Half,
            resample_filter: ResampleFilter::Lanczos3,
            partitions: 4,
            threads: 2,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"partitions": 3}"#).unwrap();
        assert_eq!(config.partitions, 3);
        assert_eq!(config.quantization, PipelineConfig::DEFAULT_QUANTIZATION);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_invalid_shape_display() {
        let err = PipelineError::InvalidShape { channels: 4 };
        assert_eq!(err.to_string(), "expected 3 color channels, found 4");
    }

    #[test]
    fn error_unaligned_dimension_display() {
        let err = PipelineError::UnalignedDimension {
            rows: 10,
            cols: 16,
            block_size: 8,
        };
        assert_eq!(
            err.to_string(),
            "plane of 10x16 is not divisible into 8x8 blocks"
        );
    }

    #[test]
    fn error_missing_channel_display() {
        let err = PipelineError::MissingChannel { present: 2 };
        assert_eq!(err.to_string(), "expected 3 channels at reassembly, found 2");
    }

    #[test]
    fn pipeline_error_serde_round_trip_duplicate_channel() {
        let err = PipelineError::DuplicateChannel {
            channel: ChannelIndex::ChromaBlue,
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            PipelineError::DuplicateChannel {
                channel: ChannelIndex::ChromaBlue
            }
        ));
    }

    #[test]
    fn pipeline_error_serde_round_trip_numeric_domain() {
        let err = PipelineError::NumericDomain { quality: 0 };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            PipelineError::NumericDomain { quality: 0 }
        ));
    }

    #[test]
    fn pipeline_error_serde_round_trip_duplicate_image() {
        let err = PipelineError::DuplicateImage {
            id: ImageId::new("cat.png"),
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(
            deserialized.to_string(),
            "image id cat.png appears more than once in the batch"
        );
    }

    #[test]
    fn record_failure_display_names_image_and_stage() {
        let failure = RecordFailure {
            image: ImageId::new("gray.png"),
            stage: Stage::ColorTransform,
            error: PipelineError::InvalidShape { channels: 1 },
        };
        assert_eq!(
            failure.to_string(),
            "gray.png failed during color transform: expected 3 color channels, found 1"
        );
    }

    #[test]
    fn report_lookup_by_id() {
        let report = CompressionReport {
            images: vec![(ImageId::new("a"), RgbImage::new(8, 8))],
            failures: vec![],
        };
        assert!(report.is_complete());
        assert!(report.image(&ImageId::new("a")).is_some());
        assert!(report.image(&ImageId::new("b")).is_none());
    }
}
