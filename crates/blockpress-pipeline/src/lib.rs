//! blockpress-pipeline: Block transform image compression (sans-IO).
//!
//! Runs a batch of images through a lossy JPEG-style round trip on an
//! in-process partitioned dataset:
//! truncate -> Y/Cr/Cb split -> 8x8 blocks -> DCT + quantization ->
//! inverse DCT -> blocks merged into planes -> planes merged into RGB.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! images and returns structured data. Reading and writing files lives
//! in the `blockpress` binary.

pub mod blocks;
pub mod color;
pub mod dataflow;
pub mod dct;
pub mod diagnostics;
pub mod ingest;
pub mod pipeline;
pub mod quantize;
pub mod reassemble;
pub mod resample;
pub mod transform;
pub mod types;

pub use dataflow::Dataset;
pub use diagnostics::{Clock, ImageQuality, PipelineDiagnostics, StdClock};
pub use pipeline::{compress, compress_with_diagnostics};
pub use resample::ResampleFilter;
pub use types::{
    ChannelIndex, ChromaSubsampling, CompressionReport, Dimensions, ImageId, PipelineConfig,
    PipelineError, Quality, Quantization, RecordFailure, Stage,
};
