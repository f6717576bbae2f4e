//! Pipeline diagnostics: timing, record counts, and reconstruction
//! quality.
//!
//! Every call to [`compress_with_diagnostics`](crate::compress_with_diagnostics)
//! collects per-stage diagnostics alongside the report. Timestamps come
//! from an injected [`Clock`] so tests can run without wall-clock time.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::RgbImage;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: ingest and truncation.
    pub ingest: StageDiagnostics,
    /// Stage 2: color transform.
    pub color_transform: StageDiagnostics,
    /// Stage 3: blocking.
    pub blocking: StageDiagnostics,
    /// Stage 4: block transform round trip.
    pub transform: StageDiagnostics,
    /// Stage 5: block reassembly.
    pub block_reassembly: StageDiagnostics,
    /// Stage 6: channel reassembly.
    pub channel_reassembly: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Records consumed.
    pub records_in: usize,
    /// Records produced.
    pub records_out: usize,
    /// Records that failed.
    pub failures: usize,
}

/// High-level summary counts for the entire run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Images handed to the pipeline.
    pub images_in: usize,
    /// Images reconstructed.
    pub images_out: usize,
    /// Images that failed at any stage.
    pub failed_images: usize,
    /// Blocks transformed.
    pub block_count: usize,
    /// Partition count used for the run.
    pub partitions: usize,
}

impl PipelineDiagnostics {
    /// Stages in pipeline order with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Ingest", &self.ingest),
            ("Color Transform", &self.color_transform),
            ("Blocking", &self.blocking),
            ("Block Transform", &self.transform),
            ("Block Reassembly", &self.block_reassembly),
            ("Channel Reassembly", &self.channel_reassembly),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Images: {} in, {} out, {} failed  |  {} blocks over {} partitions",
            self.summary.images_in,
            self.summary.images_out,
            self.summary.failed_images,
            self.summary.block_count,
            self.summary.partitions,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Records"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let mut details = format!("{} -> {}", diag.records_in, diag.records_out);
            if diag.failures > 0 {
                details.push_str(&format!(" ({} failed)", diag.failures));
            }
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// How closely a reconstruction matches its source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageQuality {
    /// Mean squared error over all samples.
    pub mse: f64,
    /// Peak signal-to-noise ratio in dB; `None` for identical images.
    pub psnr: Option<f64>,
    /// Largest absolute difference of any sample.
    pub max_deviation: u8,
}

impl ImageQuality {
    /// Compare `reconstructed` against the top-left region of `original`
    /// with the same size.
    ///
    /// The pipeline output is the block-aligned crop of its input, so
    /// the original may be larger. Returns `None` if the reconstruction
    /// is larger than the original in either direction or is empty.
    #[must_use]
    pub fn measure(original: &RgbImage, reconstructed: &RgbImage) -> Option<Self> {
        let (width, height) = reconstructed.dimensions();
        if width == 0 || height == 0 || width > original.width() || height > original.height() {
            return None;
        }

        let mut sum_sq = 0.0f64;
        let mut max_deviation = 0u8;
        for (x, y, px) in reconstructed.enumerate_pixels() {
            let source = original.get_pixel(x, y);
            for (a, b) in source.0.iter().zip(px.0.iter()) {
                let diff = a.abs_diff(*b);
                max_deviation = max_deviation.max(diff);
                sum_sq += f64::from(diff) * f64::from(diff);
            }
        }

        let samples = f64::from(width) * f64::from(height) * 3.0;
        let mse = sum_sq / samples;
        let psnr = (mse > 0.0).then(|| 10.0 * (255.0f64 * 255.0 / mse).log10());
        Some(Self {
            mse,
            psnr,
            max_deviation,
        })
    }
}
