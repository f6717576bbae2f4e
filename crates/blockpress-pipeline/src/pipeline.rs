//! The compression job: six keyed stages over a [`Dataset`].
//!
//! ```text
//! (id, image)
//!   -> truncate                 (id, image)
//!   -> color transform          ((id, dims), (channel, plane))   x3
//!   -> blocking                 ((id, channel), block)            xN
//!   -> block transform          ((id, channel, dims), block)
//!   -> reduce by key            ((id, channel, dims), plane)
//!   -> channel reassembly       (id, rgb image)
//! ```
//!
//! A record that fails is turned into a [`RecordFailure`] and dropped
//! from the dataset; every other image carries on.

use std::collections::HashMap;

use crate::blocks::{self, Block, TransformedBlock};
use crate::color;
use crate::dataflow::Dataset;
use crate::diagnostics::{
    Clock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StdClock, duration_ms,
};
use crate::ingest;
use crate::reassemble::{BlockPartial, ChannelPartial, ReassembledChannel};
use crate::resample::ResampleFilter;
use crate::transform::BlockTransformer;
use crate::types::{
    ChannelIndex, ChromaSubsampling, CompressionReport, Dimensions, DynamicImage, ImageId,
    PipelineConfig, PipelineError, Plane, RecordFailure, RgbImage, Stage,
};

/// Key of a channel plane before blocking.
type ChannelKey = (ImageId, Dimensions);
/// Key of a block before the transform.
type BlockKey = (ImageId, ChannelIndex);
/// Key of a transformed block; one group per output plane.
type PlaneKey = (ImageId, ChannelIndex, Dimensions);

/// Compress and reconstruct every image in `images`.
///
/// Each image is cropped to block alignment, split into Y/Cr/Cb planes,
/// cut into blocks, sent through the DCT and quantization round trip,
/// and merged back into an RGB image of the cropped size.
///
/// # Errors
///
/// Fails as a whole only when `config` is invalid or the worker pool
/// cannot be started. Problems with individual images are listed in
/// [`CompressionReport::failures`].
pub fn compress(
    images: Vec<(ImageId, DynamicImage)>,
    config: &PipelineConfig,
) -> Result<CompressionReport, PipelineError> {
    compress_with_diagnostics(images, config, &StdClock).map(|(report, _)| report)
}

/// Like [`compress`], also returning per-stage diagnostics timed with
/// `clock`.
///
/// # Errors
///
/// Same as [`compress`].
pub fn compress_with_diagnostics<C: Clock + Sync>(
    images: Vec<(ImageId, DynamicImage)>,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(CompressionReport, PipelineDiagnostics), PipelineError> {
    config.validate()?;
    let transformer = BlockTransformer::new(config.quantization)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    log::debug!(
        "compressing {} images over {} partitions on {} threads",
        images.len(),
        config.partitions,
        pool.current_num_threads(),
    );

    Ok(pool.install(|| run(images, config, &transformer, clock)))
}

/// Run every stage on the current rayon pool.
fn run<C: Clock>(
    images: Vec<(ImageId, DynamicImage)>,
    config: &PipelineConfig,
    transformer: &BlockTransformer,
    clock: &C,
) -> (CompressionReport, PipelineDiagnostics) {
    let total_start = clock.now();
    let images_in = images.len();
    let mut failures = Vec::new();

    // ─── Stage 1: ingest ───
    let (aligned, errors, ingest) = timed(clock, Stage::Ingest, images_in, || {
        let (images, mut errors) = reject_duplicate_ids(images);
        let input = Dataset::parallelize(images, config.partitions);
        let (aligned, truncate_errors) = truncate(input, ingest::alignment(config));
        errors.extend(truncate_errors);
        (aligned.repartition(config.partitions), errors)
    });
    failures.extend(errors);

    // ─── Stage 2: color transform ───
    let (channels, errors, color_transform) =
        timed(clock, Stage::ColorTransform, aligned.len(), || {
            split_channels(aligned, config.chroma_subsampling, config.resample_filter)
        });
    failures.extend(errors);

    // ─── Stage 3: blocking ───
    let (blocks, errors, blocking) = timed(clock, Stage::Blocking, channels.len(), || {
        split_blocks(channels, config.block_size)
    });
    failures.extend(errors);

    // ─── Stage 4: block transform ───
    let (transformed, errors, transform) = timed(clock, Stage::Transform, blocks.len(), || {
        transform_blocks(blocks, transformer)
    });
    failures.extend(errors);
    let block_count = transformed.len();

    // ─── Stage 5: block reassembly ───
    let (planes, errors, block_reassembly) =
        timed(clock, Stage::BlockReassembly, transformed.len(), || {
            (merge_blocks(transformed), Vec::new())
        });
    failures.extend(errors);

    // ─── Stage 6: channel reassembly ───
    let (outputs, errors, channel_reassembly) =
        timed(clock, Stage::ChannelReassembly, planes.len(), || {
            merge_channels(planes, config.resample_filter)
        });
    failures.extend(errors);

    let mut images = outputs.collect();
    images.sort_by(|(a, _), (b, _)| a.cmp(b));
    let failures = summarize_failures(failures);

    let diagnostics = PipelineDiagnostics {
        ingest,
        color_transform,
        blocking,
        transform,
        block_reassembly,
        channel_reassembly,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary {
            images_in,
            images_out: images.len(),
            failed_images: failures.len(),
            block_count,
            partitions: config.partitions,
        },
    };
    log::debug!(
        "compressed {} of {} images ({} failed)",
        images.len(),
        images_in,
        failures.len(),
    );

    (CompressionReport { images, failures }, diagnostics)
}

/// Run one stage, recording its duration and record counts.
fn timed<C, K, V, F>(
    clock: &C,
    name: Stage,
    records_in: usize,
    stage: F,
) -> (Dataset<K, V>, Vec<RecordFailure>, StageDiagnostics)
where
    C: Clock,
    K: Send,
    V: Send,
    F: FnOnce() -> (Dataset<K, V>, Vec<RecordFailure>),
{
    let start = clock.now();
    let (output, failures) = stage();
    let diagnostics = StageDiagnostics {
        duration: clock.elapsed(&start),
        records_in,
        records_out: output.len(),
        failures: failures.len(),
    };
    log::debug!(
        "{name} finished in {:.3}ms: {} -> {} records, {} failed",
        duration_ms(diagnostics.duration),
        records_in,
        diagnostics.records_out,
        diagnostics.failures,
    );
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("{name} partition sizes: {:?}", output.partition_sizes());
    }
    (output, failures, diagnostics)
}

/// Build a failure record and log it.
fn fail(image: ImageId, stage: Stage, error: PipelineError) -> RecordFailure {
    let failure = RecordFailure {
        image,
        stage,
        error,
    };
    log::warn!("{failure}");
    failure
}

/// Keep one failure per image, the one from the earliest stage, sorted
/// by image id.
///
/// An image that fails early can fail again downstream because its
/// sibling records are still in flight (a missing channel, for
/// instance); only the first cause is interesting.
fn summarize_failures(mut failures: Vec<RecordFailure>) -> Vec<RecordFailure> {
    failures.sort_by(|a, b| (&a.image, a.stage).cmp(&(&b.image, b.stage)));
    failures.dedup_by(|later, earlier| later.image == earlier.image);
    failures
}

// ───────────────────────── Stage 1: ingest ─────────────────────────────

/// Set aside every image whose id is used more than once.
///
/// Records are grouped by id all the way down, so two images sharing an
/// id would be blended together.
fn reject_duplicate_ids(
    images: Vec<(ImageId, DynamicImage)>,
) -> (Vec<(ImageId, DynamicImage)>, Vec<RecordFailure>) {
    let mut counts: HashMap<ImageId, usize> = HashMap::new();
    for (id, _) in &images {
        *counts.entry(id.clone()).or_default() += 1;
    }

    let mut kept = Vec::with_capacity(images.len());
    let mut failures = Vec::new();
    for (id, image) in images {
        if counts.get(&id).copied().unwrap_or(0) > 1 {
            failures.push(fail(
                id.clone(),
                Stage::Ingest,
                PipelineError::DuplicateImage { id },
            ));
        } else {
            kept.push((id, image));
        }
    }
    (kept, failures)
}

fn truncate(
    images: Dataset<ImageId, DynamicImage>,
    alignment: u32,
) -> (Dataset<ImageId, DynamicImage>, Vec<RecordFailure>) {
    images.try_map(|(id, image)| match ingest::truncate(image, alignment) {
        Ok(image) => Ok((id, image)),
        Err(e) => Err(fail(id, Stage::Ingest, e)),
    })
}

// ───────────────────────── Stage 2: color transform ────────────────────

fn split_channels(
    images: Dataset<ImageId, DynamicImage>,
    subsampling: ChromaSubsampling,
    filter: ResampleFilter,
) -> (Dataset<ChannelKey, (ChannelIndex, Plane)>, Vec<RecordFailure>) {
    images.try_flat_map(|(id, image)| {
        let dims = Dimensions::new(image.width(), image.height());
        match color::to_channels(&image, subsampling, filter) {
            Ok(planes) => Ok(ChannelIndex::ALL
                .into_iter()
                .zip(planes)
                .map(move |(channel, plane)| ((id.clone(), dims), (channel, plane)))),
            Err(e) => Err(fail(id, Stage::ColorTransform, e)),
        }
    })
}

// ───────────────────────── Stage 3: blocking ───────────────────────────

fn split_blocks(
    channels: Dataset<ChannelKey, (ChannelIndex, Plane)>,
    block_size: u32,
) -> (Dataset<BlockKey, Block>, Vec<RecordFailure>) {
    channels.try_flat_map(|((id, dims), (channel, plane))| {
        match blocks::split(&plane, block_size, dims) {
            Ok(blocks) => Ok(blocks
                .into_iter()
                .map(move |block| ((id.clone(), channel), block))),
            Err(e) => Err(fail(id, Stage::Blocking, e)),
        }
    })
}

// ───────────────────────── Stage 4: block transform ────────────────────

fn transform_blocks(
    blocks: Dataset<BlockKey, Block>,
    transformer: &BlockTransformer,
) -> (Dataset<PlaneKey, TransformedBlock>, Vec<RecordFailure>) {
    blocks.try_map(|((id, channel), block)| {
        match transformer.round_trip(&block, channel) {
            Ok(transformed) => Ok(((id, channel, block.image), transformed)),
            Err(e) => Err(fail(id, Stage::Transform, e)),
        }
    })
}

// ───────────────────────── Stage 5: block reassembly ───────────────────

fn merge_blocks(
    blocks: Dataset<PlaneKey, TransformedBlock>,
) -> Dataset<ImageId, ReassembledChannel> {
    blocks
        .map(|(key, block)| (key, BlockPartial::from(block)))
        .reduce_by_key(BlockPartial::merge)
        .map(|((id, channel, image), partial)| {
            (
                id,
                ReassembledChannel {
                    image,
                    channel,
                    plane: partial.into_plane(),
                },
            )
        })
}

// ───────────────────────── Stage 6: channel reassembly ─────────────────

fn merge_channels(
    channels: Dataset<ImageId, ReassembledChannel>,
    filter: ResampleFilter,
) -> (Dataset<ImageId, RgbImage>, Vec<RecordFailure>) {
    let (merged, errors) = channels
        .map(|(id, channel)| (id, ChannelPartial::from(channel)))
        .try_reduce_by_key(|a, b| a.merge(b, filter));

    let mut failures: Vec<RecordFailure> = errors
        .into_iter()
        .map(|(id, e)| fail(id, Stage::ChannelReassembly, e))
        .collect();

    let (images, errors) = merged.try_map(|(id, partial)| match partial.into_image() {
        Ok(image) => Ok((id, image)),
        Err(e) => Err(fail(id, Stage::ChannelReassembly, e)),
    });
    failures.extend(errors);
    (images, failures)
}
