//! blockpress: run the block transform compression pipeline over image files.
//!
//! Reads every input image, converts it to 8-bit RGB, runs the whole batch
//! through the pipeline with configurable quantization, and reports how
//! closely each reconstruction matches its source. Useful for:
//!
//! - Seeing what a given quality factor does to real images
//! - Comparing standard tables against uniform steps
//! - Measuring per-stage durations across partition and thread counts
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin blockpress -- [OPTIONS] <IMAGES>...
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use blockpress_pipeline::types::DynamicImage;
use blockpress_pipeline::{
    ChromaSubsampling, CompressionReport, ImageId, ImageQuality, PipelineConfig,
    PipelineDiagnostics, Quality, Quantization, ResampleFilter, StdClock,
};
use clap::{Parser, ValueEnum};
use serde::Serialize;

/// Lossy block transform compression for batches of images.
///
/// Every image goes through color conversion, 8x8 DCT, quantization and
/// back, and comes out as the image a decoder would have seen.
#[derive(Parser)]
#[command(name = "blockpress", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Quality factor for the standard quantization tables (1-100).
    #[arg(
        long,
        default_value_t = Quality::DEFAULT.get(),
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    quality: u8,

    /// Quantize every coefficient with this one step instead of the
    /// standard tables.
    #[arg(long, conflicts_with = "quality", value_parser = clap::value_parser!(u16).range(1..))]
    uniform_step: Option<u16>,

    /// Skip quantization entirely (transform round trip only).
    #[arg(long, conflicts_with_all = ["quality", "uniform_step"])]
    no_quantize: bool,

    /// Store chroma at half resolution in each direction.
    #[arg(long)]
    subsample: bool,

    /// Filter for resizing chroma planes (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    filter: Filter,

    /// Number of dataset partitions.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_PARTITIONS,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    partitions: usize,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THREADS)]
    threads: usize,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write reconstructed images as PNG into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output the report as JSON instead of human-readable text.
    #[arg(long)]
    json: bool,

    /// Log every stage (same as `RUST_LOG=debug`).
    #[arg(long, short)]
    verbose: bool,
}

/// Chroma resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`ResampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: ResampleFilter) -> Filter {
    match f {
        ResampleFilter::Nearest => Filter::Nearest,
        ResampleFilter::Triangle => Filter::Triangle,
        ResampleFilter::CatmullRom => Filter::CatmullRom,
        ResampleFilter::Gaussian => Filter::Gaussian,
        ResampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from
/// [`PipelineConfig::DEFAULT_RESAMPLE_FILTER`] so the two cannot silently
/// diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PipelineConfig::DEFAULT_RESAMPLE_FILTER);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let quantization = if cli.no_quantize {
        Quantization::Disabled
    } else if let Some(step) = cli.uniform_step {
        Quantization::Uniform(step)
    } else {
        Quantization::Standard(Quality::new(cli.quality).map_err(|e| e.to_string())?)
    };

    Ok(PipelineConfig {
        quantization,
        chroma_subsampling: if cli.subsample {
            ChromaSubsampling::Half
        } else {
            ChromaSubsampling::None
        },
        resample_filter: match cli.filter {
            Filter::Nearest => ResampleFilter::Nearest,
            Filter::Triangle => ResampleFilter::Triangle,
            Filter::CatmullRom => ResampleFilter::CatmullRom,
            Filter::Gaussian => ResampleFilter::Gaussian,
            Filter::Lanczos3 => ResampleFilter::Lanczos3,
        },
        partitions: cli.partitions,
        threads: cli.threads,
        ..PipelineConfig::default()
    })
}

/// An input file that never reached the pipeline.
#[derive(Debug, Serialize)]
struct Unreadable {
    /// Path as given on the command line.
    path: PathBuf,
    /// Why it could not be read or decoded.
    error: String,
}

/// Read and decode every input, converting to 8-bit RGB.
///
/// Files that cannot be read or decoded are reported on stderr and
/// returned separately.
fn load_images(paths: &[PathBuf]) -> (Vec<(ImageId, DynamicImage)>, Vec<Unreadable>) {
    let mut images = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();

    for path in paths {
        let decoded = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                log::debug!("read {} ({} bytes)", path.display(), bytes.len());
                blockpress_pipeline::ingest::decode(&bytes).map_err(|e| e.to_string())
            });
        match decoded {
            Ok(image) => images.push((
                ImageId::new(path.display().to_string()),
                DynamicImage::ImageRgb8(image.to_rgb8()),
            )),
            Err(error) => {
                eprintln!("Error loading {}: {error}", path.display());
                unreadable.push(Unreadable {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    (images, unreadable)
}

/// PNG destinations inside `dir` for `ids`, in the same order.
///
/// Names come from each id's file stem. A stem that is already taken
/// gets the first free `-2`, `-3`, ... suffix, so no two outputs share a
/// path.
fn output_paths<'a>(dir: &Path, ids: impl IntoIterator<Item = &'a ImageId>) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    ids.into_iter()
        .map(|id| {
            let stem = Path::new(id.as_str())
                .file_stem()
                .map_or_else(|| id.to_string(), |s| s.to_string_lossy().into_owned());
            let mut name = format!("{stem}.png");
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{stem}-{n}.png");
                n += 1;
            }
            dir.join(name)
        })
        .collect()
}

/// Write every reconstructed image as PNG into `dir`.
fn write_outputs(dir: &Path, report: &CompressionReport) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    let paths = output_paths(dir, report.images.iter().map(|(id, _)| id));
    for ((_, image), path) in report.images.iter().zip(paths) {
        image
            .save(&path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

/// Reconstruction quality for every output image, in report order.
fn measure_all(
    originals: &[(ImageId, DynamicImage)],
    report: &CompressionReport,
) -> Vec<(ImageId, Option<ImageQuality>)> {
    report
        .images
        .iter()
        .map(|(id, image)| {
            let quality = originals
                .iter()
                .find(|(candidate, _)| candidate == id)
                .and_then(|(_, original)| original.as_rgb8())
                .and_then(|original| ImageQuality::measure(original, image));
            (id.clone(), quality)
        })
        .collect()
}

fn print_text_report(
    report: &CompressionReport,
    qualities: &[(ImageId, Option<ImageQuality>)],
    unreadable: &[Unreadable],
    diagnostics: &PipelineDiagnostics,
) {
    println!("{:<40} {:>11} {:>10} {:>8}", "Image", "Size", "PSNR", "Max dev");
    println!("{}", "-".repeat(72));
    for ((id, image), (_, quality)) in report.images.iter().zip(qualities) {
        let size = format!("{}x{}", image.width(), image.height());
        let (psnr, max_dev) = quality.map_or_else(
            || ("-".to_string(), "-".to_string()),
            |q| {
                (
                    q.psnr.map_or_else(|| "lossless".to_string(), |p| format!("{p:.2}dB")),
                    q.max_deviation.to_string(),
                )
            },
        );
        println!("{id:<40} {size:>11} {psnr:>10} {max_dev:>8}");
    }

    if !report.failures.is_empty() || !unreadable.is_empty() {
        println!();
        println!("Failures:");
        for input in unreadable {
            println!("  {} could not be loaded: {}", input.path.display(), input.error);
        }
        for failure in &report.failures {
            println!("  {failure}");
        }
    }

    println!();
    println!("{}", diagnostics.report());
}

/// The full run as one JSON document.
///
/// Inputs that never reached the pipeline are listed under `unreadable`;
/// images the pipeline rejected are under `failures`.
fn json_report(
    report: &CompressionReport,
    qualities: &[(ImageId, Option<ImageQuality>)],
    unreadable: &[Unreadable],
    diagnostics: &PipelineDiagnostics,
) -> serde_json::Value {
    let images: Vec<serde_json::Value> = report
        .images
        .iter()
        .zip(qualities)
        .map(|((id, image), (_, quality))| {
            serde_json::json!({
                "id": id,
                "width": image.width(),
                "height": image.height(),
                "quality": quality,
            })
        })
        .collect();
    serde_json::json!({
        "images": images,
        "unreadable": unreadable,
        "failures": report.failures,
        "diagnostics": diagnostics,
    })
}

fn print_json_report(
    report: &CompressionReport,
    qualities: &[(ImageId, Option<ImageQuality>)],
    unreadable: &[Unreadable],
    diagnostics: &PipelineDiagnostics,
) -> Result<(), String> {
    let output = json_report(report, qualities, unreadable, diagnostics);
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| format!("Error serializing report: {e}"))?;
    println!("{json}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let (images, unreadable) = load_images(&cli.images);
    eprintln!(
        "Images: {} loaded, {} unreadable",
        images.len(),
        unreadable.len()
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let originals = images.clone();
    let (report, diagnostics) =
        match blockpress_pipeline::compress_with_diagnostics(images, &config, &StdClock) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

    if let Some(ref dir) = cli.output_dir
        && let Err(msg) = write_outputs(dir, &report)
    {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    let qualities = measure_all(&originals, &report);
    if cli.json {
        if let Err(msg) = print_json_report(&report, &qualities, &unreadable, &diagnostics) {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    } else {
        print_text_report(&report, &qualities, &unreadable, &diagnostics);
    }

    if report.is_complete() && unreadable.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("blockpress").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_pipeline_config() {
        let config = config_from_cli(&parse(&["a.png"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn quantization_flags_select_mode() {
        let config = config_from_cli(&parse(&["--quality", "40", "a.png"])).unwrap();
        assert_eq!(
            config.quantization,
            Quantization::Standard(Quality::new(40).unwrap())
        );

        let config = config_from_cli(&parse(&["--uniform-step", "12", "a.png"])).unwrap();
        assert_eq!(config.quantization, Quantization::Uniform(12));

        let config = config_from_cli(&parse(&["--no-quantize", "a.png"])).unwrap();
        assert_eq!(config.quantization, Quantization::Disabled);
    }

    #[test]
    fn out_of_range_quality_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["blockpress", "--quality", "0", "a.png"]).is_err());
        assert!(Cli::try_parse_from(["blockpress", "--quality", "101", "a.png"]).is_err());
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "--partitions",
            "3",
            "--config-json",
            r#"{"partitions": 5, "chroma_subsampling": "Half"}"#,
            "a.png",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.partitions, 5);
        assert_eq!(config.chroma_subsampling, ChromaSubsampling::Half);
    }

    #[test]
    fn subsample_and_filter_flags() {
        let cli = parse(&["--subsample", "--filter", "lanczos3", "a.png"]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.chroma_subsampling, ChromaSubsampling::Half);
        assert_eq!(config.resample_filter, ResampleFilter::Lanczos3);
    }

    #[test]
    fn output_path_uses_file_stem() {
        let ids = [ImageId::new("photos/cat.jpg")];
        let paths = output_paths(Path::new("/tmp/out"), &ids);
        assert_eq!(paths, [Path::new("/tmp/out/cat.png")]);
    }

    #[test]
    fn same_stem_inputs_get_distinct_outputs() {
        let ids = [
            ImageId::new("day/cat.png"),
            ImageId::new("night/cat.jpg"),
            ImageId::new("cat-2.bmp"),
        ];
        let paths = output_paths(Path::new("/tmp/out"), &ids);
        assert_eq!(
            paths,
            [
                Path::new("/tmp/out/cat.png"),
                Path::new("/tmp/out/cat-2.png"),
                Path::new("/tmp/out/cat-2-2.png"),
            ]
        );
    }

    #[test]
    fn missing_file_is_unreadable() {
        let path = PathBuf::from("/nonexistent/blockpress/missing.png");
        let (images, unreadable) = load_images(std::slice::from_ref(&path));
        assert!(images.is_empty());
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].path, path);
        assert!(!unreadable[0].error.is_empty());
    }

    #[test]
    fn json_report_lists_unreadable_inputs() {
        let unreadable = [Unreadable {
            path: PathBuf::from("missing.png"),
            error: "No such file or directory".to_string(),
        }];
        let value = json_report(
            &CompressionReport::default(),
            &[],
            &unreadable,
            &PipelineDiagnostics::default(),
        );
        assert_eq!(value["unreadable"][0]["path"], "missing.png");
        assert_eq!(value["unreadable"][0]["error"], "No such file or directory");
        assert_eq!(value["failures"], serde_json::json!([]));
        assert_eq!(value["images"], serde_json::json!([]));
    }
}
