//! Preprocess command implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use depth_pro_core::{DepthProImageProcessor, ImageInput, PreprocessOptions, Resample};
use ndarray::Axis;
use tracing::info;

#[derive(Args)]
pub struct PreprocessArgs {
    /// Image files to preprocess as one batch
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Path to a preprocessor_config.json (defaults are used otherwise)
    #[arg(long)]
    processor_config: Option<PathBuf>,

    /// Target size as HEIGHTxWIDTH (e.g., "384x512")
    #[arg(long)]
    size: Option<String>,

    /// Resampling filter (nearest, bilinear, bicubic, box, hamming, lanczos)
    #[arg(long)]
    resample: Option<String>,

    /// Smooth when downscaling (bilinear and bicubic only)
    #[arg(long, conflicts_with = "no_antialias")]
    antialias: bool,

    /// Disable antialiasing even if the processor config enables it
    #[arg(long)]
    no_antialias: bool,

    /// Keep the native image size
    #[arg(long)]
    no_resize: bool,

    /// Skip scaling pixel values
    #[arg(long)]
    no_rescale: bool,

    /// Skip mean/std normalization
    #[arg(long)]
    no_normalize: bool,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    format: String,
}

/// Parse "HxW" (also "H,W") into (height, width).
fn parse_size(size: &str) -> Result<(usize, usize)> {
    let parts: Vec<&str> = size.split(['x', 'X', ',']).map(str::trim).collect();
    let [height, width] = parts.as_slice() else {
        bail!("Size must be HEIGHTxWIDTH, got {:?}", size);
    };
    let height = height
        .parse::<usize>()
        .with_context(|| format!("Invalid height in size {:?}", size))?;
    let width = width
        .parse::<usize>()
        .with_context(|| format!("Invalid width in size {:?}", size))?;
    Ok((height, width))
}

fn build_options(args: &PreprocessArgs) -> Result<PreprocessOptions> {
    let mut options = PreprocessOptions::new();
    if let Some(size) = &args.size {
        let (height, width) = parse_size(size)?;
        options = options.with_size(height, width);
    }
    if let Some(resample) = &args.resample {
        let resample: Resample = resample
            .parse()
            .with_context(|| format!("Unknown resample filter {:?}", resample))?;
        options = options.with_resample(resample);
    }
    if args.antialias {
        options = options.with_antialias(true);
    }
    if args.no_antialias {
        options = options.with_antialias(false);
    }
    if args.no_resize {
        options = options.with_do_resize(false);
    }
    if args.no_rescale {
        options = options.with_do_rescale(false);
    }
    if args.no_normalize {
        options = options.with_do_normalize(false);
    }
    Ok(options)
}

fn load_processor(path: Option<&Path>) -> Result<DepthProImageProcessor> {
    match path {
        Some(path) => DepthProImageProcessor::from_file(path)
            .with_context(|| format!("Failed to load processor config from {:?}", path)),
        None => Ok(DepthProImageProcessor::default()),
    }
}

/// Run the preprocess command.
pub fn run(args: &PreprocessArgs) -> Result<()> {
    let processor = load_processor(args.processor_config.as_deref())?;
    let options = build_options(args)?;

    let images = args
        .images
        .iter()
        .map(|path| {
            image::open(path)
                .map(ImageInput::from)
                .with_context(|| format!("Failed to open image {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;
    info!(count = images.len(), "loaded images");

    let batch = processor
        .preprocess(&images, &options)
        .with_context(|| "Preprocessing failed")?;
    let pixel_values = &batch.pixel_values;

    let channel_stats: Vec<(f32, f32, f32)> = pixel_values
        .axis_iter(Axis(1))
        .map(|channel| {
            let mean = channel.mean().unwrap_or(0.0);
            let min = channel.iter().copied().fold(f32::INFINITY, f32::min);
            let max = channel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            (mean, min, max)
        })
        .collect();

    match args.format.as_str() {
        "json" => {
            let channels: Vec<_> = channel_stats
                .iter()
                .map(|(mean, min, max)| serde_json::json!({ "mean": mean, "min": min, "max": max }))
                .collect();
            let result = serde_json::json!({
                "images": args.images.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                "shape": pixel_values.shape(),
                "tensor_type": batch.tensor_type.to_string(),
                "channels": channels,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Preprocessed {} image(s)", batch.batch_size());
            println!("  Shape: {:?}", pixel_values.shape());
            for (c, (mean, min, max)) in channel_stats.iter().enumerate() {
                println!("  Channel {}: mean={:.4} min={:.4} max={:.4}", c, mean, min, max);
            }
        }
    }

    Ok(())
}
