//! DepthPro image processor: batch preprocessing and depth post-processing.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array4, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::interpolate::resize_chw;
use super::transforms::{stack_batch, Compose, Transform};
use super::types::{
    ChannelDimension, ChannelValues, ImageInput, ImageType, Resample, SizeDict, TensorType,
    IMAGENET_STANDARD_MEAN, IMAGENET_STANDARD_STD,
};
use crate::error::{Error, Result};

/// Output field holding the preprocessed batch.
pub const PIXEL_VALUES: &str = "pixel_values";

/// Names of the model inputs produced by [`DepthProImageProcessor::preprocess`].
pub const MODEL_INPUT_NAMES: [&str; 1] = [PIXEL_VALUES];

/// Depth values are clamped to this range before inversion.
const MIN_DEPTH: f32 = 1e-4;
const MAX_DEPTH: f32 = 1e4;

/// Processor defaults, as stored in a `preprocessor_config.json`.
///
/// Optional fields may be left unset (`null`); a `preprocess` call that needs
/// one of them then fails with [`Error::InvalidArgument`]. Unknown keys such as
/// `processor_class` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProcessorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_processor_type: Option<String>,
    pub do_resize: bool,
    pub size: Option<SizeDict>,
    pub resample: Option<Resample>,
    pub antialias: Option<bool>,
    pub do_rescale: bool,
    pub rescale_factor: Option<f32>,
    pub do_normalize: bool,
    pub image_mean: Option<ChannelValues>,
    pub image_std: Option<ChannelValues>,
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            image_processor_type: Some("DepthProImageProcessorFast".to_string()),
            do_resize: true,
            size: Some(SizeDict::square(1536)),
            resample: Some(Resample::Bilinear),
            antialias: Some(false),
            do_rescale: true,
            rescale_factor: Some(1.0 / 255.0),
            do_normalize: true,
            image_mean: Some(IMAGENET_STANDARD_MEAN.into()),
            image_std: Some(IMAGENET_STANDARD_STD.into()),
        }
    }
}

/// Per-call overrides for [`DepthProImageProcessor::preprocess`].
///
/// A field left as `None` falls back to the processor default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessOptions {
    pub do_resize: Option<bool>,
    pub size: Option<SizeDict>,
    pub resample: Option<Resample>,
    pub antialias: Option<bool>,
    pub do_rescale: Option<bool>,
    pub rescale_factor: Option<f32>,
    pub do_normalize: Option<bool>,
    pub image_mean: Option<ChannelValues>,
    pub image_std: Option<ChannelValues>,
    pub return_tensors: Option<TensorType>,
    pub data_format: Option<ChannelDimension>,
    pub input_data_format: Option<ChannelDimension>,
}

impl PreprocessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_do_resize(mut self, do_resize: bool) -> Self {
        self.do_resize = Some(do_resize);
        self
    }

    pub fn with_size(mut self, height: usize, width: usize) -> Self {
        self.size = Some(SizeDict::new(height, width));
        self
    }

    pub fn with_resample(mut self, resample: Resample) -> Self {
        self.resample = Some(resample);
        self
    }

    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = Some(antialias);
        self
    }

    pub fn with_do_rescale(mut self, do_rescale: bool) -> Self {
        self.do_rescale = Some(do_rescale);
        self
    }

    pub fn with_rescale_factor(mut self, factor: f32) -> Self {
        self.rescale_factor = Some(factor);
        self
    }

    pub fn with_do_normalize(mut self, do_normalize: bool) -> Self {
        self.do_normalize = Some(do_normalize);
        self
    }

    pub fn with_image_mean(mut self, mean: impl Into<ChannelValues>) -> Self {
        self.image_mean = Some(mean.into());
        self
    }

    pub fn with_image_std(mut self, std: impl Into<ChannelValues>) -> Self {
        self.image_std = Some(std.into());
        self
    }

    pub fn with_return_tensors(mut self, tensor_type: TensorType) -> Self {
        self.return_tensors = Some(tensor_type);
        self
    }

    pub fn with_data_format(mut self, format: ChannelDimension) -> Self {
        self.data_format = Some(format);
        self
    }

    pub fn with_input_data_format(mut self, format: ChannelDimension) -> Self {
        self.input_data_format = Some(format);
        self
    }
}

/// Fully merged settings for one `preprocess` call.
///
/// Equality on this struct keys the transform cache.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessParameters {
    pub do_resize: bool,
    pub size: Option<SizeDict>,
    pub resample: Option<Resample>,
    pub antialias: Option<bool>,
    pub do_rescale: bool,
    pub rescale_factor: Option<f32>,
    pub do_normalize: bool,
    pub image_mean: Option<ChannelValues>,
    pub image_std: Option<ChannelValues>,
    pub image_type: ImageType,
    pub return_tensors: TensorType,
    pub data_format: ChannelDimension,
    pub input_data_format: Option<ChannelDimension>,
}

impl PreprocessParameters {
    /// Check that every enabled step has what it needs.
    pub fn validate(&self) -> Result<()> {
        if !self.return_tensors.is_supported() {
            return Err(Error::invalid_argument(format!(
                "only ndarray output tensors are supported, got '{}'",
                self.return_tensors
            )));
        }

        if self.data_format != ChannelDimension::First {
            return Err(Error::invalid_argument(
                "only channels_first output data format is supported",
            ));
        }

        if self.do_resize {
            let dims = self.size.and_then(|size| size.dims());
            let Some((height, width)) = dims.filter(|_| self.resample.is_some() && self.antialias.is_some())
            else {
                return Err(Error::invalid_argument(
                    "size, resample and antialias must be specified if do_resize is true",
                ));
            };
            if height == 0 || width == 0 {
                return Err(Error::invalid_argument(format!(
                    "resize target must be non-empty, got {height}x{width}"
                )));
            }
        }

        if self.do_rescale && self.rescale_factor.is_none() {
            return Err(Error::invalid_argument(
                "rescale_factor must be specified if do_rescale is true",
            ));
        }

        if self.do_normalize {
            let (Some(_), Some(std)) = (&self.image_mean, &self.image_std) else {
                return Err(Error::invalid_argument(
                    "image_mean and image_std must be specified if do_normalize is true",
                ));
            };
            if std.values().contains(&0.0) {
                return Err(Error::invalid_argument("image_std must not contain zero"));
            }
        }

        Ok(())
    }
}

/// Build the ordered pipeline for validated parameters.
///
/// Order is fixed: conversion to tensor, rescale and/or normalize (fused when
/// both are enabled), then resize.
pub fn build_transforms(params: &PreprocessParameters) -> Compose {
    let mut transforms = Vec::new();

    let factor = params.rescale_factor.filter(|_| params.do_rescale);
    let stats = if params.do_normalize {
        params.image_mean.clone().zip(params.image_std.clone())
    } else {
        None
    };
    match (factor, stats) {
        (Some(factor), Some((mean, std))) => {
            transforms.push(Transform::FusedRescaleNormalize { mean, std, factor })
        }
        (Some(factor), None) => transforms.push(Transform::Rescale { factor }),
        (None, Some((mean, std))) => transforms.push(Transform::Normalize { mean, std }),
        (None, None) => {}
    }

    if params.do_resize {
        let dims = params.size.and_then(|size| size.dims());
        if let (Some((height, width)), Some(resample), Some(antialias)) =
            (dims, params.resample, params.antialias)
        {
            transforms.push(Transform::Resize {
                height,
                width,
                resample,
                antialias,
            });
        }
    }

    Compose::new(params.image_type, params.input_data_format, transforms)
}

/// Preprocessed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFeature {
    /// `[N, C, H, W]`
    pub pixel_values: Array4<f32>,
    pub tensor_type: TensorType,
}

impl BatchFeature {
    /// Look up an output by field name.
    pub fn get(&self, name: &str) -> Option<&Array4<f32>> {
        (name == PIXEL_VALUES).then_some(&self.pixel_values)
    }

    pub fn batch_size(&self) -> usize {
        self.pixel_values.dim().0
    }

    pub fn num_channels(&self) -> usize {
        self.pixel_values.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixel_values.dim().2
    }

    pub fn width(&self) -> usize {
        self.pixel_values.dim().3
    }

    pub fn into_pixel_values(self) -> Array4<f32> {
        self.pixel_values
    }
}

/// Post-processed depth for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthResult {
    pub predicted_depth: Array2<f32>,
    /// Focal length in pixels, set when the sample had both a fov and a target size.
    pub fov: Option<f32>,
}

/// Post-processed depth for a batch.
///
/// `fov` is `None` when no fovs were passed. Otherwise it has one entry per
/// sample, `None` for samples without a target size.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthEstimation {
    pub predicted_depth: Vec<Array2<f32>>,
    pub fov: Option<Vec<Option<f32>>>,
}

impl DepthEstimation {
    pub fn len(&self) -> usize {
        self.predicted_depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted_depth.is_empty()
    }

    pub fn into_results(self) -> Vec<DepthResult> {
        let fovs = self.fov.unwrap_or_default();
        self.predicted_depth
            .into_iter()
            .enumerate()
            .map(|(i, predicted_depth)| DepthResult {
                predicted_depth,
                fov: fovs.get(i).copied().flatten(),
            })
            .collect()
    }
}

/// Focal length in pixels for a horizontal field of view in degrees.
pub fn focal_length_from_fov(fov_degrees: f32, width: usize) -> f32 {
    0.5 * width as f32 / (0.5 * fov_degrees.to_radians()).tan()
}

type TransformCache = Option<(PreprocessParameters, Arc<Compose>)>;

/// Image processor for DepthPro.
#[derive(Debug)]
pub struct DepthProImageProcessor {
    config: ImageProcessorConfig,
    cache: Mutex<TransformCache>,
}

impl Clone for DepthProImageProcessor {
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}

impl Default for DepthProImageProcessor {
    fn default() -> Self {
        Self::new(ImageProcessorConfig::default())
    }
}

impl DepthProImageProcessor {
    pub fn new(config: ImageProcessorConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    /// Load from a `preprocessor_config.json` (or YAML, by extension).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading processor config");
        let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ImageProcessorConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(Self::new(config))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(content)?))
    }

    pub fn config(&self) -> &ImageProcessorConfig {
        &self.config
    }

    /// Overlay call-time options on the processor defaults.
    pub fn merge(&self, options: &PreprocessOptions, image_type: ImageType) -> PreprocessParameters {
        let config = &self.config;
        PreprocessParameters {
            do_resize: options.do_resize.unwrap_or(config.do_resize),
            size: options.size.or(config.size),
            resample: options.resample.or(config.resample),
            antialias: options.antialias.or(config.antialias),
            do_rescale: options.do_rescale.unwrap_or(config.do_rescale),
            rescale_factor: options.rescale_factor.or(config.rescale_factor),
            do_normalize: options.do_normalize.unwrap_or(config.do_normalize),
            image_mean: options.image_mean.clone().or_else(|| config.image_mean.clone()),
            image_std: options.image_std.clone().or_else(|| config.image_std.clone()),
            image_type,
            return_tensors: options.return_tensors.unwrap_or_default(),
            data_format: options.data_format.unwrap_or(ChannelDimension::First),
            input_data_format: options.input_data_format,
        }
    }

    /// Transforms for `params`, reusing the last pipeline when the parameters match.
    fn transforms_for(&self, params: &PreprocessParameters) -> Arc<Compose> {
        // the cache holds plain data, so a poisoned lock is still usable
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((key, compose)) = cache.as_ref() {
            if key == params {
                debug!("reusing cached transforms");
                return Arc::clone(compose);
            }
        }

        let compose = Arc::new(build_transforms(params));
        debug!(steps = ?compose.step_names(), "built transforms");
        *cache = Some((params.clone(), Arc::clone(&compose)));
        compose
    }

    /// Preprocess a batch of images into `[N, C, H, W]` pixel values.
    ///
    /// The input type is detected from the first image and every image must
    /// share it. All argument checks run before any image is touched.
    pub fn preprocess(&self, images: &[ImageInput], options: &PreprocessOptions) -> Result<BatchFeature> {
        let Some(first) = images.first() else {
            return Err(Error::invalid_argument("preprocess needs at least one image"));
        };
        let image_type = first.image_type()?;
        for (i, image) in images.iter().enumerate().skip(1) {
            let kind = image.image_type()?;
            if kind != image_type {
                return Err(Error::invalid_argument(format!(
                    "image {i} is {kind} but the batch started with {image_type}"
                )));
            }
        }

        let params = self.merge(options, image_type);
        params.validate()?;
        let compose = self.transforms_for(&params);

        debug!(batch = images.len(), %image_type, "preprocessing batch");
        let tensors = images
            .par_iter()
            .enumerate()
            .map(|(i, image)| {
                trace!(index = i, "transforming image");
                compose.apply(image)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchFeature {
            pixel_values: stack_batch(&tensors)?,
            tensor_type: params.return_tensors,
        })
    }

    /// Preprocess a single image with the processor defaults.
    pub fn preprocess_image(&self, image: impl Into<ImageInput>) -> Result<BatchFeature> {
        self.preprocess(&[image.into()], &PreprocessOptions::default())
    }

    /// Turn raw model depth maps into final depth.
    ///
    /// For every sample with a target size `(height, width)`: a given fov is
    /// converted to a focal length `f` and the depth scaled by `width / f`,
    /// then the map is resized with the processor's resample filter. Every
    /// map is finally inverted as `1 / clamp(depth, 1e-4, 1e4)`.
    pub fn post_process_depth_estimation(
        &self,
        predicted_depths: &[Array2<f32>],
        fovs: Option<&[f32]>,
        target_sizes: Option<&[Option<(usize, usize)>]>,
    ) -> Result<DepthEstimation> {
        let batch = predicted_depths.len();
        if let Some((i, depth)) = predicted_depths
            .iter()
            .enumerate()
            .find(|(_, depth)| depth.dim().0 == 0 || depth.dim().1 == 0)
        {
            return Err(Error::invalid_argument(format!(
                "predicted depth {i} has shape {:?}; depth maps must be non-empty",
                depth.shape()
            )));
        }
        if let Some(fovs) = fovs {
            if fovs.len() != batch {
                return Err(Error::invalid_argument(format!(
                    "got {} fov values for {batch} predicted depths; pass one fov per depth map",
                    fovs.len()
                )));
            }
        }
        if let Some(sizes) = target_sizes {
            if sizes.len() != batch {
                return Err(Error::invalid_argument(format!(
                    "got {} target sizes for {batch} predicted depths; pass one target size per depth map",
                    sizes.len()
                )));
            }
            if let Some((h, w)) = sizes.iter().flatten().find(|(h, w)| *h == 0 || *w == 0) {
                return Err(Error::invalid_argument(format!(
                    "target size must be non-empty, got {h}x{w}"
                )));
            }
        }

        let needs_resize = target_sizes.is_some_and(|sizes| sizes.iter().any(Option::is_some));
        let resample = match (needs_resize, self.config.resample) {
            (true, None) => {
                return Err(Error::invalid_argument(
                    "resample must be specified to resize predicted depths",
                ));
            }
            (_, resample) => resample.unwrap_or_default(),
        };
        let antialias = self.config.antialias.unwrap_or(false) && resample.supports_antialias();

        let samples: Vec<(Array2<f32>, Option<f32>)> = predicted_depths
            .par_iter()
            .enumerate()
            .map(|(i, depth)| {
                let fov = fovs.map(|fovs| fovs[i]);
                let target = target_sizes.and_then(|sizes| sizes[i]);
                debug!(index = i, ?fov, ?target, "post-processing depth");
                post_process_sample(depth, fov, target, resample, antialias)
            })
            .collect();

        let (predicted_depth, focal_lengths): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
        Ok(DepthEstimation {
            predicted_depth,
            fov: fovs.map(|_| focal_lengths),
        })
    }
}

fn post_process_sample(
    depth: &Array2<f32>,
    fov: Option<f32>,
    target: Option<(usize, usize)>,
    resample: Resample,
    antialias: bool,
) -> (Array2<f32>, Option<f32>) {
    let mut depth = depth.to_owned();
    let mut focal_length = None;

    if let Some((height, width)) = target {
        if let Some(fov) = fov {
            let focal = focal_length_from_fov(fov, width);
            depth.mapv_inplace(|d| d * width as f32 / focal);
            focal_length = Some(focal);
        }
        depth = resize_chw(depth.view().insert_axis(Axis(0)), height, width, resample, antialias)
            .index_axis_move(Axis(0), 0);
    }

    depth.mapv_inplace(|d| 1.0 / d.clamp(MIN_DEPTH, MAX_DEPTH));
    (depth, focal_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{arr2, ArrayD};

    fn hwc_batch(n: usize, h: usize, w: usize) -> Vec<ImageInput> {
        (0..n)
            .map(|i| ImageInput::Array(ArrayD::from_elem(vec![h, w, 3], (i * 10) as f32)))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = ImageProcessorConfig::default();
        assert!(config.do_resize && config.do_rescale && config.do_normalize);
        assert_eq!(config.size, Some(SizeDict::square(1536)));
        assert_eq!(config.resample, Some(Resample::Bilinear));
        assert_eq!(config.antialias, Some(false));
        assert_relative_eq!(config.rescale_factor.unwrap(), 1.0 / 255.0);
        assert_eq!(MODEL_INPUT_NAMES, ["pixel_values"]);
    }

    #[test]
    fn test_parse_preprocessor_config_json() {
        let json = r#"{
            "image_processor_type": "DepthProImageProcessorFast",
            "processor_class": "ignored",
            "size": {"height": 384, "width": 512},
            "resample": 3,
            "image_mean": 0.5,
            "image_std": [0.5, 0.5, 0.5]
        }"#;
        let processor = DepthProImageProcessor::from_json_str(json).unwrap();
        let config = processor.config();
        assert_eq!(config.size.and_then(|s| s.dims()), Some((384, 512)));
        assert_eq!(config.resample, Some(Resample::Bicubic));
        assert_eq!(config.image_mean, Some(ChannelValues::Scalar(0.5)));
        assert!(config.do_rescale);
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let processor = DepthProImageProcessor::default();
        let options = PreprocessOptions::new()
            .with_size(32, 48)
            .with_resample(Resample::Nearest)
            .with_do_normalize(false);
        let params = processor.merge(&options, ImageType::Tensor);

        assert_eq!(params.size, Some(SizeDict::new(32, 48)));
        assert_eq!(params.resample, Some(Resample::Nearest));
        assert!(!params.do_normalize);
        assert!(params.do_rescale);
        assert_eq!(params.antialias, Some(false));
        assert_eq!(params.data_format, ChannelDimension::First);
        assert_eq!(params.return_tensors, TensorType::Ndarray);
    }

    #[test]
    fn test_build_transforms_variants() {
        let processor = DepthProImageProcessor::default();
        let names = |options: PreprocessOptions, image_type| {
            build_transforms(&processor.merge(&options, image_type)).step_names()
        };

        assert_eq!(
            names(PreprocessOptions::new(), ImageType::Image),
            vec!["image_to_tensor", "rescale_normalize", "resize"]
        );
        assert_eq!(
            names(PreprocessOptions::new().with_do_normalize(false), ImageType::Array),
            vec!["array_to_tensor", "rescale", "resize"]
        );
        assert_eq!(
            names(PreprocessOptions::new().with_do_rescale(false), ImageType::Tensor),
            vec!["normalize", "resize"]
        );
        assert!(
            names(
                PreprocessOptions::new()
                    .with_do_rescale(false)
                    .with_do_normalize(false)
                    .with_do_resize(false),
                ImageType::Tensor
            )
            .is_empty()
        );
    }

    #[test]
    fn test_validation_errors() {
        let processor = DepthProImageProcessor::default();
        let images = hwc_batch(1, 4, 4);
        let expect_invalid = |options: PreprocessOptions, needle: &str| {
            let err = processor.preprocess(&images, &options).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
            assert!(err.to_string().contains(needle), "{err}");
        };

        expect_invalid(
            PreprocessOptions::new().with_return_tensors(TensorType::Pytorch),
            "only ndarray",
        );
        expect_invalid(
            PreprocessOptions::new().with_data_format(ChannelDimension::Last),
            "channels_first",
        );
        expect_invalid(PreprocessOptions::new().with_size(0, 4), "non-empty");
        expect_invalid(PreprocessOptions::new().with_image_std(0.0f32), "zero");
    }

    #[test]
    fn test_missing_settings_rejected() {
        let images = hwc_batch(1, 4, 4);

        let processor = DepthProImageProcessor::new(ImageProcessorConfig {
            size: None,
            ..Default::default()
        });
        let err = processor.preprocess(&images, &PreprocessOptions::new()).unwrap_err();
        assert!(err.to_string().contains("size, resample and antialias"));
        // explicitly disabling the step skips the check
        assert!(
            processor
                .preprocess(&images, &PreprocessOptions::new().with_do_resize(false))
                .is_ok()
        );

        let processor = DepthProImageProcessor::new(ImageProcessorConfig {
            rescale_factor: None,
            ..Default::default()
        });
        let err = processor.preprocess(&images, &PreprocessOptions::new()).unwrap_err();
        assert!(err.to_string().contains("rescale_factor"));

        let processor = DepthProImageProcessor::new(ImageProcessorConfig {
            image_std: None,
            ..Default::default()
        });
        let err = processor.preprocess(&images, &PreprocessOptions::new()).unwrap_err();
        assert!(err.to_string().contains("image_mean and image_std"));
    }

    #[test]
    fn test_empty_and_mixed_batches() {
        let processor = DepthProImageProcessor::default();
        let err = processor.preprocess(&[], &PreprocessOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let mixed = vec![
            ImageInput::Array(ArrayD::zeros(vec![4, 4, 3])),
            ImageInput::Tensor(ArrayD::zeros(vec![3, 4, 4])),
        ];
        let err = processor.preprocess(&mixed, &PreprocessOptions::new()).unwrap_err();
        assert!(err.to_string().contains("image 1 is tensor"));
    }

    #[test]
    fn test_unsupported_input_type() {
        let processor = DepthProImageProcessor::default();
        let images = vec![ImageInput::Tensor(ArrayD::zeros(vec![1, 3, 4, 4]))];
        let err = processor.preprocess(&images, &PreprocessOptions::new()).unwrap_err();
        assert!(err.to_string().contains("unsupported input image type"));
    }

    #[test]
    fn test_transform_cache_reused_on_equal_params() {
        let processor = DepthProImageProcessor::default();
        let params = processor.merge(&PreprocessOptions::new(), ImageType::Array);

        let first = processor.transforms_for(&params);
        let second = processor.transforms_for(&params.clone());
        assert!(Arc::ptr_eq(&first, &second));

        let other = processor.merge(&PreprocessOptions::new().with_size(8, 8), ImageType::Array);
        let third = processor.transforms_for(&other);
        assert!(!Arc::ptr_eq(&first, &third));

        // single entry: the first parameters were evicted
        let fourth = processor.transforms_for(&params);
        assert!(!Arc::ptr_eq(&first, &fourth));
        assert_eq!(*first, *fourth);
    }

    #[test]
    fn test_preprocess_shapes() {
        let processor = DepthProImageProcessor::default();
        let images = hwc_batch(3, 6, 5);

        let resized = processor
            .preprocess(&images, &PreprocessOptions::new().with_size(8, 10))
            .unwrap();
        assert_eq!(resized.pixel_values.shape(), &[3, 3, 8, 10]);
        assert_eq!(resized.get(PIXEL_VALUES).map(|v| v.shape()), Some(&[3, 3, 8, 10][..]));
        assert!(resized.get("labels").is_none());

        let native = processor
            .preprocess(&images, &PreprocessOptions::new().with_do_resize(false))
            .unwrap();
        assert_eq!((native.height(), native.width()), (6, 5));
        // image 1 is constant 10: (10 / 255 - 0.5) / 0.5
        assert_abs_diff_eq!(native.pixel_values[[1, 2, 3, 4]], 10.0 / 127.5 - 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_postprocess_inversion_only() {
        let processor = DepthProImageProcessor::default();
        let depth = arr2(&[[2.0, 1e-5], [1e5, 0.5]]);
        let result = processor
            .post_process_depth_estimation(&[depth], None, None)
            .unwrap();

        assert!(result.fov.is_none());
        let out = &result.predicted_depth[0];
        assert_relative_eq!(out[[0, 0]], 0.5);
        assert_relative_eq!(out[[0, 1]], 1e4, max_relative = 1e-5);
        assert_relative_eq!(out[[1, 0]], 1e-4, max_relative = 1e-5);
        assert_relative_eq!(out[[1, 1]], 2.0);
    }

    #[test]
    fn test_focal_length() {
        let focal = focal_length_from_fov(60.0, 100);
        assert_relative_eq!(focal, 86.60254, max_relative = 1e-5);
        assert_relative_eq!(100.0 / focal, 1.1547005, max_relative = 1e-5);
    }

    #[test]
    fn test_postprocess_fov_scaling() {
        let processor = DepthProImageProcessor::default();
        let depth = Array2::from_elem((2, 100), 2.0f32);
        let result = processor
            .post_process_depth_estimation(&[depth], Some(&[60.0][..]), Some(&[Some((2, 100))][..]))
            .unwrap();

        let fov = result.fov.as_ref().unwrap()[0].unwrap();
        assert_relative_eq!(fov, 86.60254, max_relative = 1e-5);
        for v in result.predicted_depth[0].iter() {
            assert_relative_eq!(*v, 1.0 / (2.0 * 1.1547005), max_relative = 1e-5);
        }
    }

    #[test]
    fn test_postprocess_resize_before_inversion() {
        let processor = DepthProImageProcessor::default();
        let depth = arr2(&[[1.0, 3.0]]);
        let result = processor
            .post_process_depth_estimation(&[depth], None, Some(&[Some((1, 4))][..]))
            .unwrap();

        let out = &result.predicted_depth[0];
        assert_eq!(out.dim(), (1, 4));
        // bilinear on depth gives [1, 1.5, 2.5, 3] before inverting
        assert_relative_eq!(out[[0, 1]], 1.0 / 1.5, max_relative = 1e-5);
        assert_relative_eq!(out[[0, 2]], 1.0 / 2.5, max_relative = 1e-5);
    }

    #[test]
    fn test_postprocess_length_mismatch() {
        let processor = DepthProImageProcessor::default();
        let depths = vec![Array2::from_elem((2, 2), 1.0f32); 2];

        let err = processor
            .post_process_depth_estimation(&depths, Some(&[60.0][..]), None)
            .unwrap_err();
        assert!(err.to_string().contains("fov values"));

        let err = processor
            .post_process_depth_estimation(&depths, None, Some(&[None][..]))
            .unwrap_err();
        assert!(err.to_string().contains("target sizes"));

        assert!(processor.post_process_depth_estimation(&[], Some(&[60.0][..]), None).is_err());
        assert!(processor.post_process_depth_estimation(&depths, Some(&[][..]), None).is_err());

        let empty = processor.post_process_depth_estimation(&[], Some(&[][..]), Some(&[][..])).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.fov, Some(vec![]));
    }

    #[test]
    fn test_postprocess_rejects_empty_depth_map() {
        let processor = DepthProImageProcessor::default();

        for depth in [Array2::<f32>::zeros((0, 4)), Array2::<f32>::zeros((4, 0))] {
            let err = processor
                .post_process_depth_estimation(&[depth.clone()], None, Some(&[Some((2, 2))][..]))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
            assert!(err.to_string().contains("predicted depth 0"));

            assert!(processor.post_process_depth_estimation(&[depth], None, None).is_err());
        }
    }

    #[test]
    fn test_postprocess_fov_stays_aligned() {
        let processor = DepthProImageProcessor::default();
        let depths = vec![Array2::from_elem((2, 2), 1.0f32); 3];
        let result = processor
            .post_process_depth_estimation(
                &depths,
                Some(&[60.0, 60.0, 90.0][..]),
                Some(&[Some((2, 100)), None, Some((4, 4))][..]),
            )
            .unwrap();

        let fov = result.fov.clone().unwrap();
        assert_eq!(fov.len(), 3);
        assert!(fov[0].is_some());
        assert!(fov[1].is_none());
        assert_relative_eq!(fov[2].unwrap(), 2.0, max_relative = 1e-5);

        let results = result.into_results();
        assert_eq!(results[0].predicted_depth.dim(), (2, 100));
        assert_eq!(results[1].predicted_depth.dim(), (2, 2));
        assert_eq!(results[1].fov, None);
        assert_eq!(results[2].predicted_depth.dim(), (4, 4));
    }

    #[test]
    fn test_postprocess_requires_resample_only_for_resize() {
        let processor = DepthProImageProcessor::new(ImageProcessorConfig {
            resample: None,
            ..Default::default()
        });
        let depths = vec![Array2::from_elem((2, 2), 4.0f32)];

        assert!(processor.post_process_depth_estimation(&depths, None, Some(&[None][..])).is_ok());
        let err = processor
            .post_process_depth_estimation(&depths, None, Some(&[Some((3, 3))][..]))
            .unwrap_err();
        assert!(err.to_string().contains("resample"));
    }
}
