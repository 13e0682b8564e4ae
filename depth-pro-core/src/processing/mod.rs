//! Image preprocessing and depth post-processing for DepthPro.

mod interpolate;
mod processor;
mod transforms;
mod types;

pub use interpolate::resize_chw;
pub use processor::{
    build_transforms, focal_length_from_fov, BatchFeature, DepthEstimation, DepthProImageProcessor,
    DepthResult, ImageProcessorConfig, PreprocessOptions, PreprocessParameters, MODEL_INPUT_NAMES,
    PIXEL_VALUES,
};
pub use transforms::{
    fused_rescale_normalize, image_to_tensor, normalize, rescale, stack_batch, to_channels_first,
    Compose, Conversion, Transform,
};
pub use types::{
    ChannelDimension, ChannelValues, ImageInput, ImageType, Resample, SizeDict, TensorType,
    IMAGENET_STANDARD_MEAN, IMAGENET_STANDARD_STD,
};
