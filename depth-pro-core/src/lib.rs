//! Core types for DepthPro monocular depth estimation.
//!
//! This crate provides the DepthPro model configuration and the image
//! processor that prepares input batches and turns raw depth predictions
//! into final depth maps, without requiring the inference runtime.

mod config;
mod error;
pub mod processing;

pub use config::{DepthProConfig, HiddenAct, ModelSummary, ScaledImageBranch};
pub use error::{Error, Result};
pub use processing::{
    BatchFeature, DepthEstimation, DepthProImageProcessor, DepthResult, ImageInput,
    ImageProcessorConfig, PreprocessOptions, Resample,
};
