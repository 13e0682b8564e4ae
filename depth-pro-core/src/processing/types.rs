//! Parameter and input types for the image processor.

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use ndarray::{Array3, ArrayD};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Mean used by the DepthPro checkpoints.
pub const IMAGENET_STANDARD_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
/// Standard deviation used by the DepthPro checkpoints.
pub const IMAGENET_STANDARD_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Resampling filter, numbered like PIL's `Image.Resampling`.
///
/// `antialias` only changes the result for [`Resample::Bilinear`] and
/// [`Resample::Bicubic`]. Nearest never smooths, and box, hamming and
/// lanczos always use their support-scaled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resample {
    Nearest,
    Lanczos,
    #[default]
    Bilinear,
    Bicubic,
    Box,
    Hamming,
}

impl Resample {
    /// Whether the antialias flag has any effect with this filter.
    pub fn supports_antialias(self) -> bool {
        matches!(self, Resample::Bilinear | Resample::Bicubic)
    }
}

impl TryFrom<u8> for Resample {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Resample::Nearest),
            1 => Ok(Resample::Lanczos),
            2 => Ok(Resample::Bilinear),
            3 => Ok(Resample::Bicubic),
            4 => Ok(Resample::Box),
            5 => Ok(Resample::Hamming),
            other => Err(Error::InvalidResample(other.to_string())),
        }
    }
}

impl From<Resample> for u8 {
    fn from(value: Resample) -> Self {
        match value {
            Resample::Nearest => 0,
            Resample::Lanczos => 1,
            Resample::Bilinear => 2,
            Resample::Bicubic => 3,
            Resample::Box => 4,
            Resample::Hamming => 5,
        }
    }
}

impl FromStr for Resample {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nearest" | "0" => Ok(Resample::Nearest),
            "lanczos" | "1" => Ok(Resample::Lanczos),
            "bilinear" | "linear" | "2" => Ok(Resample::Bilinear),
            "bicubic" | "cubic" | "3" => Ok(Resample::Bicubic),
            "box" | "4" => Ok(Resample::Box),
            "hamming" | "5" => Ok(Resample::Hamming),
            other => Err(Error::InvalidResample(other.to_string())),
        }
    }
}

impl fmt::Display for Resample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resample::Nearest => "nearest",
            Resample::Lanczos => "lanczos",
            Resample::Bilinear => "bilinear",
            Resample::Bicubic => "bicubic",
            Resample::Box => "box",
            Resample::Hamming => "hamming",
        };
        f.write_str(name)
    }
}

/// Position of the channel axis in an image array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDimension {
    /// (channels, height, width)
    #[serde(rename = "channels_first")]
    First,
    /// (height, width, channels)
    #[serde(rename = "channels_last")]
    Last,
    /// (height, width)
    #[serde(rename = "none")]
    None,
}

impl FromStr for ChannelDimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "channels_first" | "first" => Ok(ChannelDimension::First),
            "channels_last" | "last" => Ok(ChannelDimension::Last),
            "none" => Ok(ChannelDimension::None),
            other => Err(Error::invalid_argument(format!("unknown channel dimension format '{other}'"))),
        }
    }
}

/// Tensor backend requested for the processor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TensorType {
    /// `ndarray` arrays, the only backend this crate produces.
    #[default]
    Ndarray,
    Pytorch,
    Tensorflow,
    Jax,
}

impl TensorType {
    pub fn is_supported(self) -> bool {
        matches!(self, TensorType::Ndarray)
    }
}

impl FromStr for TensorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "np" | "ndarray" => Ok(TensorType::Ndarray),
            "pt" => Ok(TensorType::Pytorch),
            "tf" => Ok(TensorType::Tensorflow),
            "jax" => Ok(TensorType::Jax),
            other => Err(Error::invalid_argument(format!("unknown tensor type '{other}'"))),
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TensorType::Ndarray => "np",
            TensorType::Pytorch => "pt",
            TensorType::Tensorflow => "tf",
            TensorType::Jax => "jax",
        };
        f.write_str(name)
    }
}

/// Target size for resizing.
///
/// Deserializes from either `{"height": H, "width": W}` or a bare integer
/// meaning a square size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub struct SizeDict {
    pub height: Option<usize>,
    pub width: Option<usize>,
}

impl SizeDict {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height: Some(height),
            width: Some(width),
        }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// `(height, width)` when both are set.
    pub fn dims(&self) -> Option<(usize, usize)> {
        self.height.zip(self.width)
    }
}

impl<'de> Deserialize<'de> for SizeDict {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};

        struct SizeDictVisitor;

        impl<'de> Visitor<'de> for SizeDictVisitor {
            type Value = SizeDict;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an integer or a dict with height/width")
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(SizeDict::square(value as usize))
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                let value = usize::try_from(value)
                    .map_err(|_| E::custom(format!("size must be non-negative, got {value}")))?;
                Ok(SizeDict::square(value))
            }

            fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut size = SizeDict::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "height" => size.height = map.next_value()?,
                        "width" => size.width = map.next_value()?,
                        _ => {
                            let _ = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(size)
            }
        }

        deserializer.deserialize_any(SizeDictVisitor)
    }
}

/// Mean or standard deviation: one value for every channel, or one per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValues {
    Scalar(f32),
    PerChannel(Vec<f32>),
}

impl ChannelValues {
    /// Expand to exactly `channels` values.
    pub fn resolve(&self, channels: usize, name: &str) -> Result<Vec<f32>> {
        match self {
            ChannelValues::Scalar(v) => Ok(vec![*v; channels]),
            ChannelValues::PerChannel(values) if values.len() == channels => Ok(values.clone()),
            ChannelValues::PerChannel(values) if values.len() == 1 => Ok(vec![values[0]; channels]),
            ChannelValues::PerChannel(values) => Err(Error::invalid_argument(format!(
                "{name} has {} values but the image has {channels} channels",
                values.len()
            ))),
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            ChannelValues::Scalar(v) => std::slice::from_ref(v),
            ChannelValues::PerChannel(values) => values,
        }
    }
}

impl From<f32> for ChannelValues {
    fn from(value: f32) -> Self {
        ChannelValues::Scalar(value)
    }
}

impl From<Vec<f32>> for ChannelValues {
    fn from(values: Vec<f32>) -> Self {
        ChannelValues::PerChannel(values)
    }
}

impl From<[f32; 3]> for ChannelValues {
    fn from(values: [f32; 3]) -> Self {
        ChannelValues::PerChannel(values.to_vec())
    }
}

/// Kind of image handed to `preprocess`, detected from the first image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// A decoded `image::DynamicImage`.
    Image,
    /// A raw numeric array, channels-last unless told otherwise.
    Array,
    /// A channel-first tensor.
    Tensor,
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageType::Image => "image",
            ImageType::Array => "array",
            ImageType::Tensor => "tensor",
        };
        f.write_str(name)
    }
}

/// One input image.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Image(DynamicImage),
    Array(ArrayD<f32>),
    Tensor(ArrayD<f32>),
}

impl ImageInput {
    /// Detect the image type, rejecting arrays that cannot hold an image.
    pub fn image_type(&self) -> Result<ImageType> {
        let (kind, shape) = match self {
            ImageInput::Image(img) => {
                if img.width() == 0 || img.height() == 0 {
                    return Err(Error::invalid_argument("unsupported input image: image has no pixels"));
                }
                return Ok(ImageType::Image);
            }
            ImageInput::Array(array) => (ImageType::Array, array.shape()),
            ImageInput::Tensor(tensor) => (ImageType::Tensor, tensor.shape()),
        };

        if !matches!(shape.len(), 2 | 3) {
            return Err(Error::invalid_argument(format!(
                "unsupported input image type: {kind} with {} dimensions (shape {shape:?})",
                shape.len()
            )));
        }
        if shape.contains(&0) {
            return Err(Error::invalid_argument(format!(
                "unsupported input image: {kind} of shape {shape:?} has no pixels"
            )));
        }
        Ok(kind)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        ImageInput::Image(image)
    }
}

impl From<Array3<u8>> for ImageInput {
    /// Raw 8-bit array in (height, width, channels) order.
    fn from(array: Array3<u8>) -> Self {
        ImageInput::Array(array.mapv(f32::from).into_dyn())
    }
}
