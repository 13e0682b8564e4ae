//! Tensor conversion and the ordered transform pipeline.

use image::{DynamicImage, ImageBuffer, Pixel};
use ndarray::{s, Array3, Array4, ArrayD, ArrayView3, Axis, Ix3};
use tracing::trace;

use super::interpolate::resize_chw;
use super::types::{ChannelDimension, ChannelValues, ImageInput, ImageType, Resample};
use crate::error::{Error, Result};

/// Convert a decoded image to a `[C, H, W]` f32 tensor.
///
/// The native channel count and sample range are kept: 8-bit images stay in
/// `0..=255`, 16-bit in `0..=65535`, float images as stored.
pub fn image_to_tensor(image: &DynamicImage) -> Result<Array3<f32>> {
    match image {
        DynamicImage::ImageLuma8(buf) => buffer_to_chw(buf),
        DynamicImage::ImageLumaA8(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgb8(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgba8(buf) => buffer_to_chw(buf),
        DynamicImage::ImageLuma16(buf) => buffer_to_chw(buf),
        DynamicImage::ImageLumaA16(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgb16(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgba16(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgb32F(buf) => buffer_to_chw(buf),
        DynamicImage::ImageRgba32F(buf) => buffer_to_chw(buf),
        other => buffer_to_chw(&other.to_rgb8()),
    }
}

fn buffer_to_chw<P>(buf: &ImageBuffer<P, Vec<P::Subpixel>>) -> Result<Array3<f32>>
where
    P: Pixel,
    P::Subpixel: Into<f32>,
{
    let (width, height) = buf.dimensions();
    let shape = (height as usize, width as usize, P::CHANNEL_COUNT as usize);
    let hwc = ArrayView3::from_shape(shape, buf.as_raw().as_slice())?;
    Ok(hwc
        .mapv(|v| -> f32 { v.into() })
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned())
}

/// Bring a 2-D or 3-D array into `[C, H, W]` order.
///
/// 2-D arrays get a single leading channel axis whatever `format` says.
pub fn to_channels_first(array: &ArrayD<f32>, format: ChannelDimension) -> Result<Array3<f32>> {
    match array.ndim() {
        2 => Ok(array.clone().insert_axis(Axis(0)).into_dimensionality::<Ix3>()?),
        3 => {
            let chw = array.clone().into_dimensionality::<Ix3>()?;
            match format {
                ChannelDimension::First => Ok(chw),
                ChannelDimension::Last => Ok(chw.permuted_axes([2, 0, 1]).as_standard_layout().into_owned()),
                ChannelDimension::None => Err(Error::invalid_argument(format!(
                    "3-D array of shape {:?} cannot use channel format 'none'",
                    array.shape()
                ))),
            }
        }
        n => Err(Error::invalid_argument(format!(
            "unsupported input image type: array with {n} dimensions"
        ))),
    }
}

/// `x * factor`
pub fn rescale(tensor: &mut Array3<f32>, factor: f32) {
    tensor.mapv_inplace(|v| v * factor);
}

/// `(x - mean[c]) / std[c]`
pub fn normalize(tensor: &mut Array3<f32>, mean: &[f32], std: &[f32]) {
    fused_rescale_normalize(tensor, mean, std, 1.0);
}

/// `(x * factor - mean[c]) / std[c]` in one pass.
///
/// Folded into `x * alpha + beta` with `alpha = factor / std` and
/// `beta = -mean / std`.
pub fn fused_rescale_normalize(tensor: &mut Array3<f32>, mean: &[f32], std: &[f32], factor: f32) {
    for (c, mut plane) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        let alpha = factor / std[c];
        let beta = -mean[c] / std[c];
        plane.mapv_inplace(|v| v * alpha + beta);
    }
}

/// Stack equally shaped `[C, H, W]` tensors into `[N, C, H, W]`.
pub fn stack_batch(tensors: &[Array3<f32>]) -> Result<Array4<f32>> {
    let Some(first) = tensors.first() else {
        return Err(Error::invalid_argument("cannot stack an empty batch"));
    };
    let (c, h, w) = first.dim();

    for (i, tensor) in tensors.iter().enumerate().skip(1) {
        if tensor.dim() != (c, h, w) {
            return Err(Error::invalid_argument(format!(
                "image {i} has shape {:?}, expected [{c}, {h}, {w}]; set do_resize to batch differently sized images",
                tensor.shape()
            )));
        }
    }

    let mut batch = Array4::<f32>::zeros((tensors.len(), c, h, w));
    for (i, tensor) in tensors.iter().enumerate() {
        batch.slice_mut(s![i, .., .., ..]).assign(tensor);
    }
    Ok(batch)
}

/// How an input is turned into a channel-first tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    ImageToTensor,
    ArrayToTensor,
}

/// One tensor-to-tensor step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Rescale {
        factor: f32,
    },
    Normalize {
        mean: ChannelValues,
        std: ChannelValues,
    },
    FusedRescaleNormalize {
        mean: ChannelValues,
        std: ChannelValues,
        factor: f32,
    },
    Resize {
        height: usize,
        width: usize,
        resample: Resample,
        antialias: bool,
    },
}

impl Transform {
    pub fn apply(&self, mut tensor: Array3<f32>) -> Result<Array3<f32>> {
        let channels = tensor.dim().0;
        match self {
            Transform::Rescale { factor } => rescale(&mut tensor, *factor),
            Transform::Normalize { mean, std } => {
                let mean = mean.resolve(channels, "image_mean")?;
                let std = std.resolve(channels, "image_std")?;
                normalize(&mut tensor, &mean, &std);
            }
            Transform::FusedRescaleNormalize { mean, std, factor } => {
                let mean = mean.resolve(channels, "image_mean")?;
                let std = std.resolve(channels, "image_std")?;
                fused_rescale_normalize(&mut tensor, &mean, &std, *factor);
            }
            Transform::Resize {
                height,
                width,
                resample,
                antialias,
            } => {
                // antialias has no meaning outside bilinear / bicubic
                let antialias = *antialias && resample.supports_antialias();
                tensor = resize_chw(tensor.view(), *height, *width, *resample, antialias);
            }
        }
        Ok(tensor)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Rescale { .. } => "rescale",
            Transform::Normalize { .. } => "normalize",
            Transform::FusedRescaleNormalize { .. } => "rescale_normalize",
            Transform::Resize { .. } => "resize",
        }
    }
}

/// Conversion followed by the ordered tensor transforms for one image type.
#[derive(Debug, Clone, PartialEq)]
pub struct Compose {
    image_type: ImageType,
    input_format: Option<ChannelDimension>,
    transforms: Vec<Transform>,
}

impl Compose {
    pub fn new(
        image_type: ImageType,
        input_format: Option<ChannelDimension>,
        transforms: Vec<Transform>,
    ) -> Self {
        Self {
            image_type,
            input_format,
            transforms,
        }
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// Leading conversion, `None` for inputs that already are tensors.
    pub fn conversion(&self) -> Option<Conversion> {
        match self.image_type {
            ImageType::Image => Some(Conversion::ImageToTensor),
            ImageType::Array => Some(Conversion::ArrayToTensor),
            ImageType::Tensor => None,
        }
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Step names in execution order, conversion included.
    pub fn step_names(&self) -> Vec<&'static str> {
        let conversion = self.conversion().map(|c| match c {
            Conversion::ImageToTensor => "image_to_tensor",
            Conversion::ArrayToTensor => "array_to_tensor",
        });
        conversion
            .into_iter()
            .chain(self.transforms.iter().map(Transform::name))
            .collect()
    }

    pub fn apply(&self, input: &ImageInput) -> Result<Array3<f32>> {
        let mut tensor = match (self.image_type, input) {
            (ImageType::Image, ImageInput::Image(image)) => image_to_tensor(image)?,
            (ImageType::Array, ImageInput::Array(array)) => {
                to_channels_first(array, self.input_format.unwrap_or(ChannelDimension::Last))?
            }
            (ImageType::Tensor, ImageInput::Tensor(tensor)) => {
                to_channels_first(tensor, self.input_format.unwrap_or(ChannelDimension::First))?
            }
            (expected, other) => {
                return Err(Error::invalid_argument(format!(
                    "transforms built for {expected} inputs cannot process {}",
                    other.image_type()?
                )));
            }
        };

        for transform in &self.transforms {
            trace!(step = transform.name(), shape = ?tensor.shape(), "applying transform");
            tensor = transform.apply(tensor)?;
        }
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use image::{GrayImage, Luma, Rgb, Rgb32FImage, RgbImage};

    fn gradient(c: usize, h: usize, w: usize) -> Array3<f32> {
        Array3::from_shape_fn((c, h, w), |(c, y, x)| (c * 50 + y * 7 + x * 3) as f32)
    }

    #[test]
    fn test_image_to_tensor_keeps_range() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 128, 7]));
        let tensor = image_to_tensor(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(tensor.shape(), &[3, 2, 3]);
        assert_eq!(tensor[[0, 1, 2]], 255.0);
        assert_eq!(tensor[[1, 1, 2]], 128.0);
        assert_eq!(tensor[[2, 1, 2]], 7.0);
        assert_eq!(tensor[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_image_to_tensor_grayscale_and_float() {
        let gray = GrayImage::from_pixel(4, 3, Luma([9]));
        let tensor = image_to_tensor(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4]);

        let float = Rgb32FImage::from_pixel(2, 2, Rgb([0.25, 0.5, 0.75]));
        let tensor = image_to_tensor(&DynamicImage::ImageRgb32F(float)).unwrap();
        assert_eq!(tensor[[2, 1, 1]], 0.75);
    }

    #[test]
    fn test_to_channels_first() {
        let hwc = Array3::from_shape_fn((2, 3, 3), |(y, x, c)| (y * 100 + x * 10 + c) as f32).into_dyn();
        let chw = to_channels_first(&hwc, ChannelDimension::Last).unwrap();
        assert_eq!(chw.shape(), &[3, 2, 3]);
        assert_eq!(chw[[2, 1, 0]], 102.0);

        let same = to_channels_first(&hwc, ChannelDimension::First).unwrap();
        assert_eq!(same.shape(), &[2, 3, 3]);

        let gray = ArrayD::<f32>::zeros(vec![5, 4]);
        assert_eq!(to_channels_first(&gray, ChannelDimension::Last).unwrap().shape(), &[1, 5, 4]);

        assert!(to_channels_first(&hwc, ChannelDimension::None).is_err());
    }

    #[test]
    fn test_fused_matches_separate() {
        let stats = [
            (ChannelValues::Scalar(0.5), ChannelValues::Scalar(0.5)),
            (
                ChannelValues::from([0.485f32, 0.456, 0.406]),
                ChannelValues::from([0.229f32, 0.224, 0.225]),
            ),
            (ChannelValues::from([0.5f32, 0.4, 0.3]), ChannelValues::Scalar(0.2)),
            (ChannelValues::Scalar(-1.0), ChannelValues::from(vec![2.0f32])),
        ];
        let factors: [f32; 5] = [1.0 / 255.0, 1.0 / 65535.0, 0.5, 1.0, 3.0];

        for (mean, std) in &stats {
            for &factor in &factors {
                let fused = Transform::FusedRescaleNormalize {
                    mean: mean.clone(),
                    std: std.clone(),
                    factor,
                }
                .apply(gradient(3, 4, 5))
                .unwrap();

                let rescaled = Transform::Rescale { factor }.apply(gradient(3, 4, 5)).unwrap();
                let separate = Transform::Normalize {
                    mean: mean.clone(),
                    std: std.clone(),
                }
                .apply(rescaled)
                .unwrap();

                for (a, b) in fused.iter().zip(separate.iter()) {
                    assert_relative_eq!(*a, *b, epsilon = 1e-4, max_relative = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_normalize_values() {
        let mut tensor = Array3::from_elem((3, 1, 1), 255.0f32);
        fused_rescale_normalize(&mut tensor, &[0.5; 3], &[0.5; 3], 1.0 / 255.0);
        for v in tensor.iter() {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_stack_batch() {
        let batch = stack_batch(&[gradient(3, 2, 2), gradient(3, 2, 2)]).unwrap();
        assert_eq!(batch.shape(), &[2, 3, 2, 2]);
        assert_eq!(batch[[1, 2, 1, 1]], gradient(3, 2, 2)[[2, 1, 1]]);

        assert!(stack_batch(&[]).is_err());
        let err = stack_batch(&[gradient(3, 2, 2), gradient(3, 4, 2)]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_compose_order_and_output() {
        let compose = Compose::new(
            ImageType::Array,
            None,
            vec![
                Transform::FusedRescaleNormalize {
                    mean: ChannelValues::Scalar(0.5),
                    std: ChannelValues::Scalar(0.5),
                    factor: 1.0 / 255.0,
                },
                Transform::Resize {
                    height: 4,
                    width: 6,
                    resample: Resample::Bilinear,
                    antialias: false,
                },
            ],
        );
        assert_eq!(compose.step_names(), vec!["array_to_tensor", "rescale_normalize", "resize"]);

        let input = ImageInput::Array(ArrayD::from_elem(vec![2, 3, 3], 255.0));
        let output = compose.apply(&input).unwrap();
        assert_eq!(output.shape(), &[3, 4, 6]);
        for v in output.iter() {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_compose_rejects_other_input_kind() {
        let compose = Compose::new(ImageType::Tensor, None, Vec::new());
        assert_eq!(compose.conversion(), None);

        let input = ImageInput::Array(ArrayD::zeros(vec![2, 2, 3]));
        assert!(compose.apply(&input).is_err());
    }

    #[test]
    fn test_per_channel_length_mismatch() {
        let transform = Transform::Normalize {
            mean: ChannelValues::PerChannel(vec![0.5, 0.5, 0.5]),
            std: ChannelValues::Scalar(0.5),
        };
        assert!(transform.apply(gradient(1, 2, 2)).is_err());
        assert!(transform.apply(gradient(3, 2, 2)).is_ok());
    }
}
