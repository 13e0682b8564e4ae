//! Separable resampling of channel-first tensors.
//!
//! Every filter is expressed as a list of source taps per output coordinate,
//! computed once per axis and applied horizontally then vertically.
//!
//! - Nearest, bilinear and bicubic without antialias follow the
//!   `align_corners = false` pixel-center convention of
//!   `torch.nn.functional.interpolate` (bicubic uses Keys with `a = -0.75`).
//! - Antialiased bilinear / bicubic and the box, hamming and lanczos filters
//!   stretch the kernel support by the downscale factor and renormalize the
//!   weights, the way PIL resamples (bicubic uses `a = -0.5` here).

use std::f64::consts::PI;

use ndarray::{Array3, ArrayView3};

use super::types::Resample;

/// Source index and weight pairs contributing to one output coordinate.
type Taps = Vec<(usize, f32)>;

/// Resize a `[C, H, W]` tensor to `[C, height, width]`.
pub fn resize_chw(
    input: ArrayView3<f32>,
    height: usize,
    width: usize,
    resample: Resample,
    antialias: bool,
) -> Array3<f32> {
    let (channels, in_h, in_w) = input.dim();
    if in_h == height && in_w == width {
        return input.to_owned();
    }
    // nothing to sample from
    if in_h == 0 || in_w == 0 {
        return Array3::zeros((channels, height, width));
    }

    let row_taps = axis_taps(in_h, height, resample, antialias);
    let col_taps = axis_taps(in_w, width, resample, antialias);

    let horizontal = Array3::from_shape_fn((channels, in_h, width), |(c, y, x)| {
        col_taps[x]
            .iter()
            .map(|&(j, w)| input[[c, y, j]] * w)
            .sum::<f32>()
    });

    Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        row_taps[y]
            .iter()
            .map(|&(i, w)| horizontal[[c, i, x]] * w)
            .sum::<f32>()
    })
}

fn axis_taps(in_len: usize, out_len: usize, resample: Resample, antialias: bool) -> Vec<Taps> {
    let scale = in_len as f64 / out_len as f64;
    match resample {
        Resample::Nearest => (0..out_len)
            .map(|i| {
                let src = ((i as f64 * scale).floor() as usize).min(in_len - 1);
                vec![(src, 1.0)]
            })
            .collect(),
        Resample::Bilinear if !antialias => (0..out_len)
            .map(|i| linear_taps(i, scale, in_len))
            .collect(),
        Resample::Bicubic if !antialias => (0..out_len)
            .map(|i| cubic_taps(i, scale, in_len))
            .collect(),
        _ => {
            let kernel = Kernel::for_resample(resample);
            (0..out_len)
                .map(|i| kernel_taps(i, scale, in_len, kernel))
                .collect()
        }
    }
}

fn linear_taps(i: usize, scale: f64, in_len: usize) -> Taps {
    // negative source coordinates clamp to the first pixel
    let src = ((i as f64 + 0.5) * scale - 0.5).max(0.0);
    let i0 = (src.floor() as usize).min(in_len - 1);
    let i1 = (i0 + 1).min(in_len - 1);
    let lambda = (src - i0 as f64).min(1.0) as f32;
    vec![(i0, 1.0 - lambda), (i1, lambda)]
}

fn cubic_taps(i: usize, scale: f64, in_len: usize) -> Taps {
    const A: f64 = -0.75;

    let src = (i as f64 + 0.5) * scale - 0.5;
    let base = src.floor();
    let t = src - base;
    let weights = [
        keys_far(t + 1.0, A),
        keys_near(t, A),
        keys_near(1.0 - t, A),
        keys_far(2.0 - t, A),
    ];

    let last = in_len as isize - 1;
    weights
        .iter()
        .enumerate()
        .map(|(k, &w)| {
            let idx = (base as isize - 1 + k as isize).clamp(0, last) as usize;
            (idx, w as f32)
        })
        .collect()
}

fn kernel_taps(i: usize, scale: f64, in_len: usize, kernel: Kernel) -> Taps {
    let support = kernel.support() * scale.max(1.0);
    let inv_scale = if scale >= 1.0 { 1.0 / scale } else { 1.0 };
    let center = scale * (i as f64 + 0.5);

    let start = (center - support + 0.5).floor().max(0.0) as usize;
    let end = ((center + support + 0.5).floor().max(0.0) as usize).min(in_len);

    let weights: Vec<(usize, f64)> = (start..end)
        .map(|j| (j, kernel.eval((j as f64 - center + 0.5) * inv_scale)))
        .collect();
    let total: f64 = weights.iter().map(|(_, w)| w).sum();

    if total.abs() < f64::EPSILON {
        let nearest = (center.floor() as usize).min(in_len - 1);
        return vec![(nearest, 1.0)];
    }

    weights
        .into_iter()
        .map(|(j, w)| (j, (w / total) as f32))
        .collect()
}

/// Keys cubic convolution for |x| <= 1.
fn keys_near(x: f64, a: f64) -> f64 {
    ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0
}

/// Keys cubic convolution for 1 < |x| < 2.
fn keys_far(x: f64, a: f64) -> f64 {
    ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let x = x * PI;
        x.sin() / x
    }
}

#[derive(Debug, Clone, Copy)]
enum Kernel {
    Box,
    Triangle,
    Cubic,
    Hamming,
    Lanczos,
}

impl Kernel {
    fn for_resample(resample: Resample) -> Self {
        match resample {
            Resample::Box => Kernel::Box,
            Resample::Bilinear => Kernel::Triangle,
            Resample::Bicubic => Kernel::Cubic,
            Resample::Hamming => Kernel::Hamming,
            Resample::Lanczos => Kernel::Lanczos,
            // never reached: nearest has its own taps
            Resample::Nearest => Kernel::Box,
        }
    }

    fn support(self) -> f64 {
        match self {
            Kernel::Box => 0.5,
            Kernel::Triangle | Kernel::Hamming => 1.0,
            Kernel::Cubic => 2.0,
            Kernel::Lanczos => 3.0,
        }
    }

    fn eval(self, x: f64) -> f64 {
        match self {
            Kernel::Box => {
                if x > -0.5 && x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Kernel::Triangle => (1.0 - x.abs()).max(0.0),
            Kernel::Cubic => {
                const A: f64 = -0.5;
                let x = x.abs();
                if x < 1.0 {
                    keys_near(x, A)
                } else if x < 2.0 {
                    keys_far(x, A)
                } else {
                    0.0
                }
            }
            Kernel::Hamming => {
                if x.abs() >= 1.0 {
                    0.0
                } else {
                    sinc(x) * (0.54 + 0.46 * (PI * x).cos())
                }
            }
            Kernel::Lanczos => {
                if x.abs() >= 3.0 {
                    0.0
                } else {
                    sinc(x) * sinc(x / 3.0)
                }
            }
        }
    }
}
