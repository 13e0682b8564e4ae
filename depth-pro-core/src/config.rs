//! DepthPro model configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Activation used inside the encoder MLPs.
///
/// Names without a dedicated variant are kept verbatim in
/// [`HiddenAct::Other`] and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum HiddenAct {
    #[default]
    Gelu,
    GeluNew,
    GeluPytorchTanh,
    GeluFast,
    Relu,
    Selu,
    Silu,
    Tanh,
    QuickGelu,
    Other(String),
}

impl FromStr for HiddenAct {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        match name.to_lowercase().as_str() {
            "" => Err(Error::InvalidActivation(s.to_string())),
            "gelu" => Ok(HiddenAct::Gelu),
            "gelu_new" => Ok(HiddenAct::GeluNew),
            "gelu_pytorch_tanh" => Ok(HiddenAct::GeluPytorchTanh),
            "gelu_fast" => Ok(HiddenAct::GeluFast),
            "relu" => Ok(HiddenAct::Relu),
            "selu" => Ok(HiddenAct::Selu),
            "silu" | "swish" => Ok(HiddenAct::Silu),
            "tanh" => Ok(HiddenAct::Tanh),
            "quick_gelu" => Ok(HiddenAct::QuickGelu),
            _ => Ok(HiddenAct::Other(name.to_string())),
        }
    }
}

impl TryFrom<String> for HiddenAct {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HiddenAct> for String {
    fn from(value: HiddenAct) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HiddenAct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HiddenAct::Gelu => "gelu",
            HiddenAct::GeluNew => "gelu_new",
            HiddenAct::GeluPytorchTanh => "gelu_pytorch_tanh",
            HiddenAct::GeluFast => "gelu_fast",
            HiddenAct::Relu => "relu",
            HiddenAct::Selu => "selu",
            HiddenAct::Silu => "silu",
            HiddenAct::Tanh => "tanh",
            HiddenAct::QuickGelu => "quick_gelu",
            HiddenAct::Other(name) => name.as_str(),
        };
        f.write_str(name)
    }
}

/// DepthPro architecture hyperparameters.
///
/// Field names and defaults follow the HuggingFace `config.json` of
/// `apple/DepthPro`. Keys this struct does not know about are kept in
/// [`DepthProConfig::extra`] and written back on serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthProConfig {
    pub model_type: String,

    // Encoder
    pub hidden_size: usize,
    pub fusion_hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub mlp_ratio: usize,
    pub hidden_act: HiddenAct,
    pub hidden_dropout_prob: f32,
    pub attention_probs_dropout_prob: f32,
    pub initializer_range: f32,
    pub layer_norm_eps: f64,
    pub qkv_bias: bool,
    pub layerscale_value: f32,
    pub drop_path_rate: f32,
    pub use_swiglu_ffn: bool,

    // Inputs
    pub image_size: usize,
    pub patch_size: usize,
    pub num_channels: usize,
    pub patch_embeddings_size: usize,

    // Backbone outputs
    pub apply_layernorm: bool,
    pub reshape_hidden_states: bool,

    // One entry per tapped encoder layer.
    pub intermediate_hook_ids: Vec<usize>,
    pub intermediate_feature_dims: Vec<usize>,

    // One entry per multi-scale image branch.
    pub scaled_images_ratios: Vec<f32>,
    pub scaled_images_overlap_ratios: Vec<f32>,
    pub scaled_images_feature_dims: Vec<usize>,

    // Heads
    pub use_batch_norm_in_fusion: bool,
    pub use_fov_model: bool,
    pub num_fov_head_layers: usize,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for DepthProConfig {
    fn default() -> Self {
        Self {
            model_type: "depth_pro".to_string(),
            hidden_size: 1024,
            fusion_hidden_size: 256,
            num_hidden_layers: 24,
            num_attention_heads: 16,
            mlp_ratio: 4,
            hidden_act: HiddenAct::Gelu,
            hidden_dropout_prob: 0.0,
            attention_probs_dropout_prob: 0.0,
            initializer_range: 0.02,
            layer_norm_eps: 1e-6,
            qkv_bias: true,
            layerscale_value: 1.0,
            drop_path_rate: 0.0,
            use_swiglu_ffn: false,
            image_size: 1536,
            patch_size: 384,
            num_channels: 3,
            patch_embeddings_size: 16,
            apply_layernorm: true,
            reshape_hidden_states: true,
            intermediate_hook_ids: vec![11, 5],
            intermediate_feature_dims: vec![256, 256],
            scaled_images_ratios: vec![0.25, 0.5, 1.0],
            scaled_images_overlap_ratios: vec![0.0, 0.5, 0.25],
            scaled_images_feature_dims: vec![1024, 1024, 512],
            use_batch_norm_in_fusion: false,
            use_fov_model: true,
            num_fov_head_layers: 2,
            extra: HashMap::new(),
        }
    }
}

impl DepthProConfig {
    /// Load a config from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading DepthPro config");
        let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: DepthProConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a config from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: DepthProConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON, including any pass-through keys.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the tapped encoder layers and their fusion feature dims.
    pub fn with_intermediate_hooks(mut self, hook_ids: Vec<usize>, feature_dims: Vec<usize>) -> Result<Self> {
        self.intermediate_hook_ids = hook_ids;
        self.intermediate_feature_dims = feature_dims;
        self.validate_intermediate_hooks()?;
        Ok(self)
    }

    /// Replace the multi-scale image branches.
    pub fn with_scaled_images(
        mut self,
        ratios: Vec<f32>,
        overlap_ratios: Vec<f32>,
        feature_dims: Vec<usize>,
    ) -> Result<Self> {
        self.scaled_images_ratios = ratios;
        self.scaled_images_overlap_ratios = overlap_ratios;
        self.scaled_images_feature_dims = feature_dims;
        self.validate_scaled_images()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_hidden_layers == 0 {
            return Err(Error::Validation("num_hidden_layers must be > 0".to_string()));
        }
        if self.num_attention_heads == 0 {
            return Err(Error::Validation("num_attention_heads must be > 0".to_string()));
        }
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(Error::Validation(format!(
                "hidden_size ({}) must be divisible by num_attention_heads ({})",
                self.hidden_size, self.num_attention_heads
            )));
        }

        for (name, value) in [
            ("hidden_dropout_prob", self.hidden_dropout_prob),
            ("attention_probs_dropout_prob", self.attention_probs_dropout_prob),
            ("drop_path_rate", self.drop_path_rate),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(Error::Validation(format!("{name} must be in [0, 1), got {value}")));
            }
        }

        if self.patch_embeddings_size == 0 || self.patch_size % self.patch_embeddings_size != 0 {
            return Err(Error::Validation(format!(
                "patch_size ({}) must be a multiple of patch_embeddings_size ({})",
                self.patch_size, self.patch_embeddings_size
            )));
        }

        self.validate_intermediate_hooks()?;
        self.validate_scaled_images()
    }

    fn validate_intermediate_hooks(&self) -> Result<()> {
        if self.intermediate_hook_ids.len() != self.intermediate_feature_dims.len() {
            return Err(Error::Validation(format!(
                "intermediate_hook_ids ({}) and intermediate_feature_dims ({}) must have the same length",
                self.intermediate_hook_ids.len(),
                self.intermediate_feature_dims.len()
            )));
        }
        if let Some(&id) = self
            .intermediate_hook_ids
            .iter()
            .find(|&&id| id >= self.num_hidden_layers)
        {
            return Err(Error::Validation(format!(
                "intermediate hook id {id} is out of range for {} hidden layers",
                self.num_hidden_layers
            )));
        }
        Ok(())
    }

    fn validate_scaled_images(&self) -> Result<()> {
        let ratios = self.scaled_images_ratios.len();
        let overlaps = self.scaled_images_overlap_ratios.len();
        let dims = self.scaled_images_feature_dims.len();
        if ratios != overlaps || ratios != dims {
            return Err(Error::Validation(format!(
                "scaled_images_ratios ({ratios}), scaled_images_overlap_ratios ({overlaps}) and \
                 scaled_images_feature_dims ({dims}) must have the same length"
            )));
        }

        for (&ratio, &overlap) in self
            .scaled_images_ratios
            .iter()
            .zip(self.scaled_images_overlap_ratios.iter())
        {
            if ratio <= 0.0 {
                return Err(Error::Validation(format!("scaled image ratio must be > 0, got {ratio}")));
            }
            if !(0.0..1.0).contains(&overlap) {
                return Err(Error::Validation(format!(
                    "scaled image overlap ratio must be in [0, 1), got {overlap}"
                )));
            }
            let branch = self.branch(ratio, overlap);
            if branch.image_size < self.patch_size || branch.stride == 0 {
                return Err(Error::Validation(format!(
                    "scaled image of size {} (ratio {ratio}, overlap {overlap}) cannot be split into {} pixel patches",
                    branch.image_size, self.patch_size
                )));
            }
        }
        Ok(())
    }

    /// Get the attention head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Side length of the patch embedding grid of one encoder input.
    pub fn patch_grid_size(&self) -> usize {
        self.patch_size / self.patch_embeddings_size
    }

    /// Tokens produced by the encoder for one patch, class token included.
    pub fn tokens_per_patch(&self) -> usize {
        self.patch_grid_size().pow(2) + 1
    }

    fn branch(&self, ratio: f32, overlap: f32) -> ScaledImageBranch {
        let image_size = (self.image_size as f32 * ratio).floor() as usize;
        let stride = (self.patch_size as f32 * (1.0 - overlap)) as usize;
        let patches_per_side = if image_size >= self.patch_size && stride > 0 {
            (image_size - self.patch_size) / stride + 1
        } else {
            0
        };
        ScaledImageBranch {
            ratio,
            overlap_ratio: overlap,
            image_size,
            stride,
            num_patches: patches_per_side * patches_per_side,
        }
    }

    /// Geometry of every multi-scale image branch, in config order.
    pub fn scaled_image_branches(&self) -> Vec<ScaledImageBranch> {
        self.scaled_images_ratios
            .iter()
            .zip(self.scaled_images_overlap_ratios.iter())
            .map(|(&ratio, &overlap)| self.branch(ratio, overlap))
            .collect()
    }

    /// Intermediate size of the encoder MLP.
    pub fn mlp_hidden_size(&self) -> usize {
        let hidden = self.hidden_size * self.mlp_ratio;
        if self.use_swiglu_ffn {
            (hidden * 2 / 3).div_ceil(8) * 8
        } else {
            hidden
        }
    }

    /// Compute a summary of the encoder geometry and parameter count.
    pub fn compute_summary(&self) -> ModelSummary {
        let h = self.hidden_size;
        let grid = self.patch_grid_size();
        let tokens_per_patch = self.tokens_per_patch();

        // Conv patch embedding + class token + learned position embedding
        let patch_embed_params = self.num_channels * h * self.patch_embeddings_size.pow(2)
            + h
            + h
            + tokens_per_patch * h;

        let bias = |n: usize| if self.qkv_bias { n } else { 0 };
        let attention_params = 3 * h * h + bias(3 * h) + h * h + h;

        let mlp_hidden = self.mlp_hidden_size();
        let mlp_params = if self.use_swiglu_ffn {
            h * 2 * mlp_hidden + 2 * mlp_hidden + mlp_hidden * h + h
        } else {
            h * mlp_hidden + mlp_hidden + mlp_hidden * h + h
        };

        // Two layer norms (weight + bias) and two layer scales
        let norm_params = 4 * h;
        let layer_scale_params = 2 * h;

        let params_per_layer = attention_params + mlp_params + norm_params + layer_scale_params;
        let encoder_params =
            patch_embed_params + params_per_layer * self.num_hidden_layers + 2 * h;

        let branches = self.scaled_image_branches();
        let patches_per_image = branches.iter().map(|b| b.num_patches).sum();

        ModelSummary {
            hidden_size: h,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            head_dim: self.head_dim(),
            mlp_hidden_size: mlp_hidden,
            hidden_act: self.hidden_act.clone(),
            image_size: self.image_size,
            patch_size: self.patch_size,
            patch_grid_size: grid,
            tokens_per_patch,
            branches,
            patches_per_image,
            patch_embed_params,
            params_per_layer,
            encoder_params,
            use_fov_model: self.use_fov_model,
        }
    }
}

/// One multi-scale branch: the input image is resized by `ratio` and split
/// into `patch_size` tiles with the given overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledImageBranch {
    pub ratio: f32,
    pub overlap_ratio: f32,
    pub image_size: usize,
    pub stride: usize,
    pub num_patches: usize,
}

/// Summary of the encoder architecture.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub head_dim: usize,
    pub mlp_hidden_size: usize,
    pub hidden_act: HiddenAct,
    pub image_size: usize,
    pub patch_size: usize,
    pub patch_grid_size: usize,
    pub tokens_per_patch: usize,
    pub branches: Vec<ScaledImageBranch>,
    pub patches_per_image: usize,
    pub patch_embed_params: usize,
    pub params_per_layer: usize,
    pub encoder_params: usize,
    pub use_fov_model: bool,
}

impl ModelSummary {
    /// Format the summary as a human-readable string.
    pub fn display(&self) -> String {
        let branches = self
            .branches
            .iter()
            .map(|b| {
                format!(
                    "  x{:<5} overlap {:<5} {:>5}px  stride {:>4}  patches {}",
                    b.ratio, b.overlap_ratio, b.image_size, b.stride, b.num_patches
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Model Summary
=============
Encoder:
  Layers:             {}
  Hidden Size:        {}
  MLP Hidden Size:    {}
  Attention Heads:    {}
  Head Dimension:     {}
  Activation:         {}

Patches:
  Image Size:         {}
  Patch Size:         {}
  Patch Grid:         {}x{}
  Tokens per Patch:   {}
  Patches per Image:  {}

Scaled Images:
{}

Parameters (one encoder):
  Total:              {:.2}M
  Patch Embedding:    {}
  Per Layer:          {}

FoV Head:             {}"#,
            self.num_hidden_layers,
            self.hidden_size,
            self.mlp_hidden_size,
            self.num_attention_heads,
            self.head_dim,
            self.hidden_act,
            self.image_size,
            self.patch_size,
            self.patch_grid_size,
            self.patch_grid_size,
            self.tokens_per_patch,
            self.patches_per_image,
            branches,
            self.encoder_params as f64 / 1_000_000.0,
            self.patch_embed_params,
            self.params_per_layer,
            if self.use_fov_model { "enabled" } else { "disabled" },
        )
    }
}
