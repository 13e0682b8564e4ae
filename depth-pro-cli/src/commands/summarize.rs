//! Summarize command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use depth_pro_core::DepthProConfig;

/// Run the summarize command.
pub fn run(config_path: &Path, format: &str) -> Result<()> {
    let config = DepthProConfig::from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let summary = config.compute_summary();

    match format {
        "json" => {
            let branches: Vec<_> = summary
                .branches
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "ratio": b.ratio,
                        "overlap_ratio": b.overlap_ratio,
                        "image_size": b.image_size,
                        "stride": b.stride,
                        "num_patches": b.num_patches,
                    })
                })
                .collect();
            let result = serde_json::json!({
                "config_path": config_path.display().to_string(),
                "architecture": {
                    "num_hidden_layers": summary.num_hidden_layers,
                    "hidden_size": summary.hidden_size,
                    "mlp_hidden_size": summary.mlp_hidden_size,
                    "num_attention_heads": summary.num_attention_heads,
                    "head_dim": summary.head_dim,
                    "activation": summary.hidden_act.to_string(),
                    "use_fov_model": summary.use_fov_model,
                },
                "patches": {
                    "image_size": summary.image_size,
                    "patch_size": summary.patch_size,
                    "grid_size": summary.patch_grid_size,
                    "tokens_per_patch": summary.tokens_per_patch,
                    "patches_per_image": summary.patches_per_image,
                    "branches": branches,
                },
                "parameters": {
                    "encoder": summary.encoder_params,
                    "encoder_millions": summary.encoder_params as f64 / 1_000_000.0,
                    "patch_embed": summary.patch_embed_params,
                    "per_layer": summary.params_per_layer,
                },
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("{}", summary.display());
        }
    }

    Ok(())
}
