//! Validate command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use depth_pro_core::DepthProConfig;

/// Run the validate command.
pub fn run(config_path: &Path, format: &str) -> Result<()> {
    // Loading validates the config
    let config = DepthProConfig::from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    match format {
        "json" => {
            let result = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "model_type": config.model_type,
                "num_hidden_layers": config.num_hidden_layers,
                "hidden_size": config.hidden_size,
                "num_attention_heads": config.num_attention_heads,
                "image_size": config.image_size,
                "patch_size": config.patch_size,
                "scaled_images_ratios": config.scaled_images_ratios,
                "intermediate_hook_ids": config.intermediate_hook_ids,
                "use_fov_model": config.use_fov_model,
                "unknown_keys": config.extra.keys().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Config is valid: {:?}", config_path);
            println!("  Layers: {}", config.num_hidden_layers);
            println!("  Hidden Size: {}", config.hidden_size);
            println!("  Attention Heads: {}", config.num_attention_heads);
            println!("  Image Size: {}", config.image_size);
            println!("  Patch Size: {}", config.patch_size);
            println!("  Scaled Image Ratios: {:?}", config.scaled_images_ratios);
            println!("  Intermediate Hooks: {:?}", config.intermediate_hook_ids);
            println!("  FoV Model: {}", config.use_fov_model);
            if !config.extra.is_empty() {
                let mut keys: Vec<_> = config.extra.keys().collect();
                keys.sort();
                println!("  Unknown Keys: {:?}", keys);
            }
        }
    }

    Ok(())
}
