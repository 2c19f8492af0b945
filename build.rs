use std::env;
use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=config/");
    println!("cargo:rerun-if-env-changed=FLEET_UPLOADER_CONFIG");

    // Only run config embedding when feature is enabled
    if env::var("CARGO_FEATURE_EMBED_CONFIG").is_ok() {
        embed_platform_configs()?;
    }

    Ok(())
}

fn embed_platform_configs() -> Result<(), Box<dyn std::error::Error>> {
    // Config directory (create if needed)
    let config_dir = Path::new("config");
    fs::create_dir_all(config_dir)?;

    // Custom config source (from env var if provided) replaces the prod config
    if let Ok(custom_config) = env::var("FLEET_UPLOADER_CONFIG") {
        let custom_path = Path::new(&custom_config);
        if custom_path.exists() {
            println!(
                "cargo:warning=Embedding custom platform config from {}",
                custom_path.display()
            );
            fs::copy(custom_path, config_dir.join("platform_prod.yaml"))?;
        } else {
            println!(
                "cargo:warning=Specified custom config not found: {}",
                custom_path.display()
            );
        }
    }

    for mode in ["prod", "test"] {
        let mode_config = config_dir.join(format!("platform_{mode}.yaml"));
        if !mode_config.exists() {
            println!(
                "cargo:warning=No {} platform config found, binary will fall back to on-disk config",
                mode
            );
        }
    }

    println!("cargo:warning=Platform config embedding completed");
    Ok(())
}
