use std::path::PathBuf;

use anyhow::{Context, Result};
use aopipe_core::pipeline::ReductionConfig;
use clap::Args;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default night configuration as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = ReductionConfig::new(
        PathBuf::from("raw"),
        PathBuf::from("reduced"),
        PathBuf::from("obslog.csv"),
    );
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aopipe_core::consts::RESIDUAL_UPSAMPLE;

    #[test]
    fn test_default_config_parses_back() {
        let config = ReductionConfig::new("raw".into(), "reduced".into(), "obslog.csv".into());
        let text = toml::to_string_pretty(&config).unwrap();
        let back: ReductionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.raw_dir, config.raw_dir);
        assert_eq!(back.instrument, config.instrument);
        assert_eq!(back.stacking.final_size, config.stacking.final_size);
    }

    #[test]
    fn test_minimal_config() {
        let text = r#"
            raw_dir = "/data/raw"
            reduced_dir = "/data/reduced"
            obs_log = "/data/log.csv"
            instrument = "pharo"

            [rough_centers."KOI 99"]
            row = 310.0
            col = 295.5

            [registration]
            search_radius = 5
        "#;
        let config: ReductionConfig = toml::from_str(text).unwrap();
        assert_eq!(config.registration.search_radius, 5);
        assert_eq!(config.registration.upsample, RESIDUAL_UPSAMPLE);
        assert_eq!(config.rough_centers["KOI 99"].col, 295.5);
        assert!(config.contrast.enabled);
    }
}
