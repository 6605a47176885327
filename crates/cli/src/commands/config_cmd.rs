//! `ponder config` — Configuration inspection.

use ponder_config::AppConfig;

/// Print the effective configuration with the API key masked.
pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("# {}", config_path());
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn show_default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path());
    Ok(())
}

fn config_path() -> String {
    AppConfig::config_dir()
        .join("config.toml")
        .display()
        .to_string()
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".into());
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        assert!(config_path().ends_with("config.toml"));
    }

    #[test]
    fn shown_config_masks_the_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let text = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("********"));
        assert!(text.contains("max_iterations"));
    }
}
