//! `toolchat onboard`: First-time setup.

use std::path::{Path, PathBuf};
use toolchat_config::AppConfig;
use super::CliResult;

/// Create the config directory and a default config file, leaving any
/// existing file untouched. Returns whether a file was written.
pub fn write_default_config(config_path: &Path) -> std::io::Result<bool> {
    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    if config_path.exists() {
        return Ok(false);
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    Ok(true)
}

pub async fn run(config_path: Option<&Path>) -> CliResult {
    let config_path: PathBuf = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("toolchat — First-Time Setup");
    println!("===========================\n");

    if write_default_config(&config_path)? {
        println!("Created config file: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Add your API key to {} or set OPENAI_API_KEY", config_path.display());
        println!("   2. Enable tools under [sandbox] and [tools], or add [[tool_servers]]");
        println!("   3. Run: toolchat chat\n");
    } else {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_once_and_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_default_config(&path).unwrap());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("default_model"));

        std::fs::write(&path, "default_model = \"mine\"\n").unwrap();
        assert!(!write_default_config(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "default_model = \"mine\"\n");
    }

    #[test]
    fn default_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, AppConfig::default().default_model);
    }
}
