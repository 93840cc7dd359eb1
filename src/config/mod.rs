//! Configuration for webmirror

mod crawl;

pub use crawl::{CrawlConfig, FileCategory, FileTypeFilter, Scope};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for a webmirror process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory that receives one subdirectory per job
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Crawl configuration
    #[serde(default)]
    pub crawl: CrawlConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("archives")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            crawl: CrawlConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration as TOML to the given path.
    pub fn write_default(path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass rather than playing whack-a-mole.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawl.concurrency == 0 {
            errors.push("crawl.concurrency must be positive".to_string());
        }
        if self.crawl.concurrency > 64 {
            errors.push("crawl.concurrency must be <= 64".to_string());
        }
        if self.crawl.max_file_size == 0 {
            errors.push("crawl.max_file_size must be positive".to_string());
        }
        if self.crawl.max_total_size < self.crawl.max_file_size {
            errors.push("crawl.max_total_size must be >= crawl.max_file_size".to_string());
        }
        if !self.crawl.unlimited && self.crawl.max_pages == 0 {
            errors.push("crawl.max_pages must be positive unless unlimited is set".to_string());
        }
        if self.crawl.timeout_ms == 0 {
            errors.push("crawl.timeout_ms must be positive".to_string());
        }
        if self.crawl.max_redirects == 0 && self.crawl.follow_redirects {
            errors.push("crawl.max_redirects must be positive when follow_redirects is set".to_string());
        }
        if self.crawl.allowed_protocols.is_empty() {
            errors.push("crawl.allowed_protocols must not be empty".to_string());
        }
        for proto in &self.crawl.allowed_protocols {
            if !matches!(proto.as_str(), "http" | "https") {
                errors.push(format!("crawl.allowed_protocols: unsupported protocol '{}'", proto));
            }
        }
        if self.crawl.scope == Scope::Custom && self.crawl.custom_domains.is_empty() {
            errors.push("crawl.custom_domains must not be empty when scope is custom".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_multiple_errors() {
        let mut config = Config::default();
        config.crawl.concurrency = 0;
        config.crawl.timeout_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("concurrency"));
        assert!(err.contains("timeout_ms"));
    }

    #[test]
    fn test_custom_scope_requires_domains() {
        let mut config = Config::default();
        config.crawl.scope = Scope::Custom;
        assert!(config.validate().is_err());
        config.crawl.custom_domains = vec!["cdn.example.com".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.crawl.max_depth, config.crawl.max_depth);
        assert_eq!(parsed.output_dir, config.output_dir);
    }
}
