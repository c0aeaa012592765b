use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ChainVaultError, ChainVaultResult};

/// Top-level client configuration (loaded from chainvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainVaultConfig {
    pub cache: CacheConfig,
    pub ledger: LedgerConfig,
    pub admission: AdmissionConfig,
    pub chunking: ChunkingConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

impl ChainVaultConfig {
    /// Parse a TOML document and check value ranges.
    pub fn from_toml(s: &str) -> ChainVaultResult<Self> {
        let config: ChainVaultConfig =
            toml::from_str(s).map_err(|e| ChainVaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChainVaultResult<()> {
        if self.admission.max_attempts == 0 {
            return Err(ChainVaultError::Config(
                "admission.max_attempts must be at least 1".into(),
            ));
        }
        self.chunking.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Local block cache directory
    pub dir: PathBuf,
    /// Maximum size of cached blocks in MB
    pub max_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory of the local ledger peer used for fetches and admission
    pub dir: PathBuf,
    /// Admission endpoint name passed along with every submission
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Submission attempts per record before giving up (default: 5)
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
}

/// FastCDC chunk size targets for published files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl ChunkingConfig {
    /// Ordered and inside the ranges FastCDC accepts (64 B..1 MiB, 256 B..4 MiB, 1 KiB..16 MiB).
    pub fn validate(&self) -> ChainVaultResult<()> {
        if !(self.min_size <= self.avg_size && self.avg_size <= self.max_size) {
            return Err(ChainVaultError::Config(format!(
                "chunking sizes must satisfy min <= avg <= max (got {}/{}/{})",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        if !(64..=1 << 20).contains(&self.min_size)
            || !(256..=4 << 20).contains(&self.avg_size)
            || !(1024..=16 << 20).contains(&self.max_size)
        {
            return Err(ChainVaultError::Config(format!(
                "chunking sizes out of range (64 <= min <= 1 MiB, 256 <= avg <= 4 MiB, \
                 1 KiB <= max <= 16 MiB; got {}/{}/{})",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// PKCS#8 PEM private key (default: ~/.config/chainvault/key.pem)
    pub private_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.cache/chainvault/blocks"),
            max_mb: 1024,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.local/share/chainvault/ledger"),
            endpoint: "local".into(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 250,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_size: 16 * 1024,
            avg_size: 64 * 1024,
            max_size: 256 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[cache]
dir = "/var/cache/chainvault"
max_mb = 64

[ledger]
dir = "/srv/ledger"
endpoint = "mining-eu"

[admission]
max_attempts = 3
retry_delay_ms = 10

[chunking]
min_size = 1024
avg_size = 4096
max_size = 16384

[identity]
private_key = "/home/user/.chainvault/key.pem"

[logging]
level = "debug"
format = "json"
"#;
        let config = ChainVaultConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/chainvault"));
        assert_eq!(config.cache.max_mb, 64);
        assert_eq!(config.ledger.endpoint, "mining-eu");
        assert_eq!(config.admission.max_attempts, 3);
        assert_eq!(config.chunking.avg_size, 4096);
        assert_eq!(
            config.identity.private_key,
            Some(PathBuf::from("/home/user/.chainvault/key.pem"))
        );
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = ChainVaultConfig::from_toml("").unwrap();

        assert_eq!(config.admission.max_attempts, 5);
        assert_eq!(config.ledger.endpoint, "local");
        assert_eq!(config.logging.level, "info");
        assert!(config.identity.private_key.is_none());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ChainVaultConfig::from_toml("[admission]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_bad_chunk_sizes_rejected() {
        let toml_str = "[chunking]\nmin_size = 9000\navg_size = 4096\nmax_size = 16384\n";
        assert!(ChainVaultConfig::from_toml(toml_str).is_err());

        let tiny = "[chunking]\nmin_size = 8\navg_size = 16\nmax_size = 32\n";
        assert!(ChainVaultConfig::from_toml(tiny).is_err());
    }

    #[test]
    fn test_oversized_min_and_avg_rejected() {
        let toml_str = "[chunking]\nmin_size = 2097152\navg_size = 4194304\nmax_size = 8388608\n";
        let err = ChainVaultConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, ChainVaultError::Config(_)));

        let big_avg = "[chunking]\nmin_size = 1048576\navg_size = 8388608\nmax_size = 16777216\n";
        assert!(ChainVaultConfig::from_toml(big_avg).is_err());

        let upper_bounds =
            "[chunking]\nmin_size = 1048576\navg_size = 4194304\nmax_size = 16777216\n";
        assert!(ChainVaultConfig::from_toml(upper_bounds).is_ok());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ChainVaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = ChainVaultConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.cache.dir, parsed.cache.dir);
        assert_eq!(config.admission.max_attempts, parsed.admission.max_attempts);
    }
}
