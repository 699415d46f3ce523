use crate::config::types::Config;
use crate::error::ConfigError;
use std::fs;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file and overlay the environment.
    ///
    /// Runs before the tracing subscriber is installed, so failures carry
    /// their context in the returned error rather than in log output.
    pub fn from_file(path: &str) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_string(),
            source,
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseError {
                path: path.to_string(),
                source,
            })?;

        config.apply_env();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_test_config() {
        let config = ConfigLoader::from_file("test_data/test_config.toml")
            .expect("test config should parse");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.transport.secret, "test-shared-secret");
        assert_eq!(config.azure.tenant_id, "00000000-0000-0000-0000-000000000000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_error_names_the_path() {
        let err = ConfigLoader::from_file("test_data/does_not_exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
        assert!(err.to_string().contains("test_data/does_not_exist.toml"));
    }

    #[test]
    fn test_malformed_toml_error_names_the_path() {
        let dir = std::env::temp_dir().join("dkv-config-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        fs::write(&path, "[server\nhost = ").unwrap();

        let err = ConfigLoader::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = std::env::temp_dir().join("dkv-config-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.toml");
        fs::write(&path, "[transport]\nsecret = \"abc\"\n").unwrap();

        let config = ConfigLoader::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.transport.secret, "abc");
    }
}
