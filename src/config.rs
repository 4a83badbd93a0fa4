//! Engine configuration

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::age_gender::DEFAULT_GENDER_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    pub age_gender: AgeGenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Runtime to instantiate, e.g. "openvino"
    pub backend: String,
    /// Device string handed to the runtime, e.g. "CPU"
    pub device: String,
    pub num_threads: i32,
    /// Models are loaded from `<work_dir>/model/<fixed filename>`
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgeGenderConfig {
    pub gender_threshold: f32,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inference: InferenceConfig {
                backend: "openvino".to_string(),
                device: "CPU".to_string(),
                num_threads: 4,
                work_dir: PathBuf::from("."),
            },
            age_gender: AgeGenderConfig {
                gender_threshold: DEFAULT_GENDER_THRESHOLD,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [inference]
            backend = "openvino"
            device = "GPU"
            num_threads = 8
            work_dir = "/opt/models"

            [age_gender]
            gender_threshold = 0.6
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.inference.device, "GPU");
        assert_eq!(config.inference.num_threads, 8);
        assert_eq!(config.inference.work_dir, PathBuf::from("/opt/models"));
        assert!((config.age_gender.gender_threshold - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inference.backend, "openvino");
        assert!((config.age_gender.gender_threshold - DEFAULT_GENDER_THRESHOLD).abs() < 1e-6);
    }
}
