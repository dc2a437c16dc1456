// Language configuration management for the judge service
use anyhow::{bail, Context, Result};
use codecraft_common::types::{Language, ProblemSpec, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub dockerfile_path: Option<String>,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_cpu_time_limit_ms")]
    pub cpu_time_limit_ms: u64,
    #[serde(default = "default_wall_time_limit_ms")]
    pub wall_time_limit_ms: u64,
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
    #[serde(default = "default_compile_memory_limit_mb")]
    pub compile_memory_limit_mb: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,
}

fn default_memory_limit_mb() -> u64 {
    256
}

fn default_cpu_time_limit_ms() -> u64 {
    2000
}

fn default_wall_time_limit_ms() -> u64 {
    4000
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}

fn default_compile_memory_limit_mb() -> u64 {
    1024
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_pids_limit() -> u32 {
    64
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageConfig>,
}

/// Language configuration manager
///
/// Only languages present in `languages.json` are enabled, even though the
/// `Language` enum knows more.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let languages_json: LanguagesJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Self::from_configs(languages_json.languages)
    }

    pub fn from_configs(configs: Vec<LanguageConfig>) -> Result<Self> {
        let mut by_language = HashMap::new();
        for config in configs {
            let language: Language = config
                .name
                .parse()
                .with_context(|| format!("Unknown language '{}' in languages.json", config.name))?;
            if by_language.insert(language, config).is_some() {
                bail!("Language '{}' is configured twice", language);
            }
        }

        if by_language.is_empty() {
            bail!("No languages configured in languages.json");
        }

        Ok(Self {
            configs: by_language,
        })
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    pub fn is_enabled(&self, language: &Language) -> bool {
        self.configs.contains_key(language)
    }

    /// List all enabled languages in a stable order
    pub fn list_languages(&self) -> Vec<Language> {
        Language::ALL
            .iter()
            .copied()
            .filter(|l| self.configs.contains_key(l))
            .collect()
    }

    /// Limits for one test-case run. A problem's time limit is the CPU budget;
    /// the wall clock gets twice that to absorb scheduling noise.
    pub fn run_limits(&self, language: &Language, problem: &ProblemSpec) -> Result<ResourceLimits> {
        let config = self.get_config(language)?;
        let (cpu_time_ms, wall_time_ms) = match problem.time_limit_ms {
            Some(limit) => (limit, limit.saturating_mul(2)),
            None => (config.cpu_time_limit_ms, config.wall_time_limit_ms),
        };

        Ok(ResourceLimits {
            wall_time_ms,
            cpu_time_ms,
            memory_mb: problem.memory_limit_mb.unwrap_or(config.memory_limit_mb),
            max_output_bytes: config.max_output_bytes,
            pids: config.pids_limit,
        })
    }

    /// Limits for the compile step
    pub fn compile_limits(&self, language: &Language) -> Result<ResourceLimits> {
        let config = self.get_config(language)?;
        Ok(ResourceLimits {
            wall_time_ms: config.compile_timeout_ms,
            cpu_time_ms: config.compile_timeout_ms,
            memory_mb: config.compile_memory_limit_mb,
            max_output_bytes: config.max_output_bytes,
            pids: config.pids_limit.max(128),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::language_config;
    use codecraft_common::types::Comparator;

    fn problem(time_limit_ms: Option<u64>, memory_limit_mb: Option<u64>) -> ProblemSpec {
        ProblemSpec {
            id: 1,
            comparator: Comparator::Exact,
            time_limit_ms,
            memory_limit_mb,
            test_cases: vec![],
        }
    }

    #[test]
    fn test_parse_languages_json_with_defaults() {
        let json = r#"{"languages": [
            {"name": "python", "version": "3.12", "image": "python:3.12-alpine"},
            {"name": "cpp", "version": "13", "image": "gcc:13", "memory_limit_mb": 512}
        ]}"#;
        let parsed: LanguagesJson = serde_json::from_str(json).unwrap();
        let manager = LanguageConfigManager::from_configs(parsed.languages).unwrap();

        assert_eq!(manager.list_languages(), vec![Language::Python, Language::Cpp]);
        assert!(!manager.is_enabled(&Language::Java));
        let cpp = manager.get_config(&Language::Cpp).unwrap();
        assert_eq!(cpp.memory_limit_mb, 512);
        assert_eq!(cpp.compile_timeout_ms, 30_000);
    }

    #[test]
    fn test_unknown_language_rejected() {
        let err = LanguageConfigManager::from_configs(vec![language_config("cobol")]).unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_duplicate_language_rejected() {
        let result = LanguageConfigManager::from_configs(vec![
            language_config("python"),
            language_config("py"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(LanguageConfigManager::from_configs(vec![]).is_err());
    }

    #[test]
    fn test_run_limits_use_language_defaults() {
        let manager = LanguageConfigManager::from_configs(vec![language_config("java")]).unwrap();
        let limits = manager.run_limits(&Language::Java, &problem(None, None)).unwrap();
        assert_eq!(limits.cpu_time_ms, 1000);
        assert_eq!(limits.wall_time_ms, 2000);
        assert_eq!(limits.memory_mb, 128);
        assert_eq!(limits.max_output_bytes, 4096);
    }

    #[test]
    fn test_problem_overrides_limits() {
        let manager = LanguageConfigManager::from_configs(vec![language_config("java")]).unwrap();
        let limits = manager
            .run_limits(&Language::Java, &problem(Some(3000), Some(64)))
            .unwrap();
        assert_eq!(limits.cpu_time_ms, 3000);
        assert_eq!(limits.wall_time_ms, 6000);
        assert_eq!(limits.memory_mb, 64);
    }

    #[test]
    fn test_missing_language_errors() {
        let manager = LanguageConfigManager::from_configs(vec![language_config("java")]).unwrap();
        assert!(manager.compile_limits(&Language::Cpp).is_err());
        let compile = manager.compile_limits(&Language::Java).unwrap();
        assert_eq!(compile.wall_time_ms, 10_000);
        assert_eq!(compile.memory_mb, 512);
    }
}
