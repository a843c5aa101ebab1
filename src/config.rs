use crate::errors::StyxResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../default-styx.conf");

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Whether to seed function runs with globals whose initializers call a
    /// taint source.
    pub seed_globals: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { seed_globals: true }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogScanConfig {
    /// Receiver type treated as a logger (subtypes included).
    pub logger_type: String,

    /// Package the logger type lives in.
    pub logger_package: String,

    /// Keywords that must never appear in logged literals.
    pub sensitive_keywords: Vec<String>,
}

impl Default for LogScanConfig {
    fn default() -> Self {
        Self {
            logger_type: "Logger".into(),
            logger_package: "std.log".into(),
            sensitive_keywords: vec![
                "password",
                "passwd",
                "pwd",
                "secret",
                "token",
                "credential",
                "api_key",
                "private_key",
                "session",
                "auth",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TaintConfig {
    pub analysis: AnalysisConfig,
    pub log: LogScanConfig,
}

impl TaintConfig {
    pub fn load(config_dir: &Path) -> StyxResult<Self> {
        let mut config = TaintConfig::default();

        let default_config_path = config_dir.join("styx.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("styx.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: TaintConfig = toml::from_str(&user_config_content)?;

            config = merge_configs(config, user_config);
            tracing::debug!("loaded user config from {}", user_config_path.display());
        } else {
            tracing::debug!("using default configuration");
        }

        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> StyxResult<()> {
    let example_path = config_dir.join("styx.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into the defaults: keyword lists are unioned, everything
/// else is overridden.
fn merge_configs(mut default: TaintConfig, user: TaintConfig) -> TaintConfig {
    default.analysis.seed_globals = user.analysis.seed_globals;

    default.log.logger_type = user.log.logger_type;
    default.log.logger_package = user.log.logger_package;
    default
        .log
        .sensitive_keywords
        .extend(user.log.sensitive_keywords);
    default.log.sensitive_keywords.sort_unstable();
    default.log.sensitive_keywords.dedup();

    default
}

#[test]
fn merge_configs_unions_and_dedupes_keywords() {
    let mut default_cfg = TaintConfig::default();
    default_cfg.log.sensitive_keywords = vec!["secret".into(), "token".into()];

    let mut user_cfg = TaintConfig::default();
    user_cfg.log.sensitive_keywords = vec!["apikey".into(), "secret".into()];

    let merged = merge_configs(default_cfg, user_cfg);
    assert_eq!(
        merged.log.sensitive_keywords,
        vec!["apikey", "secret", "token"]
    );
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [analysis]
        seed_globals = false

        [log]
        logger_type = "Slf4jLogger"
    "#;
    fs::write(cfg_path.join("styx.local"), user_toml).unwrap();

    let cfg = TaintConfig::load(cfg_path).expect("TaintConfig::load should succeed");

    assert!(cfg_path.join("styx.conf").is_file());
    assert!(!cfg.analysis.seed_globals);
    assert_eq!(cfg.log.logger_type, "Slf4jLogger");
    // keywords fall back to the defaults
    assert!(cfg.log.sensitive_keywords.iter().any(|k| k == "password"));
}

#[test]
fn default_config_file_parses_back() {
    let parsed: TaintConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
    assert_eq!(parsed.log.logger_type, TaintConfig::default().log.logger_type);
}
