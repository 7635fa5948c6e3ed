/**
* filename : config
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: Option<String>,
    pub use_mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// 실행 알고리즘 공통 타이밍 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionSettings {
    /// 주문 상태 조회 주기
    pub poll_interval_ms: u64,
    /// 시장가 주문 재확인 대기
    pub market_recheck_delay_ms: u64,
    /// 연속 주문 제출 간 대기 (레이트 리밋 배려)
    pub submission_delay_ms: u64,
    /// 모니터링 기본 타임아웃
    pub default_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            poll_interval_ms: 2000,
            market_recheck_delay_ms: 1000,
            submission_delay_ms: 500,
            default_timeout_secs: 300,
        }
    }
}

impl ExecutionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn market_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.market_recheck_delay_ms)
    }

    pub fn submission_delay(&self) -> Duration {
        Duration::from_millis(self.submission_delay_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Config {
    /// Load configuration from config.json, falling back to defaults
    pub fn load() -> Result<Self, ExecutionError> {
        Self::load_from(Path::new("config.json"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ExecutionError> {
        let mut cfg = if config_path.exists() {
            let mut file = File::open(config_path)
                .map_err(|e| ExecutionError::Config(format!("Failed to open config file: {}", e)))?;

            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .map_err(|e| ExecutionError::Config(format!("Failed to read config file: {}", e)))?;

            serde_json::from_str::<Config>(&contents)
                .map_err(|e| ExecutionError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            Config::default()
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Apply environment variable overrides for sensitive/runtime fields
    fn apply_env_overrides(&mut self) {
        use std::env;
        if let Ok(v) = env::var("EXCHANGE_API_KEY") { if !v.is_empty() { self.exchange.api_key = Some(v); } }
        if let Ok(v) = env::var("EXCHANGE_API_SECRET") { if !v.is_empty() { self.exchange.api_secret = Some(v); } }
        if let Ok(v) = env::var("EXCHANGE_BASE_URL") { if !v.is_empty() { self.exchange.base_url = Some(v); } }
        if let Ok(v) = env::var("USE_MOCK") {
            let lower = v.to_lowercase();
            if ["1","true","yes"].contains(&lower.as_str()) { self.exchange.use_mock = true; }
            if ["0","false","no"].contains(&lower.as_str()) { self.exchange.use_mock = false; }
        }
        if let Ok(v) = env::var("EXECUTION_POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() { self.execution.poll_interval_ms = ms; }
        }
        if let Ok(v) = env::var("EXECUTION_DEFAULT_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() { self.execution.default_timeout_secs = secs; }
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            name: "Mock".to_string(),
            api_key: None,
            api_secret: None,
            base_url: None,
            use_mock: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_execution_section_uses_defaults() {
        let json = r#"{
            "exchange": { "name": "Binance", "api_key": null, "api_secret": null, "base_url": null, "use_mock": false },
            "logging": { "level": "debug" },
            "execution": { "poll_interval_ms": 250 }
        }"#;

        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.execution.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.execution.default_timeout(), Duration::from_secs(300));
        assert!(!cfg.exchange.use_mock);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = Config::load_from(Path::new("does-not-exist.json")).unwrap();
        assert_eq!(cfg.exchange.name, "Mock");
        assert_eq!(cfg.execution.submission_delay(), Duration::from_millis(500));
    }
}
