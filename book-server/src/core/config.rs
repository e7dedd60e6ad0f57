use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in {1} environment")]
    MissingSecret(&'static str, String),

    #[error("{0} must not be empty in {1} environment")]
    EmptySecret(&'static str, String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// 服务器配置 - 书籍生成服务的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | PORT | 5000 | HTTP 服务端口 |
/// | AUTO_START_MONITOR | true | 启动时自动运行订单监控 (仅 "false" 关闭) |
/// | WORK_DIR | ./data | 工作目录 (数据库、产物、PDF) |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志文件目录 (不设置则只输出到控制台) |
/// | PUBLIC_BASE_URL | http://localhost:{PORT} | 签名链接的对外地址 |
/// | SIGNING_SECRET | 开发环境默认值 | 签名密钥 (非开发环境必填) |
/// | MONITOR_INTERVAL_SECS | 30 | 监控轮询间隔 |
/// | GENERATION_CONCURRENCY | 3 | 并发生成数量 |
/// | GENERATION_TIMEOUT_SECS | 120 | 单次生成超时 |
/// | SIGNED_URL_TTL_SECS | 86400 | 签名链接有效期 |
/// | URL_REFRESH_MARGIN_SECS | 3600 | 到期前多久刷新链接 |
/// | REFRESH_MAX_FAILURES | 5 | 连续刷新失败多少次后告警 |
/// | REFRESH_BACKOFF_BASE_SECS | 30 | 刷新重试退避基数 |
/// | REFRESH_BACKOFF_MAX_SECS | 1800 | 刷新重试退避上限 |
/// | AI_PROVIDER_URL | http://localhost:8000 | AI 生成服务地址 |
/// | AI_PROVIDER_API_KEY | - | AI 生成服务密钥 |
/// | MAX_PDF_SIZE_MB | 50 | PDF 上传大小上限 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭时等待在途生成的时间 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/books PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 签名链接前缀，例如 `https://books.example.com`
    pub public_base_url: String,
    /// HMAC 签名密钥
    pub signing_secret: String,

    // === 订单监控 ===
    pub auto_start_monitor: bool,
    pub monitor_interval_secs: u64,
    pub generation_concurrency: usize,
    pub generation_timeout_secs: u64,
    pub signed_url_ttl_secs: u64,
    pub url_refresh_margin_secs: u64,
    pub refresh_max_failures: u32,
    pub refresh_backoff_base_secs: u64,
    pub refresh_backoff_max_secs: u64,

    // === AI 生成服务 ===
    pub ai_provider_url: String,
    pub ai_provider_api_key: Option<String>,

    /// PDF 上传大小上限 (MB)
    pub max_pdf_size_mb: usize,
    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置的环境变量使用默认值；非开发环境下 `SIGNING_SECRET` 必须设置。
/// `SIGNED_URL_TTL_SECS` 必须大于 0 且大于 `URL_REFRESH_MARGIN_SECS`。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 使用自定义值覆盖部分配置 (不读取环境变量)
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        Self {
            work_dir: work_dir.into(),
            http_port,
            public_base_url: format!("http://localhost:{http_port}"),
            ..Self::default()
        }
    }

    /// 从任意键值来源加载配置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let environment = lookup("ENVIRONMENT").unwrap_or(d.environment);
        let http_port: u16 = parse_or(&lookup, "PORT", d.http_port)?;
        let signed_url_ttl_secs = parse_or(&lookup, "SIGNED_URL_TTL_SECS", d.signed_url_ttl_secs)?;
        let url_refresh_margin_secs =
            parse_or(&lookup, "URL_REFRESH_MARGIN_SECS", d.url_refresh_margin_secs)?;
        // A fresh link must land outside the refresh margin
        if signed_url_ttl_secs == 0 || signed_url_ttl_secs <= url_refresh_margin_secs {
            return Err(ConfigError::InvalidValue {
                name: "SIGNED_URL_TTL_SECS",
                value: format!(
                    "{signed_url_ttl_secs} (must be > 0 and > URL_REFRESH_MARGIN_SECS={url_refresh_margin_secs})"
                ),
            });
        }

        Ok(Self {
            work_dir: lookup("WORK_DIR").unwrap_or(d.work_dir),
            http_port,
            log_level: lookup("LOG_LEVEL").unwrap_or(d.log_level),
            log_dir: lookup("LOG_DIR").filter(|s| !s.trim().is_empty()),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("http://localhost:{http_port}")),
            signing_secret: require_secret(&lookup, "SIGNING_SECRET", &environment)?,
            auto_start_monitor: lookup("AUTO_START_MONITOR").as_deref() != Some("false"),
            monitor_interval_secs: parse_or(&lookup, "MONITOR_INTERVAL_SECS", d.monitor_interval_secs)?,
            generation_concurrency: parse_or(&lookup, "GENERATION_CONCURRENCY", d.generation_concurrency)?,
            generation_timeout_secs: parse_or(&lookup, "GENERATION_TIMEOUT_SECS", d.generation_timeout_secs)?,
            signed_url_ttl_secs,
            url_refresh_margin_secs,
            refresh_max_failures: parse_or(&lookup, "REFRESH_MAX_FAILURES", d.refresh_max_failures)?,
            refresh_backoff_base_secs: parse_or(&lookup, "REFRESH_BACKOFF_BASE_SECS", d.refresh_backoff_base_secs)?,
            refresh_backoff_max_secs: parse_or(&lookup, "REFRESH_BACKOFF_MAX_SECS", d.refresh_backoff_max_secs)?,
            ai_provider_url: lookup("AI_PROVIDER_URL").unwrap_or(d.ai_provider_url),
            ai_provider_api_key: lookup("AI_PROVIDER_API_KEY").filter(|s| !s.is_empty()),
            max_pdf_size_mb: parse_or(&lookup, "MAX_PDF_SIZE_MB", d.max_pdf_size_mb)?,
            shutdown_timeout_ms: parse_or(&lookup, "SHUTDOWN_TIMEOUT_MS", d.shutdown_timeout_ms)?,
            environment,
        })
    }

    // ========== 目录结构 ==========

    /// 数据库目录: {work_dir}/database
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 生成产物目录: {work_dir}/artifacts
    pub fn artifacts_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("artifacts")
    }

    /// 上传 PDF 目录: {work_dir}/pdfs
    pub fn pdf_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("pdfs")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.artifacts_dir())?;
        std::fs::create_dir_all(self.pdf_dir())?;
        Ok(())
    }

    // ========== Durations ==========

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn url_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.url_refresh_margin_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn max_pdf_size_bytes(&self) -> usize {
        self.max_pdf_size_mb * 1024 * 1024
    }
}

impl Default for Config {
    /// 开发环境默认值
    fn default() -> Self {
        Self {
            work_dir: "./data".into(),
            http_port: 5000,
            environment: "development".into(),
            log_level: "info".into(),
            log_dir: None,
            public_base_url: "http://localhost:5000".into(),
            signing_secret: "dev-SIGNING_SECRET-not-for-production".into(),
            auto_start_monitor: true,
            monitor_interval_secs: 30,
            generation_concurrency: 3,
            generation_timeout_secs: 120,
            signed_url_ttl_secs: 86_400,
            url_refresh_margin_secs: 3_600,
            refresh_max_failures: 5,
            refresh_backoff_base_secs: 30,
            refresh_backoff_max_secs: 1_800,
            ai_provider_url: "http://localhost:8000".into(),
            ai_provider_api_key: None,
            max_pdf_size_mb: 50,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Require a secret: must be set and non-empty outside development.
fn require_secret(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    environment: &str,
) -> Result<String, ConfigError> {
    let val = match lookup(name) {
        Some(v) => v,
        None => {
            if environment != "development" {
                return Err(ConfigError::MissingSecret(name, environment.to_string()));
            }
            format!("dev-{name}-not-for-production")
        }
    };
    if val.is_empty() && environment != "development" {
        return Err(ConfigError::EmptySecret(name, environment.to_string()));
    }
    Ok(val)
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value: raw })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.http_port, 5000);
        assert!(config.auto_start_monitor);
        assert_eq!(config.generation_concurrency, 3);
        assert_eq!(config.generation_timeout_secs, 120);
        assert_eq!(config.public_base_url, "http://localhost:5000");
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_auto_start_only_disabled_by_false() {
        assert!(!from_map(&[("AUTO_START_MONITOR", "false")]).unwrap().auto_start_monitor);
        assert!(from_map(&[("AUTO_START_MONITOR", "0")]).unwrap().auto_start_monitor);
        assert!(from_map(&[("AUTO_START_MONITOR", "true")]).unwrap().auto_start_monitor);
    }

    #[test]
    fn test_secret_required_outside_development() {
        let err = from_map(&[("ENVIRONMENT", "production")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret("SIGNING_SECRET", _)));

        let err = from_map(&[("ENVIRONMENT", "staging"), ("SIGNING_SECRET", "")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySecret("SIGNING_SECRET", _)));

        let config =
            from_map(&[("ENVIRONMENT", "production"), ("SIGNING_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.signing_secret, "s3cret");
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = from_map(&[("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }

    #[test]
    fn test_signed_url_ttl_must_exceed_refresh_margin() {
        for (ttl, margin) in [("60", "3600"), ("3600", "3600"), ("0", "0")] {
            let err = from_map(&[("SIGNED_URL_TTL_SECS", ttl), ("URL_REFRESH_MARGIN_SECS", margin)])
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { name: "SIGNED_URL_TTL_SECS", .. }));
        }

        let config =
            from_map(&[("SIGNED_URL_TTL_SECS", "7200"), ("URL_REFRESH_MARGIN_SECS", "600")]).unwrap();
        assert_eq!(config.signed_url_ttl(), Duration::from_secs(7200));
        assert_eq!(config.url_refresh_margin(), Duration::from_secs(600));
    }

    #[test]
    fn test_log_settings() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.log_dir.is_none());

        let config = from_map(&[("LOG_LEVEL", "debug"), ("LOG_DIR", "  ")]).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.log_dir.is_none());

        let config = from_map(&[("LOG_DIR", "/var/log/books")]).unwrap();
        assert_eq!(config.log_dir.as_deref(), Some("/var/log/books"));
    }

    #[test]
    fn test_public_base_url_trims_slash() {
        let config = from_map(&[("PUBLIC_BASE_URL", "https://books.example.com/")]).unwrap();
        assert_eq!(config.public_base_url, "https://books.example.com");
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::with_overrides("/tmp/books", 18080);
        assert_eq!(config.work_dir, "/tmp/books");
        assert_eq!(config.http_port, 18080);
        assert_eq!(config.public_base_url, "http://localhost:18080");
        assert_eq!(config.pdf_dir(), PathBuf::from("/tmp/books/pdfs"));
    }
}
