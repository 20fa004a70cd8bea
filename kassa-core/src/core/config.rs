use chrono::NaiveTime;
use kassa_crypto::SecureBytes;
use shared::ErrorCode;
use shared::util::parse_curfew;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Cash register id {0:?} must be non-empty and must not contain '_'")]
    InvalidRegisterId(String),

    /// The database belongs to another register
    #[error("Database belongs to register {stored}, configured is {configured}")]
    RegisterMismatch { stored: String, configured: String },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfiguration
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// 签名模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    #[default]
    None,
    Standalone,
    Online,
}

impl FromStr for SignatureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "null" => Ok(Self::None),
            "standalone" | "local" => Ok(Self::Standalone),
            "online" => Ok(Self::Online),
            other => Err(ConfigError::InvalidValue {
                name: "SIGNATURE_MODE",
                value: other.to_string(),
            }),
        }
    }
}

/// Signature device settings
#[derive(Debug, Clone, Default)]
pub struct SignatureConfig {
    pub mode: SignatureMode,
    pub master_passphrase: Option<SecureBytes>,
    pub service_url: Option<String>,
    pub timeout_ms: u64,
}

/// 收银机配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | KASSA_DB_PATH | kassa.db | SQLite 数据库文件 |
/// | CASH_REGISTER_ID | KASSE-01 | 收银机编号 (no `_`) |
/// | SIGNATURE_MODE | none | none / standalone / online |
/// | MASTER_PASSPHRASE | - | 计数器密钥口令 |
/// | SIGNATURE_SERVICE_URL | - | 在线签名服务地址 |
/// | SIGNATURE_TIMEOUT_MS | 5000 | 签名超时(毫秒) |
/// | CURFEW | 00:00 | 营业日切换时间 |
/// | AUTO_DAY_BEFORE_MONTH | false | 月结前自动日结 |
/// | ALLOW_SALES_WHEN_DAMAGED | false | 签名设备故障时允许销售 |
/// | BACKUP_DIR | - | 结账前备份目录 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志文件目录 |
///
/// # 示例
///
/// ```ignore
/// CASH_REGISTER_ID=KASSE-02 SIGNATURE_MODE=standalone MASTER_PASSPHRASE=geheim kassa status
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub cash_register_id: String,
    pub signature: SignatureConfig,
    /// Seeded into `globals` on first start, the stored value wins afterwards
    pub curfew: NaiveTime,
    pub auto_day_before_month: bool,
    pub allow_sales_when_damaged: bool,
    pub backup_dir: Option<String>,
    pub log_level: String,
    pub log_dir: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> T {
    match env_opt(name) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(name = name, value = %value, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// Unparsable values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let mode = env_opt("SIGNATURE_MODE")
            .map(|v| {
                v.parse().unwrap_or_else(|e: ConfigError| {
                    tracing::warn!(error = %e, "Unknown signature mode, running without signature");
                    SignatureMode::None
                })
            })
            .unwrap_or_default();

        let curfew = match env_opt("CURFEW") {
            Some(value) => parse_curfew(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "Invalid CURFEW, using 00:00");
                NaiveTime::MIN
            }),
            None => NaiveTime::MIN,
        };

        Self {
            db_path: env_opt("KASSA_DB_PATH").unwrap_or_else(|| "kassa.db".into()),
            cash_register_id: env_opt("CASH_REGISTER_ID").unwrap_or_else(|| "KASSE-01".into()),
            signature: SignatureConfig {
                mode,
                master_passphrase: env_opt("MASTER_PASSPHRASE")
                    .map(|p| SecureBytes::new(p.into_bytes())),
                service_url: env_opt("SIGNATURE_SERVICE_URL"),
                timeout_ms: env_parse("SIGNATURE_TIMEOUT_MS", 5000),
            },
            curfew,
            auto_day_before_month: env_parse("AUTO_DAY_BEFORE_MONTH", false),
            allow_sales_when_damaged: env_parse("ALLOW_SALES_WHEN_DAMAGED", false),
            backup_dir: env_opt("BACKUP_DIR"),
            log_level: env_opt("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: env_opt("LOG_DIR"),
        }
    }

    /// Configuration for tests: given database, no signature device
    pub fn with_overrides(db_path: impl Into<String>, cash_register_id: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            cash_register_id: cash_register_id.into(),
            signature: SignatureConfig {
                timeout_ms: 5000,
                ..Default::default()
            },
            curfew: NaiveTime::MIN,
            auto_day_before_month: false,
            allow_sales_when_damaged: false,
            backup_dir: None,
            log_level: "info".into(),
            log_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.cash_register_id.trim();
        if id.is_empty() || id.contains('_') || id != self.cash_register_id {
            return Err(ConfigError::InvalidRegisterId(self.cash_register_id.clone()));
        }
        Ok(())
    }
}
