//! 核心模块 - 配置和错误定义
//!
//! - [`Config`] - 收银机配置
//! - [`FiscalError`] - 统一错误

pub mod config;
pub mod error;

pub use config::{Config, ConfigError, SignatureConfig, SignatureMode};
pub use error::{ErrorReport, FiscalError, Result};
