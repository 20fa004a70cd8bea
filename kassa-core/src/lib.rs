//! Kassa Core - 收银机财政合规核心
//!
//! # 架构概述
//!
//! - **签名** (`signature`): Null / Standalone / Online 签名模块
//! - **收据链** (`receipts`): 收据编号、签名链、冲销
//! - **结账** (`reports`): 日结 / 月结 / 年结状态机
//! - **日志** (`journal`): 只追加的收银日志
//! - **数据库** (`db`): SQLite (WAL) 存储
//!
//! # 模块结构
//!
//! ```text
//! kassa-core/src/
//! ├── core/          # 配置、错误
//! ├── db/            # 数据库层
//! ├── signature/     # 签名模块
//! ├── receipts/      # 收据链
//! ├── reports/       # 结账引擎
//! ├── journal.rs     # 收银日志
//! ├── register.rs    # 收银机门面
//! └── utils/         # 日志初始化
//! ```

pub mod collaborators;
pub mod core;
pub mod db;
pub mod journal;
pub mod receipts;
pub mod register;
pub mod reports;
pub mod signature;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, FiscalError, Result};
pub use db::DbService;
pub use receipts::{ChainError, ChainWriter, FinalizedReceipt, NewReceipt};
pub use register::{Collaborators, FiscalRegister, RegisterStatus};
pub use reports::{ClosingEngine, ClosingError, ClosingOutcome, ClosingWindow, DueClosings, ExportOutcome};
pub use signature::{SignatureError, SignatureModule, SignatureUnit};

// Re-export unified error types from shared
pub use shared::{ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
