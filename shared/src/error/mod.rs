//! Unified error codes for the fiscal core
//!
//! - [`ErrorCode`]: standardized codes for every failure the core reports
//! - [`ErrorCategory`]: classification used by the caller to decide between
//!   retrying, degrading and halting
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Configuration errors
//! - 2xxx: Integrity violations
//! - 3xxx: Signature device errors
//! - 4xxx: Concurrency conflicts
//! - 5xxx: Closing errors
//! - 9xxx: Transaction / system errors
//!
//! # Example
//!
//! ```
//! use shared::error::{ErrorCategory, ErrorCode};
//!
//! let code = ErrorCode::SignatureDeviceDamaged;
//! assert_eq!(code.category(), ErrorCategory::DeviceDamaged);
//! assert!(code.is_retryable());
//! ```

mod category;
mod codes;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
