// crates/mt_foundation/src/lib.rs

//! MantleTrace Foundation Layer
//!
//! 零依赖基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 (`MtError` / `MtResult`)
//! - [`identity`]: 示踪粒子身份编码 (分区号 + 局部槽位 → 64 位标识)
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 serde 和 thiserror
//! 2. **身份不变**: `TracerId` 在粒子创建时赋值一次，终生不变
//! 3. **上下文完整**: 错误携带字段名、检查点号、分区号等复现信息
//!
//! # 示例
//!
//! ```
//! use mt_foundation::{
//!     identity::TracerId,
//!     error::{MtError, MtResult},
//! };
//!
//! let id = TracerId::pack(2, 17);
//! assert_eq!(id.rank(), 2);
//! assert_eq!(id.slot(), 17);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod identity;

// 重导出常用类型
pub use error::{MtError, MtResult};
pub use identity::TracerId;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{MtError, MtResult};
    pub use crate::identity::TracerId;
    pub use crate::{ensure, require};
}
