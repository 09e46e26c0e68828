// crates/mt_foundation/src/identity.rs

//! 示踪粒子身份编码
//!
//! 将 (起源分区号, 起源局部槽位) 打包为一个不透明的 64 位标识。
//!
//! # 不变量
//!
//! 1. **创建时赋值一次**: 粒子播种后立即编码，此后终生不变
//! 2. **全局唯一**: 不同分区的局部槽位序列互不重叠，打包结果在
//!    所有分区范围内无重复
//! 3. **可逆**: 解码恢复创建时的精确 (分区, 槽位) 对；粒子当前
//!    所在的局部槽位可能因增删而变化，但身份不随之改变
//!
//! # 内存布局
//!
//! 高 32 位存放起源分区号，低 32 位存放起源槽位，均为有符号
//! 32 位整数，整体按 64 位整数读写。
//!
//! # 示例
//!
//! ```
//! use mt_foundation::identity::TracerId;
//!
//! let id = TracerId::pack(1, 42);
//! assert_eq!(id.rank(), 1);
//! assert_eq!(id.slot(), 42);
//! assert_eq!(TracerId::from_raw(id.raw()), id);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// 示踪粒子的不可变身份标识
///
/// 一个 64 位值，编码粒子创建时的 (起源分区号, 起源槽位)。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TracerId(i64);

impl TracerId {
    /// 打包 (分区号, 槽位) 为身份标识
    ///
    /// # 参数
    /// - `rank`: 起源分区号
    /// - `slot`: 播种时的局部槽位
    #[inline]
    pub const fn pack(rank: i32, slot: i32) -> Self {
        Self(((rank as i64) << 32) | (slot as u32 as i64))
    }

    /// 解码起源分区号
    #[inline]
    pub const fn rank(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// 解码起源槽位
    #[inline]
    pub const fn slot(self) -> i32 {
        self.0 as i32
    }

    /// 原始 64 位值（用于二进制数据集存储）
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// 从原始 64 位值恢复
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for TracerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TracerId({}:{})", self.rank(), self.slot())
    }
}

impl fmt::Display for TracerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rank(), self.slot())
    }
}

// ========================================================================
// 测试
// ========================================================================
