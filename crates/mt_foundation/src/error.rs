// crates/mt_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `MtError` 枚举和 `MtResult` 类型别名，用于整个项目的错误处理。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，检查点 IO 错误在 mt_io 中扩展
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **可追溯**: 错误携带字段名、分区号等复现所需上下文
//!
//! # 示例
//!
//! ```
//! use mt_foundation::error::{MtError, MtResult};
//!
//! fn check_dim(dim: usize) -> MtResult<()> {
//!     if dim != 2 && dim != 3 {
//!         return Err(MtError::config("维度必须为 2 或 3"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// 统一结果类型
pub type MtResult<T> = Result<T, MtError>;

/// MantleTrace 错误类型
///
/// 核心错误类型，用于整个项目。检查点 IO 相关的错误在 `mt_io` 中扩展。
#[derive(Error, Debug)]
pub enum MtError {
    /// IO 错误
    ///
    /// 检查点读写使用 `mt_io` 的专用错误类型；本变体供宿主集成
    /// 在基础层边界传递底层 IO 失败时使用。
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 无效的场采样器
    #[error("无效的采样器: 字段 {name}: {reason}")]
    InvalidSampler {
        /// 注册时使用的字段名
        name: String,
        /// 无效原因说明
        reason: String,
    },

    /// 字段名或采样器已被注册
    #[error("字段重复: {name} 名称已存在或采样器已被其他名称追踪")]
    DuplicateField {
        /// 冲突的字段名
        name: String,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 集合操作失败
    ///
    /// 只有能够感知对端失败的宿主通信器才构造本变体；进程内的
    /// barrier 实现没有超时，分区失败表现为其余分区在同步点停滞
    /// 而不是返回错误。
    #[error("集合操作失败: 分区 {rank}: {message}")]
    Collective {
        /// 出错的分区号
        rank: usize,
        /// 失败原因
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl MtError {
    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 从IO错误创建（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 无效采样器
    pub fn invalid_sampler(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSampler {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// 字段重复
    pub fn duplicate_field(name: impl Into<String>) -> Self {
        Self::DuplicateField { name: name.into() }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 集合操作失败
    pub fn collective(rank: usize, message: impl Into<String>) -> Self {
        Self::Collective {
            rank,
            message: message.into(),
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl MtError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> MtResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for MtError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 验证宏
// ========================================================================

/// 条件不满足时提前返回指定错误
///
/// ```
/// use mt_foundation::{ensure, error::{MtError, MtResult}};
///
/// fn positive(v: f64) -> MtResult<()> {
///     ensure!(v > 0.0, MtError::config("值必须为正"));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

/// 解包 `Option`，为 `None` 时提前返回指定错误
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err),
        }
    };
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MtError::config("测试配置错误");
        assert!(err.to_string().contains("配置错误"));
    }

    #[test]
    fn test_invalid_sampler_context() {
        let err = MtError::invalid_sampler("stress", "分量数不匹配");
        let msg = err.to_string();
        assert!(msg.contains("stress"));
        assert!(msg.contains("分量数不匹配"));
    }

    #[test]
    fn test_duplicate_field() {
        let err = MtError::duplicate_field("strain");
        assert!(err.to_string().contains("strain"));
    }

    #[test]
    fn test_collective_carries_rank() {
        let err = MtError::collective(3, "写入失败");
        assert!(err.to_string().contains("3"));
    }

    #[test]
    fn test_check_size() {
        assert!(MtError::check_size("test", 10, 10).is_ok());
        assert!(MtError::check_size("test", 10, 5).is_err());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let mt_err: MtError = io_err.into();
        assert!(matches!(mt_err, MtError::Io { .. }));
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> MtResult<()> {
            ensure!(value > 0, MtError::config("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }

    #[test]
    fn test_require_macro() {
        fn get_value(opt: Option<i32>) -> MtResult<i32> {
            let v = require!(opt, MtError::config("missing value"));
            Ok(v)
        }

        assert_eq!(get_value(Some(42)).unwrap(), 42);
        assert!(get_value(None).is_err());
    }
}
