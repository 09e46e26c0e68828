// crates/mt_io/src/error.rs

//! 检查点 I/O 错误类型

use mt_foundation::MtError;
use std::path::PathBuf;
use thiserror::Error;

/// 检查点 I/O 错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// 文件系统错误
    #[error("分区 {rank} 读写 {path} 失败: {source}")]
    Io {
        /// 出错的文件路径
        path: PathBuf,
        /// 出错的分区号
        rank: usize,
        /// 底层 I/O 错误
        #[source]
        source: std::io::Error,
    },

    /// 容器格式错误（魔数、头部尺寸、数值类型标签）
    #[error("容器 {path} 格式无效: {reason}")]
    Format {
        /// 容器文件路径
        path: PathBuf,
        /// 具体原因
        reason: String,
    },

    /// 容器版本不兼容
    #[error("容器 {path} 版本 {found} 与当前版本 {current} 不兼容")]
    Version {
        /// 容器文件路径
        path: PathBuf,
        /// 文件中的版本号
        found: u32,
        /// 当前支持的版本号
        current: u32,
    },

    /// 粒子群层错误
    #[error("粒子群错误: {0}")]
    Swarm(#[from] MtError),
}

impl CheckpointError {
    /// 创建文件系统错误
    pub fn io(path: impl Into<PathBuf>, rank: usize, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            rank,
            source,
        }
    }

    /// 创建格式错误
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 检查点 I/O 的统一 Result 类型
pub type CheckpointResult<T> = Result<T, CheckpointError>;
