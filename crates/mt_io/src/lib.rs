// crates/mt_io/src/lib.rs

//! MantleTrace 检查点输出模块
//!
//! 本模块把粒子群状态持久化为检查点文件组：
//!
//! # 子模块
//!
//! - [`container`]: 定长数据容器（魔数 + 版本 + 类型 + 尺寸头部，
//!   小端二进制负载，集合写出）
//! - [`xdmf`]: XDMF 描述符生成（可视化工具入口）
//! - [`checkpoint`]: 检查点写出调度（容器 + 描述符 + 同步点）
//! - [`error`]: 检查点 I/O 错误类型
//!
//! # 使用示例
//!
//! ```no_run
//! use mt_io::checkpoint::save_checkpoint;
//! use mt_swarm::prelude::*;
//!
//! # fn run(swarm: &mut TracerSwarm) -> Result<(), mt_io::error::CheckpointError> {
//! let rows = save_checkpoint(swarm, "output".as_ref(), 12, 3.5e5)?;
//! log::info!("已写出 {rows} 个粒子");
//! # Ok(())
//! # }
//! ```
//!
//! # 设计原则
//!
//! 1. **集合写出**: 每个容器由全部分区按分区号顺序拼接，文件在
//!    所有分区越过最后一个同步点前保证完整
//! 2. **自描述容器**: 每个容器头部携带类型与尺寸，无需描述符
//!    即可单独读取
//! 3. **协调分区职责**: 目录创建与描述符写出只发生在协调分区

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod container;
pub mod error;
pub mod xdmf;

pub use checkpoint::{load_positions, save_checkpoint};
pub use container::{ContainerHeader, CONTAINER_HEADER_LEN, CONTAINER_MAGIC, CONTAINER_VERSION};
pub use error::{CheckpointError, CheckpointResult};
pub use xdmf::XdmfBuilder;
