// crates/mt_swarm/src/lib.rs

//! MantleTrace 示踪粒子群模块
//!
//! 本模块提供地球动力学模拟中的被动示踪粒子功能：
//!
//! # 子模块
//!
//! - [`partition`]: 分区上下文与集合同步原语
//! - [`velocity`]: 共享速度场与竖向平流作用域
//! - [`swarm`]: 示踪粒子群（播种、身份、平流）
//! - [`registry`]: 追踪字段注册表（瞬时与时间积分字段）
//! - [`rotation`]: 对称张量增量旋转核
//!
//! # 主要类型
//!
//! ## 粒子群
//!
//! - [`TracerSwarm`]: 本分区的示踪粒子集合
//! - [`SwarmConfig`]: 粒子群配置（名称、逃逸、竖向平流）
//! - [`SwarmStats`]: 粒子群统计量
//!
//! ## 追踪字段
//!
//! - [`FieldSampler`]: 采样器接口（位置批量 → 数值批量）
//! - [`TrackedFieldRegistry`]: 按注册顺序迭代的字段注册表
//! - [`FieldSpec`] / [`FieldKind`] / [`DataType`]: 字段元数据
//!
//! ## 分区
//!
//! - [`PartitionComm`]: 集合通信接口（rank / barrier / gather）
//! - [`SoloComm`] / [`ThreadComm`]: 单分区与线程组实现
//! - [`PartitionContext`]: 分区号 + 本地域边界
//!
//! # 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use mt_swarm::prelude::*;
//!
//! let comm: Arc<dyn PartitionComm> = Arc::new(SoloComm);
//! let bounds = DomainBounds::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
//! let ctx = PartitionContext::new(comm, bounds);
//!
//! let field = GridVelocity::uniform(2, &[0.0, 0.0], &[1.0, 1.0], &[1.0, 0.0]).unwrap();
//! let velocity = SharedVelocity::new(field);
//!
//! let config = SwarmConfig::new("markers");
//! let mut swarm = TracerSwarm::seed(
//!     config, ctx, velocity,
//!     &[vec![0.1, 0.2, 0.3], vec![0.5]],
//! ).unwrap();
//!
//! swarm.integrate(0.01).unwrap();
//! assert_eq!(swarm.local_count(), 3);
//! ```
//!
//! # 设计原则
//!
//! 1. **分区局部状态**: 粒子位置与身份仅属于本分区，跨分区交互
//!    只发生在显式的集合同步点
//! 2. **显式上下文**: 不使用全局通信器；所有需要 rank/barrier 的
//!    操作接收 [`PartitionContext`]
//! 3. **身份不变**: 粒子身份在播种后立即赋值，终生不变
//! 4. **注册表拥有存储**: 字段存储与粒子行严格对齐，粒子逃逸时
//!    所有字段同步压缩

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod partition;
pub mod registry;
pub mod rotation;
pub mod swarm;
pub mod velocity;

// 重导出常用类型
pub use partition::{DomainBounds, PartitionComm, PartitionContext, SoloComm, ThreadComm};
pub use registry::{
    DataType, FieldKind, FieldSampler, FieldSpec, SamplerFn, TrackedField, TrackedFieldRegistry,
};
pub use rotation::rotate_sym_tensor_2d;
pub use swarm::{SwarmConfig, SwarmStats, TracerSwarm};
pub use velocity::{GridVelocity, SharedVelocity, VerticalOnlyScope};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::partition::{
        DomainBounds, PartitionComm, PartitionContext, SoloComm, ThreadComm,
    };
    pub use crate::registry::{
        DataType, FieldKind, FieldSampler, FieldSpec, SamplerFn, TrackedFieldRegistry,
    };
    pub use crate::swarm::{SwarmConfig, SwarmStats, TracerSwarm};
    pub use crate::velocity::{GridVelocity, SharedVelocity};
    pub use mt_foundation::prelude::*;
}
