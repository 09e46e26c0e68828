// crates/mt_swarm/src/partition.rs

//! 分区上下文与集合同步原语
//!
//! 域分解模型：固定数量的工作线程/进程，每个负责一个空间分区，
//! 以数据并行方式执行相同代码路径。跨分区交互只通过显式的集合
//! 同步点（barrier）和计数收集进行，分区之间没有细粒度锁。
//!
//! 本模块用显式的上下文对象替代隐式的全局通信器：所有需要
//! rank/barrier 的操作接收 [`PartitionContext`]，不存在模块级
//! 单例。
//!
//! # 主要类型
//!
//! - [`PartitionComm`]: 集合通信接口
//! - [`SoloComm`]: 单分区平凡实现
//! - [`ThreadComm`]: 进程内线程组实现（用于测试与共享内存运行）
//! - [`DomainBounds`]: 本分区的轴对齐域边界
//! - [`PartitionContext`]: 通信句柄 + 域边界

use mt_foundation::{ensure, MtError, MtResult};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

// ============================================================
// 集合通信接口
// ============================================================

/// 分区间集合通信接口
///
/// 所有操作均为集合操作：每个分区必须以相同顺序调用相同方法，
/// 否则行为未定义（与锁步数据并行模型一致）。任何分区在 barrier
/// 处停滞会阻塞整个集合调用。
pub trait PartitionComm: Send + Sync {
    /// 本分区号（0 起始）
    fn rank(&self) -> usize;

    /// 分区总数
    fn size(&self) -> usize;

    /// 集合同步点：所有分区到达后才返回
    fn barrier(&self);

    /// 收集各分区的本地计数，返回按分区号排列的完整计数表
    ///
    /// 集合操作：每个分区各贡献一个计数，全部分区都获得完整结果。
    fn gather_counts(&self, local: usize) -> Vec<usize>;

    /// 本分区是否为协调分区（rank 0）
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

// ============================================================
// 单分区实现
// ============================================================

/// 单分区的平凡通信实现
///
/// barrier 为空操作，计数收集返回单元素表。
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloComm;

impl PartitionComm for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn gather_counts(&self, local: usize) -> Vec<usize> {
        vec![local]
    }
}

// ============================================================
// 线程组实现
// ============================================================

/// 线程组共享状态
struct TeamShared {
    barrier: Barrier,
    slots: Mutex<Vec<usize>>,
}

/// 进程内线程组的集合通信实现
///
/// 固定大小的工作线程组共享一个 barrier 与一个交换槽表。
/// 每个工作线程持有一个带独立分区号的句柄。
///
/// # 示例
///
/// ```
/// use mt_swarm::partition::{PartitionComm, ThreadComm};
///
/// let team = ThreadComm::team(2);
/// std::thread::scope(|s| {
///     for comm in team {
///         s.spawn(move || {
///             let counts = comm.gather_counts(comm.rank() + 1);
///             assert_eq!(counts, vec![1, 2]);
///         });
///     }
/// });
/// ```
#[derive(Clone)]
pub struct ThreadComm {
    shared: Arc<TeamShared>,
    rank: usize,
}

impl ThreadComm {
    /// 创建一个大小为 `size` 的线程组，返回每个分区的句柄
    pub fn team(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "线程组大小必须大于 0");
        let shared = Arc::new(TeamShared {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![0; size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                shared: Arc::clone(&shared),
                rank,
            })
            .collect()
    }
}

impl PartitionComm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.slots.lock().len()
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn gather_counts(&self, local: usize) -> Vec<usize> {
        {
            let mut slots = self.shared.slots.lock();
            slots[self.rank] = local;
        }
        self.shared.barrier.wait();
        let counts = self.shared.slots.lock().clone();
        // 第二次同步防止下一轮收集覆盖本轮读取
        self.shared.barrier.wait();
        counts
    }
}

// ============================================================
// 域边界
// ============================================================

/// 本分区的轴对齐域边界
///
/// 用于粒子逃逸判定：位置落在边界之外的粒子视为离开分解域。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainBounds {
    min: [f64; 3],
    max: [f64; 3],
    dim: usize,
}

impl DomainBounds {
    /// 创建域边界
    ///
    /// # 参数
    /// - `min`: 各轴下界（长度 2 或 3）
    /// - `max`: 各轴上界（长度与 `min` 相同）
    pub fn new(min: &[f64], max: &[f64]) -> MtResult<Self> {
        let dim = min.len();
        ensure!(
            dim == 2 || dim == 3,
            MtError::config(format!("域维度必须为 2 或 3, 实际 {dim}"))
        );
        MtError::check_size("max", dim, max.len())?;
        for a in 0..dim {
            ensure!(
                min[a] < max[a],
                MtError::config(format!("轴 {a} 下界 {} 不小于上界 {}", min[a], max[a]))
            );
        }
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        lo[..dim].copy_from_slice(min);
        hi[..dim].copy_from_slice(max);
        Ok(Self {
            min: lo,
            max: hi,
            dim,
        })
    }

    /// 空间维度
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 各轴下界
    pub fn min(&self) -> &[f64] {
        &self.min[..self.dim]
    }

    /// 各轴上界
    pub fn max(&self) -> &[f64] {
        &self.max[..self.dim]
    }

    /// 位置是否在边界内（闭区间）
    pub fn contains(&self, p: &[f64]) -> bool {
        debug_assert_eq!(p.len(), self.dim);
        (0..self.dim).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }
}

// ============================================================
// 分区上下文
// ============================================================

/// 分区上下文：通信句柄 + 本地域边界
///
/// 所有需要分区信息的操作（平流、检查点）都显式接收该对象。
#[derive(Clone)]
pub struct PartitionContext {
    /// 集合通信句柄
    pub comm: Arc<dyn PartitionComm>,
    /// 本分区的域边界
    pub bounds: DomainBounds,
}

impl PartitionContext {
    /// 创建分区上下文
    pub fn new(comm: Arc<dyn PartitionComm>, bounds: DomainBounds) -> Self {
        Self { comm, bounds }
    }

    /// 单分区上下文（测试与串行运行）
    pub fn solo(bounds: DomainBounds) -> Self {
        Self {
            comm: Arc::new(SoloComm),
            bounds,
        }
    }
}

// ============================================================
// 测试
// ============================================================
