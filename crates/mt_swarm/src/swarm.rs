// crates/mt_swarm/src/swarm.rs

//! 示踪粒子群
//!
//! 本模块提供被动示踪粒子的核心类型 [`TracerSwarm`]：
//!
//! - **播种**: 逐维坐标数组广播到统一粒子数，播种后立即赋予
//!   不可变身份（分区号 + 局部槽位）
//! - **平流**: 二阶预估-校正显式格式（半步中点重采样）
//! - **逃逸**: 离开本分区域的粒子连同身份与所有字段行一并移除
//!   （稳定压缩，保持位置/身份/字段行的一致顺序）
//! - **时间积分**: 每步驱动注册表中的时间积分字段累加，对称
//!   张量字段先在随动参考系中旋转
//!
//! # 所有权
//!
//! 粒子群独占位置与身份；注册表独占字段存储与元数据。检查点
//! 写出器在 `save` 期间借用两者，自身不持有持久状态。

use crate::partition::PartitionContext;
use crate::registry::{FieldKind, FieldSampler, FieldSpec, TrackedFieldRegistry};
use crate::rotation::rotate_sym_tensor_2d;
use crate::velocity::{SharedVelocity, VerticalOnlyScope};
use mt_foundation::{ensure, require, MtError, MtResult, TracerId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================
// 配置
// ============================================================

/// 粒子群配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// 示踪粒子集名称（决定检查点文件名）
    pub name: String,

    /// 粒子离开分解域时是否移除（释放槽位与身份）
    ///
    /// 为 `false` 时越界粒子保留在界外状态，由调用方的域配置
    /// 负责防护。
    #[serde(default = "default_particle_escape")]
    pub particle_escape: bool,

    /// 仅沿最后一轴（竖向）平流
    #[serde(default)]
    pub vertical_only: bool,
}

fn default_particle_escape() -> bool {
    true
}

impl SwarmConfig {
    /// 以默认选项创建配置（逃逸开启，竖向平流关闭）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            particle_escape: true,
            vertical_only: false,
        }
    }

    /// 设置粒子逃逸
    pub fn with_particle_escape(mut self, particle_escape: bool) -> Self {
        self.particle_escape = particle_escape;
        self
    }

    /// 设置竖向平流
    pub fn with_vertical_only(mut self, vertical_only: bool) -> Self {
        self.vertical_only = vertical_only;
        self
    }
}

// ============================================================
// 统计量
// ============================================================

/// 粒子群统计量
#[derive(Debug, Clone, Copy, Default)]
pub struct SwarmStats {
    /// 本地粒子数
    pub local_count: usize,
    /// 各轴位置最小值
    pub min: [f64; 3],
    /// 各轴位置最大值
    pub max: [f64; 3],
}

// ============================================================
// 粒子群
// ============================================================

/// 本分区的示踪粒子集合
///
/// 每个命名示踪粒子集构造一次；追踪字段由调用方在构造后注册
/// （可以为零个）。
pub struct TracerSwarm {
    config: SwarmConfig,
    dim: usize,
    ctx: PartitionContext,
    velocity: SharedVelocity,
    positions: Vec<f64>,
    ids: Vec<TracerId>,
    registry: TrackedFieldRegistry,
}

impl std::fmt::Debug for TracerSwarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerSwarm").finish_non_exhaustive()
    }
}

impl TracerSwarm {
    /// 播种粒子群
    ///
    /// `seed_coordinates` 为逐维坐标数组（已换算到模型内部数值
    /// 尺度）。各维数组广播到最大长度：较短的数组循环重复。
    /// 每个粒子的身份在播种后、任何平流前立即赋值为
    /// `(分区号, 局部槽位)` 的打包值，此后不变。
    ///
    /// 速度场与域边界的维度不一致属于致命配置错误，在创建任何
    /// 粒子之前报告。
    pub fn seed(
        config: SwarmConfig,
        ctx: PartitionContext,
        velocity: SharedVelocity,
        seed_coordinates: &[Vec<f64>],
    ) -> MtResult<Self> {
        let dim = ctx.bounds.dim();
        ensure!(
            seed_coordinates.len() == dim,
            MtError::config(format!(
                "播种坐标维度 {} 与域维度 {} 不一致",
                seed_coordinates.len(),
                dim
            ))
        );
        ensure!(
            velocity.dim() == dim,
            MtError::config(format!(
                "速度场维度 {} 与域维度 {} 不一致",
                velocity.dim(),
                dim
            ))
        );
        for (a, coords) in seed_coordinates.iter().enumerate() {
            ensure!(
                !coords.is_empty(),
                MtError::config(format!("轴 {a} 的播种坐标数组为空"))
            );
        }

        // 广播到统一粒子数
        let count = seed_coordinates.iter().map(Vec::len).max().unwrap_or(0);
        let mut positions = vec![0.0; count * dim];
        for (a, coords) in seed_coordinates.iter().enumerate() {
            for m in 0..count {
                positions[m * dim + a] = coords[m % coords.len()];
            }
        }

        // 身份在播种后立即赋值，先于任何平流
        let rank = ctx.comm.rank() as i32;
        let ids = (0..count)
            .map(|slot| TracerId::pack(rank, slot as i32))
            .collect();

        log::info!(
            "粒子群 {} 播种 {} 个粒子 (分区 {}/{})",
            config.name,
            count,
            ctx.comm.rank(),
            ctx.comm.size()
        );

        Ok(Self {
            config,
            dim,
            ctx,
            velocity,
            positions,
            ids,
            registry: TrackedFieldRegistry::new(),
        })
    }

    /// 注册追踪字段（语义见 [`TrackedFieldRegistry::register`]）
    pub fn register_tracked_field(
        &mut self,
        spec: FieldSpec,
        sampler: Arc<dyn FieldSampler>,
    ) -> MtResult<()> {
        let local_count = self.local_count();
        self.registry.register(spec, sampler, self.dim, local_count)
    }

    /// 推进一个时间步
    ///
    /// 平流使用二阶预估-校正格式；配置为竖向平流时，速度场在
    /// 作用域窗口内被置零非竖向分量并在窗口结束时恢复（错误
    /// 路径同样恢复）。位置更新后驱动所有时间积分字段累加。
    ///
    /// 本地粒子数为零时平流为空操作（竖向平流的集合同步仍然
    /// 参与，保持各分区锁步）。
    pub fn integrate(&mut self, dt: f64) -> MtResult<()> {
        if self.config.vertical_only {
            let _scope =
                VerticalOnlyScope::enter(&self.velocity, Arc::clone(&self.ctx.comm));
            self.advect(dt);
            // 作用域在此析构：先恢复速度场，再传播任何后续错误
        } else {
            self.advect(dt);
        }

        if self.config.particle_escape {
            self.apply_escape();
        }
        self.accumulate_tracked(dt);
        Ok(())
    }

    /// 二阶预估-校正平流
    fn advect(&mut self, dt: f64) {
        let dim = self.dim;
        let guard = self.velocity.read();
        let field = &*guard;
        self.positions.par_chunks_mut(dim).for_each(|p| {
            let mut v = [0.0; 3];
            field.velocity_at(p, &mut v[..dim]);
            let mut mid = [0.0; 3];
            for a in 0..dim {
                mid[a] = p[a] + 0.5 * dt * v[a];
            }
            field.velocity_at(&mid[..dim], &mut v[..dim]);
            for a in 0..dim {
                p[a] += dt * v[a];
            }
        });
    }

    /// 移除离开本分区域的粒子
    ///
    /// 稳定压缩：位置、身份与所有字段存储按同一保留掩码压缩，
    /// 行对应关系保持一致。
    fn apply_escape(&mut self) {
        let dim = self.dim;
        let bounds = self.ctx.bounds;
        let keep: Vec<bool> = self
            .positions
            .chunks(dim)
            .map(|p| bounds.contains(p))
            .collect();
        let removed = keep.iter().filter(|&&k| !k).count();
        if removed == 0 {
            return;
        }

        let mut compacted = Vec::with_capacity((keep.len() - removed) * dim);
        for (row, &k) in keep.iter().enumerate() {
            if k {
                compacted.extend_from_slice(&self.positions[row * dim..(row + 1) * dim]);
            }
        }
        self.positions = compacted;

        let mut row = 0;
        self.ids.retain(|_| {
            let k = keep[row];
            row += 1;
            k
        });

        self.registry.compact(&keep);
        log::debug!(
            "粒子群 {}: {} 个粒子离开分区 {} 的域并被移除",
            self.config.name,
            removed,
            self.ctx.comm.rank()
        );
    }

    /// 驱动所有时间积分字段累加
    fn accumulate_tracked(&mut self, dt: f64) {
        let dim = self.dim;
        let n = self.positions.len() / dim;
        if n == 0 {
            return;
        }
        let positions = &self.positions;
        let velocity = &self.velocity;

        // 角速度批量只在存在张量字段时采样一次
        let mut dtheta: Option<Vec<f64>> = None;

        for field in self.registry.iter_mut() {
            if !field.spec().time_integration {
                continue;
            }
            let count = field.spec().count;
            let mut sampled = vec![0.0; n * count];
            field.sampler().evaluate(positions, dim, &mut sampled);

            match field.spec().kind {
                FieldKind::SymmetricTensor2 => {
                    let th = dtheta.get_or_insert_with(|| {
                        let guard = velocity.read();
                        positions
                            .chunks(dim)
                            .map(|p| dt * guard.angular_velocity_at(p))
                            .collect()
                    });
                    rotate_sym_tensor_2d(field.storage_mut(), th);
                    // 采样器返回的已是单步增量，不再乘 dt
                    for (acc, inc) in field.storage_mut().iter_mut().zip(&sampled) {
                        *acc += *inc;
                    }
                }
                FieldKind::Scalar | FieldKind::Vector => {
                    for (acc, inc) in field.storage_mut().iter_mut().zip(&sampled) {
                        *acc += *inc * dt;
                    }
                }
            }
        }
    }

    /// 刷新一个瞬时字段的存储（时间积分字段为空操作）
    ///
    /// 检查点写出器在写出每个瞬时字段前调用：存储被采样器输出
    /// 整体覆盖（全新求值，不是累加）。
    pub fn refresh_instantaneous_field(&mut self, index: usize) -> MtResult<()> {
        let dim = self.dim;
        let positions = &self.positions;
        let field = require!(
            self.registry.get_index_mut(index),
            MtError::config(format!("字段索引 {index} 越界"))
        );
        if field.spec().time_integration {
            return Ok(());
        }
        let sampler = Arc::clone(field.sampler());
        sampler.evaluate(positions, dim, field.storage_mut());
        Ok(())
    }

    /// 粒子集名称
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// 空间维度
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 本地粒子数
    pub fn local_count(&self) -> usize {
        self.positions.len() / self.dim
    }

    /// 行主序位置，长度 = 本地粒子数 × dim
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// 粒子身份，与位置行一一对应
    pub fn ids(&self) -> &[TracerId] {
        &self.ids
    }

    /// 追踪字段注册表
    pub fn registry(&self) -> &TrackedFieldRegistry {
        &self.registry
    }

    /// 追踪字段注册表（可变）
    pub fn registry_mut(&mut self) -> &mut TrackedFieldRegistry {
        &mut self.registry
    }

    /// 分区上下文
    pub fn ctx(&self) -> &PartitionContext {
        &self.ctx
    }

    /// 配置
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// 计算本地统计量
    pub fn stats(&self) -> SwarmStats {
        let n = self.local_count();
        if n == 0 {
            return SwarmStats::default();
        }
        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];
        for p in self.positions.chunks(self.dim) {
            for a in 0..self.dim {
                min[a] = min[a].min(p[a]);
                max[a] = max[a].max(p[a]);
            }
        }
        SwarmStats {
            local_count: n,
            min,
            max,
        }
    }
}

// ============================================================
// 测试
// ============================================================
