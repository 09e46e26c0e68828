// crates/mt_swarm/src/velocity.rs

//! 共享速度场
//!
//! 本模块提供示踪粒子平流所消费的速度场接口：
//!
//! - [`GridVelocity`]: 结构化网格节点速度样本，双线性/三线性插值
//! - [`SharedVelocity`]: 可被同分区其他消费者共享的读多写少句柄
//! - [`VerticalOnlyScope`]: 竖向平流的作用域守卫（快照 → 置零 →
//!   同步，退出时恢复并再同步，出错路径同样恢复）
//!
//! # 共享资源约定
//!
//! 速度场是本分区内被多方读取的共享资源。本模块只在竖向平流的
//! 置零/恢复窗口内对其取得临时独占写权限，并保证在窗口结束前
//! 恢复原始数据——即使平流中途出错。

use crate::partition::PartitionComm;
use glam::DVec2;
use mt_foundation::{ensure, MtError, MtResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

// ============================================================
// 网格速度场
// ============================================================

/// 结构化网格上的节点速度样本
///
/// 节点按行主序存储（x 最快），每节点 `dim` 个分量。采样位置
/// 超出网格范围时按边界节点值钳制（越界粒子由调用方的域配置
/// 负责，见逃逸语义）。
#[derive(Debug, Clone, PartialEq)]
pub struct GridVelocity {
    dim: usize,
    shape: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
    data: Vec<f64>,
}

impl GridVelocity {
    /// 从节点数据创建速度场
    ///
    /// # 参数
    /// - `dim`: 空间维度（2 或 3）
    /// - `shape`: 各轴节点数（长度 = `dim`，每轴至少 1）
    /// - `origin`: 网格原点坐标
    /// - `spacing`: 各轴节点间距
    /// - `data`: 节点速度，长度 = 节点总数 × `dim`
    pub fn new(
        dim: usize,
        shape: &[usize],
        origin: &[f64],
        spacing: &[f64],
        data: Vec<f64>,
    ) -> MtResult<Self> {
        ensure!(
            dim == 2 || dim == 3,
            MtError::config(format!("速度场维度必须为 2 或 3, 实际 {dim}"))
        );
        MtError::check_size("shape", dim, shape.len())?;
        MtError::check_size("origin", dim, origin.len())?;
        MtError::check_size("spacing", dim, spacing.len())?;
        for a in 0..dim {
            ensure!(
                shape[a] >= 1,
                MtError::config(format!("轴 {a} 节点数必须至少为 1"))
            );
            ensure!(
                spacing[a] > 0.0,
                MtError::config(format!("轴 {a} 间距必须为正, 实际 {}", spacing[a]))
            );
        }

        let mut full_shape = [1usize; 3];
        let mut full_origin = [0.0; 3];
        let mut full_spacing = [1.0; 3];
        full_shape[..dim].copy_from_slice(shape);
        full_origin[..dim].copy_from_slice(origin);
        full_spacing[..dim].copy_from_slice(spacing);

        let nodes: usize = full_shape.iter().product();
        MtError::check_size("data", nodes * dim, data.len())?;

        Ok(Self {
            dim,
            shape: full_shape,
            origin: full_origin,
            spacing: full_spacing,
            data,
        })
    }

    /// 创建覆盖 `[min, max]` 的匀速场（每轴 2 个节点）
    pub fn uniform(dim: usize, min: &[f64], max: &[f64], v: &[f64]) -> MtResult<Self> {
        MtError::check_size("min", dim, min.len())?;
        MtError::check_size("max", dim, max.len())?;
        MtError::check_size("v", dim, v.len())?;
        let shape = vec![2usize; dim];
        let spacing: Vec<f64> = (0..dim).map(|a| max[a] - min[a]).collect();
        let nodes = 1usize << dim;
        let mut data = Vec::with_capacity(nodes * dim);
        for _ in 0..nodes {
            data.extend_from_slice(v);
        }
        Self::new(dim, &shape, min, &spacing, data)
    }

    /// 以解析函数填充节点速度
    ///
    /// `f(position, out)` 在每个节点坐标处求值。
    pub fn from_fn<F>(
        dim: usize,
        shape: &[usize],
        origin: &[f64],
        spacing: &[f64],
        f: F,
    ) -> MtResult<Self>
    where
        F: Fn(&[f64], &mut [f64]),
    {
        ensure!(
            dim == 2 || dim == 3,
            MtError::config(format!("速度场维度必须为 2 或 3, 实际 {dim}"))
        );
        MtError::check_size("shape", dim, shape.len())?;
        MtError::check_size("origin", dim, origin.len())?;
        MtError::check_size("spacing", dim, spacing.len())?;
        let mut full_shape = [1usize; 3];
        full_shape[..dim].copy_from_slice(shape);
        let nodes: usize = full_shape.iter().product();
        let mut data = vec![0.0; nodes * dim];
        let mut pos = [0.0; 3];
        for k in 0..full_shape[2] {
            for j in 0..full_shape[1] {
                for i in 0..full_shape[0] {
                    let idx = [i, j, k];
                    for a in 0..dim {
                        pos[a] = origin[a] + idx[a] as f64 * spacing[a];
                    }
                    let ni = (k * full_shape[1] + j) * full_shape[0] + i;
                    f(&pos[..dim], &mut data[ni * dim..(ni + 1) * dim]);
                }
            }
        }
        Self::new(dim, shape, origin, spacing, data)
    }

    /// 空间维度
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 节点数据（只读）
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// 节点数据（可变，仅限本 crate 的作用域守卫使用）
    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// 将所有非最后分量置零（竖向平流窗口）
    pub(crate) fn zero_horizontal(&mut self) {
        let dim = self.dim;
        for node in self.data.chunks_mut(dim) {
            for c in &mut node[..dim - 1] {
                *c = 0.0;
            }
        }
    }

    #[inline]
    fn node_index(&self, idx: [usize; 3]) -> usize {
        (idx[2] * self.shape[1] + idx[1]) * self.shape[0] + idx[0]
    }

    /// 定位某轴上的插值基点与小数部分（边界钳制）
    #[inline]
    fn locate(&self, axis: usize, x: f64) -> (usize, f64) {
        let n = self.shape[axis];
        if n == 1 {
            return (0, 0.0);
        }
        let t = ((x - self.origin[axis]) / self.spacing[axis]).clamp(0.0, (n - 1) as f64);
        let base = (t.floor() as usize).min(n - 2);
        (base, t - base as f64)
    }

    /// 在任意位置插值速度
    ///
    /// `out` 长度必须等于 `dim`。
    pub fn velocity_at(&self, p: &[f64], out: &mut [f64]) {
        debug_assert_eq!(p.len(), self.dim);
        debug_assert_eq!(out.len(), self.dim);

        let mut base = [0usize; 3];
        let mut frac = [0.0; 3];
        for a in 0..self.dim {
            let (b, f) = self.locate(a, p[a]);
            base[a] = b;
            frac[a] = f;
        }

        out.fill(0.0);
        for corner in 0..(1usize << self.dim) {
            let mut w = 1.0;
            let mut idx = [0usize; 3];
            for a in 0..self.dim {
                if corner >> a & 1 == 1 {
                    idx[a] = (base[a] + 1).min(self.shape[a] - 1);
                    w *= frac[a];
                } else {
                    idx[a] = base[a];
                    w *= 1.0 - frac[a];
                }
            }
            if w == 0.0 {
                continue;
            }
            let ni = self.node_index(idx);
            for c in 0..self.dim {
                out[c] += w * self.data[ni * self.dim + c];
            }
        }
    }

    /// 二维采样的便捷封装
    pub fn velocity2(&self, p: DVec2) -> DVec2 {
        debug_assert_eq!(self.dim, 2);
        let mut out = [0.0; 2];
        self.velocity_at(&[p.x, p.y], &mut out);
        DVec2::new(out[0], out[1])
    }

    /// 局部角速度 ω = ½(∂v_y/∂x − ∂v_x/∂y)
    ///
    /// 中心差分，步长为半个节点间距。仅对二维场有定义，三维场
    /// 返回 0（张量旋转路径只在二维运行中启用）。
    pub fn angular_velocity_at(&self, p: &[f64]) -> f64 {
        if self.dim != 2 {
            return 0.0;
        }
        let hx = 0.5 * self.spacing[0];
        let hy = 0.5 * self.spacing[1];
        let q = DVec2::new(p[0], p[1]);
        let dvy_dx =
            (self.velocity2(q + DVec2::new(hx, 0.0)).y - self.velocity2(q - DVec2::new(hx, 0.0)).y)
                / (2.0 * hx);
        let dvx_dy =
            (self.velocity2(q + DVec2::new(0.0, hy)).x - self.velocity2(q - DVec2::new(0.0, hy)).x)
                / (2.0 * hy);
        0.5 * (dvy_dx - dvx_dy)
    }
}

// ============================================================
// 共享句柄
// ============================================================

/// 速度场的共享句柄
///
/// 同一分区内的多个消费者（平流、其他诊断）通过克隆句柄读取
/// 同一份场数据。写权限只在竖向平流作用域内短暂取得。
#[derive(Clone)]
pub struct SharedVelocity {
    inner: Arc<RwLock<GridVelocity>>,
}

impl SharedVelocity {
    /// 包装一个网格速度场
    pub fn new(field: GridVelocity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(field)),
        }
    }

    /// 空间维度
    pub fn dim(&self) -> usize {
        self.inner.read().dim()
    }

    /// 取得读锁
    pub fn read(&self) -> RwLockReadGuard<'_, GridVelocity> {
        self.inner.read()
    }

    /// 取得写锁
    pub fn write(&self) -> RwLockWriteGuard<'_, GridVelocity> {
        self.inner.write()
    }

    /// 当前节点数据的副本（用于恢复验证）
    pub fn data_snapshot(&self) -> Vec<f64> {
        self.inner.read().data().to_vec()
    }
}

// ============================================================
// 竖向平流作用域
// ============================================================

/// 竖向平流的作用域守卫
///
/// 进入时快照完整速度场、将所有非最后分量置零并同步；离开时
/// （包括错误路径上的析构）恢复快照并再次同步。作用域存续期间
/// 对共享场的修改对其他并发消费者不可见地完成替换——任何同分区
/// 读者在窗口内读到的就是置零后的场，窗口结束后恢复原值逐位
/// 一致。
pub struct VerticalOnlyScope {
    field: SharedVelocity,
    comm: Arc<dyn PartitionComm>,
    saved: Vec<f64>,
}

impl VerticalOnlyScope {
    /// 进入竖向平流窗口
    pub fn enter(field: &SharedVelocity, comm: Arc<dyn PartitionComm>) -> Self {
        let saved = {
            let mut guard = field.write();
            let saved = guard.data().to_vec();
            guard.zero_horizontal();
            saved
        };
        // 同步置零后的场
        comm.barrier();
        Self {
            field: field.clone(),
            comm,
            saved,
        }
    }
}

impl Drop for VerticalOnlyScope {
    fn drop(&mut self) {
        {
            let mut guard = self.field.write();
            guard.data_mut().copy_from_slice(&self.saved);
        }
        // 同步恢复后的场
        self.comm.barrier();
    }
}

// ============================================================
// 测试
// ============================================================
