// crates/mt_swarm/src/registry.rs

//! 追踪字段注册表
//!
//! 本模块定义粒子群上动态注册的追踪字段：
//! - [`FieldSampler`]: 采样器接口（位置批量 → 数值批量，定长分量）
//! - [`FieldSpec`]: 字段元数据（名称、单位、数据类型、种类）
//! - [`FieldKind`]: 显式字段分类（标量 / 向量 / 对称张量）
//! - [`TrackedFieldRegistry`]: 按注册顺序迭代的注册表
//!
//! # 概念说明
//!
//! 追踪字段分两类：
//! - **瞬时字段** (`time_integration = false`)：存储在每次检查点
//!   写出前由采样器整体刷新，检查点之间的内容视为过期
//! - **时间积分字段** (`time_integration = true`)：存储为累加器，
//!   每步按 `storage += sampler · dt` 更新；对称张量字段先在
//!   随动参考系中旋转再累加采样增量（增量不乘 dt）
//!
//! # 字段分类
//!
//! 字段种类在注册时显式声明，绝不从分量数推断：二维运行中
//! 2 分量向量字段与张量字段不会混淆。`SymmetricTensor2` 要求
//! 分量数恰为 3 且粒子群为二维。

use mt_foundation::{ensure, MtError, MtResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================
// 采样器接口
// ============================================================

/// 场采样器：位置批量到数值批量的纯映射
///
/// 采样器无副作用：相同位置批量总是产生相同输出。分量数固定，
/// 在注册时与字段声明的 `count` 核对。
pub trait FieldSampler: Send + Sync {
    /// 每个粒子产生的分量数
    fn components(&self) -> usize;

    /// 在所有粒子位置处求值
    ///
    /// # 参数
    /// - `positions`: 行主序位置，长度 = 粒子数 × `dim`
    /// - `dim`: 空间维度
    /// - `out`: 行主序输出，长度 = 粒子数 × `components()`
    fn evaluate(&self, positions: &[f64], dim: usize, out: &mut [f64]);
}

/// 闭包采样器适配器
///
/// # 示例
///
/// ```
/// use mt_swarm::registry::{FieldSampler, SamplerFn};
///
/// // 每个粒子采样其 x 坐标
/// let sampler = SamplerFn::new(1, |positions, dim, out| {
///     for (i, p) in positions.chunks(dim).enumerate() {
///         out[i] = p[0];
///     }
/// });
/// assert_eq!(sampler.components(), 1);
/// ```
pub struct SamplerFn<F> {
    components: usize,
    f: F,
}

impl<F> SamplerFn<F>
where
    F: Fn(&[f64], usize, &mut [f64]) + Send + Sync,
{
    /// 创建闭包采样器
    pub fn new(components: usize, f: F) -> Self {
        Self { components, f }
    }
}

impl<F> FieldSampler for SamplerFn<F>
where
    F: Fn(&[f64], usize, &mut [f64]) + Send + Sync,
{
    fn components(&self) -> usize {
        self.components
    }

    fn evaluate(&self, positions: &[f64], dim: usize, out: &mut [f64]) {
        (self.f)(positions, dim, out)
    }
}

// ============================================================
// 字段元数据
// ============================================================

/// 字段在数据容器中的数值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 8 字节浮点
    Float64,
    /// 8 字节整数
    Int64,
}

impl DataType {
    /// XDMF 描述符中的 NumberType 字符串
    pub fn xdmf_number_type(self) -> &'static str {
        match self {
            Self::Float64 => "Float",
            Self::Int64 => "Int",
        }
    }
}

/// 显式字段分类
///
/// 种类决定时间积分路径：只有 `SymmetricTensor2` 走旋转累加。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// 标量（1 分量）
    Scalar,
    /// 向量（任意分量数，逐分量积分）
    Vector,
    /// 二维对称二阶张量（3 分量 `[xx, yy, xy]`，随动参考系累加）
    SymmetricTensor2,
}

/// 字段注册声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// 字段名（粒子群内唯一）
    pub name: String,
    /// 物理单位标签（仅随检查点元数据传递，不参与计算）
    pub units: String,
    /// 容器数值类型
    pub data_type: DataType,
    /// 字段种类
    pub kind: FieldKind,
    /// 每个粒子的分量数
    pub count: usize,
    /// 名称或采样器冲突时是否覆盖既有条目
    pub overwrite: bool,
    /// 是否为时间积分字段
    pub time_integration: bool,
}

impl FieldSpec {
    /// 标量字段声明
    pub fn scalar(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            data_type: DataType::Float64,
            kind: FieldKind::Scalar,
            count: 1,
            overwrite: true,
            time_integration: false,
        }
    }

    /// 向量字段声明
    pub fn vector(name: impl Into<String>, units: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            data_type: DataType::Float64,
            kind: FieldKind::Vector,
            count,
            overwrite: true,
            time_integration: false,
        }
    }

    /// 二维对称张量字段声明（3 分量，时间积分）
    pub fn sym_tensor2(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            data_type: DataType::Float64,
            kind: FieldKind::SymmetricTensor2,
            count: crate::rotation::SYM_TENSOR_2D,
            overwrite: true,
            time_integration: true,
        }
    }

    /// 设置容器数值类型
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// 设置覆盖行为
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// 设置时间积分
    pub fn with_time_integration(mut self, time_integration: bool) -> Self {
        self.time_integration = time_integration;
        self
    }
}

// ============================================================
// 注册表条目
// ============================================================

/// 注册表中的单个追踪字段
///
/// 注册表独占字段存储；存储行与粒子群的粒子行严格对齐。
pub struct TrackedField {
    spec: FieldSpec,
    sampler: Arc<dyn FieldSampler>,
    storage: Vec<f64>,
}

impl TrackedField {
    /// 字段声明
    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// 采样器
    pub fn sampler(&self) -> &Arc<dyn FieldSampler> {
        &self.sampler
    }

    /// 存储（只读），长度 = 粒子数 × count
    pub fn storage(&self) -> &[f64] {
        &self.storage
    }

    /// 存储（可变）
    pub fn storage_mut(&mut self) -> &mut [f64] {
        &mut self.storage
    }
}

// ============================================================
// 注册表
// ============================================================

/// 追踪字段注册表
///
/// 条目按注册顺序保存；检查点写出按该顺序迭代（只影响文件命名
/// 的确定性，不影响数值）。
#[derive(Default)]
pub struct TrackedFieldRegistry {
    fields: Vec<TrackedField>,
}

impl TrackedFieldRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// 注册追踪字段
    ///
    /// 按名称或采样器身份查找既有条目：
    /// - 找到且 `overwrite = false`：返回 [`MtError::DuplicateField`]，
    ///   原条目不受影响
    /// - 找到且 `overwrite = true`：替换元数据，按新 `count` 重新
    ///   分配并清零存储，丢弃先前累积
    /// - 未找到：按注册顺序追加新条目，存储清零
    ///
    /// # 参数
    /// - `dim`: 粒子群空间维度（用于张量种类校验）
    /// - `local_count`: 当前本地粒子数（决定存储长度）
    pub fn register(
        &mut self,
        spec: FieldSpec,
        sampler: Arc<dyn FieldSampler>,
        dim: usize,
        local_count: usize,
    ) -> MtResult<()> {
        Self::validate(&spec, sampler.as_ref(), dim)?;

        let existing = self.fields.iter().position(|f| {
            f.spec.name == spec.name || Arc::ptr_eq(&f.sampler, &sampler)
        });

        let storage = vec![0.0; local_count * spec.count];
        match existing {
            Some(_) if !spec.overwrite => Err(MtError::duplicate_field(spec.name)),
            Some(i) => {
                self.fields[i] = TrackedField {
                    spec,
                    sampler,
                    storage,
                };
                Ok(())
            }
            None => {
                self.fields.push(TrackedField {
                    spec,
                    sampler,
                    storage,
                });
                Ok(())
            }
        }
    }

    /// 校验声明与采样器的一致性
    fn validate(spec: &FieldSpec, sampler: &dyn FieldSampler, dim: usize) -> MtResult<()> {
        ensure!(
            spec.count > 0,
            MtError::invalid_sampler(&spec.name, "分量数必须大于 0")
        );
        ensure!(
            sampler.components() == spec.count,
            MtError::invalid_sampler(
                &spec.name,
                format!(
                    "采样器分量数 {} 与声明的 count {} 不一致",
                    sampler.components(),
                    spec.count
                ),
            )
        );
        match spec.kind {
            FieldKind::Scalar => ensure!(
                spec.count == 1,
                MtError::invalid_sampler(&spec.name, "标量字段的分量数必须为 1")
            ),
            FieldKind::SymmetricTensor2 => {
                ensure!(
                    spec.count == crate::rotation::SYM_TENSOR_2D,
                    MtError::invalid_sampler(&spec.name, "对称张量字段的分量数必须为 3")
                );
                ensure!(
                    dim == 2,
                    MtError::invalid_sampler(&spec.name, "对称张量字段仅支持二维粒子群")
                );
            }
            FieldKind::Vector => {}
        }
        Ok(())
    }

    /// 字段数量
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 按注册顺序的条目切片
    pub fn fields(&self) -> &[TrackedField] {
        &self.fields
    }

    /// 按名称查找
    pub fn get(&self, name: &str) -> Option<&TrackedField> {
        self.fields.iter().find(|f| f.spec.name == name)
    }

    /// 按注册顺序遍历（可变）
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedField> {
        self.fields.iter_mut()
    }

    /// 按索引取条目（可变）
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut TrackedField> {
        self.fields.get_mut(index)
    }

    /// 按保留掩码压缩所有字段存储
    ///
    /// 粒子逃逸后调用，保持存储行与粒子行对齐；压缩是稳定的
    /// （保留行的相对顺序不变）。
    pub(crate) fn compact(&mut self, keep: &[bool]) {
        for field in &mut self.fields {
            let width = field.spec.count;
            debug_assert_eq!(field.storage.len(), keep.len() * width);
            let mut out = Vec::with_capacity(field.storage.len());
            for (row, &k) in keep.iter().enumerate() {
                if k {
                    out.extend_from_slice(&field.storage[row * width..(row + 1) * width]);
                }
            }
            field.storage = out;
        }
    }
}

// ============================================================
// 测试
// ============================================================
