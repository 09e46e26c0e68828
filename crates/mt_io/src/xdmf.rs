// crates/mt_io/src/xdmf.rs

//! XDMF 描述符生成
//!
//! 每次检查点写出一个 XDMF 描述符文件，把同一时刻的各数据容器
//! （位置、身份、追踪字段）组织为一个可被可视化工具直接打开的
//! 粒子云网格。描述符只含元数据与对容器文件的相对引用，数值
//! 负载以二进制 DataItem 形式从容器的头部之后读取。
//!
//! 描述符仅由协调分区生成，不是集合操作。

use crate::container::CONTAINER_HEADER_LEN;
use mt_swarm::registry::{DataType, FieldKind};
use std::fmt::Write;

/// XDMF 描述符构建器
///
/// 按顺序调用：[`new`](Self::new) → [`open_grid`](Self::open_grid)
/// → 若干 [`attribute`](Self::attribute) → [`finish`](Self::finish)。
pub struct XdmfBuilder {
    buf: String,
}

impl XdmfBuilder {
    /// 开始一个新描述符
    pub fn new() -> Self {
        let mut buf = String::new();
        let _ = writeln!(buf, "<?xml version=\"1.0\" ?>");
        let _ = writeln!(
            buf,
            "<Xdmf xmlns:xi=\"http://www.w3.org/2001/XInclude\" Version=\"2.0\">"
        );
        let _ = writeln!(buf, "<Domain>");
        Self { buf }
    }

    /// 打开粒子云网格并写出拓扑与几何
    ///
    /// # 参数
    /// - `name`: 网格名（粒子集名称）
    /// - `time`: 模型时刻
    /// - `rows`: 全局粒子数
    /// - `dim`: 空间维度（决定 `XY` / `XYZ` 几何）
    /// - `positions_file`: 位置容器的相对文件名
    pub fn open_grid(&mut self, name: &str, time: f64, rows: u64, dim: usize, positions_file: &str) {
        let geometry = if dim == 3 { "XYZ" } else { "XY" };
        let _ = writeln!(
            self.buf,
            "<Grid Name=\"{name}\" GridType=\"Uniform\">"
        );
        let _ = writeln!(self.buf, "\t<Time Value=\"{time}\" />");
        let _ = writeln!(
            self.buf,
            "\t<Topology Type=\"POLYVERTEX\" NodesPerElement=\"{rows}\"> </Topology>"
        );
        let _ = writeln!(self.buf, "\t<Geometry Type=\"{geometry}\">");
        self.data_item(rows, dim as u64, DataType::Float64, positions_file);
        let _ = writeln!(self.buf, "\t</Geometry>");
    }

    /// 写出一个节点属性
    ///
    /// 属性分类由字段种类给出：标量与向量直接对应；二维对称张量
    /// 的 3 分量存储既非 Tensor6 也非 Tensor（各要求 6 / 9 分量），
    /// 以 `Matrix` 写出，避免可视化工具把分量误读为空间向量。
    pub fn attribute(
        &mut self,
        name: &str,
        data_type: DataType,
        kind: FieldKind,
        rows: u64,
        cols: u64,
        file: &str,
    ) {
        let attr_type = match kind {
            FieldKind::Scalar => "Scalar",
            FieldKind::Vector => "Vector",
            FieldKind::SymmetricTensor2 => "Matrix",
        };
        let _ = writeln!(
            self.buf,
            "\t<Attribute Type=\"{attr_type}\" Center=\"Node\" Name=\"{name}\">"
        );
        self.data_item(rows, cols, data_type, file);
        let _ = writeln!(self.buf, "\t</Attribute>");
    }

    fn data_item(&mut self, rows: u64, cols: u64, data_type: DataType, file: &str) {
        let _ = writeln!(
            self.buf,
            "\t\t<DataItem Format=\"Binary\" Endian=\"Little\" Seek=\"{}\" NumberType=\"{}\" Precision=\"8\" Dimensions=\"{rows} {cols}\">{file}</DataItem>",
            CONTAINER_HEADER_LEN,
            data_type.xdmf_number_type(),
        );
    }

    /// 关闭所有标签并取出描述符文本
    pub fn finish(mut self) -> String {
        let _ = writeln!(self.buf, "</Grid>");
        let _ = writeln!(self.buf, "</Domain>");
        let _ = writeln!(self.buf, "</Xdmf>");
        self.buf
    }
}

impl Default for XdmfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// 测试
// ============================================================
