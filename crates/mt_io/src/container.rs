// crates/mt_io/src/container.rs

//! 定长数据容器
//!
//! 检查点中的每个数据集（位置、身份、追踪字段）各占一个容器
//! 文件。格式为固定头部加原始小端负载：
//!
//! ```text
//! [0..4)   魔数 "MTDC"
//! [4..8)   格式版本 u32 LE
//! [8..12)  数值类型 u32 LE (1 = f64, 2 = i64)
//! [12..20) 全局行数 u64 LE
//! [20..28) 每行分量数 u64 LE
//! [28..)   负载，行主序，每分量 8 字节 LE
//! ```
//!
//! # 集合写出
//!
//! 所有分区以分区号顺序拼接各自的行：先收集各分区行数，协调
//! 分区创建文件并写入含全局行数的头部，同步后每个分区按前缀和
//! 偏移写入自己的负载，再同步一次保证文件在任何分区继续之前
//! 完整。负载为空的分区不打开文件，但仍参与全部同步点。

use crate::error::{CheckpointError, CheckpointResult};
use mt_swarm::partition::PartitionComm;
use mt_swarm::registry::DataType;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// 容器魔数
pub const CONTAINER_MAGIC: [u8; 4] = *b"MTDC";

/// 当前容器格式版本
pub const CONTAINER_VERSION: u32 = 1;

/// 头部字节数
pub const CONTAINER_HEADER_LEN: u64 = 28;

/// 每分量字节数（f64 与 i64 均为 8 字节）
pub const COMPONENT_BYTES: u64 = 8;

// ============================================================
// 头部
// ============================================================

/// 容器头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// 数值类型
    pub data_type: DataType,
    /// 全局行数
    pub rows: u64,
    /// 每行分量数
    pub cols: u64,
}

impl ContainerHeader {
    fn dtype_tag(data_type: DataType) -> u32 {
        match data_type {
            DataType::Float64 => 1,
            DataType::Int64 => 2,
        }
    }

    /// 编码为头部字节
    pub fn encode(&self) -> [u8; CONTAINER_HEADER_LEN as usize] {
        let mut buf = [0u8; CONTAINER_HEADER_LEN as usize];
        buf[0..4].copy_from_slice(&CONTAINER_MAGIC);
        buf[4..8].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&Self::dtype_tag(self.data_type).to_le_bytes());
        buf[12..20].copy_from_slice(&self.rows.to_le_bytes());
        buf[20..28].copy_from_slice(&self.cols.to_le_bytes());
        buf
    }

    /// 从头部字节解码
    pub fn decode(buf: &[u8; CONTAINER_HEADER_LEN as usize], path: &Path) -> CheckpointResult<Self> {
        if buf[0..4] != CONTAINER_MAGIC {
            return Err(CheckpointError::format(path, "魔数不匹配"));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != CONTAINER_VERSION {
            return Err(CheckpointError::Version {
                path: path.to_path_buf(),
                found: version,
                current: CONTAINER_VERSION,
            });
        }
        let data_type = match u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) {
            1 => DataType::Float64,
            2 => DataType::Int64,
            tag => {
                return Err(CheckpointError::format(
                    path,
                    format!("未知数值类型标签 {tag}"),
                ))
            }
        };
        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[12..20]);
        let rows = u64::from_le_bytes(word);
        word.copy_from_slice(&buf[20..28]);
        let cols = u64::from_le_bytes(word);
        Ok(Self {
            data_type,
            rows,
            cols,
        })
    }
}

// ============================================================
// 集合写出
// ============================================================

/// 集合写出一个容器文件，返回全局行数
///
/// `payload` 为本分区的行主序负载字节（长度 = 本地行数 × `cols`
/// × 8）。所有分区必须以相同参数（`payload` 除外）同时调用。
pub fn write_collective(
    path: &Path,
    data_type: DataType,
    cols: usize,
    payload: &[u8],
    comm: &dyn PartitionComm,
) -> CheckpointResult<u64> {
    let rank = comm.rank();
    let row_bytes = cols as u64 * COMPONENT_BYTES;
    debug_assert_eq!(payload.len() as u64 % row_bytes, 0);
    let local_rows = payload.len() as u64 / row_bytes;

    let counts = comm.gather_counts(local_rows as usize);
    let global_rows: u64 = counts.iter().map(|&c| c as u64).sum();

    // 协调分区创建文件并写入头部
    if comm.is_coordinator() {
        let header = ContainerHeader {
            data_type,
            rows: global_rows,
            cols: cols as u64,
        };
        let mut file = File::create(path).map_err(|e| CheckpointError::io(path, rank, e))?;
        file.write_all(&header.encode())
            .map_err(|e| CheckpointError::io(path, rank, e))?;
        file.set_len(CONTAINER_HEADER_LEN + global_rows * row_bytes)
            .map_err(|e| CheckpointError::io(path, rank, e))?;
    }
    comm.barrier();

    // 各分区按前缀和偏移写入自己的行段
    if !payload.is_empty() {
        let prefix: u64 = counts[..rank].iter().map(|&c| c as u64).sum();
        let offset = CONTAINER_HEADER_LEN + prefix * row_bytes;
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| CheckpointError::io(path, rank, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| CheckpointError::io(path, rank, e))?;
        file.write_all(payload)
            .map_err(|e| CheckpointError::io(path, rank, e))?;
    }
    comm.barrier();

    Ok(global_rows)
}

// ============================================================
// 读取
// ============================================================

/// 读取容器头部
pub fn read_header(path: &Path) -> CheckpointResult<ContainerHeader> {
    let mut file = File::open(path).map_err(|e| CheckpointError::io(path, 0, e))?;
    let mut buf = [0u8; CONTAINER_HEADER_LEN as usize];
    file.read_exact(&mut buf)
        .map_err(|e| CheckpointError::io(path, 0, e))?;
    ContainerHeader::decode(&buf, path)
}

fn read_payload(path: &Path, expected: DataType) -> CheckpointResult<(ContainerHeader, Vec<u8>)> {
    let mut file = File::open(path).map_err(|e| CheckpointError::io(path, 0, e))?;
    let mut buf = [0u8; CONTAINER_HEADER_LEN as usize];
    file.read_exact(&mut buf)
        .map_err(|e| CheckpointError::io(path, 0, e))?;
    let header = ContainerHeader::decode(&buf, path)?;
    if header.data_type != expected {
        return Err(CheckpointError::format(
            path,
            format!("数值类型 {:?} 与期望的 {:?} 不符", header.data_type, expected),
        ));
    }
    let len = (header.rows * header.cols * COMPONENT_BYTES) as usize;
    let mut payload = vec![0u8; len];
    file.read_exact(&mut payload)
        .map_err(|e| CheckpointError::io(path, 0, e))?;
    Ok((header, payload))
}

/// 读取完整的 f64 容器
pub fn read_f64(path: &Path) -> CheckpointResult<(ContainerHeader, Vec<f64>)> {
    let (header, payload) = read_payload(path, DataType::Float64)?;
    Ok((header, bytemuck::pod_collect_to_vec(&payload)))
}

/// 读取完整的 i64 容器
pub fn read_i64(path: &Path) -> CheckpointResult<(ContainerHeader, Vec<i64>)> {
    let (header, payload) = read_payload(path, DataType::Int64)?;
    Ok((header, bytemuck::pod_collect_to_vec(&payload)))
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mt_swarm::partition::{SoloComm, ThreadComm};
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mt_container_{}_{name}.mtd", std::process::id()))
    }

    #[test]
    fn test_header_round_trip() {
        let header = ContainerHeader {
            data_type: DataType::Int64,
            rows: 42,
            cols: 3,
        };
        let buf = header.encode();
        let decoded = ContainerHeader::decode(&buf, Path::new("t")).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let header = ContainerHeader {
            data_type: DataType::Float64,
            rows: 1,
            cols: 1,
        };
        let mut buf = header.encode();
        buf[0] = b'X';
        assert!(matches!(
            ContainerHeader::decode(&buf, Path::new("t")),
            Err(CheckpointError::Format { .. })
        ));

        let mut buf = header.encode();
        buf[4] = 99;
        assert!(matches!(
            ContainerHeader::decode(&buf, Path::new("t")),
            Err(CheckpointError::Version { found: 99, .. })
        ));
    }

    #[test]
    fn test_solo_write_read() {
        let path = scratch_path("solo");
        let values = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rows = write_collective(
            &path,
            DataType::Float64,
            2,
            bytemuck::cast_slice(&values),
            &SoloComm,
        )
        .unwrap();
        assert_eq!(rows, 3);

        let (header, data) = read_f64(&path).unwrap();
        assert_eq!(header.rows, 3);
        assert_eq!(header.cols, 2);
        assert_eq!(data, values);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_collective_write_orders_by_rank() {
        let path = scratch_path("team");
        let team = ThreadComm::team(2);
        std::thread::scope(|s| {
            for comm in team {
                let path = path.clone();
                s.spawn(move || {
                    // 分区 0 写 [0, 1]，分区 1 写 [10, 11, 12]
                    let base = comm.rank() as i64 * 10;
                    let local: Vec<i64> = (0..comm.rank() as i64 + 2).map(|i| base + i).collect();
                    let rows = write_collective(
                        &path,
                        DataType::Int64,
                        1,
                        bytemuck::cast_slice(&local),
                        &comm,
                    )
                    .unwrap();
                    assert_eq!(rows, 5);
                });
            }
        });

        let (header, data) = read_i64(&path).unwrap();
        assert_eq!(header.rows, 5);
        assert_eq!(data, vec![0, 1, 10, 11, 12]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_partition_participates() {
        let path = scratch_path("empty");
        let team = ThreadComm::team(2);
        std::thread::scope(|s| {
            for comm in team {
                let path = path.clone();
                s.spawn(move || {
                    // 分区 0 无数据，分区 1 写一行
                    let local: Vec<f64> = if comm.rank() == 0 { vec![] } else { vec![7.5] };
                    let rows = write_collective(
                        &path,
                        DataType::Float64,
                        1,
                        bytemuck::cast_slice(&local),
                        &comm,
                    )
                    .unwrap();
                    assert_eq!(rows, 1);
                });
            }
        });

        let (_, data) = read_f64(&path).unwrap();
        assert_eq!(data, vec![7.5]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_rejects_wrong_dtype() {
        let path = scratch_path("dtype");
        let values = [1.0f64];
        write_collective(
            &path,
            DataType::Float64,
            1,
            bytemuck::cast_slice(&values),
            &SoloComm,
        )
        .unwrap();
        assert!(matches!(
            read_i64(&path),
            Err(CheckpointError::Format { .. })
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
