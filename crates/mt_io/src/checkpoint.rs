// crates/mt_io/src/checkpoint.rs

//! 检查点写出
//!
//! 一次检查点把一个粒子群的完整可重建状态写为一组文件：
//!
//! | 文件 | 内容 |
//! |------|------|
//! | `{name}-{id}.mtd` | 位置（f64，全局行数 × dim） |
//! | `{name}_global_index-{id}.mtd` | 粒子身份（i64，全局行数 × 1） |
//! | `{name}_{field}-{id}.mtd` | 每个追踪字段的存储 |
//! | `{name}-{id}.xdmf` | 汇总描述符（仅协调分区写出） |
//!
//! # 集合调用约定
//!
//! `save_checkpoint` 是集合操作：所有分区必须以相同的目录、编号
//! 与时刻同时调用。各容器写出内部含同步点，任何分区在错误路径
//! 提前返回会使其余分区停在下一个同步点，与锁步模型一致。
//!
//! 瞬时字段的存储在写出前由采样器整体刷新；时间积分字段按当前
//! 累积值原样写出。

use crate::container;
use crate::error::{CheckpointError, CheckpointResult};
use crate::xdmf::XdmfBuilder;
use mt_swarm::registry::{DataType, FieldKind};
use mt_swarm::swarm::TracerSwarm;
use std::path::Path;

/// 位置容器文件名
pub fn positions_file_name(swarm_name: &str, checkpoint_id: u32) -> String {
    format!("{swarm_name}-{checkpoint_id}.mtd")
}

/// 身份容器文件名
pub fn index_file_name(swarm_name: &str, checkpoint_id: u32) -> String {
    format!("{swarm_name}_global_index-{checkpoint_id}.mtd")
}

/// 追踪字段容器文件名
pub fn field_file_name(swarm_name: &str, field_name: &str, checkpoint_id: u32) -> String {
    format!("{swarm_name}_{field_name}-{checkpoint_id}.mtd")
}

/// 描述符文件名
pub fn descriptor_file_name(swarm_name: &str, checkpoint_id: u32) -> String {
    format!("{swarm_name}-{checkpoint_id}.xdmf")
}

/// 写出一次检查点，返回全局粒子数
///
/// # 参数
/// - `swarm`: 粒子群（可变借用：瞬时字段存储在写出前刷新）
/// - `output_dir`: 输出目录（协调分区负责创建）
/// - `checkpoint_id`: 检查点编号，参与所有文件名
/// - `time`: 模型时刻，写入描述符
pub fn save_checkpoint(
    swarm: &mut TracerSwarm,
    output_dir: &Path,
    checkpoint_id: u32,
    time: f64,
) -> CheckpointResult<u64> {
    let comm = std::sync::Arc::clone(&swarm.ctx().comm);
    let rank = comm.rank();
    let dim = swarm.dim();
    let name = swarm.name().to_string();

    if comm.is_coordinator() {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| CheckpointError::io(output_dir, rank, e))?;
    }
    comm.barrier();

    // 位置
    let positions_file = positions_file_name(&name, checkpoint_id);
    let global_rows = container::write_collective(
        &output_dir.join(&positions_file),
        DataType::Float64,
        dim,
        bytemuck::cast_slice(swarm.positions()),
        comm.as_ref(),
    )?;

    // 身份
    let index_file = index_file_name(&name, checkpoint_id);
    let raw_ids: Vec<i64> = swarm.ids().iter().map(|id| id.raw()).collect();
    container::write_collective(
        &output_dir.join(&index_file),
        DataType::Int64,
        1,
        bytemuck::cast_slice(&raw_ids),
        comm.as_ref(),
    )?;

    // 追踪字段：瞬时字段先刷新，再按注册顺序写出
    let mut field_entries = Vec::with_capacity(swarm.registry().len());
    for index in 0..swarm.registry().len() {
        swarm.refresh_instantaneous_field(index)?;
        let field = &swarm.registry().fields()[index];
        let spec = field.spec().clone();
        let file = field_file_name(&name, &spec.name, checkpoint_id);
        let path = output_dir.join(&file);
        match spec.data_type {
            DataType::Float64 => {
                container::write_collective(
                    &path,
                    DataType::Float64,
                    spec.count,
                    bytemuck::cast_slice(field.storage()),
                    comm.as_ref(),
                )?;
            }
            DataType::Int64 => {
                let converted: Vec<i64> = field.storage().iter().map(|&v| v as i64).collect();
                container::write_collective(
                    &path,
                    DataType::Int64,
                    spec.count,
                    bytemuck::cast_slice(&converted),
                    comm.as_ref(),
                )?;
            }
        }
        field_entries.push((spec, file));
    }

    // 描述符仅由协调分区生成；终结前重新打开位置容器核对
    if comm.is_coordinator() {
        verify_positions_container(&output_dir.join(&positions_file), global_rows, dim)?;
        let mut builder = XdmfBuilder::new();
        builder.open_grid(&name, time, global_rows, dim, &positions_file);
        builder.attribute(
            "global_index",
            DataType::Int64,
            FieldKind::Scalar,
            global_rows,
            1,
            &index_file,
        );
        for (spec, file) in &field_entries {
            builder.attribute(
                &spec.name,
                spec.data_type,
                spec.kind,
                global_rows,
                spec.count as u64,
                file,
            );
        }
        let descriptor_path = output_dir.join(descriptor_file_name(&name, checkpoint_id));
        std::fs::write(&descriptor_path, builder.finish())
            .map_err(|e| CheckpointError::io(&descriptor_path, rank, e))?;
        log::info!(
            "检查点 {checkpoint_id}: 粒子群 {name} 共 {global_rows} 个粒子, {} 个字段, t = {time}",
            field_entries.len()
        );
    }
    comm.barrier();

    Ok(global_rows)
}

/// 描述符终结前核对位置容器
///
/// 协调分区在写出描述符前重新打开位置容器（只读），确认头部
/// 可读且行列与集合写出的结果一致。容器缺失、不可读或尺寸不符
/// 都是致命错误：描述符绝不引用一个无法读回的数据集。
fn verify_positions_container(path: &Path, rows: u64, dim: usize) -> CheckpointResult<()> {
    let header = container::read_header(path)?;
    if header.data_type != DataType::Float64 || header.rows != rows || header.cols != dim as u64 {
        return Err(CheckpointError::format(
            path,
            format!(
                "位置容器头部 {:?} {}×{} 与集合写出的 {rows}×{dim} 不一致",
                header.data_type, header.rows, header.cols
            ),
        ));
    }
    Ok(())
}

/// 从检查点恢复位置与身份
///
/// 返回 `(位置, 身份原始值)`，行数与维度由容器头部给出。描述符
/// 与追踪字段不参与恢复：瞬时字段由采样器重建，时间积分字段的
/// 恢复由调用方按字段容器自行读入。
pub fn load_positions(
    output_dir: &Path,
    swarm_name: &str,
    checkpoint_id: u32,
) -> CheckpointResult<(Vec<f64>, Vec<i64>)> {
    let positions_path = output_dir.join(positions_file_name(swarm_name, checkpoint_id));
    let (pos_header, positions) = container::read_f64(&positions_path)?;

    let index_path = output_dir.join(index_file_name(swarm_name, checkpoint_id));
    let (idx_header, ids) = container::read_i64(&index_path)?;

    if idx_header.rows != pos_header.rows {
        return Err(CheckpointError::format(
            &index_path,
            format!(
                "身份行数 {} 与位置行数 {} 不一致",
                idx_header.rows, pos_header.rows
            ),
        ));
    }
    Ok((positions, ids))
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mt_foundation::TracerId;
    use mt_swarm::partition::{DomainBounds, PartitionComm, PartitionContext, ThreadComm};
    use mt_swarm::registry::{FieldSpec, SamplerFn};
    use mt_swarm::swarm::{SwarmConfig, TracerSwarm};
    use mt_swarm::velocity::{GridVelocity, SharedVelocity};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mt_checkpoint_{}_{name}", std::process::id()))
    }

    fn solo_swarm(name: &str, xs: Vec<f64>, ys: Vec<f64>) -> TracerSwarm {
        let bounds = DomainBounds::new(&[0.0, 0.0], &[10.0, 10.0]).unwrap();
        let ctx = PartitionContext::solo(bounds);
        let vel = SharedVelocity::new(
            GridVelocity::uniform(2, &[0.0, 0.0], &[10.0, 10.0], &[0.0, 0.0]).unwrap(),
        );
        TracerSwarm::seed(SwarmConfig::new(name), ctx, vel, &[xs, ys]).unwrap()
    }

    #[test]
    fn test_solo_checkpoint_files() {
        let dir = scratch_dir("solo");
        let mut swarm = solo_swarm("markers", vec![1.0, 2.0, 3.0], vec![5.0]);
        swarm
            .register_tracked_field(
                FieldSpec::scalar("x_coord", "km"),
                Arc::new(SamplerFn::new(1, |positions, dim, out| {
                    for (i, p) in positions.chunks(dim).enumerate() {
                        out[i] = p[0];
                    }
                })),
            )
            .unwrap();

        let rows = save_checkpoint(&mut swarm, &dir, 7, 2.5).unwrap();
        assert_eq!(rows, 3);

        // 位置容器
        let (header, positions) = container::read_f64(&dir.join("markers-7.mtd")).unwrap();
        assert_eq!(header.rows, 3);
        assert_eq!(header.cols, 2);
        assert_eq!(positions, vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]);

        // 身份容器
        let (_, ids) = container::read_i64(&dir.join("markers_global_index-7.mtd")).unwrap();
        assert_eq!(
            ids,
            vec![
                TracerId::pack(0, 0).raw(),
                TracerId::pack(0, 1).raw(),
                TracerId::pack(0, 2).raw()
            ]
        );

        // 瞬时字段在写出前刷新
        let (_, x) = container::read_f64(&dir.join("markers_x_coord-7.mtd")).unwrap();
        assert_eq!(x, vec![1.0, 2.0, 3.0]);

        // 描述符
        let xml = std::fs::read_to_string(dir.join("markers-7.xdmf")).unwrap();
        assert!(xml.contains("<Grid Name=\"markers\""));
        assert!(xml.contains("<Time Value=\"2.5\" />"));
        assert!(xml.contains("Name=\"global_index\""));
        assert!(xml.contains("Name=\"x_coord\""));
        assert!(xml.contains("markers-7.mtd"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_int64_field_container() {
        let dir = scratch_dir("int64");
        let mut swarm = solo_swarm("m", vec![1.0, 2.0], vec![1.0]);
        swarm
            .register_tracked_field(
                FieldSpec::scalar("material", "")
                    .with_data_type(mt_swarm::registry::DataType::Int64),
                Arc::new(SamplerFn::new(1, |positions, dim, out| {
                    for (i, p) in positions.chunks(dim).enumerate() {
                        out[i] = p[0] + 0.75;
                    }
                })),
            )
            .unwrap();

        save_checkpoint(&mut swarm, &dir, 0, 0.0).unwrap();
        // 截断转换为整数
        let (header, values) = container::read_i64(&dir.join("m_material-0.mtd")).unwrap();
        assert_eq!(header.data_type, DataType::Int64);
        assert_eq!(values, vec![1, 2]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_positions_round_trip() {
        let dir = scratch_dir("reload");
        let mut swarm = solo_swarm("m", vec![1.5, 2.5], vec![3.0, 4.0]);
        save_checkpoint(&mut swarm, &dir, 3, 1.0).unwrap();

        let (positions, ids) = load_positions(&dir, "m", 3).unwrap();
        assert_eq!(positions, swarm.positions());
        assert_eq!(
            ids,
            swarm.ids().iter().map(|id| id.raw()).collect::<Vec<_>>()
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_descriptor_finalization_checks_positions_header() {
        let dir = scratch_dir("verify");
        let mut swarm = solo_swarm("v", vec![1.0, 2.0], vec![1.0]);
        save_checkpoint(&mut swarm, &dir, 2, 0.0).unwrap();
        let path = dir.join("v-2.mtd");

        // 行数或维度与集合写出不一致
        assert!(matches!(
            verify_positions_container(&path, 3, 2),
            Err(CheckpointError::Format { .. })
        ));
        assert!(verify_positions_container(&path, 2, 3).is_err());
        assert!(verify_positions_container(&path, 2, 2).is_ok());

        // 头部被截断后不可读
        std::fs::write(&path, b"MT").unwrap();
        assert!(matches!(
            verify_positions_container(&path, 2, 2),
            Err(CheckpointError::Io { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_save_fails_when_positions_container_lost_before_descriptor() {
        // 位置容器在集合写出之后、描述符终结之前损坏：
        // 核对失败，描述符不写出
        let dir = scratch_dir("lost");
        let mut swarm = solo_swarm("m", vec![1.0, 2.0], vec![1.0]);
        let positions_path = dir.join("m-0.mtd");
        let clobber = positions_path.clone();
        swarm
            .register_tracked_field(
                FieldSpec::scalar("diagnostic", ""),
                Arc::new(SamplerFn::new(1, move |positions, dim, out| {
                    let n = positions.len() / dim;
                    out[..n].fill(0.0);
                    let _ = std::fs::write(&clobber, b"xx");
                })),
            )
            .unwrap();

        let err = save_checkpoint(&mut swarm, &dir, 0, 0.0).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Io { .. } | CheckpointError::Format { .. }
        ));
        assert!(!dir.join("m-0.xdmf").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_collective_checkpoint_two_partitions() {
        let dir = scratch_dir("team");
        let team = ThreadComm::team(2);
        std::thread::scope(|s| {
            for comm in team {
                let dir = dir.clone();
                s.spawn(move || {
                    let rank = comm.rank();
                    let bounds = DomainBounds::new(&[0.0, 0.0], &[10.0, 10.0]).unwrap();
                    let ctx = PartitionContext::new(Arc::new(comm), bounds);
                    let vel = SharedVelocity::new(
                        GridVelocity::uniform(2, &[0.0, 0.0], &[10.0, 10.0], &[0.0, 0.0]).unwrap(),
                    );
                    // 每分区 3 个粒子，x 坐标按分区错开
                    let xs: Vec<f64> = (0..3).map(|i| rank as f64 * 5.0 + i as f64).collect();
                    let mut swarm = TracerSwarm::seed(
                        SwarmConfig::new("team"),
                        ctx,
                        vel,
                        &[xs, vec![1.0]],
                    )
                    .unwrap();
                    let rows = save_checkpoint(&mut swarm, &dir, 1, 0.5).unwrap();
                    assert_eq!(rows, 6);
                });
            }
        });

        // 行按分区号顺序拼接
        let (header, positions) = container::read_f64(&dir.join("team-1.mtd")).unwrap();
        assert_eq!(header.rows, 6);
        assert_eq!(
            positions,
            vec![0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 5.0, 1.0, 6.0, 1.0, 7.0, 1.0]
        );

        let (_, ids) = container::read_i64(&dir.join("team_global_index-1.mtd")).unwrap();
        let expected: Vec<i64> = (0..2)
            .flat_map(|r| (0..3).map(move |s| TracerId::pack(r, s).raw()))
            .collect();
        assert_eq!(ids, expected);

        // 描述符只出现一次，由协调分区写出
        let xml = std::fs::read_to_string(dir.join("team-1.xdmf")).unwrap();
        assert!(xml.contains("NodesPerElement=\"6\""));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
