// crates/mt_swarm/src/rotation.rs

//! 对称张量增量旋转核
//!
//! 二维对称二阶张量以 3 个独立分量 `[xx, yy, xy]` 存储。
//! 时间积分的张量字段在每步累加前先按局部增量转角 dθ 旋转，
//! 使累加始终在随动参考系中进行。
//!
//! 旋转律（t' = Qᵀ t Q 对对称张量的展开形式）：
//!
//! ```text
//! xx' = xx·cos²θ + yy·sin²θ + xy·sin2θ
//! yy' = xx·sin²θ + yy·cos²θ − xy·sin2θ
//! xy' = (yy − xx)·cosθ·sinθ + xy·cos2θ
//! ```

use rayon::prelude::*;

/// 张量分量数（二维对称张量）
pub const SYM_TENSOR_2D: usize = 3;

/// 按粒子批量旋转对称张量
///
/// # 参数
/// - `components`: 行主序张量分量，长度 = 粒子数 × 3
/// - `dtheta`: 每个粒子的增量转角，长度 = 粒子数
pub fn rotate_sym_tensor_2d(components: &mut [f64], dtheta: &[f64]) {
    debug_assert_eq!(components.len(), dtheta.len() * SYM_TENSOR_2D);

    components
        .par_chunks_mut(SYM_TENSOR_2D)
        .zip(dtheta.par_iter())
        .for_each(|(t, &theta)| {
            let (s, c) = theta.sin_cos();
            let (s2, c2) = (2.0 * theta).sin_cos();
            let (xx, yy, xy) = (t[0], t[1], t[2]);
            t[0] = xx * c * c + yy * s * s + xy * s2;
            t[1] = xx * s * s + yy * c * c - xy * s2;
            t[2] = (yy - xx) * c * s + xy * c2;
        });
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_zero_angle_is_identity() {
        let mut t = vec![10.0, 5.0, 3.0];
        rotate_sym_tensor_2d(&mut t, &[0.0]);
        assert_eq!(t, vec![10.0, 5.0, 3.0]);
    }

    #[test]
    fn test_quarter_turn_swaps_normal_components() {
        // θ = π/2: xx ↔ yy, xy → -xy
        let mut t = vec![10.0, 5.0, 3.0];
        rotate_sym_tensor_2d(&mut t, &[PI / 2.0]);
        assert!((t[0] - 5.0).abs() < 1e-12);
        assert!((t[1] - 10.0).abs() < 1e-12);
        assert!((t[2] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_full_turn_closure() {
        // 增量转角累计恰为 2π 时恢复原张量
        let original = vec![10.0, 5.0, 3.0, -2.0, 7.0, 0.5];
        let mut t = original.clone();
        let n = 360;
        let dtheta = vec![2.0 * PI / n as f64; 2];
        for _ in 0..n {
            rotate_sym_tensor_2d(&mut t, &dtheta);
        }
        for (a, b) in t.iter().zip(&original) {
            assert!((a - b).abs() < 1e-9, "闭合误差过大: {a} vs {b}");
        }
    }

    #[test]
    fn test_trace_invariant() {
        // 旋转保持张量迹不变
        let mut t = vec![4.0, -1.0, 2.5];
        let trace = t[0] + t[1];
        rotate_sym_tensor_2d(&mut t, &[0.37]);
        assert!((t[0] + t[1] - trace).abs() < 1e-12);
    }

    #[test]
    fn test_per_particle_angles() {
        // 每个粒子独立的转角
        let mut t = vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        rotate_sym_tensor_2d(&mut t, &[0.0, PI / 2.0]);
        assert!((t[0] - 1.0).abs() < 1e-12);
        assert!((t[3] - 0.0).abs() < 1e-12);
        assert!((t[4] - 1.0).abs() < 1e-12);
    }
}
