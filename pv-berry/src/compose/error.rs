//! 合成过程中的错误.

use std::fmt;

use thiserror::Error;

/// 不变量检查发生的位置.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Checkpoint {
    /// 体积法 CSF 回填之后.
    CsfBackfill,

    /// 截断负值之后, 除以行和之前.
    Final,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::CsfBackfill => write!(f, "after CSF backfill"),
            Checkpoint::Final => write!(f, "after clipping"),
        }
    }
}

/// 违反的不变量种类.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// 三通道之和偏离 1.
    SumNotOne,

    /// 第 `0` 个通道小于 0.
    BelowZero(usize),

    /// 第 `0` 个通道大于 1.
    AboveOne(usize),

    /// 第 `0` 个通道为 NaN 或无穷.
    NotFinite(usize),
}

/// 单个体素上的一次违反.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Violation {
    /// 展平后的体素索引.
    pub voxel: usize,

    /// 种类.
    pub kind: ViolationKind,

    /// 偏离量 (取绝对值).
    pub magnitude: f32,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::SumNotOne => {
                write!(f, "voxel {}: sum off by {:e}", self.voxel, self.magnitude)
            }
            ViolationKind::BelowZero(c) => write!(
                f,
                "voxel {}: channel {c} below 0 by {:e}",
                self.voxel, self.magnitude
            ),
            ViolationKind::AboveOne(c) => write!(
                f,
                "voxel {}: channel {c} above 1 by {:e}",
                self.voxel, self.magnitude
            ),
            ViolationKind::NotFinite(c) => {
                write!(f, "voxel {}: channel {c} is not finite", self.voxel)
            }
        }
    }
}

fn first(violations: &[Violation]) -> String {
    violations
        .first()
        .map_or_else(String::new, |v| format!(", first: {v}"))
}

/// 合成错误. 所有错误均为致命错误.
#[derive(Debug, Error)]
pub enum CompositionError {
    /// 部分容积不变量被破坏. 携带全部违反的体素.
    #[error("{} PV invariant violation(s) {checkpoint}{}", .violations.len(), first(.violations))]
    InvariantViolated {
        /// 检查点.
        checkpoint: Checkpoint,
        /// 违反列表, 非空.
        violations: Vec<Violation>,
    },

    /// 输入的体素个数不一致.
    #[error("`{what}` has {found} voxels, expected {expected}")]
    ShapeMismatch {
        /// 出错的输入.
        what: String,
        /// 期望的体素个数.
        expected: usize,
        /// 实际的体素个数.
        found: usize,
    },

    /// 皮层估计不是 3 通道.
    #[error("cortex estimate has {0} channels, expected 3")]
    CortexChannels(usize),

    /// 同一结构既在类白质列表又在类灰质表中, 或在类白质列表中重复.
    #[error("structure `{0}` is supplied more than once")]
    DuplicateStructure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_first_violation() {
        let err = CompositionError::InvariantViolated {
            checkpoint: Checkpoint::CsfBackfill,
            violations: vec![Violation {
                voxel: 3,
                kind: ViolationKind::NotFinite(0),
                magnitude: f32::NAN,
            }],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 PV invariant violation(s) after CSF backfill"));
        assert!(msg.ends_with(", first: voxel 3: channel 0 is not finite"));

        let empty = CompositionError::InvariantViolated {
            checkpoint: Checkpoint::Final,
            violations: Vec::new(),
        };
        assert_eq!(empty.to_string(), "0 PV invariant violation(s) after clipping");
    }
}
