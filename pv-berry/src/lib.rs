#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 将 FreeSurfer 分割、皮层表面估计和皮层下结构三种来源的组织估计
//! 合成为 ASL 参考网格上一致的三通道部分容积 (GM, WM, CSF).
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 重采样和皮层估计被视为外部协作者, 分别以 [`resample::Resampler`]
//!   和 [`cortex::CortexEstimator`] trait 注入. crate 只附带最简单的默认实现.
//! 2. 合成算法是纯函数, 单线程, 不做 I/O. 重采样可以借助 `rayon` 并行.
//!
//! # 模块
//!
//! ### 标签分类 ✅
//!
//! 精确表 -> 范围回退 -> 忽略集. 实现位于 `pv-berry/src/label`.
//!
//! ### 结构提取 ✅
//!
//! 每个不同的标签只分类一次, 得到通用 GM/WM 指示体积和具名结构掩膜.
//! 实现位于 `pv-berry/src/extract.rs`.
//!
//! ### 重采样与 FLIRT 变换导入 ✅
//!
//! 实现位于 `pv-berry/src/resample`.
//!
//! ### PV 合成 ✅
//!
//! 按固定顺序叠加类白质结构、皮层估计、体积法 CSF 和类灰质结构,
//! 在两个检查点校验 "三通道和为 1" 与 "各通道位于 [0, 1]".
//!
//! 实现位于 `pv-berry/src/compose`.
//!
//! ### 输出 ✅
//!
//! 四维 `(x, y, z, 3)` 体积或三个单通道体积. 实现位于 `pv-berry/src/output.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// NIfTI 文件基础数据结构.
mod data;

pub use data::{
    open_volume4, DataError, Grid, GridError, LabelVolume, NiftiHeaderAttr, ReferenceSpace,
};

pub mod consts;

pub mod label;

pub mod extract;

pub mod resample;

pub mod cortex;

pub mod compose;

pub mod output;

pub mod pipeline;

pub mod prelude;
