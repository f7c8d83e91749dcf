//! 命令行工具: 从 FreeSurfer `aparc+aseg` 与皮层估计合成参考网格上的部分容积.
//!
//! 日志级别由 `RUST_LOG` 控制, 默认为 `info`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use nalgebra::Matrix4;
use simple_logger::SimpleLogger;

use pv_berry::cortex::{PrecomputedCortex, SurfacePaths};
use pv_berry::label::{LabelClassifier, LabelTable};
use pv_berry::output::{write_pvs, OutputLayout};
use pv_berry::pipeline::PvPipeline;
use pv_berry::resample::{read_flirt_matrix, struct2ref_from_flirt, AffineResampler};
use pv_berry::{LabelVolume, NiftiHeaderAttr, ReferenceSpace};

/// 基于 FreeSurfer 体积分割 (皮层下) 与表面法估计 (皮层) 生成参考网格上的 PV 估计.
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// FreeSurfer 体积分割 (aparc+aseg) 的 NIfTI 文件
    #[arg(long)]
    aparcseg: PathBuf,

    /// 左白质表面
    #[arg(long, alias = "LWS")]
    lws: PathBuf,

    /// 左软脑膜表面
    #[arg(long, alias = "LPS")]
    lps: PathBuf,

    /// 右软脑膜表面
    #[arg(long, alias = "RPS")]
    rps: PathBuf,

    /// 右白质表面
    #[arg(long, alias = "RWS")]
    rws: PathBuf,

    /// 定义输出网格的参考图像
    #[arg(long = "ref")]
    reference: PathBuf,

    /// 输出路径
    #[arg(long)]
    out: PathBuf,

    /// 输出单个四维体积, 否则拆分为 `_GM`, `_WM`, `_CSF` 三个文件
    #[arg(long)]
    stack: bool,

    /// 可使用的 CPU 核心数, 默认为全部
    #[arg(long)]
    cores: Option<usize>,

    /// 外部表面估计器写出的参考网格上的皮层 (GM, WM, 非脑) 四维估计
    #[arg(long)]
    cortex: PathBuf,

    /// 参考 -> 结构像的 FLIRT 矩阵, 缺省为单位变换
    #[arg(long)]
    ref2struct: Option<PathBuf>,

    /// JSON 格式的标签查找表, 缺省为 FreeSurfer 默认表
    #[arg(long)]
    lut: Option<PathBuf>,
}

/// 获得可并行核心数.
fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 读取 JSON 查找表并校验.
fn load_classifier(path: &Path) -> Result<LabelClassifier> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read lookup table `{}`", path.display()))?;
    let table: LabelTable = serde_json::from_str(&text)
        .with_context(|| format!("invalid lookup table `{}`", path.display()))?;
    LabelClassifier::new(table)
        .with_context(|| format!("inconsistent lookup table `{}`", path.display()))
}

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("cannot initialise logger")?;

    let args = Args::parse();
    let cores = args.cores.unwrap_or_else(cpus).max(1);
    log::info!("using {cores} core(s)");

    let labels = LabelVolume::open(&args.aparcseg)
        .with_context(|| format!("cannot open segmentation `{}`", args.aparcseg.display()))?;
    let reference = ReferenceSpace::open(&args.reference)
        .with_context(|| format!("cannot open reference `{}`", args.reference.display()))?;

    let struct2ref = match &args.ref2struct {
        Some(p) => {
            let flirt = read_flirt_matrix(p)
                .with_context(|| format!("cannot load FLIRT matrix `{}`", p.display()))?;
            let structural = labels.grid().context("segmentation has an invalid affine")?;
            struct2ref_from_flirt(&flirt, reference.grid(), &structural)?
        }
        None => Matrix4::identity(),
    };

    let classifier = match &args.lut {
        Some(p) => load_classifier(p)?,
        None => LabelClassifier::freesurfer(),
    };

    let surfaces = SurfacePaths::new(&args.lws, &args.lps, &args.rws, &args.rps);
    let pipeline = PvPipeline::new(
        AffineResampler::new(struct2ref)?,
        PrecomputedCortex::new(&args.cortex),
    )
    .with_classifier(classifier)
    .with_cores(cores);

    let out = pipeline
        .run(&labels, &surfaces, reference.grid(), &struct2ref)
        .context("PV estimation failed")?;
    if !out.unknown.is_empty() {
        log::warn!("unassigned labels (left as CSF): {:?}", out.unknown);
    }

    let layout = if args.stack {
        OutputLayout::Stacked
    } else {
        OutputLayout::Split
    };
    write_pvs(&reference, out.pvs.view(), &args.out, layout)
        .with_context(|| format!("cannot write output `{}`", args.out.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "extract-pvs",
            "--aparcseg",
            "aparc+aseg.nii.gz",
            "--LWS",
            "lh.white",
            "--lps",
            "lh.pial",
            "--rps",
            "rh.pial",
            "--rws",
            "rh.white",
            "--ref",
            "asl.nii.gz",
            "--out",
            "pvs.nii.gz",
            "--cortex",
            "cortex.nii.gz",
            "--stack",
        ]);
        assert!(args.stack);
        assert_eq!(args.lws, PathBuf::from("lh.white"));
        assert_eq!(args.reference, PathBuf::from("asl.nii.gz"));
        assert!(args.cores.is_none() && args.ref2struct.is_none() && args.lut.is_none());
    }
}
