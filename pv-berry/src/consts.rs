//! 通用常量.

/// FreeSurfer `aparc+aseg` 中用到的标签值.
pub mod aseg {
    /// 左半球脑白质.
    pub const LEFT_CEREBRAL_WM: i32 = 2;

    /// 左半球皮层.
    pub const LEFT_CEREBRAL_CORTEX: i32 = 3;

    /// 左侧脑室.
    pub const LEFT_LATERAL_VENTRICLE: i32 = 4;

    /// 左侧脑室下角.
    pub const LEFT_INF_LAT_VENT: i32 = 5;

    /// 左小脑外部. 不做标注.
    pub const LEFT_CEREBELLUM_EXTERIOR: i32 = 6;

    /// 左小脑白质.
    pub const LEFT_CEREBELLUM_WM: i32 = 7;

    /// 左小脑皮层.
    pub const LEFT_CEREBELLUM_CORTEX: i32 = 8;

    /// 左丘脑 (旧编号).
    pub const LEFT_THALAMUS: i32 = 9;

    /// 左丘脑.
    pub const LEFT_THALAMUS_PROPER: i32 = 10;

    /// 左尾状核.
    pub const LEFT_CAUDATE: i32 = 11;

    /// 左壳核.
    pub const LEFT_PUTAMEN: i32 = 12;

    /// 左苍白球.
    pub const LEFT_PALLIDUM: i32 = 13;

    /// 第三脑室.
    pub const THIRD_VENTRICLE: i32 = 14;

    /// 第四脑室.
    pub const FOURTH_VENTRICLE: i32 = 15;

    /// 脑干.
    pub const BRAIN_STEM: i32 = 16;

    /// 左海马.
    pub const LEFT_HIPPOCAMPUS: i32 = 17;

    /// 左杏仁核.
    pub const LEFT_AMYGDALA: i32 = 18;

    /// 脑脊液.
    pub const CSF: i32 = 24;

    /// 左伏隔核.
    pub const LEFT_ACCUMBENS: i32 = 26;

    /// 右半球脑白质.
    pub const RIGHT_CEREBRAL_WM: i32 = 41;

    /// 右半球皮层.
    pub const RIGHT_CEREBRAL_CORTEX: i32 = 42;

    /// 右侧脑室.
    pub const RIGHT_LATERAL_VENTRICLE: i32 = 43;

    /// 右侧脑室下角.
    pub const RIGHT_INF_LAT_VENT: i32 = 44;

    /// 右小脑外部. 不做标注.
    pub const RIGHT_CEREBELLUM_EXTERIOR: i32 = 45;

    /// 右小脑白质.
    pub const RIGHT_CEREBELLUM_WM: i32 = 46;

    /// 右小脑皮层.
    pub const RIGHT_CEREBELLUM_CORTEX: i32 = 47;

    /// 右丘脑 (旧编号).
    pub const RIGHT_THALAMUS: i32 = 48;

    /// 右丘脑.
    pub const RIGHT_THALAMUS_PROPER: i32 = 49;

    /// 右尾状核.
    pub const RIGHT_CAUDATE: i32 = 50;

    /// 右壳核.
    pub const RIGHT_PUTAMEN: i32 = 51;

    /// 右苍白球.
    pub const RIGHT_PALLIDUM: i32 = 52;

    /// 右海马.
    pub const RIGHT_HIPPOCAMPUS: i32 = 53;

    /// 右杏仁核.
    pub const RIGHT_AMYGDALA: i32 = 54;

    /// 右伏隔核.
    pub const RIGHT_ACCUMBENS: i32 = 58;

    /// 脑白质低信号.
    pub const WM_HYPOINTENSITIES: i32 = 77;

    /// 左侧脑白质低信号.
    pub const LEFT_WM_HYPOINTENSITIES: i32 = 78;

    /// 右侧脑白质低信号.
    pub const RIGHT_WM_HYPOINTENSITIES: i32 = 79;
}

/// 具名结构的名称. 沿用 FSL FIRST 的命名习惯.
pub mod structure {
    /// 脑干.
    pub const BRAIN_STEM: &str = "BrStem";

    /// 左小脑白质.
    pub const LEFT_CEREBELLUM_WM: &str = "L_CerWM";

    /// 右小脑白质.
    pub const RIGHT_CEREBELLUM_WM: &str = "R_CerWM";

    /// 左小脑灰质.
    pub const LEFT_CEREBELLUM_GM: &str = "L_CerGM";

    /// 右小脑灰质.
    pub const RIGHT_CEREBELLUM_GM: &str = "R_CerGM";

    /// 左伏隔核.
    pub const LEFT_ACCUMBENS: &str = "L_Accu";

    /// 右伏隔核.
    pub const RIGHT_ACCUMBENS: &str = "R_Accu";

    /// 左杏仁核.
    pub const LEFT_AMYGDALA: &str = "L_Amyg";

    /// 右杏仁核.
    pub const RIGHT_AMYGDALA: &str = "R_Amyg";

    /// 左尾状核.
    pub const LEFT_CAUDATE: &str = "L_Caud";

    /// 右尾状核.
    pub const RIGHT_CAUDATE: &str = "R_Caud";

    /// 左海马.
    pub const LEFT_HIPPOCAMPUS: &str = "L_Hipp";

    /// 右海马.
    pub const RIGHT_HIPPOCAMPUS: &str = "R_Hipp";

    /// 左苍白球.
    pub const LEFT_PALLIDUM: &str = "L_Pall";

    /// 右苍白球.
    pub const RIGHT_PALLIDUM: &str = "R_Pall";

    /// 左壳核.
    pub const LEFT_PUTAMEN: &str = "L_Puta";

    /// 右壳核.
    pub const RIGHT_PUTAMEN: &str = "R_Puta";

    /// 左丘脑.
    pub const LEFT_THALAMUS: &str = "L_Thal";

    /// 右丘脑.
    pub const RIGHT_THALAMUS: &str = "R_Thal";
}

/// 部分容积不变量的容差. 每个体素三通道之和与 1 的差, 以及单通道越界量,
/// 都不能超过该值.
pub const PV_TOLERANCE: f32 = 1e-6;

/// 皮层 GM 估计高于该值的体素被视为与皮层带相交, 不接受体积法 CSF 回填.
pub const CORTEX_GM_THRESHOLD: f32 = 0.01;

/// 体积法 CSF 估计低于该值时被置零.
pub const VOLUMETRIC_CSF_FLOOR: f32 = 0.01;

/// 输出通道个数.
pub const PV_CHANNELS: usize = 3;
