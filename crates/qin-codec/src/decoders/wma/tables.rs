//! WMA 解码器固定常量表.
//!
//! 包含临界频带表、各采样率下的指数频带划分、指数/高频带增益/系数
//! VLC 码长规格. VLC 码字在初始化时由码长按 canonical 规则导出,
//! 码长集合均为完备前缀码 (Kraft 和恰为 1, 见测试).

use super::vlc::CoefTableSpec;

/// 最大声道数
pub const MAX_CHANNELS: usize = 2;

/// 块长的位数范围与上限
pub const BLOCK_MIN_BITS: u32 = 7;
pub const BLOCK_MAX_BITS: u32 = 11;
pub const BLOCK_MAX_SIZE: usize = 1 << BLOCK_MAX_BITS;

/// 支持的块长档位数上限
pub const MAX_BLOCK_SIZES: usize = (BLOCK_MAX_BITS - BLOCK_MIN_BITS) as usize + 1;

/// 高频带数量上限
pub const HIGH_BAND_MAX: usize = 16;

/// 超帧编码数据的字节数上限 (比特储备进位缓冲容量)
pub const MAX_CODED_SUPERFRAME_SIZE: usize = 16384;

/// 噪声表大小
pub const NOISE_TAB_SIZE: usize = 8192;

/// 指数 VLC 第一级表位宽与最大级数
pub const EXP_VLC_BITS: u32 = 8;
pub const EXP_VLC_MAX_DEPTH: u32 = 3;

/// 高频带增益 VLC 第一级表位宽与最大级数
pub const HGAIN_VLC_BITS: u32 = 9;
pub const HGAIN_VLC_MAX_DEPTH: u32 = 2;

/// 系数 VLC 第一级表位宽与最大级数
pub const COEF_VLC_BITS: u32 = 9;
pub const COEF_VLC_MAX_DEPTH: u32 = 3;

/// 临界频带 (Bark) 边界频率表 (Hz), 共 25 段
pub const CRITICAL_FREQS: [u32; 25] = [
    100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150, 3700,
    4400, 5300, 6400, 7700, 9500, 12000, 15500, 24500,
];

/// 44100 Hz 档的指数频带划分, 下标 = 块长档 (128/256/512)
///
/// 每行由临界频带公式预求值得到, 元素之和恰为对应块长.
pub const EXPONENT_BAND_44100: [&[u8]; 3] = [
    &[
        1, 1, 1, 1, 1, 1, 1, 2, 1, 2, 1, 3, 2, 3, 5, 5, 6, 8, 10, 15, 20, 38,
    ],
    &[
        1, 1, 1, 2, 1, 1, 2, 2, 2, 2, 2, 3, 3, 4, 4, 6, 6, 8, 11, 12, 15, 21, 29, 41, 76,
    ],
    &[
        2, 3, 2, 2, 3, 3, 3, 3, 4, 4, 5, 6, 6, 8, 9, 10, 13, 16, 21, 26, 30, 42, 58, 81, 152,
    ],
];

/// 32000 Hz 档的指数频带划分
pub const EXPONENT_BAND_32000: [&[u8]; 3] = [
    &[
        1, 1, 1, 1, 1, 1, 1, 2, 1, 2, 2, 2, 3, 3, 3, 5, 5, 7, 9, 11, 14, 20, 28, 4,
    ],
    &[
        2, 1, 2, 1, 2, 2, 2, 3, 2, 3, 4, 4, 4, 5, 6, 7, 9, 11, 15, 17, 21, 29, 40, 56, 8,
    ],
    &[
        3, 3, 4, 3, 3, 4, 5, 4, 6, 6, 6, 8, 9, 10, 12, 15, 17, 23, 29, 35, 41, 58, 80, 112, 16,
    ],
];

/// 22050 Hz 档的指数频带划分
pub const EXPONENT_BAND_22050: [&[u8]; 3] = [
    &[
        1, 1, 1, 2, 1, 1, 2, 2, 2, 2, 2, 3, 3, 4, 4, 6, 6, 8, 11, 12, 15, 21, 18,
    ],
    &[
        2, 3, 2, 2, 3, 3, 3, 3, 4, 4, 5, 6, 6, 8, 9, 10, 13, 16, 21, 26, 30, 42, 35,
    ],
    &[
        5, 4, 5, 5, 5, 5, 7, 7, 7, 9, 10, 11, 13, 15, 17, 21, 26, 32, 42, 51, 61, 83, 71,
    ],
];

/// 指数增量 VLC 码长表, 符号 i 对应增量 i - 60
///
/// 短码集中在增量 0 附近, 远端增量共用 18/19 位长码.
pub const SCALE_HUFF_LENS: [u8; 121] = [
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 0-9
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 10-19
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 20-29
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 30-39
    19, 19, 19, 19, 19, 18, 18, 18, 18, 18, // 40-49
    18, 18, 18, 18, 12, 10, 8, 6, 4, 2, // 50-59
    1, 3, 5, 7, 9, 11, 18, 18, 18, 18, // 60-69
    18, 18, 18, 18, 18, 18, 19, 19, 19, 19, // 70-79
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 80-89
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 90-99
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 100-109
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, // 110-119
    19, // 120
];

/// 高频带增益增量 VLC 码长表, 符号 i 对应增量 i - 18
pub const HGAIN_HUFF_LENS: [u8; 37] = [
    13, 13, 13, 13, 13, 13, 13, 13, 13, 13, // 0-9
    13, 13, 13, 12, 8, 6, 4, 2, 1, 3, // 10-19
    5, 7, 12, 12, 13, 13, 13, 13, 13, 13, // 20-29
    13, 13, 13, 13, 13, 13, 13, // 30-36
];

/// 高码率系数表 (第一对, 主声道)
pub const COEF_TABLE_0: CoefTableSpec = CoefTableSpec {
    n: 640,
    len_runs: &[
        (8, 131),
        (10, 499),
        (11, 1),
        (12, 1),
        (13, 1),
        (14, 1),
        (15, 1),
        (16, 1),
        (17, 1),
        (18, 1),
        (19, 2),
    ],
    levels: &[
        128, 92, 76, 64, 52, 44, 36, 30, 26, 22, 18, 14, 12, 8, 6, 4, 3, 2, 1,
    ],
};

/// 高码率系数表 (第一对, 差分声道)
pub const COEF_TABLE_1: CoefTableSpec = CoefTableSpec {
    n: 540,
    len_runs: &[
        (6, 32),
        (9, 13),
        (10, 485),
        (11, 1),
        (12, 1),
        (13, 1),
        (14, 1),
        (15, 1),
        (16, 1),
        (17, 1),
        (18, 1),
        (19, 2),
    ],
    levels: &[112, 84, 68, 56, 46, 38, 32, 26, 22, 18, 14, 10, 6, 4, 2],
};

/// 中低码率系数表 (主声道)
pub const COEF_TABLE_2: CoefTableSpec = CoefTableSpec {
    n: 360,
    len_runs: &[
        (6, 44),
        (9, 13),
        (10, 293),
        (11, 1),
        (12, 1),
        (13, 1),
        (14, 1),
        (15, 1),
        (16, 1),
        (17, 1),
        (18, 1),
        (19, 2),
    ],
    levels: &[96, 70, 52, 40, 30, 24, 18, 12, 8, 5, 3],
};

/// 中低码率系数表 (差分声道)
pub const COEF_TABLE_3: CoefTableSpec = CoefTableSpec {
    n: 300,
    len_runs: &[
        (6, 48),
        (9, 13),
        (10, 229),
        (11, 1),
        (12, 1),
        (13, 1),
        (14, 1),
        (15, 1),
        (16, 1),
        (17, 1),
        (18, 1),
        (19, 2),
    ],
    levels: &[88, 62, 44, 32, 24, 18, 12, 8, 6, 4],
};

/// 六个系数表槽位: 按码率档成对选取, 槽位 4/5 复用中低码率表
pub const COEF_TABLES: [&CoefTableSpec; 6] = [
    &COEF_TABLE_0,
    &COEF_TABLE_1,
    &COEF_TABLE_2,
    &COEF_TABLE_3,
    &COEF_TABLE_2,
    &COEF_TABLE_3,
];
