//! 解码后的音频帧 (AudioFrame).
//!
//! 表示解码后的原始音频采样数据.

use qin_core::{ChannelLayout, Rational, SampleFormat};

/// 音频帧
///
/// 包含解码后的原始音频采样数据.
/// 交错格式时 data 中所有声道的采样交替排列 (LRLRLR...).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 音频采样数据 (原始字节, 按 sample_format 解释)
    pub data: Vec<u8>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
    /// 帧时长 (以 time_base 为单位)
    pub duration: i64,
}

impl AudioFrame {
    /// 创建空的音频帧
    pub fn new(
        nb_samples: u32,
        sample_rate: u32,
        sample_format: SampleFormat,
        channel_layout: ChannelLayout,
    ) -> Self {
        Self {
            data: Vec::new(),
            nb_samples,
            sample_rate,
            sample_format,
            channel_layout,
            pts: qin_core::timestamp::NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
            duration: 0,
        }
    }
}
