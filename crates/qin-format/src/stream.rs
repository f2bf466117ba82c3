//! 流信息定义.
//!
//! 描述容器中的一条音频/数据流.

use qin_codec::{AudioCodecParams, CodecId, CodecParameters, CodecParamsType};
use qin_core::{ChannelLayout, MediaType, Rational, SampleFormat};

/// 流信息
///
/// 描述容器格式中的一条流.
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 编解码器私有数据 (WMA 的 WAVEFORMATEX 尾部字段)
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
    /// 元数据 (标题, 语言等)
    pub metadata: Vec<(String, String)>,
}

impl Stream {
    /// 由流记录构造解码器参数
    pub fn codec_parameters(&self) -> CodecParameters {
        match &self.params {
            StreamParams::Audio(a) => CodecParameters {
                codec_id: self.codec_id,
                extra_data: self.extra_data.clone(),
                bit_rate: a.bit_rate,
                params: CodecParamsType::Audio(AudioCodecParams {
                    sample_rate: a.sample_rate,
                    channel_layout: a.channel_layout,
                    sample_format: a.sample_format,
                    frame_size: 0,
                    bits_per_sample: a.bits_per_sample,
                    block_align: a.block_align,
                }),
            },
            StreamParams::Other => CodecParameters {
                codec_id: self.codec_id,
                extra_data: self.extra_data.clone(),
                bit_rate: 0,
                params: CodecParamsType::None,
            },
        }
    }
}

/// 流特定参数
#[derive(Debug, Clone)]
pub enum StreamParams {
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 其他
    Other,
}

/// 音频流参数
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
    /// 位深 (bits)
    pub bits_per_sample: u32,
    /// 块对齐 (字节), WMA 每个数据包载荷的大小
    pub block_align: u32,
}
