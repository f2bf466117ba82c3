//! 编解码器标识符.
//!
//! 为每种编解码算法分配唯一标识.

use qin_core::MediaType;
use std::fmt;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    /// Windows Media Audio v1 (格式码 0x0160)
    WmaV1,
    /// Windows Media Audio v2 (格式码 0x0161)
    WmaV2,

    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 无符号 8 位
    PcmU8,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Data,
            Self::WmaV1 | Self::WmaV2 | Self::PcmS16le | Self::PcmU8 => MediaType::Audio,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WmaV1 => "wmav1",
            Self::WmaV2 => "wmav2",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmU8 => "pcm_u8",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
