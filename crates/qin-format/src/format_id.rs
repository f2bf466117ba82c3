//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
///
/// 标识一种音频容器格式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// ASF / WMA (Advanced Systems Format)
    Asf,
    /// Raw 音频 (PCM)
    RawAudio,
}

impl FormatId {
    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Asf => "asf",
            Self::RawAudio => "rawaudio",
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
