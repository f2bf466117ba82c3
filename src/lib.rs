//! # Qin (琴)
//!
//! 纯 Rust 实现的 WMA/ASF 音频解码框架.
//!
//! Qin 提供从容器到 PCM 的完整解码链路:
//! - **容器格式**: ASF 头部对象解析、数据包/载荷提取、元数据表面
//! - **解码器**: WMA v1/v2 (位流读取、VLC 熵解码、指数/LSP 包络,
//!   噪声填充、IMDCT 与重叠相加)
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use qin::codec::Decoder;
//! use qin::format::{Demuxer, io::IoContext};
//! use qin::core::QinError;
//!
//! fn main() -> Result<(), QinError> {
//!     let mut io = IoContext::open_read("test.wma")?;
//!     let formats = qin::default_format_registry();
//!     let codecs = qin::default_codec_registry();
//!
//!     let mut demuxer = formats.open_input(&mut io, Some("test.wma"))?;
//!     let stream = &demuxer.streams()[0];
//!     let params = stream.codec_parameters();
//!
//!     let mut decoder = codecs.create_decoder(stream.codec_id)?;
//!     decoder.open(&params)?;
//!     loop {
//!         match demuxer.read_packet(&mut io) {
//!             Ok(pkt) => {
//!                 decoder.send_packet(&pkt)?;
//!                 while let Ok(frame) = decoder.receive_frame() {
//!                     // 处理交错 S16 PCM: frame.data
//!                     let _ = frame.nb_samples;
//!                 }
//!             }
//!             Err(QinError::Eof) => break,
//!             // 解码错误按流结束处理, 截断播放
//!             Err(_) => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `qin-core` | 核心类型与工具 |
//! | `qin-codec` | 解码器框架与 WMA 实现 |
//! | `qin-format` | 容器格式框架与 ASF 解封装 |

/// 核心类型与工具
pub use qin_core as core;

/// 解码器框架
pub use qin_codec as codec;

/// 容器格式框架
pub use qin_format as format;

/// 获取 Qin 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> qin_codec::CodecRegistry {
    let mut registry = qin_codec::CodecRegistry::new();
    qin_codec::register_all(&mut registry);
    registry
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> qin_format::FormatRegistry {
    let mut registry = qin_format::FormatRegistry::new();
    qin_format::register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_默认注册表() {
        let codecs = super::default_codec_registry();
        assert_eq!(codecs.list_decoders().len(), 2);

        let formats = super::default_format_registry();
        assert_eq!(formats.list_demuxers().len(), 1);
    }
}
