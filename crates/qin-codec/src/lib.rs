//! # qin-codec
//!
//! Qin 音频解码框架编解码器库, 提供解码器框架与 Packet/Frame 抽象.
//!
//! 本 crate 定义了解码器注册、解码流程的核心抽象.
//!
//! ## 支持的解码器
//!
//! - **WMA v1 / v2** (Windows Media Audio): ASF 容器内的变换编码音频
//!
//! ## 使用示例
//!
//! ```rust
//! use qin_codec::{CodecRegistry, CodecId};
//!
//! let mut reg = CodecRegistry::new();
//! qin_codec::register_all(&mut reg);
//!
//! // 按 CodecId 创建解码器实例
//! let decoder = reg.create_decoder(CodecId::WmaV2).unwrap();
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{AudioCodecParams, CodecParameters, CodecParamsType};
pub use decoder::Decoder;
pub use frame::AudioFrame;
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}
