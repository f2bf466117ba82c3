//! 解码器 trait 定义.
//!
//! 所有解码器实现必须实现 `Decoder` trait.

use qin_core::QinResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 定义了解码器的统一接口. 所有具体解码器 (WMA 等) 都实现此 trait.
///
/// 解码流程:
/// 1. 调用 `open()` 配置解码器
/// 2. 调用 `send_packet()` 送入压缩数据
/// 3. 调用 `receive_frame()` 取出解码后的帧
/// 4. 重复以上步骤直到所有数据处理完毕
/// 5. 送入空包 (flush) 以获取解码器中缓存的帧
///
/// 解码失败只影响当前数据包: 已取出的音频仍然有效, 失败的包不产生任何采样.
pub trait Decoder: Send {
    /// 获取解码器标识
    fn codec_id(&self) -> CodecId;

    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 使用参数配置解码器
    ///
    /// WMA 等依赖容器侧参数的解码器必须在解码前调用此方法.
    /// 默认实现为空操作, 允许不需要额外配置的解码器跳过此步骤.
    fn open(&mut self, _params: &CodecParameters) -> QinResult<()> {
        Ok(())
    }

    /// 送入一个压缩数据包进行解码
    ///
    /// # 参数
    /// - `packet`: 压缩数据包. 送入空包表示刷新 (flush), 获取缓存帧.
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已接受
    /// - `Err(QinError::InvalidData)`: 码流损坏, 本包不产生输出, 解码器状态已复位
    fn send_packet(&mut self, packet: &Packet) -> QinResult<()>;

    /// 从解码器取出一帧解码数据
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧
    /// - `Err(QinError::NeedMoreData)`: 需要送入更多数据包
    /// - `Err(QinError::Eof)`: 所有帧已取出
    fn receive_frame(&mut self) -> QinResult<AudioFrame>;

    /// 刷新解码器, 清空内部状态
    ///
    /// 用于 seek 后重置解码器状态.
    fn flush(&mut self);
}
