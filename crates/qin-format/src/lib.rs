//! # qin-format
//!
//! Qin 音频解码框架容器格式库, 提供解封装框架.
//!
//! 本 crate 负责容器格式的读取: I/O 抽象、格式探测、
//! 流信息与元数据表面, 以及具体格式的解封装器 (ASF/WMA).

pub mod demuxer;
pub mod demuxers;
pub mod file_info;
pub mod format_id;
pub mod io;
pub mod probe;
pub mod registry;
pub mod stream;

// 重导出常用类型
pub use demuxer::Demuxer;
pub use file_info::FileInfo;
pub use format_id::FormatId;
pub use io::IoContext;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::Stream;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
}
