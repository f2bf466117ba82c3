//! 文件信息汇总.
//!
//! 各容器格式解析后向播放层暴露的统一元数据表面:
//! 标题/艺术家/专辑等标签加上时长与采样参数.

/// 文件信息
///
/// 由解封装器在解析头部后填充, 供播放界面等外部协作方读取.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// 总时长 (秒), 0 表示未知
    pub total_time: f64,
    /// 位深 (bits)
    pub bits_per_sample: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 码率 (bits/s)
    pub bit_rate: u64,
    /// 声道数
    pub channels: u32,
    /// 标题
    pub title: Option<String>,
    /// 艺术家
    pub artist: Option<String>,
    /// 专辑
    pub album: Option<String>,
    /// 其余标签 (键值对, 保持容器中的出现顺序)
    pub other_comments: Vec<(String, String)>,
}

impl FileInfo {
    /// 按键查找标签 (不区分大小写)
    pub fn comment(&self, key: &str) -> Option<&str> {
        self.other_comments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
