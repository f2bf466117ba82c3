//! ASF (Advanced Systems Format) 解封装器.
//!
//! ASF 头部是一串 (GUID, 64 位大小) 标记的对象. 已知对象逐字段解析为
//! 类型化记录, 未知对象按 `size - 24` 跳过. 头部区之后是数据对象,
//! 其 GUID、保留字与文件 GUID 交叉校验, 任一不符即为不可解码文件.
//!
//! 数据区由定长数据包组成, 每个包经差错保护与载荷解析头后携带一个
//! 未压缩单载荷 (WMA 超帧). 压缩载荷与多载荷不在支持范围内,
//! 显式报 `Unsupported`.

use log::{debug, warn};
use qin_codec::{CodecId, Packet};
use qin_core::{ChannelLayout, MediaType, QinError, QinResult, Rational, SampleFormat};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::file_info::FileInfo;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
use crate::stream::{AudioStreamParams, Stream, StreamParams};

/// 16 字节 GUID, 小端字段布局 (Data1 u32, Data2/Data3 u16, 8 字节尾部)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    fn read(io: &mut IoContext) -> QinResult<Self> {
        let data1 = io.read_u32_le()?;
        let data2 = io.read_u16_le()?;
        let data3 = io.read_u16_le()?;
        let mut data4 = [0u8; 8];
        io.read_exact(&mut data4)?;
        Ok(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4: [b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]],
        }
    }

    #[cfg(test)]
    fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }
}

const ASF_HEADER: Guid = Guid::new(
    0x75B22630,
    0x668E,
    0x11CF,
    [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
);
const ASF_FILE_HEADER: Guid = Guid::new(
    0x8CABDCA1,
    0xA947,
    0x11CF,
    [0x8E, 0xE4, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);
const ASF_STREAM_HEADER: Guid = Guid::new(
    0xB7DC0791,
    0xA9B7,
    0x11CF,
    [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);
const ASF_EXT_HEADER: Guid = Guid::new(
    0x5FBF03B5,
    0xA92E,
    0x11CF,
    [0x8E, 0xE3, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);
const ASF_EXT_HEADER_RESERVED: Guid = Guid::new(
    0xABD3D211,
    0xA9BA,
    0x11CF,
    [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);
const ASF_CODEC_LIST: Guid = Guid::new(
    0x86D15240,
    0x311D,
    0x11D0,
    [0xA3, 0xA4, 0x00, 0xA0, 0xC9, 0x03, 0x48, 0xF6],
);
const ASF_CODEC_LIST_RESERVED: Guid = Guid::new(
    0x86D15241,
    0x311D,
    0x11D0,
    [0xA3, 0xA4, 0x00, 0xA0, 0xC9, 0x03, 0x48, 0xF6],
);
const ASF_EXT_CONTENT: Guid = Guid::new(
    0xD2D0A440,
    0xE307,
    0x11D2,
    [0x97, 0xF0, 0x00, 0xA0, 0xC9, 0x5E, 0xA8, 0x50],
);
const ASF_STREAM_BITRATE: Guid = Guid::new(
    0x7BF875CE,
    0x468D,
    0x11D1,
    [0x8D, 0x82, 0x00, 0x60, 0x97, 0xC9, 0xA2, 0xB2],
);
const ASF_CONTENT_DESC: Guid = Guid::new(
    0x75B22633,
    0x668E,
    0x11CF,
    [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
);
const ASF_DATA_HEADER: Guid = Guid::new(
    0x75B22636,
    0x668E,
    0x11CF,
    [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
);
const ASF_AUDIO_STREAM: Guid = Guid::new(
    0xF8699E40,
    0x5B4D,
    0x11CF,
    [0xA8, 0xFD, 0x00, 0x80, 0x5F, 0x5C, 0x44, 0x2B],
);

/// 把 UTF-16LE 字节串 (可能带结尾空字符) 解为 String
fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let s: String = char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    s.trim_end_matches('\0').to_string()
}

/// 文件属性对象
#[derive(Debug, Clone)]
struct FileProperties {
    file_guid: Guid,
    play_time: u64,
    preroll: u64,
    data_packets: u64,
    min_pktsize: u32,
    max_pktsize: u32,
    max_bitrate: u32,
}

/// 流属性对象
#[derive(Debug, Clone)]
struct StreamProperties {
    stream_type: Guid,
    flags: u16,
    data: Vec<u8>,
}

/// 内容描述对象 (五个固定字符串)
#[derive(Debug, Clone, Default)]
struct ContentDescription {
    title: String,
    author: String,
    copyright: String,
    description: String,
    rating: String,
}

/// 扩展内容描述的类型化值
#[derive(Debug, Clone)]
enum ExtValue {
    Unicode(String),
    Ansi(Vec<u8>),
    Bool(bool),
    U32(u32),
    U64(u64),
    U16(u16),
}

impl ExtValue {
    fn to_display(&self) -> String {
        match self {
            Self::Unicode(s) => s.clone(),
            Self::Ansi(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Bool(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::U64(v) => v.to_string(),
            Self::U16(v) => v.to_string(),
        }
    }
}

/// 头部对象的类型化表示
enum HeaderObject {
    FileProperties(FileProperties),
    StreamProperties(StreamProperties),
    HeaderExtension,
    CodecList,
    ContentDescription(ContentDescription),
    ExtendedContent(Vec<(String, ExtValue)>),
    StreamBitrate(Vec<(u16, u32)>),
    Unknown(Guid),
}

/// ASF 解封装器
pub struct AsfDemuxer {
    streams: Vec<Stream>,
    metadata: Vec<(String, String)>,
    file_info: Option<FileInfo>,
    /// 数据包大小 (min_pktsize == max_pktsize 时有效, 0 表示可变)
    packet_size: u32,
    data_packets: u64,
    packets_read: u64,
    data_start: u64,
    audio_stream_no: u8,
    duration_secs: Option<f64>,
}

impl AsfDemuxer {
    /// 创建 ASF 解封装器实例 (工厂函数)
    pub fn create() -> QinResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            metadata: Vec::new(),
            file_info: None,
            packet_size: 0,
            data_packets: 0,
            packets_read: 0,
            data_start: 0,
            audio_stream_no: 0,
            duration_secs: None,
        }))
    }

    /// 解析一个头部对象 (GUID + 64 位大小 + 内容)
    fn parse_header_object(io: &mut IoContext) -> QinResult<HeaderObject> {
        let guid = Guid::read(io)?;
        let size = io.read_u64_le()?;
        if size < 24 {
            return Err(QinError::Format(format!("头部对象大小非法: {}", size)));
        }
        let body = size - 24;
        let start = io.position()?;

        let obj = if guid == ASF_FILE_HEADER {
            let file_guid = Guid::read(io)?;
            let _file_size = io.read_u64_le()?;
            let _create_time = io.read_u64_le()?;
            let data_packets = io.read_u64_le()?;
            let play_time = io.read_u64_le()?;
            let _send_time = io.read_u64_le()?;
            let preroll = io.read_u64_le()?;
            let _flags = io.read_u32_le()?;
            let min_pktsize = io.read_u32_le()?;
            let max_pktsize = io.read_u32_le()?;
            let max_bitrate = io.read_u32_le()?;
            HeaderObject::FileProperties(FileProperties {
                file_guid,
                play_time,
                preroll,
                data_packets,
                min_pktsize,
                max_pktsize,
                max_bitrate,
            })
        } else if guid == ASF_STREAM_HEADER {
            let stream_type = Guid::read(io)?;
            let _errcorr_type = Guid::read(io)?;
            let _time_offset = io.read_u64_le()?;
            let data_len = io.read_u32_le()?;
            let errcorr_len = io.read_u32_le()?;
            let flags = io.read_u16_le()?;
            let _reserved = io.read_u32_le()?;
            if u64::from(data_len) + u64::from(errcorr_len) > body {
                return Err(QinError::Format("流头部字段长度越过对象边界".into()));
            }
            let data = io.read_bytes(data_len as usize)?;
            let _errcorr = io.read_bytes(errcorr_len as usize)?;
            HeaderObject::StreamProperties(StreamProperties {
                stream_type,
                flags,
                data,
            })
        } else if guid == ASF_EXT_HEADER {
            let reserved1 = Guid::read(io)?;
            let reserved2 = io.read_u16_le()?;
            let data_len = io.read_u32_le()?;
            if reserved1 != ASF_EXT_HEADER_RESERVED || reserved2 != 0x06 {
                return Err(QinError::Format("扩展头保留字段校验失败".into()));
            }
            // 扩展区内的嵌套对象当前不参与解码, 跳过
            io.skip(data_len as usize)?;
            HeaderObject::HeaderExtension
        } else if guid == ASF_CODEC_LIST {
            let reserved = Guid::read(io)?;
            if reserved != ASF_CODEC_LIST_RESERVED {
                return Err(QinError::Format("编解码器列表保留 GUID 校验失败".into()));
            }
            let codec_count = io.read_u32_le()?;
            for _ in 0..codec_count {
                let _kind = io.read_u16_le()?;
                let name_len = io.read_u16_le()? as usize;
                let name = io.read_bytes(name_len * 2)?;
                let desc_len = io.read_u16_le()? as usize;
                let _desc = io.read_bytes(desc_len * 2)?;
                let info_len = io.read_u16_le()? as usize;
                let _info = io.read_bytes(info_len)?;
                debug!("编解码器条目: {}", utf16le_to_string(&name));
            }
            HeaderObject::CodecList
        } else if guid == ASF_CONTENT_DESC {
            let title_len = io.read_u16_le()? as usize;
            let author_len = io.read_u16_le()? as usize;
            let copyright_len = io.read_u16_le()? as usize;
            let desc_len = io.read_u16_le()? as usize;
            let rating_len = io.read_u16_le()? as usize;
            let title = utf16le_to_string(&io.read_bytes(title_len)?);
            let author = utf16le_to_string(&io.read_bytes(author_len)?);
            let copyright = utf16le_to_string(&io.read_bytes(copyright_len)?);
            let description = utf16le_to_string(&io.read_bytes(desc_len)?);
            let rating = utf16le_to_string(&io.read_bytes(rating_len)?);
            HeaderObject::ContentDescription(ContentDescription {
                title,
                author,
                copyright,
                description,
                rating,
            })
        } else if guid == ASF_EXT_CONTENT {
            let count = io.read_u16_le()?;
            let mut descriptors = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name_len = io.read_u16_le()? as usize;
                let name = utf16le_to_string(&io.read_bytes(name_len)?);
                let value_type = io.read_u16_le()?;
                let value_len = io.read_u16_le()? as usize;
                let raw = io.read_bytes(value_len)?;
                let value = match value_type {
                    0 => ExtValue::Unicode(utf16le_to_string(&raw)),
                    1 => ExtValue::Ansi(raw),
                    2 => ExtValue::Bool(raw.first().copied().unwrap_or(0) != 0),
                    3 => {
                        if raw.len() < 4 {
                            return Err(QinError::Format("扩展描述 DWORD 值长度不足".into()));
                        }
                        ExtValue::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    4 => {
                        if raw.len() < 8 {
                            return Err(QinError::Format("扩展描述 QWORD 值长度不足".into()));
                        }
                        ExtValue::U64(u64::from_le_bytes([
                            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                        ]))
                    }
                    5 => {
                        if raw.len() < 2 {
                            return Err(QinError::Format("扩展描述 WORD 值长度不足".into()));
                        }
                        ExtValue::U16(u16::from_le_bytes([raw[0], raw[1]]))
                    }
                    _ => ExtValue::Ansi(raw),
                };
                descriptors.push((name, value));
            }
            HeaderObject::ExtendedContent(descriptors)
        } else if guid == ASF_STREAM_BITRATE {
            let count = io.read_u16_le()?;
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let flags = io.read_u16_le()?;
                let average = io.read_u32_le()?;
                records.push((flags, average));
            }
            HeaderObject::StreamBitrate(records)
        } else {
            io.skip(body as usize)?;
            HeaderObject::Unknown(guid)
        };

        // 对象可能带有未解析的尾部字段, 统一跳到对象末尾
        let consumed = io.position()? - start;
        if consumed < body {
            io.skip((body - consumed) as usize)?;
        } else if consumed > body {
            return Err(QinError::Format("头部对象字段越过对象边界".into()));
        }

        Ok(obj)
    }

    /// 把音频流头部的 WAVEFORMAT(EX) 数据解成流记录
    fn parse_audio_stream(&mut self, props: &StreamProperties, index: usize) -> QinResult<Stream> {
        let data = &props.data;

        let (format_tag, channels, sample_rate, avg_bytes, block_align, bits, extra) =
            if data.len() == 14 {
                // 旧式 WAVEFORMAT, 无位深字段
                let tag = u16::from_le_bytes([data[0], data[1]]);
                let ch = u16::from_le_bytes([data[2], data[3]]);
                let rate = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                let avg = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
                let ba = u16::from_le_bytes([data[12], data[13]]);
                (tag, ch, rate, avg, ba, 8u16, Vec::new())
            } else if data.len() >= 18 {
                let tag = u16::from_le_bytes([data[0], data[1]]);
                let ch = u16::from_le_bytes([data[2], data[3]]);
                let rate = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                let avg = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
                let ba = u16::from_le_bytes([data[12], data[13]]);
                let bits = u16::from_le_bytes([data[14], data[15]]);
                let cb = u16::from_le_bytes([data[16], data[17]]) as usize;
                let extra_end = (18 + cb).min(data.len());
                (tag, ch, rate, avg, ba, bits, data[18..extra_end].to_vec())
            } else {
                return Err(QinError::Format(format!(
                    "音频流头部长度非法: {}",
                    data.len(),
                )));
            };

        let codec_id = match format_tag {
            0x0160 => CodecId::WmaV1,
            0x0161 => CodecId::WmaV2,
            0x0001 => CodecId::PcmS16le,
            _ => {
                warn!("未知音频格式码: 0x{:04X}", format_tag);
                CodecId::None
            }
        };

        self.audio_stream_no = (props.flags & 0x7F) as u8;

        Ok(Stream {
            index,
            media_type: MediaType::Audio,
            codec_id,
            time_base: Rational::MILLI,
            duration: self
                .duration_secs
                .map(|d| (d * 1000.0) as i64)
                .unwrap_or(-1),
            start_time: 0,
            extra_data: extra,
            params: StreamParams::Audio(AudioStreamParams {
                sample_rate,
                channel_layout: ChannelLayout::from_channels(u32::from(channels)),
                sample_format: SampleFormat::S16,
                bit_rate: u64::from(avg_bytes) * 8,
                bits_per_sample: u32::from(bits),
                block_align: u32::from(block_align),
            }),
            metadata: Vec::new(),
        })
    }

    /// 读取一个数据包并提取其单载荷
    fn read_data_packet(&mut self, io: &mut IoContext) -> QinResult<Option<Packet>> {
        // 差错保护段
        let first = io.read_u8()?;
        let length_type_flags = if first & 0x80 != 0 {
            if first & 0x10 != 0 {
                return Err(QinError::Unsupported("不透明差错保护数据".into()));
            }
            let errcorr_len = (first & 0x0F) as usize;
            io.skip(errcorr_len)?;
            io.read_u8()?
        } else {
            first
        };
        let prop_flags = io.read_u8()?;

        // 变宽长度字段: 类型 0/1/2/3 对应 0/1/2/4 字节
        let widths = [0usize, 1, 2, 4];
        let sequ_w = widths[((length_type_flags & 0x06) >> 1) as usize];
        let padd_w = widths[((length_type_flags & 0x18) >> 3) as usize];
        let pack_w = widths[((length_type_flags & 0x60) >> 5) as usize];

        let _sequence = io.read_uint_le(sequ_w)?;
        let padding_len = io.read_uint_le(padd_w)?;
        let _packet_len = io.read_uint_le(pack_w)?;
        let send_time = io.read_u32_le()?;
        let duration = io.read_u16_le()?;

        if length_type_flags & 0x01 != 0 {
            return Err(QinError::Unsupported("多载荷数据包".into()));
        }

        let stream_byte = io.read_u8()?;
        let stream_no = stream_byte & 0x7F;
        let is_keyframe = stream_byte & 0x80 != 0;

        let objlen_w = widths[((prop_flags & 0x30) >> 4) as usize];
        // 偏移与重现数据长度按参考语义: 类型 0 与 3 都按 4 字节读
        let objoffset_w = match (prop_flags & 0x0C) >> 2 {
            0 | 3 => 4,
            w => w as usize,
        };
        let repdata_w = match prop_flags & 0x03 {
            0 | 3 => 4,
            w => w as usize,
        };

        let _media_object_no = io.read_uint_le(objlen_w)?;
        let _media_object_offset = io.read_uint_le(objoffset_w)?;
        let rep_data_len = io.read_uint_le(repdata_w)?;

        if rep_data_len == 1 {
            // 重现数据长度 1 标记压缩载荷, 不支持
            return Err(QinError::Unsupported("压缩载荷数据包".into()));
        }
        if rep_data_len < 4 {
            return Err(QinError::Format(format!(
                "重现数据长度非法: {}",
                rep_data_len,
            )));
        }

        let rep_data = io.read_bytes(rep_data_len as usize)?;
        let payload_len =
            u32::from_le_bytes([rep_data[0], rep_data[1], rep_data[2], rep_data[3]]) as usize;
        let payload = io.read_bytes(payload_len)?;
        io.skip(padding_len as usize)?;

        if stream_no != self.audio_stream_no {
            debug!("跳过非音频流 {} 的数据包", stream_no);
            return Ok(None);
        }

        let mut pkt = Packet::from_data(bytes::Bytes::from(payload));
        pkt.stream_index = 0;
        pkt.pts = i64::from(send_time);
        pkt.duration = i64::from(duration);
        pkt.time_base = Rational::MILLI;
        pkt.is_keyframe = is_keyframe;
        Ok(Some(pkt))
    }
}

impl Demuxer for AsfDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Asf
    }

    fn name(&self) -> &str {
        "asf"
    }

    fn open(&mut self, io: &mut IoContext) -> QinResult<()> {
        // 顶层头部对象
        let header_guid = Guid::read(io)?;
        if header_guid != ASF_HEADER {
            return Err(QinError::Format("不是有效的 ASF 文件 (头部 GUID 不符)".into()));
        }
        let _header_size = io.read_u64_le()?;
        let header_objects = io.read_u32_le()?;
        let r1 = io.read_u8()?;
        let r2 = io.read_u8()?;
        if r1 != 0x01 || r2 != 0x02 {
            return Err(QinError::Format(format!(
                "头部保留字节校验失败: {:02X} {:02X}",
                r1, r2,
            )));
        }

        let mut file_props: Option<FileProperties> = None;
        let mut stream_props: Vec<StreamProperties> = Vec::new();
        let mut content_desc: Option<ContentDescription> = None;
        let mut ext_content: Vec<(String, ExtValue)> = Vec::new();
        let mut bitrate_records: Vec<(u16, u32)> = Vec::new();

        for _ in 0..header_objects {
            match Self::parse_header_object(io)? {
                HeaderObject::FileProperties(p) => file_props = Some(p),
                HeaderObject::StreamProperties(p) => stream_props.push(p),
                HeaderObject::ContentDescription(d) => content_desc = Some(d),
                HeaderObject::ExtendedContent(d) => ext_content = d,
                HeaderObject::StreamBitrate(r) => bitrate_records = r,
                HeaderObject::HeaderExtension | HeaderObject::CodecList => {}
                HeaderObject::Unknown(guid) => {
                    debug!("跳过未知头部对象: {:08X}", guid.data1);
                }
            }
        }

        let file_props = file_props
            .ok_or_else(|| QinError::Format("缺少文件属性对象".into()))?;

        // 数据对象头: GUID 与文件 GUID 交叉校验; 头部后直接截断也视为格式错误
        let truncated = |_| QinError::Format("文件在数据对象处截断".into());
        let data_guid = Guid::read(io).map_err(truncated)?;
        let _data_size = io.read_u64_le().map_err(truncated)?;
        let data_file_guid = Guid::read(io).map_err(truncated)?;
        let data_packets = io.read_u64_le().map_err(truncated)?;
        let reserved = io.read_u16_le().map_err(truncated)?;
        if data_guid != ASF_DATA_HEADER {
            return Err(QinError::Format("数据对象 GUID 不符".into()));
        }
        if reserved != 0x0101 {
            return Err(QinError::Format(format!(
                "数据对象保留字校验失败: 0x{:04X}",
                reserved,
            )));
        }
        if data_file_guid != file_props.file_guid {
            return Err(QinError::Format("数据对象文件 GUID 与文件属性不一致".into()));
        }
        if file_props.data_packets != 0 && file_props.data_packets != data_packets {
            warn!(
                "文件属性与数据对象的包数不一致: {} vs {}",
                file_props.data_packets, data_packets,
            );
        }

        // 时长: 播放时间单位为 100ns, 减去预滚毫秒数
        let play_secs = file_props.play_time as f64 / 1e7;
        let preroll_secs = file_props.preroll as f64 / 1e3;
        self.duration_secs = Some((play_secs - preroll_secs).max(0.0));
        self.data_packets = data_packets;
        self.packets_read = 0;
        self.data_start = io.position()?;
        if file_props.min_pktsize == file_props.max_pktsize {
            self.packet_size = file_props.min_pktsize;
        } else {
            warn!(
                "数据包大小可变 ({} - {}), 不支持按时间定位",
                file_props.min_pktsize, file_props.max_pktsize,
            );
            self.packet_size = 0;
        }

        // 流记录: 只解析音频流, 其余计为数据流
        let mut streams = Vec::new();
        for props in &stream_props {
            let index = streams.len();
            if props.stream_type == ASF_AUDIO_STREAM {
                let stream = self.parse_audio_stream(props, index)?;
                streams.push(stream);
            } else {
                streams.push(Stream {
                    index,
                    media_type: MediaType::Data,
                    codec_id: CodecId::None,
                    time_base: Rational::MILLI,
                    duration: -1,
                    start_time: 0,
                    extra_data: Vec::new(),
                    params: StreamParams::Other,
                    metadata: Vec::new(),
                });
            }
        }
        if !streams.iter().any(|s| s.media_type == MediaType::Audio) {
            return Err(QinError::Format("容器中没有音频流".into()));
        }
        self.streams = streams;

        // 元数据与文件信息汇总
        let mut metadata = Vec::new();
        let mut info = FileInfo {
            total_time: self.duration_secs.unwrap_or(0.0),
            ..Default::default()
        };
        if let Some(desc) = &content_desc {
            for (key, value) in [
                ("title", &desc.title),
                ("author", &desc.author),
                ("copyright", &desc.copyright),
                ("description", &desc.description),
                ("rating", &desc.rating),
            ] {
                if !value.is_empty() {
                    metadata.push((key.to_string(), value.clone()));
                }
            }
            if !desc.title.is_empty() {
                info.title = Some(desc.title.clone());
            }
            if !desc.author.is_empty() {
                info.artist = Some(desc.author.clone());
            }
        }
        for (name, value) in &ext_content {
            let display = value.to_display();
            if name.eq_ignore_ascii_case("WM/AlbumTitle") {
                info.album = Some(display.clone());
            } else {
                info.other_comments.push((name.clone(), display.clone()));
            }
            metadata.push((name.clone(), display));
        }
        for (flags, average) in &bitrate_records {
            debug!("流 {} 平均码率 {} bps", flags & 0x7F, average);
        }
        if let Some(stream) = self
            .streams
            .iter()
            .find(|s| s.media_type == MediaType::Audio)
        {
            if let StreamParams::Audio(a) = &stream.params {
                info.sample_rate = a.sample_rate;
                info.channels = a.channel_layout.channels;
                info.bits_per_sample = a.bits_per_sample;
                info.bit_rate = if a.bit_rate > 0 {
                    a.bit_rate
                } else {
                    u64::from(file_props.max_bitrate)
                };
            }
        }
        self.metadata = metadata;
        self.file_info = Some(info);

        debug!(
            "ASF 打开完成: {} 条流, {} 个数据包, 时长 {:.2}s",
            self.streams.len(),
            self.data_packets,
            self.duration_secs.unwrap_or(0.0),
        );

        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> QinResult<Packet> {
        loop {
            if self.data_packets > 0 && self.packets_read >= self.data_packets {
                return Err(QinError::Eof);
            }
            let result = self.read_data_packet(io);
            self.packets_read += 1;
            match result {
                Ok(Some(pkt)) => return Ok(pkt),
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        io: &mut IoContext,
        _stream_index: usize,
        timestamp: i64,
        _flags: SeekFlags,
    ) -> QinResult<()> {
        if !io.is_seekable() {
            return Err(QinError::Unsupported("不支持在非可寻址流上 seek".into()));
        }
        if self.packet_size == 0 {
            return Err(QinError::Unsupported("可变包长的 ASF 不支持定位".into()));
        }
        let total_ms = self.duration_secs.unwrap_or(0.0) * 1000.0;
        if total_ms <= 0.0 || self.data_packets == 0 {
            return Err(QinError::Unsupported("缺少时长信息, 无法定位".into()));
        }

        // 定长包按时间比例定位
        let frac = (timestamp.max(0) as f64 / total_ms).min(1.0);
        let pkt_index = ((self.data_packets as f64 * frac) as u64).min(self.data_packets - 1);
        let offset = self.data_start + pkt_index * u64::from(self.packet_size);
        io.seek(std::io::SeekFrom::Start(offset))?;
        self.packets_read = pkt_index;

        debug!("ASF seek: 目标 {}ms -> 包 {}", timestamp, pkt_index);
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.duration_secs
    }

    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }
}

/// ASF 格式探测器
pub struct AsfProbe;

impl FormatProbe for AsfProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 16 && Guid::from_bytes(&data[0..16]) == ASF_HEADER {
            return Some(SCORE_MAX);
        }

        if let Some(name) = filename {
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".wma") || lower.ends_with(".asf") || lower.ends_with(".wmv") {
                return Some(SCORE_EXTENSION);
            }
        }

        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Asf
    }
}
