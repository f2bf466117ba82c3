//! 端到端链路测试: 合成 ASF 文件 -> 探测 -> 解封装 -> WMA 解码 -> PCM.
//!
//! 载荷是手工构造的 WMA v2 立体声静音帧 (全零系数 + 块结束符),
//! 覆盖从文件字节到交错 S16 输出的完整路径.

use std::io::Write;

use qin::codec::{CodecId, Decoder};
use qin::core::{QinError, SampleFormat};
use qin::format::io::IoContext;
use qin::format::stream::StreamParams;
use qin::format::Demuxer;

// ========================
// 位流写入端 (与解码器读取端互逆)
// ========================

struct BitWriter {
    bytes: Vec<u8>,
    cur: u8,
    nbits: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            cur: 0,
            nbits: 0,
        }
    }

    /// 原始字段: 按字节分块, 先写的块占结果高位
    fn put(&mut self, v: u32, n: u32) {
        let mut remaining = n;
        while remaining > 0 {
            let avail = 8 - self.nbits;
            let take = avail.min(remaining);
            let chunk = ((v >> (remaining - take)) & ((1 << take) - 1)) as u8;
            self.cur |= chunk << self.nbits;
            self.nbits += take;
            remaining -= take;
            if self.nbits == 8 {
                self.bytes.push(self.cur);
                self.cur = 0;
                self.nbits = 0;
            }
        }
    }

    /// VLC 码字: 位序列语义, 首位为码字最高位
    fn put_code(&mut self, code: u32, len: u32) {
        for i in (0..len).rev() {
            self.put((code >> i) & 1, 1);
        }
    }

    fn finish(mut self, pad_to: usize) -> Vec<u8> {
        if self.nbits > 0 {
            self.bytes.push(self.cur);
        }
        while self.bytes.len() < pad_to {
            self.bytes.push(0);
        }
        self.bytes
    }
}

/// 44100 Hz / 2048 点块的指数频带数 (临界频带公式, 量化到 4 的倍数)
fn exponent_band_count(block_len: usize, rate: usize) -> usize {
    const FREQS: [usize; 25] = [
        100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150,
        3700, 4400, 5300, 6400, 7700, 9500, 12000, 15500, 24500,
    ];
    let mut lpos = 0;
    let mut count = 0;
    for f in FREQS {
        let mut pos = ((block_len * 2 * f + (rate << 1)) / (4 * rate)) << 2;
        pos = pos.min(block_len);
        if pos > lpos {
            count += 1;
        }
        if pos >= block_len {
            break;
        }
        lpos = pos;
    }
    count
}

/// 一个 WMA v2 立体声静音帧: 全零系数, 双声道均以块结束符收尾
fn silent_wma_frame(pad_to: usize) -> Vec<u8> {
    let bands = exponent_band_count(2048, 44100);
    let mut w = BitWriter::new();
    w.put(0, 1); // 非中侧立体声
    w.put(1, 1); // 声道 0 已编码
    w.put(1, 1); // 声道 1 已编码
    w.put(20, 7); // 总增益 21
    for _ in 0..2 {
        for _ in 0..bands {
            w.put_code(0, 1); // 指数增量 0
        }
    }
    for _ in 0..2 {
        w.put_code(0b000001, 6); // 块结束符 (中低码率表符号 1)
    }
    w.finish(pad_to)
}

// ========================
// ASF 文件构造
// ========================

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn guid(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Vec<u8> {
    let mut b = Vec::with_capacity(16);
    put_u32(&mut b, d1);
    put_u16(&mut b, d2);
    put_u16(&mut b, d3);
    b.extend_from_slice(&d4);
    b
}

fn utf16(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for u in s.encode_utf16() {
        out.extend_from_slice(&u.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

fn build_asf_with_payload(payload: &[u8]) -> Vec<u8> {
    let header_guid = guid(
        0x75B22630,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    let file_header_guid = guid(
        0x8CABDCA1,
        0xA947,
        0x11CF,
        [0x8E, 0xE4, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    let stream_header_guid = guid(
        0xB7DC0791,
        0xA9B7,
        0x11CF,
        [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    let content_desc_guid = guid(
        0x75B22633,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    let data_guid = guid(
        0x75B22636,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    let audio_stream_guid = guid(
        0xF8699E40,
        0x5B4D,
        0x11CF,
        [0xA8, 0xFD, 0x00, 0x80, 0x5F, 0x5C, 0x44, 0x2B],
    );
    let file_guid = guid(0xAABBCCDD, 0x1122, 0x3344, [9, 8, 7, 6, 5, 4, 3, 2]);

    // 文件属性
    let mut file_props = Vec::new();
    file_props.extend_from_slice(&file_guid);
    put_u64(&mut file_props, 0); // file_size
    put_u64(&mut file_props, 0); // create_time
    put_u64(&mut file_props, 1); // data_packets
    put_u64(&mut file_props, 20_000_000); // play_time = 2s (100ns)
    put_u64(&mut file_props, 0); // send_time
    put_u64(&mut file_props, 0); // preroll
    put_u32(&mut file_props, 0x02);
    put_u32(&mut file_props, 512); // min_pktsize
    put_u32(&mut file_props, 512); // max_pktsize
    put_u32(&mut file_props, 128_000);

    // WAVEFORMATEX: WMAv2 立体声 44100, flags2 = 1 (指数 VLC, 无比特储备)
    let mut wfx = Vec::new();
    put_u16(&mut wfx, 0x0161);
    put_u16(&mut wfx, 2);
    put_u32(&mut wfx, 44100);
    put_u32(&mut wfx, 16000);
    put_u16(&mut wfx, payload.len() as u16); // block_align = 超帧大小
    put_u16(&mut wfx, 16);
    put_u16(&mut wfx, 6);
    put_u32(&mut wfx, 0);
    put_u16(&mut wfx, 0x0001);

    let mut stream_props = Vec::new();
    stream_props.extend_from_slice(&audio_stream_guid);
    stream_props.extend_from_slice(&[0u8; 16]);
    put_u64(&mut stream_props, 0);
    put_u32(&mut stream_props, wfx.len() as u32);
    put_u32(&mut stream_props, 0);
    put_u16(&mut stream_props, 0x0001); // 流号 1
    put_u32(&mut stream_props, 0);
    stream_props.extend_from_slice(&wfx);

    // 内容描述
    let title = utf16("Breezin");
    let author = utf16("George Benson");
    let empty = utf16("");
    let mut content = Vec::new();
    put_u16(&mut content, title.len() as u16);
    put_u16(&mut content, author.len() as u16);
    put_u16(&mut content, empty.len() as u16);
    put_u16(&mut content, empty.len() as u16);
    put_u16(&mut content, empty.len() as u16);
    content.extend_from_slice(&title);
    content.extend_from_slice(&author);
    content.extend_from_slice(&empty);
    content.extend_from_slice(&empty);
    content.extend_from_slice(&empty);

    // 数据包: 单载荷
    let mut pkt = Vec::new();
    pkt.push(0x82);
    pkt.extend_from_slice(&[0, 0]);
    pkt.push(0x00);
    pkt.push(0x15);
    put_u32(&mut pkt, 0); // send_time
    put_u16(&mut pkt, 46);
    pkt.push(0x81); // 流号 1, 关键帧
    pkt.push(0);
    pkt.push(0);
    pkt.push(8); // rep_data_len
    put_u32(&mut pkt, payload.len() as u32);
    put_u32(&mut pkt, 0);
    pkt.extend_from_slice(payload);

    let mut buf = Vec::new();
    buf.extend_from_slice(&header_guid);
    put_u64(&mut buf, 0); // header size (解析端不依赖)
    put_u32(&mut buf, 3); // 对象数
    buf.push(0x01);
    buf.push(0x02);
    for (g, body) in [
        (&file_header_guid, &file_props),
        (&stream_header_guid, &stream_props),
        (&content_desc_guid, &content),
    ] {
        buf.extend_from_slice(g);
        put_u64(&mut buf, 24 + body.len() as u64);
        buf.extend_from_slice(body);
    }
    buf.extend_from_slice(&data_guid);
    put_u64(&mut buf, 50 + pkt.len() as u64);
    buf.extend_from_slice(&file_guid);
    put_u64(&mut buf, 1);
    put_u16(&mut buf, 0x0101);
    buf.extend_from_slice(&pkt);
    buf
}

#[test]
fn test_完整链路_文件到pcm() {
    let _ = env_logger::builder().is_test(true).try_init();

    let payload = silent_wma_frame(256);
    let asf = build_asf_with_payload(&payload);

    let mut tmp = tempfile::Builder::new().suffix(".wma").tempfile().unwrap();
    tmp.write_all(&asf).unwrap();
    tmp.flush().unwrap();
    let path = tmp.path().to_str().unwrap().to_string();

    let formats = qin::default_format_registry();
    let codecs = qin::default_codec_registry();

    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = formats.open_input(&mut io, Some(path.as_str())).unwrap();

    // 流与元数据
    let stream = &demuxer.streams()[0];
    assert_eq!(stream.codec_id, CodecId::WmaV2);
    let StreamParams::Audio(a) = &stream.params else {
        panic!("应为音频流");
    };
    assert_eq!(a.sample_rate, 44100);
    assert_eq!(a.channel_layout.channels, 2);
    assert_eq!(a.bits_per_sample, 16);

    let info = demuxer.file_info().unwrap();
    assert_eq!(info.title.as_deref(), Some("Breezin"));
    assert_eq!(info.artist.as_deref(), Some("George Benson"));
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.channels, 2);
    assert_eq!(info.bits_per_sample, 16);

    // 解码
    let params = stream.codec_parameters();
    let mut decoder = codecs.create_decoder(stream.codec_id).unwrap();
    decoder.open(&params).unwrap();

    let pkt = demuxer.read_packet(&mut io).unwrap();
    assert_eq!(pkt.data.len(), payload.len());
    decoder.send_packet(&pkt).unwrap();

    let frame = decoder.receive_frame().unwrap();
    assert_eq!(frame.nb_samples, 2048);
    assert_eq!(frame.sample_rate, 44100);
    assert_eq!(frame.channel_layout.channels, 2);
    assert_eq!(frame.sample_format, SampleFormat::S16);
    // 静音帧: 全部采样为 0 (误差容限 ±2 LSB 之内)
    for pair in frame.data.chunks_exact(2) {
        let v = i16::from_le_bytes([pair[0], pair[1]]);
        assert!(v.abs() <= 2, "静音样本超出容限: {}", v);
    }

    // 数据包读尽
    assert!(matches!(
        demuxer.read_packet(&mut io),
        Err(QinError::Eof)
    ));
}

#[test]
fn test_截断文件不产生会话() {
    let payload = silent_wma_frame(256);
    let mut asf = build_asf_with_payload(&payload);
    asf.truncate(asf.len() - payload.len() - 60); // 砍掉数据对象

    let formats = qin::default_format_registry();
    let mut io = IoContext::new(Box::new(qin::format::io::MemoryBackend::from_data(asf)));
    let err = formats.open_input(&mut io, None).unwrap_err();
    assert!(matches!(err, QinError::Format(_)));
}
