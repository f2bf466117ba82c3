//! WMA 解码器集成测试.
//!
//! 位流由测试端自行构造: 原始字段用与读取端互逆的分块写入,
//! VLC 码字按位序列写入 (首位为码字最高位).

use bytes::Bytes;

use qin_core::{ChannelLayout, QinError, SampleFormat};

use crate::codec_id::CodecId;
use crate::codec_parameters::{AudioCodecParams, CodecParameters, CodecParamsType};
use crate::decoder::Decoder;
use crate::packet::Packet;

use super::WmaDecoder;
use super::tables::{MAX_CODED_SUPERFRAME_SIZE, NOISE_TAB_SIZE};
use super::vlc::{canonical_codes, expand_len_runs};

/// 与 WmaBitReader 互逆的位写入器
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

    /// 写入原始字段 (read_bits 的逆变换: 分块, 先写块占高位)
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

    /// 写入 VLC 码字 (位序列语义, 首位为最高位)
    fn put_code(&mut self, code: u32, len: u8) {
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

fn make_params(codec_id: CodecId, sample_rate: u32, channels: u32, bit_rate: u64, flags2: u16) -> CodecParameters {
    let extra = match codec_id {
        CodecId::WmaV1 => {
            let mut e = vec![0u8; 4];
            e[2..4].copy_from_slice(&flags2.to_le_bytes());
            e
        }
        _ => {
            let mut e = vec![0u8; 6];
            e[4..6].copy_from_slice(&flags2.to_le_bytes());
            e
        }
    };
    CodecParameters {
        codec_id,
        extra_data: extra,
        bit_rate,
        params: CodecParamsType::Audio(AudioCodecParams {
            sample_rate,
            channel_layout: ChannelLayout::from_channels(channels),
            sample_format: SampleFormat::S16,
            frame_size: 0,
            bits_per_sample: 16,
            block_align: 0,
        }),
    }
}

fn open_decoder(params: &CodecParameters) -> WmaDecoder {
    let version = if params.codec_id == CodecId::WmaV1 { 1 } else { 2 };
    let mut dec = WmaDecoder::new(params.codec_id, version);
    dec.open(params).unwrap();
    dec
}

/// cvt = 2 档主声道系数表中符号 sym 的 canonical (码字, 码长)
fn coef_code(sym: usize) -> (u32, u8) {
    let spec = super::tables::COEF_TABLES[4];
    let lens = expand_len_runs(spec.len_runs);
    let codes = canonical_codes(&lens);
    (codes[sym], lens[sym])
}

#[test]
fn test_初始化_44100_立体声参数() {
    let params = make_params(CodecId::WmaV2, 44100, 2, 128_000, 0x0001);
    let dec = open_decoder(&params);

    assert_eq!(dec.frame_len_bits, 11);
    assert_eq!(dec.frame_len, 2048);
    assert_eq!(dec.nb_block_sizes, 1);
    assert_eq!(dec.coefs_start, 0);
    // bps1 = 128000/(2*44100)*1.6 = 2.32 >= 0.61, 高码率关闭噪声编码
    assert!(!dec.use_noise_coding);
    assert!(dec.use_exp_vlc);
    assert!(dec.exp_vlc.is_some());
    assert!(dec.hgain_vlc.is_none());
}

#[test]
fn test_初始化_低码率启用噪声编码() {
    let params = make_params(CodecId::WmaV2, 8000, 1, 4_000, 0x0001);
    let dec = open_decoder(&params);

    // bps = 0.5 <= 0.625, 噪声编码保持开启
    assert!(dec.use_noise_coding);
    assert!(dec.hgain_vlc.is_some());
    assert_eq!(dec.noise_table.len(), NOISE_TAB_SIZE);
    assert_eq!(dec.frame_len_bits, 9);
}

#[test]
fn test_噪声表首值回归() {
    let params = make_params(CodecId::WmaV2, 8000, 1, 4_000, 0x0001);
    let dec = open_decoder(&params);

    // LCG: seed = 1*314159 + 1 = 314160, 乘固定归一系数
    let norm = 1.0 / (1u64 << 31) as f64 * 3f64.sqrt() * f64::from(0.02f32);
    let expect = (314160f64 * norm) as f32;
    assert_eq!(dec.noise_table[0].to_bits(), expect.to_bits());
    assert!(dec.noise_table.iter().all(|v| v.abs() < 0.035));
}

#[test]
fn test_指数频带在各采样率下覆盖块长() {
    // v2 各档 (含 48000 的纯计算路径), 可变块长全档展开
    for rate in [8000u32, 11025, 16000, 22050, 32000, 44100, 48000] {
        let params = make_params(CodecId::WmaV2, rate, 2, 128_000, 0x0004 | (3 << 3));
        let dec = open_decoder(&params);
        for k in 0..dec.nb_block_sizes {
            let sum: usize = dec.exponent_bands[k][..dec.exponent_sizes[k]]
                .iter()
                .map(|&v| v as usize)
                .sum();
            assert_eq!(
                sum,
                dec.frame_len >> k,
                "rate={} k={} 频带未覆盖块长",
                rate,
                k,
            );
        }
    }

    // v1 走临界频带公式
    let params = make_params(CodecId::WmaV1, 32000, 2, 128_000, 0x0004 | (3 << 3));
    let dec = open_decoder(&params);
    assert_eq!(dec.frame_len_bits, 10);
    for k in 0..dec.nb_block_sizes {
        let sum: usize = dec.exponent_bands[k][..dec.exponent_sizes[k]]
            .iter()
            .map(|&v| v as usize)
            .sum();
        assert_eq!(sum, dec.frame_len >> k, "v1 k={} 频带未覆盖块长", k);
    }
}

#[test]
fn test_高频带划分不超出系数区() {
    let params = make_params(CodecId::WmaV2, 22050, 1, 16_000, 0x0001);
    let dec = open_decoder(&params);
    assert!(dec.use_noise_coding);
    for k in 0..dec.nb_block_sizes {
        let total: usize = dec.exponent_high_bands[k][..dec.exponent_high_sizes[k]]
            .iter()
            .sum();
        assert_eq!(
            total,
            dec.coefs_end[k].saturating_sub(dec.high_band_start[k]),
            "k={} 高频带未铺满 [hb_start, coefs_end)",
            k,
        );
    }
}

/// 构造一个 (无比特储备的) 单帧包: 全零系数
fn build_silent_frame(dec: &WmaDecoder) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put(1, 1); // 声道已编码
    w.put(20, 7); // 总增益 21
    for _ in 0..dec.exponent_sizes[0] {
        w.put_code(0, 1); // 指数增量 0 (1 位码)
    }
    let (code, len) = coef_code(1); // 块结束符
    w.put_code(code, len);
    w.finish(32)
}

#[test]
fn test_解码_全零帧输出静音() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 128_000, 0x0001);
    let mut dec = open_decoder(&params);
    let data = build_silent_frame(&dec);

    dec.send_packet(&Packet::from_data(Bytes::from(data))).unwrap();
    let frame = dec.receive_frame().unwrap();

    assert_eq!(frame.nb_samples, 2048);
    assert_eq!(frame.sample_rate, 44100);
    assert_eq!(frame.sample_format, SampleFormat::S16);
    assert!(frame.data.iter().all(|&b| b == 0));
    assert_eq!(frame.duration, 2048);
}

#[test]
fn test_解码_比特储备两包续解() {
    // 单声道, 启用比特储备: bps = 256000/44100 = 5.8, byte_offset_bits = 12
    let params = make_params(CodecId::WmaV2, 44100, 1, 256_000, 0x0001 | 0x0002);
    let mut dec = open_decoder(&params);
    assert!(dec.use_bit_reservoir);
    assert_eq!(dec.byte_offset_bits, 12);

    // 包 1: 超帧头 (索引 0, 帧数 1, 尾部偏移 0) + 一个含单个非零系数的帧
    let mut w = BitWriter::new();
    w.put(0, 4);
    w.put(2, 4); // nb_frames = 1
    w.put(0, dec.byte_offset_bits + 3);
    w.put(1, 1); // 声道已编码
    w.put(100, 7); // 总增益 101
    for _ in 0..dec.exponent_sizes[0] {
        w.put_code(0, 1);
    }
    let (c2, l2) = coef_code(2); // run 0, level 1
    w.put_code(c2, l2);
    w.put(1, 1); // 正号
    let (eob, eob_len) = coef_code(1);
    w.put_code(eob, eob_len);
    let pkt1 = w.finish(64);

    dec.send_packet(&Packet::from_data(Bytes::from(pkt1))).unwrap();
    let frame = dec.receive_frame().unwrap();
    assert_eq!(frame.nb_samples, 2048);
    assert!(
        frame.data.iter().any(|&b| b != 0),
        "非零系数应产生非零输出",
    );
    // 包尾成为进位
    assert!(!dec.last_superframe.is_empty());

    // 包 2: 追加 8 位到进位并从进位解出一帧. 进位内容为零 (声道未编码),
    // 输出为上一块的重叠尾部
    let mut w = BitWriter::new();
    w.put(1, 4);
    w.put(1, 4); // nb_frames = 0
    w.put(8, dec.byte_offset_bits + 3);
    w.put(0, 8);
    let pkt2 = w.finish(64);

    dec.send_packet(&Packet::from_data(Bytes::from(pkt2))).unwrap();
    let frame = dec.receive_frame().unwrap();
    assert_eq!(frame.nb_samples, 2048);
    assert!(
        frame.data.iter().any(|&b| b != 0),
        "重叠尾部应延续前一块的能量",
    );
}

#[test]
fn test_储备溢出被拒绝() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 256_000, 0x0001 | 0x0002);
    let mut dec = open_decoder(&params);

    // 伪造接近满的进位缓冲, 再声明一个超大的尾部偏移
    dec.last_superframe = vec![0u8; MAX_CODED_SUPERFRAME_SIZE - 4];
    let mut w = BitWriter::new();
    w.put(0, 4);
    w.put(1, 4);
    w.put(16_000, dec.byte_offset_bits + 3); // 16000 位 = 2000 字节, 必然溢出
    let pkt = w.finish(4096);

    let err = dec
        .send_packet(&Packet::from_data(Bytes::from(pkt)))
        .unwrap_err();
    assert!(matches!(err, QinError::InvalidData(_)));
    // 失败后进位状态复位
    assert!(dec.last_superframe.is_empty());
    assert_eq!(dec.last_bitoffset, 0);
}

#[test]
fn test_损坏码流报错不崩溃() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 128_000, 0x0001);
    let mut dec = open_decoder(&params);

    // 全 0xFF: 总增益一元编码永不终止, 最终读空位流
    let garbage = vec![0xFFu8; 16];
    assert!(dec.send_packet(&Packet::from_data(Bytes::from(garbage))).is_err());
    // 之前没有可取的帧, 也不应有半帧输出
    assert!(matches!(dec.receive_frame(), Err(QinError::NeedMoreData)));
}

#[test]
fn test_失败不影响已解码帧() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 128_000, 0x0001);
    let mut dec = open_decoder(&params);

    let good = build_silent_frame(&dec);
    dec.send_packet(&Packet::from_data(Bytes::from(good))).unwrap();
    assert!(dec.send_packet(&Packet::from_data(Bytes::from(vec![0xFFu8; 16]))).is_err());

    // 先前解出的帧仍然有效
    let frame = dec.receive_frame().unwrap();
    assert_eq!(frame.nb_samples, 2048);
}

#[test]
fn test_flush后回到初始状态() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 128_000, 0x0001);
    let mut dec = open_decoder(&params);

    let data = build_silent_frame(&dec);
    dec.send_packet(&Packet::from_data(Bytes::from(data))).unwrap();
    dec.flush();
    assert!(matches!(dec.receive_frame(), Err(QinError::NeedMoreData)));
    assert!(dec.last_superframe.is_empty());
    assert!(dec.reset_block_lengths);
}

#[test]
fn test_空包进入flush状态() {
    let params = make_params(CodecId::WmaV2, 44100, 1, 128_000, 0x0001);
    let mut dec = open_decoder(&params);

    dec.send_packet(&Packet::empty()).unwrap();
    assert!(matches!(dec.receive_frame(), Err(QinError::Eof)));
}
