//! WMA (Windows Media Audio) v1/v2 解码器.
//!
//! 解码链路: 超帧 (一个 ASF 数据包载荷) -> 帧 -> 变长块.
//! 每块按声道解析指数包络与量化系数 (VLC), 高频带按噪声合成填充,
//! 经 IMDCT 与加窗重叠相加得到时域样本. 启用比特储备时超帧开头携带
//! 上一超帧的尾部位, 由会话内的进位缓冲续解.
//!
//! 所有派生常量 (块长档, 指数频带, 高频截止, 噪声表, 窗表, 熵表)
//! 在 `open()` 时从流参数计算一次, 全部为会话私有状态.

mod bitreader;
mod exponent;
mod imdct;
mod tables;
mod vlc;
mod window;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use log::{debug, warn};
use qin_core::{ChannelLayout, QinError, QinResult, Rational, SampleFormat};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::frame::AudioFrame;
use crate::packet::Packet;

use self::bitreader::WmaBitReader;
use self::exponent::{LspContext, decode_exp_vlc};
use self::imdct::MdctContext;
use self::tables::{
    BLOCK_MAX_SIZE, BLOCK_MIN_BITS, COEF_TABLES, COEF_VLC_BITS, COEF_VLC_MAX_DEPTH,
    CRITICAL_FREQS, EXP_VLC_BITS, EXPONENT_BAND_22050, EXPONENT_BAND_32000, EXPONENT_BAND_44100,
    HGAIN_HUFF_LENS, HGAIN_VLC_BITS, HGAIN_VLC_MAX_DEPTH, HIGH_BAND_MAX, MAX_BLOCK_SIZES,
    MAX_CHANNELS, MAX_CODED_SUPERFRAME_SIZE, NOISE_TAB_SIZE, SCALE_HUFF_LENS,
};
use self::vlc::{CoefVlc, Vlc, build_coef_vlc, canonical_codes};
use self::window::{overlap_window, sine_window};

/// 整数 log2 (v = 0 时返回 0)
fn ilog2(v: u32) -> u32 {
    if v == 0 { 0 } else { 31 - v.leading_zeros() }
}

/// 总增益对应的转义 level 位宽
const fn total_gain_to_bits(total_gain: i32) -> u32 {
    if total_gain < 15 {
        13
    } else if total_gain < 32 {
        12
    } else if total_gain < 40 {
        11
    } else if total_gain < 45 {
        10
    } else {
        9
    }
}

/// WMA 解码器会话
pub struct WmaDecoder {
    opened: bool,
    flushing: bool,
    codec_id: CodecId,
    version: u8,

    channels: usize,
    sample_rate: u32,
    bit_rate: u64,
    block_align: usize,
    flags2: u32,

    use_exp_vlc: bool,
    use_bit_reservoir: bool,
    use_variable_block_len: bool,
    use_noise_coding: bool,

    frame_len_bits: u32,
    frame_len: usize,
    nb_block_sizes: usize,
    coefs_start: usize,
    coefs_end: [usize; MAX_BLOCK_SIZES],
    exponent_sizes: [usize; MAX_BLOCK_SIZES],
    exponent_bands: [[u16; 25]; MAX_BLOCK_SIZES],
    high_band_start: [usize; MAX_BLOCK_SIZES],
    exponent_high_sizes: [usize; MAX_BLOCK_SIZES],
    exponent_high_bands: [[usize; HIGH_BAND_MAX]; MAX_BLOCK_SIZES],
    byte_offset_bits: u32,

    exp_vlc: Option<Vlc>,
    hgain_vlc: Option<Vlc>,
    coef_vlc: Vec<CoefVlc>,
    lsp: Option<LspContext>,

    noise_table: Vec<f32>,
    noise_index: usize,
    noise_mult: f32,

    windows: Vec<Vec<f32>>,
    mdct: Vec<MdctContext>,

    // 帧内可变块长状态
    reset_block_lengths: bool,
    block_len_bits: u32,
    next_block_len_bits: u32,
    prev_block_len_bits: u32,
    block_len: usize,
    block_pos: usize,

    // 每声道工作缓冲
    exponents: [Vec<f32>; MAX_CHANNELS],
    exponents_bsize: [usize; MAX_CHANNELS],
    exponents_ready: [bool; MAX_CHANNELS],
    max_exponent: [f32; MAX_CHANNELS],
    high_band_values: [[i32; HIGH_BAND_MAX]; MAX_CHANNELS],
    coefs1: [Vec<i32>; MAX_CHANNELS],
    coefs: [Vec<f32>; MAX_CHANNELS],
    frame_out: [Vec<f32>; MAX_CHANNELS],
    output: Vec<f32>,

    // 比特储备进位
    last_superframe: Vec<u8>,
    last_bitoffset: usize,

    ready: VecDeque<AudioFrame>,
    next_pts: i64,
}

impl WmaDecoder {
    fn new(codec_id: CodecId, version: u8) -> Self {
        Self {
            opened: false,
            flushing: false,
            codec_id,
            version,
            channels: 0,
            sample_rate: 0,
            bit_rate: 0,
            block_align: 0,
            flags2: 0,
            use_exp_vlc: false,
            use_bit_reservoir: false,
            use_variable_block_len: false,
            use_noise_coding: false,
            frame_len_bits: 0,
            frame_len: 0,
            nb_block_sizes: 1,
            coefs_start: 0,
            coefs_end: [0; MAX_BLOCK_SIZES],
            exponent_sizes: [0; MAX_BLOCK_SIZES],
            exponent_bands: [[0; 25]; MAX_BLOCK_SIZES],
            high_band_start: [0; MAX_BLOCK_SIZES],
            exponent_high_sizes: [0; MAX_BLOCK_SIZES],
            exponent_high_bands: [[0; HIGH_BAND_MAX]; MAX_BLOCK_SIZES],
            byte_offset_bits: 0,
            exp_vlc: None,
            hgain_vlc: None,
            coef_vlc: Vec::new(),
            lsp: None,
            noise_table: Vec::new(),
            noise_index: 0,
            noise_mult: 0.0,
            windows: Vec::new(),
            mdct: Vec::new(),
            reset_block_lengths: true,
            block_len_bits: 0,
            next_block_len_bits: 0,
            prev_block_len_bits: 0,
            block_len: 0,
            block_pos: 0,
            exponents: Default::default(),
            exponents_bsize: [0; MAX_CHANNELS],
            exponents_ready: [false; MAX_CHANNELS],
            max_exponent: [0.0; MAX_CHANNELS],
            high_band_values: [[0; HIGH_BAND_MAX]; MAX_CHANNELS],
            coefs1: Default::default(),
            coefs: Default::default(),
            frame_out: Default::default(),
            output: Vec::new(),
            last_superframe: Vec::new(),
            last_bitoffset: 0,
            ready: VecDeque::new(),
            next_pts: 0,
        }
    }

    /// 创建 WMA v1 解码器 (工厂函数)
    pub fn create_v1() -> QinResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new(CodecId::WmaV1, 1)))
    }

    /// 创建 WMA v2 解码器 (工厂函数)
    pub fn create_v2() -> QinResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new(CodecId::WmaV2, 2)))
    }

    /// 从 WAVEFORMATEX 尾部的私有字段解出标志字
    ///
    /// v1 为两个 16 位字, v2 为一个 32 位字加一个 16 位字;
    /// 解码决策只消费 flags2.
    fn parse_extra_flags(&mut self, extra: &[u8]) {
        if self.version == 1 && extra.len() >= 4 {
            self.flags2 = u32::from(u16::from_le_bytes([extra[2], extra[3]]));
        } else if self.version == 2 && extra.len() >= 6 {
            self.flags2 = u32::from(u16::from_le_bytes([extra[4], extra[5]]));
        } else {
            warn!("WMA 私有字段长度不足 ({} 字节), 标志按 0 处理", extra.len());
            self.flags2 = 0;
        }
    }

    /// 计算各块长档的指数频带划分
    fn init_exponent_bands(&mut self) {
        for k in 0..self.nb_block_sizes {
            let block_len = self.frame_len >> k;

            if self.version == 1 {
                // 从临界频带直接求边界 (保留零宽频带)
                let mut lpos = 0usize;
                let mut i = 0usize;
                for &f in CRITICAL_FREQS.iter() {
                    let b = self.sample_rate as usize;
                    let mut pos = (block_len * 2 * f as usize + (b >> 1)) / b;
                    if pos > block_len {
                        pos = block_len;
                    }
                    self.exponent_bands[k][i] = (pos - lpos) as u16;
                    i += 1;
                    if pos >= block_len {
                        break;
                    }
                    lpos = pos;
                }
                self.exponent_sizes[k] = i;
            } else {
                // 常见采样率用预求值表, 其余按临界频带量化到 4 的倍数
                let a = (self.frame_len_bits - BLOCK_MIN_BITS) as usize - k;
                let table = if a < 3 {
                    if self.sample_rate >= 44100 {
                        Some(EXPONENT_BAND_44100[a])
                    } else if self.sample_rate >= 32000 {
                        Some(EXPONENT_BAND_32000[a])
                    } else if self.sample_rate >= 22050 {
                        Some(EXPONENT_BAND_22050[a])
                    } else {
                        None
                    }
                } else {
                    None
                };

                if let Some(table) = table {
                    for (j, &v) in table.iter().enumerate() {
                        self.exponent_bands[k][j] = u16::from(v);
                    }
                    self.exponent_sizes[k] = table.len();
                } else {
                    let mut lpos = 0usize;
                    let mut l = 0usize;
                    for &f in CRITICAL_FREQS.iter() {
                        let b = self.sample_rate as usize;
                        let mut pos = ((block_len * 2 * f as usize + (b << 1)) / (4 * b)) << 2;
                        if pos > block_len {
                            pos = block_len;
                        }
                        if pos > lpos {
                            self.exponent_bands[k][l] = (pos - lpos) as u16;
                            l += 1;
                        }
                        if pos >= block_len {
                            break;
                        }
                        lpos = pos;
                    }
                    self.exponent_sizes[k] = l;
                }
            }

            // 高频带划分: 指数频带裁剪到 [hb_start, coefs_end)
            let mut pos = 0usize;
            let mut l = 0usize;
            for j in 0..self.exponent_sizes[k] {
                let mut start = pos;
                pos += self.exponent_bands[k][j] as usize;
                let mut end = pos;
                if start < self.high_band_start[k] {
                    start = self.high_band_start[k];
                }
                if end > self.coefs_end[k] {
                    end = self.coefs_end[k];
                }
                if end > start && l < HIGH_BAND_MAX {
                    self.exponent_high_bands[k][l] = end - start;
                    l += 1;
                }
            }
            self.exponent_high_sizes[k] = l;
        }
    }

    /// 解码一个超帧, 返回交错 i16 采样
    fn decode_superframe(&mut self, buf: &[u8]) -> QinResult<Vec<i16>> {
        if buf.len() > MAX_CODED_SUPERFRAME_SIZE {
            return Err(QinError::InvalidData(format!(
                "超帧长度 {} 超出上限",
                buf.len(),
            )));
        }
        if self.block_align > 0 && buf.len() != self.block_align {
            debug!(
                "超帧长度 {} 与块对齐 {} 不一致",
                buf.len(),
                self.block_align,
            );
        }

        let mut samples = Vec::new();

        if self.use_bit_reservoir {
            let mut br = WmaBitReader::new(buf);
            // 超帧序号仅用于差错定位, 跳过
            br.skip_bits(4)?;
            let nb_frames = br.read_bits(4)? as i32 - 1;
            let bit_offset = br.read_bits(self.byte_offset_bits + 3)? as usize;

            if !self.last_superframe.is_empty() {
                // 把本包开头的 bit_offset 位续接到上一超帧尾部
                if self.last_superframe.len() + ((bit_offset + 7) >> 3)
                    > MAX_CODED_SUPERFRAME_SIZE
                {
                    return Err(QinError::InvalidData("比特储备进位缓冲溢出".into()));
                }
                let mut len = bit_offset;
                while len > 7 {
                    self.last_superframe.push(br.read_bits(8)? as u8);
                    len -= 8;
                }
                if len > 0 {
                    // 残位按低位对齐存放, 与读取端低位先行的约定一致
                    self.last_superframe.push(br.read_bits(len as u32)? as u8);
                }

                let carry = std::mem::take(&mut self.last_superframe);
                let mut rbr = WmaBitReader::new(&carry);
                if self.last_bitoffset > 0 {
                    rbr.skip_bits(self.last_bitoffset)?;
                }
                let res = self.decode_frame(&mut rbr, &mut samples);
                self.last_superframe = carry;
                res?;
            }

            // 定位到本包自身的帧数据起点
            let pos = bit_offset + 4 + 4 + self.byte_offset_bits as usize + 3;
            if (pos >> 3) > buf.len() {
                return Err(QinError::InvalidData("超帧尾部偏移越过包边界".into()));
            }
            let mut fbr = WmaBitReader::new(&buf[pos >> 3..]);
            if pos & 7 != 0 {
                fbr.skip_bits(pos & 7)?;
            }

            self.reset_block_lengths = true;
            for _ in 0..nb_frames.max(0) {
                self.decode_frame(&mut fbr, &mut samples)?;
            }

            // 剩余字节连同残位偏移成为下一超帧的进位
            let bits_used = fbr.bits_read() + (pos & !7);
            self.last_bitoffset = bits_used & 7;
            let byte_pos = bits_used >> 3;
            if byte_pos > buf.len() {
                return Err(QinError::InvalidData("超帧消费越过包边界".into()));
            }
            let tail_len = buf.len() - byte_pos;
            if tail_len > MAX_CODED_SUPERFRAME_SIZE {
                return Err(QinError::InvalidData("比特储备尾部超出容量".into()));
            }
            self.last_superframe.clear();
            self.last_superframe.extend_from_slice(&buf[byte_pos..]);
        } else {
            let mut br = WmaBitReader::new(buf);
            self.decode_frame(&mut br, &mut samples)?;
        }

        Ok(samples)
    }

    /// 解码一个帧 (frame_len 个采样/声道), 追加交错输出
    fn decode_frame(&mut self, br: &mut WmaBitReader<'_>, samples: &mut Vec<i16>) -> QinResult<()> {
        self.block_pos = 0;
        let max_blocks = (self.frame_len >> BLOCK_MIN_BITS) + 1;
        let mut blocks = 0usize;
        loop {
            if self.decode_block(br)? {
                break;
            }
            blocks += 1;
            if blocks > max_blocks {
                return Err(QinError::InvalidData("帧内块数超限".into()));
            }
        }

        let n = self.frame_len;
        samples.reserve(n * self.channels);
        for j in 0..n {
            for ch in 0..self.channels {
                let v = self.frame_out[ch][j];
                samples.push(v.round().clamp(-32768.0, 32767.0) as i16);
            }
        }

        // 滑动缓冲左移一帧, 保留重叠尾部
        for ch in 0..self.channels {
            self.frame_out[ch].copy_within(n..2 * n, 0);
        }

        Ok(())
    }

    /// 解码一个块, 返回是否已填满当前帧
    fn decode_block(&mut self, br: &mut WmaBitReader<'_>) -> QinResult<bool> {
        // 可变块长: 读取块长选择子
        if self.use_variable_block_len {
            let n = ilog2(self.nb_block_sizes as u32 - 1) + 1;
            if self.reset_block_lengths {
                self.reset_block_lengths = false;
                let v = br.read_bits(n)? as usize;
                if v >= self.nb_block_sizes {
                    return Err(QinError::InvalidData(format!("块长选择子越界: {}", v)));
                }
                self.prev_block_len_bits = self.frame_len_bits - v as u32;
                let v = br.read_bits(n)? as usize;
                if v >= self.nb_block_sizes {
                    return Err(QinError::InvalidData(format!("块长选择子越界: {}", v)));
                }
                self.block_len_bits = self.frame_len_bits - v as u32;
            } else {
                self.prev_block_len_bits = self.block_len_bits;
                self.block_len_bits = self.next_block_len_bits;
            }
            let v = br.read_bits(n)? as usize;
            if v >= self.nb_block_sizes {
                return Err(QinError::InvalidData(format!("块长选择子越界: {}", v)));
            }
            self.next_block_len_bits = self.frame_len_bits - v as u32;
        } else {
            self.prev_block_len_bits = self.frame_len_bits;
            self.block_len_bits = self.frame_len_bits;
            self.next_block_len_bits = self.frame_len_bits;
        }

        self.block_len = 1 << self.block_len_bits;
        if self.block_pos + self.block_len > self.frame_len {
            return Err(QinError::InvalidData("块越过帧边界".into()));
        }

        let ms_stereo = if self.channels == 2 {
            br.read_flag()?
        } else {
            false
        };

        let mut channel_coded = [false; MAX_CHANNELS];
        let mut any_coded = false;
        for coded in channel_coded.iter_mut().take(self.channels) {
            *coded = br.read_flag()?;
            any_coded |= *coded;
        }
        if !any_coded {
            self.block_pos += self.block_len;
            return Ok(self.block_pos >= self.frame_len);
        }

        let bsize = (self.frame_len_bits - self.block_len_bits) as usize;

        // 一元编码的总增益: 7 位一段, 127 表示续读
        let mut total_gain = 1i32;
        loop {
            let a = br.read_bits(7)? as i32;
            total_gain += a;
            if a != 127 {
                break;
            }
        }
        let coef_nb_bits = total_gain_to_bits(total_gain);

        let n = self.coefs_end[bsize] as i32 - self.coefs_start as i32;
        let mut nb_coefs = [n; MAX_CHANNELS];

        // 高频带编码标志与增益
        let mut hb_coded = [[false; HIGH_BAND_MAX]; MAX_CHANNELS];
        if self.use_noise_coding {
            for ch in 0..self.channels {
                if !channel_coded[ch] {
                    continue;
                }
                for j in 0..self.exponent_high_sizes[bsize] {
                    let a = br.read_flag()?;
                    hb_coded[ch][j] = a;
                    if a {
                        nb_coefs[ch] -= self.exponent_high_bands[bsize][j] as i32;
                    }
                }
            }
            for ch in 0..self.channels {
                if !channel_coded[ch] {
                    continue;
                }
                let mut val: Option<i32> = None;
                for j in 0..self.exponent_high_sizes[bsize] {
                    let v = match val {
                        None => br.read_bits(7)? as i32 - 19,
                        Some(prev) => {
                            let vlc = self.hgain_vlc.as_ref().ok_or_else(|| {
                                QinError::Internal("高频带增益 VLC 未初始化".into())
                            })?;
                            let code = vlc.decode(br, HGAIN_VLC_MAX_DEPTH)? as i32;
                            prev + code - 18
                        }
                    };
                    self.high_band_values[ch][j] = v;
                    val = Some(v);
                }
            }
        }

        // 指数包络: 整块或显式标志时重读
        if self.block_len_bits == self.frame_len_bits || br.read_flag()? {
            for ch in 0..self.channels {
                if !channel_coded[ch] {
                    continue;
                }
                let max = if self.use_exp_vlc {
                    let vlc = self
                        .exp_vlc
                        .as_ref()
                        .ok_or_else(|| QinError::Internal("指数 VLC 未初始化".into()))?;
                    decode_exp_vlc(
                        br,
                        vlc,
                        self.version,
                        &self.exponent_bands[bsize][..self.exponent_sizes[bsize]],
                        self.block_len,
                        &mut self.exponents[ch],
                    )?
                } else {
                    let lsp = self
                        .lsp
                        .as_ref()
                        .ok_or_else(|| QinError::Internal("LSP 上下文未初始化".into()))?;
                    lsp.decode(br, &mut self.exponents[ch], self.block_len)?
                };
                self.max_exponent[ch] = max;
                self.exponents_bsize[ch] = bsize;
                self.exponents_ready[ch] = true;
            }
        }
        for ch in 0..self.channels {
            if channel_coded[ch] && !self.exponents_ready[ch] {
                return Err(QinError::InvalidData("声道缺少指数包络".into()));
            }
        }

        // 量化系数: run/level VLC, 0 为转义, 1 为块结束
        for ch in 0..self.channels {
            if channel_coded[ch] {
                let tindex = usize::from(ch == 1 && ms_stereo);
                self.coefs1[ch][..self.block_len].fill(0);
                let eptr = nb_coefs[ch].max(0) as usize;
                let mut ptr = 0usize;
                loop {
                    let cv = &self.coef_vlc[tindex];
                    let code = cv.vlc.decode(br, COEF_VLC_MAX_DEPTH)? as usize;
                    if code == 1 {
                        break;
                    }
                    let (run, level) = if code == 0 {
                        let level = br.read_bits(coef_nb_bits)? as i32;
                        let run = br.read_bits(self.block_len_bits)? as usize;
                        (run, level)
                    } else {
                        (cv.run_table[code] as usize, i32::from(cv.level_table[code]))
                    };
                    let sign = br.read_flag()?;
                    let level = if sign { level } else { -level };
                    ptr += run;
                    if ptr >= eptr {
                        break;
                    }
                    self.coefs1[ch][ptr] = level;
                    ptr += 1;
                }
            }
            if self.version == 1 && self.channels >= 2 {
                br.align_to_byte();
            }
        }

        // 归一化: IMDCT 输出按半块长归一, v1 额外乘 sqrt(n4)
        let n4 = self.block_len / 2;
        let mut mdct_norm = 1.0f32 / n4 as f32;
        if self.version == 1 {
            mdct_norm *= (n4 as f32).sqrt();
        }

        for ch in 0..self.channels {
            if channel_coded[ch] {
                self.reconstruct_channel(ch, bsize, total_gain, nb_coefs[ch].max(0) as usize, &hb_coded[ch], mdct_norm);
            }
        }

        // 中侧立体声还原
        if ms_stereo && channel_coded[1] {
            if !channel_coded[0] {
                self.coefs[0][..self.block_len].fill(0.0);
                channel_coded[0] = true;
            }
            let (left, right) = self.coefs.split_at_mut(1);
            for (a, b) in left[0][..self.block_len]
                .iter_mut()
                .zip(right[0][..self.block_len].iter_mut())
            {
                let m = *a;
                let s = *b;
                *a = m + s;
                *b = m - s;
            }
        }

        // IMDCT 与加窗叠加
        for ch in 0..self.channels {
            if channel_coded[ch] {
                let index = self.frame_len / 2 + self.block_pos - n4;
                self.mdct[bsize]
                    .imdct(&mut self.output, &self.coefs[ch][..self.block_len]);
                overlap_window(
                    &mut self.frame_out[ch][index..],
                    &self.output,
                    &self.windows,
                    self.frame_len_bits,
                    self.block_len_bits,
                    self.prev_block_len_bits,
                    self.next_block_len_bits,
                );
                // 中侧模式下未编码的副声道直接复用主声道输出
                if ms_stereo && !channel_coded[1] {
                    overlap_window(
                        &mut self.frame_out[1][index..],
                        &self.output,
                        &self.windows,
                        self.frame_len_bits,
                        self.block_len_bits,
                        self.prev_block_len_bits,
                        self.next_block_len_bits,
                    );
                }
            }
        }

        self.block_pos += self.block_len;
        Ok(self.block_pos >= self.frame_len)
    }

    /// 由量化值/噪声与指数包络重建一个声道的频域系数
    fn reconstruct_channel(
        &mut self,
        ch: usize,
        bsize: usize,
        total_gain: i32,
        nb_coefs: usize,
        hb_coded: &[bool; HIGH_BAND_MAX],
        mdct_norm: f32,
    ) {
        let esize = self.exponents_bsize[ch];
        let block_len = self.block_len;
        let mult = 10f32.powf(total_gain as f32 * 0.05) / self.max_exponent[ch] * mdct_norm;

        // 指数包络按 (pos << bsize) >> esize 重采样到当前块长
        let step = |n: usize| (n << bsize) >> esize;

        if self.use_noise_coding {
            // 起始段: 纯噪声乘包络
            for i in 0..self.coefs_start {
                let noise = self.noise_table[self.noise_index];
                self.noise_index = (self.noise_index + 1) & (NOISE_TAB_SIZE - 1);
                self.coefs[ch][i] = noise * self.exponents[ch][step(i)] * mult;
            }

            let n1 = self.exponent_high_sizes[bsize];

            // 编码高频带的包络能量
            let mut exp_power = [0f32; HIGH_BAND_MAX];
            let mut last_high_band = 0usize;
            let mut exp_base = step(self.high_band_start[bsize]);
            for j in 0..n1 {
                let n = self.exponent_high_bands[bsize][j];
                if hb_coded[j] {
                    let mut e2 = 0f32;
                    for i in 0..n {
                        let v = self.exponents[ch][exp_base + step(i)];
                        e2 += v * v;
                    }
                    exp_power[j] = e2 / n as f32;
                    last_high_band = j;
                }
                exp_base += step(n);
            }

            // 主频段与高频带: 编码带为量化值+小噪声, 缺席带为能量标定噪声
            let mut cpos = self.coefs_start;
            let mut c1pos = 0usize;
            let mut exp_base = step(self.coefs_start);
            for j in 0..=n1 {
                let n = if j == 0 {
                    self.high_band_start[bsize].saturating_sub(self.coefs_start)
                } else {
                    self.exponent_high_bands[bsize][j - 1]
                };
                if j > 0 && hb_coded[j - 1] {
                    let mut mult1 = (exp_power[j - 1] / exp_power[last_high_band]).sqrt();
                    mult1 *= 10f32.powf(self.high_band_values[ch][j - 1] as f32 * 0.05);
                    mult1 /= self.max_exponent[ch] * self.noise_mult;
                    mult1 *= mdct_norm;
                    for _ in 0..n {
                        let noise = self.noise_table[self.noise_index];
                        self.noise_index = (self.noise_index + 1) & (NOISE_TAB_SIZE - 1);
                        self.coefs[ch][cpos] = noise * mult1;
                        cpos += 1;
                    }
                } else {
                    for i in 0..n {
                        let noise = self.noise_table[self.noise_index];
                        self.noise_index = (self.noise_index + 1) & (NOISE_TAB_SIZE - 1);
                        let q = if c1pos < nb_coefs {
                            self.coefs1[ch][c1pos] as f32
                        } else {
                            0.0
                        };
                        c1pos += 1;
                        self.coefs[ch][cpos] =
                            (q + noise) * self.exponents[ch][exp_base + step(i)] * mult;
                        cpos += 1;
                    }
                }
                exp_base += step(n);
            }

            // 截止之上: 以末端包络值标定的噪声
            let n = block_len - self.coefs_end[bsize];
            let last_idx = exp_base.saturating_sub(step(1).max(1));
            let mult1 = mult * self.exponents[ch][last_idx];
            for _ in 0..n {
                let noise = self.noise_table[self.noise_index];
                self.noise_index = (self.noise_index + 1) & (NOISE_TAB_SIZE - 1);
                self.coefs[ch][cpos] = noise * mult1;
                cpos += 1;
            }
        } else {
            for i in 0..self.coefs_start {
                self.coefs[ch][i] = 0.0;
            }
            for i in 0..nb_coefs {
                self.coefs[ch][self.coefs_start + i] =
                    self.coefs1[ch][i] as f32 * self.exponents[ch][step(i)] * mult;
            }
            let tail = block_len - self.coefs_end[bsize];
            for i in 0..tail {
                self.coefs[ch][self.coefs_end[bsize] + i] = 0.0;
            }
        }
    }
}

impl Decoder for WmaDecoder {
    fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    fn name(&self) -> &str {
        match self.version {
            1 => "wmav1",
            _ => "wmav2",
        }
    }

    fn open(&mut self, params: &CodecParameters) -> QinResult<()> {
        let audio = params
            .audio()
            .ok_or_else(|| QinError::InvalidArgument("WMA 需要音频流参数".into()))?;

        let channels = audio.channel_layout.channels as usize;
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(QinError::Unsupported(format!(
                "不支持的声道数: {}",
                channels,
            )));
        }
        if audio.sample_rate == 0 {
            return Err(QinError::InvalidArgument("采样率为 0".into()));
        }

        self.channels = channels;
        self.sample_rate = audio.sample_rate;
        self.bit_rate = params.bit_rate;
        self.block_align = audio.block_align as usize;
        self.parse_extra_flags(&params.extra_data);

        self.use_exp_vlc = self.flags2 & 0x0001 != 0;
        self.use_bit_reservoir = self.flags2 & 0x0002 != 0;
        self.use_variable_block_len = self.flags2 & 0x0004 != 0;
        self.coefs_start = if self.version == 1 { 3 } else { 0 };

        // MDCT 帧长: 采样率与版本决定 9/10/11 位
        self.frame_len_bits = if self.sample_rate <= 16000 {
            9
        } else if self.sample_rate <= 22050 || (self.sample_rate <= 32000 && self.version == 1) {
            10
        } else {
            11
        };
        self.frame_len = 1 << self.frame_len_bits;

        if self.use_variable_block_len {
            let mut nb = ((self.flags2 >> 3) & 3) as usize + 1;
            if self.bit_rate / self.channels as u64 >= 32000 {
                nb += 2;
            }
            let nb_max = (self.frame_len_bits - BLOCK_MIN_BITS) as usize;
            nb = nb.min(nb_max);
            self.nb_block_sizes = nb + 1;
        } else {
            self.nb_block_sizes = 1;
        }

        // 码率启发: 高频截止与噪声编码开关, 常数保持与参考一致
        let bps =
            self.bit_rate as f64 / (self.channels as f64 * f64::from(self.sample_rate));
        let mut bps1 = bps;
        if self.channels == 2 {
            bps1 = bps * 1.6;
        }
        self.byte_offset_bits = ilog2((bps * self.frame_len as f64 / 8.0 + 0.5) as u32) + 2;

        let rate_bucket = if self.version == 2 {
            if self.sample_rate >= 44100 {
                44100
            } else if self.sample_rate >= 22050 {
                22050
            } else if self.sample_rate >= 16000 {
                16000
            } else if self.sample_rate >= 11025 {
                11025
            } else if self.sample_rate >= 8000 {
                8000
            } else {
                self.sample_rate
            }
        } else {
            self.sample_rate
        };

        self.use_noise_coding = true;
        let mut high_freq = f64::from(self.sample_rate) / 2.0;
        match rate_bucket {
            44100 => {
                if bps1 >= 0.61 {
                    self.use_noise_coding = false;
                } else {
                    high_freq /= 2.5;
                }
            }
            22050 => {
                if bps1 >= 1.16 {
                    self.use_noise_coding = false;
                } else if bps >= 0.72 {
                    high_freq *= 0.7;
                } else {
                    high_freq *= 0.6;
                }
            }
            16000 => {
                if bps > 0.5 {
                    high_freq /= 2.0;
                } else {
                    high_freq *= 0.3;
                }
            }
            11025 => {
                high_freq *= 0.7;
            }
            8000 => {
                if bps <= 0.625 {
                    high_freq /= 2.0;
                } else if bps > 0.75 {
                    self.use_noise_coding = false;
                } else {
                    high_freq *= 0.65;
                }
            }
            _ => {
                if bps >= 0.8 {
                    high_freq *= 0.75;
                } else if bps >= 0.6 {
                    high_freq *= 0.6;
                } else {
                    high_freq /= 2.0;
                }
            }
        }

        debug!(
            "wma open: 版本={}, 采样率={}, 声道={}, bps={:.3}, 帧长={}, 块长档={}, 噪声编码={}, 可变块长={}, 比特储备={}",
            self.version,
            self.sample_rate,
            self.channels,
            bps,
            self.frame_len,
            self.nb_block_sizes,
            self.use_noise_coding,
            self.use_variable_block_len,
            self.use_bit_reservoir,
        );

        for k in 0..self.nb_block_sizes {
            let block_len = self.frame_len >> k;
            self.coefs_end[k] = (self.frame_len - self.frame_len * 9 / 100) >> k;
            self.high_band_start[k] = ((block_len as f64 * 2.0 * high_freq
                / f64::from(self.sample_rate)
                + 0.5) as usize)
                .min(block_len);
        }
        self.init_exponent_bands();

        // 熵表
        if self.use_noise_coding {
            self.hgain_vlc = Some(Vlc::build(
                HGAIN_VLC_BITS,
                &HGAIN_HUFF_LENS,
                &canonical_codes(&HGAIN_HUFF_LENS),
            )?);
        }
        if self.use_exp_vlc {
            self.exp_vlc = Some(Vlc::build(
                EXP_VLC_BITS,
                &SCALE_HUFF_LENS,
                &canonical_codes(&SCALE_HUFF_LENS),
            )?);
        } else {
            self.lsp = Some(LspContext::new(self.frame_len));
        }

        // 噪声表: LCG 乘子 314159, 种子 1
        if self.use_noise_coding {
            self.noise_mult = if self.use_exp_vlc { 0.02 } else { 0.04 };
            let norm = 1.0 / (1u64 << 31) as f64 * 3f64.sqrt() * f64::from(self.noise_mult);
            let mut seed: u32 = 1;
            self.noise_table = (0..NOISE_TAB_SIZE)
                .map(|_| {
                    seed = seed.wrapping_mul(314159).wrapping_add(1);
                    (f64::from(seed as i32) * norm) as f32
                })
                .collect();
        }

        // 系数表按码率档成对选取
        let mut cvt = 2usize;
        if self.sample_rate >= 32000 {
            if bps1 < 0.72 {
                cvt = 0;
            } else if bps1 < 1.16 {
                cvt = 1;
            }
        }
        self.coef_vlc = vec![
            build_coef_vlc(COEF_VLC_BITS, COEF_TABLES[cvt * 2])?,
            build_coef_vlc(COEF_VLC_BITS, COEF_TABLES[cvt * 2 + 1])?,
        ];

        // 每块长档的窗与 IMDCT 上下文
        self.windows = (0..self.nb_block_sizes)
            .map(|k| sine_window(self.frame_len >> k))
            .collect();
        self.mdct = (0..self.nb_block_sizes)
            .map(|k| MdctContext::new(self.frame_len_bits - k as u32 + 1))
            .collect();

        // 工作缓冲
        for ch in 0..MAX_CHANNELS {
            self.exponents[ch] = vec![0.0; BLOCK_MAX_SIZE];
            self.coefs1[ch] = vec![0; BLOCK_MAX_SIZE];
            self.coefs[ch] = vec![0.0; BLOCK_MAX_SIZE];
            self.frame_out[ch] = vec![0.0; 2 * BLOCK_MAX_SIZE];
        }
        self.output = vec![0.0; 2 * BLOCK_MAX_SIZE];
        self.exponents_ready = [false; MAX_CHANNELS];
        self.last_superframe = Vec::with_capacity(MAX_CODED_SUPERFRAME_SIZE);
        self.last_bitoffset = 0;
        self.reset_block_lengths = true;
        self.noise_index = 0;
        self.next_pts = 0;
        self.ready.clear();
        self.flushing = false;
        self.opened = true;

        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> QinResult<()> {
        if !self.opened {
            return Err(QinError::Codec("WMA 解码器未打开".into()));
        }
        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }

        match self.decode_superframe(&packet.data) {
            Ok(samples) => {
                if samples.is_empty() {
                    return Ok(());
                }
                let nb_samples = (samples.len() / self.channels) as u32;
                let mut frame = AudioFrame::new(
                    nb_samples,
                    self.sample_rate,
                    SampleFormat::S16,
                    ChannelLayout::from_channels(self.channels as u32),
                );
                frame.data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                // 时间戳以采样为单位累计, 容器侧毫秒时间戳不混用
                frame.pts = self.next_pts;
                frame.time_base = Rational::new(1, self.sample_rate as i32);
                frame.duration = i64::from(nb_samples);
                self.next_pts += i64::from(nb_samples);
                self.ready.push_back(frame);
                Ok(())
            }
            Err(e) => {
                // 失败的超帧不产生输出, 并复位进位状态
                warn!("WMA 超帧解码失败: {}", e);
                self.last_superframe.clear();
                self.last_bitoffset = 0;
                Err(e)
            }
        }
    }

    fn receive_frame(&mut self) -> QinResult<AudioFrame> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(frame);
        }
        if self.flushing {
            return Err(QinError::Eof);
        }
        Err(QinError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.ready.clear();
        self.last_superframe.clear();
        self.last_bitoffset = 0;
        self.reset_block_lengths = true;
        self.flushing = false;
        for ch in 0..MAX_CHANNELS {
            for v in self.frame_out[ch].iter_mut() {
                *v = 0.0;
            }
        }
    }
}
