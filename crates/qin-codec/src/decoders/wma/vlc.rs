//! WMA VLC (变长码) 表构建与解码.
//!
//! 多级查找表结构: 第一级表宽 `table_bits` 位, 超长码字在对应槽位上
//! 挂接递归构建的子表. 码字由码长数组按 canonical Huffman 规则导出.

use qin_core::{QinError, QinResult};

use super::bitreader::WmaBitReader;

/// VLC 表项
///
/// - `len > 0`: 终结项, `val` 为符号, `len` 为本级需消费的位数
/// - `len < 0`: 溢出项, `val` 为子表起始索引, `-len` 为子表位宽
/// - `len == 0`: 无效前缀
#[derive(Debug, Clone, Copy)]
struct VlcEntry {
    val: u32,
    len: i16,
}

/// 多级 VLC 查找表
#[derive(Debug, Clone)]
pub struct Vlc {
    table_bits: u32,
    entries: Vec<VlcEntry>,
}

/// 由码长数组导出 canonical Huffman 码字
///
/// 码字按 (码长, 符号序) 分配: 同长度的码字依符号序递增,
/// 长度增加时左移补零. 码长 0 表示该符号不出现.
pub fn canonical_codes(lens: &[u8]) -> Vec<u32> {
    let mut bl_count = [0u32; 33];
    let mut max_len = 0u8;
    for &len in lens {
        if len > 0 {
            bl_count[len as usize] += 1;
            max_len = max_len.max(len);
        }
    }

    let mut next_code = [0u32; 33];
    let mut code = 0u32;
    for len in 1..=max_len as usize {
        code = (code + bl_count[len - 1]) << 1;
        next_code[len] = code;
    }

    lens.iter()
        .map(|&len| {
            if len == 0 {
                0
            } else {
                let c = next_code[len as usize];
                next_code[len as usize] += 1;
                c
            }
        })
        .collect()
}

impl Vlc {
    /// 从码长/码字数组构建多级查找表
    ///
    /// 符号即数组下标. 两个不同符号前缀冲突时返回 `QinError::Internal`
    /// (所有表均为固定常量, 构建失败意味着表数据有误).
    pub fn build(table_bits: u32, lens: &[u8], codes: &[u32]) -> QinResult<Self> {
        if lens.len() != codes.len() {
            return Err(QinError::Internal(format!(
                "VLC 表码长/码字数量不一致: {} != {}",
                lens.len(),
                codes.len(),
            )));
        }
        let mut vlc = Self {
            table_bits,
            entries: Vec::new(),
        };
        vlc.build_subtable(table_bits, lens, codes, 0, 0)?;
        Ok(vlc)
    }

    /// 递归构建一级子表, 返回其在表区中的起始索引
    fn build_subtable(
        &mut self,
        table_bits: u32,
        lens: &[u8],
        codes: &[u32],
        code_prefix: u32,
        n_prefix: u32,
    ) -> QinResult<usize> {
        let table_size = 1usize << table_bits;
        let table_index = self.entries.len();
        self.entries
            .resize(table_index + table_size, VlcEntry { val: 0, len: 0 });

        // 第一遍: 放置本级可容纳的码字, 标记需要子表的槽位
        for (symbol, (&len, &code)) in lens.iter().zip(codes.iter()).enumerate() {
            if len == 0 {
                continue;
            }
            let len = u32::from(len);
            if len <= n_prefix {
                continue;
            }
            let l = len - n_prefix;
            let prefix = if l < 32 { code >> l } else { 0 };
            if prefix != code_prefix {
                continue;
            }

            if l <= table_bits {
                // 直接放置: 低 l 位之后的 don't-care 位全部复制
                let repeat = 1usize << (table_bits - l);
                let k = ((code as usize) << (table_bits - l)) & (table_size - 1);
                for j in 0..repeat {
                    let e = &mut self.entries[table_index + k + j];
                    if e.len != 0 {
                        return Err(QinError::Internal(format!(
                            "VLC 表前缀冲突: 符号 {} 码长 {}",
                            symbol, len,
                        )));
                    }
                    *e = VlcEntry {
                        val: symbol as u32,
                        len: l as i16,
                    };
                }
            } else {
                // 超出本级位宽: 记录子表所需的最大附加位数
                let extra = l - table_bits;
                let k = ((code >> extra) as usize) & (table_size - 1);
                let e = &mut self.entries[table_index + k];
                if e.len > 0 {
                    return Err(QinError::Internal(format!(
                        "VLC 表前缀冲突: 符号 {} 与已放置码字重叠",
                        symbol,
                    )));
                }
                let cur = (-e.len) as u32;
                e.len = -(cur.max(extra).min(table_bits) as i16);
            }
        }

        // 第二遍: 为每个溢出槽位递归构建子表
        for j in 0..table_size {
            let len = self.entries[table_index + j].len;
            if len < 0 {
                let sub_bits = (-len) as u32;
                let sub_index = self.build_subtable(
                    sub_bits,
                    lens,
                    codes,
                    (code_prefix << table_bits) | j as u32,
                    n_prefix + table_bits,
                )?;
                self.entries[table_index + j].val = sub_index as u32;
            }
        }

        Ok(table_index)
    }

    /// 从位流解码一个符号
    ///
    /// 窥视 `table_bits` 位查表; 溢出项消费本级位数后进入子表,
    /// 最多 `max_depth` 级. 无效前缀或级数耗尽返回 `InvalidData`.
    pub fn decode(&self, br: &mut WmaBitReader<'_>, max_depth: u32) -> QinResult<u32> {
        let mut entry = self.entries[self.peek_index(br, self.table_bits, 0)?];
        let mut level = 1;

        while entry.len < 0 {
            if level >= max_depth {
                return Err(QinError::InvalidData("VLC 解码级数耗尽".into()));
            }
            br.skip_bits(self.table_bits as usize)?;
            let sub_bits = (-entry.len) as u32;
            let idx = self.peek_index(br, sub_bits, entry.val as usize)?;
            entry = self.entries[idx];
            level += 1;
        }

        if entry.len == 0 {
            return Err(QinError::InvalidData("VLC 无效码字前缀".into()));
        }
        br.skip_bits(entry.len as usize)?;
        Ok(entry.val)
    }

    /// 窥视 `bits` 位并换算为表区索引 (不移动游标)
    ///
    /// 码字走位序列语义: 逐位取出并按先到位在高位累加, 保证任意前缀
    /// 与更短的窥视结果一致. 流末尾不足 `bits` 位时按零补齐低位,
    /// 与码字左对齐的表布局一致.
    fn peek_index(&self, br: &WmaBitReader<'_>, bits: u32, base: usize) -> QinResult<usize> {
        let avail = (br.bits_left() as u32).min(bits);
        if avail == 0 {
            return Err(QinError::Eof);
        }
        let mut probe = *br;
        let mut v = 0u32;
        for _ in 0..avail {
            v = (v << 1) | probe.read_bits(1)?;
        }
        Ok(base + ((v << (bits - avail)) as usize))
    }
}

/// 系数 run/level 表规格: 每个量化级别对应的 run 数量
#[derive(Debug, Clone, Copy)]
pub struct CoefTableSpec {
    /// 符号总数 (含转义符 0 与块结束符 1)
    pub n: usize,
    /// 码长 run-length 编码: (码长, 数量)
    pub len_runs: &'static [(u8, u16)],
    /// 每个 level (从 1 起) 的 run 数量, 总和为 n - 2
    pub levels: &'static [u16],
}

/// 构建好的系数 VLC: 查找表 + 符号到 (run, level) 的展开
#[derive(Debug, Clone)]
pub struct CoefVlc {
    pub vlc: Vlc,
    pub run_table: Vec<u16>,
    pub level_table: Vec<u16>,
    pub max_level: u16,
}

/// 展开 run-length 码长规格为逐符号码长数组
pub fn expand_len_runs(len_runs: &[(u8, u16)]) -> Vec<u8> {
    let mut lens = Vec::new();
    for &(len, count) in len_runs {
        lens.extend(std::iter::repeat_n(len, count as usize));
    }
    lens
}

/// 构建系数 VLC 表
///
/// 符号 0 为转义 (原始 level/run 编码), 符号 1 为块结束;
/// 其后按 level 递增展开, 每个 level 含 `levels[level-1]` 个 run.
pub fn build_coef_vlc(table_bits: u32, spec: &CoefTableSpec) -> QinResult<CoefVlc> {
    let lens = expand_len_runs(spec.len_runs);
    if lens.len() != spec.n {
        return Err(QinError::Internal(format!(
            "系数表码长数量 {} 与符号数 {} 不一致",
            lens.len(),
            spec.n,
        )));
    }
    let codes = canonical_codes(&lens);
    let vlc = Vlc::build(table_bits, &lens, &codes)?;

    let mut run_table = vec![0u16; spec.n];
    let mut level_table = vec![0u16; spec.n];
    let mut i = 2usize;
    let mut level = 1u16;
    for &count in spec.levels {
        for run in 0..count {
            if i >= spec.n {
                return Err(QinError::Internal("系数表 level 展开越界".into()));
            }
            run_table[i] = run;
            level_table[i] = level;
            i += 1;
        }
        level += 1;
    }
    if i != spec.n {
        return Err(QinError::Internal(format!(
            "系数表 level 展开不完整: {} != {}",
            i, spec.n,
        )));
    }

    Ok(CoefVlc {
        vlc,
        run_table,
        level_table,
        max_level: level - 1,
    })
}
