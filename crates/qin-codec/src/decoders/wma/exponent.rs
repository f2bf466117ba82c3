//! WMA 指数包络重建.
//!
//! 两种模式: VLC 模式按频带读取对数域增量 (步长 10^(delta/16)),
//! LSP 模式读取 10 个线谱对系数并展开为频域包络曲线 (x^-1/4 经
//! 指数/尾数分段线性近似求值).

use qin_core::{QinError, QinResult};

use super::bitreader::WmaBitReader;
use super::tables::EXP_VLC_MAX_DEPTH;
use super::vlc::Vlc;

/// LSP 系数个数
pub const NB_LSP_COEFS: usize = 10;

/// 指数 VLC 解码: 按频带展开对数域增量序列
///
/// 版本 1 先读 5 位初始指数并填充首个频带; 版本 2 从固定初值 36 开始.
/// 返回包络最大值 (重建时作归一化分母).
pub fn decode_exp_vlc(
    br: &mut WmaBitReader<'_>,
    vlc: &Vlc,
    version: u8,
    band_sizes: &[u16],
    block_len: usize,
    exps: &mut [f32],
) -> QinResult<f32> {
    let mut bands = band_sizes.iter();
    let mut pos = 0usize;
    let mut last_exp: i32;
    let mut max_scale: f32;

    if version == 1 {
        last_exp = br.read_bits(5)? as i32 + 10;
        let v = 10f32.powf(last_exp as f32 * (1.0 / 16.0));
        max_scale = v;
        let n = *bands.next().ok_or_else(|| {
            QinError::InvalidData("指数频带表为空".into())
        })? as usize;
        let n = n.min(block_len - pos);
        exps[pos..pos + n].fill(v);
        pos += n;
    } else {
        last_exp = 36;
        max_scale = 0.0;
    }

    while pos < block_len {
        let code = vlc.decode(br, EXP_VLC_MAX_DEPTH)? as i32;
        last_exp += code - 60;
        if !(-60..=170).contains(&last_exp) {
            return Err(QinError::InvalidData(format!(
                "指数超出取值范围: {}",
                last_exp,
            )));
        }
        let v = 10f32.powf(last_exp as f32 * (1.0 / 16.0));
        if v > max_scale {
            max_scale = v;
        }
        let n = *bands.next().ok_or_else(|| {
            QinError::InvalidData("指数频带数不足以覆盖块长".into())
        })? as usize;
        let n = n.min(block_len - pos);
        exps[pos..pos + n].fill(v);
        pos += n;
    }

    Ok(max_scale)
}

/// LSP 包络上下文: 余弦表、x^-1/4 近似表与量化码本
///
/// 所有表在解码器初始化时计算一次, 属于会话私有状态.
#[derive(Debug, Clone)]
pub struct LspContext {
    /// 2*cos(pi*i/frame_len), 共 frame_len 项
    cos_table: Vec<f32>,
    /// 指数部分: 2^((e-126) * -1/4)
    pow_e_table: [f32; 256],
    /// 尾数部分线性近似: 截距
    pow_m_table1: [f32; 128],
    /// 尾数部分线性近似: 斜率
    pow_m_table2: [f32; 128],
    /// 量化码本: 第 i 行为第 i 个 LSP 系数的重建电平 (2*cos 域, 有序)
    codebook: [[f32; 16]; NB_LSP_COEFS],
}

impl LspContext {
    pub fn new(frame_len: usize) -> Self {
        let wdel = std::f64::consts::PI / frame_len as f64;
        let cos_table = (0..frame_len)
            .map(|i| (2.0 * (wdel * i as f64).cos()) as f32)
            .collect();

        let mut pow_e_table = [0f32; 256];
        for (i, v) in pow_e_table.iter_mut().enumerate() {
            *v = 2f32.powf((i as f32 - 126.0) * -0.25);
        }

        // 尾数区间 [1, 2) 等分 128 段, 每段对 x^-1/4 作线性近似
        let mut pow_m_table1 = [0f32; 128];
        let mut pow_m_table2 = [0f32; 128];
        let mut b = 1.0f64;
        for i in (0..128).rev() {
            let a = ((128 + i) as f64 / 256.0).powf(-0.25);
            pow_m_table1[i] = (2.0 * a - b) as f32;
            pow_m_table2[i] = (b - a) as f32;
            b = a;
        }

        // 码本: 第 i 个系数的电平取自 [i, i+1)*pi/10 区间内的 2*cos 值
        let mut codebook = [[0f32; 16]; NB_LSP_COEFS];
        for (i, row) in codebook.iter_mut().enumerate() {
            let n = Self::codebook_size(i);
            for (x, v) in row.iter_mut().take(n).enumerate() {
                let theta =
                    std::f64::consts::PI * (i as f64 + (x as f64 + 0.5) / n as f64) / 10.0;
                *v = (2.0 * theta.cos()) as f32;
            }
        }

        Self {
            cos_table,
            pow_e_table,
            pow_m_table1,
            pow_m_table2,
            codebook,
        }
    }

    /// 第 i 个系数的码本大小 (首尾系数 3 位, 其余 4 位)
    const fn codebook_size(i: usize) -> usize {
        if i == 0 || i >= 8 { 8 } else { 16 }
    }

    /// x^-1/4 的快速近似 (指数查表 + 尾数分段线性)
    fn pow_m1_4(&self, x: f32) -> f32 {
        let u = x.to_bits();
        let e = (u >> 23) as usize & 0xFF;
        let m = ((u >> 16) & 0x7F) as usize;
        // 段内插值坐标归一化到 [1, 2)
        let t = f32::from_bits(((u << 7) & ((1 << 23) - 1)) | (127 << 23));
        self.pow_e_table[e] * (self.pow_m_table1[m] + self.pow_m_table2[m] * t)
    }

    /// 由 LSP 系数展开频域包络, 返回包络最大值
    fn lsp_to_curve(&self, out: &mut [f32], block_len: usize, lsp: &[f32; NB_LSP_COEFS]) -> f32 {
        let mut val_max = 0f32;
        for i in 0..block_len {
            let w = self.cos_table[i];
            let mut p = 0.5f32;
            let mut q = 0.5f32;
            for j in (1..NB_LSP_COEFS).step_by(2) {
                q *= w - lsp[j - 1];
                p *= w - lsp[j];
            }
            p *= p * (2.0 - w);
            q *= q * (2.0 + w);
            let v = self.pow_m1_4(p + q);
            if v > val_max {
                val_max = v;
            }
            out[i] = v;
        }
        val_max
    }

    /// 从位流读取 10 个 LSP 量化下标并展开包络
    pub fn decode(
        &self,
        br: &mut WmaBitReader<'_>,
        out: &mut [f32],
        block_len: usize,
    ) -> QinResult<f32> {
        let mut lsp = [0f32; NB_LSP_COEFS];
        for (i, coef) in lsp.iter_mut().enumerate() {
            let bits = if Self::codebook_size(i) == 8 { 3 } else { 4 };
            let val = br.read_bits(bits)? as usize;
            *coef = self.codebook[i][val];
        }
        Ok(self.lsp_to_curve(out, block_len, &lsp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow_m1_4_近似精度() {
        let ctx = LspContext::new(128);
        for &x in &[0.001f32, 0.07, 0.5, 1.0, 1.5, 3.0, 42.0, 1000.0] {
            let approx = ctx.pow_m1_4(x);
            let exact = x.powf(-0.25);
            let rel = ((approx - exact) / exact).abs();
            assert!(rel < 1e-3, "x={} 相对误差 {}", x, rel);
        }
    }

    #[test]
    fn test_码本有序递减() {
        let ctx = LspContext::new(128);
        for i in 0..NB_LSP_COEFS {
            let n = LspContext::codebook_size(i);
            let row = &ctx.codebook[i][..n];
            assert!(
                row.windows(2).all(|w| w[0] > w[1]),
                "码本行 {} 不是严格递减",
                i,
            );
            assert!(row.iter().all(|v| v.abs() < 2.0));
        }
    }

    #[test]
    fn test_lsp_曲线为正且返回最大值() {
        let ctx = LspContext::new(256);
        // 取每行中间电平构造一组合法系数
        let mut lsp = [0f32; NB_LSP_COEFS];
        for (i, v) in lsp.iter_mut().enumerate() {
            *v = ctx.codebook[i][LspContext::codebook_size(i) / 2];
        }
        let mut out = [0f32; 256];
        let max = ctx.lsp_to_curve(&mut out, 256, &lsp);
        assert!(out[..256].iter().all(|&v| v >= 0.0));
        assert!((max - out.iter().cloned().fold(0.0f32, f32::max)).abs() < 1e-6);
        assert!(max > 0.0);
    }
}
