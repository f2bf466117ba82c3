//! WMA IMDCT 引擎: 定点结构的基-4/基-2 原位 FFT 加前/后旋转.
//!
//! 变换尺寸 n 的 IMDCT 由 n/4 点复数 FFT 实现: 前旋转把 n/2 个实输入
//! (两半交错反向读取) 映射为 n/4 个复数 bin, FFT 后经后旋转与 8 路
//! 对称重排得到 n 个实输出. 旋转表与位反转表在上下文创建时预计算,
//! 由解码器会话持有, 无进程级可变状态.

use std::f64::consts::PI;

/// 复数样本
#[derive(Debug, Clone, Copy, Default)]
pub struct Complex {
    pub re: f32,
    pub im: f32,
}

impl Complex {
    fn add(self, o: Complex) -> Complex {
        Complex {
            re: self.re + o.re,
            im: self.im + o.im,
        }
    }

    fn sub(self, o: Complex) -> Complex {
        Complex {
            re: self.re - o.re,
            im: self.im - o.im,
        }
    }

    fn mul(self, o: Complex) -> Complex {
        Complex {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }
}

/// 原位 FFT 上下文: 位反转表 + 旋转因子表
#[derive(Debug, Clone)]
pub struct FftContext {
    nbits: u32,
    inverse: bool,
    revtab: Vec<u16>,
    exptab: Vec<Complex>,
}

impl FftContext {
    /// 创建 `1 << nbits` 点 FFT 上下文
    pub fn new(nbits: u32, inverse: bool) -> Self {
        let n = 1usize << nbits;
        let s2 = if inverse { 1.0 } else { -1.0 };

        let exptab = (0..n / 2)
            .map(|i| {
                let alpha = 2.0 * PI * i as f64 / n as f64;
                Complex {
                    re: alpha.cos() as f32,
                    im: (alpha.sin() * s2) as f32,
                }
            })
            .collect();

        let revtab = (0..n)
            .map(|i| {
                let mut m = 0usize;
                for j in 0..nbits {
                    m |= ((i >> j) & 1) << (nbits - j - 1);
                }
                m as u16
            })
            .collect();

        Self {
            nbits,
            inverse,
            revtab,
            exptab,
        }
    }

    /// 位反转表
    pub fn revtab(&self) -> &[u16] {
        &self.revtab
    }

    /// 原位变换, 输入须按位反转序放置, 输出为自然序
    ///
    /// 结构固定: 基-2 的第 0 遍, 带方向符号的基-4 第 1 遍, 随后每遍
    /// 块数减半、循环数翻倍的基-2 蝶形遍.
    pub fn calc(&self, z: &mut [Complex]) {
        let np = 1usize << self.nbits;
        debug_assert_eq!(z.len(), np);

        // 第 0 遍
        for p in (0..np).step_by(2) {
            let (a, b) = (z[p], z[p + 1]);
            z[p] = a.add(b);
            z[p + 1] = a.sub(b);
        }

        // 第 1 遍 (基-4, 虚部交叉项符号随方向变化)
        for p in (0..np).step_by(4) {
            let (a, c) = (z[p], z[p + 2]);
            z[p] = a.add(c);
            z[p + 2] = a.sub(c);

            let (b, d) = (z[p + 1], z[p + 3]);
            let d = if self.inverse {
                Complex {
                    re: -d.im,
                    im: d.re,
                }
            } else {
                Complex {
                    re: d.im,
                    im: -d.re,
                }
            };
            z[p + 1] = b.add(d);
            z[p + 3] = b.sub(d);
        }

        // 第 2 遍起: 旋转因子蝶形
        let np2 = np >> 1;
        let mut nblocks = np >> 3;
        let mut nloops = 4usize;
        while nblocks > 0 {
            let mut p = 0usize;
            let mut q = nloops;
            for _ in 0..nblocks {
                let (a, b) = (z[p], z[q]);
                z[p] = a.add(b);
                z[q] = a.sub(b);
                p += 1;
                q += 1;

                let mut l = nblocks;
                while l < np2 {
                    let t = self.exptab[l].mul(z[q]);
                    let a = z[p];
                    z[p] = a.add(t);
                    z[q] = a.sub(t);
                    p += 1;
                    q += 1;
                    l += nblocks;
                }
                p += nloops;
                q += nloops;
            }
            nblocks >>= 1;
            nloops <<= 1;
        }
    }
}

/// IMDCT 上下文: 前/后旋转表 + 内部 FFT
#[derive(Debug, Clone)]
pub struct MdctContext {
    n: usize,
    tcos: Vec<f32>,
    tsin: Vec<f32>,
    fft: FftContext,
    /// FFT 工作区, 避免每块分配
    tmp: Vec<Complex>,
}

impl MdctContext {
    /// 创建 `n = 1 << nbits` 点 IMDCT 上下文 (输入 n/2 点, 输出 n 点)
    pub fn new(nbits: u32) -> Self {
        let n = 1usize << nbits;
        let n4 = n >> 2;

        let mut tcos = Vec::with_capacity(n4);
        let mut tsin = Vec::with_capacity(n4);
        for i in 0..n4 {
            let alpha = 2.0 * PI * (i as f64 + 1.0 / 8.0) / n as f64;
            tcos.push(-alpha.cos() as f32);
            tsin.push(-alpha.sin() as f32);
        }

        Self {
            n,
            tcos,
            tsin,
            fft: FftContext::new(nbits - 2, true),
            tmp: vec![Complex::default(); n4],
        }
    }

    /// 变换尺寸
    pub fn size(&self) -> usize {
        self.n
    }

    /// 逆变换: `input` 为 n/2 个频域系数, `output` 写入 n 个时域样本
    pub fn imdct(&mut self, output: &mut [f32], input: &[f32]) {
        let n = self.n;
        let n2 = n >> 1;
        let n4 = n >> 2;
        let n8 = n >> 3;
        debug_assert!(input.len() >= n2 && output.len() >= n);

        // 前旋转: 两半交错反向读取, 写入位反转位置
        let revtab = self.fft.revtab();
        for k in 0..n4 {
            let a = input[n2 - 1 - 2 * k];
            let b = input[2 * k];
            let j = revtab[k] as usize;
            self.tmp[j] = Complex { re: a, im: b }.mul(Complex {
                re: self.tcos[k],
                im: self.tsin[k],
            });
        }

        self.fft.calc(&mut self.tmp);

        // 后旋转
        for k in 0..n4 {
            self.tmp[k] = self.tmp[k].mul(Complex {
                re: self.tcos[k],
                im: self.tsin[k],
            });
        }

        // 8 路对称重排
        for k in 0..n8 {
            let hi = self.tmp[n8 + k];
            let lo = self.tmp[n8 - 1 - k];

            output[2 * k] = -hi.im;
            output[n2 - 1 - 2 * k] = hi.im;
            output[2 * k + 1] = lo.re;
            output[n2 - 2 - 2 * k] = -lo.re;

            output[n2 + 2 * k] = -hi.re;
            output[n - 1 - 2 * k] = -hi.re;
            output[n2 + 2 * k + 1] = lo.im;
            output[n - 2 - 2 * k] = lo.im;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 朴素 DFT: X[m] = sum_k x[k] * e^(s * 2πi * km / n), s = ±1
    fn naive_dft(input: &[Complex], inverse: bool) -> Vec<Complex> {
        let n = input.len();
        let s = if inverse { 1.0 } else { -1.0 };
        (0..n)
            .map(|m| {
                let mut acc = Complex::default();
                for (k, x) in input.iter().enumerate() {
                    let ang = s * 2.0 * PI * (k * m % n) as f64 / n as f64;
                    acc.re += x.re * ang.cos() as f32 - x.im * ang.sin() as f32;
                    acc.im += x.re * ang.sin() as f32 + x.im * ang.cos() as f32;
                }
                acc
            })
            .collect()
    }

    #[test]
    fn test_fft_与朴素dft一致() {
        for inverse in [false, true] {
            let fft = FftContext::new(4, inverse);
            let input: Vec<Complex> = (0..16)
                .map(|i| Complex {
                    re: ((i * 7 + 3) % 13) as f32 - 6.0,
                    im: ((i * 5 + 1) % 11) as f32 - 5.0,
                })
                .collect();

            // FFT 要求位反转序输入
            let mut z = vec![Complex::default(); 16];
            for (i, &x) in input.iter().enumerate() {
                z[fft.revtab()[i] as usize] = x;
            }
            fft.calc(&mut z);

            let expect = naive_dft(&input, inverse);
            for (a, b) in z.iter().zip(expect.iter()) {
                assert!(
                    (a.re - b.re).abs() < 1e-3 && (a.im - b.im).abs() < 1e-3,
                    "fft 结果偏差: ({}, {}) vs ({}, {})",
                    a.re,
                    a.im,
                    b.re,
                    b.im,
                );
            }
        }
    }

    #[test]
    fn test_imdct_全零输入全零输出() {
        let mut ctx = MdctContext::new(8);
        let input = [0.0f32; 128];
        let mut output = [1.0f32; 256];
        ctx.imdct(&mut output, &input);
        assert!(output.iter().all(|&v| v == 0.0));
    }

    /// 直接公式: y[j] = -sum_k X[k] cos((2π/n)(j + 1/2 + n/4)(k + 1/2))
    fn naive_imdct(input: &[f32], n: usize) -> Vec<f32> {
        (0..n)
            .map(|j| {
                let mut acc = 0.0f64;
                for (k, &x) in input.iter().enumerate() {
                    let ang =
                        2.0 * PI / n as f64 * (j as f64 + 0.5 + n as f64 / 4.0) * (k as f64 + 0.5);
                    acc -= f64::from(x) * ang.cos();
                }
                acc as f32
            })
            .collect()
    }

    #[test]
    fn test_imdct_与直接公式一致() {
        let n = 128usize;
        let mut ctx = MdctContext::new(7);

        let mut input = [0.0f32; 64];
        input[0] = 1.0;
        input[3] = -0.5;
        input[17] = 0.25;
        let mut output = [0.0f32; 128];
        ctx.imdct(&mut output, &input);

        let expect = naive_imdct(&input, n);
        for (j, (&a, &b)) in output.iter().zip(expect.iter()).enumerate() {
            assert!((a - b).abs() < 1e-3, "样本 {} 偏差: {} vs {}", j, a, b);
        }
    }

    #[test]
    fn test_imdct_时域对称性() {
        let n = 256usize;
        let mut ctx = MdctContext::new(8);
        let input: Vec<f32> = (0..128).map(|i| ((i * 37 % 29) as f32 - 14.0) / 7.0).collect();
        let mut output = vec![0.0f32; n];
        ctx.imdct(&mut output, &input);

        let n2 = n / 2;
        for j in 0..n2 / 2 {
            // 前半段关于中心反对称, 后半段关于中心对称
            assert!((output[j] + output[n2 - 1 - j]).abs() < 1e-4);
            assert!((output[n2 + j] - output[n - 1 - j]).abs() < 1e-4);
        }
    }
}
