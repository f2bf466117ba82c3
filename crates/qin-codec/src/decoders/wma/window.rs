//! WMA 加窗与重叠相加.
//!
//! 相邻块长不等时窗取两者中较小的一侧: 较小的窗居中放置于较大块内,
//! 其余样本直通 (左半) 或清零 (右半). 左半叠加进滑动帧缓冲, 右半
//! 直接写入作为下一块的重叠尾部.

/// 对一个块的 IMDCT 输出加窗并叠加进帧缓冲
///
/// `input` 为 2*block_len 个时域样本, `out` 为帧缓冲中以写入起点为首
/// 的切片. `windows[k]` 为块长档 k (即 frame_len_bits - len_bits) 的
/// 正弦分析窗.
pub fn overlap_window(
    out: &mut [f32],
    input: &[f32],
    windows: &[Vec<f32>],
    frame_len_bits: u32,
    block_len_bits: u32,
    prev_block_len_bits: u32,
    next_block_len_bits: u32,
) {
    let block_len = 1usize << block_len_bits;

    // 左半: 与上一块的重叠区
    if block_len_bits <= prev_block_len_bits {
        let win = &windows[(frame_len_bits - block_len_bits) as usize];
        for i in 0..block_len {
            out[i] += input[i] * win[i];
        }
    } else {
        let prev_len = 1usize << prev_block_len_bits;
        let n = (block_len - prev_len) / 2;
        let win = &windows[(frame_len_bits - prev_block_len_bits) as usize];
        for i in 0..prev_len {
            out[n + i] += input[n + i] * win[i];
        }
        out[n + prev_len..block_len].copy_from_slice(&input[n + prev_len..block_len]);
    }

    let out = &mut out[block_len..2 * block_len];
    let input = &input[block_len..2 * block_len];

    // 右半: 为下一块准备的重叠尾部
    if block_len_bits <= next_block_len_bits {
        let win = &windows[(frame_len_bits - block_len_bits) as usize];
        for i in 0..block_len {
            out[i] = input[i] * win[block_len - 1 - i];
        }
    } else {
        let next_len = 1usize << next_block_len_bits;
        let n = (block_len - next_len) / 2;
        let win = &windows[(frame_len_bits - next_block_len_bits) as usize];
        out[..n].copy_from_slice(&input[..n]);
        for i in 0..next_len {
            out[n + i] = input[n + i] * win[next_len - 1 - i];
        }
        out[n + next_len..block_len].fill(0.0);
    }
}

/// 生成块长 n 的正弦分析窗: sin((i + 0.5) * pi / 2n)
pub fn sine_window(n: usize) -> Vec<f32> {
    let alpha = std::f64::consts::PI / (2.0 * n as f64);
    (0..n)
        .map(|i| ((i as f64 + 0.5) * alpha).sin() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_正弦窗端点与单调性() {
        let w = sine_window(256);
        assert!(w[0] > 0.0 && w[0] < 0.01);
        assert!(w[255] > 0.999);
        assert!(w.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn test_等长块重叠相加为平坦包络() {
        // 构造窗形输入使重叠区得到 sin^2 + cos^2 = 1 的平坦包络:
        // 前块右半乘反转窗, 后块左半乘正向窗
        let bits = 6u32;
        let n = 1usize << bits;
        let windows = vec![sine_window(n)];
        let win = windows[0].clone();

        let mut in1 = vec![0.0f32; 2 * n];
        let mut in2 = vec![0.0f32; 2 * n];
        for i in 0..n {
            in1[n + i] = win[n - 1 - i];
            in2[i] = win[i];
        }

        // 前块写入 [0, 2n): 右半落在 [n, 2n)
        let mut frame = vec![0.0f32; 2 * n];
        overlap_window(&mut frame[..], &in1, &windows, bits, bits, bits, bits);
        // 后块写入起点后移 n: 其左半与前块右半在 [n, 2n) 重叠
        let mut tail = frame[n..].to_vec();
        tail.resize(2 * n, 0.0);
        overlap_window(&mut tail[..], &in2, &windows, bits, bits, bits, bits);

        for (i, &v) in tail[..n].iter().enumerate() {
            assert!((v - 1.0).abs() < 1e-5, "重叠包络不平坦: 样本 {} = {}", i, v);
        }
    }

    #[test]
    fn test_小块居中放置于大块() {
        // 当前块 64, 上一块 16: [n, n+16) 用小窗加权叠加,
        // [n+16, 64) 直通输入, [0, n) 保持原缓冲内容
        let frame_bits = 6u32;
        let cur_bits = 6u32;
        let prev_bits = 4u32;
        let next_bits = 6u32;
        let n = (64 - 16) / 2; // 24

        let windows: Vec<Vec<f32>> = (0..=2).map(|k| sine_window(64 >> k)).collect();
        let mut out = vec![0.5f32; 128];
        let input = vec![1.0f32; 128];
        overlap_window(
            &mut out, &input, &windows, frame_bits, cur_bits, prev_bits, next_bits,
        );

        // [0, n) 原内容未动
        assert!(out[..n].iter().all(|&v| (v - 0.5).abs() < 1e-6));
        // [n, n+16) 为 0.5 + 小窗加权
        let small = &windows[2];
        for i in 0..16 {
            assert!((out[n + i] - (0.5 + small[i])).abs() < 1e-6);
        }
        // [n+16, 64) 直通输入
        assert!(out[n + 16..64].iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
