//! WMA 位流读取器.
//!
//! WMA 码流采用一种少见的位序约定: 每个字节内的位从最低位开始消费
//! (逐位右移), 跨字节读取时将各字节片段按左移方式拼接. 该约定与参考
//! 码流逐位兼容, 不能改成常规的 MSB-first 读取.

use qin_core::{QinError, QinResult};

/// WMA 位流读取器
///
/// 持有字节切片的借用视图, 游标由字节索引和字节内位偏移 (0-7) 组成.
/// 读取越过切片末尾返回 `QinError::Eof`, 不会产生未定义读取.
#[derive(Debug, Clone, Copy)]
pub struct WmaBitReader<'a> {
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节内已消费的位数 (0-7), 0 表示指向最低位
    bit_pos: u8,
}

impl<'a> WmaBitReader<'a> {
    /// 创建新的位流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 当前字节索引
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 每个字节从最低位开始取, 多字节片段按左移拼接.
    pub fn read_bits(&mut self, n: u32) -> QinResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(QinError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - u32::from(self.bit_pos);
            let take = remaining.min(available);

            // 低位在前: 当前字节先右移掉已消费的位, 再取低 take 位
            let mask = ((1u32 << take) - 1) as u8;
            let chunk = (self.data[self.byte_pos] >> self.bit_pos) & mask;

            result = (result << take) | u32::from(chunk);

            self.bit_pos += take as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= take;
        }

        Ok(result)
    }

    /// 读取 1 个位, 返回 bool
    pub fn read_flag(&mut self) -> QinResult<bool> {
        self.read_bits(1).map(|v| v != 0)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> QinResult<()> {
        if n > self.bits_left() {
            return Err(QinError::Eof);
        }
        let total = self.bit_pos as usize + n;
        self.byte_pos += total / 8;
        self.bit_pos = (total % 8) as u8;
        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 已在字节边界时不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }
}
