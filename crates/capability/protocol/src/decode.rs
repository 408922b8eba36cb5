//! 寄存器解码
//!
//! 多寄存器值的拼装有两个独立维度：
//! - 字序（word order）：最高有效字在前还是在后
//! - 字节序（byte order）：每个字内的两个字节是否交换
//!
//! 拼装顺序：先按字序排列，再按字节序处理字内字节，最后按大端读取。

use domain::{ByteOrder, DataType, DecodedValue, WordOrder};

/// 解码错误（点位级）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{data_type} needs {expected} words, got {actual}")]
    WordCountMismatch {
        data_type: DataType,
        expected: usize,
        actual: usize,
    },
}

/// 将原始寄存器字解码为类型化的值。
///
/// `words` 长度必须与数据类型字宽一致，不做截断或补齐。
pub fn decode(
    words: &[u16],
    data_type: DataType,
    byte_order: ByteOrder,
    word_order: WordOrder,
) -> Result<DecodedValue, DecodeError> {
    let expected = usize::from(data_type.word_width());
    if words.len() != expected {
        return Err(DecodeError::WordCountMismatch {
            data_type,
            expected,
            actual: words.len(),
        });
    }

    let raw = || assemble(words, byte_order, word_order);
    let value = match data_type {
        DataType::Boolean => DecodedValue::Bool(words[0] != 0),
        // 原样返回，由消费方取位
        DataType::Bitfield16 => DecodedValue::Bits(words[0]),
        DataType::Int16 => DecodedValue::Int(i64::from(raw() as u16 as i16)),
        DataType::Uint16 => DecodedValue::Uint(raw() & 0xFFFF),
        DataType::Int32 => DecodedValue::Int(i64::from(raw() as u32 as i32)),
        DataType::Uint32 => DecodedValue::Uint(raw() & 0xFFFF_FFFF),
        DataType::Float32 => DecodedValue::Float(f64::from(f32::from_bits(raw() as u32))),
        DataType::Float64 => DecodedValue::Float(f64::from_bits(raw())),
    };
    Ok(value)
}

/// 将数值编码为寄存器字（解码的逆过程）。
///
/// 用于仿真与测试夹具；整数类型按目标宽度截断。
pub fn encode(
    value: f64,
    data_type: DataType,
    byte_order: ByteOrder,
    word_order: WordOrder,
) -> Vec<u16> {
    let raw: u64 = match data_type {
        DataType::Boolean => u64::from(value != 0.0),
        DataType::Bitfield16 => return vec![value as u16],
        DataType::Int16 => u64::from(value as i16 as u16),
        DataType::Uint16 => u64::from(value as u16),
        DataType::Int32 => u64::from(value as i32 as u32),
        DataType::Uint32 => u64::from(value as u32),
        DataType::Float32 => u64::from((value as f32).to_bits()),
        DataType::Float64 => value.to_bits(),
    };

    let width = usize::from(data_type.word_width());
    let mut words: Vec<u16> = (0..width)
        .map(|index| {
            let shift = 16 * (width - 1 - index);
            let word = (raw >> shift) as u16;
            match byte_order {
                ByteOrder::Big => word,
                ByteOrder::Little => word.swap_bytes(),
            }
        })
        .collect();
    if word_order == WordOrder::Little {
        words.reverse();
    }
    words
}

fn assemble(words: &[u16], byte_order: ByteOrder, word_order: WordOrder) -> u64 {
    let ordered: Box<dyn Iterator<Item = &u16>> = match word_order {
        WordOrder::Big => Box::new(words.iter()),
        WordOrder::Little => Box::new(words.iter().rev()),
    };
    ordered.fold(0u64, |acc, word| {
        let word = match byte_order {
            ByteOrder::Big => *word,
            ByteOrder::Little => word.swap_bytes(),
        };
        (acc << 16) | u64::from(word)
    })
}
