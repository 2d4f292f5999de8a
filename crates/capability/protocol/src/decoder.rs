//! 寄存器块解码
//!
//! 将一次读取得到的连续原始字按位宽表还原为逻辑寄存器值。
//! 尽力而为：缺少第二个字的 32 位寄存器和未分类的字被跳过。

use domain::{classify, DecodedRegisterMap, RegisterId};

/// 一次 Modbus 读取得到的连续原始字，以起始逻辑编号为键。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    pub start: RegisterId,
    pub words: Vec<u16>,
}

impl RegisterBlock {
    pub fn new(start: RegisterId, words: Vec<u16>) -> Self {
        Self { start, words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// 解码寄存器块。
pub fn decode(block: &RegisterBlock) -> DecodedRegisterMap {
    let mut values = DecodedRegisterMap::new();
    for (offset, _) in block.words.iter().enumerate() {
        let Some(register) = u16::try_from(offset)
            .ok()
            .and_then(|offset| block.start.checked_add(offset))
        else {
            break;
        };
        let Some(width) = classify(register) else {
            continue;
        };
        let end = offset + usize::from(width.word_count());
        if let Some(value) = block
            .words
            .get(offset..end)
            .and_then(|chunk| width.decode(chunk))
        {
            values.insert(register, value);
        }
    }
    values
}

/// 合并多个块的解码结果。
pub fn decode_all<'a>(blocks: impl IntoIterator<Item = &'a RegisterBlock>) -> DecodedRegisterMap {
    blocks.into_iter().fold(DecodedRegisterMap::new(), |mut acc, block| {
        acc.extend(decode(block));
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::registers::{REG_FIRMWARE, REG_PANEL1_FW, REG_SUPPLY_FLOW, REG_SUPPLY_TEMP};

    #[test]
    fn test_decode_signed_and_u32() {
        // 902..=905 为 S16，906 为 U32
        let block = RegisterBlock::new(REG_SUPPLY_TEMP, vec![215, 65526, 0, 100, 0x0001, 0x0002]);
        let values = decode(&block);
        assert_eq!(values.get(&REG_SUPPLY_TEMP), Some(&215));
        assert_eq!(values.get(&903), Some(&-10));
        assert_eq!(values.get(&REG_SUPPLY_FLOW), Some(&0x0001_0002));
        // 低字不作为独立寄存器出现
        assert_eq!(values.get(&907), None);
    }

    #[test]
    fn test_decode_omits_truncated_u32() {
        let block = RegisterBlock::new(REG_FIRMWARE, vec![0x0120, 0x3004, 0x0001]);
        let values = decode(&block);
        assert_eq!(values.get(&REG_FIRMWARE), Some(&18_886_660));
        assert!(!values.contains_key(&REG_PANEL1_FW));
    }

    #[test]
    fn test_decode_drops_unknown() {
        // 34 为 EPOCH_TIME 的低字，35 未分类
        let block = RegisterBlock::new(34, vec![1, 2]);
        assert!(decode(&block).is_empty());
    }
}
