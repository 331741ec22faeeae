//! 外部メモリ構成

use thiserror::Error;

/// ATmega2560 が一度にマップできる範囲
pub const ATMEGA2560_BANK_SIZE: u32 = 0x1_0000;
/// 内蔵 SRAM の直後、外部メモリとして見える先頭
pub const ATMEGA2560_XMEM_START: usize = 0x2200;
/// 下位 8KiB を見せるときの窓
pub const ATMEGA2560_SHADOW_START: usize = 0x8000;
pub const ATMEGA2560_SHADOW_SIZE: usize = 0x2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("external memory size is zero")]
    ZeroMemory,
    #[error("bank granularity {0:#x} is not a power of two")]
    Granularity(u32),
    #[error("{needed} banks needed but only {capacity} can be tracked")]
    TooManyBanks { needed: usize, capacity: usize },
    #[error("bank {bank} ends at {end:#x}, below heap start {heap_start:#x}")]
    BankBelowHeapStart {
        bank: usize,
        end: usize,
        heap_start: usize,
    },
    #[error("shadow window cannot start at address zero")]
    NullShadowWindow,
    #[error("wait states must be 0..=3, got {0}")]
    WaitStates(u8),
}

/// 外部バスのウェイト設定 (XMCRA の SRW1x にそのまま入る)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitStates {
    #[default]
    Zero = 0,
    /// 読み書きストローブ中に 1 サイクル
    One = 1,
    /// 読み書きストローブ中に 2 サイクル
    Two = 2,
    /// 2 サイクル + 次のアドレスを出す前に 1 サイクル
    TwoWithAddressHold = 3,
}

impl TryFrom<u8> for WaitStates {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::TwoWithAddressHold),
            other => Err(ConfigError::WaitStates(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XmemConfig {
    /// 外部メモリの総量 (byte)
    pub total_memory: u32,
    /// 1 バンクの大きさ (byte, 2 の冪)
    pub bank_granularity: u32,
    /// マップされたバンクのオフセット 0 が見える CPU アドレス
    pub window_base: usize,
    /// 窓の中でヒープに使ってよい最初のアドレス
    pub heap_start: usize,
    pub shadow_start: usize,
    pub shadow_size: usize,
    pub wait_states: WaitStates,
}

impl XmemConfig {
    /// 窓もヒープもアドレス 0 から。[`XmemHeap`](crate::XmemHeap) はアドレス 0 を
    /// 空きリストの終端に使うので、先頭の 1 ワードは確保されない
    pub const fn new(total_memory: u32, bank_granularity: u32) -> Self {
        Self {
            total_memory,
            bank_granularity,
            window_base: 0,
            heap_start: 0,
            shadow_start: ATMEGA2560_SHADOW_START,
            shadow_size: ATMEGA2560_SHADOW_SIZE,
            wait_states: WaitStates::Zero,
        }
    }

    /// Arduino Mega 2560 + 外部 SRAM の標準構成
    pub const fn atmega2560(total_memory: u32) -> Self {
        Self::new(total_memory, ATMEGA2560_BANK_SIZE).with_window(0, ATMEGA2560_XMEM_START)
    }

    pub const fn with_window(mut self, window_base: usize, heap_start: usize) -> Self {
        self.window_base = window_base;
        self.heap_start = heap_start;
        self
    }

    pub const fn with_shadow(mut self, start: usize, size: usize) -> Self {
        self.shadow_start = start;
        self.shadow_size = size;
        self
    }

    pub const fn with_wait_states(mut self, wait_states: WaitStates) -> Self {
        self.wait_states = wait_states;
        self
    }

    /// 窓の中でヒープが始まるアドレス。`heap_start` が窓より手前なら窓の先頭
    pub fn first_heap_address(&self) -> usize {
        self.heap_start.max(self.window_base)
    }

    /// 容量 `capacity` のストアで扱えるか検査する
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        if self.shadow_start == 0 {
            return Err(ConfigError::NullShadowWindow);
        }
        let layout = crate::memory::banks::BankLayout::new(self.total_memory, self.bank_granularity)?;
        let capacity = capacity.min(u8::MAX as usize + 1);
        if layout.bank_count() > capacity {
            return Err(ConfigError::TooManyBanks {
                needed: layout.bank_count(),
                capacity,
            });
        }
        let heap_start = self.first_heap_address();
        for (bank, extent) in layout.iter().enumerate() {
            let end = extent.last_address(self.window_base);
            if end < heap_start {
                return Err(ConfigError::BankBelowHeapStart {
                    bank,
                    end,
                    heap_start,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_states_above_three_are_rejected() {
        assert_eq!(WaitStates::try_from(3), Ok(WaitStates::TwoWithAddressHold));
        assert_eq!(WaitStates::try_from(4), Err(ConfigError::WaitStates(4)));
    }

    #[test]
    fn megaram_config_is_valid() {
        let config = XmemConfig::atmega2560(131072);
        assert_eq!(config.first_heap_address(), 0x2200);
        assert_eq!(config.validate(2), Ok(()));
    }

    #[test]
    fn capacity_is_checked() {
        let config = XmemConfig::atmega2560(4 * 65536);
        assert_eq!(
            config.validate(2),
            Err(ConfigError::TooManyBanks {
                needed: 4,
                capacity: 2
            })
        );
    }

    #[test]
    fn tiny_last_bank_below_heap_start_is_rejected() {
        // 最終バンクが 0x1000 byte しかなく 0x2200 に届かない
        let config = XmemConfig::atmega2560(65536 + 0x1000);
        assert_eq!(
            config.validate(4),
            Err(ConfigError::BankBelowHeapStart {
                bank: 1,
                end: 0xfff,
                heap_start: 0x2200
            })
        );
    }

    #[test]
    fn null_shadow_window_is_rejected() {
        let config = XmemConfig::new(65536, 65536).with_shadow(0, 0x2000);
        assert_eq!(config.validate(1), Err(ConfigError::NullShadowWindow));
    }
}
