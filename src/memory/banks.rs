use crate::config::ConfigError;

use super::state::HeapState;

/// 外部メモリ上の 1 バンク分の範囲
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BankExtent {
    /// 外部メモリ先頭からのオフセット
    pub offset: u32,
    pub span: u32,
}

impl BankExtent {
    /// 窓の中でこのバンクが使える最後のアドレス
    ///
    /// 16 bit の `usize` では 0x1_0000 が表せないので、引き算は u32 で先に行う。
    pub fn last_address(&self, window_base: usize) -> usize {
        window_base + (self.span - 1) as usize
    }
}

/// 外部メモリのバンク分割
///
/// 最終バンク以外は `granularity` ちょうど。最終バンクは余り
/// (割り切れるなら `granularity`)。バンク数は切り上げで数える。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BankLayout {
    total_memory: u32,
    granularity: u32,
    bank_count: usize,
}

impl BankLayout {
    pub fn new(total_memory: u32, granularity: u32) -> Result<Self, ConfigError> {
        if total_memory == 0 {
            return Err(ConfigError::ZeroMemory);
        }
        if !granularity.is_power_of_two() {
            return Err(ConfigError::Granularity(granularity));
        }
        let bank_count = (total_memory.div_ceil(granularity) as usize).max(1);
        Ok(Self {
            total_memory,
            granularity,
            bank_count,
        })
    }

    pub fn bank_count(&self) -> usize {
        self.bank_count
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    pub fn total_memory(&self) -> u32 {
        self.total_memory
    }

    /// 1 バンク分の窓の最後のアドレス
    pub fn window_end(&self, window_base: usize) -> usize {
        window_base + (self.granularity - 1) as usize
    }

    pub fn extent(&self, bank: usize) -> Option<BankExtent> {
        if bank >= self.bank_count {
            return None;
        }
        let offset = bank as u32 * self.granularity;
        let span = (self.total_memory - offset).min(self.granularity);
        Some(BankExtent { offset, span })
    }

    pub fn iter(&self) -> impl Iterator<Item = BankExtent> + '_ {
        (0..self.bank_count).filter_map(move |bank| self.extent(bank))
    }
}

/// バンクごとのヒープ状態 + 内蔵 SRAM 側のヒープ状態
pub struct BankStateStore<const N: usize> {
    banks: [HeapState; N],
    system: HeapState,
    layout: BankLayout,
}

impl<const N: usize> BankStateStore<N> {
    /// `layout.bank_count() <= N` は呼び出し側で検査済みのこと
    pub fn new(layout: BankLayout) -> Self {
        debug_assert!(layout.bank_count() <= N);
        Self {
            banks: [HeapState::EMPTY; N],
            system: HeapState::EMPTY,
            layout,
        }
    }

    /// 各バンクを `seed` から作り直す
    ///
    /// `heap_end` だけはバンクの大きさに合わせる (`window_base` 基準)。
    pub fn initialize(&mut self, seed: &HeapState, window_base: usize) {
        let layout = self.layout;
        for (slot, extent) in self.banks.iter_mut().zip(layout.iter()) {
            *slot = HeapState {
                heap_end: extent.last_address(window_base),
                ..*seed
            };
        }
    }

    pub fn bank_count(&self) -> usize {
        self.layout.bank_count()
    }

    pub fn layout(&self) -> &BankLayout {
        &self.layout
    }

    pub fn get(&mut self, bank: usize) -> Option<&mut HeapState> {
        if bank >= self.bank_count() {
            return None;
        }
        self.banks.get_mut(bank)
    }

    pub fn peek(&self, bank: usize) -> Option<&HeapState> {
        if bank >= self.bank_count() {
            return None;
        }
        self.banks.get(bank)
    }

    pub fn get_system(&mut self) -> &mut HeapState {
        &mut self.system
    }

    pub fn system(&self) -> &HeapState {
        &self.system
    }
}
