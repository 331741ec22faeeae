use core::ptr::NonNull;

use log::{debug, info, trace, warn};

use crate::board::{BoardHooks, NoBoardHooks};
use crate::config::{ConfigError, XmemConfig};

use super::banks::{BankLayout, BankStateStore};
use super::heap_io::HeapStateIo;
use super::state::HeapState;
use super::window::{AddressDecoder, AddressWindow, ShadowMode};

/// どちらのヒープ状態がアロケータに載っているか
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapMode {
    SystemHeap,
    ExternalHeap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    BankActive(u8),
    SystemActive,
}

/// バンク切り替えとヒープ切り替えの状態機械
///
/// インスタンスは 1 つだけ作り、起動時に [`initialize`](Self::initialize) を呼ぶ。
/// 各遷移の最中はアロケータの状態が一時的に不整合になるので、
/// 遷移はクリティカルセクション内で行う。
pub struct XmemController<H, D, B = NoBoardHooks, const N: usize = 8> {
    config: XmemConfig,
    io: H,
    window: AddressWindow<D, B>,
    store: BankStateStore<N>,
    current_bank: Option<u8>,
    heap_mode: HeapMode,
}

impl<H, D, B, const N: usize> XmemController<H, D, B, N>
where
    H: HeapStateIo,
    D: AddressDecoder,
    B: BoardHooks,
{
    pub fn new(config: XmemConfig, io: H, decoder: D, hooks: B) -> Result<Self, ConfigError> {
        config.validate(N)?;
        let layout = BankLayout::new(config.total_memory, config.bank_granularity)?;
        // 選択線が足りないと上位のバンクが下位のバンクに重なる
        if layout.bank_count() > hooks.capacity() {
            return Err(ConfigError::TooManyBanks {
                needed: layout.bank_count(),
                capacity: hooks.capacity(),
            });
        }
        let shadow =
            NonNull::new(config.shadow_start as *mut u8).ok_or(ConfigError::NullShadowWindow)?;
        Ok(Self {
            config,
            io,
            window: AddressWindow::new(decoder, hooks, shadow),
            store: BankStateStore::new(layout),
            current_bank: None,
            heap_mode: HeapMode::SystemHeap,
        })
    }

    /// 外部メモリを有効化し、ヒープをバンク 0 に移す
    ///
    /// 現在のアロケータ状態を内蔵 SRAM のヒープとして退避し、全バンクを
    /// 空の状態から始める。再度呼ぶと全バンクの内容は捨てられる。
    pub fn initialize(&mut self) {
        critical_section::with(|_| {
            // 外部ヒープが載ったままだとシステム側の退避を上書きしてしまう
            if let (Some(current), HeapMode::ExternalHeap) = (self.current_bank, self.heap_mode) {
                self.enter_system_heap(current);
            }

            self.window.enable(self.config.wait_states);
            *self.store.get_system() = self.io.capture();

            let base = self.config.window_base;
            let window_end = self.store.layout().window_end(base);
            self.io
                .restore(&HeapState::fresh(self.config.first_heap_address(), window_end));
            let seed = self.io.capture();
            self.store.initialize(&seed, base);

            self.heap_mode = HeapMode::ExternalHeap;
            self.current_bank = None;
            self.select_bank(0);
        });
        info!(
            "xmem: {} bytes in {} bank(s) of {:#x}, heap from {:#x}",
            self.config.total_memory,
            self.store.bank_count(),
            self.config.bank_granularity,
            self.config.first_heap_address()
        );
    }

    /// バンクを切り替える。範囲外や現在のバンクなら何もしない
    ///
    /// システムヒープが載っている間はバンクを選ぶだけで、ヒープ状態には
    /// 触らない。外部ヒープに戻したときに選んだバンクのヒープが載る。
    pub fn switch_bank(&mut self, target: u8) {
        if self.current_bank.is_none() {
            trace!("xmem: switch to bank {} before init ignored", target);
            return;
        }
        critical_section::with(|_| self.select_bank(target));
    }

    /// 現在のバンクのヒープを退避し、内蔵 SRAM のヒープに戻す
    pub fn set_system_heap(&mut self) {
        let Some(current) = self.current_bank else {
            return;
        };
        if self.heap_mode == HeapMode::SystemHeap {
            trace!("xmem: system heap already in place");
            return;
        }
        critical_section::with(|_| self.enter_system_heap(current));
        debug!("xmem: heap moved to system memory (bank {} parked)", current);
    }

    /// [`set_system_heap`](Self::set_system_heap) の逆。現在選択中のバンクのヒープを載せる
    pub fn set_xmem_heap(&mut self) {
        let Some(current) = self.current_bank else {
            return;
        };
        if self.heap_mode == HeapMode::ExternalHeap {
            trace!("xmem: external heap already in place");
            return;
        }
        critical_section::with(|_| {
            *self.store.get_system() = self.io.capture();
            self.load_bank(current);
            self.heap_mode = HeapMode::ExternalHeap;
        });
        debug!("xmem: heap moved to bank {}", current);
    }

    /// 下位領域を直接見せ、その先頭を返す
    ///
    /// 使い終わったら [`unshadow_low_region`](Self::unshadow_low_region) を呼ぶこと。
    /// バンクやヒープ状態には影響しない。
    pub fn shadow_low_region(&mut self) -> NonNull<u8> {
        debug!(
            "xmem: low region exposed at {:#x} ({} bytes)",
            self.config.shadow_start, self.config.shadow_size
        );
        self.window.shadow_low_region()
    }

    pub fn unshadow_low_region(&mut self) {
        debug!("xmem: normal addressing restored");
        self.window.unshadow_low_region();
    }

    /// 現在のバンクのヒープ先頭
    pub fn bank_address_start(&self) -> Option<usize> {
        self.current_snapshot().map(|state| state.heap_start)
    }

    /// 現在のバンクで有効な最後のアドレス
    pub fn bank_address_end(&self) -> Option<usize> {
        self.current_snapshot().map(|state| state.heap_end)
    }

    pub fn state(&self) -> ControllerState {
        match (self.current_bank, self.heap_mode) {
            (None, _) => ControllerState::Uninitialized,
            (Some(bank), HeapMode::ExternalHeap) => ControllerState::BankActive(bank),
            (Some(_), HeapMode::SystemHeap) => ControllerState::SystemActive,
        }
    }

    pub fn current_bank(&self) -> Option<u8> {
        self.current_bank
    }

    pub fn heap_mode(&self) -> HeapMode {
        self.heap_mode
    }

    pub fn shadow_mode(&self) -> ShadowMode {
        self.window.mode()
    }

    pub fn shadow_size(&self) -> usize {
        self.config.shadow_size
    }

    pub fn bank_count(&self) -> usize {
        self.store.bank_count()
    }

    pub fn layout(&self) -> &BankLayout {
        self.store.layout()
    }

    pub fn bank_snapshot(&self, bank: usize) -> Option<&HeapState> {
        self.store.peek(bank)
    }

    pub fn system_snapshot(&self) -> &HeapState {
        self.store.system()
    }

    pub fn io(&self) -> &H {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut H {
        &mut self.io
    }

    pub fn window(&self) -> &AddressWindow<D, B> {
        &self.window
    }

    fn current_snapshot(&self) -> Option<&HeapState> {
        self.current_bank
            .and_then(|bank| self.store.peek(bank as usize))
    }

    fn select_bank(&mut self, target: u8) {
        if self.current_bank == Some(target) {
            trace!("xmem: bank {} already selected", target);
            return;
        }
        if target as usize >= self.store.bank_count() {
            warn!(
                "xmem: bank {} out of range (0..{}), ignored",
                target,
                self.store.bank_count()
            );
            return;
        }

        if self.heap_mode == HeapMode::ExternalHeap {
            if let Some(current) = self.current_bank {
                self.save_bank(current);
            }
            self.load_bank(target);
        }
        self.window.map_bank(target);
        debug!("xmem: bank {:?} -> {}", self.current_bank, target);
        self.current_bank = Some(target);
    }

    fn enter_system_heap(&mut self, current: u8) {
        self.save_bank(current);
        self.io.restore(self.store.system());
        self.heap_mode = HeapMode::SystemHeap;
    }

    fn save_bank(&mut self, bank: u8) {
        let live = self.io.capture();
        if let Some(slot) = self.store.get(bank as usize) {
            *slot = live;
        }
    }

    fn load_bank(&mut self, bank: u8) {
        if let Some(state) = self.store.peek(bank as usize) {
            self.io.restore(state);
        }
    }
}
