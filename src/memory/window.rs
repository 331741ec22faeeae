use core::ptr::NonNull;

use crate::board::BoardHooks;
use crate::config::WaitStates;

/// 下位領域を直接見せているかどうか
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShadowMode {
    #[default]
    Normal,
    ShadowedLow,
}

/// 8 bit の I/O レジスタ空間
pub trait RegisterBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);

    fn modify<F: FnOnce(u8) -> u8>(&mut self, addr: u16, f: F) {
        let value = self.read(addr);
        self.write(addr, f(value));
    }
}

/// データ空間にマップされたレジスタを volatile で叩く
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Safety: 書き込むアドレスが実在する I/O レジスタであり、
    /// 同じレジスタを他のドライバが同時に触らないこと。
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for Mmio {
    fn read(&mut self, addr: u16) -> u8 {
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }

    fn write(&mut self, addr: u16, value: u8) {
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
    }
}

/// アドレスデコーダ (外部バスコントローラ)
pub trait AddressDecoder {
    /// 外部メモリインタフェースを有効化
    fn enable(&mut self, wait_states: WaitStates);
    fn set_window_mode(&mut self, mode: ShadowMode);
}

/// ATmega2560 のレジスタ (データ空間アドレス) とビット位置
pub mod regs {
    pub const DDRC: u16 = 0x27;
    pub const PORTC: u16 = 0x28;
    pub const DDRD: u16 = 0x2a;
    pub const PORTD: u16 = 0x2b;
    pub const XMCRA: u16 = 0x74;
    pub const XMCRB: u16 = 0x75;
    pub const DDRL: u16 = 0x10a;
    pub const PORTL: u16 = 0x10b;

    pub const SRE: u8 = 7;
    pub const SRW10: u8 = 2;
    pub const XMM0: u8 = 0;
    pub const XMM1: u8 = 1;
}

/// ATmega2560 の XMEM インタフェース
pub struct Atmega2560Decoder<R> {
    bus: R,
}

impl<R: RegisterBus> Atmega2560Decoder<R> {
    pub const fn new(bus: R) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &R {
        &self.bus
    }

    // PORTC を全ピン出力・Low にしておく
    fn park_port_c(&mut self) {
        self.bus.write(regs::DDRC, 0xff);
        self.bus.write(regs::PORTC, 0x00);
    }
}

impl<R: RegisterBus> AddressDecoder for Atmega2560Decoder<R> {
    fn enable(&mut self, wait_states: WaitStates) {
        self.bus.write(regs::XMCRB, 0);
        // 外部メモリ全体を 1 セクタとして扱い、ウェイトを設定
        self.bus.write(
            regs::XMCRA,
            (1 << regs::SRE) | ((wait_states as u8) << regs::SRW10),
        );
    }

    fn set_window_mode(&mut self, mode: ShadowMode) {
        self.park_port_c();
        match mode {
            // PC7..PC5 をアドレス線から外す。0 固定なので下位 8KiB が見える
            ShadowMode::ShadowedLow => self
                .bus
                .write(regs::XMCRB, (1 << regs::XMM0) | (1 << regs::XMM1)),
            ShadowMode::Normal => self.bus.write(regs::XMCRB, 0),
        }
    }
}

/// アドレス窓の制御: デコーダと基板固有のバンク選択線をまとめる
pub struct AddressWindow<D, B> {
    decoder: D,
    hooks: B,
    mode: ShadowMode,
    shadow: NonNull<u8>,
}

impl<D: AddressDecoder, B: BoardHooks> AddressWindow<D, B> {
    pub fn new(decoder: D, hooks: B, shadow: NonNull<u8>) -> Self {
        Self {
            decoder,
            hooks,
            mode: ShadowMode::Normal,
            shadow,
        }
    }

    pub fn enable(&mut self, wait_states: WaitStates) {
        self.decoder.enable(wait_states);
        self.hooks.init_pins();
        self.mode = ShadowMode::Normal;
    }

    pub fn map_bank(&mut self, bank: u8) {
        self.hooks.select_bank(bank);
    }

    /// 下位領域を見せ、その先頭を返す。使い終わったら
    /// [`unshadow_low_region`](Self::unshadow_low_region) を呼ぶこと。
    pub fn shadow_low_region(&mut self) -> NonNull<u8> {
        self.decoder.set_window_mode(ShadowMode::ShadowedLow);
        self.mode = ShadowMode::ShadowedLow;
        self.shadow
    }

    pub fn unshadow_low_region(&mut self) {
        self.decoder.set_window_mode(ShadowMode::Normal);
        self.mode = ShadowMode::Normal;
    }

    pub fn mode(&self) -> ShadowMode {
        self.mode
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn hooks(&self) -> &B {
        &self.hooks
    }
}
