//! 基板ごとに異なるピン設定とバンク選択線

use bitvec::prelude::*;

use crate::memory::window::{regs, RegisterBus};

/// XMEM 初期化とバンク切り替えに付随する基板固有の処理
pub trait BoardHooks {
    /// 区別できるバンク数。バンク線が無ければ 1
    fn capacity(&self) -> usize {
        1
    }
    /// 追加ピンの初期化 (XMEM 有効化の直後に 1 回)
    fn init_pins(&mut self) {}
    /// デコーダが持たない上位アドレス線にバンク番号を出す
    fn select_bank(&mut self, _bank: u8) {}
}

/// 64KiB 以下の構成ではバンク線は不要
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBoardHooks;

impl BoardHooks for NoBoardHooks {}

/// ポートの 1 ピン
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortPin {
    pub ddr: u16,
    pub port: u16,
    pub bit: u8,
}

impl PortPin {
    pub const fn new(ddr: u16, port: u16, bit: u8) -> Self {
        Self { ddr, port, bit }
    }
}

/// バンク番号の各ビットを `L` 本のピンに出す
///
/// 下位ビットから順に `lines[0]`, `lines[1]`, ... に対応する。
/// 本数を超える上位ビットは無視される。
pub struct BankSelectLines<R, const L: usize> {
    bus: R,
    lines: [PortPin; L],
    chip_enable: Option<PortPin>,
}

impl<R: RegisterBus, const L: usize> BankSelectLines<R, L> {
    pub const fn new(bus: R, lines: [PortPin; L], chip_enable: Option<PortPin>) -> Self {
        Self {
            bus,
            lines,
            chip_enable,
        }
    }

    pub fn bus(&self) -> &R {
        &self.bus
    }

    fn drive(&mut self, pin: PortPin, high: bool) {
        self.bus.modify(pin.port, |mut value| {
            value.view_bits_mut::<Lsb0>().set(pin.bit as usize, high);
            value
        });
    }

    fn make_output(&mut self, pin: PortPin) {
        self.bus.modify(pin.ddr, |mut value| {
            value.view_bits_mut::<Lsb0>().set(pin.bit as usize, true);
            value
        });
    }
}

impl<R: RegisterBus> BankSelectLines<R, 1> {
    /// Megaram 128KiB シールド (Arduino Mega 2560)
    ///
    /// PD7 がバンク選択、PL7 が RAM のチップイネーブル (High アクティブ)。
    pub const fn megaram(bus: R) -> Self {
        Self::new(
            bus,
            [PortPin::new(regs::DDRD, regs::PORTD, 7)],
            Some(PortPin::new(regs::DDRL, regs::PORTL, 7)),
        )
    }
}

impl<R: RegisterBus, const L: usize> BoardHooks for BankSelectLines<R, L> {
    fn capacity(&self) -> usize {
        u32::try_from(L)
            .ok()
            .and_then(|lines| 1usize.checked_shl(lines))
            .unwrap_or(usize::MAX)
    }

    fn init_pins(&mut self) {
        for pin in self.lines {
            self.make_output(pin);
            self.drive(pin, false);
        }
        if let Some(pin) = self.chip_enable {
            self.make_output(pin);
            self.drive(pin, true);
        }
    }

    fn select_bank(&mut self, bank: u8) {
        let lines = self.lines;
        for (pin, bit) in lines.iter().zip(bank.view_bits::<Lsb0>().iter()) {
            self.drive(*pin, *bit);
        }
    }
}
