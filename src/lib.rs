//! 外部メモリのバンク切り替えとヒープ状態の付け替え
//!
//! アドレス空間に一度に 1 バンクしか見えないマイコンで、外部 SRAM をバンク単位で
//! 使う。アロケータの管理情報 (ヒープ先頭・末尾・ブレークポインタ・空きリスト) を
//! バンクごと、および内蔵 SRAM のヒープ用に退避・復元する。
//!
//! ```ignore
//! #[global_allocator]
//! static HEAP: Locked<XmemHeap> = Locked::empty();
//!
//! unsafe { HEAP.lock().init(INTERNAL_HEAP_START, 0) };
//! let mut xmem = XmemController::<_, _, _, 2>::new(
//!     XmemConfig::atmega2560(131072),
//!     &HEAP,
//!     Atmega2560Decoder::new(unsafe { Mmio::new() }),
//!     BankSelectLines::megaram(unsafe { Mmio::new() }),
//! )?;
//! xmem.initialize();
//! xmem.switch_bank(1);
//! ```
#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod config;
pub mod memory;

pub use board::{BankSelectLines, BoardHooks, NoBoardHooks, PortPin};
pub use config::{ConfigError, WaitStates, XmemConfig};
pub use memory::{
    AddressDecoder, Atmega2560Decoder, ControllerState, HeapMode, HeapState, HeapStateIo, Locked,
    Mmio, RegisterBus, ShadowMode, XmemController, XmemHeap,
};
