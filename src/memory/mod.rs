// ---- submodules ----
pub mod allocator;
pub mod banks;
pub mod heap_io;
pub mod state;
pub mod switcher;
pub mod window;

pub use allocator::{Locked, XmemHeap};
pub use banks::{BankExtent, BankLayout, BankStateStore};
#[cfg(target_arch = "avr")]
pub use heap_io::AvrLibcHeap;
pub use heap_io::HeapStateIo;
pub use state::HeapState;
pub use switcher::{ControllerState, HeapMode, XmemController};
pub use window::{AddressDecoder, AddressWindow, Atmega2560Decoder, Mmio, RegisterBus, ShadowMode};
