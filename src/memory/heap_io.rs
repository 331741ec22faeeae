use super::state::HeapState;

/// アロケータの生きた管理情報への唯一の窓口
///
/// どちらの操作も失敗しない。検証もしない。
pub trait HeapStateIo {
    /// 現在の管理情報をそのまま読み出す
    fn capture(&mut self) -> HeapState;
    /// `state` を管理情報として書き戻す
    fn restore(&mut self, state: &HeapState);
}

impl<T: HeapStateIo + ?Sized> HeapStateIo for &mut T {
    fn capture(&mut self) -> HeapState {
        (**self).capture()
    }

    fn restore(&mut self, state: &HeapState) {
        (**self).restore(state)
    }
}

/// avr-libc の malloc が持つグローバル変数に直接つなぐ
#[cfg(target_arch = "avr")]
pub struct AvrLibcHeap {
    _private: (),
}

#[cfg(target_arch = "avr")]
extern "C" {
    static mut __malloc_heap_start: *mut u8;
    static mut __malloc_heap_end: *mut u8;
    static mut __brkval: *mut u8;
    static mut __flp: *mut u8;
}

#[cfg(target_arch = "avr")]
impl AvrLibcHeap {
    /// Safety: インスタンスは 1 つだけであり、capture/restore の最中に
    /// malloc/free が走らないこと。
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
impl HeapStateIo for AvrLibcHeap {
    fn capture(&mut self) -> HeapState {
        use core::ptr::{addr_of, read_volatile};
        // Safety: new() の契約によりシングルスレッドでの読み出し
        unsafe {
            HeapState {
                heap_start: read_volatile(addr_of!(__malloc_heap_start)) as usize,
                heap_end: read_volatile(addr_of!(__malloc_heap_end)) as usize,
                break_pointer: read_volatile(addr_of!(__brkval)) as usize,
                free_list_head: read_volatile(addr_of!(__flp)) as usize,
            }
        }
    }

    fn restore(&mut self, state: &HeapState) {
        use core::ptr::{addr_of_mut, write_volatile};
        unsafe {
            write_volatile(addr_of_mut!(__malloc_heap_start), state.heap_start as *mut u8);
            write_volatile(addr_of_mut!(__malloc_heap_end), state.heap_end as *mut u8);
            write_volatile(addr_of_mut!(__brkval), state.break_pointer as *mut u8);
            write_volatile(addr_of_mut!(__flp), state.free_list_head as *mut u8);
        }
    }
}
