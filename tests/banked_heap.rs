// 実際のバッファ上で XmemHeap を動かし、バンク切り替えを内容の入れ替えで模擬する

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use xmem_bank::{
    AddressDecoder, BoardHooks, ControllerState, Locked, ShadowMode, WaitStates, XmemConfig,
    XmemController, XmemHeap,
};

const BANK_SIZE: usize = 4096;
const LAST_BANK_SIZE: usize = 2048;

struct NullDecoder;

impl AddressDecoder for NullDecoder {
    fn enable(&mut self, _wait_states: WaitStates) {}
    fn set_window_mode(&mut self, _mode: ShadowMode) {}
}

/// バンクを選ぶたびに窓の中身を退避・復元する
struct SimulatedBanks {
    window: usize,
    backing: Vec<Vec<u8>>,
    current: Option<u8>,
}

impl BoardHooks for SimulatedBanks {
    fn capacity(&self) -> usize {
        self.backing.len()
    }

    fn select_bank(&mut self, bank: u8) {
        unsafe {
            if let Some(current) = self.current {
                ptr::copy_nonoverlapping(
                    self.window as *const u8,
                    self.backing[current as usize].as_mut_ptr(),
                    BANK_SIZE,
                );
            }
            ptr::copy_nonoverlapping(
                self.backing[bank as usize].as_ptr(),
                self.window as *mut u8,
                BANK_SIZE,
            );
        }
        self.current = Some(bank);
    }
}

struct Rig {
    _window: Vec<u64>,
    _system: Vec<u64>,
    window_base: usize,
    system_start: usize,
    system_end: usize,
}

impl Rig {
    fn new() -> Self {
        let mut window = vec![0u64; BANK_SIZE / 8];
        let mut system = vec![0u64; 128];
        let window_base = window.as_mut_ptr() as usize;
        let system_start = system.as_mut_ptr() as usize;
        Self {
            window_base,
            system_start,
            system_end: system_start + system.len() * 8 - 1,
            _window: window,
            _system: system,
        }
    }

    fn config(&self) -> XmemConfig {
        XmemConfig::new((BANK_SIZE + LAST_BANK_SIZE) as u32, BANK_SIZE as u32)
            .with_window(self.window_base, self.window_base)
            .with_shadow(self.window_base, 256)
    }

    fn board(&self) -> SimulatedBanks {
        SimulatedBanks {
            window: self.window_base,
            backing: vec![vec![0u8; BANK_SIZE]; 2],
            current: None,
        }
    }
}

fn layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).unwrap()
}

unsafe fn fill(addr: usize, value: u8, len: usize) {
    ptr::write_bytes(addr as *mut u8, value, len);
}

unsafe fn all_equal(addr: usize, value: u8, len: usize) -> bool {
    core::slice::from_raw_parts(addr as *const u8, len)
        .iter()
        .all(|&b| b == value)
}

#[test]
fn each_bank_keeps_its_own_heap_and_contents() {
    let rig = Rig::new();
    let heap = Locked::new(XmemHeap::empty());
    unsafe { heap.lock().init(rig.system_start, rig.system_end) };

    let mut xmem = XmemController::<_, _, _, 2>::new(rig.config(), &heap, NullDecoder, rig.board())
        .unwrap();
    xmem.initialize();
    assert_eq!(xmem.state(), ControllerState::BankActive(0));
    assert_eq!(xmem.bank_address_start(), Some(rig.window_base));
    assert_eq!(xmem.bank_address_end(), Some(rig.window_base + BANK_SIZE - 1));

    let a = unsafe { heap.alloc(layout(64)) } as usize;
    assert_eq!(a, rig.window_base);
    unsafe { fill(a, 0xaa, 64) };

    xmem.switch_bank(1);
    assert_eq!(xmem.bank_address_end(), Some(rig.window_base + LAST_BANK_SIZE - 1));
    let b = unsafe { heap.alloc(layout(64)) } as usize;
    assert_eq!(b, rig.window_base);
    unsafe { fill(b, 0x55, 64) };

    xmem.switch_bank(0);
    assert!(unsafe { all_equal(a, 0xaa, 64) });
    let c = unsafe { heap.alloc(layout(64)) } as usize;
    assert_eq!(c, rig.window_base + 64);

    xmem.switch_bank(1);
    assert!(unsafe { all_equal(b, 0x55, 64) });
}

#[test]
fn last_bank_runs_out_at_its_own_end() {
    let rig = Rig::new();
    let heap = Locked::new(XmemHeap::empty());
    unsafe { heap.lock().init(rig.system_start, rig.system_end) };

    let mut xmem = XmemController::<_, _, _, 2>::new(rig.config(), &heap, NullDecoder, rig.board())
        .unwrap();
    xmem.initialize();
    xmem.switch_bank(1);

    assert!(!unsafe { heap.alloc(layout(LAST_BANK_SIZE)) }.is_null());
    assert!(unsafe { heap.alloc(layout(8)) }.is_null());

    // バンク 0 にはまだ余裕がある
    xmem.switch_bank(0);
    assert!(!unsafe { heap.alloc(layout(LAST_BANK_SIZE)) }.is_null());
}

#[test]
fn system_heap_can_be_used_between_banks() {
    let rig = Rig::new();
    let heap = Locked::new(XmemHeap::empty());
    unsafe { heap.lock().init(rig.system_start, rig.system_end) };

    let mut xmem = XmemController::<_, _, _, 2>::new(rig.config(), &heap, NullDecoder, rig.board())
        .unwrap();
    xmem.initialize();

    let a = unsafe { heap.alloc(layout(32)) } as usize;
    assert_eq!(a, rig.window_base);

    xmem.set_system_heap();
    let s = unsafe { heap.alloc(layout(32)) } as usize;
    assert_eq!(s, rig.system_start);

    xmem.set_xmem_heap();
    let b = unsafe { heap.alloc(layout(32)) } as usize;
    assert_eq!(b, rig.window_base + 32);

    unsafe { heap.dealloc(b as *mut u8, layout(32)) };
    assert_eq!(heap.lock().state().break_pointer, rig.window_base + 32);

    xmem.set_system_heap();
    let t = unsafe { heap.alloc(layout(32)) } as usize;
    assert_eq!(t, rig.system_start + 32);
}

#[test]
fn shadow_window_points_at_configured_region() {
    let rig = Rig::new();
    let heap = Locked::new(XmemHeap::empty());
    unsafe { heap.lock().init(rig.system_start, rig.system_end) };

    let mut xmem = XmemController::<_, _, _, 2>::new(rig.config(), &heap, NullDecoder, rig.board())
        .unwrap();
    xmem.initialize();

    let low = xmem.shadow_low_region();
    assert_eq!(low.as_ptr() as usize, rig.window_base);
    assert_eq!(xmem.shadow_size(), 256);
    xmem.unshadow_low_region();
    assert_eq!(xmem.state(), ControllerState::BankActive(0));
}
