use core::alloc::{GlobalAlloc, Layout};
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use spin::{Mutex, MutexGuard};

use super::heap_io::HeapStateIo;
use super::state::HeapState;

/// avr-libc の `__malloc_margin` と同じ既定値
pub const DEFAULT_STACK_MARGIN: usize = 32;

// 空きブロックのヘッダ。ブロック自身の先頭に置く
#[derive(Clone, Copy)]
#[repr(C)]
struct FreeBlock {
    size: usize,
    next: usize,
}

const BLOCK_ALIGN: usize = align_of::<FreeBlock>();
const MIN_BLOCK: usize = size_of::<FreeBlock>();

const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

unsafe fn read_block(addr: usize) -> FreeBlock {
    ptr::read(addr as *const FreeBlock)
}

unsafe fn write_block(addr: usize, block: FreeBlock) {
    ptr::write(addr as *mut FreeBlock, block)
}

/// ブレークポインタ + アドレス順の空きリストによるヒープ
///
/// 生きた状態はちょうど 1 つの [`HeapState`] なので、バンク切り替え時に
/// そのまま退避・復元できる。
pub struct XmemHeap {
    state: HeapState,
    margin: usize,
}

impl XmemHeap {
    pub const fn empty() -> Self {
        Self::with_margin(DEFAULT_STACK_MARGIN)
    }

    /// `heap_end == 0` のとき、スタックとの間に空ける余白を指定する
    pub const fn with_margin(margin: usize) -> Self {
        Self {
            state: HeapState::EMPTY,
            margin,
        }
    }

    /// ヒープを初期化
    ///
    /// Safety: `[start, end]` が書き込み可能で、他から使われていないこと。
    /// `end == 0` の場合はスタックの手前までを使う。
    pub unsafe fn init(&mut self, start: usize, end: usize) {
        self.state = HeapState::fresh(start, end);
    }

    pub fn state(&self) -> &HeapState {
        &self.state
    }

    // 0 は未使用なので先頭から。アドレス 0 は空きリストの終端と区別できないので使わない
    fn brk(&self) -> usize {
        let raw = if self.state.break_pointer == 0 {
            self.state.heap_start
        } else {
            self.state.break_pointer
        };
        align_up(raw.max(1), BLOCK_ALIGN)
    }

    // 確保してよい上限 (含まない)
    fn limit(&self) -> usize {
        if self.state.heap_end != 0 {
            return self.state.heap_end.saturating_add(1);
        }
        // ローカル変数のアドレスをスタックポインタの近似として使う
        let marker = 0u8;
        (ptr::addr_of!(marker) as usize).saturating_sub(self.margin)
    }

    fn block_size(layout: &Layout) -> (usize, usize) {
        let size = align_up(layout.size().max(MIN_BLOCK), BLOCK_ALIGN);
        let align = layout.align().max(BLOCK_ALIGN);
        (size, align)
    }

    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        // 全て 0 は未初期化。窓の先頭 0 から始まるヒープは使える
        if self.state.heap_start == 0 && self.state.heap_end == 0 {
            return None;
        }
        let (size, align) = Self::block_size(&layout);
        // Safety: 空きリストのノードは全てこのヒープが書いたもの
        let addr = match unsafe { self.take_free(size, align) } {
            Some(addr) => addr,
            None => self.bump(size, align)?,
        };
        NonNull::new(addr as *mut u8)
    }

    /// Safety: `ptr` はこのヒープが同じ `layout` で返したものであること。
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let (size, _) = Self::block_size(&layout);
        self.release(ptr.as_ptr() as usize, size);
    }

    /// 空きブロックの合計バイト数
    pub fn free_bytes(&self) -> usize {
        let mut total = 0;
        let mut cur = self.state.free_list_head;
        while cur != 0 {
            let block = unsafe { read_block(cur) };
            total += block.size;
            cur = block.next;
        }
        total
    }

    // first fit。余りがヘッダに満たない分割はしない
    unsafe fn take_free(&mut self, size: usize, align: usize) -> Option<usize> {
        let mut prev = 0;
        let mut cur = self.state.free_list_head;
        while cur != 0 {
            let block = read_block(cur);
            if cur % align == 0 && block.size >= size {
                let rest = block.size - size;
                if rest == 0 {
                    self.link(prev, block.next);
                    return Some(cur);
                }
                if rest >= MIN_BLOCK {
                    let tail = cur + size;
                    write_block(
                        tail,
                        FreeBlock {
                            size: rest,
                            next: block.next,
                        },
                    );
                    self.link(prev, tail);
                    return Some(cur);
                }
            }
            prev = cur;
            cur = block.next;
        }
        None
    }

    fn bump(&mut self, size: usize, align: usize) -> Option<usize> {
        let brk = self.brk();
        let start = align_up(brk, align);
        let end = start.checked_add(size)?;
        if end > self.limit() {
            return None;
        }
        self.state.break_pointer = end;
        let gap = start - brk;
        if gap >= MIN_BLOCK {
            unsafe { self.release(brk, gap) };
        }
        Some(start)
    }

    unsafe fn release(&mut self, addr: usize, size: usize) {
        let mut prev = 0;
        let mut next = self.state.free_list_head;
        while next != 0 && next < addr {
            prev = next;
            next = read_block(next).next;
        }

        let mut block = FreeBlock { size, next };
        if next != 0 && addr + size == next {
            let following = read_block(next);
            block = FreeBlock {
                size: size + following.size,
                next: following.next,
            };
        }

        let preceding = if prev != 0 { Some(read_block(prev)) } else { None };
        let (start, size) = match preceding {
            Some(p) if prev + p.size == addr => {
                let merged = p.size + block.size;
                write_block(
                    prev,
                    FreeBlock {
                        size: merged,
                        next: block.next,
                    },
                );
                (prev, merged)
            }
            _ => {
                write_block(addr, block);
                self.link(prev, addr);
                (addr, block.size)
            }
        };

        // 最上位のブロックはブレークポインタに返す
        if start + size == self.state.break_pointer {
            self.unlink(start);
            self.state.break_pointer = start;
        }
    }

    unsafe fn link(&mut self, prev: usize, node: usize) {
        if prev == 0 {
            self.state.free_list_head = node;
        } else {
            let mut block = read_block(prev);
            block.next = node;
            write_block(prev, block);
        }
    }

    unsafe fn unlink(&mut self, node: usize) {
        let next = read_block(node).next;
        let mut prev = 0;
        let mut cur = self.state.free_list_head;
        while cur != 0 && cur != node {
            prev = cur;
            cur = read_block(cur).next;
        }
        if cur == node {
            self.link(prev, next);
        }
    }
}

impl HeapStateIo for XmemHeap {
    fn capture(&mut self) -> HeapState {
        self.state
    }

    fn restore(&mut self, state: &HeapState) {
        self.state = *state;
    }
}

/// spin::Mutex で包み、ロック越しにトレイトを実装できるようにする
pub struct Locked<A> {
    inner: Mutex<A>,
}

impl<A> Locked<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }
}

impl Locked<XmemHeap> {
    pub const fn empty() -> Self {
        Self::new(XmemHeap::empty())
    }
}

/// `#[global_allocator]` の static をそのままコントローラに渡せるように
impl<A: HeapStateIo> HeapStateIo for &Locked<A> {
    fn capture(&mut self) -> HeapState {
        self.lock().capture()
    }

    fn restore(&mut self, state: &HeapState) {
        self.lock().restore(state)
    }
}

unsafe impl GlobalAlloc for Locked<XmemHeap> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.lock()
            .allocate(layout)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.lock().deallocate(ptr, layout);
        }
    }
}
