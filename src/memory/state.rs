/// アロケータの生きた管理情報 4 つ分のスナップショット
///
/// どのアドレスモードで取得したかに対してのみ意味を持つ。
/// 別のバンクがマップされた状態で restore すると以降の確保が壊れる。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapState {
    /// ヒープ先頭 (含む)
    pub heap_start: usize,
    /// ヒープ末尾 (含む)。0 はスタックまで伸ばせることを表す
    pub heap_end: usize,
    /// 確保済み領域の先端。0 はまだ一度も確保していない
    pub break_pointer: usize,
    /// 空きブロックリストの先頭。0 は空
    pub free_list_head: usize,
}

impl HeapState {
    pub const EMPTY: Self = Self {
        heap_start: 0,
        heap_end: 0,
        break_pointer: 0,
        free_list_head: 0,
    };

    /// まだ何も確保していない `[start, end]` のヒープ
    pub const fn fresh(start: usize, end: usize) -> Self {
        Self {
            heap_start: start,
            heap_end: end,
            break_pointer: start,
            free_list_head: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_untouched(&self) -> bool {
        self.free_list_head == 0
            && (self.break_pointer == 0 || self.break_pointer == self.heap_start)
    }
}
