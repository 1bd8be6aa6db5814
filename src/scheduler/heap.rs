//! Indexed binary heap operations.
//!
//! Implementors own their storage and a position index; the provided methods
//! keep the heap property by calling back into `less` and `swap`, so any side
//! index updated in `swap` always reflects each entry's current position.

pub trait IndexedHeap {
    type Item;

    fn len(&self) -> usize;

    /// Whether the entry at `i` must be popped before the entry at `j`.
    fn less(&self, i: usize, j: usize) -> bool;

    fn swap(&mut self, i: usize, j: usize);

    /// Append `item` at position `len()`.
    fn push_entry(&mut self, item: Self::Item);

    /// Remove and return the entry at position `len() - 1`.
    fn pop_entry(&mut self) -> Option<Self::Item>;

    /// Establish the heap property over entries stored in arbitrary order.
    fn init(&mut self) {
        let n = self.len();
        for i in (0..n / 2).rev() {
            self.down(i, n);
        }
    }

    fn push(&mut self, item: Self::Item) {
        self.push_entry(item);
        let last = self.len() - 1;
        self.up(last);
    }

    fn pop(&mut self) -> Option<Self::Item> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        self.swap(0, n - 1);
        self.down(0, n - 1);
        self.pop_entry()
    }

    fn remove(&mut self, i: usize) -> Option<Self::Item> {
        let n = self.len();
        if i >= n {
            return None;
        }
        let last = n - 1;
        if i != last {
            self.swap(i, last);
            if !self.down(i, last) {
                self.up(i);
            }
        }
        self.pop_entry()
    }

    /// Re-establish ordering after the entry at `i` changed its key.
    fn fix(&mut self, i: usize) {
        if i >= self.len() {
            return;
        }
        if !self.down(i, self.len()) {
            self.up(i);
        }
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    /// Sift down within the first `n` entries; true if the entry moved.
    fn down(&mut self, start: usize, n: usize) -> bool {
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }
}
