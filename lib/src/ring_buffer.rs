/// Fixed-capacity FIFO ring buffer.
/// Uses a backing array with head/tail/count indices. Never allocates, so a
/// full buffer is reported to the caller instead of growing.
#[derive(Debug)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    head: u32,
    tail: u32,
    count: u32,
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    /// Create a new ring buffer with all elements set to the given value.
    /// This is const-compatible and can be used for static initialization.
    #[inline(always)]
    pub const fn new_with(value: T) -> Self {
        Self {
            data: [value; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Returns the current number of elements in the buffer.
    #[inline(always)]
    pub const fn len(&self) -> u32 {
        self.count
    }

    #[inline(always)]
    pub const fn capacity(&self) -> u32 {
        N as u32
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline(always)]
    pub const fn is_full(&self) -> bool {
        self.count >= N as u32
    }

    #[inline(always)]
    fn wrap(&self, index: u32) -> u32 {
        index % self.capacity()
    }

    /// Push at the back; returns true on success, false if full.
    #[inline(always)]
    pub fn try_push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.head as usize] = value;
        self.head = self.wrap(self.head + 1);
        self.count += 1;
        true
    }

    /// Push at the front so the value is popped next; false if full.
    #[inline(always)]
    pub fn try_push_front(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.tail = self.wrap(self.tail + self.capacity() - 1);
        self.data[self.tail as usize] = value;
        self.count += 1;
        true
    }

    /// Pop oldest element; returns Some(value) or None when empty.
    #[inline(always)]
    pub fn try_pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.data[self.tail as usize];
        self.tail = self.wrap(self.tail + 1);
        self.count -= 1;
        Some(value)
    }

    /// Peek at the oldest element without removing it.
    #[inline(always)]
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        Some(&self.data[self.tail as usize])
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.count).map(move |i| &self.data[self.wrap(self.tail + i) as usize])
    }

    /// Remove the first element matching `pred`, keeping the order of the rest.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let pos = (0..self.count).find(|&i| pred(&self.data[self.wrap(self.tail + i) as usize]))?;
        let removed = self.data[self.wrap(self.tail + pos) as usize];
        for i in pos..self.count - 1 {
            let dst = self.wrap(self.tail + i) as usize;
            let src = self.wrap(self.tail + i + 1) as usize;
            self.data[dst] = self.data[src];
        }
        self.head = self.wrap(self.head + self.capacity() - 1);
        self.count -= 1;
        Some(removed)
    }
}

impl<T: Copy + PartialEq, const N: usize> RingBuffer<T, N> {
    pub fn contains(&self, value: &T) -> bool {
        self.iter().any(|v| v == value)
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    #[inline(always)]
    pub fn new() -> Self {
        Self::new_with(T::default())
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn drain<const N: usize>(rb: &mut RingBuffer<u32, N>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(v) = rb.try_pop() {
            out.push(v);
        }
        out
    }

    #[test]
    fn test_fifo_order_and_capacity() {
        let mut rb: RingBuffer<u32, 3> = RingBuffer::new();
        assert!(rb.try_push(1));
        assert!(rb.try_push(2));
        assert!(rb.try_push(3));
        assert!(rb.is_full());
        assert!(!rb.try_push(4));
        assert_eq!(rb.try_pop(), Some(1));
        assert!(rb.try_push(4));
        assert_eq!(drain(&mut rb), [2, 3, 4]);
        assert!(rb.is_empty());
        assert_eq!(rb.try_pop(), None);
    }

    #[test]
    fn test_push_front_restores_head() {
        let mut rb: RingBuffer<u32, 4> = RingBuffer::new();
        rb.try_push(10);
        rb.try_push(11);
        let head = rb.try_pop().unwrap();
        assert!(rb.try_push_front(head));
        assert_eq!(rb.peek(), Some(&10));
        assert_eq!(drain(&mut rb), [10, 11]);
    }

    #[test]
    fn test_remove_first_preserves_order_across_wrap() {
        let mut rb: RingBuffer<u32, 4> = RingBuffer::new();
        for v in [1, 2, 3] {
            rb.try_push(v);
        }
        rb.try_pop();
        rb.try_pop();
        for v in [4, 5, 6] {
            rb.try_push(v);
        }
        // Logical contents now wrap around the backing array: 3 4 5 6.
        assert_eq!(rb.remove_first(|&v| v == 4), Some(4));
        assert!(!rb.contains(&4));
        assert_eq!(rb.remove_first(|&v| v == 99), None);
        assert!(rb.try_push(7));
        assert_eq!(drain(&mut rb), [3, 5, 6, 7]);
    }
}
