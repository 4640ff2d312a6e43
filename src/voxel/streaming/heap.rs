//! Sub-allocator for the device heap
//!
//! Every chunk index buffer and brick buffer lives in one storage buffer;
//! a buffer's "device address" is its byte offset in that heap. Blocks are
//! bump-allocated and recycled through exact-size free lists (chunk
//! buffers come in a handful of power-of-two sizes).

use std::collections::BTreeMap;

use crate::core::types::DeviceAddress;

/// Alignment of every block
pub const HEAP_ALIGNMENT: u64 = 256;

/// A block of the heap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub address: DeviceAddress,
    pub size: u64,
}

impl Allocation {
    /// First u32 word of the block
    pub fn word_offset(&self) -> usize {
        (self.address / 4) as usize
    }
}

/// Bump allocator with size-class free lists
#[derive(Debug)]
pub struct HeapAllocator {
    capacity: u64,
    top: u64,
    free: BTreeMap<u64, Vec<DeviceAddress>>,
    live_bytes: u64,
}

impl HeapAllocator {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            top: 0,
            free: BTreeMap::new(),
            live_bytes: 0,
        }
    }

    fn align(size: u64) -> u64 {
        size.max(1).div_ceil(HEAP_ALIGNMENT) * HEAP_ALIGNMENT
    }

    /// Allocate `size` bytes. `None` when the heap must grow first.
    pub fn allocate(&mut self, size: u64) -> Option<Allocation> {
        let size = Self::align(size);
        let reused = self.free.get_mut(&size).and_then(Vec::pop);
        let address = match reused {
            Some(address) => address,
            None if self.top + size <= self.capacity => {
                let address = self.top;
                self.top += size;
                address
            }
            None => return None,
        };
        self.live_bytes += size;
        Some(Allocation { address, size })
    }

    /// Return a block for reuse. The caller guarantees the GPU is done with it.
    pub fn free(&mut self, allocation: Allocation) {
        debug_assert!(allocation.address + allocation.size <= self.top, "freeing unknown block");
        self.live_bytes -= allocation.size;
        self.free.entry(allocation.size).or_default().push(allocation.address);
    }

    /// Capacity that fits an extra `size`-byte block, at least doubling
    pub fn grown_capacity(&self, size: u64) -> u64 {
        (self.top + Self::align(size))
            .max(self.capacity * 2)
            .next_power_of_two()
    }

    /// Extend the addressable range; existing blocks keep their addresses
    pub fn grow_to(&mut self, capacity: u64) {
        debug_assert!(capacity >= self.capacity);
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes below the bump pointer (live or free)
    pub fn high_water(&self) -> u64 {
        self.top
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_align() {
        let mut heap = HeapAllocator::new(4096);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(1024).unwrap();
        assert_eq!(a, Allocation { address: 0, size: 256 });
        assert_eq!(b, Allocation { address: 256, size: 1024 });
        assert_eq!(heap.high_water(), 1280);
        assert_eq!(b.word_offset(), 64);
    }

    #[test]
    fn test_exhaustion_and_growth() {
        let mut heap = HeapAllocator::new(1024);
        assert!(heap.allocate(1024).is_some());
        assert!(heap.allocate(256).is_none());

        let grown = heap.grown_capacity(256);
        assert_eq!(grown, 2048);
        heap.grow_to(grown);
        assert_eq!(heap.allocate(256).unwrap().address, 1024);
    }

    #[test]
    fn test_free_list_reuse() {
        let mut heap = HeapAllocator::new(8192);
        let a = heap.allocate(1024).unwrap();
        let _b = heap.allocate(2048).unwrap();
        heap.free(a);
        assert_eq!(heap.live_bytes(), 2048);

        // Different size does not reuse the freed block
        assert_eq!(heap.allocate(2048).unwrap().address, 3072);
        assert_eq!(heap.allocate(1024).unwrap().address, a.address);
    }
}
