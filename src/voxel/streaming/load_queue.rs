//! Brick load queue shared between the tracer and the world
//!
//! GPU layout: `{ count: u32, pad: [u32; 3], bricks: [ivec4; capacity] }`.
//! Rays append with `slot = atomicAdd(count, 1)` and only write when
//! `slot < capacity`, so `count` may exceed the capacity; the reader clamps
//! it and reports the excess as dropped.

use bytemuck::{Pod, Zeroable};
use glam::IVec3;

use crate::core::error::Error;
use crate::core::types::Result;

/// Requests recorded per tick unless configured otherwise
pub const DEFAULT_LOAD_QUEUE_CAPACITY: u32 = 1024;

/// Queue header (16 bytes, offset 0)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LoadQueueHeader {
    /// Number of append attempts this tick (4 bytes, offset 0)
    pub count: u32,
    /// Padding to the 16-byte entry alignment (12 bytes, offset 4)
    pub _pad: [u32; 3],
}

/// Bytes occupied by one queue entry (`ivec4`, w unused)
pub const LOAD_QUEUE_ENTRY_BYTES: u64 = 16;

/// Total GPU buffer size for a queue of `capacity` entries
pub fn load_queue_bytes(capacity: u32) -> u64 {
    std::mem::size_of::<LoadQueueHeader>() as u64 + capacity as u64 * LOAD_QUEUE_ENTRY_BYTES
}

/// One tick's drained requests
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadRequests {
    /// Recorded brick positions, in append order (duplicates kept)
    pub positions: Vec<IVec3>,
    /// Append attempts that did not fit
    pub dropped: u32,
}

impl LoadRequests {
    /// Clamp a raw count against the capacity and take that many entries
    pub fn from_entries(count: u32, entries: &[[i32; 4]], capacity: u32) -> Self {
        let recorded = count.min(capacity).min(entries.len() as u32);
        let positions = entries[..recorded as usize]
            .iter()
            .map(|e| IVec3::new(e[0], e[1], e[2]))
            .collect();
        Self {
            positions,
            dropped: count.saturating_sub(capacity),
        }
    }

    /// Parse a mapped copy of the GPU queue buffer
    pub fn parse(bytes: &[u8], capacity: u32) -> Result<Self> {
        let expected = load_queue_bytes(capacity) as usize;
        if bytes.len() < expected {
            return Err(Error::Streaming(format!(
                "load queue readback is {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }
        let header_len = std::mem::size_of::<LoadQueueHeader>();
        let header: LoadQueueHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
        let entries: Vec<[i32; 4]> = bytes[header_len..expected]
            .chunks_exact(LOAD_QUEUE_ENTRY_BYTES as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(Self::from_entries(header.count, &entries, capacity))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// In-memory queue with the same append semantics as the shader
#[derive(Clone, Debug)]
pub struct HostLoadQueue {
    count: u32,
    entries: Vec<[i32; 4]>,
}

impl HostLoadQueue {
    pub fn new(capacity: u32) -> Self {
        Self {
            count: 0,
            entries: vec![[0; 4]; capacity as usize],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Append a request. Returns false when the queue is full; the attempt
    /// is still counted.
    pub fn try_push(&mut self, position: IVec3) -> bool {
        let slot = self.count;
        self.count = self.count.wrapping_add(1);
        match self.entries.get_mut(slot as usize) {
            Some(entry) => {
                *entry = [position.x, position.y, position.z, 0];
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn snapshot(&self) -> LoadRequests {
        LoadRequests::from_entries(self.count, &self.entries, self.capacity())
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<LoadQueueHeader>(), 16);
        assert_eq!(load_queue_bytes(1024), 16 + 1024 * 16);
    }

    #[test]
    fn test_count_clamped_and_dropped() {
        let entries = [[1, 2, 3, 0], [4, 5, 6, 0]];
        let requests = LoadRequests::from_entries(7, &entries, 2);
        assert_eq!(requests.positions, vec![IVec3::new(1, 2, 3), IVec3::new(4, 5, 6)]);
        assert_eq!(requests.dropped, 5);
    }

    #[test]
    fn test_parse_bytes() {
        let mut bytes = vec![0u8; load_queue_bytes(3) as usize];
        let header = LoadQueueHeader { count: 2, _pad: [0; 3] };
        bytes[..16].copy_from_slice(bytemuck::bytes_of(&header));
        bytes[16..32].copy_from_slice(bytemuck::cast_slice(&[9i32, 8, 7, 0]));
        bytes[32..48].copy_from_slice(bytemuck::cast_slice(&[-1i32, 0, 1, 0]));

        let requests = LoadRequests::parse(&bytes, 3).unwrap();
        assert_eq!(requests.positions, vec![IVec3::new(9, 8, 7), IVec3::new(-1, 0, 1)]);
        assert_eq!(requests.dropped, 0);
    }

    #[test]
    fn test_parse_short_buffer() {
        assert!(LoadRequests::parse(&[0u8; 20], 2).is_err());
    }

    #[test]
    fn test_host_queue_guarded_append() {
        let mut queue = HostLoadQueue::new(4);
        let pos = IVec3::new(1, 1, 0);
        let accepted: Vec<bool> = (0..5).map(|_| queue.try_push(pos)).collect();
        assert_eq!(accepted, vec![true, true, true, true, false]);
        assert_eq!(queue.count(), 5);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.dropped, 1);

        queue.reset();
        assert!(queue.snapshot().is_empty());
    }
}
