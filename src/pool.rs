use std::{
  ptr::NonNull,
  sync::atomic::{AtomicU16, Ordering},
};

use tracing::{debug, error, trace};

use crate::{
  arena::Arena,
  bitmap::Bitmap,
  block::{BlockHeader, HEADER_SIZE, MAGIC_NUMBER},
  config::PoolConfig,
  error::{PoolError, Result},
  free_list::FreeList,
};

/// Identity 0 is never handed out, so a zeroed header can never match a pool.
static NEXT_POOL_ID: AtomicU16 = AtomicU16::new(1);

fn next_pool_id() -> u16 {
  loop {
    let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
    if id != 0 {
      return id;
    }
  }
}

/// Point-in-time view of a pool, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolStats {
  pub pool_id: u16,
  pub block_size: usize,
  pub block_count: usize,
  pub used_blocks: usize,
  pub free_blocks: usize,
  pub fragmentation_ratio: f64,
}

/// A single size class of fixed-size blocks carved out of one arena.
///
/// ```text
///   arena (block_count * block_size bytes)
///   ┌────────┬──────────────┬────────┬──────────────┬─────
///   │ header │   payload    │ header │   payload    │ ...
///   └────────┴──────────────┴────────┴──────────────┴─────
///   ▲        ▲
///   │        └── pointer handed to the caller
///   └── block start, multiple of block_size from the arena base
/// ```
///
/// Occupancy is kept twice: in each block header (`allocation_flag`, used to
/// catch double frees) and in a bitmap (used for fragmentation analysis).
/// Free blocks are chained by index in a side table, most recently freed first.
///
/// Not thread-safe.
pub struct Pool {
  id: u16,
  arena: Arena,
  block_size: usize,
  block_count: usize,
  bitmap: Bitmap,
  free_list: FreeList,
  used_count: usize,
}

impl Pool {
  /// Builds a pool of `total_size / block_size` blocks, all free.
  ///
  /// Fails if `block_size` cannot hold a header plus a pointer, is not a
  /// multiple of 8, does not divide `total_size`, or if no block fits.
  pub fn new(
    total_size: usize,
    block_size: usize,
  ) -> Result<Self> {
    Self::with_config(PoolConfig::new(total_size, block_size))
  }

  pub fn with_config(config: PoolConfig) -> Result<Self> {
    config.validate()?;

    let PoolConfig { total_size, block_size } = config;
    let block_count = config.block_count();
    let id = next_pool_id();
    let arena = Arena::new(total_size);

    for index in 0..block_count {
      unsafe { BlockHeader::new(id).write(arena.at(index * block_size)) };
    }

    let bitmap = Bitmap::new(block_count);
    debug_assert_eq!(bitmap.len(), block_count);

    debug!(pool_id = id, total_size, block_size, block_count, "pool created");

    Ok(Self {
      id,
      arena,
      block_size,
      block_count,
      bitmap,
      free_list: FreeList::new(block_count),
      used_count: 0,
    })
  }

  #[inline]
  pub fn id(&self) -> u16 {
    self.id
  }

  #[inline]
  pub fn block_size(&self) -> usize {
    self.block_size
  }

  #[inline]
  pub fn block_count(&self) -> usize {
    self.block_count
  }

  #[inline]
  pub fn total_size(&self) -> usize {
    self.arena.size()
  }

  /// Largest request a single block can satisfy.
  #[inline]
  pub fn payload_capacity(&self) -> usize {
    self.block_size - HEADER_SIZE
  }

  #[inline]
  pub fn used_block_count(&self) -> usize {
    self.used_count
  }

  #[inline]
  pub fn free_block_count(&self) -> usize {
    self.free_list.len()
  }

  #[inline]
  pub fn is_exhausted(&self) -> bool {
    self.free_list.is_empty()
  }

  /// Takes the most recently freed block.
  ///
  /// Returns `Ok(None)` when every block is in use. A request larger than
  /// [`Pool::payload_capacity`] is a caller bug and is rejected.
  pub fn allocate(
    &mut self,
    requested_size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    let capacity = self.payload_capacity();
    if requested_size > capacity {
      return Err(PoolError::OversizedRequest {
        pool_id: self.id,
        requested: requested_size,
        capacity,
      });
    }

    let Some(index) = self.free_list.pop() else {
      trace!(pool_id = self.id, requested_size, "pool exhausted");
      return Ok(None);
    };

    let block = self.block_at(index);
    unsafe { BlockHeader::set_flag(block, BlockHeader::ALLOCATED) };
    self.bitmap.set(index);
    self.used_count += 1;
    debug_assert_eq!(self.used_count + self.free_list.len(), self.block_count);

    trace!(pool_id = self.id, index, requested_size, "block allocated");

    Ok(NonNull::new(unsafe { block.add(HEADER_SIZE) }))
  }

  /// Returns the block behind `address` to the pool. Null is ignored.
  ///
  /// `address` must be a pointer previously returned by [`Pool::allocate`].
  /// Anything else is rejected with [`PoolError::InvalidPointer`], and a block
  /// that is already free with [`PoolError::DoubleFree`]; in both cases the
  /// pool is left untouched.
  pub fn deallocate(
    &mut self,
    address: *mut u8,
  ) -> Result<()> {
    if address.is_null() {
      return Ok(());
    }

    let Some(index) = self.block_index(address.wrapping_sub(HEADER_SIZE)) else {
      return Err(PoolError::InvalidPointer {
        pool_id: self.id,
        address: address as usize,
      });
    };

    let block = self.block_at(index);
    let header = unsafe { BlockHeader::read(block) };
    if !header.is_allocated() {
      return Err(PoolError::DoubleFree { pool_id: self.id, index });
    }

    unsafe { BlockHeader::set_flag(block, BlockHeader::FREE) };
    self.bitmap.clear(index);
    self.free_list.push(index);
    self.used_count -= 1;
    debug_assert_eq!(self.used_count + self.free_list.len(), self.block_count);

    trace!(pool_id = self.id, index, "block freed");

    Ok(())
  }

  /// Whether `block` is the start of one of this pool's blocks.
  ///
  /// Safe to call with any address: the header is only read once the address
  /// is known to be a block boundary inside the arena.
  pub fn is_valid_pool_pointer(
    &self,
    block: *const u8,
  ) -> bool {
    self.block_index(block).is_some()
  }

  /// Whether `address` points anywhere inside this pool's arena, block
  /// boundary or not.
  #[inline]
  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    self.arena.offset_of(address).is_some()
  }

  /// How scattered the allocated blocks are, from 0.0 (one contiguous run)
  /// to 1.0 (every allocated block isolated).
  ///
  /// Scans the whole bitmap; meant for diagnostics, not the allocation path.
  pub fn fragmentation_ratio(&self) -> f64 {
    if self.used_count <= 1 || self.used_count >= self.block_count {
      return 0.0;
    }

    let transitions = self.bitmap.transitions() as f64;
    (transitions / (2.0 * self.used_count as f64)).min(1.0)
  }

  pub fn stats(&self) -> PoolStats {
    PoolStats {
      pool_id: self.id,
      block_size: self.block_size,
      block_count: self.block_count,
      used_blocks: self.used_count,
      free_blocks: self.free_block_count(),
      fragmentation_ratio: self.fragmentation_ratio(),
    }
  }

  /// Releases the arena, reporting blocks that were never freed.
  ///
  /// Outstanding pointers dangle once this returns, leak or not.
  pub fn close(mut self) -> Result<()> {
    let outstanding = self.used_count;
    debug_assert_eq!(self.bitmap.count_ones(), outstanding);

    // The arena goes away either way; the leak is reported here, not again on drop.
    self.used_count = 0;

    if outstanding > 0 {
      error!(pool_id = self.id, outstanding, "pool closed with outstanding blocks");
      return Err(PoolError::Leak {
        pool_id: self.id,
        outstanding,
      });
    }

    debug!(pool_id = self.id, "pool closed");
    Ok(())
  }

  /// Block index for a block start address, after all ownership checks.
  fn block_index(
    &self,
    block: *const u8,
  ) -> Option<usize> {
    let offset = self.arena.offset_of(block)?;

    if offset % self.block_size != 0 {
      return None;
    }

    let header = unsafe { BlockHeader::read(self.arena.at(offset)) };
    if header.magic != MAGIC_NUMBER || header.pool_id != self.id {
      return None;
    }

    Some(offset / self.block_size)
  }

  #[inline]
  fn block_at(
    &self,
    index: usize,
  ) -> *mut u8 {
    debug_assert!(index < self.block_count);
    unsafe { self.arena.at(index * self.block_size) }
  }
}

impl Drop for Pool {
  fn drop(&mut self) {
    if self.used_count == 0 {
      return;
    }

    error!(
      pool_id = self.id,
      outstanding = self.used_count,
      "pool dropped with outstanding blocks"
    );

    if cfg!(debug_assertions) && !std::thread::panicking() {
      panic!(
        "pool {} dropped with {} outstanding blocks",
        self.id, self.used_count
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn block_of(address: NonNull<u8>) -> *mut u8 {
    address.as_ptr().wrapping_sub(HEADER_SIZE)
  }

  fn allocate_n(
    pool: &mut Pool,
    count: usize,
  ) -> Vec<NonNull<u8>> {
    (0..count).map(|_| pool.allocate(8).unwrap().unwrap()).collect()
  }

  fn release_all(
    pool: &mut Pool,
    addresses: impl IntoIterator<Item = NonNull<u8>>,
  ) {
    for address in addresses {
      pool.deallocate(address.as_ptr()).unwrap();
    }
  }

  #[test]
  fn test_construction_contract() {
    assert!(matches!(Pool::new(640, 8), Err(PoolError::BlockTooSmall { .. })));
    assert!(matches!(Pool::new(600, 60), Err(PoolError::UnalignedBlockSize { .. })));
    assert!(matches!(Pool::new(650, 64), Err(PoolError::TotalSizeNotMultiple { .. })));
    assert!(matches!(Pool::new(0, 64), Err(PoolError::NoBlocks { .. })));

    let pool = Pool::new(640, 64).unwrap();
    assert_eq!(pool.block_count(), 10);
    assert_eq!(pool.total_size(), 640);
    assert_eq!(pool.payload_capacity(), 56);
    assert_eq!(pool.free_block_count(), 10);
    assert_eq!(pool.used_block_count(), 0);
  }

  #[test]
  fn test_pool_ids_are_distinct() {
    let first = Pool::new(64, 64).unwrap();
    let second = Pool::new(64, 64).unwrap();
    assert_ne!(first.id(), 0);
    assert_ne!(first.id(), second.id());
  }

  #[test]
  fn test_allocation_lies_in_arena() {
    let mut pool = Pool::new(640, 64).unwrap();
    let base = pool.arena.base() as usize;

    let addresses = allocate_n(&mut pool, 10);

    for address in &addresses {
      let block = block_of(*address);
      assert!(pool.is_valid_pool_pointer(block));

      let offset = block as usize - base;
      assert!(offset < pool.total_size());
      assert_eq!(offset % pool.block_size(), 0);
      assert_eq!(address.as_ptr() as usize % 8, 0);
    }

    release_all(&mut pool, addresses);
  }

  #[test]
  fn test_payload_is_writable_without_touching_neighbours() {
    let mut pool = Pool::new(256, 64).unwrap();
    let addresses = allocate_n(&mut pool, 4);

    unsafe { addresses[0].as_ptr().write_bytes(0xFF, pool.payload_capacity()) };

    for address in &addresses[1..] {
      assert!(pool.is_valid_pool_pointer(block_of(*address)));
    }

    release_all(&mut pool, addresses);
    assert_eq!(pool.used_block_count(), 0);
  }

  #[test]
  fn test_used_count_tracks_allocations() {
    let mut pool = Pool::new(512, 64).unwrap();

    let mut live = allocate_n(&mut pool, 6);
    assert_eq!(pool.used_block_count(), 6);

    for _ in 0..2 {
      pool.deallocate(live.pop().unwrap().as_ptr()).unwrap();
    }
    assert_eq!(pool.used_block_count(), 4);

    live.extend(allocate_n(&mut pool, 4));
    assert_eq!(pool.used_block_count(), 8);
    assert!(pool.allocate(8).unwrap().is_none());
    assert_eq!(pool.used_block_count(), pool.block_count());

    release_all(&mut pool, live);
  }

  #[test]
  fn test_round_trip_restores_state() {
    let mut pool = Pool::new(640, 64).unwrap();
    let kept = allocate_n(&mut pool, 3);
    let before = pool.stats();

    let address = pool.allocate(56).unwrap().unwrap();
    pool.deallocate(address.as_ptr()).unwrap();

    assert_eq!(pool.stats(), before);
    assert_eq!(pool.bitmap.count_ones(), 3);

    let again = pool.allocate(1).unwrap().unwrap();
    assert_eq!(again, address);

    pool.deallocate(again.as_ptr()).unwrap();
    release_all(&mut pool, kept);
  }

  #[test]
  fn test_lifo_reuse() {
    let mut pool = Pool::new(640, 64).unwrap();
    let addresses = allocate_n(&mut pool, 3);

    pool.deallocate(addresses[0].as_ptr()).unwrap();
    pool.deallocate(addresses[2].as_ptr()).unwrap();

    assert_eq!(pool.allocate(8).unwrap(), Some(addresses[2]));
    assert_eq!(pool.allocate(8).unwrap(), Some(addresses[0]));

    release_all(&mut pool, addresses);
  }

  #[test]
  fn test_oversized_request_rejected() {
    let mut pool = Pool::new(640, 64).unwrap();

    let error = pool.allocate(57).unwrap_err();
    assert!(matches!(
      error,
      PoolError::OversizedRequest {
        requested: 57,
        capacity: 56,
        ..
      }
    ));
    assert_eq!(pool.used_block_count(), 0);
  }

  #[test]
  fn test_single_block_exhaustion() {
    let mut pool = Pool::new(64, 64).unwrap();

    let first = pool.allocate(8).unwrap().unwrap();
    assert!(pool.is_exhausted());
    assert!(pool.allocate(8).unwrap().is_none());

    pool.deallocate(first.as_ptr()).unwrap();
    assert!(pool.allocate(8).unwrap().is_some_and(|again| again == first));
    pool.deallocate(first.as_ptr()).unwrap();
  }

  #[test]
  fn test_double_free_detected() {
    let mut pool = Pool::new(640, 64).unwrap();
    let address = pool.allocate(8).unwrap().unwrap();
    let other = pool.allocate(8).unwrap().unwrap();

    pool.deallocate(address.as_ptr()).unwrap();
    let error = pool.deallocate(address.as_ptr()).unwrap_err();
    assert!(matches!(error, PoolError::DoubleFree { index: 0, .. }));

    assert_eq!(pool.used_block_count(), 1);
    assert_eq!(pool.free_block_count(), 9);
    assert_eq!(pool.allocate(8).unwrap(), Some(address));
    let third = pool.allocate(8).unwrap().unwrap();
    assert_ne!(third, address);
    assert_ne!(third, other);

    release_all(&mut pool, [address, other, third]);
  }

  #[test]
  fn test_null_deallocate_is_noop() {
    let mut pool = Pool::new(640, 64).unwrap();
    pool.deallocate(std::ptr::null_mut()).unwrap();
    assert_eq!(pool.used_block_count(), 0);
  }

  #[test]
  fn test_rejects_pointer_outside_arena() {
    let mut pool = Pool::new(640, 64).unwrap();
    let mut local = [0u64; 4];
    let foreign = local.as_mut_ptr().cast::<u8>();

    assert!(!pool.is_valid_pool_pointer(foreign));
    assert!(!pool.is_valid_pool_pointer(pool.arena.base().wrapping_add(640)));
    assert!(!pool.is_valid_pool_pointer(std::ptr::null()));

    let error = pool.deallocate(foreign.wrapping_add(HEADER_SIZE)).unwrap_err();
    assert!(matches!(error, PoolError::InvalidPointer { .. }));
  }

  #[test]
  fn test_rejects_misaligned_pointer() {
    let mut pool = Pool::new(640, 64).unwrap();
    let address = pool.allocate(8).unwrap().unwrap();

    assert!(!pool.is_valid_pool_pointer(address.as_ptr()));
    assert!(!pool.is_valid_pool_pointer(block_of(address).wrapping_add(1)));
    assert!(pool.deallocate(address.as_ptr().wrapping_add(8)).is_err());
    assert_eq!(pool.used_block_count(), 1);

    pool.deallocate(address.as_ptr()).unwrap();
  }

  #[test]
  fn test_rejects_corrupted_header() {
    let mut pool = Pool::new(640, 64).unwrap();
    let address = pool.allocate(8).unwrap().unwrap();
    let block = block_of(address);
    let intact = unsafe { BlockHeader::read(block) };

    unsafe { BlockHeader { magic: 0, ..intact }.write(block) };
    assert!(!pool.is_valid_pool_pointer(block));
    assert!(matches!(
      pool.deallocate(address.as_ptr()),
      Err(PoolError::InvalidPointer { .. })
    ));

    unsafe {
      BlockHeader {
        pool_id: intact.pool_id.wrapping_add(1),
        ..intact
      }
      .write(block)
    };
    assert!(!pool.is_valid_pool_pointer(block));

    unsafe { intact.write(block) };
    assert!(pool.is_valid_pool_pointer(block));
    pool.deallocate(address.as_ptr()).unwrap();
  }

  #[test]
  fn test_contains_covers_whole_arena() {
    let pool = Pool::new(640, 64).unwrap();
    let base = pool.arena.base();

    assert!(pool.contains(base));
    assert!(pool.contains(base.wrapping_add(13)));
    assert!(pool.contains(base.wrapping_add(639)));
    assert!(!pool.contains(base.wrapping_add(640)));
    assert!(!pool.contains(base.wrapping_sub(1)));
  }

  #[test]
  fn test_rejects_other_pools_blocks() {
    let mut first = Pool::new(640, 64).unwrap();
    let second = Pool::new(640, 64).unwrap();
    let address = first.allocate(8).unwrap().unwrap();

    assert!(first.is_valid_pool_pointer(block_of(address)));
    assert!(!second.is_valid_pool_pointer(block_of(address)));

    first.deallocate(address.as_ptr()).unwrap();
  }

  #[test]
  fn test_fragmentation_contiguous() {
    let mut pool = Pool::new(640, 64).unwrap();
    let addresses = allocate_n(&mut pool, 5);

    // Blocks 0..5 in use: one transition over five blocks.
    let ratio = pool.fragmentation_ratio();
    assert!(ratio < 0.2, "contiguous ratio was {ratio}");

    release_all(&mut pool, addresses);
  }

  #[test]
  fn test_fragmentation_alternating() {
    let mut pool = Pool::new(640, 64).unwrap();
    let addresses = allocate_n(&mut pool, 10);

    for address in addresses.iter().skip(1).step_by(2) {
      pool.deallocate(address.as_ptr()).unwrap();
    }
    assert_eq!(pool.used_block_count(), 5);

    let ratio = pool.fragmentation_ratio();
    assert!(ratio > 0.8 && ratio <= 1.0, "alternating ratio was {ratio}");

    release_all(&mut pool, addresses.into_iter().step_by(2));
  }

  #[test]
  fn test_fragmentation_degenerate_cases() {
    let mut pool = Pool::new(256, 64).unwrap();
    assert_eq!(pool.fragmentation_ratio(), 0.0);

    let mut addresses = allocate_n(&mut pool, 1);
    assert_eq!(pool.fragmentation_ratio(), 0.0);

    addresses.extend(allocate_n(&mut pool, 3));
    assert_eq!(pool.fragmentation_ratio(), 0.0);

    release_all(&mut pool, addresses);
  }

  #[test]
  fn test_close_reports_leak() {
    let mut pool = Pool::new(640, 64).unwrap();
    let _leaked = pool.allocate(8).unwrap().unwrap();
    let pool_id = pool.id();

    let error = pool.close().unwrap_err();
    assert!(matches!(
      error,
      PoolError::Leak { pool_id: id, outstanding: 1 } if id == pool_id
    ));
  }

  #[test]
  fn test_close_clean() {
    let mut pool = Pool::new(640, 64).unwrap();
    let address = pool.allocate(8).unwrap().unwrap();
    pool.deallocate(address.as_ptr()).unwrap();
    pool.close().unwrap();
  }

  #[cfg(debug_assertions)]
  #[test]
  #[should_panic(expected = "outstanding blocks")]
  fn test_drop_with_outstanding_blocks_panics_in_debug() {
    let mut pool = Pool::new(640, 64).unwrap();
    let _leaked = pool.allocate(8).unwrap().unwrap();
    drop(pool);
  }
}
