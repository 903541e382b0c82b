use std::{mem, ptr};

use crate::align;

/// Sentinel stored in every block header, checked before a block is released.
pub const MAGIC_NUMBER: u32 = 0xDEAD_BEEF;

/// Size in bytes of the header prefixed to every block.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Smallest legal block: a header plus room for one pointer.
pub const MIN_BLOCK_SIZE: usize = align!(HEADER_SIZE + mem::size_of::<usize>());

/// Every block size must be a multiple of this.
pub const BLOCK_ALIGN: usize = 8;

/// Alignment of each pool arena.
pub const CACHE_LINE_SIZE: usize = 64;

/// Metadata at the start of every block.
///
/// `magic` and `pool_id` are written once when the pool is built; only
/// `allocation_flag` changes afterwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
  pub magic: u32,
  pub pool_id: u16,
  pub allocation_flag: u8,
  pub padding: u8,
}

const _: () = assert!(mem::size_of::<BlockHeader>() == 8);
const _: () = assert!(HEADER_SIZE % BLOCK_ALIGN == 0);

impl BlockHeader {
  pub const FREE: u8 = 0;
  pub const ALLOCATED: u8 = 1;

  pub fn new(pool_id: u16) -> Self {
    Self {
      magic: MAGIC_NUMBER,
      pool_id,
      allocation_flag: Self::FREE,
      padding: 0,
    }
  }

  #[inline]
  pub fn is_allocated(&self) -> bool {
    self.allocation_flag == Self::ALLOCATED
  }

  /// Reads the header stored at `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to at least `HEADER_SIZE` readable bytes.
  #[inline]
  pub unsafe fn read(block: *const u8) -> Self {
    unsafe { ptr::read_unaligned(block.cast::<BlockHeader>()) }
  }

  /// # Safety
  ///
  /// `block` must point to at least `HEADER_SIZE` writable bytes.
  #[inline]
  pub unsafe fn write(
    self,
    block: *mut u8,
  ) {
    unsafe { ptr::write_unaligned(block.cast::<BlockHeader>(), self) }
  }

  /// Overwrites only the allocation flag of the header at `block`.
  ///
  /// # Safety
  ///
  /// Same as [`BlockHeader::write`].
  #[inline]
  pub unsafe fn set_flag(
    block: *mut u8,
    flag: u8,
  ) {
    unsafe {
      let field = block.add(mem::offset_of!(BlockHeader, allocation_flag));
      field.write(flag);
    }
  }
}
