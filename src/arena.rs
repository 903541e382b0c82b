use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use crate::block::CACHE_LINE_SIZE;

/// Owns one zeroed, cache-line aligned buffer and releases it on drop.
pub struct Arena {
  base: NonNull<u8>,
  layout: Layout,
}

impl Arena {
  /// Aborts through [`alloc::handle_alloc_error`] if the system is out of memory.
  pub fn new(size: usize) -> Self {
    assert!(size > 0, "arena must not be empty");

    let layout = match Layout::from_size_align(size, CACHE_LINE_SIZE) {
      Ok(layout) => layout,
      Err(_) => panic!("arena of {size} bytes exceeds the address space"),
    };

    let raw = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(raw) else {
      alloc::handle_alloc_error(layout);
    };

    Self { base, layout }
  }

  #[inline]
  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.layout.size()
  }

  /// Byte offset of `address` from the start of the arena, if it lies inside it.
  #[inline]
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    let start = self.base() as usize;
    let address = address as usize;

    if address < start || address >= start + self.size() {
      return None;
    }

    Some(address - start)
  }

  /// Pointer `offset` bytes into the arena.
  ///
  /// # Safety
  ///
  /// `offset` must be less than [`Arena::size`].
  #[inline]
  pub unsafe fn at(
    &self,
    offset: usize,
  ) -> *mut u8 {
    debug_assert!(offset < self.size());
    unsafe { self.base().add(offset) }
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
  }
}
