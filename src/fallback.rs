use libc::{c_void, free, malloc};

/// General purpose allocator behind the pools.
///
/// Serves requests no pool can hold, requests made while the manager is not
/// initialized, and requests whose pool is exhausted.
pub trait FallbackAllocator {
  /// Returns null when the allocator itself is out of memory.
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8;

  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by [`FallbackAllocator::allocate`]
  /// on this same allocator.
  unsafe fn deallocate(
    &self,
    address: *mut u8,
  );
}

/// The C library heap (`malloc`/`free`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl FallbackAllocator for SystemAllocator {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    // malloc(0) may return null; keep zero-sized requests distinct and non-null.
    unsafe { malloc(size.max(1)) as *mut u8 }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    unsafe { free(address as *mut c_void) }
  }
}
