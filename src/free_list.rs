//! LIFO chain of free block indices.
//!
//! Links live in a side array indexed by block rather than inside the free
//! blocks themselves, so payload bytes are never reinterpreted as pointers.

/// Terminates the chain.
const END: u32 = u32::MAX;

/// Largest number of blocks a list can link.
pub const MAX_BLOCKS: usize = END as usize;

#[derive(Debug)]
pub struct FreeList {
  next: Box<[u32]>,
  head: u32,
  len: usize,
}

impl FreeList {
  /// Links every block so that index 0 is popped first, then 1, and so on.
  pub fn new(block_count: usize) -> Self {
    assert!(block_count <= MAX_BLOCKS, "free list cannot index {block_count} blocks");

    let next: Box<[u32]> = (1..=block_count)
      .map(|successor| if successor == block_count { END } else { successor as u32 })
      .collect();

    Self {
      next,
      head: if block_count == 0 { END } else { 0 },
      len: block_count,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.head == END
  }

  /// Removes and returns the most recently pushed block.
  #[inline]
  pub fn pop(&mut self) -> Option<usize> {
    if self.head == END {
      return None;
    }

    let index = self.head as usize;
    self.head = self.next[index];
    self.next[index] = END;
    self.len -= 1;

    Some(index)
  }

  #[inline]
  pub fn push(
    &mut self,
    index: usize,
  ) {
    debug_assert!(index < self.next.len());
    self.next[index] = self.head;
    self.head = index as u32;
    self.len += 1;
  }
}
