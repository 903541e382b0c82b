//! Packed per-block occupancy bits, 1 = allocated.

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug)]
pub struct Bitmap {
  words: Box<[u64]>,
  len: usize,
}

impl Bitmap {
  /// All bits start cleared.
  pub fn new(len: usize) -> Self {
    let words = vec![0u64; len.div_ceil(WORD_BITS)].into_boxed_slice();
    Self { words, len }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn get(
    &self,
    index: usize,
  ) -> bool {
    debug_assert!(index < self.len);
    self.words[index / WORD_BITS] & Self::mask(index) != 0
  }

  #[inline]
  pub fn set(
    &mut self,
    index: usize,
  ) {
    debug_assert!(index < self.len);
    self.words[index / WORD_BITS] |= Self::mask(index);
  }

  #[inline]
  pub fn clear(
    &mut self,
    index: usize,
  ) {
    debug_assert!(index < self.len);
    self.words[index / WORD_BITS] &= !Self::mask(index);
  }

  pub fn count_ones(&self) -> usize {
    self.words.iter().map(|word| word.count_ones() as usize).sum()
  }

  /// Number of positions `i` in `1..len` where bit `i` differs from bit `i - 1`.
  pub fn transitions(&self) -> usize {
    let mut transitions = 0;
    let mut previous = false;

    for index in 0..self.len {
      let current = self.get(index);
      if index > 0 && current != previous {
        transitions += 1;
      }
      previous = current;
    }

    transitions
  }

  #[inline]
  fn mask(index: usize) -> u64 {
    1u64 << (index % WORD_BITS)
  }
}
