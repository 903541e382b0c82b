/// Rounds `value` up to the machine word alignment.
///
/// # Examples
///
/// ```rust
/// use rpool::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
///
/// ```rust
/// use rpool::align_to;
///
/// assert_eq!(align_to!(60 + 8, 8), 72);
/// assert_eq!(align_to!(64, 64), 64);
/// assert_eq!(align_to!(65, 64), 128);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Whether `value` is a multiple of `alignment` (power of two).
#[inline]
pub const fn is_aligned(
  value: usize,
  alignment: usize,
) -> bool {
  value & (alignment - 1) == 0
}
