//! Size-class layout for the pools a [`PoolManager`](crate::PoolManager) builds.
//!
//! The defaults match the deployed layout:
//!
//! ```text
//!   class    block    arena    blocks
//!   small     64 B    2 MiB    32768
//!   medium   256 B    1 MiB     4096
//!   large   1024 B    1 MiB     1024
//! ```
//!
//! Any of them can be overridden from TOML:
//!
//! ```toml
//! [small]
//! total_size = 65536
//! block_size = 64
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  align::is_aligned,
  align_to,
  block::{BLOCK_ALIGN, CACHE_LINE_SIZE, HEADER_SIZE, MIN_BLOCK_SIZE},
  error::{PoolError, Result},
  free_list::MAX_BLOCKS,
};

/// Largest arena the allocator can lay out at cache-line alignment.
pub const MAX_ARENA_SIZE: usize = isize::MAX as usize - (CACHE_LINE_SIZE - 1);

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
  Small,
  Medium,
  Large,
}

impl SizeClass {
  /// In increasing block size order, the order pools are tried in.
  pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

  #[inline]
  pub const fn index(self) -> usize {
    self as usize
  }

  pub const fn name(self) -> &'static str {
    match self {
      SizeClass::Small => "small",
      SizeClass::Medium => "medium",
      SizeClass::Large => "large",
    }
  }
}

impl fmt::Display for SizeClass {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Arena size and block size of one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
  pub total_size: usize,
  pub block_size: usize,
}

impl PoolConfig {
  pub const fn new(
    total_size: usize,
    block_size: usize,
  ) -> Self {
    Self { total_size, block_size }
  }

  /// Smallest legal block holding `payload` bytes, repeated `block_count` times.
  pub fn for_payload(
    payload: usize,
    block_count: usize,
  ) -> Self {
    let block_size = align_to!(HEADER_SIZE + payload, BLOCK_ALIGN).max(MIN_BLOCK_SIZE);
    Self::new(block_size * block_count, block_size)
  }

  #[inline]
  pub const fn block_count(&self) -> usize {
    self.total_size / self.block_size
  }

  /// Largest request a block of this pool can hold.
  #[inline]
  pub const fn payload_capacity(&self) -> usize {
    self.block_size.saturating_sub(HEADER_SIZE)
  }

  /// Checks the layout a [`Pool`](crate::Pool) requires.
  pub fn validate(&self) -> Result<()> {
    let &Self { total_size, block_size } = self;

    if block_size < MIN_BLOCK_SIZE {
      return Err(PoolError::BlockTooSmall {
        block_size,
        min: MIN_BLOCK_SIZE,
      });
    }

    if !is_aligned(block_size, BLOCK_ALIGN) {
      return Err(PoolError::UnalignedBlockSize {
        block_size,
        alignment: BLOCK_ALIGN,
      });
    }

    if total_size % block_size != 0 {
      return Err(PoolError::TotalSizeNotMultiple { total_size, block_size });
    }

    if total_size > MAX_ARENA_SIZE {
      return Err(PoolError::ArenaTooLarge {
        total_size,
        max: MAX_ARENA_SIZE,
      });
    }

    let block_count = self.block_count();
    if block_count == 0 {
      return Err(PoolError::NoBlocks { total_size });
    }
    if block_count > MAX_BLOCKS {
      return Err(PoolError::TooManyBlocks {
        block_count,
        max: MAX_BLOCKS,
      });
    }

    Ok(())
  }
}

/// The three size classes a manager serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
  pub small: PoolConfig,
  pub medium: PoolConfig,
  pub large: PoolConfig,
}

impl Default for ManagerConfig {
  fn default() -> Self {
    Self {
      small: PoolConfig::new(2 * MIB, 64),
      medium: PoolConfig::new(MIB, 256),
      large: PoolConfig::new(MIB, KIB),
    }
  }
}

impl ManagerConfig {
  /// Parses and validates a TOML document. Missing classes keep their defaults.
  pub fn from_toml_str(source: &str) -> Result<Self> {
    let config: Self = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  pub fn get(
    &self,
    class: SizeClass,
  ) -> &PoolConfig {
    match class {
      SizeClass::Small => &self.small,
      SizeClass::Medium => &self.medium,
      SizeClass::Large => &self.large,
    }
  }

  /// Every pool must be valid and block sizes must strictly increase by class.
  pub fn validate(&self) -> Result<()> {
    let mut previous: Option<usize> = None;

    for class in SizeClass::ALL {
      let pool = self.get(class);
      pool.validate()?;

      if let Some(previous) = previous
        && pool.block_size <= previous
      {
        return Err(PoolError::SizeClassOrder {
          class,
          block_size: pool.block_size,
          previous,
        });
      }

      previous = Some(pool.block_size);
    }

    Ok(())
  }
}
