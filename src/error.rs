use thiserror::Error;

use crate::config::SizeClass;

#[derive(Debug, Error)]
pub enum PoolError {
  #[error("block size {block_size} is smaller than the minimum of {min} bytes")]
  BlockTooSmall { block_size: usize, min: usize },

  #[error("block size {block_size} is not a multiple of {alignment}")]
  UnalignedBlockSize { block_size: usize, alignment: usize },

  #[error("total size {total_size} is not a multiple of block size {block_size}")]
  TotalSizeNotMultiple { total_size: usize, block_size: usize },

  #[error("arena of {total_size} bytes exceeds the limit of {max}")]
  ArenaTooLarge { total_size: usize, max: usize },

  #[error("pool of {total_size} bytes holds no blocks")]
  NoBlocks { total_size: usize },

  #[error("pool of {block_count} blocks exceeds the limit of {max}")]
  TooManyBlocks { block_count: usize, max: usize },

  #[error("{class} block size {block_size} must be larger than the previous class ({previous})")]
  SizeClassOrder {
    class: SizeClass,
    block_size: usize,
    previous: usize,
  },

  #[error("request of {requested} bytes exceeds pool {pool_id} payload capacity of {capacity}")]
  OversizedRequest {
    pool_id: u16,
    requested: usize,
    capacity: usize,
  },

  #[error("pointer {address:#x} does not belong to pool {pool_id}")]
  InvalidPointer { pool_id: u16, address: usize },

  #[error("block {index} of pool {pool_id} is already free")]
  DoubleFree { pool_id: u16, index: usize },

  #[error("pool {pool_id} released with {outstanding} outstanding blocks")]
  Leak { pool_id: u16, outstanding: usize },

  #[error("invalid pool configuration: {0}")]
  Config(#[from] toml::de::Error),
}

impl PoolError {
  /// Whether this error comes from a bad pool layout rather than from usage.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::BlockTooSmall { .. }
        | Self::UnalignedBlockSize { .. }
        | Self::TotalSizeNotMultiple { .. }
        | Self::ArenaTooLarge { .. }
        | Self::NoBlocks { .. }
        | Self::TooManyBlocks { .. }
        | Self::SizeClassOrder { .. }
        | Self::Config(_)
    )
  }
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
