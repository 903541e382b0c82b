use tracing::{debug, error, trace, warn};

use crate::{
  block::HEADER_SIZE,
  config::{ManagerConfig, SizeClass},
  error::Result,
  fallback::{FallbackAllocator, SystemAllocator},
  pool::{Pool, PoolStats},
};

/// Point-in-time view of a manager, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManagerStats {
  /// Empty while the manager is not initialized.
  pub pools: Vec<(SizeClass, PoolStats)>,
  pub fallback_allocations: u64,
  pub fallback_deallocations: u64,
}

/// Routes allocations across three size-classed [`Pool`]s.
///
/// A request goes to the smallest class whose block fits the request plus its
/// header. Requests no class can hold, requests arriving while the manager is
/// not initialized, and requests whose class is exhausted go to the fallback
/// allocator instead; the caller cannot tell the difference.
///
/// ```text
///   allocate(size)
///        │
///        ├── not initialized ────────────────────────┐
///        ├── size + header > every block ────────────┤
///        ▼                                           ▼
///   small (64) ─► medium (256) ─► large (1024)     fallback
///   first class that fits                          (malloc)
///        │
///        └── class exhausted ───────────────────────► fallback
/// ```
///
/// Deallocation probes the pools in the same order and hands the pointer to
/// the first one that recognises it. A pointer outside every arena is returned
/// to the fallback allocator; one inside an arena that no pool recognises is a
/// fatal error.
///
/// A manager is an ordinary value: build one per subsystem (or per thread) and
/// pass it where it is needed. Not thread-safe.
pub struct PoolManager<F: FallbackAllocator = SystemAllocator> {
  config: ManagerConfig,
  pools: Option<[Pool; 3]>,
  fallback: F,
  fallback_allocations: u64,
  fallback_deallocations: u64,
}

impl PoolManager {
  pub fn new(config: ManagerConfig) -> Self {
    Self::with_fallback(config, SystemAllocator)
  }
}

impl Default for PoolManager {
  fn default() -> Self {
    Self::new(ManagerConfig::default())
  }
}

impl<F: FallbackAllocator> PoolManager<F> {
  /// Creates an uninitialized manager; every request uses `fallback` until
  /// [`PoolManager::initialize`] is called.
  pub fn with_fallback(
    config: ManagerConfig,
    fallback: F,
  ) -> Self {
    Self {
      config,
      pools: None,
      fallback,
      fallback_allocations: 0,
      fallback_deallocations: 0,
    }
  }

  pub fn config(&self) -> &ManagerConfig {
    &self.config
  }

  pub fn fallback(&self) -> &F {
    &self.fallback
  }

  #[inline]
  pub fn is_initialized(&self) -> bool {
    self.pools.is_some()
  }

  /// Builds the three pools. Calling it again while initialized does nothing.
  pub fn initialize(&mut self) -> Result<()> {
    if self.is_initialized() {
      return Ok(());
    }

    self.config.validate()?;

    let pools = [
      Pool::with_config(self.config.small)?,
      Pool::with_config(self.config.medium)?,
      Pool::with_config(self.config.large)?,
    ];

    debug!(
      small = pools[0].block_size(),
      medium = pools[1].block_size(),
      large = pools[2].block_size(),
      "pool manager initialized"
    );

    self.pools = Some(pools);
    Ok(())
  }

  /// Releases all three pools. Calling it while not initialized does nothing.
  ///
  /// Every pool is released even if some still have outstanding blocks; the
  /// first such leak is returned.
  pub fn shutdown(&mut self) -> Result<()> {
    let Some(pools) = self.pools.take() else {
      return Ok(());
    };

    let mut result = Ok(());

    for (class, pool) in SizeClass::ALL.into_iter().zip(pools) {
      if let Err(leak) = pool.close() {
        error!(%class, %leak, "size class leaked at shutdown");
        if result.is_ok() {
          result = Err(leak);
        }
      }
    }

    debug!(
      fallback_allocations = self.fallback_allocations,
      fallback_deallocations = self.fallback_deallocations,
      "pool manager shut down"
    );

    result
  }

  /// Smallest class whose block holds `size` bytes plus a header.
  pub fn select_pool_for_size(
    &self,
    size: usize,
  ) -> Option<SizeClass> {
    let required = size.checked_add(HEADER_SIZE)?;

    SizeClass::ALL
      .into_iter()
      .find(|&class| required <= self.config.get(class).block_size)
  }

  /// Returns `size` usable bytes, 8-byte aligned.
  ///
  /// Only returns null if the fallback allocator is out of memory. A zero
  /// `size` is served like any other request and yields a unique pointer.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if let Some(class) = self.select_pool_for_size(size)
      && let Some(pools) = self.pools.as_mut()
    {
      match pools[class.index()].allocate(size) {
        Ok(Some(address)) => return address.as_ptr(),
        Ok(None) => warn!(%class, size, "size class exhausted, using fallback"),
        Err(error) => unreachable!("{class} pool cannot hold a request routed to it: {error}"),
      }
    } else {
      trace!(size, initialized = self.is_initialized(), "request bypasses the pools");
    }

    self.allocate_fallback(size)
  }

  /// Returns `address` to whichever allocator produced it. Null is ignored.
  ///
  /// # Panics
  ///
  /// If a pool recognises the block but it is already free, or if `address`
  /// lies inside a pool's arena without passing that pool's checks (a
  /// misaligned pointer or a damaged header). Such a pointer is never handed
  /// to the fallback allocator.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by
  /// [`PoolManager::allocate`] on this manager. Pointers the pools do not
  /// recognise are handed to the fallback allocator as is.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    if let Some(class) = self.owner_of(address)
      && let Some(pools) = self.pools.as_mut()
    {
      if let Err(error) = pools[class.index()].deallocate(address) {
        error!(%class, %error, "rejected deallocation");
        panic!("{class} pool rejected deallocation: {error}");
      }
      return;
    }

    if let Some(class) = self.arena_holding(address) {
      error!(%class, ?address, "pointer into pool arena failed validation");
      panic!("{class} pool arena holds {address:?} but it is not a live block");
    }

    trace!(?address, "returning pointer to fallback");
    unsafe { self.fallback.deallocate(address) };
    self.fallback_deallocations += 1;
  }

  /// The class whose pool handed out `address`, if any.
  pub fn owner_of(
    &self,
    address: *const u8,
  ) -> Option<SizeClass> {
    let pools = self.pools.as_ref()?;
    let block = address.wrapping_sub(HEADER_SIZE);

    SizeClass::ALL
      .into_iter()
      .find(|class| pools[class.index()].is_valid_pool_pointer(block))
  }

  /// The class whose arena spans `address`, valid block or not.
  fn arena_holding(
    &self,
    address: *const u8,
  ) -> Option<SizeClass> {
    let pools = self.pools.as_ref()?;

    SizeClass::ALL
      .into_iter()
      .find(|class| pools[class.index()].contains(address))
  }

  pub fn pool(
    &self,
    class: SizeClass,
  ) -> Option<&Pool> {
    self.pools.as_ref().map(|pools| &pools[class.index()])
  }

  pub fn stats(&self) -> ManagerStats {
    let pools = self
      .pools
      .as_ref()
      .map(|pools| {
        SizeClass::ALL
          .into_iter()
          .map(|class| (class, pools[class.index()].stats()))
          .collect()
      })
      .unwrap_or_default();

    ManagerStats {
      pools,
      fallback_allocations: self.fallback_allocations,
      fallback_deallocations: self.fallback_deallocations,
    }
  }

  fn allocate_fallback(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    let address = self.fallback.allocate(size.max(1));

    if address.is_null() {
      error!(size, "fallback allocator out of memory");
    } else {
      self.fallback_allocations += 1;
    }

    address
  }
}

impl<F: FallbackAllocator> Drop for PoolManager<F> {
  fn drop(&mut self) {
    if let Err(error) = self.shutdown() {
      error!(%error, "pool manager dropped with outstanding allocations");

      if cfg!(debug_assertions) && !std::thread::panicking() {
        panic!("pool manager dropped with outstanding allocations: {error}");
      }
    }
  }
}
