//! # rpool - A Size-Classed Pool Allocator Library
//!
//! This crate provides a **fixed-size block pool allocator** for workloads whose
//! allocation sizes are known in advance. Requests are served from pre-built
//! arenas of equal-size blocks instead of a general purpose heap, which keeps
//! allocation O(1) and stops small objects from fragmenting the heap.
//!
//! ## Overview
//!
//! ```text
//!   Pool Manager:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          PoolManager                                 │
//!   │                                                                      │
//!   │   small  ┌──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┬──┐  64 B     │
//!   │          └──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┴──┘           │
//!   │   medium ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐  256 B    │
//!   │          └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘           │
//!   │   large  ┌───────────┬───────────┬───────────┬───────────┐  1 KiB    │
//!   │          └───────────┴───────────┴───────────┴───────────┘           │
//!   │                                                                      │
//!   │   anything else ───────────────────────────────► malloc / free       │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Each request goes to the smallest class that fits it.
//!   Allocate and free: O(1) - pop or push a free list.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header layout and constants
//!   ├── bitmap     - Per-block occupancy bits (internal)
//!   ├── free_list  - LIFO free list of block indices (internal)
//!   ├── arena      - Owned backing buffer of a pool (internal)
//!   ├── pool       - Pool: one size class
//!   ├── fallback   - FallbackAllocator trait, SystemAllocator
//!   ├── config     - PoolConfig, ManagerConfig, SizeClass
//!   ├── manager    - PoolManager: routing across size classes
//!   └── error      - PoolError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::{ManagerConfig, PoolManager, SizeClass};
//!
//! let mut manager = PoolManager::new(ManagerConfig::default());
//! manager.initialize().unwrap();
//!
//! // 100 bytes plus the header fits a 256 byte block.
//! let ptr = manager.allocate(100);
//! assert_eq!(manager.owner_of(ptr), Some(SizeClass::Medium));
//!
//! unsafe {
//!     ptr.write_bytes(0, 100);
//!     manager.deallocate(ptr);
//! }
//!
//! manager.shutdown().unwrap();
//! ```
//!
//! ## How It Works
//!
//! Every block starts with an 8 byte header:
//!
//! ```text
//!   Single Block (64 B class):
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ magic: DEADBEEF │  │  ┌──────────────────────────┐  │
//!   │  │ pool_id: u16    │  │  │                          │  │
//!   │  │ allocated: 0/1  │  │  │     56 bytes usable      │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │       8 bytes         │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! On free, the header is found by stepping back from the user pointer. A pool
//! only accepts it if it lies on a block boundary inside its arena and carries
//! the magic number and the pool's own identity; the allocation flag then
//! catches double frees. The manager uses the same check to find which pool,
//! if any, owns a pointer, and returns unclaimed pointers to the fallback.
//!
//! ## Features
//!
//! - **Constant time**: allocation and free pop/push a LIFO free list
//! - **Checked frees**: foreign pointers and double frees are rejected
//! - **Fragmentation metric**: bitmap-based 0.0 - 1.0 score per pool
//! - **Configurable classes**: block and arena sizes from code or TOML
//! - **Leak reporting**: pools released with live blocks report a [`PoolError::Leak`]
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed capacity**: Pools never grow or shrink; overflow goes to the fallback
//! - **8 byte alignment**: Payloads are aligned to 8 bytes, not more
//!
//! ## Safety
//!
//! Raw pointers cross the public boundary: using an allocation, and handing a
//! pointer back to [`PoolManager::deallocate`], is `unsafe`. Bookkeeping
//! inside a pool is index based and never dereferences caller memory.

pub mod align;
mod arena;
mod bitmap;
pub mod block;
pub mod config;
mod error;
pub mod fallback;
mod free_list;
mod manager;
mod pool;

pub use block::{BlockHeader, HEADER_SIZE, MAGIC_NUMBER};
pub use config::{ManagerConfig, PoolConfig, SizeClass};
pub use error::{PoolError, Result};
pub use fallback::{FallbackAllocator, SystemAllocator};
pub use manager::{ManagerStats, PoolManager};
pub use pool::{Pool, PoolStats};
