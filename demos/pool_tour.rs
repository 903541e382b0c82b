use std::io::Read;

use rpool::{ManagerConfig, PoolConfig, PoolManager, SizeClass};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the process with tools like `pmap` or `gdb`
/// between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_alloc(
  manager: &PoolManager,
  size: usize,
  address: *mut u8,
) {
  let owner = match manager.owner_of(address) {
    Some(class) => class.to_string(),
    None => "fallback".to_string(),
  };

  println!("Allocated {size} bytes, address = {address:?}, served by = {owner}");
}

fn print_fragmentation(manager: &PoolManager) {
  for (class, stats) in manager.stats().pools {
    println!(
      "  {class:<6} used {:>3}/{:<3} fragmentation {:.2}",
      stats.used_blocks, stats.block_count, stats.fragmentation_ratio
    );
  }
}

fn main() {
  // Small capacities so the effects are easy to see.
  let config = ManagerConfig {
    small: PoolConfig::new(64 * 8, 64),
    medium: PoolConfig::new(256 * 4, 256),
    large: PoolConfig::new(1024 * 2, 1024),
  };

  let mut manager = PoolManager::new(config);

  // --------------------------------------------------------------------
  // 1) Before initialize every request goes to malloc.
  // --------------------------------------------------------------------
  let early = manager.allocate(32);
  println!("[1] Allocate before initialize");
  print_alloc(&manager, 32, early);
  unsafe { manager.deallocate(early) };

  manager.initialize().expect("demo configuration is valid");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) One request per class, plus one too large for any block.
  // --------------------------------------------------------------------
  println!("\n[2] Tiering");
  let mut live = Vec::new();
  for size in [50, 60, 500, 2000] {
    let address = manager.allocate(size);
    print_alloc(&manager, size, address);
    live.push(address);
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Fill the small class so the next small request spills over.
  // --------------------------------------------------------------------
  println!("\n[3] Exhausting the small class");
  let mut smalls = Vec::new();
  while let Some(pool) = manager.pool(SizeClass::Small) {
    if pool.is_exhausted() {
      break;
    }
    smalls.push(manager.allocate(8));
  }
  let spill = manager.allocate(8);
  print_alloc(&manager, 8, spill);
  live.push(spill);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Free every other small block and look at fragmentation.
  // --------------------------------------------------------------------
  println!("\n[4] Fragmentation after freeing every other small block");
  let mut kept = Vec::new();
  for (i, address) in smalls.into_iter().enumerate() {
    if i % 2 == 0 {
      unsafe { manager.deallocate(address) };
    } else {
      kept.push(address);
    }
  }
  print_fragmentation(&manager);

  // A freed block is reused first.
  let reused = manager.allocate(8);
  print_alloc(&manager, 8, reused);
  kept.push(reused);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Release everything and shut down cleanly.
  // --------------------------------------------------------------------
  for address in live.into_iter().chain(kept) {
    unsafe { manager.deallocate(address) };
  }

  let stats = manager.stats();
  println!(
    "\n[5] fallback allocations = {}, fallback frees = {}",
    stats.fallback_allocations, stats.fallback_deallocations
  );

  match manager.shutdown() {
    Ok(()) => println!("[5] Shut down with no outstanding blocks."),
    Err(error) => println!("[5] Shutdown reported: {error}"),
  }
}
