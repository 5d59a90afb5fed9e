use std::process::ExitCode;

use libc::sbrk;
use tagalloc::{Config, Heap, MemorySource, SbrkSource, logging};

const MAX: usize = 40;

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() -> ExitCode {
  // Set up logging and stdout before anchoring the heap, so their own
  // allocations do not move the break under it.
  logging::init_logging();
  print_program_break("start");

  let source = match SbrkSource::new() {
    Ok(source) => source,
    Err(err) => {
      eprintln!("cannot read the program break: {err}");
      return ExitCode::FAILURE;
    }
  };

  let mut heap = match Heap::with_config(source, Config::from_env()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("bad configuration: {err}");
      return ExitCode::FAILURE;
    }
  };

  // Allocate i and i + 1 bytes, keep the second, free the first.
  let mut malloc_size = 0;
  for i in (0..MAX).step_by(2) {
    let first = heap.allocate(i);
    let second = heap.allocate(i + 1);
    unsafe { heap.deallocate(first) };

    if second.is_null() {
      eprintln!("allocation of {} bytes failed", i + 1);
      return ExitCode::FAILURE;
    }
    malloc_size += i + 1;
  }

  print_program_break("end");
  println!(
    "malloc size: {}, heap size: {}",
    malloc_size,
    heap.source().heap_size()
  );

  let stats = heap.stats();
  println!(
    "blocks: {} ({} allocated, {} free), largest free block: {} bytes",
    stats.blocks, stats.allocated_blocks, stats.free_blocks, stats.largest_free
  );

  if heap.verify(true).is_consistent() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  }
}
