use std::ptr::NonNull;

use proptest::prelude::*;
use tagalloc::{ArenaSource, Heap, MemorySource};

#[derive(Debug, Clone)]
enum Op {
  Alloc(usize),
  Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (0usize..600).prop_map(Op::Alloc),
    1 => (4096usize..9000).prop_map(Op::Alloc),
    3 => any::<usize>().prop_map(Op::Free),
  ]
}

struct Live {
  ptr: NonNull<u8>,
  requested: usize,
  fill: u8,
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(128))]

  #[test]
  fn random_sequences_keep_the_heap_consistent(ops in prop::collection::vec(op(), 1..120)) {
    let mut heap = Heap::new(ArenaSource::with_capacity(1 << 22).unwrap());
    let mut live: Vec<Live> = Vec::new();
    let mut heap_size = 0;

    for (step, op) in ops.into_iter().enumerate() {
      match op {
        Op::Alloc(size) => {
          let before: Vec<_> = heap.blocks().collect();
          let ptr = heap.allocate(size);

          if size == 0 {
            prop_assert!(ptr.is_null());
            prop_assert_eq!(heap.blocks().collect::<Vec<_>>(), before);
            continue;
          }

          let ptr = NonNull::new(ptr).expect("arena is large enough");
          prop_assert_eq!(ptr.as_ptr() as usize % 8, 0);
          let usable = unsafe { heap.usable_size(ptr) };
          prop_assert!(usable >= size);

          let fill = step as u8;
          unsafe { ptr.as_ptr().write_bytes(fill, size) };
          live.push(Live { ptr, requested: size, fill });
        }
        Op::Free(index) => {
          if live.is_empty() {
            unsafe { heap.deallocate(std::ptr::null_mut()) };
            continue;
          }
          let freed = live.swap_remove(index % live.len());
          unsafe { heap.deallocate(freed.ptr.as_ptr()) };

          let blocks: Vec<_> = heap.blocks().collect();
          for pair in blocks.windows(2) {
            prop_assert!(pair[0].allocated || pair[1].allocated);
          }
        }
      }

      let report = heap.check();
      prop_assert!(report.is_consistent(), "{}", report);

      prop_assert!(heap.source().heap_size() >= heap_size);
      heap_size = heap.source().heap_size();

      // Every live allocation still holds its own fill pattern, which also
      // rules out overlapping ranges.
      for allocation in &live {
        let bytes = unsafe {
          std::slice::from_raw_parts(allocation.ptr.as_ptr(), allocation.requested)
        };
        prop_assert!(bytes.iter().all(|&b| b == allocation.fill));
      }
    }

    let mut ranges: Vec<(usize, usize)> = live
      .iter()
      .map(|a| {
        let start = a.ptr.as_ptr() as usize;
        (start, start + unsafe { heap.usable_size(a.ptr) })
      })
      .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
      prop_assert!(pair[0].1 <= pair[1].0);
    }
  }
}
