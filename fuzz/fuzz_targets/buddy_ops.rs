#![no_main]

use arbitrary::Arbitrary;
use buddy_ledger::{AllocError, BuddyAllocator};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
enum BuddyOp {
    Allocate { order: u32 },
    Release { index: usize },
}

#[derive(Clone, Debug, Arbitrary)]
struct Args {
    max_level: u32,
    page_size_order: u32,
    ops: Vec<BuddyOp>,
}

fuzz_target!(|args: Args| {
    let max_level = args.max_level % 10;
    let page_size_order = args.page_size_order % 16;

    let mut buddy = match BuddyAllocator::new(max_level, page_size_order) {
        Ok(b) => b,
        Err(_) => return,
    };

    let mut page_used = vec![false; 1 << max_level];
    let mut outstanding = Vec::new();

    for op in args.ops {
        match op {
            BuddyOp::Allocate { order } => {
                let order = order % 12;

                match buddy.allocate(order) {
                    Ok(block) => {
                        assert_eq!(block.level(), max_level - order);
                        assert_eq!(block.offset() % buddy.block_size(&block), 0);

                        let first = block.offset() / buddy.page_size();
                        let count = buddy.block_size(&block) / buddy.page_size();
                        for page in &mut page_used[first..first + count] {
                            assert!(!*page, "overlapping allocation");
                            *page = true;
                        }

                        outstanding.push(block);
                    }
                    Err(AllocError::InvalidOrder) => assert!(order > max_level),
                    Err(AllocError::Exhausted) => {}
                }
            }

            BuddyOp::Release { index } => {
                if outstanding.is_empty() {
                    continue;
                }

                let block = outstanding.swap_remove(index % outstanding.len());
                let first = block.offset() / buddy.page_size();
                let count = buddy.block_size(&block) / buddy.page_size();
                for page in &mut page_used[first..first + count] {
                    *page = false;
                }

                buddy.release(block);
            }
        }
    }

    // Returning everything must coalesce the arena back into one block.
    for block in outstanding.drain(..) {
        buddy.release(block);
    }
    let root = buddy.allocate(max_level).expect("arena failed to coalesce");
    assert_eq!(root.offset(), 0);
});
