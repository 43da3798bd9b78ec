//! Property-based tests for range tracking and part planning

use proptest::prelude::*;
use ossfs_core::*;

/// Reference model: one bool per byte
fn covered(writes: &[(u64, u64)], len: usize) -> Vec<bool> {
    let mut bytes = vec![false; len];
    for &(start, size) in writes {
        for b in &mut bytes[start as usize..(start + size) as usize] {
            *b = true;
        }
    }
    bytes
}

fn write_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0u64..900, 1u64..100), 1..40)
}

proptest! {
    #[test]
    fn props_tracker_yields_minimal_maximal_intervals(writes in write_strategy()) {
        let mut tracker = UntreatedTracker::new();
        for (tag, &(start, size)) in writes.iter().enumerate() {
            tracker.add(start as i64, size as i64, tag as u64).unwrap();
        }

        let ranges = tracker.list();

        // No two returned intervals overlap or touch
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].end() < pair[1].start);
        }

        // The union is exactly the written bytes
        let expected = covered(&writes, 1000);
        let actual = covered(
            &ranges.iter().map(|r| (r.start, r.size)).collect::<Vec<_>>(),
            1000,
        );
        prop_assert_eq!(expected, actual);
    }

    #[test]
    fn props_clear_removes_exactly_the_cleared_bytes(
        writes in write_strategy(),
        clear_start in 0u64..900,
        clear_size in 1u64..300,
    ) {
        let mut tracker = UntreatedTracker::new();
        for &(start, size) in &writes {
            tracker.add(start as i64, size as i64, 0).unwrap();
        }
        let cut = UntreatedRange::new(clear_start as i64, clear_size as i64, 0).unwrap();
        tracker.clear(&cut);

        let mut expected = covered(&writes, 1200);
        for b in &mut expected[clear_start as usize..(clear_start + clear_size) as usize] {
            *b = false;
        }
        let actual = covered(
            &tracker.list().iter().map(|r| (r.start, r.size)).collect::<Vec<_>>(),
            1200,
        );
        prop_assert_eq!(expected, actual);
    }

    #[test]
    fn props_plan_respects_part_bounds(
        writes in prop::collection::vec((0u64..5000, 1u64..800), 0..12),
        file_size in 1u64..6000,
        min in 50u64..400,
        extra in 0u64..600,
        allow_copy in any::<bool>(),
    ) {
        let mut tracker = UntreatedTracker::new();
        for &(start, size) in &writes {
            tracker.add(start as i64, size as i64, 0).unwrap();
        }
        let limits = PartLimits {
            min_part_size: min,
            max_part_size: min + extra,
            max_parts: 10_000,
            allow_copy,
        };

        let parts = plan(file_size, tracker.list(), &limits).unwrap();

        // Dense 1-based numbering in byte order, covering the whole file
        let mut cursor = 0;
        for (i, part) in parts.iter().enumerate() {
            prop_assert_eq!(part.part_number as usize, i + 1);
            prop_assert_eq!(part.offset, cursor);
            prop_assert!(part.size > 0);
            prop_assert!(part.size <= limits.max_part_size);
            if i + 1 < parts.len() {
                prop_assert!(part.size >= limits.min_part_size);
            }
            cursor = part.end();
        }
        prop_assert_eq!(cursor, file_size);

        // Dirty bytes are never satisfied by a copy
        for part in parts.iter().filter(|p| p.kind == PartKind::Copy) {
            prop_assert!(allow_copy);
            for r in tracker.list() {
                prop_assert!(r.end() <= part.offset || r.start >= part.end());
            }
        }
    }
}

#[test]
fn overlaps_rejects_invalid_arguments() {
    let range = UntreatedRange::new(0, 10, 0).unwrap();
    assert!(!range.overlaps(-1, 5));
    assert!(!range.overlaps(5, 0));
}

#[test]
fn chain_merge_collapses_to_one_range() {
    let mut tracker = UntreatedTracker::new();
    tracker.add(0, 10, 1).unwrap();
    tracker.add(20, 10, 2).unwrap();
    tracker.add(10, 10, 3).unwrap();

    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.list()[0].start, 0);
    assert_eq!(tracker.list()[0].size, 30);
}
