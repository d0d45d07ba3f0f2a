use proptest::prelude::*;
use shardrun::prelude::*;

fn lengths(chunks: &[&[u32]]) -> Vec<usize> {
    chunks.iter().map(|chunk| chunk.len()).collect()
}

#[test]
fn ten_items_over_four_workers() {
    let items: Vec<u32> = (1..=10).collect();
    let chunks = schedule(&items, 4).expect("schedule");
    assert_eq!(lengths(&chunks), [3, 3, 2, 2]);
    assert_eq!(chunks.concat(), items);
}

#[test]
fn no_items_over_three_workers() {
    let chunks = schedule::<u32>(&[], 3).expect("schedule");
    assert_eq!(lengths(&chunks), [0, 0, 0]);
}

#[test]
fn five_items_over_ten_workers() {
    let items = [10, 20, 30, 40, 50];
    let chunks = schedule(&items, 10).expect("schedule");
    assert_eq!(lengths(&chunks), [1, 1, 1, 1, 1, 0, 0, 0, 0, 0]);
}

#[test]
fn zero_workers() {
    assert!(matches!(
        schedule(&[1_u32, 2, 3], 0),
        Err(Error::Configuration { .. })
    ));
}

proptest! {
    #[test]
    fn one_chunk_per_worker(items in proptest::collection::vec(any::<u32>(), 0..512), workers in 1usize..64) {
        let chunks = schedule(&items, workers).unwrap();
        prop_assert_eq!(chunks.len(), workers);
        prop_assert_eq!(chunks.iter().map(|chunk| chunk.len()).sum::<usize>(), items.len());
    }

    #[test]
    fn loads_differ_by_at_most_one(len in 0usize..2048, workers in 1usize..128) {
        let items: Vec<usize> = (0..len).collect();
        let chunks = schedule(&items, workers).unwrap();
        let max = chunks.iter().map(|chunk| chunk.len()).max().unwrap();
        let min = chunks.iter().map(|chunk| chunk.len()).min().unwrap();
        prop_assert!(max - min <= 1);
        // Longer chunks always come first.
        prop_assert!(chunks.windows(2).all(|pair| pair[0].len() >= pair[1].len()));
    }

    #[test]
    fn concatenation_reproduces_items(items in proptest::collection::vec(any::<u32>(), 0..512), workers in 1usize..64) {
        let chunks = schedule(&items, workers).unwrap();
        prop_assert_eq!(chunks.concat(), items);
    }

    #[test]
    fn schedule_is_idempotent(items in proptest::collection::vec(any::<u32>(), 0..256), workers in 1usize..32) {
        let first = schedule(&items, workers).unwrap();
        let second = EqualShare.schedule(&items, workers).unwrap();
        prop_assert_eq!(first, second);
    }
}
