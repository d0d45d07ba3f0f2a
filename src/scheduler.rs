//! Partitioning of a work set into per-worker chunks.
//!
//! The default strategy, [`EqualShare`], hands out contiguous slices whose
//! lengths differ by at most one. When the items don't divide evenly, the
//! first `len % workers` chunks each take one extra item. Any other strategy
//! can be plugged into a [`Runner`] by implementing [`Scheduler`]; the runner
//! refuses to start if a scheduler returns more chunks than workers.
//!
//! [`Runner`]: crate::runner::Runner

use std::ops::Deref;

use crate::error::{Error, Result};

// -----------------------------------------------------------------------------
// Scheduler

/// A partitioning strategy.
pub trait Scheduler {
    /// Splits `items` into chunks, one per worker. Implementations should
    /// return at most `workers` chunks; the runner treats anything more as
    /// [`Error::TooManyTasks`]. An empty chunk tells the runner that no later
    /// chunk holds work.
    fn schedule<'a, T>(&self, items: &'a [T], workers: usize) -> Result<Vec<&'a [T]>>;
}

/// The equal-share strategy with remainder front-loading. See [`schedule`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqualShare;

impl Scheduler for EqualShare {
    #[inline]
    fn schedule<'a, T>(&self, items: &'a [T], workers: usize) -> Result<Vec<&'a [T]>> {
        schedule(items, workers)
    }
}

/// Splits `items` into exactly `workers` contiguous chunks.
///
/// With `base = len / workers` and `remainder = len % workers`, chunk `i` has
/// `base + 1` items when `i < remainder` and `base` items otherwise, so no two
/// chunks differ in length by more than one. When there are fewer items than
/// workers the trailing chunks are empty.
///
/// ```
/// let items: Vec<u32> = (1..=10).collect();
/// let chunks = shardrun::scheduler::schedule(&items, 4)?;
/// assert_eq!(chunks, [&[1, 2, 3][..], &[4, 5, 6], &[7, 8], &[9, 10]]);
/// # Ok::<(), shardrun::Error>(())
/// ```
///
/// Fails with [`Error::Configuration`] when `workers` is zero.
pub fn schedule<T>(items: &[T], workers: usize) -> Result<Vec<&[T]>> {
    if workers == 0 {
        return Err(Error::config("worker count must be positive"));
    }

    let base = items.len() / workers;
    let remainder = items.len() % workers;

    let mut chunks = Vec::with_capacity(workers);
    let mut rest = items;
    for index in 0..workers {
        let len = if index < remainder { base + 1 } else { base };
        let (chunk, tail) = rest.split_at(len);
        chunks.push(chunk);
        rest = tail;
    }
    debug_assert!(rest.is_empty());

    Ok(chunks)
}

// -----------------------------------------------------------------------------
// Chunk

/// The owned share of the work set handed to one worker, along with its
/// position in the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    index: usize,
    items: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn new(index: usize, items: Vec<T>) -> Chunk<T> {
        Chunk { index, items }
    }

    /// The position of this chunk in the schedule. Chunk `i` always runs on
    /// the `i`-th spawned unit.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Deref for Chunk<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> IntoIterator for Chunk<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Chunk<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths<T>(chunks: &[&[T]]) -> Vec<usize> {
        chunks.iter().map(|chunk| chunk.len()).collect()
    }

    #[test]
    fn remainder_goes_to_leading_chunks() {
        let items: Vec<u32> = (1..=10).collect();
        let chunks = schedule(&items, 4).unwrap();
        assert_eq!(lengths(&chunks), [3, 3, 2, 2]);
        assert_eq!(chunks[0], [1, 2, 3]);
        assert_eq!(chunks[1], [4, 5, 6]);
        assert_eq!(chunks[2], [7, 8]);
        assert_eq!(chunks[3], [9, 10]);
    }

    #[test]
    fn empty_work_set_gives_empty_chunks() {
        let items: Vec<u32> = Vec::new();
        let chunks = schedule(&items, 3).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.is_empty()));
    }

    #[test]
    fn fewer_items_than_workers() {
        let items = [1, 2, 3, 4, 5];
        let chunks = schedule(&items, 10).unwrap();
        assert_eq!(lengths(&chunks), [1, 1, 1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn even_split() {
        let items: Vec<usize> = (0..12).collect();
        let chunks = schedule(&items, 3).unwrap();
        assert_eq!(lengths(&chunks), [4, 4, 4]);
    }

    #[test]
    fn single_worker_takes_everything() {
        let items = ["a", "b", "c"];
        assert_eq!(schedule(&items, 1).unwrap(), [&items[..]]);
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        let err = schedule(&[1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        let err = EqualShare.schedule(&[1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn chunk_exposes_index_and_items() {
        let chunk = Chunk::new(2, vec![7, 8]);
        assert_eq!(chunk.index(), 2);
        assert_eq!(chunk.len(), 2);
        assert_eq!((&chunk).into_iter().sum::<i32>(), 15);
        assert_eq!(chunk.into_items(), [7, 8]);
    }
}
