use std::iter::FusedIterator;

use crate::types::{AccessError, Result};

/// Upper bound on the rows reserved up front for a batch. Larger batches grow
/// as rows arrive.
const MAX_PREALLOCATED_ROWS: usize = 1024;

/// Groups a fallible item stream into fixed-size batches.
///
/// Created by [`stream_batches`].
#[derive(Debug)]
pub struct Batches<I> {
    items: I,
    size: usize,
    done: bool,
}

/// Groups `items` into consecutive batches of `batch_size`, the last batch
/// possibly shorter.
///
/// Only one batch is held at a time. An error from the underlying stream is
/// yielded in place of the batch being filled and ends iteration; rows already
/// gathered into that batch are discarded.
pub fn stream_batches<I, T>(items: I, batch_size: usize) -> Result<Batches<I::IntoIter>>
where
    I: IntoIterator<Item = Result<T>>,
{
    if batch_size == 0 {
        return Err(AccessError::InvalidArgument("batch_size must be at least 1"));
    }
    Ok(Batches {
        items: items.into_iter(),
        size: batch_size,
        done: false,
    })
}

impl<I, T> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size.min(MAX_PREALLOCATED_ROWS));
        while batch.len() < self.size {
            match self.items.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

impl<I, T> FusedIterator for Batches<I> where I: Iterator<Item = Result<T>> {}

/// Flattens batches, keeping the items that satisfy a predicate.
///
/// Created by [`filter_batches`].
pub struct FilterBatches<B, T, P> {
    batches: B,
    current: std::vec::IntoIter<T>,
    predicate: P,
    done: bool,
}

/// Yields the items of `batches` for which `predicate` holds, in source order.
///
/// The next batch is pulled only once every item of the current one has been
/// tested. Errors from `batches` are passed through and end iteration.
pub fn filter_batches<B, T, P>(batches: B, predicate: P) -> FilterBatches<B::IntoIter, T, P>
where
    B: IntoIterator<Item = Result<Vec<T>>>,
    P: FnMut(&T) -> bool,
{
    FilterBatches {
        batches: batches.into_iter(),
        current: Vec::new().into_iter(),
        predicate,
        done: false,
    }
}

impl<B, T, P> Iterator for FilterBatches<B, T, P>
where
    B: Iterator<Item = Result<Vec<T>>>,
    P: FnMut(&T) -> bool,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.find(&mut self.predicate) {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            match self.batches.next() {
                Some(Ok(batch)) => self.current = batch.into_iter(),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl<B, T, P> FusedIterator for FilterBatches<B, T, P>
where
    B: Iterator<Item = Result<Vec<T>>>,
    P: FnMut(&T) -> bool,
{
}
