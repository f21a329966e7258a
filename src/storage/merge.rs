//! Multi-way merge iterator for compaction.
//!
//! Merges several sorted SSTable streams into one sorted, de-duplicated
//! stream. Inputs are given newest first; when a key appears in more than
//! one input, the entry from the newest input wins and the rest are dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::types::Entry;

/// Entry in the merge heap
struct HeapItem {
    key: Vec<u8>,
    entry: Entry,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest key first)
        other.key.cmp(&self.key).then_with(|| {
            // For equal keys, prefer smaller source index (newer data)
            other.source.cmp(&self.source)
        })
    }
}

/// K-way merge over sorted `(key, entry)` streams
pub struct MergeIterator<I> {
    heap: BinaryHeap<HeapItem>,
    sources: Vec<I>,
    failed: bool,
}

impl<I> MergeIterator<I>
where
    I: Iterator<Item = Result<(Vec<u8>, Entry)>>,
{
    /// Build a merge over `sources`, ordered newest first
    pub fn new(sources: Vec<I>) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            failed: false,
        };
        for source in 0..merge.sources.len() {
            merge.advance(source)?;
        }
        Ok(merge)
    }

    /// Pull the next entry of `source` into the heap
    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(item) = self.sources[source].next() {
            let (key, entry) = item?;
            self.heap.push(HeapItem { key, entry, source });
        }
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Entry)>> {
        let top = match self.heap.pop() {
            Some(top) => top,
            None => return Ok(None),
        };
        self.advance(top.source)?;

        // Drop older versions of the same key
        while let Some(peeked) = self.heap.peek() {
            if peeked.key != top.key {
                break;
            }
            let stale = self.heap.pop().map(|item| item.source);
            if let Some(source) = stale {
                self.advance(source)?;
            }
        }

        Ok(Some((top.key, top.entry)))
    }
}

impl<I> Iterator for MergeIterator<I>
where
    I: Iterator<Item = Result<(Vec<u8>, Entry)>>,
{
    type Item = Result<(Vec<u8>, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
