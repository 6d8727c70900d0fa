//! Keyed min-heap with removal by key.
//!
//! [`KeyedMinHeap`] stores its items in one dense vector laid out as a binary
//! heap and tracks the live position of every key. Each swap during a sift
//! updates the tracked positions, so removing an arbitrary item by key costs
//! `O(log n)` instead of a linear scan.
//!
//! # Complexity
//! - `push`: `O(log n)`
//! - `pop`: `O(log n)`
//! - `remove`: `O(log n)`
//! - `peek`: `O(1)`
//!
//! # Panic Safety
//! All provided APIs are panic-free.
//!
//! # Examples
//! ```
//! use tablecore_runtime::collections::{HeapItem, KeyedMinHeap};
//!
//! #[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
//! struct Deadline {
//!     at: u64,
//!     id: u32,
//! }
//!
//! impl HeapItem for Deadline {
//!     type Key = u32;
//!     fn key(&self) -> u32 {
//!         self.id
//!     }
//! }
//!
//! let mut heap = KeyedMinHeap::new();
//! heap.push(Deadline { at: 30, id: 1 });
//! heap.push(Deadline { at: 10, id: 2 });
//! heap.push(Deadline { at: 20, id: 3 });
//!
//! assert_eq!(heap.remove(&2).map(|d| d.at), Some(10));
//! assert_eq!(heap.pop().map(|d| d.id), Some(3));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Shared priority-queue operations.
pub trait PriorityQueue<T> {
    /// Adds a value to the queue.
    fn push(&mut self, item: T);
    /// Removes the highest-priority value, returning `None` when empty.
    fn pop(&mut self) -> Option<T>;
    /// Borrows the current highest-priority value without removing it.
    fn peek(&self) -> Option<&T>;
    /// Returns the number of queued items.
    fn len(&self) -> usize;
    /// Returns `true` when the queue contains no items.
    fn is_empty(&self) -> bool;
    /// Removes all items from the queue.
    fn clear(&mut self);
}

/// An item that can live in a [`KeyedMinHeap`].
///
/// Ordering comes from `Ord` (smallest first); identity comes from
/// [`HeapItem::key`], which must stay constant while the item is queued.
pub trait HeapItem: Ord {
    /// Identity used for removal.
    type Key: Eq + Hash + Copy;

    /// Returns the item's key.
    fn key(&self) -> Self::Key;
}

/// A min-heap whose items can also be removed by key.
pub struct KeyedMinHeap<T: HeapItem> {
    items: Vec<T>,
    positions: HashMap<T::Key, usize>,
}

impl<T: HeapItem> KeyedMinHeap<T> {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new(), positions: HashMap::new() }
    }

    /// Creates an empty heap with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::with_capacity(capacity), positions: HashMap::with_capacity(capacity) }
    }

    /// Adds an item and returns the position it settled at.
    ///
    /// A return value of `0` means the item is the new minimum. If an item
    /// with the same key was already queued it is replaced.
    pub fn push(&mut self, item: T) -> usize {
        let key = item.key();
        if self.positions.contains_key(&key) {
            self.remove(&key);
        }

        let index = self.items.len();
        self.items.push(item);
        self.positions.insert(key, index);
        self.sift_up(index)
    }

    /// Removes and returns the smallest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    /// Removes and returns the smallest item if `predicate` accepts it.
    pub fn pop_if<F>(&mut self, predicate: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        match self.items.first() {
            Some(item) if predicate(item) => self.pop(),
            _ => None,
        }
    }

    /// Returns a reference to the smallest item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Removes the item with `key`, wherever it sits in the heap.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let index = *self.positions.get(key)?;
        self.remove_at(index)
    }

    /// Returns `true` if an item with `key` is queued.
    #[must_use]
    pub fn contains(&self, key: &T::Key) -> bool {
        self.positions.contains_key(key)
    }

    /// Returns the current position of `key` in the backing vector.
    #[must_use]
    pub fn position(&self, key: &T::Key) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the heap contains no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the allocated capacity of the backing vector.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Removes all items.
    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }

    /// Iterates over the queued items in heap (not sorted) order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Consumes the heap and returns the items in ascending order.
    #[must_use]
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut sorted = Vec::with_capacity(self.items.len());
        while let Some(item) = self.pop() {
            sorted.push(item);
        }
        sorted
    }

    fn remove_at(&mut self, index: usize) -> Option<T> {
        let last = self.items.len().checked_sub(1)?;
        if index > last {
            return None;
        }

        self.swap(index, last);
        let item = self.items.pop()?;
        self.positions.remove(&item.key());

        if index < self.items.len() {
            // The item moved into `index` may belong above or below it.
            let settled = self.sift_up(index);
            if settled == index {
                self.sift_down(index);
            }
        }
        Some(item)
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index] >= self.items[parent] {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.items[left] < self.items[smallest] {
                smallest = left;
            }
            if right < len && self.items[right] < self.items[smallest] {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.positions.insert(self.items[a].key(), a);
        self.positions.insert(self.items[b].key(), b);
    }
}

impl<T: HeapItem> Default for KeyedMinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for KeyedMinHeap<T>
where
    T: HeapItem + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedMinHeap")
            .field("len", &self.len())
            .field("items", &self.items)
            .finish()
    }
}

impl<T: HeapItem> Extend<T> for KeyedMinHeap<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<T: HeapItem> FromIterator<T> for KeyedMinHeap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut heap = Self::new();
        heap.extend(iter);
        heap
    }
}

impl<T: HeapItem> PriorityQueue<T> for KeyedMinHeap<T> {
    fn push(&mut self, item: T) {
        Self::push(self, item);
    }

    fn pop(&mut self) -> Option<T> {
        Self::pop(self)
    }

    fn peek(&self) -> Option<&T> {
        Self::peek(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn clear(&mut self) {
        Self::clear(self);
    }
}
