//! Specialized data structures
//!
//! - **[`priority_queue`]**: keyed min-heap with `O(log n)` removal by key,
//!   used as the heap scheduler's timer queue

pub mod priority_queue;

pub use priority_queue::{HeapItem, KeyedMinHeap, PriorityQueue};
