//! Measurable Types
//!
//! [`SizeOf`] reports the bytes retained by a value: its inline size plus
//! everything it owns on the heap. Shared allocations (`Arc`) are counted once
//! per walk, keyed by their address, so shared and cyclic graphs neither
//! double count nor recurse forever. Locks already held by the walk are not
//! entered again.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::BuildHasher;
use std::mem::{size_of, size_of_val};
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};

/// Default maximum nesting depth for a walk
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default maximum number of nested objects visited in one walk
pub const DEFAULT_MAX_OBJECTS: usize = 1_000_000;

/// Traversal state for one measurement
#[derive(Debug)]
pub struct GraphWalker {
    visited: HashSet<usize>,
    held_locks: HashSet<usize>,
    depth: usize,
    max_depth: usize,
    objects: usize,
    max_objects: usize,
}

impl Default for GraphWalker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_OBJECTS)
    }
}

impl GraphWalker {
    /// Create a walker with traversal bounds
    pub fn new(max_depth: usize, max_objects: usize) -> Self {
        Self {
            visited: HashSet::new(),
            held_locks: HashSet::new(),
            depth: 0,
            max_depth,
            objects: 0,
            max_objects,
        }
    }

    /// Record a shared allocation; false if it was already counted
    pub fn first_visit<T: ?Sized>(&mut self, ptr: *const T) -> bool {
        self.visited.insert(ptr as *const () as usize)
    }

    /// Measure behind a lock, or count nothing if this walk already holds it
    pub fn through_lock<L, F>(&mut self, lock: *const L, measure: F) -> Result<usize>
    where
        F: FnOnce(&mut Self) -> Result<usize>,
    {
        let address = lock as usize;
        if !self.held_locks.insert(address) {
            return Ok(0);
        }
        let result = measure(self);
        self.held_locks.remove(&address);
        result
    }

    /// Number of objects visited so far
    pub fn objects_visited(&self) -> usize {
        self.objects
    }

    /// Measure one nested object, enforcing the walk bounds
    pub fn descend<F>(&mut self, measure: F) -> Result<usize>
    where
        F: FnOnce(&mut Self) -> Result<usize>,
    {
        if self.depth >= self.max_depth {
            return Err(Error::SizeMeasurementFailure(format!(
                "object graph nested deeper than {} levels",
                self.max_depth
            )));
        }
        self.objects += 1;
        if self.objects > self.max_objects {
            return Err(Error::SizeMeasurementFailure(format!(
                "object graph has more than {} objects",
                self.max_objects
            )));
        }

        self.depth += 1;
        let result = measure(self);
        self.depth -= 1;
        result
    }
}

/// A value whose retained size can be measured
pub trait SizeOf {
    /// Bytes owned outside the value's inline representation
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize>;

    /// Inline plus owned bytes
    fn deep_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        Ok(size_of_val(self) + self.heap_size(walker)?)
    }
}

macro_rules! inline_only {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SizeOf for $ty {
                #[inline]
                fn heap_size(&self, _walker: &mut GraphWalker) -> Result<usize> {
                    Ok(0)
                }
            }
        )*
    };
}

inline_only!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    &'static str,
    std::time::Duration,
);

impl SizeOf for String {
    fn heap_size(&self, _walker: &mut GraphWalker) -> Result<usize> {
        Ok(self.capacity())
    }
}

impl SizeOf for bytes::Bytes {
    fn heap_size(&self, _walker: &mut GraphWalker) -> Result<usize> {
        Ok(self.len())
    }
}

fn sequence_size<'a, T, I>(walker: &mut GraphWalker, slots: usize, items: I) -> Result<usize>
where
    T: SizeOf + 'a,
    I: IntoIterator<Item = &'a T>,
{
    walker.descend(|walker| {
        let mut total = slots * size_of::<T>();
        for item in items {
            total += item.heap_size(walker)?;
        }
        Ok(total)
    })
}

impl<T: SizeOf> SizeOf for Vec<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        sequence_size(walker, self.capacity(), self.iter())
    }
}

impl<T: SizeOf> SizeOf for VecDeque<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        sequence_size(walker, self.capacity(), self.iter())
    }
}

impl<T: SizeOf> SizeOf for Option<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        match self {
            Some(inner) => inner.heap_size(walker),
            None => Ok(0),
        }
    }
}

impl<T: SizeOf> SizeOf for Box<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.descend(|walker| (**self).deep_size(walker))
    }
}

impl<T: SizeOf> SizeOf for Arc<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        if !walker.first_visit(Arc::as_ptr(self)) {
            return Ok(0);
        }
        // strong + weak counters precede the payload
        walker.descend(|walker| Ok(2 * size_of::<usize>() + (**self).deep_size(walker)?))
    }
}

/// Back references are not followed
impl<T> SizeOf for Weak<T> {
    fn heap_size(&self, _walker: &mut GraphWalker) -> Result<usize> {
        Ok(0)
    }
}

impl<T: SizeOf> SizeOf for std::sync::Mutex<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.through_lock(self as *const Self, |walker| {
            let guard = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.heap_size(walker)
        })
    }
}

impl<T: SizeOf> SizeOf for parking_lot::Mutex<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.through_lock(self as *const Self, |walker| self.lock().heap_size(walker))
    }
}

impl<T: SizeOf> SizeOf for parking_lot::RwLock<T> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.through_lock(self as *const Self, |walker| self.read().heap_size(walker))
    }
}

impl<K: SizeOf, V: SizeOf, S: BuildHasher> SizeOf for HashMap<K, V, S> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.descend(|walker| {
            let mut total = self.capacity() * (size_of::<K>() + size_of::<V>());
            for (key, value) in self {
                total += key.heap_size(walker)? + value.heap_size(walker)?;
            }
            Ok(total)
        })
    }
}

impl<K: SizeOf, V: SizeOf> SizeOf for BTreeMap<K, V> {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        walker.descend(|walker| {
            let mut total = self.len() * (size_of::<K>() + size_of::<V>());
            for (key, value) in self {
                total += key.heap_size(walker)? + value.heap_size(walker)?;
            }
            Ok(total)
        })
    }
}

impl<A: SizeOf, B: SizeOf> SizeOf for (A, B) {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        Ok(self.0.heap_size(walker)? + self.1.heap_size(walker)?)
    }
}

impl<A: SizeOf, B: SizeOf, C: SizeOf> SizeOf for (A, B, C) {
    fn heap_size(&self, walker: &mut GraphWalker) -> Result<usize> {
        Ok(self.0.heap_size(walker)? + self.1.heap_size(walker)? + self.2.heap_size(walker)?)
    }
}

// =============================================================================
// Tests
// =============================================================================
