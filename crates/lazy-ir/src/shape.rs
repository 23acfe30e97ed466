//! Eager and deferred node shapes.
//!
//! A node's hash covers its shape, so a deferred shape is resolved while the node is built,
//! before the graph publishes it, and the function never runs again. Deferred nodes of one
//! graph also share a [`ShapeCache`]: an entry is keyed by the node's shape-free structure and
//! remembers the function that produced it, so only a node built from the same function over
//! the same operands reuses a cached shape.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::hashing::hash_combine;
use crate::types::ValueType;

/// Shape-inference collaborator; must be pure.
pub type ShapeFn = Arc<dyn Fn() -> ValueType + Send + Sync>;

/// How a node's shape is supplied at construction.
#[derive(Clone)]
pub enum ShapeSource {
    Known(ValueType),
    Deferred(ShapeFn),
}

impl ShapeSource {
    pub fn deferred<F>(shape_fn: F) -> Self
    where
        F: Fn() -> ValueType + Send + Sync + 'static,
    {
        ShapeSource::Deferred(Arc::new(shape_fn))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, ShapeSource::Deferred(_))
    }
}

impl From<ValueType> for ShapeSource {
    fn from(shape: ValueType) -> Self {
        ShapeSource::Known(shape)
    }
}

impl fmt::Debug for ShapeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeSource::Known(shape) => f.debug_tuple("Known").field(shape).finish(),
            ShapeSource::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// LRU of resolved deferred shapes.
pub struct ShapeCache {
    entries: Mutex<LruCache<u64, CachedShape>>,
}

struct CachedShape {
    // Held so the function's address cannot be reused while the entry lives.
    shape_fn: ShapeFn,
    shape: ValueType,
}

impl ShapeCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Shape recorded for `key`, only if it was produced by this very `shape_fn`.
    pub fn get(&self, key: u64, shape_fn: &ShapeFn) -> Option<ValueType> {
        let mut entries = self.entries.lock().expect("shape cache poisoned");
        entries
            .get(&entry_key(key, shape_fn))
            .filter(|entry| Arc::ptr_eq(&entry.shape_fn, shape_fn))
            .map(|entry| entry.shape.clone())
    }

    pub fn insert(&self, key: u64, shape_fn: &ShapeFn, shape: ValueType) {
        let mut entries = self.entries.lock().expect("shape cache poisoned");
        entries.put(
            entry_key(key, shape_fn),
            CachedShape {
                shape_fn: Arc::clone(shape_fn),
                shape,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("shape cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().expect("shape cache poisoned").clear();
    }
}

fn entry_key(key: u64, shape_fn: &ShapeFn) -> u64 {
    let address = Arc::as_ptr(shape_fn) as *const () as usize;
    hash_combine(key, address as u64)
}

impl fmt::Debug for ShapeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeCache")
            .field("len", &self.len())
            .finish()
    }
}

/// Resolved shape stored in every node, plus the function that produced it when deferred.
pub(crate) struct ShapeCell {
    shape: ValueType,
    shape_fn: Option<ShapeFn>,
}

impl ShapeCell {
    pub(crate) fn known(shape: ValueType, num_outputs: usize) -> Self {
        check_arity(&shape, num_outputs);
        Self {
            shape,
            shape_fn: None,
        }
    }

    /// Runs `shape_fn` unless `cache` holds its result for the same structural `key`.
    pub(crate) fn deferred(
        shape_fn: ShapeFn,
        cache: Option<&ShapeCache>,
        key: u64,
        num_outputs: usize,
    ) -> Self {
        let cached = cache.and_then(|cache| cache.get(key, &shape_fn));
        let shape = match cached {
            Some(shape) => {
                tracing::trace!(key, "shape cache hit");
                shape
            }
            None => {
                let shape = shape_fn();
                check_arity(&shape, num_outputs);
                if let Some(cache) = cache {
                    tracing::trace!(key, "shape cache miss");
                    cache.insert(key, &shape_fn, shape.clone());
                }
                shape
            }
        };
        Self {
            shape,
            shape_fn: Some(shape_fn),
        }
    }

    pub(crate) fn is_deferred(&self) -> bool {
        self.shape_fn.is_some()
    }

    pub(crate) fn get(&self) -> &ValueType {
        &self.shape
    }
}

impl fmt::Debug for ShapeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shape)
    }
}

/// Multi-output nodes must carry a tuple shape with one element per output.
fn check_arity(shape: &ValueType, num_outputs: usize) {
    if num_outputs > 1 {
        assert_eq!(
            shape.tuple_arity(),
            Some(num_outputs),
            "shape {shape} does not match declared output count {num_outputs}"
        );
    }
}
