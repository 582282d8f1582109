//! Content-hash keyed cache for derived Vulkan objects.
//!
//! Every cached object is fully determined by its key. The key is hashed into a 64-bit value, and
//! requests with equal keys always resolve to the same live object. Objects are owned by the cache through an
//! [`Arc`], and are only destroyed once they are removed from the cache through [`Cache::clear()`] or
//! [`Cache::retain()`] and every outstanding reference has been dropped.
//!
//! Lookups take a shared lock. On a miss, the object is created without holding any lock, after which it is
//! inserted. If another thread inserted an object for the same key in the meantime, the freshly created object is discarded
//! and the existing one is returned.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::{Device, Error};

/// A resource that can be created from a key and stored in a [`Cache`].
pub trait Resource {
    /// Key that fully describes this resource.
    type Key: Hash + Eq + Clone;
    /// Extra parameters needed for creation that are not part of the object's identity.
    type ExtraParams<'a>;

    /// Create a new instance of this resource from its key.
    fn create(device: Device, key: &Self::Key, params: Self::ExtraParams<'_>) -> Result<Self>
    where
        Self: Sized;
}

/// Compute the 64-bit content hash of a key.
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

struct Entry<R: Resource> {
    key: R::Key,
    value: Arc<R>,
}

/// Thread-safe content-hash cache. Cloning this gives another handle to the same cache.
pub struct Cache<R: Resource> {
    name: &'static str,
    store: Arc<RwLock<HashMap<u64, Entry<R>>>>,
}

impl<R: Resource> std::fmt::Debug for Cache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

impl<R: Resource> Clone for Cache<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            store: self.store.clone(),
        }
    }
}

impl<R: Resource> Cache<R> {
    /// Create a new empty cache. The name is only used for logging.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up the object for this key, creating it through [`Resource::create()`] on a miss.
    pub fn get_or_create(&self, device: &Device, key: &R::Key, params: R::ExtraParams<'_>) -> Result<Arc<R>> {
        self.get_or_create_with(key, || R::create(device.clone(), key, params))
    }

    /// Look up the object for this key, calling `create` on a miss.
    /// # Errors
    /// * Fails if `create` fails. Nothing is inserted in that case.
    /// * Fails if the internal lock is poisoned.
    pub fn get_or_create_with(&self, key: &R::Key, create: impl FnOnce() -> Result<R>) -> Result<Arc<R>> {
        let hash = hash_key(key);
        {
            let store = self.store.read().map_err(|_| Error::PoisonError)?;
            if let Some(entry) = store.get(&hash) {
                if entry.key == *key {
                    return Ok(entry.value.clone());
                }
            }
        }

        trace!("{} cache miss for key {hash:#018x}", self.name);
        let value = Arc::new(create()?);

        let mut store = self.store.write().map_err(|_| Error::PoisonError)?;
        match store.get(&hash) {
            Some(entry) if entry.key == *key => Ok(entry.value.clone()),
            Some(_) => {
                error!(
                    "{} cache: hash collision on {hash:#018x}, returning an uncached object",
                    self.name
                );
                Ok(value)
            }
            None => {
                store.insert(
                    hash,
                    Entry {
                        key: key.clone(),
                        value: value.clone(),
                    },
                );
                Ok(value)
            }
        }
    }

    /// Look up an object without creating it.
    pub fn get(&self, key: &R::Key) -> Result<Option<Arc<R>>> {
        let store = self.store.read().map_err(|_| Error::PoisonError)?;
        Ok(store
            .get(&hash_key(key))
            .filter(|entry| entry.key == *key)
            .map(|entry| entry.value.clone()))
    }

    /// Keep only the entries for which `keep` returns true. Returns the removed objects, so the caller
    /// can decide when they are actually destroyed.
    pub fn retain(&self, mut keep: impl FnMut(&R::Key, &R) -> bool) -> Result<Vec<Arc<R>>> {
        let mut store = self.store.write().map_err(|_| Error::PoisonError)?;
        let mut removed = Vec::new();
        store.retain(|_, entry| {
            let retained = keep(&entry.key, &entry.value);
            if !retained {
                removed.push(entry.value.clone());
            }
            retained
        });
        if !removed.is_empty() {
            debug!("{} cache: evicted {} entries", self.name, removed.len());
        }
        Ok(removed)
    }

    /// Remove every entry from the cache. Returns the removed objects.
    pub fn clear(&self) -> Result<Vec<Arc<R>>> {
        self.retain(|_, _| false)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.store.read().map(|store| store.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
