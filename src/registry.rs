//! Instance registry: bidirectional instance id ↔ host object mapping.
//!
//! The [`InstanceRegistry`] is the session-scoped cache that lets the engine
//! refer to host objects through integer handles. Lookups go both ways: by id
//! when the engine hands a handle back, and by object identity when the host
//! encodes an object it may already have sent.
//!
//! Entries live until the registry is cleared at the end of the session.
//! Ids are never reused.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{HostResult, InstanceError};
use crate::value::HostObject;

/// Opaque handle the engine uses to refer to a host object.
pub type InstanceId = u64;

#[derive(Default)]
struct Instances {
    /// Forward map: id → object (source of truth).
    by_id: HashMap<InstanceId, HostObject>,
    /// Reverse map: object address → first id it was registered under.
    by_addr: HashMap<usize, InstanceId>,
    /// `None` once the id space is used up.
    next_id: Option<InstanceId>,
}

impl Instances {
    fn bump_past(&mut self, id: InstanceId) {
        if self.next_id.is_some_and(|next| id >= next) {
            self.next_id = id.checked_add(1);
        }
    }
}

/// Thread-safe instance cache for one engine session.
///
/// Every read and write goes through a single lock, so the identity check in
/// [`register`](Self::register) and the insertion it guards are atomic.
pub struct InstanceRegistry {
    inner: RwLock<Instances>,
}

impl InstanceRegistry {
    /// Create an empty registry whose first host-assigned id is 1.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Instances {
                next_id: Some(1),
                ..Default::default()
            }),
        }
    }

    /// Cache an object, returning its id.
    ///
    /// Registering the same object (by identity) twice returns the same id.
    /// Fails once every id has been handed out.
    pub fn register(&self, object: &HostObject) -> HostResult<InstanceId> {
        let mut inner = self.inner.write().expect("instance registry lock poisoned");
        if let Some(&id) = inner.by_addr.get(&object.addr()) {
            return Ok(id);
        }
        let id = inner.next_id.ok_or(InstanceError::Exhausted)?;
        if let Some(existing) = inner.by_id.get(&id) {
            return Err(InstanceError::Duplicate {
                instance_id: id,
                existing: existing.repr(),
                incoming: object.repr(),
            }
            .into());
        }
        inner.bump_past(id);
        inner.by_addr.insert(object.addr(), id);
        inner.by_id.insert(id, object.clone());
        tracing::trace!(instance_id = id, ty = object.type_name(), "registered instance");
        Ok(id)
    }

    /// Cache an object under an id chosen by the engine.
    ///
    /// Rebinding an id to the object it already holds is a no-op; binding it to
    /// a different object fails.
    pub fn register_with_id(&self, object: HostObject, id: InstanceId) -> HostResult<()> {
        let mut inner = self.inner.write().expect("instance registry lock poisoned");
        if let Some(existing) = inner.by_id.get(&id) {
            if existing.ptr_eq(&object) {
                return Ok(());
            }
            return Err(InstanceError::Duplicate {
                instance_id: id,
                existing: existing.repr(),
                incoming: object.repr(),
            }
            .into());
        }
        inner.bump_past(id);
        inner.by_addr.entry(object.addr()).or_insert(id);
        tracing::trace!(instance_id = id, ty = object.type_name(), "registered instance with engine id");
        inner.by_id.insert(id, object);
        Ok(())
    }

    /// Whether an id is bound.
    pub fn has(&self, id: InstanceId) -> bool {
        self.inner
            .read()
            .expect("instance registry lock poisoned")
            .by_id
            .contains_key(&id)
    }

    /// Look up the object bound to an id.
    pub fn get(&self, id: InstanceId) -> HostResult<HostObject> {
        self.inner
            .read()
            .expect("instance registry lock poisoned")
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| InstanceError::Unregistered { instance_id: id }.into())
    }

    /// Id an object is cached under, if any.
    pub fn id_of(&self, object: &HostObject) -> Option<InstanceId> {
        self.inner
            .read()
            .expect("instance registry lock poisoned")
            .by_addr
            .get(&object.addr())
            .copied()
    }

    /// Id the next [`register`](Self::register) of a new object would receive,
    /// or `None` when the id space is exhausted.
    pub fn peek_next(&self) -> Option<InstanceId> {
        self.inner.read().expect("instance registry lock poisoned").next_id
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("instance registry lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Called when the owning session ends.
    ///
    /// The id counter is kept so ids issued before the clear are never
    /// handed out again.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("instance registry lock poisoned");
        inner.by_id.clear();
        inner.by_addr.clear();
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("count", &self.len())
            .finish()
    }
}
