//! Host classes known to the engine.
//!
//! A [`Class`] ties a tag the engine uses in policies (`"User"`) to a Rust
//! type, its constructors, and an optional equality hook. The
//! [`ClassRegistry`] holds the registered classes together with the ancestry
//! table (MRO) used to answer subclass and specializer questions.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{ClassError, HostResult};
use crate::value::{HostObject, HostValue};

type ConstructorFn = Arc<dyn Fn(&[HostValue]) -> Result<HostObject, String> + Send + Sync>;
type EqualityFn = fn(&dyn Any, &dyn Any) -> bool;

fn eq_as<T: Any + PartialEq>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// One way of building an instance of a class.
#[derive(Clone)]
struct Constructor {
    /// Exact argument count, or `None` for any count.
    arity: Option<usize>,
    build: ConstructorFn,
}

impl Constructor {
    fn accepts(&self, argc: usize) -> bool {
        self.arity.is_none_or(|n| n == argc)
    }
}

/// A class registered with the host.
#[derive(Clone)]
pub struct Class {
    name: String,
    type_id: Option<TypeId>,
    type_name: Option<&'static str>,
    constructors: Vec<Constructor>,
    equality: Option<EqualityFn>,
}

impl Class {
    /// Start describing a class backed by the Rust type `T`.
    pub fn builder<T: Any + Send + Sync + fmt::Debug>(name: impl Into<String>) -> ClassBuilder<T> {
        ClassBuilder {
            class: Class {
                name: name.into(),
                type_id: Some(TypeId::of::<T>()),
                type_name: Some(std::any::type_name::<T>()),
                constructors: Vec::new(),
                equality: None,
            },
            _marker: PhantomData,
        }
    }

    /// A class with no Rust type behind it, e.g. an abstract ancestor that only
    /// appears in ancestry chains.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            type_name: None,
            constructors: Vec::new(),
            equality: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn has_constructor(&self) -> bool {
        !self.constructors.is_empty()
    }

    /// Build an instance from positional arguments.
    ///
    /// Constructors are tried in registration order; the first whose arity
    /// matches and that accepts the arguments wins.
    pub fn construct(&self, args: &[HostValue]) -> HostResult<HostObject> {
        if self.constructors.is_empty() {
            return Err(ClassError::Constructor {
                class: self.name.clone(),
                message: "class has no registered constructor".into(),
            }
            .into());
        }

        let mut last_failure = None;
        for ctor in self.constructors.iter().filter(|c| c.accepts(args.len())) {
            match (ctor.build)(args) {
                Ok(obj) => return Ok(obj),
                Err(message) => {
                    tracing::warn!(class = %self.name, argc = args.len(), error = %message, "constructor rejected arguments");
                    last_failure = Some(message);
                }
            }
        }

        let message = last_failure
            .unwrap_or_else(|| format!("no constructor takes {} argument(s)", args.len()));
        Err(ClassError::Constructor {
            class: self.name.clone(),
            message,
        }
        .into())
    }

    /// Compare two objects of this class with its equality hook, if any.
    fn equal(&self, a: &HostObject, b: &HostObject) -> Option<bool> {
        let eq = self.equality?;
        Some(eq(a.as_any(), b.as_any()))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("constructors", &self.constructors.len())
            .field("equality", &self.equality.is_some())
            .finish()
    }
}

/// Builder for a [`Class`] backed by `T`.
pub struct ClassBuilder<T> {
    class: Class,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync + fmt::Debug> ClassBuilder<T> {
    /// Add a constructor taking exactly `arity` positional arguments.
    pub fn constructor<F>(mut self, arity: usize, build: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<T, String> + Send + Sync + 'static,
    {
        self.class.constructors.push(Constructor {
            arity: Some(arity),
            build: Arc::new(move |args| build(args).map(HostObject::new)),
        });
        self
    }

    /// Add a constructor that accepts any number of arguments.
    pub fn variadic_constructor<F>(mut self, build: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<T, String> + Send + Sync + 'static,
    {
        self.class.constructors.push(Constructor {
            arity: None,
            build: Arc::new(move |args| build(args).map(HostObject::new)),
        });
        self
    }

    /// Add a zero-argument constructor using `T::default()`.
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(0, |_| Ok(T::default()))
    }

    /// Compare instances with `T`'s `PartialEq` instead of identity.
    pub fn with_equality(mut self) -> Self
    where
        T: PartialEq,
    {
        self.class.equality = Some(eq_as::<T>);
        self
    }

    pub fn build(self) -> Class {
        self.class
    }
}

/// Registered classes and their ancestry table.
///
/// The ancestry table maps each class tag to its MRO: the class itself first,
/// then its ancestors from nearest to furthest.
pub struct ClassRegistry {
    classes: DashMap<String, Arc<Class>>,
    by_type: DashMap<TypeId, String>,
    mro: DashMap<String, Vec<String>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            by_type: DashMap::new(),
            mro: DashMap::new(),
        }
    }

    /// Register a class. Errors if the name is already taken.
    pub fn register(&self, class: Class) -> HostResult<Arc<Class>> {
        let class = Arc::new(class);
        match self.classes.entry(class.name.clone()) {
            Entry::Occupied(_) => {
                return Err(ClassError::DuplicateClass {
                    name: class.name.clone(),
                }
                .into());
            }
            Entry::Vacant(slot) => {
                slot.insert(class.clone());
            }
        }
        if let Some(type_id) = class.type_id {
            self.by_type.entry(type_id).or_insert_with(|| class.name.clone());
        }
        tracing::info!(class = %class.name, ty = ?class.type_name, "registered class");
        Ok(class)
    }

    /// Look up a class by tag.
    pub fn get(&self, name: &str) -> HostResult<Arc<Class>> {
        self.classes
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| ClassError::UnknownClass { name: name.to_string() }.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Registered tag of the class backing a Rust type.
    pub fn name_of(&self, type_id: TypeId) -> Option<String> {
        self.by_type.get(&type_id).map(|r| r.value().clone())
    }

    /// Registered tag of an object's runtime class, `None` if unregistered.
    pub fn class_of(&self, object: &HostObject) -> Option<String> {
        self.name_of(object.type_id())
    }

    /// Check an ancestry chain without recording it.
    ///
    /// `ancestors` runs from nearest to furthest; the class itself is prepended
    /// when missing. Every tag in the chain must be registered.
    pub fn validate_mro(&self, name: &str, ancestors: Vec<String>) -> HostResult<Vec<String>> {
        let mut mro = ancestors;
        if mro.first().map(String::as_str) != Some(name) {
            mro.insert(0, name.to_string());
        }
        if let Some(unknown) = mro.iter().find(|tag| !self.contains(tag)) {
            return Err(ClassError::UnknownClass {
                name: unknown.clone(),
            }
            .into());
        }
        Ok(mro)
    }

    /// Record the ancestry of a registered class. Nothing is recorded when the
    /// chain names an unregistered class.
    pub fn register_mro(&self, name: &str, ancestors: Vec<String>) -> HostResult<()> {
        let mro = self.validate_mro(name, ancestors)?;
        tracing::debug!(class = name, mro = ?mro, "registered ancestry");
        self.mro.insert(name.to_string(), mro);
        Ok(())
    }

    /// Ancestry of a class, itself first. Classes with no recorded ancestry are
    /// their own sole ancestor.
    pub fn mro(&self, name: &str) -> HostResult<Vec<String>> {
        if !self.contains(name) {
            return Err(ClassError::UnknownClass { name: name.to_string() }.into());
        }
        Ok(self
            .mro
            .get(name)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| vec![name.to_string()]))
    }

    /// Whether `left` is `right` or one of its descendants.
    pub fn is_subclass(&self, left: &str, right: &str) -> HostResult<bool> {
        let mro = self.mro(left)?;
        if !self.contains(right) {
            return Err(ClassError::UnknownClass { name: right.to_string() }.into());
        }
        Ok(mro.iter().any(|tag| tag == right))
    }

    /// Compare two objects with their shared class's equality hook.
    ///
    /// Returns `None` when the objects have different runtime types or their
    /// class defines no hook.
    pub fn equal(&self, a: &HostObject, b: &HostObject) -> Option<bool> {
        if a.type_id() != b.type_id() {
            return None;
        }
        let name = self.class_of(a)?;
        let class = self.classes.get(&name)?.value().clone();
        class.equal(a, b)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.names())
            .finish()
    }
}
