//! Facade over an engine instance and its host session.
//!
//! The engine itself is an external collaborator reached through the
//! [`PolarEngine`] trait. [`Polar`] pairs one engine with one [`Host`] so that
//! class registration, source loading, and queries keep both sides in sync.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::class::Class;
use crate::config::HostConfig;
use crate::error::{ClassError, EngineError, HostResult, TermError};
use crate::host::Host;
use crate::registry::InstanceId;
use crate::terms::{ExternalInstance, Numeric, Term, Value};
use crate::value::{HostObject, HostValue};

/// Calls the host makes into the reasoning engine.
///
/// Every argument and result is a term or a raw wire-format string; the
/// engine's internals stay opaque.
pub trait PolarEngine {
    /// Handle to a running query.
    type Query;

    /// Load policy sources, given as a JSON array of `{"src", "filename"}`.
    fn load(&mut self, sources: &str) -> Result<(), EngineError>;

    fn clear_rules(&mut self) -> Result<(), EngineError>;

    fn register_constant(&mut self, name: &str, value: &Term) -> Result<(), EngineError>;

    /// Record a class's ancestry as a List term of class instance ids.
    fn register_mro(&mut self, name: &str, mro: &Term) -> Result<(), EngineError>;

    fn new_query(&mut self, query: &str, trace: u32) -> Result<Self::Query, EngineError>;

    fn new_query_from_term(&mut self, term: &Term, trace: u32) -> Result<Self::Query, EngineError>;

    /// Next pending engine message (warnings, prints), if any.
    fn next_message(&mut self) -> Result<Option<String>, EngineError>;

    fn build_filter_plan(
        &mut self,
        types: &str,
        results: &str,
        variable: &str,
        class_tag: &str,
    ) -> Result<String, EngineError>;
}

/// Host-side stand-in for a registered class, sent to the engine as the
/// class constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHandle {
    pub name: String,
}

#[derive(Serialize)]
struct Source<'a> {
    src: &'a str,
    filename: Option<&'a str>,
}

/// An engine paired with its host session.
pub struct Polar<E: PolarEngine> {
    engine: E,
    host: Host,
    class_ids: HashMap<String, InstanceId>,
}

impl<E: PolarEngine> Polar<E> {
    pub fn new(engine: E, config: HostConfig) -> Self {
        Self {
            engine,
            host: Host::new(config),
            class_ids: HashMap::new(),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Instance id the class constant for `name` was registered under.
    pub fn class_id(&self, name: &str) -> Option<InstanceId> {
        self.class_ids.get(name).copied()
    }

    // -----------------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------------

    /// Register a class with the host and expose it to policies as a constant.
    ///
    /// The host records the class only after the engine accepted the constant,
    /// so a failed registration can be retried.
    pub fn register_class(&mut self, class: Class) -> HostResult<Arc<Class>> {
        let name = class.name().to_string();
        if self.host.classes().contains(&name) {
            return Err(ClassError::DuplicateClass { name }.into());
        }
        let handle = HostObject::new(ClassHandle { name: name.clone() });
        let class_id = self.host.cache_instance(&handle)?;

        let constant = Term::new(Value::ExternalInstance(ExternalInstance {
            instance_id: class_id,
            constructor: None,
            repr: Some(name.clone()),
            class_repr: None,
            class_id: Some(class_id),
        }));
        self.engine.register_constant(&name, &constant)?;

        let class = self.host.register_class(class)?;
        self.class_ids.insert(name, class_id);
        Ok(class)
    }

    /// Record a class's ancestors (nearest first) on both sides.
    ///
    /// Every class in the chain must have been registered through
    /// [`register_class`](Self::register_class). The host table is only
    /// updated once the engine accepted the chain.
    pub fn register_mro(&mut self, name: &str, ancestors: Vec<String>) -> HostResult<()> {
        let mro = self.host.classes().validate_mro(name, ancestors)?;
        let ids = mro
            .iter()
            .map(|tag| {
                let id = self
                    .class_id(tag)
                    .ok_or_else(|| ClassError::UnknownClass { name: tag.clone() })?;
                let id = i32::try_from(id)
                    .map_err(|_| TermError::decode("mro", "32-bit class id", id.to_string()))?;
                Ok(Term::new(Value::Number(Numeric::Integer(id))))
            })
            .collect::<HostResult<Vec<_>>>()?;
        self.engine
            .register_mro(name, &Term::new(Value::List(ids)))?;
        self.host.register_mro(name, mro)
    }

    /// Expose an arbitrary host value to policies under `name`.
    pub fn register_constant(&mut self, name: &str, value: &HostValue) -> HostResult<()> {
        let term = self.host.to_polar(value)?;
        self.engine.register_constant(name, &term)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Load policy text that has no backing file.
    pub fn load_str(&mut self, src: &str) -> HostResult<()> {
        self.load_sources(&[(src, None)])
    }

    /// Load policy sources given as `(text, filename)` pairs.
    pub fn load_sources(&mut self, sources: &[(&str, Option<&str>)]) -> HostResult<()> {
        let sources: Vec<Source<'_>> = sources
            .iter()
            .map(|&(src, filename)| Source { src, filename })
            .collect();
        let json = serde_json::to_string(&sources).map_err(|e| TermError::Json {
            message: e.to_string(),
        })?;
        tracing::debug!(count = sources.len(), "loading policy sources");
        self.engine.load(&json)?;
        Ok(())
    }

    /// Read and load policy files.
    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> HostResult<()> {
        let mut texts = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let src = std::fs::read_to_string(path).map_err(|e| EngineError::SourceRead {
                path: path.display().to_string(),
                source: e,
            })?;
            texts.push((src, path.display().to_string()));
        }
        let sources: Vec<(&str, Option<&str>)> = texts
            .iter()
            .map(|(src, name)| (src.as_str(), Some(name.as_str())))
            .collect();
        self.load_sources(&sources)
    }

    pub fn clear_rules(&mut self) -> HostResult<()> {
        self.engine.clear_rules()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn query_str(&mut self, query: &str) -> HostResult<E::Query> {
        let trace = self.host.config().trace;
        Ok(self.engine.new_query(query, trace)?)
    }

    /// Encode a host value (usually a predicate) and query with it.
    pub fn query_value(&mut self, query: &HostValue) -> HostResult<E::Query> {
        let term = self.host.to_polar(query)?;
        let trace = self.host.config().trace;
        Ok(self.engine.new_query_from_term(&term, trace)?)
    }

    /// Drain the engine's pending messages.
    pub fn messages(&mut self) -> HostResult<Vec<String>> {
        let mut out = Vec::new();
        while let Some(message) = self.engine.next_message()? {
            out.push(message);
        }
        Ok(out)
    }

    pub fn build_filter_plan(
        &mut self,
        types: &str,
        results: &str,
        variable: &str,
        class_tag: &str,
    ) -> HostResult<String> {
        Ok(self
            .engine
            .build_filter_plan(types, results, variable, class_tag)?)
    }
}

impl<E: PolarEngine + std::fmt::Debug> std::fmt::Debug for Polar<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polar")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("classes", &self.class_ids.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::value::Predicate;

    /// Records every call it receives.
    #[derive(Debug, Default)]
    struct RecordingEngine {
        loaded: Vec<String>,
        constants: Vec<(String, Term)>,
        mros: Vec<(String, Term)>,
        queries: Vec<(String, u32)>,
        messages: Vec<String>,
        fail_load: bool,
        fail_constant: bool,
        fail_mro: bool,
    }

    impl PolarEngine for RecordingEngine {
        type Query = usize;

        fn load(&mut self, sources: &str) -> Result<(), EngineError> {
            if self.fail_load {
                return Err(EngineError::Call {
                    operation: "load".into(),
                    message: "parse error".into(),
                });
            }
            self.loaded.push(sources.to_string());
            Ok(())
        }

        fn clear_rules(&mut self) -> Result<(), EngineError> {
            self.loaded.clear();
            Ok(())
        }

        fn register_constant(&mut self, name: &str, value: &Term) -> Result<(), EngineError> {
            if self.fail_constant {
                return Err(EngineError::Call {
                    operation: "register_constant".into(),
                    message: "rejected".into(),
                });
            }
            self.constants.push((name.to_string(), value.clone()));
            Ok(())
        }

        fn register_mro(&mut self, name: &str, mro: &Term) -> Result<(), EngineError> {
            if self.fail_mro {
                return Err(EngineError::Call {
                    operation: "register_mro".into(),
                    message: "rejected".into(),
                });
            }
            self.mros.push((name.to_string(), mro.clone()));
            Ok(())
        }

        fn new_query(&mut self, query: &str, trace: u32) -> Result<usize, EngineError> {
            self.queries.push((query.to_string(), trace));
            Ok(self.queries.len())
        }

        fn new_query_from_term(&mut self, term: &Term, trace: u32) -> Result<usize, EngineError> {
            self.queries.push((term.to_string(), trace));
            Ok(self.queries.len())
        }

        fn next_message(&mut self) -> Result<Option<String>, EngineError> {
            Ok(self.messages.pop())
        }

        fn build_filter_plan(
            &mut self,
            _types: &str,
            _results: &str,
            variable: &str,
            class_tag: &str,
        ) -> Result<String, EngineError> {
            Ok(format!("{variable}:{class_tag}"))
        }
    }

    #[derive(Debug, Default)]
    struct Animal;

    #[derive(Debug, Default)]
    struct Dog;

    fn polar() -> Polar<RecordingEngine> {
        Polar::new(RecordingEngine::default(), HostConfig::default())
    }

    #[test]
    fn register_class_sends_constant() {
        let mut polar = polar();
        polar
            .register_class(Class::builder::<Dog>("Dog").default_constructor().build())
            .unwrap();
        let (name, term) = &polar.engine().constants[0];
        assert_eq!(name, "Dog");
        let Value::ExternalInstance(ext) = &term.value else {
            panic!("expected instance");
        };
        assert_eq!(Some(ext.instance_id), polar.class_id("Dog"));
        assert_eq!(ext.class_id, Some(ext.instance_id));
        assert!(polar.host().has_instance(ext.instance_id));
    }

    #[test]
    fn register_mro_forwards_class_ids() {
        let mut polar = polar();
        polar.register_class(Class::builder::<Animal>("Animal").build()).unwrap();
        polar.register_class(Class::builder::<Dog>("Dog").build()).unwrap();
        polar.register_mro("Dog", vec!["Animal".into()]).unwrap();

        let (name, mro) = &polar.engine().mros[0];
        assert_eq!(name, "Dog");
        let Value::List(ids) = &mro.value else {
            panic!("expected list");
        };
        let dog = polar.class_id("Dog").unwrap() as i32;
        let animal = polar.class_id("Animal").unwrap() as i32;
        assert_eq!(ids[0].value, Value::Number(Numeric::Integer(dog)));
        assert_eq!(ids[1].value, Value::Number(Numeric::Integer(animal)));
        assert!(polar.host().is_subclass("Dog", "Animal").unwrap());
    }

    #[test]
    fn register_mro_with_unregistered_ancestor_fails() {
        let mut polar = polar();
        polar.register_class(Class::builder::<Dog>("Dog").build()).unwrap();
        let err = polar.register_mro("Dog", vec!["Wolf".into()]).unwrap_err();
        assert!(matches!(err, HostError::Class(ClassError::UnknownClass { ref name }) if name == "Wolf"));
        assert_eq!(polar.host().classes().mro("Dog").unwrap(), vec!["Dog"]);
        assert!(polar.engine().mros.is_empty());
    }

    #[test]
    fn register_mro_with_host_only_ancestor_leaves_tables_untouched() {
        let mut polar = polar();
        polar.register_class(Class::builder::<Dog>("Dog").build()).unwrap();
        polar
            .host()
            .register_class(Class::builder::<Animal>("Animal").build())
            .unwrap();
        let err = polar.register_mro("Dog", vec!["Animal".into()]).unwrap_err();
        assert!(matches!(err, HostError::Class(ClassError::UnknownClass { ref name }) if name == "Animal"));
        assert_eq!(polar.host().classes().mro("Dog").unwrap(), vec!["Dog"]);
        assert!(polar.engine().mros.is_empty());
    }

    #[test]
    fn register_mro_engine_failure_leaves_host_untouched() {
        let mut polar = polar();
        polar.register_class(Class::builder::<Animal>("Animal").build()).unwrap();
        polar.register_class(Class::builder::<Dog>("Dog").build()).unwrap();
        polar.engine_mut().fail_mro = true;
        assert!(polar.register_mro("Dog", vec!["Animal".into()]).is_err());
        assert!(!polar.host().is_subclass("Dog", "Animal").unwrap());

        polar.engine_mut().fail_mro = false;
        polar.register_mro("Dog", vec!["Animal".into()]).unwrap();
        assert!(polar.host().is_subclass("Dog", "Animal").unwrap());
    }

    #[test]
    fn register_class_engine_failure_can_be_retried() {
        let mut polar = polar();
        polar.engine_mut().fail_constant = true;
        let err = polar
            .register_class(Class::builder::<Dog>("Dog").build())
            .unwrap_err();
        assert!(matches!(err, HostError::Engine(EngineError::Call { .. })));
        assert!(!polar.host().classes().contains("Dog"));
        assert_eq!(polar.class_id("Dog"), None);

        polar.engine_mut().fail_constant = false;
        polar
            .register_class(Class::builder::<Dog>("Dog").build())
            .unwrap();
        assert!(polar.host().classes().contains("Dog"));
        assert_eq!(polar.engine().constants.len(), 1);
    }

    #[test]
    fn register_class_twice_is_duplicate_without_engine_call() {
        let mut polar = polar();
        polar.register_class(Class::builder::<Dog>("Dog").build()).unwrap();
        let err = polar
            .register_class(Class::builder::<Dog>("Dog").build())
            .unwrap_err();
        assert!(matches!(err, HostError::Class(ClassError::DuplicateClass { .. })));
        assert_eq!(polar.engine().constants.len(), 1);
    }

    #[test]
    fn load_str_serializes_sources() {
        let mut polar = polar();
        polar.load_str("allow(\"a\", _, _);").unwrap();
        let loaded: serde_json::Value = serde_json::from_str(&polar.engine().loaded[0]).unwrap();
        assert_eq!(loaded[0]["src"], "allow(\"a\", _, _);");
        assert!(loaded[0]["filename"].is_null());
    }

    #[test]
    fn load_files_reads_and_names_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.polar");
        std::fs::write(&path, "f(1);").unwrap();
        let mut polar = polar();
        polar.load_files(&[&path]).unwrap();
        let loaded: serde_json::Value = serde_json::from_str(&polar.engine().loaded[0]).unwrap();
        assert_eq!(loaded[0]["src"], "f(1);");
        assert_eq!(loaded[0]["filename"], path.display().to_string());
    }

    #[test]
    fn load_missing_file_fails() {
        let mut polar = polar();
        let err = polar.load_files(&["/definitely/not/here.polar"]).unwrap_err();
        assert!(matches!(err, HostError::Engine(EngineError::SourceRead { .. })));
    }

    #[test]
    fn engine_failure_propagates() {
        let mut polar = Polar::new(
            RecordingEngine {
                fail_load: true,
                ..Default::default()
            },
            HostConfig::default(),
        );
        let err = polar.load_str("x").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn queries_carry_trace_level() {
        let mut polar = Polar::new(
            RecordingEngine::default(),
            HostConfig {
                trace: 1,
                ..Default::default()
            },
        );
        polar.query_str("f(x)").unwrap();
        polar
            .query_value(&HostValue::Predicate(Predicate::new(
                "f",
                vec![HostValue::Integer(1)],
            )))
            .unwrap();
        let queries = &polar.engine().queries;
        assert_eq!(queries[0], ("f(x)".to_string(), 1));
        let sent = Term::parse(&queries[1].0).unwrap();
        assert_eq!(sent.tag(), "Call");
        assert_eq!(queries[1].1, 1);
    }

    #[test]
    fn messages_drain() {
        let mut polar = polar();
        polar.engine_mut().messages = vec!["b".into(), "a".into()];
        assert_eq!(polar.messages().unwrap(), vec!["a", "b"]);
        assert!(polar.messages().unwrap().is_empty());
    }

    #[test]
    fn filter_plan_is_forwarded() {
        let mut polar = polar();
        assert_eq!(polar.build_filter_plan("{}", "[]", "x", "User").unwrap(), "x:User");
    }
}
