// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # polar-host
//!
//! Host-side bridge between native Rust values and a Polar policy engine.
//!
//! The engine speaks JSON "terms". This crate converts them to and from
//! [`value::HostValue`], keeps the objects the engine refers to by id, and
//! answers the engine's callbacks (construction, class checks, comparisons).
//!
//! ## Architecture
//!
//! - **Terms** (`terms`): typed wire format with a strict JSON reader and writer
//! - **Values** (`value`): native values, including opaque shared objects
//! - **Codec** (`codec`): term ⇄ value conversion against the registries
//! - **Registries** (`registry`, `class`): instance cache and class table with MROs
//! - **Session** (`host`, `events`): engine callbacks and event dispatch
//! - **Facade** (`polar`): one engine plus one host session
//!
//! ## Library usage
//!
//! ```no_run
//! use polar_host::class::Class;
//! use polar_host::host::Host;
//! use polar_host::terms::Term;
//!
//! #[derive(Debug, Default)]
//! struct User;
//!
//! let host = Host::default();
//! host.register_class(Class::builder::<User>("User").default_constructor().build())
//!     .unwrap();
//! let term = Term::parse(r#"{"value":{"Call":{"name":"User","args":[]}}}"#).unwrap();
//! host.make_instance_from_call(&term, 7).unwrap();
//! assert!(host.has_instance(7));
//! ```

pub mod class;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod polar;
pub mod registry;
pub mod terms;
pub mod value;
