//! Plugin execution engine for Spectriq Studio.
//!
//! The engine loads externally-authored processing plugins, validates the
//! configuration they declare, and runs each connected plugin on a
//! dedicated worker thread behind a strict request/response protocol. The
//! design goals are containment and predictability: a plugin that throws,
//! panics, or hangs can end its own session, but it can never crash,
//! deadlock, or starve the host thread.
//!
//! The moving parts:
//!
//! - [`UnitLoader`] resolves stable identifiers to cached plugin units,
//!   from in-process factories or dynamic libraries.
//! - [`validate`] normalizes a declared configuration into the canonical
//!   form everything else consumes.
//! - [`PluginController`] owns the lifecycle state machine
//!   (select → connect → enable → disconnect) and applies responses to
//!   host-side state.
//! - The worker (internal) owns the plugin instance while connected and is
//!   the only code that touches plugin hooks after that point.
//!
//! Exactly one plugin can be connected per controller. The two queues
//! between controller and worker are strictly FIFO, so responses are
//! observed in dispatch order; the reserved shutdown and poison sentinels
//! are dedicated message arms and cannot collide with payloads.

mod controller;
mod error;
mod loader;
mod shell;
mod validate;
mod worker;

pub use controller::{
    ControllerOptions, DispatchOutcome, LifecycleState, PluginController, SkipReason,
};
pub use error::HostError;
pub use loader::{PluginEntryPoint, PluginSource, PluginUnit, UnitLoader};
pub use shell::{
    DependencyResolver, GraphSurface, InstrumentLink, Notifier, RecordSink, SharedReading, Shell,
};
pub use validate::{validate, ValidationError};
