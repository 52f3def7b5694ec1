//! Infrastructure layer for the session runner.
//!
//! Contains the concrete adapters: device gateway backends and file-system
//! storage for the runner's configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keystudio_core`, but MUST NOT be imported by the `application` layer.

pub mod gateway;
pub mod storage;
