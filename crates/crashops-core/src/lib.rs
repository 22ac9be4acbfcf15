//! CrashOps Core - Domain types and boundaries
//!
//! This crate contains the pieces every other CrashOps crate agrees on:
//! - **Domain entities** - `CrashReport`, `StackFrame`, `Session`, `Scalar`
//! - **Error taxonomy** - `StorageError`, `RegistrationError`, `DeliveryError`,
//!   `ConfigurationError`
//! - **Port definitions** - `IReportStore`, `IRemoteTransport`, `IHostScheduler`
//! - **Configuration** - YAML-backed `Config` that also acts as the settings source
//!
//! # Architecture
//!
//! Ports are traits implemented by adapter crates (`crashops-store`,
//! `crashops-delivery`). The capture and delivery components only ever talk
//! to storage and the network through these traits.

pub mod config;
pub mod domain;
pub mod ports;
