#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the managed-connection lifecycle library.
//! 受管连接生命周期库的根。

pub mod config;
pub mod error;

pub mod connection;
pub mod guard;
pub mod manager;
pub mod timer;

pub use connection::{
    ActivationCallback, ActiveConnectionCounter, Describe, DrainState, Managed, ManagedConnection,
};
pub use guard::{DestructionGuard, GuardScope};
pub use manager::{ConnectionRegistry, ManagerContext};
pub use timer::{start_timer_facility, TimerFacilityHandle, TimerHandle, TimerRegistration};
