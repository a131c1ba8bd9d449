//! 受管连接核心 - 排空状态机、空闲超时与生命周期契约
//! Managed connection core - drain state machine, idle timeout, and the
//! lifecycle contract
//!
//! 该模块定义了高吞吐网络服务器中每个连接对象共享的生命周期契约：
//! 空闲时如何超时、如何参与协调的优雅关闭（"排空"）、如何被强制
//! 拆除，以及在回调仍可能执行时如何安全地经受异步销毁。
//!
//! This module defines the lifecycle contract shared by every connection
//! object managed inside a high-throughput network server: how a
//! connection is timed out when idle, how it participates in coordinated
//! graceful shutdown ("draining"), how it is forcibly torn down, and how
//! it survives asynchronous destruction safely while callbacks may still
//! be executing against it.

pub mod activation;
pub mod drain;
pub mod hooks;
pub mod managed;

pub use activation::{ActivationCallback, ActiveConnectionCounter};
pub use drain::DrainState;
pub use hooks::{Describe, ManagedConnection};
pub use managed::Managed;
