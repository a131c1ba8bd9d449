//! 具体连接类型必须实现的抽象契约
//! The abstract contract a concrete connection type must implement
//!
//! 核心持有该能力集合的多态句柄，而不是具体类型；每种具体连接
//! （HTTP连接、TLS连接等）提供一个实现。
//!
//! The core holds a polymorphic handle to this capability set rather
//! than a concrete type; each concrete connection kind (an HTTP
//! connection, a TLS connection, ...) provides one implementation.

use std::fmt;
use std::time::Duration;

/// Interface describing a connection that can be managed by a container
/// such as an acceptor.
///
/// 描述可由接受器等容器管理的连接的接口。
pub trait ManagedConnection: Send + 'static {
    /// Invoked by the timeout scheduling facility when the idle window
    /// elapses without a reset. The implementation decides whether to
    /// actually close, typically by consulting `is_busy()`. Must not
    /// panic.
    ///
    /// 当空闲窗口到期且未被重置时由超时调度设施调用。实现决定是否
    /// 真正关闭，通常会查询 `is_busy()`。不得panic。
    fn timeout_expired(&mut self);

    /// Renders a human-readable identity of the connection. Side-effect
    /// free.
    ///
    /// 渲染连接的人类可读标识。无副作用。
    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// 检查连接是否有未完成的请求。
    /// Check whether the connection has any requests outstanding.
    fn is_busy(&self) -> bool;

    /// How long the connection has been idle. Returning zero means the
    /// connection is never dropped by idle-based eviction during the
    /// pre-shutdown load-shedding stage, regardless of elapsed time.
    ///
    /// 连接已空闲的时长。返回零表示该连接在预关闭减载阶段永远不会
    /// 被基于空闲的驱逐选中，无论经过多久。
    fn idle_time(&self) -> Duration {
        Duration::ZERO
    }

    /// Notify the connection that a shutdown is pending. Called at most
    /// once, at the beginning of graceful shutdown.
    ///
    /// 通知连接关闭即将到来。最多调用一次，在优雅关闭开始时。
    fn notify_pending_shutdown(&mut self);

    /// Instruct the connection to shut down as soon as it is safe.
    /// Called at most once, after `notify_pending_shutdown()` (or
    /// directly, on the forced path).
    ///
    /// 指示连接在安全时尽快关闭。最多调用一次，在
    /// `notify_pending_shutdown()` 之后（或在强制路径上直接调用）。
    fn close_when_idle(&mut self);

    /// Forcibly drop the connection. If a request is in progress, this
    /// should cause the connection to be closed with a reset.
    ///
    /// 强制丢弃连接。如果有请求正在进行，应使连接以重置方式关闭。
    fn drop_connection(&mut self);

    /// Emit a diagnostic description of the connection at the given
    /// verbosity. Must not mutate state.
    ///
    /// 以给定的详细程度输出连接的诊断描述。不得改变状态。
    fn dump_state(&self, level: u8);
}

/// Display adapter rendering a connection's identity via
/// [`ManagedConnection::describe`], for use in logs.
///
/// 通过 [`ManagedConnection::describe`] 渲染连接标识的Display适配器，
/// 用于日志。
pub struct Describe<'a, C: ?Sized>(pub &'a C);

impl<C: ManagedConnection + ?Sized> fmt::Display for Describe<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.describe(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedConnection {
        name: &'static str,
    }

    impl ManagedConnection for NamedConnection {
        fn timeout_expired(&mut self) {}
        fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "conn[{}]", self.name)
        }
        fn is_busy(&self) -> bool {
            false
        }
        fn notify_pending_shutdown(&mut self) {}
        fn close_when_idle(&mut self) {}
        fn drop_connection(&mut self) {}
        fn dump_state(&self, _level: u8) {}
    }

    #[test]
    fn test_describe_adapter_renders_identity() {
        let conn = NamedConnection { name: "peer-1" };
        assert_eq!(format!("{}", Describe(&conn)), "conn[peer-1]");
    }

    #[test]
    fn test_idle_time_defaults_to_zero() {
        let conn = NamedConnection { name: "peer-2" };
        assert_eq!(conn.idle_time(), Duration::ZERO);
    }
}
