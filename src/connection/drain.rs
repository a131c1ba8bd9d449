//! 排空状态机
//! Drain state machine
//!
//! 两阶段排空协议：先警告连接的应用层逻辑关闭将至，然后指示它在
//! 下次空闲时真正关闭。状态只能前进，不匹配前置状态的转换请求是
//! 静默的空操作而非错误，因此管理器可以对整个连接集合重复扫描，
//! 无需跟踪每个连接的进度。
//!
//! The two-phase drain protocol: first warn the connection's
//! application-level logic that shutdown is coming, then instruct it to
//! actually close once it next becomes idle. The state only advances;
//! a transition request that does not match the required predecessor
//! state is a silent no-op, never an error, so a manager may repeat
//! drain sweeps across its whole population without tracking
//! per-connection progress.

/// The drain state of a managed connection. Monotonically advances;
/// never regresses.
///
/// 受管连接的排空状态。单调前进，永不回退。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainState {
    /// 初始状态，尚未收到任何排空信号。
    /// Initial state, no drain signal received yet.
    #[default]
    None,
    /// 已通知连接关闭即将到来。
    /// The connection has been notified that shutdown is pending.
    NotifiedPendingShutdown,
    /// 已指示连接在下次空闲时关闭。此状态机的终态；实际的连接拆除
    /// 是子类型的独立行为。
    /// The connection has been instructed to close when next idle.
    /// Terminal for this state machine; actual teardown is a separate,
    /// subtype-specific act.
    ClosingWhenIdle,
}

impl DrainState {
    /// Advances `None` to `NotifiedPendingShutdown`. Returns whether the
    /// transition took place, so the caller fires the notify hook at most
    /// once per connection lifetime.
    ///
    /// 将 `None` 推进到 `NotifiedPendingShutdown`。返回转换是否发生，
    /// 使调用者在连接生命周期内最多触发一次通知钩子。
    pub fn advance_notify(&mut self) -> bool {
        if *self == DrainState::None {
            *self = DrainState::NotifiedPendingShutdown;
            true
        } else {
            false
        }
    }

    /// Advances to `ClosingWhenIdle` from `NotifiedPendingShutdown`, or
    /// from any state when `force` is set (the abrupt shutdown path that
    /// skips the notify phase). Returns whether the transition took place.
    ///
    /// 从 `NotifiedPendingShutdown` 推进到 `ClosingWhenIdle`；当设置了
    /// `force` 时可以从任意状态推进（跳过通知阶段的突然关闭路径）。
    /// 返回转换是否发生。
    pub fn advance_close(&mut self, force: bool) -> bool {
        if *self == DrainState::ClosingWhenIdle {
            return false;
        }
        if force || *self == DrainState::NotifiedPendingShutdown {
            *self = DrainState::ClosingWhenIdle;
            true
        } else {
            false
        }
    }
}
