//! 活跃度记账 - 忙/闲转换的观察者接口
//! Activation accounting - observer interface for busy/idle transitions
//!
//! 观察者仅用于记账（例如用于准入控制的活跃连接计数），没有改变
//! 连接状态的权力。
//!
//! Observers are used purely for bookkeeping (e.g. active-connection
//! counts for admission control); they carry no authority to alter
//! connection state.

use crate::timer::event::ConnectionId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer notified when a connection transitions between busy and idle.
///
/// 当连接在忙与闲之间转换时收到通知的观察者。
pub trait ActivationCallback: Send + Sync {
    /// 当连接变为忙时调用
    /// Invoked when the connection becomes busy
    fn on_activated(&self, connection_id: ConnectionId);

    /// 当连接变为闲时调用
    /// Invoked when the connection becomes idle
    fn on_deactivated(&self, connection_id: ConnectionId);
}

/// An [`ActivationCallback`] keeping a running count of busy connections,
/// suitable for a manager's load-shedding decisions.
///
/// 维护忙连接计数的 [`ActivationCallback`]，适合管理器的减载决策。
#[derive(Debug, Default)]
pub struct ActiveConnectionCounter {
    active: AtomicUsize,
}

impl ActiveConnectionCounter {
    /// 创建新的计数器
    /// Create a new counter
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前处于忙状态的连接数
    /// Number of connections currently busy
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl ActivationCallback for ActiveConnectionCounter {
    fn on_activated(&self, _connection_id: ConnectionId) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    fn on_deactivated(&self, _connection_id: ConnectionId) {
        // 饱和递减，观察者必须经受冗余通知
        // Saturating decrement, observers must tolerate redundant notifications
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }
}
