//! 定时器事件定义
//! Timer Event Definitions
//!
//! 该模块定义了超时调度设施使用的标识符和事件数据结构。
//!
//! This module defines the identifiers and event data structures used by
//! the timeout scheduling facility.

/// 定时器条目ID，用于唯一标识一次注册
/// Timer entry ID, used to uniquely identify a single registration
pub type TimerEntryId = u64;

/// 连接ID，用于标识定时器属于哪个连接
/// Connection ID, used to identify which connection a timer belongs to
pub type ConnectionId = u32;

/// 超时种类
/// Timeout kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// The idle-timeout slot. At most one registration of this kind is
    /// active per connection at any instant; resets replace it.
    ///
    /// 空闲超时槽位。任意时刻每个连接最多只有一个此类注册；重置会
    /// 替换它。
    Idle,

    /// An auxiliary timer scheduled by a concrete connection, orthogonal
    /// to the idle slot. The discriminant is opaque to this library so
    /// that subtypes can multiplex several auxiliary timers over one
    /// channel.
    ///
    /// 由具体连接调度的辅助定时器，与空闲槽位正交。判别值对本库不
    /// 透明，以便子类型在一个通道上复用多个辅助定时器。
    User(u64),
}

/// 定时器事件数据，在延迟到期且未被取消时投递给注册者
/// Timer event data, delivered to the registrant when the delay elapses
/// without cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEventData {
    /// 触发的注册条目ID；注册者用它来识别被替换注册的过期事件
    /// Entry ID of the firing registration; registrants use it to
    /// recognize stale events from replaced registrations
    pub entry_id: TimerEntryId,
    /// 连接ID
    /// Connection ID
    pub connection_id: ConnectionId,
    /// 超时种类
    /// Timeout kind
    pub kind: TimeoutKind,
}

impl TimerEventData {
    /// 创建新的定时器事件数据
    /// Create new timer event data
    pub fn new(entry_id: TimerEntryId, connection_id: ConnectionId, kind: TimeoutKind) -> Self {
        Self {
            entry_id,
            connection_id,
            kind,
        }
    }
}

impl std::fmt::Display for TimerEventData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimerEvent(entry: {}, conn: {}, kind: {:?})",
            self.entry_id, self.connection_id, self.kind
        )
    }
}
