//! 定义了连接管理器的可配置参数。
//! Defines configurable parameters for the connection manager.

use std::time::Duration;

/// A structure containing all configurable parameters for a connection manager.
///
/// 包含连接管理器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// The default idle timeout applied by `reset_timeout()`. Every unit of
    /// application activity pushes the deadline forward by this interval;
    /// expiry without a reset is the sole trigger for idle-based eviction.
    ///
    /// `reset_timeout()` 所应用的默认空闲超时。每次应用层活动都会把截止
    /// 时间向前推进这个间隔；未被重置的到期是空闲驱逐的唯一触发条件。
    pub default_idle_timeout: Duration,

    /// The capacity of the timer facility's command channel.
    /// 定时器设施命令通道的容量。
    pub timer_channel_capacity: usize,

    /// The capacity of each connection's timeout event channel.
    /// 每个连接的超时事件通道的容量。
    pub timeout_event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_idle_timeout: Duration::from_secs(5),
            timer_channel_capacity: 1024,
            timeout_event_capacity: 32,
        }
    }
}
