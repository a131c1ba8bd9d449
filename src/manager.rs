//! 连接管理器边界 - 连接所弱引用的共享状态
//! Connection manager boundary - the shared state connections reference
//! weakly
//!
//! 完整的连接管理器（聚合连接、决定何时开始全服务器关闭）是外部
//! 协作者；本模块只规定连接所消费的接口：默认超时间隔、共享的
//! 超时调度设施，以及显式的成员注册表。成员关系是注册表中可移除
//! 的条目，而不是嵌入连接的指针。
//!
//! The full connection manager (aggregating connections, deciding when a
//! server-wide shutdown begins) is an external collaborator; this module
//! specifies only the interface connections consume: the default timeout
//! interval, the shared timeout scheduling facility, and the explicit
//! membership registry. Membership is a removable entry in that registry,
//! not a pointer embedded in the connection.

use crate::config::ManagerConfig;
use crate::connection::activation::ActivationCallback;
use crate::timer::{ConnectionId, TimerFacilityHandle};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// dashmap支撑的连接成员索引。一个连接同一时刻至多属于一个管理器
/// 的被跟踪集合；该不变量由连接侧的挂接协议保证。
///
/// A dashmap-backed index of connection membership. A connection belongs
/// to at most one manager's tracked set at a time; that invariant is
/// upheld by the connection-side attach protocol.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: DashMap<ConnectionId, ()>,
}

impl ConnectionRegistry {
    /// 创建空的注册表
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a membership entry. Returns `false` if the id was already
    /// tracked.
    ///
    /// 插入成员条目。若该id已被跟踪则返回 `false`。
    pub fn insert(&self, connection_id: ConnectionId) -> bool {
        self.members.insert(connection_id, ()).is_none()
    }

    /// Removes a membership entry. Returns whether it was present.
    ///
    /// 移除成员条目。返回其先前是否存在。
    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        self.members.remove(&connection_id).is_some()
    }

    /// 该id当前是否被跟踪
    /// Whether the id is currently tracked
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.members.contains_key(&connection_id)
    }

    /// 被跟踪的连接数
    /// Number of tracked connections
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// 是否为空
    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 当前被跟踪的连接id快照
    /// Snapshot of the currently tracked connection ids
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|entry| *entry.key()).collect()
    }
}

/// The manager-side state a managed connection references (weakly, never
/// owning): the shared timeout scheduling facility, the default idle
/// timeout interval, the activation observer, and the membership registry.
///
/// 受管连接所（弱）引用而从不拥有的管理器侧状态：共享的超时调度
/// 设施、默认空闲超时间隔、活跃度观察者以及成员注册表。
pub struct ManagerContext {
    timer: TimerFacilityHandle,
    default_idle_timeout: Duration,
    timeout_event_capacity: usize,
    activation: Option<Arc<dyn ActivationCallback>>,
    registry: ConnectionRegistry,
}

impl std::fmt::Debug for ManagerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerContext")
            .field("default_idle_timeout", &self.default_idle_timeout)
            .field("tracked", &self.registry.len())
            .finish()
    }
}

impl ManagerContext {
    /// 创建新的管理器上下文
    /// Create a new manager context
    pub fn new(config: &ManagerConfig, timer: TimerFacilityHandle) -> Arc<Self> {
        Self::build(config, timer, None)
    }

    /// 创建带活跃度观察者的管理器上下文
    /// Create a manager context with an activation observer
    pub fn with_activation(
        config: &ManagerConfig,
        timer: TimerFacilityHandle,
        activation: Arc<dyn ActivationCallback>,
    ) -> Arc<Self> {
        Self::build(config, timer, Some(activation))
    }

    fn build(
        config: &ManagerConfig,
        timer: TimerFacilityHandle,
        activation: Option<Arc<dyn ActivationCallback>>,
    ) -> Arc<Self> {
        debug!(
            default_idle_timeout = ?config.default_idle_timeout,
            "Creating manager context"
        );
        Arc::new(Self {
            timer,
            default_idle_timeout: config.default_idle_timeout,
            timeout_event_capacity: config.timeout_event_capacity,
            activation,
            registry: ConnectionRegistry::new(),
        })
    }

    /// 管理器配置的默认空闲超时间隔
    /// The manager's configured default idle timeout interval
    pub fn default_idle_timeout(&self) -> Duration {
        self.default_idle_timeout
    }

    /// 每个连接超时事件通道的容量
    /// Capacity of each connection's timeout event channel
    pub fn timeout_event_capacity(&self) -> usize {
        self.timeout_event_capacity
    }

    /// 共享的超时调度设施
    /// The shared timeout scheduling facility
    pub fn timer(&self) -> &TimerFacilityHandle {
        &self.timer
    }

    /// 活跃度观察者
    /// The activation observer
    pub fn activation(&self) -> Option<&Arc<dyn ActivationCallback>> {
        self.activation.as_ref()
    }

    /// 成员注册表
    /// The membership registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Allocates a fresh connection id and records its membership entry.
    /// Retries on the (unlikely) collision with a live entry.
    ///
    /// 分配新的连接id并记录其成员条目。与存活条目（不太可能地）
    /// 冲突时重试。
    pub(crate) fn allocate_connection_id(&self) -> ConnectionId {
        loop {
            let candidate = rand::random::<ConnectionId>();
            if self.registry.insert(candidate) {
                trace!(cid = candidate, "Allocated connection id");
                return candidate;
            }
        }
    }
}
