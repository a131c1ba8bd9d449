//! 受管连接核心实现
//! Managed connection core implementation
//!
//! `Managed<C>` 包装一个具体连接并为其实现生命周期契约：带守卫的
//! 幂等排空转换、滑动窗口式的空闲超时重置、活跃度通知、强制丢弃，
//! 以及经由延迟销毁保护的安全拆除。所有操作都假定每个连接只有一条
//! 逻辑执行线程；本类型不提供内部加锁。
//!
//! `Managed<C>` wraps a concrete connection and implements the lifecycle
//! contract for it: guarded idempotent drain transitions, sliding-window
//! idle timeout resets, activation notifications, forced drop, and safe
//! teardown via the deferred-destruction guard. All operations assume a
//! single logical thread of execution per connection; this type provides
//! no internal locking.

use crate::connection::activation::ActivationCallback;
use crate::connection::drain::DrainState;
use crate::connection::hooks::{Describe, ManagedConnection};
use crate::error::Result;
use crate::guard::DestructionGuard;
use crate::manager::ManagerContext;
use crate::timer::event::{ConnectionId, TimeoutKind, TimerEventData};
use crate::timer::handle::{TimerHandle, TimerRegistration};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// 未挂接连接的超时事件通道默认容量
/// Default timeout event channel capacity for unattached connections
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// A connection under lifecycle management.
///
/// Created by a concrete subtype when a transport-level connection is
/// accepted, then attached to a manager shortly after. The manager drives
/// drain sweeps and timeout resets through this wrapper; the connection
/// itself reports busy/idle transitions and polls timeout events from its
/// event loop.
///
/// 处于生命周期管理之下的连接。
///
/// 在传输层连接被接受时由具体子类型创建，随后很快挂接到管理器。
/// 管理器通过该包装驱动排空扫描和超时重置；连接自身报告忙/闲转换，
/// 并在其事件循环中轮询超时事件。
pub struct Managed<C: ManagedConnection> {
    conn: C,
    drain: DrainState,
    /// 对至多一个管理器的非拥有回引用
    /// Non-owning back-reference to at most one manager
    manager: Option<Weak<ManagerContext>>,
    connection_id: Option<ConnectionId>,
    /// 唯一的空闲超时槽位；重置总是替换而不是叠加
    /// The single idle-timeout slot; resets always replace, never stack
    idle_timer: Option<TimerHandle>,
    timeout_tx: mpsc::Sender<TimerEventData>,
    timeout_rx: mpsc::Receiver<TimerEventData>,
    guard: DestructionGuard,
    activation: Option<Arc<dyn ActivationCallback>>,
}

impl<C: ManagedConnection> Managed<C> {
    /// 创建新的受管连接（尚未挂接到任何管理器）
    /// Create a new managed connection (not yet attached to any manager)
    pub fn new(conn: C) -> Self {
        Self::with_event_capacity(conn, DEFAULT_EVENT_CAPACITY)
    }

    /// 创建带指定超时事件通道容量的受管连接
    /// Create a managed connection with the given timeout event channel capacity
    pub fn with_event_capacity(conn: C, capacity: usize) -> Self {
        let (timeout_tx, timeout_rx) = mpsc::channel(capacity);
        Self {
            conn,
            drain: DrainState::default(),
            manager: None,
            connection_id: None,
            idle_timer: None,
            timeout_tx,
            timeout_rx,
            guard: DestructionGuard::new(),
            activation: None,
        }
    }

    /// 创建并立即挂接到管理器
    /// Create and immediately attach to a manager
    pub async fn attached(conn: C, ctx: &Arc<ManagerContext>) -> Self {
        let mut managed = Self::with_event_capacity(conn, ctx.timeout_event_capacity());
        managed.attach(ctx).await;
        managed
    }

    // === 挂接协议 Attach protocol ===

    /// Registers this connection with a manager: allocates a membership
    /// entry, installs the weak back-reference and the manager's
    /// activation observer. Attaching to a second manager first detaches
    /// from the current one, so a connection is never tracked by two
    /// managers simultaneously. Attaching again to the same manager is a
    /// no-op.
    ///
    /// 将连接注册到管理器：分配成员条目，安装弱回引用和管理器的活跃
    /// 度观察者。挂接到第二个管理器会先从当前管理器脱离，因此一个
    /// 连接永远不会同时被两个管理器跟踪。重复挂接到同一管理器是
    /// 空操作。
    pub async fn attach(&mut self, ctx: &Arc<ManagerContext>) -> ConnectionId {
        if let (Some(weak), Some(id)) = (&self.manager, self.connection_id)
            && let Some(current) = weak.upgrade()
            && Arc::ptr_eq(&current, ctx)
        {
            return id;
        }

        self.detach().await;

        let id = ctx.allocate_connection_id();
        self.manager = Some(Arc::downgrade(ctx));
        self.connection_id = Some(id);
        self.activation = ctx.activation().cloned();
        debug!(cid = id, conn = %Describe(&self.conn), "Attached connection to manager");
        id
    }

    /// Releases the manager back-reference and the membership entry, and
    /// invalidates all pending timeout registrations tied to the
    /// manager's facility. Invoked by the manager; a connection must be
    /// detached before its manager is destroyed.
    ///
    /// 释放管理器回引用和成员条目，并使与该管理器设施绑定的所有
    /// 未到期超时注册失效。由管理器调用；连接必须在其管理器被销毁
    /// 之前脱离。
    pub async fn detach(&mut self) {
        let manager = self.manager.take().and_then(|weak| weak.upgrade());
        self.activation = None;
        let Some(id) = self.connection_id.take() else {
            return;
        };
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        if let Some(ctx) = manager {
            ctx.registry().remove(id);
            if let Err(err) = ctx.timer().clear_connection(id).await {
                trace!(cid = id, error = %err, "Facility gone while detaching");
            }
            debug!(cid = id, "Detached connection from manager");
        }
    }

    // === 排空协议 Drain protocol ===

    /// First phase of the drain protocol. Transitions `None` to
    /// `NotifiedPendingShutdown` and fires the subtype's notify hook;
    /// any other current state makes this a silent no-op. The hook fires
    /// at most once per connection lifetime.
    ///
    /// 排空协议的第一阶段。将 `None` 转换到 `NotifiedPendingShutdown`
    /// 并触发子类型的通知钩子；处于任何其他状态时这是静默的空操作。
    /// 钩子在连接生命周期内最多触发一次。
    pub fn fire_notify_pending_shutdown(&mut self) {
        if self.drain.advance_notify() {
            debug!(
                cid = self.connection_id,
                conn = %Describe(&self.conn),
                "Drain: notifying pending shutdown"
            );
            let _scope = self.guard.scope();
            self.conn.notify_pending_shutdown();
        }
    }

    /// Second phase of the drain protocol. Transitions to
    /// `ClosingWhenIdle` and fires the subtype's close hook if the notify
    /// phase has run, or unconditionally when `force` is set; otherwise a
    /// silent no-op. The hook fires at most once.
    ///
    /// 排空协议的第二阶段。若通知阶段已执行（或设置了 `force`）则
    /// 转换到 `ClosingWhenIdle` 并触发子类型的关闭钩子；否则为静默
    /// 空操作。钩子最多触发一次。
    pub fn fire_close_when_idle(&mut self, force: bool) {
        if self.drain.advance_close(force) {
            debug!(
                cid = self.connection_id,
                force,
                conn = %Describe(&self.conn),
                "Drain: closing when idle"
            );
            let _scope = self.guard.scope();
            self.conn.close_when_idle();
        }
    }

    // === 空闲超时 Idle timeout ===

    /// Reschedules the idle-expiry callback to fire after the manager's
    /// default interval from now, replacing any previously pending
    /// registration. Without an attached manager this is a no-op and
    /// registers nothing.
    ///
    /// 将空闲到期回调重新调度为从现在起管理器默认间隔后触发，替换
    /// 任何先前未到期的注册。未挂接管理器时这是空操作，不注册任何
    /// 定时器。
    pub async fn reset_timeout(&mut self) -> Result<()> {
        let Some(ctx) = self.upgraded_manager() else {
            trace!("reset_timeout without a manager is a no-op");
            return Ok(());
        };
        // 裸reset总是回到管理器默认值；此前的自定义间隔不被记住
        // A bare reset always reverts to the manager default; an earlier
        // custom interval is not remembered
        let interval = ctx.default_idle_timeout();
        self.reset_timeout_to(interval).await
    }

    /// Like [`reset_timeout`](Self::reset_timeout), but with an explicit
    /// interval overriding the manager's default for this one deadline.
    ///
    /// 类似 [`reset_timeout`](Self::reset_timeout)，但使用显式间隔覆盖
    /// 管理器默认值，仅对本次截止时间生效。
    pub async fn reset_timeout_to(&mut self, interval: Duration) -> Result<()> {
        let Some(ctx) = self.upgraded_manager() else {
            return Ok(());
        };
        let Some(id) = self.connection_id else {
            return Ok(());
        };

        if let Some(previous) = self.idle_timer.take() {
            // 已触发的注册留下的过期事件由entry id识别并丢弃
            // A stale event from an already-fired registration is
            // recognized by entry id and discarded
            let _ = previous.cancel().await;
        }

        let registration =
            TimerRegistration::new(id, interval, TimeoutKind::Idle, self.timeout_tx.clone());
        let handle = ctx.timer().register(registration).await?;
        trace!(cid = id, ?interval, entry_id = handle.entry_id, "Idle timeout (re)scheduled");
        self.idle_timer = Some(handle);
        Ok(())
    }

    /// Registers an arbitrary auxiliary timer on the shared facility,
    /// independent of the idle-timeout slot. The event is delivered
    /// through [`poll_timeout_events`](Self::poll_timeout_events) as
    /// `TimeoutKind::User(discriminant)`. Without a manager this returns
    /// `Ok(None)`.
    ///
    /// 在共享设施上注册任意辅助定时器，与空闲超时槽位无关。事件以
    /// `TimeoutKind::User(discriminant)` 的形式通过
    /// [`poll_timeout_events`](Self::poll_timeout_events) 投递。未挂接
    /// 管理器时返回 `Ok(None)`。
    pub async fn schedule_timeout(
        &self,
        discriminant: u64,
        delay: Duration,
    ) -> Result<Option<TimerHandle>> {
        let Some(ctx) = self.upgraded_manager() else {
            return Ok(None);
        };
        let Some(id) = self.connection_id else {
            return Ok(None);
        };
        let registration = TimerRegistration::new(
            id,
            delay,
            TimeoutKind::User(discriminant),
            self.timeout_tx.clone(),
        );
        Ok(Some(ctx.timer().register(registration).await?))
    }

    /// Drains delivered timeout events. An idle expiry matching the
    /// current registration dispatches the subtype's `timeout_expired()`
    /// inside a guard scope; stale idle events from replaced
    /// registrations are discarded. Auxiliary timer kinds are returned to
    /// the caller.
    ///
    /// 排空已投递的超时事件。与当前注册匹配的空闲到期会在保护作用域
    /// 内分发子类型的 `timeout_expired()`；来自被替换注册的过期空闲
    /// 事件被丢弃。辅助定时器种类返回给调用者。
    pub fn poll_timeout_events(&mut self) -> Vec<TimeoutKind> {
        let mut user_events = Vec::new();
        while let Ok(event) = self.timeout_rx.try_recv() {
            match event.kind {
                TimeoutKind::Idle => {
                    let current = self.idle_timer.as_ref().map(|handle| handle.entry_id);
                    if current != Some(event.entry_id) {
                        trace!(
                            cid = event.connection_id,
                            entry_id = event.entry_id,
                            "Discarding stale idle timeout event"
                        );
                        continue;
                    }
                    self.idle_timer = None;
                    debug!(
                        cid = event.connection_id,
                        conn = %Describe(&self.conn),
                        "Idle window elapsed without reset"
                    );
                    let _scope = self.guard.scope();
                    self.conn.timeout_expired();
                }
                TimeoutKind::User(_) => user_events.push(event.kind),
            }
        }
        user_events
    }

    // === 活跃度 Activation ===

    /// Reports that work has started on this connection. Notifies the
    /// manager's activation observer, which uses it purely for
    /// bookkeeping.
    ///
    /// 报告该连接上有工作开始。通知管理器的活跃度观察者，后者仅
    /// 将其用于记账。
    pub fn on_busy(&self) {
        if let (Some(callback), Some(id)) = (&self.activation, self.connection_id) {
            callback.on_activated(id);
        }
    }

    /// 报告该连接上的工作已全部完成
    /// Reports that all work on this connection has completed
    pub fn on_idle(&self) {
        if let (Some(callback), Some(id)) = (&self.activation, self.connection_id) {
            callback.on_deactivated(id);
        }
    }

    // === 强制丢弃与销毁 Forced drop and destruction ===

    /// Unconditionally and immediately terminates the connection,
    /// bypassing the drain protocol, then requests destruction through
    /// the guard. Returns whether the connection may be torn down right
    /// now (`false` while a callback scope is still live).
    ///
    /// 无条件地立即终止连接，绕过排空协议，然后通过保护器请求销毁。
    /// 返回连接现在是否可以被拆除（回调作用域仍存活时为 `false`）。
    pub fn drop_connection(&mut self) -> bool {
        debug!(
            cid = self.connection_id,
            conn = %Describe(&self.conn),
            "Forcibly dropping connection"
        );
        // 丢弃后空闲注册不得触发到已死的通道
        // The idle registration must not fire into a dead channel after the drop
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        {
            let _scope = self.guard.scope();
            self.conn.drop_connection();
        }
        self.guard.request_destroy()
    }

    /// Marks this connection for destruction. Safe to call from within
    /// one of the connection's own callbacks (via a clone of
    /// [`guard`](Self::guard)); teardown is deferred until the outermost
    /// callback scope exits.
    ///
    /// 将连接标记为待销毁。可以在连接自身的回调内部（通过
    /// [`guard`](Self::guard) 的克隆）安全调用；拆除被推迟到最外层
    /// 回调作用域退出。
    pub fn request_destroy(&mut self) -> bool {
        self.guard.request_destroy()
    }

    /// 连接现在是否可以被安全丢弃
    /// Whether the connection may be safely dropped now
    pub fn can_destroy(&self) -> bool {
        self.guard.can_destroy()
    }

    // === 诊断与访问器 Diagnostics and accessors ===

    /// 诊断输出，转发给子类型；不改变状态
    /// Diagnostic emission, forwarded to the subtype; does not mutate state
    pub fn dump_state(&self, level: u8) {
        self.conn.dump_state(level);
    }

    /// 用于日志的人类可读标识
    /// Human-readable identity for logs
    pub fn describe(&self) -> Describe<'_, C> {
        Describe(&self.conn)
    }

    /// Whether this connection is a candidate for idle-based pre-shutdown
    /// eviction: it has been idle at least `min_idle` and does not report
    /// zero idle time (zero opts the connection out of eviction
    /// entirely).
    ///
    /// 该连接是否为基于空闲的预关闭驱逐候选：空闲至少 `min_idle`
    /// 且未报告零空闲时间（零表示完全不参与驱逐）。
    pub fn idle_eviction_candidate(&self, min_idle: Duration) -> bool {
        let idle = self.conn.idle_time();
        !idle.is_zero() && idle >= min_idle
    }

    /// 是否有未完成的请求
    /// Whether requests are outstanding
    pub fn is_busy(&self) -> bool {
        self.conn.is_busy()
    }

    /// 当前排空状态
    /// Current drain state
    pub fn drain_state(&self) -> DrainState {
        self.drain
    }

    /// 挂接期间分配的连接id
    /// The connection id allocated while attached
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// 当前管理器（若仍存活）
    /// The current manager, if still alive
    pub fn manager(&self) -> Option<Arc<ManagerContext>> {
        self.upgraded_manager()
    }

    /// A clone of the destruction guard, handed to the concrete
    /// connection so its callbacks can request destruction of `self`.
    ///
    /// 销毁保护器的克隆，交给具体连接以便其回调可以请求销毁 `self`。
    pub fn guard(&self) -> DestructionGuard {
        self.guard.clone()
    }

    /// 内部连接的共享访问
    /// Shared access to the inner connection
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// 内部连接的独占访问
    /// Exclusive access to the inner connection
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    fn upgraded_manager(&self) -> Option<Arc<ManagerContext>> {
        self.manager.as_ref().and_then(Weak::upgrade)
    }
}
