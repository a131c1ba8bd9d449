//! 延迟销毁保护 - 防止连接在自身回调执行期间被销毁
//! Deferred destruction guard - prevents a connection from being destroyed
//! while one of its own callbacks is still executing.
//!
//! 任何可能触发 `self` 销毁的代码路径必须先持有一个作用域令牌；
//! 实际的销毁被推迟到最外层令牌释放之后。
//!
//! Any code path that may trigger destruction of `self` must first hold a
//! scope token; actual destruction is deferred until the outermost token
//! is released.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tracing::trace;

type DestroyHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct GuardInner {
    /// 当前存活的作用域令牌数量
    /// Number of currently live scope tokens
    scopes: AtomicUsize,
    /// 是否已请求销毁
    /// Whether destruction has been requested
    destroy_pending: AtomicBool,
    /// 销毁真正变得安全时运行一次的钩子
    /// Hook run exactly once when destruction actually becomes safe
    on_destroy: Mutex<Option<DestroyHook>>,
}

impl GuardInner {
    fn run_destroy_hook(&self) {
        let hook = self
            .on_destroy
            .lock()
            .map(|mut slot| slot.take())
            .unwrap_or(None);
        if let Some(hook) = hook {
            trace!("Running deferred destroy hook");
            hook();
        }
    }
}

/// A reference-counted lifetime mechanism allowing an object to be marked
/// for destruction while guarding against destructing itself mid-callback.
///
/// The guard itself never drops the protected object: in Rust the owner
/// ultimately drops the value. The guard tells the owner *when* that is
/// safe (`request_destroy` returning `true`, or the destroy hook firing)
/// and runs owner-side teardown exactly once.
///
/// 一种引用计数的生命周期机制，允许对象被标记为待销毁，同时防止它在
/// 回调执行中途销毁自身。保护器本身永远不会析构被保护的对象：在 Rust
/// 中最终由所有者丢弃该值。保护器只负责告知所有者何时可以安全地这么做
/// （`request_destroy` 返回 `true`，或销毁钩子被触发），并恰好执行一次
/// 所有者侧的清理。
#[derive(Clone, Default)]
pub struct DestructionGuard {
    inner: Arc<GuardInner>,
}

impl std::fmt::Debug for DestructionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestructionGuard")
            .field("scopes", &self.scope_depth())
            .field("destroy_pending", &self.is_destroy_pending())
            .finish()
    }
}

impl DestructionGuard {
    /// 创建新的销毁保护器
    /// Create a new destruction guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the teardown hook. The hook runs exactly once, either
    /// immediately upon `request_destroy()` with no live scope, or when
    /// the last live scope is released with destruction pending.
    ///
    /// 安装清理钩子。该钩子恰好运行一次：要么在没有存活作用域时调用
    /// `request_destroy()` 的当下，要么在销毁挂起且最后一个存活作用域
    /// 被释放时。
    pub fn set_destroy_hook(&self, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut slot) = self.inner.on_destroy.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// Enters a guarded scope. While the returned token (or any other
    /// token of this guard) is alive, destruction is deferred.
    ///
    /// 进入一个受保护的作用域。只要返回的令牌（或该保护器的任何其他
    /// 令牌）存活，销毁就会被推迟。
    pub fn scope(&self) -> GuardScope {
        self.inner.scopes.fetch_add(1, Ordering::AcqRel);
        GuardScope {
            inner: self.inner.clone(),
        }
    }

    /// Marks the protected object for destruction.
    ///
    /// Returns `true` if no scope is live, meaning the caller may tear the
    /// object down right away; the hook has already run in that case. With
    /// live scopes the request is recorded and teardown is deferred to the
    /// outermost scope exit.
    ///
    /// 将被保护对象标记为待销毁。
    ///
    /// 如果当前没有存活的作用域则返回 `true`，表示调用者可以立即拆除
    /// 对象；此时钩子已经运行。若有存活的作用域，请求会被记录，拆除
    /// 推迟到最外层作用域退出时。
    pub fn request_destroy(&self) -> bool {
        self.inner.destroy_pending.store(true, Ordering::Release);
        if self.inner.scopes.load(Ordering::Acquire) == 0 {
            self.inner.run_destroy_hook();
            true
        } else {
            trace!(
                scopes = self.scope_depth(),
                "Destruction requested mid-callback, deferring"
            );
            false
        }
    }

    /// 是否已请求销毁
    /// Whether destruction has been requested
    pub fn is_destroy_pending(&self) -> bool {
        self.inner.destroy_pending.load(Ordering::Acquire)
    }

    /// 当前存活的作用域数量
    /// Number of currently live scopes
    pub fn scope_depth(&self) -> usize {
        self.inner.scopes.load(Ordering::Acquire)
    }

    /// Whether the object may be dropped now: destruction was requested and
    /// no callback scope is on the stack.
    ///
    /// 对象现在是否可以被丢弃：销毁已被请求且调用栈上没有回调作用域。
    pub fn can_destroy(&self) -> bool {
        self.is_destroy_pending() && self.scope_depth() == 0
    }
}

/// RAII token for a guarded callback scope. Dropping the last token while
/// destruction is pending runs the teardown hook.
///
/// 受保护回调作用域的RAII令牌。在销毁挂起时丢弃最后一个令牌会运行
/// 清理钩子。
pub struct GuardScope {
    inner: Arc<GuardInner>,
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        let remaining = self.inner.scopes.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.inner.destroy_pending.load(Ordering::Acquire) {
            self.inner.run_destroy_hook();
        }
    }
}
