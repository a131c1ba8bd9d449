//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the managed-connection lifecycle library.
///
/// The drain state machine and timeout-reset entry points never fail:
/// misuse there is defined as a silent, idempotent no-op. Errors exist
/// only at the timer-facility boundary.
///
/// 受管连接生命周期库的主要错误类型。
/// 排空状态机和超时重置入口永远不会失败：那里的误用被定义为静默的
/// 幂等空操作。错误仅存在于定时器设施的边界上。
#[derive(Debug, Error)]
pub enum Error {
    /// The timer facility task has been shut down and no longer accepts commands.
    /// 定时器设施任务已关闭，不再接受命令。
    #[error("Timer facility has been shut down")]
    FacilityShutdown,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
