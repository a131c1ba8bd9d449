//! 超时调度设施的客户端句柄
//! Client handle for the timeout scheduling facility
//!
//! 本模块包含设施的命令协议以及与设施任务通信的高级接口：注册、
//! 取消、按连接清理和关闭。
//!
//! This module contains the facility's command protocol and the high-level
//! interfaces for communicating with the facility task: registration,
//! cancellation, per-connection cleanup, and shutdown.

use crate::error::{Error, Result};
use crate::timer::event::{ConnectionId, TimeoutKind, TimerEntryId, TimerEventData};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// 定时器注册请求
/// Timer registration request
#[derive(Debug)]
pub struct TimerRegistration {
    /// 连接ID
    /// Connection ID
    pub connection_id: ConnectionId,
    /// 延迟时间
    /// Delay duration
    pub delay: Duration,
    /// 超时种类
    /// Timeout kind
    pub kind: TimeoutKind,
    /// 回调通道，超时到期时向注册者投递事件
    /// Callback channel, delivers the event to the registrant on expiry
    pub callback_tx: mpsc::Sender<TimerEventData>,
}

impl TimerRegistration {
    /// 创建新的定时器注册请求
    /// Create new timer registration request
    pub fn new(
        connection_id: ConnectionId,
        delay: Duration,
        kind: TimeoutKind,
        callback_tx: mpsc::Sender<TimerEventData>,
    ) -> Self {
        Self {
            connection_id,
            delay,
            kind,
            callback_tx,
        }
    }
}

/// 设施任务命令
/// Facility task commands
#[derive(Debug)]
pub(crate) enum TimerCommand {
    /// 注册定时器
    /// Register timer
    Register {
        registration: TimerRegistration,
        response_tx: oneshot::Sender<TimerEntryId>,
    },
    /// 取消定时器
    /// Cancel timer
    Cancel {
        entry_id: TimerEntryId,
        response_tx: oneshot::Sender<bool>,
    },
    /// 尽力而为的取消，无应答（用于同步的丢弃路径）
    /// Best-effort cancellation without a response (for synchronous drop paths)
    Abort { entry_id: TimerEntryId },
    /// 清除连接的所有定时器
    /// Clear all timers for a connection
    ClearConnection {
        connection_id: ConnectionId,
        response_tx: oneshot::Sender<usize>,
    },
    /// 关闭设施任务
    /// Shut down the facility task
    Shutdown,
}

/// 超时调度设施的句柄，用于注册和管理定时器
/// Handle for the timeout scheduling facility, used to register and manage timers
#[derive(Debug, Clone)]
pub struct TimerFacilityHandle {
    /// 命令发送通道
    /// Command sender channel
    command_tx: mpsc::Sender<TimerCommand>,
}

impl TimerFacilityHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<TimerCommand>) -> Self {
        Self { command_tx }
    }

    /// 注册定时器
    /// Register a timer
    pub async fn register(&self, registration: TimerRegistration) -> Result<TimerHandle> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(TimerCommand::Register {
                registration,
                response_tx,
            })
            .await
            .map_err(|_| Error::FacilityShutdown)?;

        let entry_id = response_rx.await.map_err(|_| Error::ChannelClosed)?;
        Ok(TimerHandle {
            entry_id,
            command_tx: self.command_tx.clone(),
        })
    }

    /// 清除连接的所有定时器，返回被移除的数量
    /// Clear all timers for a connection, returning how many were removed
    pub async fn clear_connection(&self, connection_id: ConnectionId) -> Result<usize> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(TimerCommand::ClearConnection {
                connection_id,
                response_tx,
            })
            .await
            .map_err(|_| Error::FacilityShutdown)?;

        response_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// 关闭设施任务
    /// Shut down the facility task
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(TimerCommand::Shutdown)
            .await
            .map_err(|_| Error::FacilityShutdown)
    }
}

/// 定时器句柄，代表一次未到期的注册
/// Timer handle, representing one outstanding registration
#[derive(Debug)]
pub struct TimerHandle {
    /// 定时器条目ID
    /// Timer entry ID
    pub entry_id: TimerEntryId,
    /// 向设施任务发送取消请求的通道
    /// Channel for sending cancel requests to the facility task
    command_tx: mpsc::Sender<TimerCommand>,
}

impl TimerHandle {
    /// Cancels the registration. Returns `true` if the timer was still
    /// pending, `false` if it had already fired or been removed.
    ///
    /// 取消注册。如果定时器仍在等待中返回 `true`；若已触发或已被移除
    /// 则返回 `false`。
    pub async fn cancel(self) -> Result<bool> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(TimerCommand::Cancel {
                entry_id: self.entry_id,
                response_tx,
            })
            .await
            .map_err(|_| Error::FacilityShutdown)?;

        response_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Best-effort synchronous cancellation for drop paths. The command is
    /// queued without waiting for confirmation; if the queue is full the
    /// stale event is instead discarded by the registrant.
    ///
    /// 用于丢弃路径的尽力而为同步取消。命令入队而不等待确认；若队列
    /// 已满，过期事件将由注册者自行丢弃。
    pub fn abort(self) {
        let _ = self.command_tx.try_send(TimerCommand::Abort {
            entry_id: self.entry_id,
        });
    }
}
