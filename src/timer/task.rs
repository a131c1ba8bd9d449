//! 超时调度设施任务的核心实现
//! Core implementation of the timeout scheduling facility task
//!
//! 设施任务维护一个截止时间最小堆，在命令通道和最早截止时间之间
//! select。取消是惰性的：条目从活动映射中移除，堆中的陈旧记录在
//! 推进时被跳过。
//!
//! The facility task maintains a min-heap of deadlines and selects between
//! the command channel and the earliest deadline. Cancellation is lazy:
//! entries are removed from the live map and stale heap records are
//! skipped during advancement.

use crate::timer::event::{ConnectionId, TimeoutKind, TimerEntryId, TimerEventData};
use crate::timer::handle::{TimerCommand, TimerFacilityHandle, TimerRegistration};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace, warn};

/// 一次存活的注册
/// One live registration
#[derive(Debug)]
struct PendingTimer {
    connection_id: ConnectionId,
    kind: TimeoutKind,
    callback_tx: mpsc::Sender<TimerEventData>,
}

/// 超时调度设施任务
/// Timeout scheduling facility task
pub struct TimerFacilityTask {
    /// 命令接收通道
    /// Command receiver channel
    command_rx: mpsc::Receiver<TimerCommand>,
    /// 截止时间最小堆；被取消的条目作为陈旧记录留在堆中
    /// Deadline min-heap; cancelled entries linger as stale records
    deadlines: BinaryHeap<Reverse<(Instant, TimerEntryId)>>,
    /// 存活的注册
    /// Live registrations
    pending: HashMap<TimerEntryId, PendingTimer>,
    /// 连接到定时器条目的映射，用于按连接清理
    /// Connection to timer entries mapping, for per-connection cleanup
    connection_timers: HashMap<ConnectionId, HashSet<TimerEntryId>>,
    /// 下一个分配的条目ID
    /// Next entry ID to allocate
    next_entry_id: TimerEntryId,
}

impl TimerFacilityTask {
    /// 创建新的设施任务
    /// Create a new facility task
    pub(crate) fn new(command_buffer_size: usize) -> (Self, mpsc::Sender<TimerCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer_size);
        let task = Self {
            command_rx,
            deadlines: BinaryHeap::new(),
            pending: HashMap::new(),
            connection_timers: HashMap::new(),
            next_entry_id: 1,
        };
        (task, command_tx)
    }

    /// 运行设施任务主循环
    /// Run the facility task main loop
    pub async fn run(mut self) {
        loop {
            match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        command = self.command_rx.recv() => {
                            let Some(command) = command else { break };
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        _ = sleep_until(deadline) => {
                            self.fire_due(Instant::now());
                        }
                    }
                }
                None => {
                    let Some(command) = self.command_rx.recv().await else {
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
            }
        }

        info!("Timer facility task shut down");
    }

    /// 返回最早的存活截止时间，顺带丢弃堆顶的陈旧记录
    /// Returns the earliest live deadline, discarding stale heap heads on the way
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, entry_id))) = self.deadlines.peek().copied() {
            if self.pending.contains_key(&entry_id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// 处理设施命令
    /// Handle a facility command
    ///
    /// # Returns
    /// 返回false表示应该关闭任务
    /// Returns false if the task should shut down
    fn handle_command(&mut self, command: TimerCommand) -> bool {
        match command {
            TimerCommand::Register {
                registration,
                response_tx,
            } => {
                let entry_id = self.register(registration);
                if response_tx.send(entry_id).is_err() {
                    // 注册者在应答前消失了，立即收回条目
                    // Registrant vanished before the reply, reclaim the entry
                    self.cancel(entry_id);
                }
            }
            TimerCommand::Cancel {
                entry_id,
                response_tx,
            } => {
                let cancelled = self.cancel(entry_id);
                if response_tx.send(cancelled).is_err() {
                    debug!(entry_id, "Cancel response dropped by caller");
                }
            }
            TimerCommand::Abort { entry_id } => {
                self.cancel(entry_id);
            }
            TimerCommand::ClearConnection {
                connection_id,
                response_tx,
            } => {
                let removed = self.clear_connection(connection_id);
                let _ = response_tx.send(removed);
            }
            TimerCommand::Shutdown => return false,
        }
        true
    }

    fn register(&mut self, registration: TimerRegistration) -> TimerEntryId {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;

        let deadline = Instant::now() + registration.delay;
        self.deadlines.push(Reverse((deadline, entry_id)));
        self.pending.insert(
            entry_id,
            PendingTimer {
                connection_id: registration.connection_id,
                kind: registration.kind,
                callback_tx: registration.callback_tx,
            },
        );
        self.connection_timers
            .entry(registration.connection_id)
            .or_default()
            .insert(entry_id);

        trace!(
            entry_id,
            cid = registration.connection_id,
            kind = ?registration.kind,
            delay = ?registration.delay,
            "Registered timer"
        );
        entry_id
    }

    fn cancel(&mut self, entry_id: TimerEntryId) -> bool {
        match self.pending.remove(&entry_id) {
            Some(timer) => {
                self.forget_connection_entry(timer.connection_id, entry_id);
                trace!(entry_id, cid = timer.connection_id, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    fn clear_connection(&mut self, connection_id: ConnectionId) -> usize {
        let Some(entries) = self.connection_timers.remove(&connection_id) else {
            return 0;
        };
        let removed = entries.len();
        for entry_id in entries {
            self.pending.remove(&entry_id);
        }
        if removed > 0 {
            trace!(cid = connection_id, removed, "Cleared connection timers");
        }
        removed
    }

    /// 触发所有截止时间不晚于now的存活定时器
    /// Fire all live timers whose deadline is not later than now
    fn fire_due(&mut self, now: Instant) {
        while let Some(Reverse((deadline, entry_id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();

            let Some(timer) = self.pending.remove(&entry_id) else {
                continue; // 陈旧记录 stale record
            };
            self.forget_connection_entry(timer.connection_id, entry_id);

            let event = TimerEventData::new(entry_id, timer.connection_id, timer.kind);
            // try_send避免设施被慢速注册者阻塞
            // try_send keeps the facility from blocking on a slow registrant
            if let Err(err) = timer.callback_tx.try_send(event) {
                warn!(entry_id, error = %err, "Failed to deliver timer event");
            } else {
                trace!(entry_id, cid = timer.connection_id, "Timer fired");
            }
        }
    }

    fn forget_connection_entry(&mut self, connection_id: ConnectionId, entry_id: TimerEntryId) {
        if let Some(entries) = self.connection_timers.get_mut(&connection_id) {
            entries.remove(&entry_id);
            if entries.is_empty() {
                self.connection_timers.remove(&connection_id);
            }
        }
    }
}

/// 启动超时调度设施任务
/// Start the timeout scheduling facility task
pub fn start_timer_facility(command_buffer_size: usize) -> TimerFacilityHandle {
    let (task, command_tx) = TimerFacilityTask::new(command_buffer_size);
    let handle = TimerFacilityHandle::new(command_tx);

    tokio::spawn(async move {
        task.run().await;
    });

    info!("Timer facility task started");
    handle
}
