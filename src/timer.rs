//! 超时调度设施
//! Timeout Scheduling Facility
//!
//! 受管连接在该设施上注册一个在延迟后触发的回调，并可以重新调度或
//! 取消。大规模时间轮的实现不在本库范围内；本模块规定设施的接口
//! 契约，并提供一个基于tokio的直接实现作为后盾。
//!
//! A managed connection registers a callback on this facility to fire
//! after a delay, and may reschedule or cancel it. A timer wheel that
//! fires timeouts at scale is out of scope for this library; this module
//! specifies the facility's interface contract and backs it with a
//! straightforward tokio implementation.

pub mod event;
pub mod handle;
pub mod task;

pub use event::{ConnectionId, TimeoutKind, TimerEntryId, TimerEventData};
pub use handle::{TimerFacilityHandle, TimerHandle, TimerRegistration};
pub use task::start_timer_facility;
