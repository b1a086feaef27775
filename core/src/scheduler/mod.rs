pub mod config;
pub mod context;
pub mod lifecycle;
pub mod load_balance;
pub mod per_cpu;
pub mod policy;
pub mod ready_queue;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod sleep;
pub mod task_struct;
pub mod wait;


pub use config::SchedConfig;
pub use context::{ContextSwitch, TaskEntry};
pub use per_cpu::CpuInfo;
pub use policy::QuantumPolicy;
pub use ready_queue::ReadyQueues;
pub use scheduler::{CpuHandle, ScheduleOutcome, SchedStats, Scheduler, TaskCounts};
pub use sleep::SleepList;
pub use task_struct::{QueueScope, TaskInfo, TaskName};
pub use wait::WaitList;
