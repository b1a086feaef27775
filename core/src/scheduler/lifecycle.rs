//! Task creation, termination, priority changes, and CPU affinity.

use alloc::boxed::Box;
use alloc::format;

use kairos_abi::task::{
    BlockReason, CpuId, INVALID_TASK_ID, TASK_PRIORITY_IDLE, TaskFlags, TaskId, clamp_priority,
};
use kairos_abi::{SchedError, SchedResult};
use kairos_lib::{klog_debug, klog_error, klog_info, klog_warn};

use super::context::{ContextSwitch, TaskEntry};
use super::scheduler::{ScheduleOutcome, Scheduler};
use super::task_struct::{Task, alloc_stack};

const STACK_ALIGN: usize = 16;

impl<A: ContextSwitch> Scheduler<A> {
    /// Create a ready task with no parent.
    pub fn create_task(
        &self,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
        flags: TaskFlags,
    ) -> SchedResult<TaskId> {
        self.spawn_task(None, name, entry, arg, priority, flags)
    }

    /// Create a ready task whose exit code `parent` may collect with `waitpid`.
    pub fn create_child(
        &self,
        parent: TaskId,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
        flags: TaskFlags,
    ) -> SchedResult<TaskId> {
        self.spawn_task(Some(parent), name, entry, arg, priority, flags)
    }

    /// Stack and context are built before the scheduler lock is taken.
    fn build_task(
        &self,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
        flags: TaskFlags,
    ) -> SchedResult<Task<A::Context>> {
        let stack = alloc_stack(self.config.stack_size)?;
        let stack_top = (stack.as_ptr() as usize + stack.len()) & !(STACK_ALIGN - 1);
        let context = Box::new(self.arch.setup_context(entry, arg, stack_top));
        Ok(Task::new(
            INVALID_TASK_ID,
            name,
            clamp_priority(priority),
            flags,
            stack,
            context,
        ))
    }

    fn spawn_task(
        &self,
        parent: Option<TaskId>,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
        flags: TaskFlags,
    ) -> SchedResult<TaskId> {
        let mut task = self.build_task(name, entry, arg, priority, flags - TaskFlags::IDLE)?;

        let mut inner = self.inner.lock();
        if let Some(parent) = parent {
            match inner.tasks.get(&parent) {
                Some(p) if !p.is_zombie() => {}
                _ => return Err(SchedError::NotFound),
            }
        }
        let id = inner.alloc_task_id();
        task.task_id = id;
        task.parent_id = parent;
        task.mark_ready()?;
        let priority = task.priority;
        inner.tasks.insert(id, task);
        if let Err(err) = inner.enqueue(&self.cpus, id) {
            inner.tasks.remove(&id);
            drop(inner);
            klog_error!("SCHED: cannot queue new task '{}': {}", name, err);
            return Err(err);
        }
        inner.stats.tasks_created += 1;
        drop(inner);

        klog_debug!(
            "SCHED: created task {} '{}' priority {}",
            id,
            name,
            priority
        );
        Ok(id)
    }

    /// Register the idle task of `cpu`. Returns the existing one if present.
    pub fn create_idle_task(&self, cpu: CpuId, entry: TaskEntry) -> SchedResult<TaskId> {
        let pcpu = self.cpu_state(cpu)?;
        if let Some(id) = pcpu.idle_task() {
            return Ok(id);
        }
        let name = format!("idle{}", cpu);
        let mut task = self.build_task(
            &name,
            entry,
            cpu,
            TASK_PRIORITY_IDLE,
            TaskFlags::IDLE | TaskFlags::KERNEL_MODE | TaskFlags::SYSTEM,
        )?;

        let mut inner = self.inner.lock();
        if let Some(id) = pcpu.idle_task() {
            return Ok(id);
        }
        let id = inner.alloc_task_id();
        task.task_id = id;
        task.home_cpu = Some(cpu);
        task.mark_ready()?;
        inner.tasks.insert(id, task);
        inner.stats.tasks_created += 1;
        pcpu.set_idle_task(id);
        drop(inner);

        klog_debug!("SCHED: idle task {} registered on CPU {}", id, cpu);
        Ok(id)
    }

    /// Bring `cpu` online and make its first scheduling decision.
    pub fn start(&self, cpu: CpuId) -> SchedResult<ScheduleOutcome> {
        let pcpu = self.cpu_state(cpu)?;
        if pcpu.idle_task().is_none() {
            klog_warn!("SCHED: CPU {} has no idle task, not starting", cpu);
            return Err(SchedError::InvalidState);
        }
        pcpu.set_active(true);
        klog_info!("SCHED: CPU {} online", cpu);
        self.schedule(cpu)
    }

    pub fn stop(&self, cpu: CpuId) -> SchedResult<()> {
        self.cpu_state(cpu)?.set_active(false);
        klog_info!("SCHED: CPU {} offline", cpu);
        Ok(())
    }

    /// Turn `task` into a zombie and wake any parent waiting for it.
    ///
    /// A task running on `cpu` is switched away before this returns. A task
    /// running on another CPU stops at that CPU's next tick or scheduling
    /// decision.
    pub fn terminate(&self, cpu: CpuId, task: TaskId, exit_code: i32) -> SchedResult<()> {
        let pcpu = self.cpu_state(cpu)?;
        {
            let mut inner = self.inner.lock();
            let t = inner.tasks.get(&task).ok_or(SchedError::NotFound)?;
            if t.is_idle() {
                return Err(SchedError::IdleTask);
            }
            if t.is_zombie() {
                return Err(SchedError::InvalidState);
            }
            let sleeping = t.is_blocked() && t.block_reason == BlockReason::Sleep;

            inner.dequeue(&self.cpus, task);
            if sleeping {
                inner.sleepers.remove(task);
            }
            inner
                .tasks
                .get_mut(&task)
                .ok_or(SchedError::NotFound)?
                .terminate(exit_code)?;

            for parent in inner.waiters.complete(task, exit_code) {
                if let Err(err) = inner.make_ready(&self.cpus, parent) {
                    klog_error!(
                        "SCHED: parent {} of task {} not woken: {}",
                        parent,
                        task,
                        err
                    );
                }
            }
        }
        klog_debug!("SCHED: task {} exited with code {}", task, exit_code);

        if pcpu.current_task() == Some(task) {
            self.schedule(cpu)?;
        }
        Ok(())
    }

    /// Terminate the current task of `cpu`. Never returns to the caller.
    pub fn exit_current(&self, cpu: CpuId, exit_code: i32) -> ! {
        match self.current(cpu) {
            Some(id) => {
                if let Err(err) = self.terminate(cpu, id, exit_code) {
                    klog_error!("SCHED: exit of task {} on CPU {} failed: {}", id, cpu, err);
                }
            }
            None => klog_error!("SCHED: exit with no current task on CPU {}", cpu),
        }
        self.arch.halt()
    }

    /// Move `task` to another priority level. A queued task changes queues
    /// immediately and keeps its old level if the new one is full.
    pub fn set_priority(&self, task: TaskId, priority: u8) -> SchedResult<()> {
        let priority = clamp_priority(priority);
        let mut inner = self.inner.lock();
        let t = inner.tasks.get(&task).ok_or(SchedError::NotFound)?;
        if t.is_idle() {
            return Err(SchedError::IdleTask);
        }
        let old = t.priority;
        if old == priority {
            return Ok(());
        }

        let was_queued = inner.dequeue(&self.cpus, task);
        inner.tasks.get_mut(&task).ok_or(SchedError::NotFound)?.priority = priority;
        if was_queued {
            if let Err(err) = inner.enqueue(&self.cpus, task) {
                if let Some(t) = inner.tasks.get_mut(&task) {
                    t.priority = old;
                }
                // The old slot was freed above under the same lock.
                let _ = inner.enqueue(&self.cpus, task);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Pin `task` to `cpu`'s local queues.
    pub fn migrate_task_to_cpu(&self, task: TaskId, cpu: CpuId) -> SchedResult<()> {
        self.cpu_state(cpu)?;
        let _smp = self.smp_lock.lock();
        let mut inner = self.inner.lock();
        let t = inner.tasks.get(&task).ok_or(SchedError::NotFound)?;
        if t.is_idle() {
            return Err(SchedError::IdleTask);
        }
        let old_home = t.home_cpu;
        if old_home == Some(cpu) {
            return Ok(());
        }

        let was_queued = inner.dequeue(&self.cpus, task);
        inner.tasks.get_mut(&task).ok_or(SchedError::NotFound)?.home_cpu = Some(cpu);
        if was_queued {
            if let Err(err) = inner.enqueue(&self.cpus, task) {
                if let Some(t) = inner.tasks.get_mut(&task) {
                    t.home_cpu = old_home;
                }
                let _ = inner.enqueue(&self.cpus, task);
                klog_warn!("SCHED: cannot migrate task {} to CPU {}: {}", task, cpu, err);
                return Err(err);
            }
        }
        if let Some(t) = inner.tasks.get_mut(&task) {
            t.migration_count += 1;
        }
        inner.stats.migrations += 1;
        drop(inner);

        klog_debug!("SCHED: task {} pinned to CPU {}", task, cpu);
        Ok(())
    }
}
