//! Scheduler core: task table, ready queues, and the per-CPU scheduling
//! decision.
//!
//! # Locking
//!
//! Lock order is the SMP lock, then the global scheduler lock (`inner`),
//! then per-CPU queue locks in ascending CPU order. No lock is held across
//! [`ContextSwitch::switch`].
//!
//! # Switch completion
//!
//! A task stays marked `on_cpu` after its CPU picks something else, until
//! the next decision on that CPU (or the return from `switch`) proves its
//! registers are saved. Other CPUs never select a task in that window, and a
//! wakeup landing in it leaves the task `Ready` for its own CPU to queue.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kairos_abi::task::{
    BOOT_TASK_ID, BlockReason, CpuId, INVALID_TASK_ID, NUM_PRIORITY_LEVELS, SchedAlgorithm,
    TaskId, TaskStatus,
};
use kairos_abi::{SchedError, SchedResult};
use kairos_lib::{klog_debug, klog_error, klog_info};
use spin::Mutex;

use super::config::SchedConfig;
use super::context::{ContextSwitch, TaskEntry};
use super::per_cpu::{CpuInfo, PerCpuScheduler};
use super::policy::QuantumPolicy;
use super::ready_queue::ReadyQueues;
use super::sleep::SleepList;
use super::task_struct::{QueueScope, Task, TaskFlags, TaskInfo};
use super::wait::WaitList;
use crate::sync::TaskControl;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedStats {
    pub total_ticks: u64,
    pub schedule_calls: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub yields: u64,
    pub balance_runs: u64,
    pub migrations: u64,
    pub tasks_created: u64,
    pub tasks_reaped: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub ready: u32,
    pub running: u32,
    pub blocked: u32,
    pub zombie: u32,
}

impl TaskCounts {
    pub fn total(&self) -> u32 {
        self.ready + self.running + self.blocked + self.zombie
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Scheduling is off on this CPU (not started, or preemption disabled).
    Disabled,
    /// The current task keeps the CPU.
    Continued,
    Switched { from: Option<TaskId>, to: TaskId },
}

struct SwitchPlan<C> {
    from: Option<TaskId>,
    to: TaskId,
    from_ctx: *mut C,
    to_ctx: *const C,
}

pub(super) struct SchedInner<C> {
    pub(super) tasks: BTreeMap<TaskId, Task<C>>,
    pub(super) global: ReadyQueues,
    pub(super) sleepers: SleepList,
    pub(super) waiters: WaitList,
    /// Reaped tasks whose stacks may still be live on `last_cpu`.
    pub(super) graveyard: Vec<Task<C>>,
    pub(super) policy: QuantumPolicy,
    pub(super) stats: SchedStats,
    next_task_id: TaskId,
}

impl<C> SchedInner<C> {
    fn new(policy: QuantumPolicy) -> Self {
        Self {
            tasks: BTreeMap::new(),
            global: ReadyQueues::new(),
            sleepers: SleepList::new(),
            waiters: WaitList::new(),
            graveyard: Vec::new(),
            policy,
            stats: SchedStats::default(),
            next_task_id: 1,
        }
    }

    pub(super) fn alloc_task_id(&mut self) -> TaskId {
        loop {
            let id = self.next_task_id;
            self.next_task_id = self.next_task_id.wrapping_add(1);
            if id != BOOT_TASK_ID && id != INVALID_TASK_ID && !self.tasks.contains_key(&id) {
                return id;
            }
        }
    }

    /// Queue a `Ready` task in its home scope. Idle and already-queued
    /// tasks are left alone.
    pub(super) fn enqueue(&mut self, cpus: &[PerCpuScheduler<C>], id: TaskId) -> SchedResult<()> {
        let task = self.tasks.get_mut(&id).ok_or(SchedError::NotFound)?;
        if task.queued.is_some() || task.is_idle() {
            return Ok(());
        }
        if !task.is_ready() {
            return Err(SchedError::InvalidState);
        }
        let scope = match task.home_cpu {
            Some(cpu) => {
                if !cpus[cpu].queues().push(task.priority, id) {
                    return Err(SchedError::CpuQueueFull);
                }
                QueueScope::Local(cpu)
            }
            None => {
                if !self.global.push(task.priority, id) {
                    return Err(SchedError::QueueFull);
                }
                QueueScope::Global
            }
        };
        task.queued = Some(scope);
        Ok(())
    }

    /// Take a task out of whichever ready queue holds it.
    pub(super) fn dequeue(&mut self, cpus: &[PerCpuScheduler<C>], id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        match task.queued.take() {
            Some(QueueScope::Global) => self.global.remove(task.priority, id),
            Some(QueueScope::Local(cpu)) => cpus[cpu].queues().remove(task.priority, id),
            None => false,
        }
    }

    /// `Blocked` to `Ready`. No-op for any other state. A task still on its
    /// CPU is left for that CPU to queue.
    pub(super) fn make_ready(&mut self, cpus: &[PerCpuScheduler<C>], id: TaskId) -> SchedResult<()> {
        let task = self.tasks.get_mut(&id).ok_or(SchedError::NotFound)?;
        if !task.is_blocked() {
            return Ok(());
        }
        let reason = task.block_reason;
        task.mark_ready()?;
        if task.on_cpu.is_some() {
            return Ok(());
        }
        if let Err(err) = self.enqueue(cpus, id) {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.restore_blocked(reason);
            }
            klog_error!("SCHED: ready queue full, task {} stays blocked", id);
            return Err(err);
        }
        Ok(())
    }

    pub(super) fn highest_ready_level(&self, pcpu: &PerCpuScheduler<C>) -> Option<u8> {
        let local = pcpu.queues().highest_level();
        match (local, self.global.highest_level()) {
            (Some(l), Some(g)) => Some(l.min(g)),
            (l, g) => l.or(g),
        }
    }

    /// Lowest non-empty level across this CPU's local queues and the global
    /// queues, local first on a tie. Tasks still on another CPU are skipped.
    fn select_next(&mut self, pcpu: &PerCpuScheduler<C>) -> Option<TaskId> {
        let cpu = pcpu.cpu_id;
        loop {
            let picked = {
                let tasks = &self.tasks;
                let runnable = |id: TaskId| {
                    tasks
                        .get(&id)
                        .is_none_or(|t| t.is_ready() && t.on_cpu.is_none_or(|c| c == cpu))
                };
                let mut local = pcpu.queues();
                let mut picked = None;
                for level in 0..NUM_PRIORITY_LEVELS as u8 {
                    picked = local
                        .take_first(level, runnable)
                        .or_else(|| self.global.take_first(level, runnable));
                    if picked.is_some() {
                        break;
                    }
                }
                picked
            };
            let id = picked?;
            if let Some(task) = self.tasks.get_mut(&id) {
                task.queued = None;
                return Some(id);
            }
        }
    }

    /// Put the outgoing task back in a ready queue if it is still runnable.
    /// On a full queue it keeps the CPU with a fresh quantum.
    fn requeue_outgoing(
        &mut self,
        cpus: &[PerCpuScheduler<C>],
        pcpu: &PerCpuScheduler<C>,
        current: Option<TaskId>,
    ) -> SchedResult<()> {
        let Some(id) = current else {
            return Ok(());
        };
        let Some(task) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        if task.is_idle() {
            return Ok(());
        }
        match task.status() {
            TaskStatus::Running => task.try_transition_to(TaskStatus::Ready)?,
            // Woken before it managed to switch away.
            TaskStatus::Ready => {}
            _ => return Ok(()),
        }
        let priority = task.priority;
        if let Err(err) = self.enqueue(cpus, id) {
            let quantum = self.policy.quantum_for(priority);
            if let Some(task) = self.tasks.get_mut(&id) {
                task.resume_running();
                task.time_slice = quantum;
                task.time_slice_remaining = quantum;
            }
            klog_error!(
                "SCHED: ready queue full, task {} keeps CPU {}",
                id,
                pcpu.cpu_id
            );
            return Err(err);
        }
        Ok(())
    }

    /// Release the task this CPU last switched away from.
    fn finish_switch(
        &mut self,
        cpus: &[PerCpuScheduler<C>],
        pcpu: &PerCpuScheduler<C>,
    ) -> SchedResult<()> {
        let Some(prev) = pcpu.prev_task() else {
            return Ok(());
        };
        if pcpu.current_task() != Some(prev) {
            if let Some(task) = self.tasks.get_mut(&prev) {
                if task.on_cpu == Some(pcpu.cpu_id) {
                    task.on_cpu = None;
                }
                if task.is_ready() && task.queued.is_none() && !task.is_idle() {
                    if let Err(err) = self.enqueue(cpus, prev) {
                        if let Some(task) = self.tasks.get_mut(&prev) {
                            task.on_cpu = Some(pcpu.cpu_id);
                        }
                        klog_error!(
                            "SCHED: ready queue full, woken task {} held on CPU {}",
                            prev,
                            pcpu.cpu_id
                        );
                        return Err(err);
                    }
                }
            }
        }
        pcpu.set_prev_task(None);
        Ok(())
    }

    fn drain_graveyard(&mut self, cpu: CpuId, current: Option<TaskId>) {
        self.graveyard
            .retain(|task| task.last_cpu != Some(cpu) || Some(task.task_id) == current);
    }

    fn prepare_switch(
        &mut self,
        pcpu: &PerCpuScheduler<C>,
        current: Option<TaskId>,
        next: TaskId,
        now: u64,
    ) -> Option<SwitchPlan<C>> {
        let cpu = pcpu.cpu_id;
        let quantum = {
            let priority = self.tasks.get(&next)?.priority;
            self.policy.quantum_for(priority)
        };
        let task = self.tasks.get_mut(&next)?;
        if task.is_idle() {
            task.set_idle_status(true);
            task.time_slice = 0;
            task.time_slice_remaining = 0;
        } else {
            if !task.is_running() {
                task.mark_running().ok()?;
            }
            task.time_slice = quantum;
            task.time_slice_remaining = quantum;
        }
        task.last_run_time = now;
        task.on_cpu = Some(cpu);
        task.last_cpu = Some(cpu);
        if current == Some(next) {
            return None;
        }
        task.context_switches += 1;
        let to_ctx: *const C = &*task.context;

        let from_ctx = match current {
            None => pcpu.boot_context_ptr(),
            Some(prev) => match self.tasks.get_mut(&prev) {
                Some(prev_task) => {
                    if prev_task.is_idle() {
                        prev_task.set_idle_status(false);
                        prev_task.on_cpu = None;
                    }
                    if prev_task.is_zombie() {
                        ptr::null_mut()
                    } else {
                        &mut *prev_task.context as *mut C
                    }
                }
                // Reaped while still running here.
                None => ptr::null_mut(),
            },
        };

        self.stats.context_switches += 1;
        pcpu.context_switches.fetch_add(1, Ordering::Relaxed);
        pcpu.set_prev_task(current);
        pcpu.set_current_task(Some(next));
        Some(SwitchPlan {
            from: current,
            to: next,
            from_ctx,
            to_ctx,
        })
    }
}

pub struct Scheduler<A: ContextSwitch> {
    pub(super) arch: A,
    pub(super) config: SchedConfig,
    pub(super) inner: Mutex<SchedInner<A::Context>>,
    pub(super) smp_lock: Mutex<()>,
    pub(super) cpus: Vec<PerCpuScheduler<A::Context>>,
    ticks: AtomicU64,
    preemption: AtomicBool,
}

impl<A: ContextSwitch> Scheduler<A> {
    pub fn new(arch: A, config: SchedConfig) -> Self {
        let config = config.sanitized();
        let policy = QuantumPolicy::new(
            config.algorithm,
            config.base_quantum,
            config.priority_quantum_bonus,
        );
        let cpus = (0..config.cpu_count).map(PerCpuScheduler::new).collect();
        klog_info!(
            "SCHED: {} CPU(s), algorithm {}, base quantum {} ticks at {} Hz",
            config.cpu_count,
            config.algorithm,
            config.base_quantum,
            config.tick_hz
        );
        Self {
            arch,
            config,
            inner: Mutex::new(SchedInner::new(policy)),
            smp_lock: Mutex::new(()),
            cpus,
            ticks: AtomicU64::new(0),
            preemption: AtomicBool::new(config.preemption),
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    #[inline]
    pub fn arch(&self) -> &A {
        &self.arch
    }

    #[inline]
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// Handle for scheduling operations issued from `cpu`.
    pub fn cpu(&self, cpu: CpuId) -> SchedResult<CpuHandle<'_, A>> {
        self.cpu_state(cpu)?;
        Ok(CpuHandle { sched: self, cpu })
    }

    pub(super) fn cpu_state(&self, cpu: CpuId) -> SchedResult<&PerCpuScheduler<A::Context>> {
        self.cpus.get(cpu).ok_or(SchedError::InvalidCpu)
    }

    /// Global tick count, advanced by CPU 0.
    #[inline]
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn can_schedule(&self, pcpu: &PerCpuScheduler<A::Context>) -> bool {
        pcpu.is_active() && self.is_preemption_enabled()
    }

    /// Make a scheduling decision on `cpu` and switch to the chosen task.
    ///
    /// # Panics
    ///
    /// When nothing is runnable and the CPU has no idle task.
    pub fn schedule(&self, cpu: CpuId) -> SchedResult<ScheduleOutcome> {
        let pcpu = self.cpu_state(cpu)?;
        if !self.can_schedule(pcpu) {
            return Ok(ScheduleOutcome::Disabled);
        }
        let calls = pcpu.schedule_calls.fetch_add(1, Ordering::Relaxed) + 1;

        let plan = {
            let mut inner = self.inner.lock();
            inner.stats.schedule_calls += 1;
            inner.finish_switch(&self.cpus, pcpu)?;
            let current = pcpu.current_task();
            inner.drain_graveyard(cpu, current);
            inner.requeue_outgoing(&self.cpus, pcpu, current)?;

            let now = self.now();
            inner.wake_due_sleepers(&self.cpus, now);

            let next = match inner.select_next(pcpu).or(pcpu.idle_task()) {
                Some(id) => id,
                None => {
                    klog_error!("SCHED: no ready task and no idle task on CPU {}", cpu);
                    panic!("no ready task and no idle task registered on CPU {}", cpu);
                }
            };
            inner.prepare_switch(pcpu, current, next, now)
        };

        if self.cpus.len() > 1 && calls % u64::from(self.config.balance_interval) == 0 {
            self.balance();
        }

        let Some(plan) = plan else {
            return Ok(ScheduleOutcome::Continued);
        };
        // SAFETY: both contexts are boxed inside tasks that stay in the task
        // table or the graveyard until this CPU's next decision, and `to_ctx`
        // was built by `setup_context` or saved by an earlier switch.
        unsafe { self.arch.switch(plan.from_ctx, plan.to_ctx) };
        self.complete_switch(pcpu);
        Ok(ScheduleOutcome::Switched {
            from: plan.from,
            to: plan.to,
        })
    }

    /// Runs in whichever task this CPU resumed; the previous one is saved.
    fn complete_switch(&self, pcpu: &PerCpuScheduler<A::Context>) {
        let mut inner = self.inner.lock();
        let _ = inner.finish_switch(&self.cpus, pcpu);
    }

    pub fn yield_now(&self, cpu: CpuId) -> SchedResult<ScheduleOutcome> {
        let pcpu = self.cpu_state(cpu)?;
        if let Some(id) = pcpu.current_task() {
            let mut inner = self.inner.lock();
            inner.stats.yields += 1;
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.yield_count += 1;
            }
        }
        self.schedule(cpu)
    }

    /// Timer tick on `cpu`. Only CPU 0 advances the global clock. Due
    /// sleepers become ready here, so an idle CPU notices them.
    pub fn tick(&self, cpu: CpuId) -> SchedResult<ScheduleOutcome> {
        let pcpu = self.cpu_state(cpu)?;
        if cpu == 0 {
            self.ticks.fetch_add(1, Ordering::AcqRel);
        }
        if !pcpu.is_active() {
            return Ok(ScheduleOutcome::Disabled);
        }

        let preemption = self.is_preemption_enabled();
        let reschedule = {
            let mut inner = self.inner.lock();
            inner.wake_due_sleepers(&self.cpus, self.now());
            let highest_ready = inner.highest_ready_level(pcpu);
            let reschedule = match pcpu.current_task() {
                None => highest_ready.is_some(),
                Some(id) if pcpu.is_idle_task(id) => {
                    pcpu.idle_ticks.fetch_add(1, Ordering::Relaxed);
                    if let Some(task) = inner.tasks.get_mut(&id) {
                        task.cpu_time_used += 1;
                    }
                    highest_ready.is_some()
                }
                Some(id) => match inner.tasks.get_mut(&id) {
                    None => true,
                    // Terminated from another CPU while running here.
                    Some(task) if task.is_zombie() => true,
                    Some(task) => {
                        task.cpu_time_used += 1;
                        if !task.is_running() || !preemption || !task.is_preemptible() {
                            false
                        } else {
                            task.time_slice_remaining = task.time_slice_remaining.saturating_sub(1);
                            let outranked = highest_ready.is_some_and(|level| level < task.priority);
                            let contender = highest_ready.is_some_and(|level| level <= task.priority);
                            if outranked || (task.time_slice_remaining == 0 && contender) {
                                true
                            } else {
                                if task.time_slice_remaining == 0 {
                                    task.time_slice_remaining = task.time_slice;
                                }
                                false
                            }
                        }
                    }
                },
            };
            if reschedule && preemption {
                inner.stats.preemptions += 1;
            }
            reschedule
        };

        if reschedule {
            self.schedule(cpu)
        } else {
            Ok(ScheduleOutcome::Continued)
        }
    }

    /// Mark the current task of `cpu` blocked without switching away.
    ///
    /// Callers publish themselves as waiters first, then call
    /// [`Scheduler::schedule`]. A wakeup in between is not lost.
    pub fn prepare_block(&self, cpu: CpuId, reason: BlockReason) -> SchedResult<TaskId> {
        let mut inner = self.inner.lock();
        self.block_locked(&mut inner, cpu, reason)
    }

    pub(super) fn block_locked(
        &self,
        inner: &mut SchedInner<A::Context>,
        cpu: CpuId,
        reason: BlockReason,
    ) -> SchedResult<TaskId> {
        let pcpu = self.cpu_state(cpu)?;
        if !self.can_schedule(pcpu) {
            return Err(SchedError::WouldBlock);
        }
        let id = pcpu.current_task().ok_or(SchedError::NoCurrentTask)?;
        if pcpu.is_idle_task(id) {
            return Err(SchedError::IdleTask);
        }
        inner
            .tasks
            .get_mut(&id)
            .ok_or(SchedError::NotFound)?
            .block(reason)?;
        Ok(id)
    }

    pub fn block_current(&self, cpu: CpuId, reason: BlockReason) -> SchedResult<()> {
        self.prepare_block(cpu, reason)?;
        self.commit_block(cpu)
    }

    /// Switch away from a task marked blocked by [`Scheduler::prepare_block`].
    /// If no decision can be made the task keeps running.
    pub(super) fn commit_block(&self, cpu: CpuId) -> SchedResult<()> {
        let Err(err) = self.schedule(cpu) else {
            return Ok(());
        };
        let mut inner = self.inner.lock();
        if let Some(id) = self.current(cpu) {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.cancel_block();
                task.resume_running();
            }
        }
        Err(err)
    }

    /// Make a blocked task ready. A task in any other state is left alone.
    pub fn unblock(&self, task: TaskId) -> SchedResult<()> {
        let mut inner = self.inner.lock();
        let t = inner.tasks.get(&task).ok_or(SchedError::NotFound)?;
        if !t.is_blocked() {
            let status = t.status();
            drop(inner);
            klog_debug!(
                "SCHED: unblock of task {} in state {}, ignored",
                task,
                status.as_str()
            );
            return Ok(());
        }
        let reason = t.block_reason;
        inner.make_ready(&self.cpus, task)?;
        if reason == BlockReason::Sleep {
            inner.sleepers.remove(task);
        }
        Ok(())
    }

    pub fn set_preemption_enabled(&self, enabled: bool) {
        self.preemption.store(enabled, Ordering::Release);
        klog_info!(
            "SCHED: preemption {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    #[inline]
    pub fn is_preemption_enabled(&self) -> bool {
        self.preemption.load(Ordering::Acquire)
    }

    pub fn set_algorithm(&self, algorithm: SchedAlgorithm) {
        self.inner.lock().policy.set_algorithm(algorithm);
    }

    pub fn algorithm(&self) -> SchedAlgorithm {
        self.inner.lock().policy.algorithm()
    }

    pub fn set_base_quantum(&self, ticks: u32) {
        self.inner.lock().policy.set_base_quantum(ticks);
    }

    pub fn set_priority_quantum(&self, priority: u8, ticks: Option<u32>) {
        self.inner.lock().policy.set_priority_quantum(priority, ticks);
    }

    pub fn quantum_for(&self, priority: u8) -> u32 {
        self.inner.lock().policy.quantum_for(priority)
    }

    pub fn current(&self, cpu: CpuId) -> Option<TaskId> {
        self.cpus.get(cpu)?.current_task()
    }

    pub fn task_info(&self, task: TaskId) -> Option<TaskInfo> {
        self.inner.lock().tasks.get(&task).map(Task::info)
    }

    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.inner.lock().tasks.values().map(Task::info).collect()
    }

    pub fn task_counts(&self) -> TaskCounts {
        let inner = self.inner.lock();
        let mut counts = TaskCounts::default();
        for task in inner.tasks.values() {
            match task.status() {
                TaskStatus::Ready => counts.ready += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Blocked => counts.blocked += 1,
                TaskStatus::Zombie => counts.zombie += 1,
                TaskStatus::Invalid => {}
            }
        }
        counts
    }

    pub fn stats(&self) -> SchedStats {
        let mut stats = self.inner.lock().stats;
        stats.total_ticks = self.now();
        stats
    }

    pub fn cpu_info(&self, cpu: CpuId) -> SchedResult<CpuInfo> {
        let _smp = self.smp_lock.lock();
        Ok(self.cpu_state(cpu)?.info())
    }

    /// Ready tasks across the global and every local queue.
    pub fn total_ready(&self) -> u32 {
        let inner = self.inner.lock();
        inner.global.len() + self.cpus.iter().map(|c| c.ready_count()).sum::<u32>()
    }
}

/// A scheduler bound to one CPU.
pub struct CpuHandle<'a, A: ContextSwitch> {
    sched: &'a Scheduler<A>,
    cpu: CpuId,
}

impl<A: ContextSwitch> Clone for CpuHandle<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ContextSwitch> Copy for CpuHandle<'_, A> {}

impl<'a, A: ContextSwitch> CpuHandle<'a, A> {
    #[inline]
    pub fn id(&self) -> CpuId {
        self.cpu
    }

    #[inline]
    pub fn scheduler(&self) -> &'a Scheduler<A> {
        self.sched
    }

    pub fn current(&self) -> Option<TaskId> {
        self.sched.current(self.cpu)
    }

    pub fn schedule(&self) -> SchedResult<ScheduleOutcome> {
        self.sched.schedule(self.cpu)
    }

    pub fn tick(&self) -> SchedResult<ScheduleOutcome> {
        self.sched.tick(self.cpu)
    }

    pub fn yield_now(&self) -> SchedResult<ScheduleOutcome> {
        self.sched.yield_now(self.cpu)
    }

    pub fn block_current(&self, reason: BlockReason) -> SchedResult<()> {
        self.sched.block_current(self.cpu, reason)
    }

    pub fn sleep_ms(&self, ms: u32) -> SchedResult<()> {
        self.sched.sleep_ms(self.cpu, ms)
    }

    pub fn waitpid(&self, child: TaskId, options: kairos_abi::WaitOptions) -> SchedResult<i32> {
        self.sched.waitpid(self.cpu, child, options)
    }

    /// Create a task whose parent is this CPU's current task.
    pub fn spawn(
        &self,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
        flags: TaskFlags,
    ) -> SchedResult<TaskId> {
        match self.current() {
            Some(parent) if !self.sched.cpus[self.cpu].is_idle_task(parent) => self
                .sched
                .create_child(parent, name, entry, arg, priority, flags),
            _ => self.sched.create_task(name, entry, arg, priority, flags),
        }
    }

    pub fn terminate(&self, task: TaskId, exit_code: i32) -> SchedResult<()> {
        self.sched.terminate(self.cpu, task, exit_code)
    }

    pub fn exit(&self, exit_code: i32) -> ! {
        self.sched.exit_current(self.cpu, exit_code)
    }

    pub fn info(&self) -> SchedResult<CpuInfo> {
        self.sched.cpu_info(self.cpu)
    }
}

impl<A: ContextSwitch> TaskControl for CpuHandle<'_, A> {
    fn current_task(&self) -> Option<TaskId> {
        self.current()
    }

    fn yield_now(&self) {
        let _ = self.sched.yield_now(self.cpu);
    }

    fn prepare_block(&self, reason: BlockReason) -> SchedResult<()> {
        self.sched.prepare_block(self.cpu, reason).map(|_| ())
    }

    fn commit_block(&self) {
        let _ = self.sched.commit_block(self.cpu);
    }

    fn unblock(&self, task: TaskId) -> SchedResult<()> {
        self.sched.unblock(task)
    }
}
