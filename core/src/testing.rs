//! Host test doubles: a scripted context switch, a fake `TaskControl`, and
//! a klog capture backend.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use kairos_abi::SchedError;
use kairos_abi::SchedResult;
use kairos_abi::task::{BlockReason, TaskId};
use kairos_lib::{KlogLevel, klog_register_backend};
use std::thread_local;

use crate::scheduler::{ContextSwitch, SchedConfig, Scheduler, TaskEntry};
use crate::sync::TaskControl;

// =============================================================================
// Scripted context switch
// =============================================================================

type SwitchAction = Box<dyn FnOnce()>;

thread_local! {
    static SWITCH_SCRIPT: RefCell<VecDeque<SwitchAction>> = RefCell::new(VecDeque::new());
    static SWITCH_LOG: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static KLOG_LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MockContext {
    pub entry: usize,
    pub arg: usize,
    pub stack_top: usize,
}

/// Context switch that never leaves the test thread.
///
/// Each `switch` logs the target's `arg` and runs the next scripted action,
/// if any, as the task being switched to. Returning from the action stands
/// for that task switching back.
pub(crate) struct MockSwitch;

impl ContextSwitch for MockSwitch {
    type Context = MockContext;

    fn setup_context(&self, entry: TaskEntry, arg: usize, stack_top: usize) -> MockContext {
        MockContext {
            entry: entry as usize,
            arg,
            stack_top,
        }
    }

    unsafe fn switch(&self, _from: *mut MockContext, to: *const MockContext) {
        // SAFETY: the scheduler hands over a live context.
        let arg = unsafe { (*to).arg };
        SWITCH_LOG.with(|log| log.borrow_mut().push(arg));
        let action = SWITCH_SCRIPT.with(|script| script.borrow_mut().pop_front());
        if let Some(action) = action {
            action();
        }
    }

    fn halt(&self) -> ! {
        panic!("mock CPU halted");
    }
}

/// Run `action` during the next context switch on this thread.
pub(crate) fn on_next_switch(action: impl FnOnce() + 'static) {
    SWITCH_SCRIPT.with(|script| script.borrow_mut().push_back(Box::new(action)));
}

/// `arg` of every task switched to so far on this thread.
pub(crate) fn switch_log() -> Vec<usize> {
    SWITCH_LOG.with(|log| log.borrow().clone())
}

pub(crate) fn idle_entry(_cpu: usize) {}

pub(crate) fn task_entry(_arg: usize) {}

pub(crate) fn test_config(cpus: usize) -> SchedConfig {
    SchedConfig {
        stack_size: 4096,
        ..SchedConfig::with_cpus(cpus)
    }
}

/// Fresh scheduler with a clean switch script. Leaked so scripted actions
/// can hold it.
pub(crate) fn scheduler(config: SchedConfig) -> &'static Scheduler<MockSwitch> {
    SWITCH_SCRIPT.with(|script| script.borrow_mut().clear());
    SWITCH_LOG.with(|log| log.borrow_mut().clear());
    Box::leak(Box::new(Scheduler::new(MockSwitch, config)))
}

/// Scheduler whose CPUs each have an idle task and are running it.
pub(crate) fn started(config: SchedConfig) -> &'static Scheduler<MockSwitch> {
    let sched = scheduler(config);
    for cpu in 0..sched.cpu_count() {
        sched
            .create_idle_task(cpu, idle_entry)
            .expect("idle task creation");
        sched.start(cpu).expect("cpu start");
    }
    sched
}

// =============================================================================
// Fake TaskControl
// =============================================================================

type ControlAction<'a> = Box<dyn FnOnce(&FakeControl<'a>) + 'a>;

/// `TaskControl` without a scheduler. Blocking runs the next `on_block`
/// action in place of other tasks; yielding runs the next `on_yield` action.
pub(crate) struct FakeControl<'a> {
    current: Cell<Option<TaskId>>,
    refuse_blocks: Cell<bool>,
    yields: Cell<usize>,
    blocked: RefCell<Vec<(TaskId, BlockReason)>>,
    unblocked: RefCell<Vec<TaskId>>,
    block_actions: RefCell<VecDeque<ControlAction<'a>>>,
    yield_actions: RefCell<VecDeque<ControlAction<'a>>>,
}

impl<'a> FakeControl<'a> {
    pub(crate) fn new(current: Option<TaskId>) -> Self {
        Self {
            current: Cell::new(current),
            refuse_blocks: Cell::new(false),
            yields: Cell::new(0),
            blocked: RefCell::new(Vec::new()),
            unblocked: RefCell::new(Vec::new()),
            block_actions: RefCell::new(VecDeque::new()),
            yield_actions: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn set_current(&self, task: Option<TaskId>) {
        self.current.set(task);
    }

    /// Make `prepare_block` fail, as on a CPU that cannot reschedule.
    pub(crate) fn refuse_blocks(&self, refuse: bool) {
        self.refuse_blocks.set(refuse);
    }

    pub(crate) fn on_block(&self, action: impl FnOnce(&FakeControl<'a>) + 'a) {
        self.block_actions.borrow_mut().push_back(Box::new(action));
    }

    pub(crate) fn on_yield(&self, action: impl FnOnce(&FakeControl<'a>) + 'a) {
        self.yield_actions.borrow_mut().push_back(Box::new(action));
    }

    pub(crate) fn yields(&self) -> usize {
        self.yields.get()
    }

    pub(crate) fn blocked(&self) -> Vec<(TaskId, BlockReason)> {
        self.blocked.borrow().clone()
    }

    pub(crate) fn unblocked(&self) -> Vec<TaskId> {
        self.unblocked.borrow().clone()
    }
}

impl TaskControl for FakeControl<'_> {
    fn current_task(&self) -> Option<TaskId> {
        self.current.get()
    }

    fn yield_now(&self) {
        self.yields.set(self.yields.get() + 1);
        let action = self.yield_actions.borrow_mut().pop_front();
        if let Some(action) = action {
            action(self);
        }
    }

    fn prepare_block(&self, reason: BlockReason) -> SchedResult<()> {
        if self.refuse_blocks.get() {
            return Err(SchedError::WouldBlock);
        }
        let me = self.current.get().ok_or(SchedError::NoCurrentTask)?;
        self.blocked.borrow_mut().push((me, reason));
        Ok(())
    }

    fn commit_block(&self) {
        let action = self.block_actions.borrow_mut().pop_front();
        match action {
            Some(action) => action(self),
            None => panic!(
                "task {:?} blocked with nothing left to wake it",
                self.current.get()
            ),
        }
    }

    fn unblock(&self, task: TaskId) -> SchedResult<()> {
        self.unblocked.borrow_mut().push(task);
        Ok(())
    }
}

// =============================================================================
// klog capture
// =============================================================================

fn capture_backend(level: KlogLevel, args: fmt::Arguments<'_>) {
    let line = alloc::format!("{}: {}", level.as_str(), args);
    KLOG_LINES.with(|lines| lines.borrow_mut().push(line));
}

/// Route klog into a per-thread buffer and clear it.
pub(crate) fn capture_klog() {
    klog_register_backend(capture_backend);
    KLOG_LINES.with(|lines| lines.borrow_mut().clear());
}

pub(crate) fn captured_klog() -> Vec<String> {
    KLOG_LINES.with(|lines| lines.borrow().clone())
}
