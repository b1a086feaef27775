//! Periodic load balancer for SMP.
//!
//! Runs every `balance_interval` scheduling decisions on each CPU. Moves at
//! most one task per run, so it corrects long-run skew rather than balancing
//! instantly.

use kairos_abi::task::CpuId;
use kairos_lib::klog_debug;

use super::context::ContextSwitch;
use super::scheduler::Scheduler;
use super::task_struct::QueueScope;

impl<A: ContextSwitch> Scheduler<A> {
    /// Busiest and idlest active CPUs (first of each on ties), if their
    /// local queue depths differ by more than the imbalance threshold.
    fn find_imbalance(&self) -> Option<(CpuId, CpuId)> {
        let mut busiest: Option<(CpuId, u32)> = None;
        let mut idlest: Option<(CpuId, u32)> = None;
        for pcpu in self.cpus.iter().filter(|c| c.is_active()) {
            let load = pcpu.ready_count();
            if busiest.is_none_or(|(_, max)| load > max) {
                busiest = Some((pcpu.cpu_id, load));
            }
            if idlest.is_none_or(|(_, min)| load < min) {
                idlest = Some((pcpu.cpu_id, load));
            }
        }
        let (max_cpu, max_load) = busiest?;
        let (min_cpu, min_load) = idlest?;
        (max_cpu != min_cpu && max_load - min_load > self.config.imbalance_threshold)
            .then_some((max_cpu, min_cpu))
    }

    /// Migrate the head of the busiest CPU's local queue to the idlest CPU.
    /// Returns whether a task moved.
    pub fn balance(&self) -> bool {
        if self.cpus.len() <= 1 {
            return false;
        }
        let _smp = self.smp_lock.lock();
        let mut inner = self.inner.lock();
        inner.stats.balance_runs += 1;

        let Some((from_cpu, to_cpu)) = self.find_imbalance() else {
            return false;
        };

        let moved = {
            let (low, high) = (from_cpu.min(to_cpu), from_cpu.max(to_cpu));
            let mut low_queues = self.cpus[low].queues();
            let mut high_queues = self.cpus[high].queues();
            let (src, dst) = if from_cpu == low {
                (&mut *low_queues, &mut *high_queues)
            } else {
                (&mut *high_queues, &mut *low_queues)
            };

            let Some((level, task)) = src.pop_highest() else {
                return false;
            };
            if !dst.push(level, task) {
                src.push_front(level, task);
                return false;
            }
            task
        };

        if let Some(task) = inner.tasks.get_mut(&moved) {
            task.home_cpu = Some(to_cpu);
            task.queued = Some(QueueScope::Local(to_cpu));
            task.migration_count += 1;
        }
        inner.stats.migrations += 1;
        drop(inner);

        klog_debug!(
            "LOAD_BALANCE: migrated task {} from CPU {} to CPU {}",
            moved,
            from_cpu,
            to_cpu
        );
        true
    }
}
