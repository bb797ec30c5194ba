//! 维护任务调度器。
//!
//! # 模块定位（Why）
//! - 最小空闲维护需要周期性执行的工作单元；调度器由宿主显式创建、显式启停，
//!   并以引用形式传给需要登记任务的函数，不存在隐式的进程级单例；
//! - [`MaintenanceScheduler`] 是唯一的扩展点：测试可以用手动推进的实现替换线程实现。
//!
//! # 契约说明（What）
//! - 工作单元返回 `Err` 即永久停止，调度器负责把对应的 [`ScheduledHandle`] 标记为已取消；
//! - 取消是单向的，已取消的任务不会再次执行；
//! - [`ThreadScheduler`] 采用固定延迟（fixed-delay）重复：下一次执行时间从本次执行结束时起算。
//!
//! # 风险提示（Trade-offs）
//! - 单工作线程串行执行全部任务，慢任务会推迟其他任务；
//! - 工作单元内的 panic 不被捕获，会终止工作线程并在 [`ThreadScheduler::shutdown`] 时重新抛出；
//!   工作线程退出前会把调度器置为已停止并取消全部句柄，之后的登记返回
//!   [`PoolError::SchedulerShutdown`]。

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Disposition, PoolError, PoolResult, classify};

/// 周期执行的工作单元。
pub type UnitOfWork = Box<dyn FnMut() -> PoolResult<()> + Send + 'static>;

/// 周期任务调度能力。
pub trait MaintenanceScheduler {
    /// 登记一个周期任务，`initial_delay` 后首次执行，之后按 `period` 重复。
    ///
    /// `period` 为零时返回 [`PoolError::InvalidArgument`]；调度器已停止时返回
    /// [`PoolError::SchedulerShutdown`]。
    fn schedule(
        &self,
        name: &str,
        unit: UnitOfWork,
        initial_delay: Duration,
        period: Duration,
    ) -> PoolResult<ScheduledHandle>;
}

impl<S: MaintenanceScheduler + ?Sized> MaintenanceScheduler for Arc<S> {
    fn schedule(
        &self,
        name: &str,
        unit: UnitOfWork,
        initial_delay: Duration,
        period: Duration,
    ) -> PoolResult<ScheduledHandle> {
        (**self).schedule(name, unit, initial_delay, period)
    }
}

/// 周期任务的取消句柄。
///
/// 句柄与调度器内部共享同一原子位：持有者调用 [`cancel`](Self::cancel)
/// 或任务自身失败停用，两侧都能观察到。
#[derive(Clone, Debug, Default)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// 创建处于“未取消”状态的句柄，供自定义调度器实现使用。
    pub fn new() -> Self {
        Self::default()
    }

    /// 标记取消；首次触发返回 `true`，之后返回 `false`。
    pub fn cancel(&self) -> bool {
        self.cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// 以单个后台线程执行周期任务的调度器。
///
/// # 教案式说明
/// - **意图 (Why)**：为最小空闲维护提供一个无需异步运行时的默认执行器；
/// - **生命周期 (How)**：`new` 只建立队列；`start` 启动工作线程；`shutdown` 停止并回收线程。
///   启动前登记的任务会在启动后按各自的延迟执行；
/// - **契约 (What)**：
///   - 可恢复错误只停止出错的那个任务；
///   - 致命错误停止整个调度器，`shutdown` 返回该错误，使其传播到调度器的所有者；
///   - 停止后再登记任务返回 [`PoolError::SchedulerShutdown`]。
pub struct ThreadScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

struct SchedulerState {
    phase: Phase,
    next_id: u64,
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, ScheduledTask>,
    fatal: Option<PoolError>,
}

struct ScheduledTask {
    name: String,
    unit: UnitOfWork,
    period: Duration,
    handle: ScheduledHandle,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    phase: Phase::Created,
                    next_id: 0,
                    queue: BinaryHeap::new(),
                    tasks: HashMap::new(),
                    fatal: None,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// 启动工作线程；重复调用无副作用，停止后调用返回 [`PoolError::SchedulerShutdown`]。
    pub fn start(&self) -> PoolResult<()> {
        let mut worker = self.worker.lock();
        {
            let mut state = self.shared.state.lock();
            match state.phase {
                Phase::Running => return Ok(()),
                Phase::Stopped => return Err(PoolError::SchedulerShutdown),
                Phase::Created => state.phase = Phase::Running,
            }
        }
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("spark-pool-maintenance".to_owned())
            .spawn(move || run_worker(&shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                tracing::info!("maintenance scheduler started");
                Ok(())
            }
            Err(error) => {
                self.shared.state.lock().phase = Phase::Created;
                Err(PoolError::operation("spawn_scheduler_thread", error))
            }
        }
    }

    /// 停止调度器并等待工作线程退出。
    ///
    /// 若某个任务曾以致命错误终止调度器，返回该错误；工作线程 panic 时原样重新抛出。
    pub fn shutdown(&self) -> PoolResult<()> {
        let handle = self.stop_worker();
        if let Some(handle) = handle {
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
        }
        tracing::info!("maintenance scheduler stopped");
        match self.shared.state.lock().fatal.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// 调度器是否已停止（显式关闭或因致命错误停止）。
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().phase == Phase::Stopped
    }

    /// 仍登记在队列中、尚未被取消的任务数。
    pub fn pending_tasks(&self) -> usize {
        self.shared
            .state
            .lock()
            .tasks
            .values()
            .filter(|task| !task.handle.is_cancelled())
            .count()
    }

    fn stop_worker(&self) -> Option<JoinHandle<()>> {
        let handle = self.worker.lock().take();
        let mut state = self.shared.state.lock();
        state.phase = Phase::Stopped;
        cancel_all(&mut state);
        self.shared.wakeup.notify_all();
        handle
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceScheduler for ThreadScheduler {
    fn schedule(
        &self,
        name: &str,
        unit: UnitOfWork,
        initial_delay: Duration,
        period: Duration,
    ) -> PoolResult<ScheduledHandle> {
        if period.is_zero() {
            return Err(PoolError::invalid_argument(
                "maintenance period must be greater than zero",
            ));
        }
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Stopped {
            return Err(PoolError::SchedulerShutdown);
        }
        let first_run = Instant::now()
            .checked_add(initial_delay)
            .ok_or_else(|| PoolError::invalid_argument("initial delay is out of range"))?;

        purge_cancelled(&mut state);

        let handle = ScheduledHandle::new();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert(
            id,
            ScheduledTask {
                name: name.to_owned(),
                unit,
                period,
                handle: handle.clone(),
            },
        );
        state.queue.push(Reverse((first_run, id)));
        self.shared.wakeup.notify_one();
        tracing::debug!(task = name, ?initial_delay, ?period, "maintenance task scheduled");
        Ok(handle)
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.stop_worker() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    std::panic::resume_unwind(payload);
                }
            }
        }
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ThreadScheduler")
            .field("phase", &state.phase)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

fn cancel_all(state: &mut SchedulerState) {
    for task in state.tasks.values() {
        task.handle.cancel();
    }
    state.tasks.clear();
    state.queue.clear();
}

/// 移除持有者已取消的任务；队列中残留的条目在出队时因找不到任务而被跳过。
fn purge_cancelled(state: &mut SchedulerState) {
    state.tasks.retain(|_, task| !task.handle.is_cancelled());
    if state.tasks.is_empty() {
        state.queue.clear();
    }
}

/// 工作线程退出守卫：工作单元 panic 导致线程展开时，把调度器置为已停止并取消全部任务，
/// 避免句柄继续报告“运行中”。
struct WorkerExitGuard<'a> {
    shared: &'a Shared,
}

impl Drop for WorkerExitGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let mut state = self.shared.state.lock();
        state.phase = Phase::Stopped;
        cancel_all(&mut state);
        tracing::error!("maintenance worker panicked, scheduler stopped");
    }
}

fn run_worker(shared: &Shared) {
    let _exit_guard = WorkerExitGuard { shared };
    let mut state = shared.state.lock();
    while state.phase == Phase::Running {
        let next = state.queue.peek().map(|Reverse(entry)| *entry);
        let Some((due, id)) = next else {
            shared.wakeup.wait(&mut state);
            continue;
        };
        if due > Instant::now() {
            shared.wakeup.wait_until(&mut state, due);
            continue;
        }
        state.queue.pop();
        let Some(mut task) = state.tasks.remove(&id) else {
            continue;
        };
        if task.handle.is_cancelled() {
            tracing::debug!(task = %task.name, "cancelled maintenance task dropped");
            continue;
        }

        let outcome = MutexGuard::unlocked(&mut state, || (task.unit)());
        match outcome {
            Ok(()) => reschedule(&mut state, id, task),
            Err(error) => {
                task.handle.cancel();
                match classify(&error) {
                    Disposition::Recoverable => {
                        tracing::debug!(task = %task.name, %error, "maintenance task stopped");
                    }
                    Disposition::Fatal => {
                        tracing::error!(
                            task = %task.name,
                            %error,
                            "fatal error in maintenance task, stopping scheduler"
                        );
                        state.fatal = Some(error);
                        state.phase = Phase::Stopped;
                        cancel_all(&mut state);
                    }
                }
            }
        }
    }
}

fn reschedule(state: &mut SchedulerState, id: u64, task: ScheduledTask) {
    if task.handle.is_cancelled() {
        return;
    }
    if state.phase != Phase::Running {
        // 执行期间调度器已停止，`cancel_all` 看不到这个已出队的任务。
        task.handle.cancel();
        return;
    }
    match Instant::now().checked_add(task.period) {
        Some(next) => {
            state.queue.push(Reverse((next, id)));
            state.tasks.insert(id, task);
        }
        None => {
            task.handle.cancel();
            tracing::warn!(task = %task.name, "maintenance period out of range, task stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn counting_unit(counter: &Arc<AtomicUsize>) -> UnitOfWork {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn handle_cancel_is_one_way() {
        let handle = ScheduledHandle::new();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());
        assert!(handle.cancel());
        assert!(!handle.cancel(), "第二次取消不应再次触发");
        assert!(observer.is_cancelled());
    }

    #[test]
    fn zero_period_is_rejected() {
        let scheduler = ThreadScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let result = scheduler.schedule("zero", counting_unit(&counter), Duration::ZERO, Duration::ZERO);
        assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn repeating_task_runs_until_cancelled() {
        let scheduler = ThreadScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler
            .schedule("tick", counting_unit(&counter), Duration::ZERO, Duration::from_millis(1))
            .expect("登记任务");
        scheduler.start().expect("启动调度器");

        assert!(wait_for(|| counter.load(Ordering::SeqCst) >= 3));
        assert!(handle.cancel());
        assert!(wait_for(|| scheduler.pending_tasks() == 0));
        thread::sleep(Duration::from_millis(10));
        let frozen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        scheduler.shutdown().expect("正常关闭");
    }

    #[test]
    fn failing_task_stops_alone() {
        let scheduler = ThreadScheduler::new();
        scheduler.start().expect("启动调度器");

        let healthy = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_in_unit = Arc::clone(&failures);
        let failing = scheduler
            .schedule(
                "failing",
                Box::new(move || {
                    failures_in_unit.fetch_add(1, Ordering::SeqCst);
                    Err(PoolError::Closed)
                }),
                Duration::ZERO,
                Duration::from_millis(1),
            )
            .expect("登记失败任务");
        let healthy_handle = scheduler
            .schedule("healthy", counting_unit(&healthy), Duration::ZERO, Duration::from_millis(1))
            .expect("登记健康任务");

        assert!(wait_for(|| failing.is_cancelled()));
        assert!(wait_for(|| healthy.load(Ordering::SeqCst) >= 5));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(!healthy_handle.is_cancelled());

        scheduler.shutdown().expect("可恢复错误不影响关闭");
        assert!(healthy_handle.is_cancelled(), "关闭时取消全部任务");
    }

    #[test]
    fn fatal_error_stops_scheduler_and_surfaces_on_shutdown() {
        let scheduler = ThreadScheduler::new();
        scheduler.start().expect("启动调度器");
        let bystander = Arc::new(AtomicUsize::new(0));
        let bystander_handle = scheduler
            .schedule(
                "bystander",
                counting_unit(&bystander),
                Duration::from_secs(3600),
                Duration::from_secs(3600),
            )
            .expect("登记旁观任务");
        scheduler
            .schedule(
                "fatal",
                Box::new(|| Err(PoolError::fatal("environment corrupted"))),
                Duration::ZERO,
                Duration::from_millis(1),
            )
            .expect("登记致命任务");

        assert!(wait_for(|| scheduler.is_shutdown()));
        assert!(bystander_handle.is_cancelled());
        assert!(matches!(
            scheduler.schedule("late", counting_unit(&bystander), Duration::ZERO, Duration::from_millis(1)),
            Err(PoolError::SchedulerShutdown)
        ));
        assert!(matches!(scheduler.shutdown(), Err(PoolError::Fatal(_))));
        assert_eq!(bystander.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_during_running_unit_cancels_its_handle() {
        let scheduler = ThreadScheduler::new();
        scheduler.start().expect("启动调度器");
        let entered = Arc::new(AtomicBool::new(false));
        let entered_in_unit = Arc::clone(&entered);
        let handle = scheduler
            .schedule(
                "slow",
                Box::new(move || {
                    entered_in_unit.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(100));
                    Ok(())
                }),
                Duration::ZERO,
                Duration::from_millis(1),
            )
            .expect("登记慢任务");

        assert!(wait_for(|| entered.load(Ordering::SeqCst)));
        scheduler.shutdown().expect("正常关闭");
        assert!(handle.is_cancelled(), "执行中的任务在关闭后同样视为已取消");
    }

    #[test]
    fn worker_panic_stops_scheduler_and_resurfaces_on_shutdown() {
        let scheduler = ThreadScheduler::new();
        let bystander = Arc::new(AtomicUsize::new(0));
        let bystander_handle = scheduler
            .schedule(
                "bystander",
                counting_unit(&bystander),
                Duration::from_secs(3600),
                Duration::from_secs(3600),
            )
            .expect("登记旁观任务");
        scheduler
            .schedule(
                "panicking",
                Box::new(|| panic!("unit exploded")),
                Duration::ZERO,
                Duration::from_millis(1),
            )
            .expect("登记 panic 任务");
        scheduler.start().expect("启动调度器");

        assert!(wait_for(|| scheduler.is_shutdown()));
        assert!(bystander_handle.is_cancelled());
        assert!(matches!(
            scheduler.schedule("late", counting_unit(&bystander), Duration::ZERO, Duration::from_millis(1)),
            Err(PoolError::SchedulerShutdown)
        ));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.shutdown()));
        assert!(outcome.is_err(), "工作线程的 panic 在关闭时重新抛出");
    }

    #[test]
    fn cancelled_tasks_leave_the_pending_count_immediately() {
        let scheduler = ThreadScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let long = scheduler
            .schedule("long", counting_unit(&counter), Duration::from_secs(3600), Duration::from_secs(3600))
            .expect("登记任务");
        assert_eq!(scheduler.pending_tasks(), 1);

        assert!(long.cancel());
        assert_eq!(scheduler.pending_tasks(), 0);

        let _next = scheduler
            .schedule("next", counting_unit(&counter), Duration::from_secs(3600), Duration::from_secs(3600))
            .expect("登记任务");
        assert_eq!(scheduler.pending_tasks(), 1);
        assert_eq!(scheduler.shared.state.lock().tasks.len(), 1, "登记时清理已取消的任务");
    }

    #[test]
    fn start_after_shutdown_is_rejected() {
        let scheduler = ThreadScheduler::new();
        scheduler.shutdown().expect("未启动也可关闭");
        assert!(matches!(scheduler.start(), Err(PoolError::SchedulerShutdown)));
    }
}
