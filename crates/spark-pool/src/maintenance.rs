//! 最小空闲维护与预填充。
//!
//! # 教案式说明
//! - **意图 (Why)**：侵蚀只负责收缩；冷启动或空闲对象被耗尽后，需要一条独立于归还路径的
//!   补充通道，把空闲数维持在目标值附近；
//! - **机制 (How)**：每个目标（一个池，或键控池的一个键）登记一个周期任务。每次执行读取
//!   空闲数，不足目标值时只补充**一个**对象，多次周期逐步逼近目标，避免单次突发创建；
//! - **契约 (What)**：
//!   - 周期为零时在登记阶段返回 [`PoolError::InvalidArgument`]，不会登记任何任务；
//!   - 任务执行中出现任何错误都会永久停用该任务，不影响同一调度器上的其他任务，
//!     也不会回传给登记者；停用只能通过 [`MinIdleTask::is_active`] 观察；
//!   - 致命错误同样停用任务，并交给调度器继续向外传播；
//! - **风险 (Trade-offs)**：任务持有池的所有权（通常是 `Arc`），池的生命周期会延长到任务停止。

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Disposition, PoolError, PoolResult, classify};
use crate::pool::{KeyedObjectPool, ObjectPool};
use crate::scheduler::{MaintenanceScheduler, ScheduledHandle};

/// 一个已登记的最小空闲维护任务。
///
/// 停用状态由任务自身记录：工作单元首次出错即置位，不依赖调度器是否取消句柄。
pub struct MinIdleTask {
    target: String,
    min_idle: usize,
    handle: ScheduledHandle,
    stopped: Arc<AtomicBool>,
}

impl MinIdleTask {
    /// 目标最小空闲数。
    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    /// 任务是否仍在运行；被取消或因错误停用后永久返回 `false`。
    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && !self.handle.is_cancelled()
    }

    /// 取消任务；仅当任务此前仍在运行时返回 `true`。
    pub fn cancel(&self) -> bool {
        let was_running = !self.stopped.swap(true, Ordering::AcqRel);
        let cancelled = self.handle.cancel();
        was_running && cancelled
    }

    /// 底层调度句柄。
    pub fn handle(&self) -> &ScheduledHandle {
        &self.handle
    }
}

impl fmt::Debug for MinIdleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinIdleTask")
            .field("target", &self.target)
            .field("min_idle", &self.min_idle)
            .field("active", &self.is_active())
            .finish()
    }
}

fn validate_period(period: Duration) -> PoolResult<()> {
    if period.is_zero() {
        return Err(PoolError::invalid_argument(
            "min-idle period must be greater than zero",
        ));
    }
    Ok(())
}

/// 一次检查：空闲数低于目标时补充一个对象。
fn top_up(
    min_idle: usize,
    idle: impl FnOnce() -> PoolResult<usize>,
    add: impl FnOnce() -> PoolResult<()>,
) -> PoolResult<()> {
    if idle()? < min_idle {
        add()?;
    }
    Ok(())
}

fn report_deactivation(target: &str, error: &PoolError) {
    match classify(error) {
        Disposition::Recoverable => {
            tracing::warn!(target_pool = target, %error, "min-idle task deactivated");
        }
        Disposition::Fatal => {
            tracing::error!(target_pool = target, %error, "min-idle task hit a fatal error");
        }
    }
}

fn schedule_task<S>(
    scheduler: &S,
    target: String,
    min_idle: usize,
    period: Duration,
    mut tick: impl FnMut() -> PoolResult<()> + Send + 'static,
) -> PoolResult<MinIdleTask>
where
    S: MaintenanceScheduler + ?Sized,
{
    let label = target.clone();
    let stopped = Arc::new(AtomicBool::new(false));
    let stopped_in_unit = Arc::clone(&stopped);
    let unit = Box::new(move || {
        if stopped_in_unit.load(Ordering::Acquire) {
            return Ok(());
        }
        tick().inspect_err(|error| {
            stopped_in_unit.store(true, Ordering::Release);
            report_deactivation(&label, error);
        })
    });
    let handle = scheduler.schedule(&target, unit, Duration::ZERO, period)?;
    tracing::debug!(target_pool = %target, min_idle, ?period, "min-idle task scheduled");
    Ok(MinIdleTask {
        target,
        min_idle,
        handle,
        stopped,
    })
}

/// 为非键控池登记最小空闲维护任务，首次检查立即执行。
///
/// `pool` 通常传入 `Arc<Pool>`，与业务侧共享同一个池。
pub fn check_min_idle<S, P>(
    scheduler: &S,
    pool: P,
    min_idle: usize,
    period: Duration,
) -> PoolResult<MinIdleTask>
where
    S: MaintenanceScheduler + ?Sized,
    P: ObjectPool + Send + 'static,
{
    validate_period(period)?;
    schedule_task(
        scheduler,
        "pool".to_owned(),
        min_idle,
        period,
        move || top_up(min_idle, || pool.num_idle(), || pool.add_object()),
    )
}

/// 为键控池的单个键登记最小空闲维护任务。
pub fn check_min_idle_keyed<S, P>(
    scheduler: &S,
    pool: P,
    key: P::Key,
    min_idle: usize,
    period: Duration,
) -> PoolResult<MinIdleTask>
where
    S: MaintenanceScheduler + ?Sized,
    P: KeyedObjectPool + Send + 'static,
    P::Key: fmt::Debug + Send + 'static,
{
    validate_period(period)?;
    schedule_task(
        scheduler,
        format!("key {key:?}"),
        min_idle,
        period,
        move || {
            top_up(
                min_idle,
                || pool.num_idle_for(&key),
                || pool.add_object(&key),
            )
        },
    )
}

/// 为一组键分别登记互相独立的维护任务。
///
/// 周期在登记任何任务之前校验；重复出现的键只登记一次。若中途某个键登记失败，
/// 已登记的任务会被取消，错误返回给调用方。
pub fn check_min_idle_keys<S, P, I>(
    scheduler: &S,
    pool: P,
    keys: I,
    min_idle: usize,
    period: Duration,
) -> PoolResult<HashMap<P::Key, MinIdleTask>>
where
    S: MaintenanceScheduler + ?Sized,
    P: KeyedObjectPool + Clone + Send + 'static,
    P::Key: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    I: IntoIterator<Item = P::Key>,
{
    validate_period(period)?;
    let mut tasks = HashMap::new();
    for key in keys {
        if tasks.contains_key(&key) {
            continue;
        }
        match check_min_idle_keyed(scheduler, pool.clone(), key.clone(), min_idle, period) {
            Ok(task) => {
                tasks.insert(key, task);
            }
            Err(error) => {
                for task in tasks.values() {
                    task.cancel();
                }
                return Err(error);
            }
        }
    }
    Ok(tasks)
}

/// 连续调用 `count` 次 `add_object`，遇到首个错误即返回。
pub fn prefill<P: ObjectPool + ?Sized>(pool: &P, count: usize) -> PoolResult<()> {
    for _ in 0..count {
        pool.add_object()?;
    }
    Ok(())
}

/// 为单个键预填充 `count` 个对象。
pub fn prefill_keyed<P: KeyedObjectPool + ?Sized>(
    pool: &P,
    key: &P::Key,
    count: usize,
) -> PoolResult<()> {
    for _ in 0..count {
        pool.add_object(key)?;
    }
    Ok(())
}

/// 依次为每个键预填充 `count` 个对象。
pub fn prefill_keys<'a, P, I>(pool: &P, keys: I, count: usize) -> PoolResult<()>
where
    P: KeyedObjectPool + ?Sized,
    P::Key: 'a,
    I: IntoIterator<Item = &'a P::Key>,
{
    for key in keys {
        prefill_keyed(pool, key, count)?;
    }
    Ok(())
}
