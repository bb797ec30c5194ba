//! 集成测试共享夹具：可记录调用与注入故障的池，以及手动推进的调度器。
#![allow(dead_code)]

use std::collections::HashMap;
use std::hash::Hash;
use std::io;
use std::time::Duration;

use parking_lot::Mutex;
use spark_pool::{
    KeyedObjectPool, MaintenanceScheduler, ObjectPool, PoolError, PoolResult, ScheduledHandle,
    UnitOfWork,
};

/// 注入的故障类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Recoverable,
    Fatal,
}

impl Failure {
    fn into_error(self, operation: &'static str) -> PoolError {
        match self {
            Failure::Recoverable => {
                PoolError::operation(operation, io::Error::other("injected failure"))
            }
            Failure::Fatal => PoolError::fatal("injected fatal failure"),
        }
    }
}

#[derive(Default)]
struct Calls {
    counts: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, Failure>,
}

impl Calls {
    fn enter(&mut self, operation: &'static str) -> PoolResult<()> {
        *self.counts.entry(operation).or_default() += 1;
        match self.failures.get(operation) {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }
}

/// 线程安全的非键控记录池，对象为自增编号。
#[derive(Default)]
pub struct RecordingPool {
    inner: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    calls: Calls,
    idle: usize,
    active: usize,
    next_object: u32,
}

impl RecordingPool {
    pub fn with_idle(idle: usize) -> Self {
        let pool = Self::default();
        pool.set_idle(idle);
        pool
    }

    pub fn set_idle(&self, idle: usize) {
        self.inner.lock().idle = idle;
    }

    pub fn fail_on(&self, operation: &'static str, failure: Failure) {
        self.inner.lock().calls.failures.insert(operation, failure);
    }

    pub fn heal(&self, operation: &'static str) {
        self.inner.lock().calls.failures.remove(operation);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.inner
            .lock()
            .calls
            .counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn idle(&self) -> usize {
        self.inner.lock().idle
    }
}

impl ObjectPool for RecordingPool {
    type Object = u32;

    fn borrow_object(&self) -> PoolResult<u32> {
        let mut state = self.inner.lock();
        state.calls.enter("borrow_object")?;
        state.idle = state.idle.saturating_sub(1);
        state.active += 1;
        state.next_object += 1;
        Ok(state.next_object)
    }

    fn return_object(&self, _object: u32) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.calls.enter("return_object")?;
        state.active = state.active.saturating_sub(1);
        state.idle += 1;
        Ok(())
    }

    fn invalidate_object(&self, _object: u32) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.calls.enter("invalidate_object")?;
        state.active = state.active.saturating_sub(1);
        Ok(())
    }

    fn add_object(&self) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.calls.enter("add_object")?;
        state.idle += 1;
        Ok(())
    }

    fn num_idle(&self) -> PoolResult<usize> {
        let mut state = self.inner.lock();
        state.calls.enter("num_idle")?;
        Ok(state.idle)
    }

    fn num_active(&self) -> PoolResult<usize> {
        let mut state = self.inner.lock();
        state.calls.enter("num_active")?;
        Ok(state.active)
    }

    fn clear(&self) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.calls.enter("clear")?;
        state.idle = 0;
        Ok(())
    }

    fn close(&self) -> PoolResult<()> {
        self.inner.lock().calls.enter("close")
    }
}

/// 线程安全的键控记录池，按键统计空闲数与调用次数。
pub struct RecordingKeyedPool<K> {
    inner: Mutex<KeyedState<K>>,
}

struct KeyedState<K> {
    calls: Calls,
    per_key_calls: HashMap<(&'static str, K), usize>,
    idle: HashMap<K, usize>,
    key_failures: HashMap<K, Failure>,
}

impl<K: Eq + Hash + Clone> Default for RecordingKeyedPool<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(KeyedState {
                calls: Calls::default(),
                per_key_calls: HashMap::new(),
                idle: HashMap::new(),
                key_failures: HashMap::new(),
            }),
        }
    }
}

impl<K: Eq + Hash + Clone> RecordingKeyedPool<K> {
    pub fn set_idle(&self, key: K, idle: usize) {
        self.inner.lock().idle.insert(key, idle);
    }

    pub fn idle(&self, key: &K) -> usize {
        self.inner.lock().idle.get(key).copied().unwrap_or(0)
    }

    pub fn fail_on(&self, operation: &'static str, failure: Failure) {
        self.inner.lock().calls.failures.insert(operation, failure);
    }

    /// 让某个键上的所有按键操作失败。
    pub fn fail_key(&self, key: K, failure: Failure) {
        self.inner.lock().key_failures.insert(key, failure);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.inner
            .lock()
            .calls
            .counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls_for(&self, operation: &'static str, key: &K) -> usize {
        self.inner
            .lock()
            .per_key_calls
            .get(&(operation, key.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone> KeyedState<K> {
    fn enter_key(&mut self, operation: &'static str, key: &K) -> PoolResult<()> {
        *self
            .per_key_calls
            .entry((operation, key.clone()))
            .or_default() += 1;
        self.calls.enter(operation)?;
        match self.key_failures.get(key) {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedObjectPool for RecordingKeyedPool<K> {
    type Key = K;
    type Object = u32;

    fn borrow_object(&self, key: &K) -> PoolResult<u32> {
        let mut state = self.inner.lock();
        state.enter_key("borrow_object", key)?;
        let idle = state.idle.entry(key.clone()).or_default();
        *idle = idle.saturating_sub(1);
        Ok(1)
    }

    fn return_object(&self, key: &K, _object: u32) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.enter_key("return_object", key)?;
        *state.idle.entry(key.clone()).or_default() += 1;
        Ok(())
    }

    fn invalidate_object(&self, key: &K, _object: u32) -> PoolResult<()> {
        self.inner.lock().enter_key("invalidate_object", key)
    }

    fn add_object(&self, key: &K) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.enter_key("add_object", key)?;
        *state.idle.entry(key.clone()).or_default() += 1;
        Ok(())
    }

    fn num_idle(&self) -> PoolResult<usize> {
        let mut state = self.inner.lock();
        state.calls.enter("num_idle")?;
        Ok(state.idle.values().sum())
    }

    fn num_idle_for(&self, key: &K) -> PoolResult<usize> {
        let mut state = self.inner.lock();
        state.enter_key("num_idle_for", key)?;
        Ok(state.idle.get(key).copied().unwrap_or(0))
    }

    fn num_active(&self) -> PoolResult<usize> {
        self.inner.lock().calls.enter("num_active").map(|()| 0)
    }

    fn num_active_for(&self, key: &K) -> PoolResult<usize> {
        self.inner.lock().enter_key("num_active_for", key).map(|()| 0)
    }

    fn clear(&self) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.calls.enter("clear")?;
        state.idle.clear();
        Ok(())
    }

    fn clear_key(&self, key: &K) -> PoolResult<()> {
        let mut state = self.inner.lock();
        state.enter_key("clear_key", key)?;
        state.idle.remove(key);
        Ok(())
    }

    fn close(&self) -> PoolResult<()> {
        self.inner.lock().calls.enter("close")
    }
}

/// 手动推进的调度器：每次 `tick` 依次执行所有仍在运行的任务一次。
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<ManualTask>>,
}

struct ManualTask {
    name: String,
    unit: UnitOfWork,
    handle: ScheduledHandle,
}

impl ManualScheduler {
    /// 执行一轮，返回本轮实际执行的任务数。
    pub fn tick(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let mut executed = 0;
        for task in tasks.iter_mut() {
            if task.handle.is_cancelled() {
                continue;
            }
            executed += 1;
            if (task.unit)().is_err() {
                task.handle.cancel();
            }
        }
        executed
    }

    pub fn tick_n(&self, rounds: usize) {
        for _ in 0..rounds {
            self.tick();
        }
    }

    pub fn scheduled(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.lock().iter().map(|task| task.name.clone()).collect()
    }
}

impl MaintenanceScheduler for ManualScheduler {
    fn schedule(
        &self,
        name: &str,
        unit: UnitOfWork,
        _initial_delay: Duration,
        period: Duration,
    ) -> PoolResult<ScheduledHandle> {
        if period.is_zero() {
            return Err(PoolError::invalid_argument("period must be positive"));
        }
        let handle = ScheduledHandle::new();
        self.tasks.lock().push(ManualTask {
            name: name.to_owned(),
            unit,
            handle: handle.clone(),
        });
        Ok(handle)
    }
}
