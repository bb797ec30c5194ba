//! 键控侵蚀的状态解析策略。
//!
//! # 教案式说明
//! - **意图 (Why)**：“全键共享节律”与“逐键独立节律”只在两点上不同：
//!   为某个键取哪一份 [`DecayScheduleState`]，以及决策点读取哪种口径的空闲数。
//!   把这两点抽成 [`StateResolver`]，键控装饰器本身只保留一份实现；
//! - **契约 (What)**：`with_state` 必须在状态的互斥锁内执行闭包，
//!   保证同一状态上的“判定 + 更新”串行化；
//! - **设计权衡 (Trade-offs)**：逐键状态按需创建，数量随键增长且不回收，
//!   与装饰器同生命周期。

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::decay::{DecayScheduleState, ErosionPolicy};
use crate::error::PoolResult;
use crate::pool::KeyedObjectPool;

/// 为键解析衰减状态的策略。
pub trait StateResolver<K> {
    /// 在 `key` 对应状态的锁内执行 `f`；`now` 用于惰性创建新状态。
    fn with_state<T, F>(&self, key: &K, now: Instant, f: F) -> T
    where
        F: FnOnce(&mut DecayScheduleState) -> T;

    /// 决策点使用的空闲数口径。
    fn idle_count<P>(&self, pool: &P, key: &K) -> PoolResult<usize>
    where
        P: KeyedObjectPool<Key = K> + ?Sized;
}

/// 所有键共享一份状态，侵蚀节律与键数量无关；空闲数取全池口径。
pub struct SharedErosionState {
    state: Mutex<DecayScheduleState>,
}

impl SharedErosionState {
    pub fn new(policy: ErosionPolicy, now: Instant) -> Self {
        Self {
            state: Mutex::new(DecayScheduleState::new(policy, now)),
        }
    }

    /// 在锁内访问共享状态。
    pub fn with_shared<T>(&self, f: impl FnOnce(&mut DecayScheduleState) -> T) -> T {
        f(&mut *self.state.lock())
    }

    /// 当前状态的拷贝，供诊断与测试读取。
    pub fn snapshot(&self) -> DecayScheduleState {
        self.state.lock().clone()
    }
}

impl<K> StateResolver<K> for SharedErosionState {
    fn with_state<T, F>(&self, _key: &K, _now: Instant, f: F) -> T
    where
        F: FnOnce(&mut DecayScheduleState) -> T,
    {
        self.with_shared(f)
    }

    fn idle_count<P>(&self, pool: &P, _key: &K) -> PoolResult<usize>
    where
        P: KeyedObjectPool<Key = K> + ?Sized,
    {
        pool.num_idle()
    }
}

impl fmt::Debug for SharedErosionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedErosionState")
            .field(&*self.state.lock())
            .finish()
    }
}

/// 每个键一份独立状态，首次访问时惰性创建；空闲数取该键口径。
///
/// # 教案式说明
/// - **意图 (Why)**：键之间负载差异大时，热点键的尖峰不应拖快冷门键的侵蚀；
/// - **契约 (What)**：不同键的状态互不读写；新状态的高水位从种子值开始；
/// - **实现 (How)**：`DashMap` 分片锁保证并发查找与插入安全，取出 `Arc` 后立即释放分片，
///   再在状态自身的互斥锁内执行判定，避免持有分片锁调用底层池。
pub struct PerKeyErosionState<K> {
    policy: ErosionPolicy,
    states: DashMap<K, Arc<Mutex<DecayScheduleState>>>,
}

impl<K: Eq + Hash + Clone> PerKeyErosionState<K> {
    pub fn new(policy: ErosionPolicy) -> Self {
        Self {
            policy,
            states: DashMap::new(),
        }
    }

    /// 已创建状态的键数量。
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// 指定键状态的拷贝；未访问过的键返回 `None`。
    pub fn snapshot(&self, key: &K) -> Option<DecayScheduleState> {
        self.states.get(key).map(|entry| entry.lock().clone())
    }

    fn resolve(&self, key: &K, now: Instant) -> Arc<Mutex<DecayScheduleState>> {
        if let Some(existing) = self.states.get(key) {
            return Arc::clone(existing.value());
        }
        let policy = self.policy;
        let entry = self
            .states
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DecayScheduleState::new(policy, now))));
        Arc::clone(entry.value())
    }
}

impl<K: Eq + Hash + Clone> StateResolver<K> for PerKeyErosionState<K> {
    fn with_state<T, F>(&self, key: &K, now: Instant, f: F) -> T
    where
        F: FnOnce(&mut DecayScheduleState) -> T,
    {
        let state = self.resolve(key, now);
        let mut guard = state.lock();
        f(&mut *guard)
    }

    fn idle_count<P>(&self, pool: &P, key: &K) -> PoolResult<usize>
    where
        P: KeyedObjectPool<Key = K> + ?Sized,
    {
        pool.num_idle_for(key)
    }
}

impl<K: Eq + Hash> fmt::Debug for PerKeyErosionState<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerKeyErosionState")
            .field("factor", &self.policy.factor())
            .field("tracked_keys", &self.states.len())
            .finish()
    }
}
