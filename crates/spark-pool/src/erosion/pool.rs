//! 侵蚀装饰器：在归还路径上依据衰减状态选择“放回空闲容量”或“失效丢弃”。
//!
//! # 模块角色（Why）
//! - 作为空闲对象驱逐线程的替代方案，负载尖峰后依靠正常的归还流量逐步收缩池；
//! - 对 FIFO 池尤其有效：FIFO 会轮转全部空闲对象，单靠空闲超时难以让它们过期。
//!
//! # 核心机制（How）
//! 1. 读取当前时间；
//! 2. 在衰减状态的锁内判定：未到决策点直接放回；到达决策点时读取空闲数、更新状态；
//! 3. 释放锁后再调用底层池的 `invalidate_object` 或 `return_object`，
//!    避免在锁内执行可能阻塞的池操作；
//! 4. 底层池在归还/失效/关闭时抛出的可恢复错误一律吞掉，致命错误继续传播。
//!
//! # 契约说明（What）
//! - 借出、新增、计数、清空的错误原样转发；
//! - `return_object` / `invalidate_object` / `close` 对可恢复错误返回 `Ok(())`；
//! - 衰减因子必须为有限正数，在构造时校验。

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use super::decay::{DecayScheduleState, ErosionPolicy};
use super::scope::{PerKeyErosionState, SharedErosionState, StateResolver};
use crate::clock::{Clock, SystemClock};
use crate::config::ErosionConfig;
use crate::error::{Disposition, PoolResult, classify, swallow_recoverable};
use crate::pool::{KeyedObjectPool, ObjectPool};

/// 在已持有状态锁的前提下执行一次侵蚀判定。
///
/// 空闲数只在到达决策点时读取；读取失败且可恢复时按 0 处理（不丢弃，但仍推进节律）。
fn decide_at<F>(state: &mut DecayScheduleState, now: Instant, idle: F) -> PoolResult<bool>
where
    F: FnOnce() -> PoolResult<usize>,
{
    if !state.is_due(now) {
        return Ok(false);
    }
    let idle = match idle() {
        Ok(count) => count,
        Err(error) => match classify(&error) {
            Disposition::Recoverable => {
                tracing::debug!(%error, "idle count unavailable at erosion point, treating as zero");
                0
            }
            Disposition::Fatal => return Err(error),
        },
    };
    let discard = state.decide(now, idle);
    tracing::debug!(
        idle,
        discard,
        high_water = state.idle_high_water_mark(),
        "erosion decision point reached"
    );
    Ok(discard)
}

/// 整池侵蚀装饰器：包装非键控池，全池共享一份衰减状态。
///
/// # 教案式说明
/// - **意图 (Why)**：为任意 [`ObjectPool`] 增加自适应收缩能力，而无需修改池本身；
/// - **契约 (What)**：实现与被包装池相同的 [`ObjectPool`] 能力面，仅拦截归还路径；
/// - **风险 (Trade-offs)**：判定依赖归还流量，完全空闲（无归还）的池不会被侵蚀。
pub struct ErodingPool<P> {
    pool: P,
    state: SharedErosionState,
    clock: Arc<dyn Clock>,
}

impl<P: ObjectPool> ErodingPool<P> {
    /// 以系统时钟与默认间隔包装 `pool`；`factor` 非法时立即失败。
    pub fn new(pool: P, factor: f64) -> PoolResult<Self> {
        Ok(Self::with_policy(
            pool,
            ErosionPolicy::new(factor)?,
            Arc::new(SystemClock),
        ))
    }

    /// 以已校验的策略与指定时钟包装 `pool`。
    pub fn with_policy(pool: P, policy: ErosionPolicy, clock: Arc<dyn Clock>) -> Self {
        let state = SharedErosionState::new(policy, clock.now());
        Self { pool, state, clock }
    }

    /// 被包装的池。
    pub fn get_ref(&self) -> &P {
        &self.pool
    }

    /// 拆出被包装的池。
    pub fn into_inner(self) -> P {
        self.pool
    }

    /// 当前衰减状态的拷贝。
    pub fn erosion_state(&self) -> DecayScheduleState {
        self.state.snapshot()
    }
}

impl<P: ObjectPool> ObjectPool for ErodingPool<P> {
    type Object = P::Object;

    fn borrow_object(&self) -> PoolResult<Self::Object> {
        self.pool.borrow_object()
    }

    /// 归还对象，或在侵蚀触发时改为失效。
    ///
    /// 只有致命错误会以 `Err` 返回。
    fn return_object(&self, object: Self::Object) -> PoolResult<()> {
        let now = self.clock.now();
        let discard = self
            .state
            .with_shared(|state| decide_at(state, now, || self.pool.num_idle()))?;
        let result = if discard {
            self.pool.invalidate_object(object)
        } else {
            self.pool.return_object(object)
        };
        swallow_recoverable("eroding_pool.return_object", result)
    }

    fn invalidate_object(&self, object: Self::Object) -> PoolResult<()> {
        swallow_recoverable(
            "eroding_pool.invalidate_object",
            self.pool.invalidate_object(object),
        )
    }

    fn add_object(&self) -> PoolResult<()> {
        self.pool.add_object()
    }

    fn num_idle(&self) -> PoolResult<usize> {
        self.pool.num_idle()
    }

    fn num_active(&self) -> PoolResult<usize> {
        self.pool.num_active()
    }

    fn clear(&self) -> PoolResult<()> {
        self.pool.clear()
    }

    fn close(&self) -> PoolResult<()> {
        swallow_recoverable("eroding_pool.close", self.pool.close())
    }
}

impl<P: fmt::Debug> fmt::Debug for ErodingPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErodingPool")
            .field("state", &self.state)
            .field("pool", &self.pool)
            .finish()
    }
}

/// 键控侵蚀装饰器，状态解析策略 `R` 决定共享节律或逐键节律。
///
/// # 教案式说明
/// - **意图 (Why)**：两种键控变体仅在“取哪份状态、读哪种空闲数”上不同，
///   以策略参数替代继承，装饰器逻辑只写一次；
/// - **契约 (What)**：
///   - [`ErodingKeyedPool::shared`]：全部键共享一份状态，空闲数取全池口径；
///   - [`ErodingKeyedPool::per_key`]：每个键独立状态，空闲数取该键口径；
///   - 其余行为与 [`ErodingPool`] 一致。
pub struct ErodingKeyedPool<P, R> {
    pool: P,
    resolver: R,
    clock: Arc<dyn Clock>,
}

impl<P: KeyedObjectPool> ErodingKeyedPool<P, SharedErosionState> {
    /// 全键共享节律，系统时钟，默认间隔。
    pub fn shared(pool: P, factor: f64) -> PoolResult<Self> {
        Ok(Self::shared_with_policy(
            pool,
            ErosionPolicy::new(factor)?,
            Arc::new(SystemClock),
        ))
    }

    pub fn shared_with_policy(pool: P, policy: ErosionPolicy, clock: Arc<dyn Clock>) -> Self {
        let resolver = SharedErosionState::new(policy, clock.now());
        Self::with_resolver(pool, resolver, clock)
    }
}

impl<P> ErodingKeyedPool<P, PerKeyErosionState<P::Key>>
where
    P: KeyedObjectPool,
    P::Key: Eq + Hash + Clone,
{
    /// 逐键独立节律，系统时钟，默认间隔。
    pub fn per_key(pool: P, factor: f64) -> PoolResult<Self> {
        Ok(Self::per_key_with_policy(
            pool,
            ErosionPolicy::new(factor)?,
            Arc::new(SystemClock),
        ))
    }

    pub fn per_key_with_policy(pool: P, policy: ErosionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::with_resolver(pool, PerKeyErosionState::new(policy), clock)
    }
}

impl<P, R> ErodingKeyedPool<P, R>
where
    P: KeyedObjectPool,
    R: StateResolver<P::Key>,
{
    /// 以任意状态解析策略包装 `pool`。
    pub fn with_resolver(pool: P, resolver: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            resolver,
            clock,
        }
    }

    pub fn get_ref(&self) -> &P {
        &self.pool
    }

    pub fn into_inner(self) -> P {
        self.pool
    }

    /// 状态解析策略，用于读取诊断快照。
    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<P, R> KeyedObjectPool for ErodingKeyedPool<P, R>
where
    P: KeyedObjectPool,
    R: StateResolver<P::Key>,
{
    type Key = P::Key;
    type Object = P::Object;

    fn borrow_object(&self, key: &Self::Key) -> PoolResult<Self::Object> {
        self.pool.borrow_object(key)
    }

    fn return_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
        let now = self.clock.now();
        let discard = self.resolver.with_state(key, now, |state| {
            decide_at(state, now, || self.resolver.idle_count(&self.pool, key))
        })?;
        let result = if discard {
            self.pool.invalidate_object(key, object)
        } else {
            self.pool.return_object(key, object)
        };
        swallow_recoverable("eroding_keyed_pool.return_object", result)
    }

    fn invalidate_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
        swallow_recoverable(
            "eroding_keyed_pool.invalidate_object",
            self.pool.invalidate_object(key, object),
        )
    }

    fn add_object(&self, key: &Self::Key) -> PoolResult<()> {
        self.pool.add_object(key)
    }

    fn num_idle(&self) -> PoolResult<usize> {
        self.pool.num_idle()
    }

    fn num_idle_for(&self, key: &Self::Key) -> PoolResult<usize> {
        self.pool.num_idle_for(key)
    }

    fn num_active(&self) -> PoolResult<usize> {
        self.pool.num_active()
    }

    fn num_active_for(&self, key: &Self::Key) -> PoolResult<usize> {
        self.pool.num_active_for(key)
    }

    fn clear(&self) -> PoolResult<()> {
        self.pool.clear()
    }

    fn clear_key(&self, key: &Self::Key) -> PoolResult<()> {
        self.pool.clear_key(key)
    }

    fn close(&self) -> PoolResult<()> {
        swallow_recoverable("eroding_keyed_pool.close", self.pool.close())
    }
}

impl<P: fmt::Debug, R: fmt::Debug> fmt::Debug for ErodingKeyedPool<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErodingKeyedPool")
            .field("resolver", &self.resolver)
            .field("pool", &self.pool)
            .finish()
    }
}

/// 装箱后的键控池，供按配置在运行期选择侵蚀变体的调用方使用。
pub type BoxedKeyedPool<K, V> = Box<dyn KeyedObjectPool<Key = K, Object = V> + Send + Sync>;

/// 依据配置中的 `per_key` 开关选择键控侵蚀变体。
///
/// 配置先经 [`ErosionConfig::to_policy`] 校验，失败时不会包装任何池。
pub fn eroding_keyed_pool<P>(
    pool: P,
    config: &ErosionConfig,
    clock: Arc<dyn Clock>,
) -> PoolResult<BoxedKeyedPool<P::Key, P::Object>>
where
    P: KeyedObjectPool + Send + Sync + 'static,
    P::Key: Eq + Hash + Clone + Send + Sync + 'static,
{
    let policy = config.to_policy()?;
    if config.per_key {
        Ok(Box::new(ErodingKeyedPool::per_key_with_policy(
            pool, policy, clock,
        )))
    } else {
        Ok(Box::new(ErodingKeyedPool::shared_with_policy(
            pool, policy, clock,
        )))
    }
}
