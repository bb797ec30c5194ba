//! 侵蚀决策引擎：基于时间衰减的“归还还是丢弃”判定。
//!
//! # 模块定位（Why）
//! - 负载尖峰过后，池中会滞留大量空闲对象；本模块在**不引入后台线程**的前提下，
//!   借助每次归还时刻的信息决定是否丢弃被归还的对象，从而逐步收缩池规模；
//! - 节律自适应：空闲数接近历史高水位时以最短间隔侵蚀，快速释放尖峰余量；
//!   空闲数接近零时以最长间隔侵蚀，避免低需求时反复创建/销毁。
//!
//! # 核心机制（How）
//! 1. 若 `next_erosion >= now`，本次未到达决策点，直接返回“不丢弃”且不修改状态；
//! 2. 否则：`idle > 0` 则丢弃；
//! 3. 更新高水位 `high_water = max(high_water, idle)`；
//! 4. 在 `[min_interval, max_interval]` 之间线性插值：
//!    `secs = max + (min - max) * idle / high_water`；
//! 5. `next_erosion = now + secs * factor`。
//!
//! # 契约说明（What）
//! - `factor` 取值 `(0, 1)` 侵蚀更激进，`> 1` 更保守；
//! - 高水位以 `high_water_seed`（默认 1）为下界，除法始终有定义；
//! - 状态本身不做同步，调用方（装饰器）负责在临界区内调用 [`DecayScheduleState::decide`]。

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{PoolError, PoolResult};

/// 默认侵蚀因子。
pub const DEFAULT_FACTOR: f64 = 1.0;
/// 空闲数为零时的侵蚀间隔（缩放前）。
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// 空闲数触及高水位时的侵蚀间隔（缩放前）。
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);
/// 高水位初始值。
pub const DEFAULT_HIGH_WATER_SEED: usize = 1;

/// 侵蚀策略参数，构造后不可变。
///
/// # 教案式说明
/// - **意图 (Why)**：把衰减因子与两端间隔、高水位种子收拢为一个值类型，
///   默认值即经过验证的固定常量，需要时可整体覆写；
/// - **契约 (What)**：只能经 [`ErosionPolicy::new`] 或 [`ErosionPolicyBuilder::build`] 得到，
///   因而持有者无需再次校验；
/// - **设计权衡 (Trade-offs)**：因子以 `f64` 表达，换取任意精度的缩放；
///   极大因子导致的溢出在计算延迟时饱和处理。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ErosionPolicy {
    factor: f64,
    max_interval: Duration,
    min_interval: Duration,
    high_water_seed: usize,
}

impl ErosionPolicy {
    /// 以默认间隔与指定因子构造策略；因子必须为有限正数。
    pub fn new(factor: f64) -> PoolResult<Self> {
        Self::builder().factor(factor).build()
    }

    /// 返回构造器，起始值为全部默认参数。
    pub fn builder() -> ErosionPolicyBuilder {
        ErosionPolicyBuilder::default()
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn high_water_seed(&self) -> usize {
        self.high_water_seed
    }

    /// 计算给定空闲数与高水位下、缩放后的下一次侵蚀间隔。
    ///
    /// 要求 `idle <= high_water`（[`DecayScheduleState`] 在调用前已保证），
    /// 结果落在 `[min_interval * factor, max_interval * factor]` 之内。
    pub fn shrink_delay(&self, idle: usize, high_water: usize) -> Duration {
        let max = self.max_interval.as_secs_f64();
        let min = self.min_interval.as_secs_f64();
        let high_water = high_water.max(1) as f64;
        let idle = (idle as f64).min(high_water);
        let secs = (max + (min - max) * idle / high_water).clamp(min, max);
        self.scale(secs)
    }

    /// 新状态的首个侵蚀间隔：`max_interval * factor`。
    fn initial_delay(&self) -> Duration {
        self.scale(self.max_interval.as_secs_f64())
    }

    fn scale(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs * self.factor).unwrap_or(Duration::MAX)
    }
}

impl Default for ErosionPolicy {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            max_interval: DEFAULT_MAX_INTERVAL,
            min_interval: DEFAULT_MIN_INTERVAL,
            high_water_seed: DEFAULT_HIGH_WATER_SEED,
        }
    }
}

/// [`ErosionPolicy`] 的构造器。
#[derive(Clone, Debug)]
pub struct ErosionPolicyBuilder {
    policy: ErosionPolicy,
}

impl Default for ErosionPolicyBuilder {
    fn default() -> Self {
        Self {
            policy: ErosionPolicy::default(),
        }
    }
}

impl ErosionPolicyBuilder {
    pub fn factor(mut self, factor: f64) -> Self {
        self.policy.factor = factor;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.policy.max_interval = interval;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.policy.min_interval = interval;
        self
    }

    pub fn high_water_seed(mut self, seed: usize) -> Self {
        self.policy.high_water_seed = seed;
        self
    }

    /// 校验并产出策略。
    ///
    /// # 校验规则
    /// 1. `factor` 为有限正数；
    /// 2. `min_interval > 0` 且 `max_interval >= min_interval`；
    /// 3. `high_water_seed >= 1`。
    pub fn build(self) -> PoolResult<ErosionPolicy> {
        let policy = self.policy;
        if !policy.factor.is_finite() || policy.factor <= 0.0 {
            return Err(PoolError::invalid_argument(format!(
                "erosion factor must be a finite positive number, got {}",
                policy.factor
            )));
        }
        if policy.min_interval.is_zero() {
            return Err(PoolError::invalid_argument(
                "erosion min_interval must be greater than zero",
            ));
        }
        if policy.max_interval < policy.min_interval {
            return Err(PoolError::invalid_argument(
                "erosion max_interval must not be shorter than min_interval",
            ));
        }
        if policy.high_water_seed == 0 {
            return Err(PoolError::invalid_argument(
                "erosion high_water_seed must be at least 1",
            ));
        }
        Ok(policy)
    }
}

/// 单个池（或单个键）的衰减调度状态。
///
/// # 教案式说明
/// - **意图 (Why)**：记录下一次侵蚀时刻与空闲数高水位，是侵蚀节律的全部记忆；
/// - **契约 (What)**：
///   - `idle_high_water_mark >= 1` 且在状态生命周期内单调不减；
///   - `next_erosion` 在构造时初始化，之后只由 [`decide`](Self::decide) 在决策点向前推进；
/// - **风险 (Trade-offs)**：自身不加锁，共享时必须置于互斥锁之后。
#[derive(Clone)]
pub struct DecayScheduleState {
    policy: ErosionPolicy,
    next_erosion: Instant,
    idle_high_water_mark: usize,
}

impl DecayScheduleState {
    /// 以 `now + max_interval * factor` 作为首个决策点创建状态。
    pub fn new(policy: ErosionPolicy, now: Instant) -> Self {
        Self {
            next_erosion: deadline_after(now, policy.initial_delay()),
            idle_high_water_mark: policy.high_water_seed,
            policy,
        }
    }

    pub fn policy(&self) -> &ErosionPolicy {
        &self.policy
    }

    pub fn factor(&self) -> f64 {
        self.policy.factor
    }

    pub fn next_erosion(&self) -> Instant {
        self.next_erosion
    }

    pub fn idle_high_water_mark(&self) -> usize {
        self.idle_high_water_mark
    }

    /// `now` 是否已越过下一次侵蚀时刻。
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_erosion < now
    }

    /// 侵蚀决策：返回 `true` 表示应丢弃（失效）被归还的对象。
    ///
    /// 未到决策点时既不丢弃也不修改状态；到达决策点时仅在 `idle > 0` 时丢弃，
    /// 并依据 `idle` 重新计算下一次侵蚀时刻。
    pub fn decide(&mut self, now: Instant, idle: usize) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.update(now, idle);
        idle > 0
    }

    /// 以 `idle` 刷新高水位并重算下一次侵蚀时刻。
    fn update(&mut self, now: Instant, idle: usize) {
        self.idle_high_water_mark = self.idle_high_water_mark.max(idle);
        let delay = self.policy.shrink_delay(idle, self.idle_high_water_mark);
        self.next_erosion = deadline_after(now, delay);
    }
}

impl fmt::Debug for DecayScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecayScheduleState")
            .field("factor", &self.policy.factor)
            .field("idle_high_water_mark", &self.idle_high_water_mark)
            .finish()
    }
}

/// `now + delay`，溢出时逐次折半直至可表示。
fn deadline_after(now: Instant, mut delay: Duration) -> Instant {
    loop {
        if let Some(deadline) = now.checked_add(delay) {
            return deadline;
        }
        delay /= 2;
    }
}
