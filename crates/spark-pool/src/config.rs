//! 池化策略配置。
//!
//! # 背景说明（Why）
//! - 侵蚀因子、共享/逐键模式、最小空闲目标与维护周期需要由宿主配置下发，
//!   此处统一承载其反序列化形态与校验；
//! - 反序列化结构只描述“原始值”，经 `to_policy` / `period` 校验后才进入运行期类型，
//!   非法配置在装配阶段即失败，不会延迟到首次使用。
//!
//! # 集成方式（How）
//! ```toml
//! [erosion]
//! factor = 0.5
//! per_key = true
//!
//! [min_idle]
//! min_idle = 4
//! period_ms = 30000
//! ```
//! 使用 [`PoolPolicyConfig::from_toml_str`] 解析；缺省字段取默认值。

use std::time::Duration;

use serde::Deserialize;

use crate::erosion::{
    DEFAULT_FACTOR, DEFAULT_HIGH_WATER_SEED, DEFAULT_MAX_INTERVAL, DEFAULT_MIN_INTERVAL,
    ErosionPolicy,
};
use crate::error::{PoolError, PoolResult};

/// 侵蚀配置的原始形态。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ErosionConfig {
    /// 衰减因子，默认 1.0。
    pub factor: f64,
    /// 键控池是否逐键独立侵蚀，默认 `false`。
    pub per_key: bool,
    /// 空闲数为零时的侵蚀间隔（毫秒）。
    pub max_interval_ms: u64,
    /// 空闲数触及高水位时的侵蚀间隔（毫秒）。
    pub min_interval_ms: u64,
    /// 高水位初始值。
    pub high_water_seed: usize,
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            per_key: false,
            max_interval_ms: DEFAULT_MAX_INTERVAL.as_millis() as u64,
            min_interval_ms: DEFAULT_MIN_INTERVAL.as_millis() as u64,
            high_water_seed: DEFAULT_HIGH_WATER_SEED,
        }
    }
}

impl ErosionConfig {
    /// 校验并转换为运行期策略。
    pub fn to_policy(&self) -> PoolResult<ErosionPolicy> {
        ErosionPolicy::builder()
            .factor(self.factor)
            .max_interval(Duration::from_millis(self.max_interval_ms))
            .min_interval(Duration::from_millis(self.min_interval_ms))
            .high_water_seed(self.high_water_seed)
            .build()
    }
}

/// 最小空闲维护配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MinIdleConfig {
    /// 目标最小空闲数。
    pub min_idle: usize,
    /// 检查周期（毫秒），必须大于 0。
    pub period_ms: u64,
}

impl MinIdleConfig {
    /// 校验后的检查周期。
    pub fn period(&self) -> PoolResult<Duration> {
        if self.period_ms == 0 {
            return Err(PoolError::invalid_argument(
                "min_idle period_ms must be greater than zero",
            ));
        }
        Ok(Duration::from_millis(self.period_ms))
    }
}

/// 一个池的完整策略配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolPolicyConfig {
    pub erosion: ErosionConfig,
    pub min_idle: Option<MinIdleConfig>,
}

impl PoolPolicyConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(source: &str) -> PoolResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|err| PoolError::invalid_argument(format!("invalid pool policy: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验全部字段，不产生运行期对象。
    pub fn validate(&self) -> PoolResult<()> {
        self.erosion.to_policy()?;
        if let Some(min_idle) = &self.min_idle {
            min_idle.period()?;
        }
        Ok(())
    }
}
