//! 侵蚀收缩：按时间衰减的节律，在归还路径上逐步丢弃多余的空闲对象。
//!
//! # 结构总览
//! - [`decay`]：纯状态机，负责“是否丢弃 + 下次决策点”的计算，不接触任何池；
//! - [`scope`]：键控场景下的状态解析策略（共享节律 / 逐键节律）；
//! - [`pool`]：面向 [`crate::ObjectPool`] 与 [`crate::KeyedObjectPool`] 的装饰器。
//!
//! 因子越小侵蚀越积极，越大越保守；空闲数越接近历史高水位，下一次决策点越近。

mod decay;
mod pool;
mod scope;

pub use decay::{
    DEFAULT_FACTOR, DEFAULT_HIGH_WATER_SEED, DEFAULT_MAX_INTERVAL, DEFAULT_MIN_INTERVAL,
    DecayScheduleState, ErosionPolicy, ErosionPolicyBuilder,
};
pub use pool::{BoxedKeyedPool, ErodingKeyedPool, ErodingPool, eroding_keyed_pool};
pub use scope::{PerKeyErosionState, SharedErosionState, StateResolver};
