//! # spark-pool
//!
//! ## 定位与职责（Why）
//! - 为任意对象池引擎提供与池实现无关的策略层：按时间衰减的侵蚀收缩、同步拦截、
//!   最小空闲维护；
//! - 本 crate 不实现池本身，只通过 [`ObjectPool`] / [`KeyedObjectPool`] 能力面与底层池交互，
//!   因此可以叠加在任何满足契约的池之上。
//!
//! ## 架构嵌入（Where）
//! - `erosion` 承载衰减状态机与三种侵蚀装饰器（整池、键控共享、键控逐键）；
//! - `sync` 提供把非线程安全池/工厂串行化的拦截器；
//! - `scheduler` 与 `maintenance` 组成最小空闲维护通道，与归还路径互不干扰；
//! - `error` 集中定义错误域与“致命/可恢复”分类，所有吞错点共享同一判定；
//! - `config` 负责从 TOML 装载并校验策略参数。
//!
//! ## 组合方式（How）
//! ```
//! use std::sync::Arc;
//! use spark_pool::{ErodingPool, ObjectPool, PoolResult};
//!
//! struct Fixed;
//!
//! impl ObjectPool for Fixed {
//!     type Object = u8;
//!     fn borrow_object(&self) -> PoolResult<u8> { Ok(0) }
//!     fn return_object(&self, _: u8) -> PoolResult<()> { Ok(()) }
//!     fn invalidate_object(&self, _: u8) -> PoolResult<()> { Ok(()) }
//!     fn add_object(&self) -> PoolResult<()> { Ok(()) }
//!     fn num_idle(&self) -> PoolResult<usize> { Ok(0) }
//!     fn num_active(&self) -> PoolResult<usize> { Ok(0) }
//!     fn clear(&self) -> PoolResult<()> { Ok(()) }
//!     fn close(&self) -> PoolResult<()> { Ok(()) }
//! }
//!
//! let pool = Arc::new(ErodingPool::new(Fixed, 0.5)?);
//! let object = pool.borrow_object()?;
//! pool.return_object(object)?;
//! # Ok::<(), spark_pool::PoolError>(())
//! ```
//!
//! ## 风险提示（Trade-offs）
//! - 侵蚀依赖归还流量驱动，长期无归还的池不会收缩；
//! - 同步拦截器不得包装借出时会阻塞的池，详见 [`sync`] 模块文档。

pub mod clock;
pub mod config;
pub mod erosion;
pub mod error;
pub mod factory;
pub mod maintenance;
pub mod pool;
pub mod scheduler;
pub mod sync;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ErosionConfig, MinIdleConfig, PoolPolicyConfig};
pub use erosion::{
    BoxedKeyedPool, DecayScheduleState, ErodingKeyedPool, ErodingPool, ErosionPolicy,
    ErosionPolicyBuilder, PerKeyErosionState, SharedErosionState, StateResolver,
    eroding_keyed_pool,
};
pub use error::{Disposition, ErrorCause, PoolError, PoolResult, classify};
pub use factory::{KeyedPooledObjectFactory, PooledObjectFactory};
pub use maintenance::{
    MinIdleTask, check_min_idle, check_min_idle_keyed, check_min_idle_keys, prefill,
    prefill_keyed, prefill_keys,
};
pub use pool::{KeyedObjectPool, ObjectPool};
pub use scheduler::{MaintenanceScheduler, ScheduledHandle, ThreadScheduler, UnitOfWork};
pub use sync::{
    SynchronizedFactory, SynchronizedKeyedFactory, SynchronizedKeyedPool, SynchronizedPool,
};
