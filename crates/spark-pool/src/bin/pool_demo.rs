//! 策略层演示：在一个简单的内存池上叠加同步拦截、侵蚀收缩与最小空闲维护。
//!
//! # 使用方法
//! ```bash
//! RUST_LOG=spark_pool=debug cargo run --bin pool_demo -- policy.toml
//! ```
//! - `policy.toml`：可选，`PoolPolicyConfig` 格式；缺省时使用内置的短间隔配置，
//!   以便在数秒内观察到侵蚀与补充。
//!
//! # 演示流程
//! 1. 以内置 `RefCell` 池构造，经 [`SynchronizedPool`] 变为可跨线程共享；
//! 2. 外层叠加 [`ErodingPool`]，并为其登记最小空闲维护任务；
//! 3. 模拟一次借出尖峰，随后持续小流量归还，观察空闲数逐步回落到最小空闲附近。

use std::cell::{Cell, RefCell};
use std::env;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spark_pool::{
    ErodingPool, ObjectPool, PoolError, PoolPolicyConfig, PoolResult, SynchronizedPool,
    SystemClock, ThreadScheduler, check_min_idle,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_POLICY: &str = r#"
[erosion]
factor = 1.0
max_interval_ms = 400
min_interval_ms = 50

[min_idle]
min_idle = 2
period_ms = 100
"#;

/// 演示用的缓冲区池：无内部同步，只能经同步拦截器共享。
#[derive(Debug, Default)]
struct BufferPool {
    idle: RefCell<Vec<Vec<u8>>>,
    active: Cell<usize>,
    created: Cell<usize>,
}

impl ObjectPool for BufferPool {
    type Object = Vec<u8>;

    fn borrow_object(&self) -> PoolResult<Vec<u8>> {
        let object = match self.idle.borrow_mut().pop() {
            Some(object) => object,
            None => {
                self.created.set(self.created.get() + 1);
                Vec::with_capacity(4096)
            }
        };
        self.active.set(self.active.get() + 1);
        Ok(object)
    }

    fn return_object(&self, mut object: Vec<u8>) -> PoolResult<()> {
        object.clear();
        self.active.set(self.active.get().saturating_sub(1));
        self.idle.borrow_mut().push(object);
        Ok(())
    }

    fn invalidate_object(&self, _object: Vec<u8>) -> PoolResult<()> {
        self.active.set(self.active.get().saturating_sub(1));
        Ok(())
    }

    fn add_object(&self) -> PoolResult<()> {
        self.created.set(self.created.get() + 1);
        self.idle.borrow_mut().push(Vec::with_capacity(4096));
        Ok(())
    }

    fn num_idle(&self) -> PoolResult<usize> {
        Ok(self.idle.borrow().len())
    }

    fn num_active(&self) -> PoolResult<usize> {
        Ok(self.active.get())
    }

    fn clear(&self) -> PoolResult<()> {
        self.idle.borrow_mut().clear();
        Ok(())
    }

    fn close(&self) -> PoolResult<()> {
        self.clear()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run() {
        eprintln!("pool_demo 运行失败: {error}");
        std::process::exit(1);
    }
}

fn load_policy() -> PoolResult<PoolPolicyConfig> {
    match env::args().nth(1) {
        Some(path) => {
            let source = fs::read_to_string(&path)
                .map_err(|error| PoolError::operation("read_policy_file", error))?;
            PoolPolicyConfig::from_toml_str(&source)
        }
        None => PoolPolicyConfig::from_toml_str(DEFAULT_POLICY),
    }
}

fn run() -> PoolResult<()> {
    let policy = load_policy()?;
    let pool = Arc::new(ErodingPool::with_policy(
        SynchronizedPool::new(BufferPool::default()),
        policy.erosion.to_policy()?,
        Arc::new(SystemClock),
    ));

    let scheduler = ThreadScheduler::new();
    scheduler.start()?;
    let task = match &policy.min_idle {
        Some(min_idle) => Some(check_min_idle(
            &scheduler,
            Arc::clone(&pool),
            min_idle.min_idle,
            min_idle.period()?,
        )?),
        None => None,
    };

    let burst: Vec<_> = (0..16)
        .map(|_| pool.borrow_object())
        .collect::<PoolResult<_>>()?;
    for object in burst {
        pool.return_object(object)?;
    }
    tracing::info!(idle = pool.num_idle()?, "burst returned");

    for round in 0..20 {
        let object = pool.borrow_object()?;
        thread::sleep(Duration::from_millis(60));
        pool.return_object(object)?;
        tracing::info!(
            round,
            idle = pool.num_idle()?,
            active = pool.num_active()?,
            "steady traffic"
        );
    }

    if let Some(task) = &task {
        tracing::info!(?task, "stopping min-idle maintenance");
        task.cancel();
    }
    scheduler.shutdown()?;
    pool.close()
}
