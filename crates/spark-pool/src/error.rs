//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为池装饰器、同步拦截器与最小空闲维护任务提供统一的错误语义；
//! - 将“配置错误”“池操作错误”“致命错误”三类分开，供各吞错点做一致判断。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - 吞错点（装饰器的归还/失效/关闭、维护任务）必须先调用 [`classify`]，
//!   只有 [`Disposition::Recoverable`] 才允许被丢弃；
//! - panic 不在本 crate 的捕获范围内，始终沿调用栈传播。

use std::borrow::Cow;
use std::error::Error as StdError;

use thiserror::Error;

/// 底层原因的装箱类型，保持 `Send + Sync` 以便跨线程传递。
pub type ErrorCause = Box<dyn StdError + Send + Sync + 'static>;

/// crate 内统一的返回值别名。
pub type PoolResult<T> = Result<T, PoolError>;

/// 池化策略层的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：底层池实现各自有错误类型，装饰器只需区分“能否吞掉”；
///   因此以少量稳定变体承载语义，细节通过 `source` 保留。
/// - **契约 (What)**：
///   - `InvalidArgument` 只会在构造/调度阶段同步返回，属于编程错误，不应重试；
///   - `Operation` 包装底层池的运行期失败；
///   - `Fatal` 表示执行环境已不可信，任何吞错点都必须继续向外传播。
/// - **设计权衡 (Trade-offs)**：`Cow<'static, str>` 让常量消息零分配，动态消息按需分配。
#[derive(Debug, Error)]
pub enum PoolError {
    /// 构造或调度参数非法。
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// 池中暂无可借出的对象，且实现选择不阻塞。
    #[error("pool exhausted: no object available")]
    Exhausted,

    /// 池已关闭。
    #[error("pool is closed")]
    Closed,

    /// 池实现不支持该操作（例如无法统计空闲数）。
    #[error("operation `{0}` is not supported by this pool")]
    Unsupported(&'static str),

    /// 调度器已经停止，无法再登记任务。
    #[error("maintenance scheduler has been shut down")]
    SchedulerShutdown,

    /// 底层池或工厂在执行 `operation` 时失败。
    #[error("pool operation `{operation}` failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: ErrorCause,
    },

    /// 执行环境受损，必须传播到调用方。
    #[error("fatal pool condition: {0}")]
    Fatal(Cow<'static, str>),
}

impl PoolError {
    /// 构造参数错误。
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        PoolError::InvalidArgument(message.into())
    }

    /// 以底层原因包装一次操作失败。
    pub fn operation(operation: &'static str, source: impl Into<ErrorCause>) -> Self {
        PoolError::Operation {
            operation,
            source: source.into(),
        }
    }

    /// 构造致命错误。
    pub fn fatal(message: impl Into<Cow<'static, str>>) -> Self {
        PoolError::Fatal(message.into())
    }

    /// 是否为致命错误，等价于 `classify(self) == Disposition::Fatal`。
    pub fn is_fatal(&self) -> bool {
        classify(self) == Disposition::Fatal
    }
}

/// 吞错点对错误的处置结论。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// 可以在当前吞错点丢弃。
    Recoverable,
    /// 必须继续传播。
    Fatal,
}

/// 错误分类函数，所有吞错点共享同一判定。
///
/// # 教案式说明
/// - **意图 (Why)**：装饰器承诺 `return_object` 不失败、维护任务出错即静默停用，
///   但环境级故障不能被这些承诺吞没；集中判定避免各处各写一套例外。
/// - **契约 (What)**：仅 [`PoolError::Fatal`] 返回 [`Disposition::Fatal`]，其余一律可恢复。
pub fn classify(error: &PoolError) -> Disposition {
    match error {
        PoolError::Fatal(_) => Disposition::Fatal,
        PoolError::InvalidArgument(_)
        | PoolError::Exhausted
        | PoolError::Closed
        | PoolError::Unsupported(_)
        | PoolError::SchedulerShutdown
        | PoolError::Operation { .. } => Disposition::Recoverable,
    }
}

/// 在吞错点处理一次操作结果：可恢复错误被丢弃，致命错误原样返回。
///
/// `context` 仅用于日志定位。
pub(crate) fn swallow_recoverable(context: &'static str, result: PoolResult<()>) -> PoolResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(error) => match classify(&error) {
            Disposition::Recoverable => {
                tracing::debug!(context, %error, "swallowed recoverable pool error");
                Ok(())
            }
            Disposition::Fatal => {
                tracing::error!(context, %error, "fatal pool error propagated");
                Err(error)
            }
        },
    }
}
