//! 池能力契约：本 crate 只通过这两组 trait 与底层池引擎交互。
//!
//! # 教案式说明
//! - **意图 (Why)**：借出/归还/失效的具体语义、阻塞策略与对象构造都属于底层池引擎，
//!   装饰器与维护任务只需要一个小而稳定的能力面；
//! - **契约 (What)**：
//!   - 所有方法以 `&self` 调用，池需自行管理内部可变性；
//!   - trait 本身不要求 `Sync`：基于 `Cell`/`RefCell` 的池同样合法，只是在被
//!     [`SynchronizedPool`](crate::sync::SynchronizedPool) 包装之前不能跨线程共享；
//!   - 计数以 `usize` 表达，无法统计时返回 [`PoolError::Unsupported`](crate::PoolError::Unsupported)。
//! - **设计权衡 (Trade-offs)**：以关联类型而非泛型参数描述对象类型，
//!   使一个池类型只对应一种对象，装饰器签名更短。

use std::sync::Arc;

use crate::error::PoolResult;

/// 非键控对象池能力。
pub trait ObjectPool {
    /// 池中管理的对象类型。
    type Object;

    /// 借出一个对象；是否阻塞由实现决定。
    fn borrow_object(&self) -> PoolResult<Self::Object>;

    /// 归还先前借出的对象。
    fn return_object(&self, object: Self::Object) -> PoolResult<()>;

    /// 让先前借出的对象失效，实现应销毁它而不是放回空闲容量。
    fn invalidate_object(&self, object: Self::Object) -> PoolResult<()>;

    /// 新建一个对象并放入空闲容量。
    fn add_object(&self) -> PoolResult<()>;

    /// 当前空闲对象数。
    fn num_idle(&self) -> PoolResult<usize>;

    /// 当前借出中的对象数。
    fn num_active(&self) -> PoolResult<usize>;

    /// 清空空闲对象。
    fn clear(&self) -> PoolResult<()>;

    /// 关闭池并释放资源。
    fn close(&self) -> PoolResult<()>;
}

/// 键控对象池能力：每个键拥有独立的子池，计数与清理同时提供全局与按键两种口径。
pub trait KeyedObjectPool {
    /// 子池键类型。
    type Key;
    /// 池中管理的对象类型。
    type Object;

    fn borrow_object(&self, key: &Self::Key) -> PoolResult<Self::Object>;

    fn return_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()>;

    fn invalidate_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()>;

    fn add_object(&self, key: &Self::Key) -> PoolResult<()>;

    /// 全部键的空闲对象总数。
    fn num_idle(&self) -> PoolResult<usize>;

    /// 指定键的空闲对象数。
    fn num_idle_for(&self, key: &Self::Key) -> PoolResult<usize>;

    /// 全部键的借出对象总数。
    fn num_active(&self) -> PoolResult<usize>;

    /// 指定键的借出对象数。
    fn num_active_for(&self, key: &Self::Key) -> PoolResult<usize>;

    /// 清空全部键的空闲对象。
    fn clear(&self) -> PoolResult<()>;

    /// 清空指定键的空闲对象。
    fn clear_key(&self, key: &Self::Key) -> PoolResult<()>;

    fn close(&self) -> PoolResult<()>;
}

macro_rules! forward_object_pool {
    ($($wrapper:ident),+) => {$(
        impl<P: ObjectPool + ?Sized> ObjectPool for $wrapper<P> {
            type Object = P::Object;

            fn borrow_object(&self) -> PoolResult<Self::Object> {
                (**self).borrow_object()
            }

            fn return_object(&self, object: Self::Object) -> PoolResult<()> {
                (**self).return_object(object)
            }

            fn invalidate_object(&self, object: Self::Object) -> PoolResult<()> {
                (**self).invalidate_object(object)
            }

            fn add_object(&self) -> PoolResult<()> {
                (**self).add_object()
            }

            fn num_idle(&self) -> PoolResult<usize> {
                (**self).num_idle()
            }

            fn num_active(&self) -> PoolResult<usize> {
                (**self).num_active()
            }

            fn clear(&self) -> PoolResult<()> {
                (**self).clear()
            }

            fn close(&self) -> PoolResult<()> {
                (**self).close()
            }
        }
    )+};
}

macro_rules! forward_keyed_pool {
    ($($wrapper:ident),+) => {$(
        impl<P: KeyedObjectPool + ?Sized> KeyedObjectPool for $wrapper<P> {
            type Key = P::Key;
            type Object = P::Object;

            fn borrow_object(&self, key: &Self::Key) -> PoolResult<Self::Object> {
                (**self).borrow_object(key)
            }

            fn return_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
                (**self).return_object(key, object)
            }

            fn invalidate_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
                (**self).invalidate_object(key, object)
            }

            fn add_object(&self, key: &Self::Key) -> PoolResult<()> {
                (**self).add_object(key)
            }

            fn num_idle(&self) -> PoolResult<usize> {
                (**self).num_idle()
            }

            fn num_idle_for(&self, key: &Self::Key) -> PoolResult<usize> {
                (**self).num_idle_for(key)
            }

            fn num_active(&self) -> PoolResult<usize> {
                (**self).num_active()
            }

            fn num_active_for(&self, key: &Self::Key) -> PoolResult<usize> {
                (**self).num_active_for(key)
            }

            fn clear(&self) -> PoolResult<()> {
                (**self).clear()
            }

            fn clear_key(&self, key: &Self::Key) -> PoolResult<()> {
                (**self).clear_key(key)
            }

            fn close(&self) -> PoolResult<()> {
                (**self).close()
            }
        }
    )+};
}

forward_object_pool!(Arc, Box);
forward_keyed_pool!(Arc, Box);
