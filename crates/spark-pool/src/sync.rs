//! 同步拦截器：把未做并发保护的池或工厂包装成可跨线程共享的版本。
//!
//! # 模块定位（Why）
//! - 能力 trait 以 `&self` 调用且不要求 `Sync`，基于 `Cell`/`RefCell` 的简单池因此无法直接共享；
//! - 拦截器持有一把私有互斥锁，能力 trait 声明的每个操作都在锁内完整执行，
//!   包装后的类型只要求被包装对象 `Send` 即为 `Sync`。
//!
//! # 契约说明（What）
//! - 只有 trait 声明的操作被串行化；具体类型的其他方法只能通过 `get_mut` / `into_inner`
//!   以独占方式访问，不经过锁；
//! - 拦截器只串行化、不吞错：被包装对象返回的错误原样传播。
//!
//! # 风险提示（Trade-offs）
//! - **活性隐患**：若被包装池的 `borrow_object` 会阻塞等待归还，借出线程持锁阻塞，
//!   归还线程永远拿不到锁，结果是死锁或严重的活性下降。不要用本拦截器包装阻塞池；
//!   若池自身已做内部同步，包装是多余的，也应避免。

use std::fmt;

use parking_lot::Mutex;

use crate::error::PoolResult;
use crate::factory::{KeyedPooledObjectFactory, PooledObjectFactory};
use crate::pool::{KeyedObjectPool, ObjectPool};

macro_rules! synchronized_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<T> {
            inner: Mutex<T>,
        }

        impl<T> $name<T> {
            pub fn new(inner: T) -> Self {
                Self {
                    inner: Mutex::new(inner),
                }
            }

            /// 独占访问被包装对象，无需加锁。
            pub fn get_mut(&mut self) -> &mut T {
                self.inner.get_mut()
            }

            /// 拆出被包装对象。
            pub fn into_inner(self) -> T {
                self.inner.into_inner()
            }
        }

        impl<T: fmt::Debug> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.inner.try_lock() {
                    Some(inner) => f.debug_tuple(stringify!($name)).field(&*inner).finish(),
                    None => f.debug_tuple(stringify!($name)).field(&"<locked>").finish(),
                }
            }
        }
    };
}

synchronized_wrapper! {
    /// 非键控池的同步视图。
    ///
    /// 阻塞型池不得使用，见模块文档的活性隐患说明。
    SynchronizedPool
}

synchronized_wrapper! {
    /// 键控池的同步视图。
    ///
    /// 阻塞型池不得使用，见模块文档的活性隐患说明。
    SynchronizedKeyedPool
}

synchronized_wrapper! {
    /// 非键控工厂的同步视图。
    SynchronizedFactory
}

synchronized_wrapper! {
    /// 键控工厂的同步视图。
    SynchronizedKeyedFactory
}

impl<P: ObjectPool> ObjectPool for SynchronizedPool<P> {
    type Object = P::Object;

    fn borrow_object(&self) -> PoolResult<Self::Object> {
        self.inner.lock().borrow_object()
    }

    fn return_object(&self, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().return_object(object)
    }

    fn invalidate_object(&self, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().invalidate_object(object)
    }

    fn add_object(&self) -> PoolResult<()> {
        self.inner.lock().add_object()
    }

    fn num_idle(&self) -> PoolResult<usize> {
        self.inner.lock().num_idle()
    }

    fn num_active(&self) -> PoolResult<usize> {
        self.inner.lock().num_active()
    }

    fn clear(&self) -> PoolResult<()> {
        self.inner.lock().clear()
    }

    fn close(&self) -> PoolResult<()> {
        self.inner.lock().close()
    }
}

impl<P: KeyedObjectPool> KeyedObjectPool for SynchronizedKeyedPool<P> {
    type Key = P::Key;
    type Object = P::Object;

    fn borrow_object(&self, key: &Self::Key) -> PoolResult<Self::Object> {
        self.inner.lock().borrow_object(key)
    }

    fn return_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().return_object(key, object)
    }

    fn invalidate_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().invalidate_object(key, object)
    }

    fn add_object(&self, key: &Self::Key) -> PoolResult<()> {
        self.inner.lock().add_object(key)
    }

    fn num_idle(&self) -> PoolResult<usize> {
        self.inner.lock().num_idle()
    }

    fn num_idle_for(&self, key: &Self::Key) -> PoolResult<usize> {
        self.inner.lock().num_idle_for(key)
    }

    fn num_active(&self) -> PoolResult<usize> {
        self.inner.lock().num_active()
    }

    fn num_active_for(&self, key: &Self::Key) -> PoolResult<usize> {
        self.inner.lock().num_active_for(key)
    }

    fn clear(&self) -> PoolResult<()> {
        self.inner.lock().clear()
    }

    fn clear_key(&self, key: &Self::Key) -> PoolResult<()> {
        self.inner.lock().clear_key(key)
    }

    fn close(&self) -> PoolResult<()> {
        self.inner.lock().close()
    }
}

impl<F: PooledObjectFactory> PooledObjectFactory for SynchronizedFactory<F> {
    type Object = F::Object;

    fn make_object(&self) -> PoolResult<Self::Object> {
        self.inner.lock().make_object()
    }

    fn destroy_object(&self, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().destroy_object(object)
    }

    fn validate_object(&self, object: &Self::Object) -> bool {
        self.inner.lock().validate_object(object)
    }

    fn activate_object(&self, object: &mut Self::Object) -> PoolResult<()> {
        self.inner.lock().activate_object(object)
    }

    fn passivate_object(&self, object: &mut Self::Object) -> PoolResult<()> {
        self.inner.lock().passivate_object(object)
    }
}

impl<F: KeyedPooledObjectFactory> KeyedPooledObjectFactory for SynchronizedKeyedFactory<F> {
    type Key = F::Key;
    type Object = F::Object;

    fn make_object(&self, key: &Self::Key) -> PoolResult<Self::Object> {
        self.inner.lock().make_object(key)
    }

    fn destroy_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()> {
        self.inner.lock().destroy_object(key, object)
    }

    fn validate_object(&self, key: &Self::Key, object: &Self::Object) -> bool {
        self.inner.lock().validate_object(key, object)
    }

    fn activate_object(&self, key: &Self::Key, object: &mut Self::Object) -> PoolResult<()> {
        self.inner.lock().activate_object(key, object)
    }

    fn passivate_object(&self, key: &Self::Key, object: &mut Self::Object) -> PoolResult<()> {
        self.inner.lock().passivate_object(key, object)
    }
}
