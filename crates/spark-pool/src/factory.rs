//! 池化对象工厂契约。
//!
//! 底层池引擎通过工厂创建、校验与销毁对象；本 crate 只定义契约并提供同步包装
//! （见 [`SynchronizedFactory`](crate::sync::SynchronizedFactory)），不实现具体工厂。

use crate::error::PoolResult;

/// 非键控对象工厂。
///
/// # 契约说明（What）
/// - `make_object`：创建一个可被池管理的新对象；
/// - `destroy_object`：对象离开池时调用，负责释放底层资源；
/// - `validate_object`：借出前或空闲检测时校验对象是否仍可用；
/// - `activate_object` / `passivate_object`：借出前激活、归还后钝化。
pub trait PooledObjectFactory {
    type Object;

    fn make_object(&self) -> PoolResult<Self::Object>;

    fn destroy_object(&self, object: Self::Object) -> PoolResult<()>;

    fn validate_object(&self, object: &Self::Object) -> bool;

    fn activate_object(&self, object: &mut Self::Object) -> PoolResult<()>;

    fn passivate_object(&self, object: &mut Self::Object) -> PoolResult<()>;
}

/// 键控对象工厂，每个操作额外携带子池键。
pub trait KeyedPooledObjectFactory {
    type Key;
    type Object;

    fn make_object(&self, key: &Self::Key) -> PoolResult<Self::Object>;

    fn destroy_object(&self, key: &Self::Key, object: Self::Object) -> PoolResult<()>;

    fn validate_object(&self, key: &Self::Key, object: &Self::Object) -> bool;

    fn activate_object(&self, key: &Self::Key, object: &mut Self::Object) -> PoolResult<()>;

    fn passivate_object(&self, key: &Self::Key, object: &mut Self::Object) -> PoolResult<()>;
}
