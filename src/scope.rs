//! 作用域策略
//!
//! 作用域包装整个生产者：输入一个未加作用域的内部工厂，返回决定实例复用方式的新工厂。

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::context::InternalContext;
use crate::dependency::Dependency;
use crate::errors::ProvisionError;
use crate::factory::InternalFactory;
use crate::instance::Instance;
use crate::key::Key;

/// 作用域标记，通过 `bind_scope` 关联到具体实现
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeMarker(Cow<'static, str>);

impl ScopeMarker {
    pub const SINGLETON: ScopeMarker = ScopeMarker(Cow::Borrowed("Singleton"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// 作用域
pub trait Scope: Send + Sync {
    fn scope(&self, key: &Key, unscoped: Arc<dyn InternalFactory>) -> Arc<dyn InternalFactory>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// 是否为单例语义；`Stage::Production` 会预先初始化这类绑定
    fn is_singleton(&self) -> bool {
        false
    }
}

/// 不加作用域：每次请求都调用生产者
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScope;

impl Scope for NoScope {
    fn scope(&self, _key: &Key, unscoped: Arc<dyn InternalFactory>) -> Arc<dyn InternalFactory> {
        unscoped
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("NO_SCOPE")
    }
}

/// 单例：每个绑定在每个注入器中最多一个实例
///
/// 首个调用者（任意线程）在锁内创建实例，其他线程阻塞后读取缓存。同一线程可以
/// 经由构造循环重入而不会死锁。重入时得到的替身不进入缓存：被代理的实例构造
/// 完成后缓存才写入该真实实例，构造失败则缓存保持为空。
/// 两个单例跨线程互相等待的循环不受支持，会在单例锁上死锁。
#[derive(Debug, Clone, Copy, Default)]
pub struct Singleton;

impl Scope for Singleton {
    fn scope(&self, key: &Key, unscoped: Arc<dyn InternalFactory>) -> Arc<dyn InternalFactory> {
        Arc::new(SingletonFactory::new(key.clone(), unscoped))
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("Singleton")
    }

    fn is_singleton(&self) -> bool {
        true
    }
}

/// 单例工厂
pub struct SingletonFactory {
    key: Key,
    unscoped: Arc<dyn InternalFactory>,
    slot: Arc<ReentrantMutex<RefCell<Option<Instance>>>>,
}

impl SingletonFactory {
    pub fn new(key: Key, unscoped: Arc<dyn InternalFactory>) -> Self {
        Self {
            key,
            unscoped,
            slot: Arc::new(ReentrantMutex::new(RefCell::new(None))),
        }
    }
}

impl InternalFactory for SingletonFactory {
    fn get(
        &self,
        context: &mut InternalContext<'_>,
        dependency: &Dependency,
    ) -> Result<Instance, ProvisionError> {
        let guard = self.slot.lock();
        let cached = guard.borrow().clone();
        if let Some(instance) = cached {
            context.stats().singleton_hit();
            return Ok(instance);
        }

        context.stats().singleton_miss();
        tracing::trace!(key = %self.key, "creating singleton");
        let created = self.unscoped.get(context, dependency)?;

        let slot = Arc::clone(&self.slot);
        let key = self.key.clone();
        let deferred = context.when_ready(
            &created,
            Box::new(move |real: &Instance| {
                let guard = slot.lock();
                guard.borrow_mut().get_or_insert_with(|| real.clone());
                tracing::trace!(key = %key, "singleton filled after circular construction");
            }),
        );
        if deferred {
            return Ok(created);
        }

        let mut cached = guard.borrow_mut();
        Ok(cached.get_or_insert_with(|| created).clone())
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.unscoped.dependencies()
    }
}

pub(crate) fn singleton() -> Arc<dyn Scope> {
    Arc::new(Singleton)
}
