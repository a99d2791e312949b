//! 提供者
//!
//! [`Provide`] 是绑定目标使用的类型擦除生产者；[`Provider<T>`] 是交给用户代码的
//! 强类型句柄，持有对绑定图的弱引用，注入器创建完成前不可用。

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, Weak};

use crate::dependency::Dependency;
use crate::errors::ProvisionError;
use crate::graph::BindingGraph;
use crate::instance::Instance;
use crate::key::Key;
use crate::metadata::Arguments;

/// 类型擦除的生产者
pub trait Provide: Send + Sync {
    /// 生产前需要解析的依赖，按顺序出现在 [`Arguments`] 中
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    fn provide(&self, arguments: &Arguments) -> anyhow::Result<Instance>;
}

crate::type_tag!(dyn Provide);

/// 函数式提供者
pub struct FnProvider<F, T> {
    dependencies: Vec<Dependency>,
    provide_fn: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<F, T> FnProvider<F, T>
where
    F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    pub fn new(dependencies: Vec<Dependency>, provide_fn: F) -> Self {
        Self {
            dependencies,
            provide_fn,
            _phantom: PhantomData,
        }
    }
}

impl<F, T> Provide for FnProvider<F, T>
where
    F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    fn dependencies(&self) -> Vec<Dependency> {
        self.dependencies.clone()
    }

    fn provide(&self, arguments: &Arguments) -> anyhow::Result<Instance> {
        (self.provide_fn)(arguments).map(Instance::new)
    }
}

/// 由闭包创建提供者
pub fn provider_fn<F, T>(dependencies: Vec<Dependency>, provide_fn: F) -> Arc<dyn Provide>
where
    F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    Arc::new(FnProvider::new(dependencies, provide_fn))
}

/// 强类型提供者句柄
pub struct Provider<T> {
    key: Key,
    graph: Arc<OnceLock<Weak<BindingGraph>>>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Provider<T> {
    pub(crate) fn new(key: Key, graph: Arc<OnceLock<Weak<BindingGraph>>>) -> Self {
        Self {
            key,
            graph,
            _phantom: PhantomData,
        }
    }

    pub(crate) fn ready(key: Key, graph: Weak<BindingGraph>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(graph);
        Self::new(key, Arc::new(cell))
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// 注入器是否已创建
    pub fn is_ready(&self) -> bool {
        self.graph.get().is_some()
    }
}

impl<T: Any + Clone> Provider<T> {
    pub fn get(&self) -> Result<T, ProvisionError> {
        let graph = self
            .graph
            .get()
            .ok_or_else(|| ProvisionError::ProviderNotReady {
                key: self.key.clone(),
            })?
            .upgrade()
            .ok_or_else(|| ProvisionError::InjectorDropped {
                key: self.key.clone(),
            })?;
        graph.instance::<T>(&self.key)
    }
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            graph: Arc::clone(&self.graph),
            _phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("key", &self.key.to_string())
            .field("ready", &self.is_ready())
            .finish()
    }
}
