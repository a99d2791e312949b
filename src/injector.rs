//! 注入器
//!
//! 对外入口：由 [`InjectorBuilder`] 记录模块、合并覆盖、构建冻结的绑定图，
//! 随后可以在任意线程并发解析实例。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{InjectorConfig, Stage};
use crate::element::InterceptorBinding;
use crate::errors::{CreationError, ProvisionError};
use crate::graph::{Binding, BindingGraph};
use crate::instance::Instance;
use crate::key::{Key, TypeLiteral, TypeTag};
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::provider::Provider;
use crate::recorder::{module_fn, Module, Recorder};
use crate::scope::ScopeMarker;
use crate::stats::InjectorStats;

/// 注入器，克隆代价很低，共享同一个绑定图
#[derive(Clone)]
pub struct Injector {
    graph: Arc<BindingGraph>,
}

impl Injector {
    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::new()
    }

    /// 使用默认配置由模块创建注入器
    pub fn create(
        metadata: Metadata,
        modules: Vec<Arc<dyn Module>>,
    ) -> Result<Injector, CreationError> {
        Self::builder().metadata(metadata).modules(modules).build()
    }

    /// 以属性表创建注入器：每个属性绑定为具名常量，`overriding` 中的绑定覆盖同键属性
    pub fn with_environment(
        metadata: Metadata,
        environment: HashMap<String, String>,
        overriding: Vec<Arc<dyn Module>>,
    ) -> Result<Injector, CreationError> {
        Self::builder()
            .metadata(metadata)
            .environment(environment)
            .overriding(overriding)
            .build()
    }

    /// 按键解析实例，`T` 为实例句柄类型（如 `Arc<dyn Service>`、`i32`）
    pub fn get_instance<T: Any + Clone>(&self, key: &Key) -> Result<T, ProvisionError> {
        self.graph.instance::<T>(key)
    }

    /// 以 `Key::of::<T>()` 解析
    pub fn instance_of<T: TypeTag + Any + Clone>(&self) -> Result<T, ProvisionError> {
        self.get_instance(&Key::of::<T>())
    }

    /// 类型擦除的解析结果
    pub fn get_raw(&self, key: &Key) -> Result<Instance, ProvisionError> {
        self.graph.provision(key)
    }

    pub fn get_provider<T>(&self, key: Key) -> Provider<T> {
        Provider::ready(key, self.graph.weak())
    }

    /// 显式或即时绑定；可派生的键会被派生并缓存
    pub fn get_binding(&self, key: &Key) -> Result<Option<Arc<Binding>>, ProvisionError> {
        self.graph.binding_for(key)
    }

    /// 已存在的绑定，不触发派生
    pub fn existing_binding(&self, key: &Key) -> Option<Arc<Binding>> {
        self.graph.existing_binding(key)
    }

    /// 显式绑定
    pub fn bindings(&self) -> &HashMap<Key, Arc<Binding>> {
        self.graph.bindings()
    }

    /// 对已有实例执行成员注入
    pub fn inject_members(
        &self,
        type_literal: &TypeLiteral,
        instance: &Instance,
    ) -> Result<(), ProvisionError> {
        self.graph.inject_members(type_literal, instance)
    }

    /// 类型字面量匹配的显式绑定，按键排序
    pub fn bindings_of(&self, matcher: &dyn Matcher<TypeLiteral>) -> Vec<Arc<Binding>> {
        let mut matched: Vec<_> = self
            .bindings()
            .values()
            .filter(|binding| matcher.matches(binding.key().type_literal()))
            .cloned()
            .collect();
        matched.sort_by_key(|binding| binding.key().to_string());
        matched
    }

    pub fn has_binding(&self, matcher: &dyn Matcher<TypeLiteral>) -> bool {
        self.bindings()
            .values()
            .any(|binding| matcher.matches(binding.key().type_literal()))
    }

    /// 键是否有显式绑定
    pub fn has_binding_for(&self, key: &Key) -> bool {
        self.bindings().contains_key(key)
    }

    /// 解析每个匹配的显式绑定，顺序同 [`Injector::bindings_of`]；任一失败即返回错误
    pub fn instances_of(
        &self,
        matcher: &dyn Matcher<TypeLiteral>,
    ) -> Result<Vec<Instance>, ProvisionError> {
        self.bindings_of(matcher)
            .iter()
            .map(|binding| self.graph.provision(binding.key()))
            .collect()
    }

    /// 匹配绑定的提供者，顺序同 [`Injector::bindings_of`]
    pub fn providers_of<T>(&self, matcher: &dyn Matcher<TypeLiteral>) -> Vec<Provider<T>> {
        self.bindings_of(matcher)
            .iter()
            .map(|binding| self.get_provider(binding.key().clone()))
            .collect()
    }

    pub fn interceptor_bindings(&self) -> &[InterceptorBinding] {
        self.graph.interceptors()
    }

    pub fn scope_markers(&self) -> Vec<ScopeMarker> {
        let mut markers: Vec<_> = self.graph.scopes().keys().cloned().collect();
        markers.sort_by(|a, b| a.name().cmp(b.name()));
        markers
    }

    pub fn metadata(&self) -> &Metadata {
        self.graph.metadata()
    }

    pub fn config(&self) -> &InjectorConfig {
        self.graph.config()
    }

    pub fn stats(&self) -> InjectorStats {
        self.graph.counters().snapshot()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("stage", &self.config().stage)
            .field("bindings", &self.bindings().len())
            .finish()
    }
}

/// 注入器构建器
pub struct InjectorBuilder {
    environment: Option<HashMap<String, String>>,
    modules: Vec<Arc<dyn Module>>,
    overrides: Vec<Vec<Arc<dyn Module>>>,
    metadata: Metadata,
    config: InjectorConfig,
}

impl InjectorBuilder {
    pub fn new() -> Self {
        Self {
            environment: None,
            modules: Vec::new(),
            overrides: Vec::new(),
            metadata: Metadata::new(),
            config: InjectorConfig::default(),
        }
    }

    pub fn module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = Arc<dyn Module>>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// 追加一组覆盖模块；多组覆盖按添加顺序依次合并
    pub fn overriding(mut self, modules: impl IntoIterator<Item = Arc<dyn Module>>) -> Self {
        self.overrides.push(modules.into_iter().collect());
        self
    }

    /// 属性表先于其他模块记录为具名常量绑定
    pub fn environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn config(mut self, config: InjectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.config.stage = stage;
        self
    }

    pub fn build(self) -> Result<Injector, CreationError> {
        let recorder = Recorder::new(self.config.stage);
        let mut modules = self.modules;
        if let Some(environment) = self.environment {
            tracing::debug!(properties = environment.len(), "binding environment properties");
            let properties = module_fn("environment", move |binder| {
                binder.bind_properties(&environment);
                Ok(())
            });
            modules.insert(0, properties);
        }
        let base = recorder.record(&modules);
        let overrides = self
            .overrides
            .iter()
            .map(|modules| recorder.record(modules))
            .collect();

        let graph = BindingGraph::build(base, overrides, Arc::new(self.metadata), self.config)?;
        tracing::info!(
            bindings = graph.bindings().len(),
            stage = ?graph.config().stage,
            "injector created"
        );
        Ok(Injector { graph })
    }
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let injector = Injector::builder().build().unwrap();
        assert!(injector.bindings().is_empty());
        assert_eq!(injector.config().stage, Stage::Development);
        assert_eq!(injector.scope_markers(), vec![ScopeMarker::SINGLETON]);
    }

    #[test]
    fn test_instance_binding_resolves() {
        let injector = Injector::builder()
            .module(module_fn("values", |binder| {
                binder.bind(Key::named::<i32>("answer")).to_instance(42);
                Ok(())
            }))
            .build()
            .unwrap();

        let value: i32 = injector.get_instance(&Key::named::<i32>("answer")).unwrap();
        assert_eq!(value, 42);
        let provider = injector.get_provider::<i32>(Key::named::<i32>("answer"));
        assert_eq!(provider.get().unwrap(), 42);
        assert_eq!(injector.stats().total_resolutions, 2);
    }

    #[test]
    fn test_type_mismatch_reported() {
        let injector = Injector::builder()
            .module(module_fn("values", |binder| {
                binder.bind_type::<i32>().to_instance(7);
                Ok(())
            }))
            .build()
            .unwrap();

        let error = injector.get_instance::<String>(&Key::of::<i32>()).unwrap_err();
        assert!(matches!(error, ProvisionError::TypeMismatch { .. }));
    }
}
