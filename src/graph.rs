//! 绑定图
//!
//! 由处理后的元素构建、构建后只读的 `Key -> Binding` 映射，另有一个并发的
//! 即时绑定缓存保存运行期派生的绑定（常量转换、可构造类型）。

use std::any::{self, Any};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::config::{InjectorConfig, Stage};
use crate::context::InternalContext;
use crate::convert::{self, ConversionFailure};
use crate::dependency::Dependency;
use crate::element::{
    Element, InjectionRequest, InterceptorBinding, ProviderLookup, Source, StaticInjectionRequest,
    TypeConverterBinding,
};
use crate::errors::{CreationError, Errors, MessageKind, ProvisionError};
use crate::factory::{self, ConstantFactory, ConstructorFactory, InternalFactory};
use crate::instance::Instance;
use crate::key::{Key, TypeLiteral};
use crate::logging::OperationTimer;
use crate::metadata::{Metadata, TypeMetadata};
use crate::processor::{self, BuildState};
use crate::scope::{Scope, ScopeMarker};
use crate::stats::StatsCounters;

/// 加载策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    Lazy,
    Eager,
}

/// 绑定种类，用于诊断
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    Instance,
    ProviderInstance,
    ProviderKey(Key),
    LinkedKey(Key),
    Constructor(TypeLiteral),
    Constant(String),
    ConvertedConstant { source_key: Key, value: String },
}

/// 绑定
pub struct Binding {
    key: Key,
    source: Source,
    kind: BindingKind,
    factory: Arc<dyn InternalFactory>,
    scope: Option<Arc<dyn Scope>>,
    load_strategy: LoadStrategy,
}

impl Binding {
    /// 以作用域包装工厂后创建绑定
    pub(crate) fn new(
        key: Key,
        source: Source,
        kind: BindingKind,
        unscoped: Arc<dyn InternalFactory>,
        scope: Option<Arc<dyn Scope>>,
        load_strategy: LoadStrategy,
    ) -> Self {
        let factory = match &scope {
            Some(scope) => scope.scope(&key, unscoped),
            None => unscoped,
        };
        Self {
            key,
            source,
            kind,
            factory,
            scope,
            load_strategy,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn kind(&self) -> &BindingKind {
        &self.kind
    }

    pub fn load_strategy(&self) -> LoadStrategy {
        self.load_strategy
    }

    pub fn scope_name(&self) -> Cow<'static, str> {
        match &self.scope {
            Some(scope) => scope.name(),
            None => Cow::Borrowed("Unscoped"),
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.scope.as_ref().is_some_and(|scope| scope.is_singleton())
    }

    /// 生产该绑定需要的依赖
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.factory.dependencies()
    }

    pub(crate) fn factory(&self) -> &Arc<dyn InternalFactory> {
        &self.factory
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key.to_string())
            .field("source", &self.source.to_string())
            .field("kind", &self.kind)
            .field("scope", &self.scope_name())
            .field("load_strategy", &self.load_strategy)
            .finish()
    }
}

/// 为可构造类型创建未加作用域的构造器工厂
pub(crate) fn constructor_factory(
    type_metadata: &TypeMetadata,
) -> Result<Arc<dyn InternalFactory>, ProvisionError> {
    let constructor = type_metadata.select_constructor()?.clone();
    Ok(Arc::new(ConstructorFactory::new(
        type_metadata.type_literal().clone(),
        constructor,
        type_metadata.members().to_vec(),
    )))
}

/// 即时绑定派生
pub(crate) struct Derivation<'a> {
    pub bindings: &'a HashMap<Key, Arc<Binding>>,
    pub converters: &'a [TypeConverterBinding],
    pub scopes: &'a HashMap<ScopeMarker, Arc<dyn Scope>>,
    pub metadata: &'a Metadata,
    pub config: &'a InjectorConfig,
}

impl Derivation<'_> {
    /// 为未显式绑定的键派生绑定；无法派生时返回 `None`
    pub fn derive(&self, key: &Key) -> Result<Option<Binding>, ProvisionError> {
        if key.qualifier().is_some() {
            return self.converted_constant(key);
        }
        if self.config.require_explicit_bindings {
            return Ok(None);
        }
        match self.metadata.get(key.type_literal()) {
            Some(type_metadata) => self.constructor_binding(key, type_metadata).map(Some),
            None => Ok(None),
        }
    }

    fn converted_constant(&self, key: &Key) -> Result<Option<Binding>, ProvisionError> {
        if key.type_literal().is_string() {
            return Ok(None);
        }
        let source_key = key.of_type(TypeLiteral::of::<String>());
        let Some(constant) = self.bindings.get(&source_key) else {
            return Ok(None);
        };
        let BindingKind::Constant(value) = constant.kind() else {
            return Ok(None);
        };

        let converted = convert::convert_constant(self.converters, value, key.type_literal())
            .map_err(|failure| {
                let reason = failure.reason(key.type_literal());
                match failure {
                    ConversionFailure::Ambiguous(_) | ConversionFailure::NoConverter => {
                        ProvisionError::InvalidBinding {
                            key: key.clone(),
                            kind: MessageKind::ConstantConversionFailure,
                            reason: format!("Error converting '{}': {}", value, reason),
                        }
                    }
                    ConversionFailure::Failed(_) => ProvisionError::ConstantConversion {
                        key: key.clone(),
                        source_key: source_key.clone(),
                        value: value.clone(),
                        reason,
                    },
                }
            })?;
        tracing::debug!(key = %key, value = %value, "converted constant");

        Ok(Some(Binding::new(
            key.clone(),
            constant.source().clone(),
            BindingKind::ConvertedConstant {
                source_key,
                value: value.clone(),
            },
            Arc::new(ConstantFactory::new(converted)),
            None,
            LoadStrategy::Lazy,
        )))
    }

    fn constructor_binding(&self, key: &Key, type_metadata: &TypeMetadata) -> Result<Binding, ProvisionError> {
        let factory = constructor_factory(type_metadata)?;
        let scope = match type_metadata.default_scope() {
            Some(marker) => Some(self.scopes.get(marker).cloned().ok_or_else(|| {
                ProvisionError::InvalidBinding {
                    key: key.clone(),
                    kind: MessageKind::ScopeNotFound,
                    reason: format!("No scope is bound to {}.", marker),
                }
            })?),
            None => None,
        };
        tracing::debug!(key = %key, "just-in-time constructor binding");
        Ok(Binding::new(
            key.clone(),
            Source::Module(Cow::Borrowed("just-in-time")),
            BindingKind::Constructor(key.type_literal().clone()),
            factory,
            scope,
            LoadStrategy::Lazy,
        ))
    }
}

/// 覆盖合并：每个覆盖集合绑定的键（及作用域标记）移除累计基础集合中的同键元素，再追加覆盖元素
pub(crate) fn merge_overrides(base: Vec<Element>, overrides: Vec<Vec<Element>>) -> Vec<Element> {
    overrides.into_iter().fold(base, |accumulated, overriding| {
        let keys: HashSet<Key> = overriding.iter().filter_map(Element::bound_key).collect();
        let markers: HashSet<ScopeMarker> = overriding
            .iter()
            .filter_map(|element| match element {
                Element::BindScope(binding) => Some(binding.marker.clone()),
                _ => None,
            })
            .collect();

        let mut merged: Vec<Element> = accumulated
            .into_iter()
            .filter(|element| match element {
                Element::BindScope(binding) => !markers.contains(&binding.marker),
                other => other.bound_key().map_or(true, |key| !keys.contains(&key)),
            })
            .collect();
        merged.extend(overriding);
        merged
    })
}

/// 绑定图
pub struct BindingGraph {
    me: Weak<BindingGraph>,
    bindings: HashMap<Key, Arc<Binding>>,
    jit_bindings: DashMap<Key, Arc<Binding>>,
    scopes: HashMap<ScopeMarker, Arc<dyn Scope>>,
    converters: Vec<TypeConverterBinding>,
    interceptors: Vec<InterceptorBinding>,
    metadata: Arc<Metadata>,
    config: InjectorConfig,
    counters: StatsCounters,
}

impl BindingGraph {
    /// 合并、处理并冻结元素；随后执行注入请求与预先初始化
    pub(crate) fn build(
        base: Vec<Element>,
        overrides: Vec<Vec<Element>>,
        metadata: Arc<Metadata>,
        config: InjectorConfig,
    ) -> Result<Arc<BindingGraph>, CreationError> {
        let timer = OperationTimer::new("injector.build").with_metadata("stage", &format!("{:?}", config.stage));
        let mut elements = merge_overrides(base, overrides);
        tracing::debug!(elements = elements.len(), "processing elements");

        let mut state = BuildState::new(metadata, config);
        processor::process(&mut state, &mut elements);
        if !state.errors.is_empty() {
            return Err(CreationError::new(state.errors.into_messages()));
        }

        let BuildState {
            bindings,
            jit,
            scopes,
            converters,
            interceptors,
            injection_requests,
            static_injection_requests,
            provider_lookups,
            metadata,
            config,
            ..
        } = state;

        let graph = Arc::new_cyclic(|me| BindingGraph {
            me: me.clone(),
            bindings,
            jit_bindings: jit.into_iter().collect(),
            scopes,
            converters,
            interceptors,
            metadata,
            config,
            counters: StatsCounters::default(),
        });

        let mut errors = Errors::default();
        graph.initialize_provider_lookups(&provider_lookups);
        graph.inject_static_members(&static_injection_requests, &mut errors);
        graph.inject_requested_instances(&injection_requests, &mut errors);
        graph.initialize_eager_singletons(&mut errors);
        if !errors.is_empty() {
            return Err(CreationError::new(errors.into_messages()));
        }

        timer
            .with_metadata("bindings", &graph.bindings.len().to_string())
            .finish();
        Ok(graph)
    }

    fn initialize_provider_lookups(&self, lookups: &[ProviderLookup]) {
        for lookup in lookups {
            if lookup.delegate.set(self.me.clone()).is_err() {
                tracing::warn!(
                    key = %lookup.key,
                    source = %lookup.source,
                    "provider lookup already bound to another injector"
                );
            }
        }
    }

    fn inject_static_members(&self, requests: &[StaticInjectionRequest], errors: &mut Errors) {
        for request in requests {
            for type_literal in &request.types {
                let Some(type_metadata) = self.metadata.get(type_literal) else {
                    tracing::debug!(type_literal = %type_literal, "no static members registered");
                    continue;
                };
                for member in type_metadata.static_members() {
                    let mut context = InternalContext::new(self);
                    let result = context.resolve(member.dependency()).and_then(|value| {
                        member
                            .inject(value)
                            .map_err(|source| ProvisionError::MemberInjectionFailed {
                                type_literal: type_literal.clone(),
                                member: member.name().to_string(),
                                source,
                            })
                    });
                    if let Err(error) = result {
                        errors.provision(&request.source, error);
                    }
                }
            }
        }
    }

    fn inject_requested_instances(&self, requests: &[InjectionRequest], errors: &mut Errors) {
        for request in requests {
            if let Err(error) = self.inject_members(&request.type_literal, &request.instance) {
                errors.provision(&request.source, error);
            }
        }
    }

    fn initialize_eager_singletons(&self, errors: &mut Errors) {
        if !self.config.initializes_eagerly() {
            return;
        }
        let production = self.config.stage == Stage::Production;
        let mut candidates: Vec<Arc<Binding>> = self
            .bindings
            .values()
            .cloned()
            .chain(self.jit_bindings.iter().map(|entry| Arc::clone(entry.value())))
            .filter(|binding| {
                binding.load_strategy() == LoadStrategy::Eager || (production && binding.is_singleton())
            })
            .collect();
        candidates.sort_by_key(|binding| binding.key().to_string());

        for binding in candidates {
            tracing::debug!(key = %binding.key(), "initializing eager singleton");
            let mut context = InternalContext::new(self);
            let dependency = Dependency::required(binding.key().clone());
            if let Err(error) = binding.factory().get(&mut context, &dependency) {
                errors.provision(binding.source(), error);
            }
        }
    }

    fn derivation(&self) -> Derivation<'_> {
        Derivation {
            bindings: &self.bindings,
            converters: &self.converters,
            scopes: &self.scopes,
            metadata: &self.metadata,
            config: &self.config,
        }
    }

    /// 显式绑定，其次即时绑定；都没有时尝试派生并缓存
    pub(crate) fn binding_for(&self, key: &Key) -> Result<Option<Arc<Binding>>, ProvisionError> {
        if let Some(binding) = self.bindings.get(key) {
            return Ok(Some(Arc::clone(binding)));
        }
        if let Some(entry) = self.jit_bindings.get(key) {
            return Ok(Some(Arc::clone(entry.value())));
        }
        let Some(derived) = self.derivation().derive(key)? else {
            return Ok(None);
        };
        let entry = self.jit_bindings.entry(key.clone()).or_insert_with(|| {
            self.counters.jit_binding_created();
            Arc::new(derived)
        });
        Ok(Some(Arc::clone(entry.value())))
    }

    /// 顶层解析
    pub(crate) fn provision(&self, key: &Key) -> Result<Instance, ProvisionError> {
        let mut context = InternalContext::new(self);
        let result = context
            .resolve(&Dependency::required(key.clone()))
            .and_then(|instance| {
                instance.ok_or_else(|| ProvisionError::MissingBinding {
                    key: key.clone(),
                    requested_by: None,
                })
            });
        self.counters.resolution(result.is_ok());
        if let Err(error) = &result {
            tracing::debug!(key = %key, error = %error, "resolution failed");
        }
        result
    }

    pub(crate) fn instance<T: Any + Clone>(&self, key: &Key) -> Result<T, ProvisionError> {
        let instance = self.provision(key)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ProvisionError::TypeMismatch {
                key: key.clone(),
                expected: any::type_name::<T>(),
                actual: instance.type_name(),
            })
    }

    /// 对已存在的实例执行成员注入
    pub(crate) fn inject_members(&self, type_literal: &TypeLiteral, instance: &Instance) -> Result<(), ProvisionError> {
        let Some(type_metadata) = self.metadata.get(type_literal) else {
            return Ok(());
        };
        let mut context = InternalContext::new(self);
        factory::inject_members(&mut context, type_literal, type_metadata.members(), instance)
    }

    pub(crate) fn weak(&self) -> Weak<BindingGraph> {
        self.me.clone()
    }

    pub(crate) fn bindings(&self) -> &HashMap<Key, Arc<Binding>> {
        &self.bindings
    }

    pub(crate) fn existing_binding(&self, key: &Key) -> Option<Arc<Binding>> {
        self.bindings
            .get(key)
            .cloned()
            .or_else(|| self.jit_bindings.get(key).map(|entry| Arc::clone(entry.value())))
    }

    pub(crate) fn interceptors(&self) -> &[InterceptorBinding] {
        &self.interceptors
    }

    pub(crate) fn scopes(&self) -> &HashMap<ScopeMarker, Arc<dyn Scope>> {
        &self.scopes
    }

    pub(crate) fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BindCommand, BindConstantCommand, Target};
    use crate::key::Qualifier;

    fn bind_instance(key_name: &str, value: i32) -> Element {
        let mut command = BindCommand::new(Source::Module(Cow::Owned(key_name.to_string())), TypeLiteral::of::<i32>());
        command.qualifiers.push(Qualifier::named(key_name));
        command.targets.push(Target::Instance(Instance::new(value)));
        Element::Bind(command)
    }

    #[test]
    fn test_merge_overrides_replaces_same_key() {
        let base = vec![bind_instance("a", 1), bind_instance("b", 2)];
        let overrides = vec![vec![bind_instance("b", 20), bind_instance("c", 30)]];

        let merged = merge_overrides(base, overrides);
        let keys: Vec<Key> = merged.iter().filter_map(Element::bound_key).collect();
        assert_eq!(
            keys,
            vec![Key::named::<i32>("a"), Key::named::<i32>("b"), Key::named::<i32>("c")]
        );
    }

    #[test]
    fn test_build_and_convert_constant() {
        let constant = Element::BindConstant(BindConstantCommand {
            source: Source::Unknown,
            qualifiers: vec![Qualifier::named("port")],
            values: vec!["8080".to_string()],
        });
        let graph = BindingGraph::build(
            vec![constant],
            Vec::new(),
            Arc::new(Metadata::new()),
            InjectorConfig::default(),
        )
        .unwrap();

        assert_eq!(graph.instance::<i32>(&Key::named::<i32>("port")).unwrap(), 8080);
        assert_eq!(
            graph.instance::<String>(&Key::named::<String>("port")).unwrap(),
            "8080"
        );
        assert!(matches!(
            graph.existing_binding(&Key::named::<i32>("port")).map(|b| b.kind().clone()),
            Some(BindingKind::ConvertedConstant { .. })
        ));
        assert_eq!(graph.counters().snapshot().jit_bindings, 1);
    }

    #[test]
    fn test_provider_lookup_keeps_first_injector() {
        let delegate = Arc::new(std::sync::OnceLock::new());
        let lookup = Element::ProviderLookup(ProviderLookup {
            source: Source::Unknown,
            key: Key::named::<i32>("a"),
            delegate: Arc::clone(&delegate),
        });
        let build = |value| {
            BindingGraph::build(
                vec![bind_instance("a", value), lookup.clone()],
                Vec::new(),
                Arc::new(Metadata::new()),
                InjectorConfig::default(),
            )
            .unwrap()
        };

        let first = build(1);
        let second = build(2);
        let provider = crate::provider::Provider::<i32>::new(Key::named::<i32>("a"), delegate);
        assert_eq!(provider.get().unwrap(), 1);
        assert_eq!(second.instance::<i32>(&Key::named::<i32>("a")).unwrap(), 2);
        drop(first);
        assert!(matches!(provider.get(), Err(ProvisionError::InjectorDropped { .. })));
    }

    #[test]
    fn test_missing_binding() {
        let graph = BindingGraph::build(Vec::new(), Vec::new(), Arc::new(Metadata::new()), InjectorConfig::default())
            .unwrap();
        assert!(matches!(
            graph.provision(&Key::of::<String>()),
            Err(ProvisionError::MissingBinding { .. })
        ));
        assert_eq!(graph.counters().snapshot().failed_resolutions, 1);
    }
}
