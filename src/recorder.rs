//! 配置记录
//!
//! 模块通过 [`Binder`] 描述绑定，每一次调用都被追加为一个 [`Element`]，
//! 记录阶段不做任何校验，重复设置等问题留给处理流水线报告。

use std::any::{self, Any};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ptr;
use std::sync::{Arc, OnceLock};

use crate::config::Stage;
use crate::convert::TypeConverter;
use crate::dependency::Dependency;
use crate::element::{
    BindCommand, BindConstantCommand, Element, InjectionRequest, InterceptorBinding, Message,
    ProviderLookup, ProviderTarget, ScopeBinding, Scoping, Source, StaticInjectionRequest, Target,
    TypeConverterBinding,
};
use crate::errors::MessageKind;
use crate::graph;
use crate::instance::Instance;
use crate::key::{Key, Qualifier, TypeLiteral, TypeTag};
use crate::matcher::Matcher;
use crate::metadata::Arguments;
use crate::provider::{self, Provide, Provider};
use crate::scope::{Scope, ScopeMarker};

/// 配置模块
pub trait Module: Send + Sync {
    /// 模块名称，用作其错误消息的来源
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(any::type_name::<Self>())
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()>;
}

/// 函数式模块
pub struct FnModule<F> {
    name: Cow<'static, str>,
    configure_fn: F,
}

impl<F> Module for FnModule<F>
where
    F: Fn(&mut Binder) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        (self.configure_fn)(binder)
    }
}

/// 由闭包创建模块
pub fn module_fn<F>(name: impl Into<Cow<'static, str>>, configure_fn: F) -> Arc<dyn Module>
where
    F: Fn(&mut Binder) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnModule {
        name: name.into(),
        configure_fn,
    })
}

/// 记录配置调用的收集器
pub struct Binder {
    elements: Vec<Element>,
    // 持有已安装模块，保证其地址在本次记录期间不被复用
    installed: Vec<Arc<dyn Module>>,
    stage: Stage,
}

impl Binder {
    pub(crate) fn new(stage: Stage) -> Self {
        Self {
            elements: Vec::new(),
            installed: Vec::new(),
            stage,
        }
    }

    fn push(&mut self, element: Element) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// 为键开始一个绑定；键上的限定符作为第一个记录的限定符
    #[track_caller]
    pub fn bind(&mut self, key: Key) -> BindingBuilder<'_> {
        let mut command = BindCommand::new(Source::caller(), key.type_literal().clone());
        if let Some(qualifier) = key.qualifier() {
            command.qualifiers.push(qualifier.clone());
        }
        let index = self.push(Element::Bind(command));
        BindingBuilder {
            elements: &mut self.elements,
            index,
        }
    }

    #[track_caller]
    pub fn bind_type<T: TypeTag + ?Sized>(&mut self) -> BindingBuilder<'_> {
        self.bind(Key::of::<T>())
    }

    #[track_caller]
    pub fn bind_constant(&mut self) -> ConstantBindingBuilder<'_> {
        let index = self.push(Element::BindConstant(BindConstantCommand {
            source: Source::caller(),
            qualifiers: Vec::new(),
            values: Vec::new(),
        }));
        ConstantBindingBuilder {
            elements: &mut self.elements,
            index,
        }
    }

    /// 每个属性记录一条以属性名限定的常量绑定，按属性名排序
    #[track_caller]
    pub fn bind_properties(&mut self, properties: &HashMap<String, String>) {
        let mut names: Vec<&String> = properties.keys().collect();
        names.sort();
        for name in names {
            self.bind_constant()
                .named(name.as_str())
                .to(properties[name].as_str());
        }
    }

    #[track_caller]
    pub fn bind_scope(&mut self, marker: ScopeMarker, scope: Arc<dyn Scope>) {
        self.push(Element::BindScope(ScopeBinding {
            source: Source::caller(),
            marker,
            scope,
        }));
    }

    #[track_caller]
    pub fn bind_interceptor<C, M>(
        &mut self,
        class_matcher: C,
        member_matcher: M,
        interceptors: Vec<Arc<dyn Any + Send + Sync>>,
    ) where
        C: Matcher<TypeLiteral> + 'static,
        M: Matcher<str> + 'static,
    {
        self.push(Element::BindInterceptor(InterceptorBinding {
            source: Source::caller(),
            class_matcher: Arc::new(class_matcher),
            member_matcher: Arc::new(member_matcher),
            interceptors,
        }));
    }

    /// 请求在注入器创建后对已有实例执行成员注入
    #[track_caller]
    pub fn request_injection(&mut self, type_literal: TypeLiteral, instance: Instance) {
        self.push(Element::RequestInjection(InjectionRequest {
            source: Source::caller(),
            type_literal,
            instance,
        }));
    }

    #[track_caller]
    pub fn request_static_injection(&mut self, types: Vec<TypeLiteral>) {
        self.push(Element::RequestStaticInjection(StaticInjectionRequest {
            source: Source::caller(),
            types,
        }));
    }

    #[track_caller]
    pub fn convert_to_types<M, C>(&mut self, type_matcher: M, converter: C)
    where
        M: Matcher<TypeLiteral> + 'static,
        C: TypeConverter + 'static,
    {
        self.push(Element::ConvertToType(TypeConverterBinding {
            source: Source::caller(),
            type_matcher: Arc::new(type_matcher),
            converter: Arc::new(converter),
        }));
    }

    #[track_caller]
    pub fn add_error(&mut self, text: impl Into<String>) {
        self.push(Element::AddMessage(Message::new(
            MessageKind::Custom,
            Source::caller(),
            text,
        )));
    }

    #[track_caller]
    pub fn add_error_cause(&mut self, cause: anyhow::Error) {
        let text = format!("An exception was caught and reported. Message: {}", cause);
        self.push(Element::AddMessage(
            Message::new(MessageKind::Custom, Source::caller(), text).with_cause(cause),
        ));
    }

    /// 在配置期间获取提供者；注入器创建完成后才能调用 `get`
    #[track_caller]
    pub fn get_provider<T>(&mut self, key: Key) -> Provider<T> {
        let delegate = Arc::new(OnceLock::new());
        self.push(Element::ProviderLookup(ProviderLookup {
            source: Source::caller(),
            key: key.clone(),
            delegate: Arc::clone(&delegate),
        }));
        Provider::new(key, delegate)
    }

    /// 安装模块；同一模块实例在一次记录中只配置一次
    pub fn install(&mut self, module: Arc<dyn Module>) {
        let already_installed = self
            .installed
            .iter()
            .any(|installed| ptr::addr_eq(Arc::as_ptr(installed), Arc::as_ptr(&module)));
        if already_installed {
            tracing::trace!(module = %module.name(), "module already installed");
            return;
        }
        self.installed.push(Arc::clone(&module));

        let name = module.name();
        tracing::debug!(module = %name, "configuring module");
        if let Err(cause) = module.configure(self) {
            tracing::warn!(module = %name, error = %cause, "module configuration failed");
            let text = format!("An exception was caught and reported. Message: {}", cause);
            self.push(Element::AddMessage(
                Message::new(MessageKind::ModuleConfigureThrew, Source::Module(name), text)
                    .with_cause(cause),
            ));
        }
    }

    pub fn current_stage(&self) -> Stage {
        self.stage
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    fn into_elements(self) -> Vec<Element> {
        self.elements
    }
}

/// 绑定构建器，把限定符、目标和作用域追加到已记录的 `Bind` 元素
pub struct BindingBuilder<'a> {
    elements: &'a mut Vec<Element>,
    index: usize,
}

impl BindingBuilder<'_> {
    fn command(&mut self) -> Option<&mut BindCommand> {
        match self.elements.get_mut(self.index) {
            Some(Element::Bind(command)) => Some(command),
            _ => None,
        }
    }

    fn target(mut self, target: Target) -> Self {
        if let Some(command) = self.command() {
            command.targets.push(target);
        }
        self
    }

    fn scoping(mut self, scoping: Scoping) -> Self {
        if let Some(command) = self.command() {
            command.scopings.push(scoping);
        }
        self
    }

    pub fn annotated_with(mut self, qualifier: Qualifier) -> Self {
        if let Some(command) = self.command() {
            command.qualifiers.push(qualifier);
        }
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.annotated_with(Qualifier::named(name))
    }

    /// 链接到另一个键
    pub fn to(self, target: Key) -> Self {
        self.target(Target::LinkedKey(target))
    }

    pub fn to_type<T: TypeTag + ?Sized>(self) -> Self {
        self.to(Key::of::<T>())
    }

    /// 链接到实现类型，由其登记的构造器创建
    pub fn to_implementation(self, type_literal: TypeLiteral) -> Self {
        self.target(Target::Implementation(type_literal))
    }

    pub fn to_instance<T: Any + Send + Sync>(self, value: T) -> Self {
        self.target(Target::Instance(Instance::new(value)))
    }

    pub fn to_provider(self, provider: Arc<dyn Provide>) -> Self {
        self.target(Target::Provider(ProviderTarget::Instance(provider)))
    }

    pub fn to_provider_fn<F, T>(self, dependencies: Vec<Dependency>, provide_fn: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.to_provider(provider::provider_fn(dependencies, provide_fn))
    }

    /// 由绑定在 `provider_key` 上的提供者生产
    pub fn to_provider_key(self, provider_key: Key) -> Self {
        self.target(Target::Provider(ProviderTarget::Key(provider_key)))
    }

    pub fn in_scope(self, scope: Arc<dyn Scope>) -> Self {
        self.scoping(Scoping::Scope(scope))
    }

    pub fn in_scope_marker(self, marker: ScopeMarker) -> Self {
        self.scoping(Scoping::Marker(marker))
    }

    pub fn as_singleton(self) -> Self {
        self.in_scope_marker(ScopeMarker::SINGLETON)
    }

    pub fn as_eager_singleton(self) -> Self {
        self.scoping(Scoping::EagerSingleton)
    }

    pub fn unscoped(self) -> Self {
        self.scoping(Scoping::Unscoped)
    }
}

/// 常量绑定构建器
pub struct ConstantBindingBuilder<'a> {
    elements: &'a mut Vec<Element>,
    index: usize,
}

impl ConstantBindingBuilder<'_> {
    fn command(&mut self) -> Option<&mut BindConstantCommand> {
        match self.elements.get_mut(self.index) {
            Some(Element::BindConstant(command)) => Some(command),
            _ => None,
        }
    }

    pub fn annotated_with(mut self, qualifier: Qualifier) -> Self {
        if let Some(command) = self.command() {
            command.qualifiers.push(qualifier);
        }
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.annotated_with(Qualifier::named(name))
    }

    pub fn to(mut self, value: impl Into<String>) -> Self {
        if let Some(command) = self.command() {
            command.values.push(value.into());
        }
        self
    }
}

/// 运行模块并收集元素
#[derive(Debug, Clone, Copy, Default)]
pub struct Recorder {
    stage: Stage,
}

impl Recorder {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    pub fn record(&self, modules: &[Arc<dyn Module>]) -> Vec<Element> {
        let mut binder = Binder::new(self.stage);
        for module in modules {
            binder.install(Arc::clone(module));
        }
        tracing::debug!(
            modules = modules.len(),
            elements = binder.elements.len(),
            "modules recorded"
        );
        binder.into_elements()
    }
}

/// 模块组合工具
pub struct Modules;

impl Modules {
    /// 用 `overrides` 中的绑定替换 `base` 中的同键绑定
    pub fn override_with(
        base: Vec<Arc<dyn Module>>,
        overrides: Vec<Arc<dyn Module>>,
    ) -> Arc<dyn Module> {
        Arc::new(OverrideModule { base, overrides })
    }
}

struct OverrideModule {
    base: Vec<Arc<dyn Module>>,
    overrides: Vec<Arc<dyn Module>>,
}

impl Module for OverrideModule {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("override")
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        let recorder = Recorder::new(binder.current_stage());
        let base = recorder.record(&self.base);
        let overrides = recorder.record(&self.overrides);
        binder
            .elements
            .extend(graph::merge_overrides(base, vec![overrides]));
        Ok(())
    }
}
