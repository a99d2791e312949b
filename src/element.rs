//! 配置元素模型
//!
//! 模块对 [`Binder`](crate::recorder::Binder) 的每一次调用都被记录为一个 [`Element`]，
//! 在实例化任何对象之前即可对这些数据进行校验、合并与覆盖。

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock, Weak};

use crate::convert::TypeConverter;
use crate::dependency::InjectionPoint;
use crate::errors::MessageKind;
use crate::graph::BindingGraph;
use crate::instance::Instance;
use crate::key::{Key, Qualifier, TypeLiteral};
use crate::matcher::Matcher;
use crate::provider::Provide;
use crate::scope::{Scope, ScopeMarker};

/// 元素来源
#[derive(Debug, Clone)]
pub enum Source {
    /// 调用位置
    Location(&'static Location<'static>),
    /// 模块名称
    Module(Cow<'static, str>),
    Unknown,
}

impl Source {
    #[track_caller]
    pub fn caller() -> Self {
        Source::Location(Location::caller())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Location(location) => write!(f, "{}:{}", location.file(), location.line()),
            Source::Module(name) => f.write_str(name),
            Source::Unknown => f.write_str("[unknown source]"),
        }
    }
}

/// 诊断消息
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    source: Source,
    text: String,
    cause: Option<Arc<anyhow::Error>>,
    injection_points: Vec<InjectionPoint>,
}

impl Message {
    pub fn new(kind: MessageKind, source: Source, text: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            text: text.into(),
            cause: None,
            injection_points: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_injection_point(mut self, point: InjectionPoint) -> Self {
        self.injection_points.push(point);
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.text)
    }
}

/// 提供者目标
#[derive(Clone)]
pub enum ProviderTarget {
    Instance(Arc<dyn Provide>),
    Key(Key),
}

/// 绑定目标
#[derive(Clone)]
pub enum Target {
    Instance(Instance),
    Provider(ProviderTarget),
    LinkedKey(Key),
    Implementation(TypeLiteral),
}

impl Target {
    fn describe(&self) -> String {
        match self {
            Target::Instance(instance) => format!("instance of {}", instance.type_name()),
            Target::Provider(ProviderTarget::Instance(_)) => "provider instance".to_string(),
            Target::Provider(ProviderTarget::Key(key)) => format!("provider {}", key),
            Target::LinkedKey(key) => format!("linked {}", key),
            Target::Implementation(literal) => format!("implementation {}", literal),
        }
    }
}

/// 绑定作用域设置
#[derive(Clone)]
pub enum Scoping {
    Unscoped,
    Scope(Arc<dyn Scope>),
    Marker(ScopeMarker),
    EagerSingleton,
}

impl fmt::Debug for Scoping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scoping::Unscoped => f.write_str("Unscoped"),
            Scoping::Scope(scope) => write!(f, "Scope({})", scope.name()),
            Scoping::Marker(marker) => write!(f, "Marker({})", marker),
            Scoping::EagerSingleton => f.write_str("EagerSingleton"),
        }
    }
}

/// `bind` 记录：限定符、目标、作用域都以列表保存，重复设置留待处理阶段校验
#[derive(Clone)]
pub struct BindCommand {
    pub source: Source,
    pub type_literal: TypeLiteral,
    pub qualifiers: Vec<Qualifier>,
    pub targets: Vec<Target>,
    pub scopings: Vec<Scoping>,
}

impl BindCommand {
    pub fn new(source: Source, type_literal: TypeLiteral) -> Self {
        Self {
            source,
            type_literal,
            qualifiers: Vec::new(),
            targets: Vec::new(),
            scopings: Vec::new(),
        }
    }

    /// 以首个限定符构造的键
    pub fn key(&self) -> Key {
        let key = Key::new(self.type_literal.clone());
        match self.qualifiers.first() {
            Some(qualifier) => key.annotated_with(qualifier.clone()),
            None => key,
        }
    }
}

/// `bind_constant` 记录
#[derive(Clone)]
pub struct BindConstantCommand {
    pub source: Source,
    pub qualifiers: Vec<Qualifier>,
    pub values: Vec<String>,
}

impl BindConstantCommand {
    /// 常量总是以 `String` 类型绑定
    pub fn key(&self) -> Option<Key> {
        self.qualifiers
            .first()
            .map(|qualifier| Key::of::<String>().annotated_with(qualifier.clone()))
    }
}

#[derive(Clone)]
pub struct ScopeBinding {
    pub source: Source,
    pub marker: ScopeMarker,
    pub scope: Arc<dyn Scope>,
}

/// 拦截器绑定，仅作为不透明数据保存
#[derive(Clone)]
pub struct InterceptorBinding {
    pub source: Source,
    pub class_matcher: Arc<dyn Matcher<TypeLiteral>>,
    pub member_matcher: Arc<dyn Matcher<str>>,
    pub interceptors: Vec<Arc<dyn Any + Send + Sync>>,
}

impl InterceptorBinding {
    pub fn applies_to(&self, type_literal: &TypeLiteral, member: &str) -> bool {
        self.class_matcher.matches(type_literal) && self.member_matcher.matches(member)
    }
}

#[derive(Clone)]
pub struct InjectionRequest {
    pub source: Source,
    pub type_literal: TypeLiteral,
    pub instance: Instance,
}

#[derive(Clone)]
pub struct StaticInjectionRequest {
    pub source: Source,
    pub types: Vec<TypeLiteral>,
}

#[derive(Clone)]
pub struct TypeConverterBinding {
    pub source: Source,
    pub type_matcher: Arc<dyn Matcher<TypeLiteral>>,
    pub converter: Arc<dyn TypeConverter>,
}

/// 构建期间申请的提供者；图冻结后才初始化委托
#[derive(Clone)]
pub struct ProviderLookup {
    pub source: Source,
    pub key: Key,
    pub delegate: Arc<OnceLock<Weak<BindingGraph>>>,
}

/// 配置元素
#[derive(Clone)]
pub enum Element {
    Bind(BindCommand),
    BindConstant(BindConstantCommand),
    BindScope(ScopeBinding),
    BindInterceptor(InterceptorBinding),
    RequestInjection(InjectionRequest),
    RequestStaticInjection(StaticInjectionRequest),
    ConvertToType(TypeConverterBinding),
    AddMessage(Message),
    ProviderLookup(ProviderLookup),
}

impl Element {
    pub fn source(&self) -> &Source {
        match self {
            Element::Bind(command) => &command.source,
            Element::BindConstant(command) => &command.source,
            Element::BindScope(binding) => &binding.source,
            Element::BindInterceptor(binding) => &binding.source,
            Element::RequestInjection(request) => &request.source,
            Element::RequestStaticInjection(request) => &request.source,
            Element::ConvertToType(binding) => &binding.source,
            Element::AddMessage(message) => message.source(),
            Element::ProviderLookup(lookup) => &lookup.source,
        }
    }

    /// 该元素绑定的键（`Bind` 与 `BindConstant`）
    pub fn bound_key(&self) -> Option<Key> {
        match self {
            Element::Bind(command) => Some(command.key()),
            Element::BindConstant(command) => command.key(),
            _ => None,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Bind(command) => f
                .debug_struct("Bind")
                .field("key", &command.key().to_string())
                .field(
                    "targets",
                    &command.targets.iter().map(Target::describe).collect::<Vec<_>>(),
                )
                .field("scopings", &command.scopings)
                .finish(),
            Element::BindConstant(command) => f
                .debug_struct("BindConstant")
                .field("qualifiers", &command.qualifiers)
                .field("values", &command.values)
                .finish(),
            Element::BindScope(binding) => f
                .debug_struct("BindScope")
                .field("marker", &binding.marker)
                .field("scope", &binding.scope.name())
                .finish(),
            Element::BindInterceptor(binding) => f
                .debug_struct("BindInterceptor")
                .field("interceptors", &binding.interceptors.len())
                .finish(),
            Element::RequestInjection(request) => f
                .debug_struct("RequestInjection")
                .field("type", &request.type_literal)
                .finish(),
            Element::RequestStaticInjection(request) => f
                .debug_struct("RequestStaticInjection")
                .field("types", &request.types)
                .finish(),
            Element::ConvertToType(_) => f.write_str("ConvertToType"),
            Element::AddMessage(message) => f.debug_tuple("AddMessage").field(&message.text()).finish(),
            Element::ProviderLookup(lookup) => f
                .debug_struct("ProviderLookup")
                .field("key", &lookup.key.to_string())
                .finish(),
        }
    }
}
