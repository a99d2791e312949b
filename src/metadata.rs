//! 类型元数据注册表
//!
//! 由调用方显式填写，替代运行时反射：
//! - 可构造类型：构造器（依赖 + 构造体）、成员注入点、静态成员注入点、默认作用域
//! - 接口上转型：`From -> To` 的转换函数
//! - 替身工厂：为接口类型创建支持循环依赖的转发替身

use std::any::{self, Any};
use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;

use crate::dependency::{Dependency, InjectionPoint, Member};
use crate::errors::{MessageKind, ProvisionError};
use crate::instance::Instance;
use crate::key::{Key, TypeLiteral, TypeTag};
use crate::scope::ScopeMarker;
use crate::stand_in::Forwarder;

type ConstructorBody = Arc<dyn Fn(&Arguments) -> anyhow::Result<Instance> + Send + Sync>;
type MemberSetter = Arc<dyn Fn(&Instance, Option<Instance>) -> anyhow::Result<()> + Send + Sync>;
type StaticSetter = Arc<dyn Fn(Option<Instance>) -> anyhow::Result<()> + Send + Sync>;
type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
type StandInFactory = Arc<dyn Fn() -> StandIn + Send + Sync>;

/// 已解析的参数列表
pub struct Arguments {
    owner: String,
    values: Vec<Option<Instance>>,
}

impl Arguments {
    pub fn new(owner: impl Into<String>, values: Vec<Option<Instance>>) -> Self {
        Self {
            owner: owner.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// 取出必需参数
    pub fn get<T: Any + Clone>(&self, index: usize) -> Result<T, ProvisionError> {
        match self.get_optional::<T>(index)? {
            Some(value) => Ok(value),
            None => Err(ProvisionError::ArgumentUnavailable {
                owner: self.owner.clone(),
                index,
            }),
        }
    }

    /// 取出可选参数；未绑定时为 `None`
    pub fn get_optional<T: Any + Clone>(&self, index: usize) -> Result<Option<T>, ProvisionError> {
        let slot = self
            .values
            .get(index)
            .ok_or_else(|| ProvisionError::ArgumentUnavailable {
                owner: self.owner.clone(),
                index,
            })?;
        match slot {
            None => Ok(None),
            Some(instance) => instance.downcast::<T>().map(Some).ok_or_else(|| {
                ProvisionError::TypeMismatch {
                    key: Key::new(TypeLiteral::named(self.owner.clone())),
                    expected: any::type_name::<T>(),
                    actual: instance.type_name(),
                }
            }),
        }
    }
}

/// 构造器注入点
#[derive(Clone)]
pub struct ConstructorPoint {
    dependencies: Vec<Dependency>,
    injectable: bool,
    body: ConstructorBody,
}

impl ConstructorPoint {
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn is_injectable(&self) -> bool {
        self.injectable
    }

    pub(crate) fn invoke(&self, arguments: &Arguments) -> anyhow::Result<Instance> {
        (self.body)(arguments)
    }
}

/// 成员注入点
#[derive(Clone)]
pub struct MemberPoint {
    name: Cow<'static, str>,
    dependency: Dependency,
    setter: MemberSetter,
}

impl MemberPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    pub(crate) fn inject(&self, target: &Instance, value: Option<Instance>) -> anyhow::Result<()> {
        (self.setter)(target, value)
    }
}

/// 静态成员注入点
#[derive(Clone)]
pub struct StaticMemberPoint {
    name: Cow<'static, str>,
    dependency: Dependency,
    setter: StaticSetter,
}

impl StaticMemberPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    pub(crate) fn inject(&self, value: Option<Instance>) -> anyhow::Result<()> {
        (self.setter)(value)
    }
}

/// 单个类型的元数据
#[derive(Clone)]
pub struct TypeMetadata {
    type_literal: TypeLiteral,
    constructors: Vec<ConstructorPoint>,
    members: Vec<MemberPoint>,
    static_members: Vec<StaticMemberPoint>,
    default_scope: Option<ScopeMarker>,
}

impl TypeMetadata {
    fn new(type_literal: TypeLiteral) -> Self {
        Self {
            type_literal,
            constructors: Vec::new(),
            members: Vec::new(),
            static_members: Vec::new(),
            default_scope: None,
        }
    }

    pub fn type_literal(&self) -> &TypeLiteral {
        &self.type_literal
    }

    pub fn members(&self) -> &[MemberPoint] {
        &self.members
    }

    pub fn static_members(&self) -> &[StaticMemberPoint] {
        &self.static_members
    }

    pub fn default_scope(&self) -> Option<&ScopeMarker> {
        self.default_scope.as_ref()
    }

    /// 选择注入构造器：唯一的可注入构造器，否则退回无参构造器
    pub fn select_constructor(&self) -> Result<&ConstructorPoint, ProvisionError> {
        let key = Key::new(self.type_literal.clone());
        let injectable: Vec<&ConstructorPoint> =
            self.constructors.iter().filter(|c| c.injectable).collect();
        match injectable.as_slice() {
            [only] => Ok(*only),
            [] => self
                .constructors
                .iter()
                .find(|c| c.dependencies.is_empty())
                .ok_or_else(|| ProvisionError::InvalidBinding {
                    key,
                    kind: MessageKind::NoUsableConstructor,
                    reason: format!(
                        "Could not find a suitable constructor in {}. Types must have either one \
                         (and only one) injectable constructor or a zero-argument constructor.",
                        self.type_literal
                    ),
                }),
            _ => Err(ProvisionError::InvalidBinding {
                key,
                kind: MessageKind::TooManyAnnotatedConstructors,
                reason: format!(
                    "{} has more than one injectable constructor. Types must have either one \
                     (and only one) injectable constructor or a zero-argument constructor.",
                    self.type_literal
                ),
            }),
        }
    }
}

/// 替身：实例 + 一次性的委托设定函数
pub(crate) struct StandIn {
    pub instance: Instance,
    pub delegate: Box<dyn FnOnce(&Instance) -> bool + Send>,
}

/// 元数据注册表
#[derive(Clone, Default)]
pub struct Metadata {
    types: HashMap<TypeLiteral, TypeMetadata>,
    casts: HashMap<(TypeLiteral, TypeLiteral), CastFn>,
    stand_ins: HashMap<TypeLiteral, StandInFactory>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始登记一个可构造类型，实例以 `Arc<T>` 的形式交付
    pub fn constructible<T>(&mut self) -> TypeBuilder<'_, T>
    where
        T: TypeTag + Send + Sync + 'static,
    {
        TypeBuilder {
            type_metadata: TypeMetadata::new(T::type_literal()),
            metadata: self,
            _phantom: PhantomData,
        }
    }

    /// 登记实现类型到接口的上转型
    pub fn implements<I, C, F>(&mut self, upcast: F) -> &mut Self
    where
        I: ?Sized + TypeTag + Send + Sync + 'static,
        C: TypeTag + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        self.cast::<Arc<C>, Arc<I>, F>(upcast)
    }

    /// 登记任意句柄类型之间的转换
    pub fn cast<In, Out, F>(&mut self, convert: F) -> &mut Self
    where
        In: TypeTag + Any + Clone + Send + Sync,
        Out: TypeTag + Any + Send + Sync,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(move |instance: &Instance| {
            if instance.is::<Out>() {
                return Some(instance.clone());
            }
            instance
                .downcast::<In>()
                .map(|value| Instance::new(convert(value)))
        });
        self.casts
            .insert((In::type_literal(), Out::type_literal()), cast);
        self
    }

    /// 为接口登记替身工厂
    ///
    /// `wrap` 收到一个尚未设定的 [`Forwarder`]，返回把接口方法转发给它的实现。
    pub fn stand_in<I, F>(&mut self, wrap: F) -> &mut Self
    where
        I: ?Sized + TypeTag + Send + Sync + 'static,
        F: Fn(Forwarder<I>) -> Arc<I> + Send + Sync + 'static,
    {
        let factory: StandInFactory = Arc::new(move || {
            let forwarder = Forwarder::<I>::new();
            let proxy: Arc<I> = wrap(forwarder.clone());
            StandIn {
                instance: Instance::new(proxy),
                delegate: Box::new(move |real: &Instance| match real.downcast::<Arc<I>>() {
                    Some(delegate) => forwarder.set(delegate),
                    None => false,
                }),
            }
        });
        self.stand_ins.insert(I::type_literal(), factory);
        self
    }

    pub fn get(&self, type_literal: &TypeLiteral) -> Option<&TypeMetadata> {
        self.types.get(type_literal)
    }

    pub fn is_constructible(&self, type_literal: &TypeLiteral) -> bool {
        self.types.contains_key(type_literal)
    }

    pub fn can_cast(&self, from: &TypeLiteral, to: &TypeLiteral) -> bool {
        from == to || self.casts.contains_key(&(from.clone(), to.clone()))
    }

    pub fn has_stand_in(&self, type_literal: &TypeLiteral) -> bool {
        self.stand_ins.contains_key(type_literal)
    }

    /// 把 `from` 类型的实例转换为 `to` 类型的句柄
    pub(crate) fn cast_instance(
        &self,
        instance: &Instance,
        from: &TypeLiteral,
        to: &TypeLiteral,
    ) -> Result<Instance, ProvisionError> {
        if from == to {
            return Ok(instance.clone());
        }
        self.casts
            .get(&(from.clone(), to.clone()))
            .and_then(|cast| cast(instance))
            .ok_or_else(|| ProvisionError::NotASubtype {
                from: from.clone(),
                to: to.clone(),
            })
    }

    pub(crate) fn create_stand_in(&self, type_literal: &TypeLiteral) -> Option<StandIn> {
        self.stand_ins.get(type_literal).map(|factory| factory())
    }
}

/// 可构造类型的登记器
#[must_use = "call register() to add the type to the metadata registry"]
pub struct TypeBuilder<'a, T> {
    metadata: &'a mut Metadata,
    type_metadata: TypeMetadata,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T> TypeBuilder<'a, T>
where
    T: TypeTag + Send + Sync + 'static,
{
    /// 可注入构造器，依赖按顺序出现在 [`Arguments`] 中
    pub fn constructor<F>(self, dependencies: Vec<Dependency>, body: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push_constructor(true, dependencies, body)
    }

    /// 无注入标记的无参构造器
    pub fn default_constructor<F>(self, body: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push_constructor(false, Vec::new(), move |_| body())
    }

    fn push_constructor<F>(mut self, injectable: bool, dependencies: Vec<Dependency>, body: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let literal = self.type_metadata.type_literal.clone();
        let dependencies = dependencies
            .into_iter()
            .enumerate()
            .map(|(index, dependency)| {
                dependency.at(InjectionPoint::constructor(literal.clone(), index))
            })
            .collect();
        self.type_metadata.constructors.push(ConstructorPoint {
            dependencies,
            injectable,
            body: Arc::new(move |arguments: &Arguments| {
                body(arguments).map(|value| Instance::new(Arc::new(value)))
            }),
        });
        self
    }

    /// 字段式成员注入
    pub fn member<D, F>(self, name: &'static str, key: Key, setter: F) -> Self
    where
        D: Any + Clone,
        F: Fn(&T, D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push_member(Member::Field(Cow::Borrowed(name)), Dependency::required(key), move |target, value| {
            setter(target, required_value::<D>(name, value)?)
        })
    }

    /// 方法式成员注入
    pub fn setter<D, F>(self, name: &'static str, key: Key, setter: F) -> Self
    where
        D: Any + Clone,
        F: Fn(&T, D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push_member(Member::Method(Cow::Borrowed(name)), Dependency::required(key), move |target, value| {
            setter(target, required_value::<D>(name, value)?)
        })
    }

    /// 可选成员注入；未绑定时收到 `None`
    pub fn optional_member<D, F>(self, name: &'static str, key: Key, setter: F) -> Self
    where
        D: Any + Clone,
        F: Fn(&T, Option<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push_member(Member::Field(Cow::Borrowed(name)), Dependency::optional(key), move |target, value| {
            setter(target, optional_value::<D>(name, value)?)
        })
    }

    fn push_member<F>(mut self, member: Member, dependency: Dependency, setter: F) -> Self
    where
        F: Fn(&T, Option<Instance>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let literal = self.type_metadata.type_literal.clone();
        let name = match &member {
            Member::Field(name) | Member::Method(name) => name.clone(),
            Member::Constructor => Cow::Borrowed("new"),
        };
        let dependency = dependency.at(InjectionPoint::member(literal, member, false));
        self.type_metadata.members.push(MemberPoint {
            name,
            dependency,
            setter: Arc::new(move |target: &Instance, value: Option<Instance>| {
                let target = target.downcast_ref::<Arc<T>>().ok_or_else(|| {
                    anyhow!(
                        "member injection target is {}, expected Arc<{}>",
                        target.type_name(),
                        any::type_name::<T>()
                    )
                })?;
                setter(target.as_ref(), value)
            }),
        });
        self
    }

    /// 静态成员注入，由 `request_static_injection` 触发
    pub fn static_member<D, F>(mut self, name: &'static str, key: Key, setter: F) -> Self
    where
        D: Any + Clone,
        F: Fn(D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let literal = self.type_metadata.type_literal.clone();
        let dependency = Dependency::required(key).at(InjectionPoint::member(
            literal,
            Member::Field(Cow::Borrowed(name)),
            true,
        ));
        self.type_metadata.static_members.push(StaticMemberPoint {
            name: Cow::Borrowed(name),
            dependency,
            setter: Arc::new(move |value: Option<Instance>| setter(required_value::<D>(name, value)?)),
        });
        self
    }

    pub fn in_scope(mut self, marker: ScopeMarker) -> Self {
        self.type_metadata.default_scope = Some(marker);
        self
    }

    pub fn singleton(self) -> Self {
        self.in_scope(ScopeMarker::SINGLETON)
    }

    pub fn register(self) -> &'a mut Metadata {
        let literal = self.type_metadata.type_literal.clone();
        self.metadata.types.insert(literal, self.type_metadata);
        self.metadata
    }
}

fn optional_value<D: Any + Clone>(name: &str, value: Option<Instance>) -> anyhow::Result<Option<D>> {
    match value {
        None => Ok(None),
        Some(instance) => instance.downcast::<D>().map(Some).ok_or_else(|| {
            anyhow!(
                "value for {} is {}, expected {}",
                name,
                instance.type_name(),
                any::type_name::<D>()
            )
        }),
    }
}

fn required_value<D: Any + Clone>(name: &str, value: Option<Instance>) -> anyhow::Result<D> {
    optional_value::<D>(name, value)?.ok_or_else(|| anyhow!("no value for required member {}", name))
}
