//! 内部工厂
//!
//! 每个绑定最终落到一个 [`InternalFactory`]，作用域再对其进行包装。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::{ConstructionGuard, ConstructionState, InternalContext};
use crate::dependency::Dependency;
use crate::errors::ProvisionError;
use crate::instance::Instance;
use crate::key::{Key, TypeLiteral};
use crate::metadata::{Arguments, ConstructorPoint, MemberPoint, StandIn};
use crate::provider::Provide;

/// 内部工厂
pub trait InternalFactory: Send + Sync {
    /// 为 `dependency` 产出实例；依赖的键类型即调用方期望的类型
    fn get(
        &self,
        context: &mut InternalContext<'_>,
        dependency: &Dependency,
    ) -> Result<Instance, ProvisionError>;

    /// 产出实例前需要解析的依赖，用于构建期的隐式绑定检查
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }
}

/// 固定实例（`to_instance` 与常量）
pub(crate) struct ConstantFactory {
    instance: Instance,
}

impl ConstantFactory {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }
}

impl InternalFactory for ConstantFactory {
    fn get(&self, _: &mut InternalContext<'_>, _: &Dependency) -> Result<Instance, ProvisionError> {
        Ok(self.instance.clone())
    }
}

fn provide_with(
    context: &mut InternalContext<'_>,
    key: &Key,
    provider: &dyn Provide,
) -> Result<Instance, ProvisionError> {
    let dependencies = provider.dependencies();
    let values = context.resolve_all(&dependencies)?;
    let arguments = Arguments::new(key.to_string(), values);
    provider
        .provide(&arguments)
        .map_err(|source| ProvisionError::ProviderFailed {
            key: key.clone(),
            source,
        })
}

/// 提供者实例
pub(crate) struct ProviderInstanceFactory {
    key: Key,
    provider: Arc<dyn Provide>,
}

impl ProviderInstanceFactory {
    pub fn new(key: Key, provider: Arc<dyn Provide>) -> Self {
        Self { key, provider }
    }
}

impl InternalFactory for ProviderInstanceFactory {
    fn get(&self, context: &mut InternalContext<'_>, _: &Dependency) -> Result<Instance, ProvisionError> {
        provide_with(context, &self.key, self.provider.as_ref())
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.provider.dependencies()
    }
}

/// 先解析提供者键，再调用得到的提供者
pub(crate) struct ProviderKeyFactory {
    key: Key,
    provider_key: Key,
}

impl ProviderKeyFactory {
    pub fn new(key: Key, provider_key: Key) -> Self {
        Self { key, provider_key }
    }
}

impl InternalFactory for ProviderKeyFactory {
    fn get(&self, context: &mut InternalContext<'_>, _: &Dependency) -> Result<Instance, ProvisionError> {
        let instance = context
            .resolve(&Dependency::required(self.provider_key.clone()))?
            .ok_or_else(|| ProvisionError::MissingBinding {
                key: self.provider_key.clone(),
                requested_by: None,
            })?;
        let provider = match instance.downcast::<Arc<dyn Provide>>() {
            Some(provider) => provider,
            None => context
                .graph()
                .metadata()
                .cast_instance(
                    &instance,
                    self.provider_key.type_literal(),
                    &TypeLiteral::of::<dyn Provide>(),
                )?
                .downcast::<Arc<dyn Provide>>()
                .ok_or_else(|| ProvisionError::TypeMismatch {
                    key: self.provider_key.clone(),
                    expected: std::any::type_name::<Arc<dyn Provide>>(),
                    actual: instance.type_name(),
                })?,
        };
        provide_with(context, &self.key, provider.as_ref())
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(self.provider_key.clone())]
    }
}

/// 链接绑定：以相同的期望类型解析目标键，再按注册的上转型转换
pub(crate) struct LinkedFactory {
    key: Key,
    target: Key,
}

impl LinkedFactory {
    pub fn new(key: Key, target: Key) -> Self {
        Self { key, target }
    }
}

impl InternalFactory for LinkedFactory {
    fn get(
        &self,
        context: &mut InternalContext<'_>,
        dependency: &Dependency,
    ) -> Result<Instance, ProvisionError> {
        let instance = context.resolve_key(&self.target, dependency)?;
        context.graph().metadata().cast_instance(
            &instance,
            self.target.type_literal(),
            self.key.type_literal(),
        )
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(self.target.clone())]
    }
}

static NEXT_CONSTRUCTOR_ID: AtomicUsize = AtomicUsize::new(0);

/// 构造器工厂，负责循环依赖的检测与打破
pub(crate) struct ConstructorFactory {
    id: usize,
    type_literal: TypeLiteral,
    constructor: ConstructorPoint,
    members: Vec<MemberPoint>,
}

impl ConstructorFactory {
    pub fn new(type_literal: TypeLiteral, constructor: ConstructorPoint, members: Vec<MemberPoint>) -> Self {
        Self {
            id: NEXT_CONSTRUCTOR_ID.fetch_add(1, Ordering::Relaxed),
            type_literal,
            constructor,
            members,
        }
    }

    /// 构造器被重入：交出期望类型的替身，真实实例构造完成后再设定委托
    fn stand_in(
        &self,
        context: &mut InternalContext<'_>,
        expected: &TypeLiteral,
    ) -> Result<Instance, ProvisionError> {
        let metadata = context.graph().metadata();
        let unresolvable = || ProvisionError::UnresolvableCircularDependency {
            key: Key::new(self.type_literal.clone()),
            expected: expected.clone(),
        };
        if *expected == self.type_literal || !metadata.can_cast(&self.type_literal, expected) {
            return Err(unresolvable());
        }
        let StandIn { instance, delegate } = metadata.create_stand_in(expected).ok_or_else(unresolvable)?;
        tracing::debug!(
            constructing = %self.type_literal,
            expected = %expected,
            "circular dependency, handing out stand-in"
        );
        context.stats().stand_in_created();
        context.add_stand_in(self.id, expected.clone(), instance.clone(), delegate);
        Ok(instance)
    }
}

impl InternalFactory for ConstructorFactory {
    fn get(
        &self,
        context: &mut InternalContext<'_>,
        dependency: &Dependency,
    ) -> Result<Instance, ProvisionError> {
        match context.construction_state(self.id) {
            ConstructionState::Constructing => {
                return self.stand_in(context, dependency.key().type_literal());
            }
            ConstructionState::Injecting(reference) => return Ok(reference),
            ConstructionState::Idle => {}
        }

        let mut guard = ConstructionGuard::start(context, self.id);
        let values = guard.resolve_all(self.constructor.dependencies())?;
        let arguments = Arguments::new(self.type_literal.to_string(), values);
        let instance = self
            .constructor
            .invoke(&arguments)
            .map_err(|source| ProvisionError::ConstructionFailed {
                type_literal: self.type_literal.clone(),
                source,
            })?;

        let metadata = guard.graph().metadata();
        for pending in guard.finish_construction() {
            let delegate = metadata.cast_instance(&instance, &self.type_literal, &pending.expected)?;
            if !(pending.delegate)(&delegate) {
                return Err(ProvisionError::NotASubtype {
                    from: self.type_literal.clone(),
                    to: pending.expected,
                });
            }
            for callback in pending.on_ready {
                callback(&delegate);
            }
        }

        guard.set_current_reference(instance.clone());
        inject_members(&mut guard, &self.type_literal, &self.members, &instance)?;
        Ok(instance)
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.constructor
            .dependencies()
            .iter()
            .chain(self.members.iter().map(MemberPoint::dependency))
            .cloned()
            .collect()
    }
}

/// 依次解析并设定成员
pub(crate) fn inject_members(
    context: &mut InternalContext<'_>,
    type_literal: &TypeLiteral,
    members: &[MemberPoint],
    instance: &Instance,
) -> Result<(), ProvisionError> {
    for member in members {
        let value = context.resolve(member.dependency())?;
        member
            .inject(instance, value)
            .map_err(|source| ProvisionError::MemberInjectionFailed {
                type_literal: type_literal.clone(),
                member: member.name().to_string(),
                source,
            })?;
    }
    Ok(())
}
