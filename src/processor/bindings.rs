use std::sync::Arc;

use crate::element::{BindCommand, BindConstantCommand, ProviderTarget, Scoping, Source, Target};
use crate::factory::{
    ConstantFactory, InternalFactory, LinkedFactory, ProviderInstanceFactory, ProviderKeyFactory,
};
use crate::graph::{self, Binding, BindingKind, LoadStrategy};
use crate::instance::Instance;
use crate::key::Key;
use crate::scope::{self, Scope, ScopeMarker};

use super::{BuildState, ElementVisitor};

/// 把 `Bind` 与 `BindConstant` 校验并转换为绑定
pub(crate) struct BindingProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> BindingProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }

    fn put_binding(&mut self, binding: Binding) {
        if let Some(existing) = self.state.bindings.get(binding.key()) {
            let original = existing.source().clone();
            self.state
                .errors
                .binding_already_set(binding.source(), binding.key(), &original);
            return;
        }
        tracing::trace!(key = %binding.key(), kind = ?binding.kind(), "binding registered");
        self.state
            .bindings
            .insert(binding.key().clone(), Arc::new(binding));
    }

    fn scope_for(&mut self, marker: &ScopeMarker, source: &Source) -> Option<Arc<dyn Scope>> {
        let found = self.state.scopes.get(marker).cloned();
        if found.is_none() {
            self.state.errors.scope_not_found(source, marker);
        }
        found
    }

    /// 作用域设置 -> (作用域, 加载策略)；`None` 表示已报告错误
    fn resolve_scoping(
        &mut self,
        scoping: Option<&Scoping>,
        default_marker: Option<&ScopeMarker>,
        source: &Source,
    ) -> Option<(Option<Arc<dyn Scope>>, LoadStrategy)> {
        match scoping {
            None => match default_marker {
                Some(marker) => self
                    .scope_for(marker, source)
                    .map(|scope| (Some(scope), LoadStrategy::Lazy)),
                None => Some((None, LoadStrategy::Lazy)),
            },
            Some(Scoping::Unscoped) => Some((None, LoadStrategy::Lazy)),
            Some(Scoping::Scope(scope)) => Some((Some(scope.clone()), LoadStrategy::Lazy)),
            Some(Scoping::Marker(marker)) => self
                .scope_for(marker, source)
                .map(|scope| (Some(scope), LoadStrategy::Lazy)),
            Some(Scoping::EagerSingleton) => Some((Some(scope::singleton()), LoadStrategy::Eager)),
        }
    }

    fn linked(
        &mut self,
        key: &Key,
        target: &Key,
        source: &Source,
    ) -> Option<(Arc<dyn InternalFactory>, BindingKind)> {
        if target == key {
            self.state.errors.recursive_binding(source);
            return None;
        }
        if !self
            .state
            .metadata
            .can_cast(target.type_literal(), key.type_literal())
        {
            self.state
                .errors
                .not_a_subtype(source, target.type_literal(), key.type_literal());
            return None;
        }
        Some((
            Arc::new(LinkedFactory::new(key.clone(), target.clone())),
            BindingKind::LinkedKey(target.clone()),
        ))
    }

    fn untargeted(&mut self, key: &Key, source: &Source) -> Option<(Arc<dyn InternalFactory>, BindingKind)> {
        let type_metadata = match self.state.metadata.get(key.type_literal()) {
            Some(type_metadata) if key.qualifier().is_none() => type_metadata,
            _ => {
                self.state.errors.missing_implementation(source, key);
                return None;
            }
        };
        match graph::constructor_factory(type_metadata) {
            Ok(factory) => Some((factory, BindingKind::Constructor(key.type_literal().clone()))),
            Err(error) => {
                self.state.errors.provision(source, error);
                None
            }
        }
    }

    fn create_factory(
        &mut self,
        command: &BindCommand,
        key: &Key,
    ) -> Option<(Arc<dyn InternalFactory>, BindingKind)> {
        let source = &command.source;
        match command.targets.first() {
            None => self.untargeted(key, source),
            Some(Target::Instance(instance)) => Some((
                Arc::new(ConstantFactory::new(instance.clone())),
                BindingKind::Instance,
            )),
            Some(Target::Provider(ProviderTarget::Instance(provider))) => Some((
                Arc::new(ProviderInstanceFactory::new(key.clone(), provider.clone())),
                BindingKind::ProviderInstance,
            )),
            Some(Target::Provider(ProviderTarget::Key(provider_key))) => Some((
                Arc::new(ProviderKeyFactory::new(key.clone(), provider_key.clone())),
                BindingKind::ProviderKey(provider_key.clone()),
            )),
            Some(Target::LinkedKey(target)) => self.linked(key, target, source),
            Some(Target::Implementation(type_literal)) => {
                self.linked(key, &Key::new(type_literal.clone()), source)
            }
        }
    }
}

impl ElementVisitor for BindingProcessor<'_> {
    fn visit_binding(&mut self, command: &BindCommand) -> bool {
        let source = &command.source;
        let reported = self.state.errors.len();
        if command.qualifiers.len() > 1 {
            self.state.errors.duplicate_annotation(source);
        }
        if command.targets.len() > 1 {
            self.state.errors.target_set_more_than_once(source);
        }
        if command.scopings.len() > 1 {
            self.state.errors.scope_set_more_than_once(source);
        }
        if self.state.errors.len() > reported {
            return true;
        }

        let key = command.key();
        let Some((factory, kind)) = self.create_factory(command, &key) else {
            return true;
        };

        // 未指定目标时沿用类型声明的默认作用域
        let default_marker = match command.targets.first() {
            None => self
                .state
                .metadata
                .get(key.type_literal())
                .and_then(|type_metadata| type_metadata.default_scope().cloned()),
            Some(_) => None,
        };
        let Some((scope, load_strategy)) =
            self.resolve_scoping(command.scopings.first(), default_marker.as_ref(), source)
        else {
            return true;
        };

        self.put_binding(Binding::new(key, source.clone(), kind, factory, scope, load_strategy));
        true
    }

    fn visit_constant(&mut self, command: &BindConstantCommand) -> bool {
        let source = &command.source;
        let reported = self.state.errors.len();
        match command.qualifiers.len() {
            0 => self.state.errors.missing_qualifier(source),
            1 => {}
            _ => self.state.errors.duplicate_annotation(source),
        }
        match command.values.len() {
            0 => self.state.errors.missing_constant_value(source),
            1 => {}
            _ => self.state.errors.constant_set_more_than_once(source),
        }
        if self.state.errors.len() > reported {
            return true;
        }

        let (Some(key), Some(value)) = (command.key(), command.values.first()) else {
            return true;
        };
        self.put_binding(Binding::new(
            key,
            source.clone(),
            BindingKind::Constant(value.clone()),
            Arc::new(ConstantFactory::new(Instance::new(value.clone()))),
            None,
            LoadStrategy::Lazy,
        ));
        true
    }
}
