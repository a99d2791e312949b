use std::collections::HashSet;
use std::sync::Arc;

use crate::dependency::Dependency;
use crate::element::{InjectionRequest, Source, StaticInjectionRequest};

use super::{BuildState, ElementVisitor};

/// 沿显式绑定与注入请求的依赖预先派生即时绑定，提前暴露转换失败与构造器问题
///
/// 缺失的绑定不在这里报告，而是在解析时以 `MissingBinding` 返回。
pub(crate) struct ImplicitBindingProcessor<'s> {
    state: &'s mut BuildState,
    pending: Vec<(Dependency, Source)>,
}

impl<'s> ImplicitBindingProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        let mut explicit: Vec<_> = state.bindings.values().cloned().collect();
        explicit.sort_by_key(|binding| binding.key().to_string());
        let pending = explicit
            .iter()
            .flat_map(|binding| {
                binding
                    .dependencies()
                    .into_iter()
                    .map(|dependency| (dependency, binding.source().clone()))
            })
            .collect();
        Self { state, pending }
    }

    pub fn run(&mut self) {
        let mut seen = HashSet::new();
        while let Some((dependency, source)) = self.pending.pop() {
            let key = dependency.key();
            if !seen.insert(key.clone()) || self.state.is_bound(key) {
                continue;
            }
            match self.state.derivation().derive(key) {
                Ok(Some(binding)) => {
                    self.pending.extend(
                        binding
                            .dependencies()
                            .into_iter()
                            .map(|next| (next, source.clone())),
                    );
                    self.state.jit.insert(key.clone(), Arc::new(binding));
                }
                Ok(None) => {}
                Err(error) => self.state.errors.provision(&source, error),
            }
        }
    }
}

impl ElementVisitor for ImplicitBindingProcessor<'_> {
    fn visit_injection_request(&mut self, request: &InjectionRequest) -> bool {
        if let Some(type_metadata) = self.state.metadata.get(&request.type_literal) {
            self.pending.extend(
                type_metadata
                    .members()
                    .iter()
                    .map(|member| (member.dependency().clone(), request.source.clone())),
            );
        }
        false
    }

    fn visit_static_injection_request(&mut self, request: &StaticInjectionRequest) -> bool {
        for type_literal in &request.types {
            if let Some(type_metadata) = self.state.metadata.get(type_literal) {
                self.pending.extend(
                    type_metadata
                        .static_members()
                        .iter()
                        .map(|member| (member.dependency().clone(), request.source.clone())),
                );
            }
        }
        false
    }
}
