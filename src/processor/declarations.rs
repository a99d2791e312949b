use crate::element::{InterceptorBinding, ScopeBinding, TypeConverterBinding};

use super::{BuildState, ElementVisitor};

/// 登记作用域实现；同一标记重复登记为错误
pub(crate) struct ScopeBindingProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> ScopeBindingProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for ScopeBindingProcessor<'_> {
    fn visit_scope_binding(&mut self, binding: &ScopeBinding) -> bool {
        let existing = self.state.scopes.get(&binding.marker).map(|scope| scope.name());
        match existing {
            Some(existing) => {
                self.state.errors.duplicate_scope(
                    &binding.source,
                    &binding.marker,
                    &existing,
                    &binding.scope.name(),
                );
            }
            None => {
                tracing::debug!(marker = %binding.marker, scope = %binding.scope.name(), "scope bound");
                self.state
                    .scopes
                    .insert(binding.marker.clone(), binding.scope.clone());
            }
        }
        true
    }
}

/// 拦截器绑定只作为数据保留，供注入器查询
pub(crate) struct InterceptorBindingProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> InterceptorBindingProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for InterceptorBindingProcessor<'_> {
    fn visit_interceptor_binding(&mut self, binding: &InterceptorBinding) -> bool {
        tracing::debug!(
            source = %binding.source,
            interceptors = binding.interceptors.len(),
            "interceptor binding recorded"
        );
        self.state.interceptors.push(binding.clone());
        true
    }
}

/// 追加用户转换器，内置转换器排在前面
pub(crate) struct TypeConverterBindingProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> TypeConverterBindingProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for TypeConverterBindingProcessor<'_> {
    fn visit_converter_binding(&mut self, binding: &TypeConverterBinding) -> bool {
        self.state.converters.push(binding.clone());
        true
    }
}
