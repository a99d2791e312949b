//! 元素处理流水线
//!
//! 每个处理器访问元素列表，认领（返回 `true`）的元素从列表中移除。
//! 处理顺序固定：作用域、拦截器、转换器 -> 显式绑定 -> 隐式绑定 ->
//! 注入请求与提供者查找 -> 消息。全部元素处理完之后才判断构建是否成功。

mod bindings;
mod declarations;
mod implicit;
mod messages;
mod requests;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::InjectorConfig;
use crate::convert;
use crate::element::{
    BindCommand, BindConstantCommand, Element, InjectionRequest, InterceptorBinding, Message,
    ProviderLookup, ScopeBinding, StaticInjectionRequest, TypeConverterBinding,
};
use crate::errors::{Errors, ProvisionError};
use crate::graph::{Binding, Derivation};
use crate::key::Key;
use crate::metadata::Metadata;
use crate::scope::{self, Scope, ScopeMarker};

pub(crate) use bindings::BindingProcessor;
pub(crate) use declarations::{
    InterceptorBindingProcessor, ScopeBindingProcessor, TypeConverterBindingProcessor,
};
pub(crate) use implicit::ImplicitBindingProcessor;
pub(crate) use messages::MessageProcessor;
pub(crate) use requests::{InjectionRequestProcessor, ProviderLookupProcessor};

/// 元素访问者；默认方法不认领任何元素
pub(crate) trait ElementVisitor {
    fn visit_binding(&mut self, _command: &BindCommand) -> bool {
        false
    }

    fn visit_constant(&mut self, _command: &BindConstantCommand) -> bool {
        false
    }

    fn visit_scope_binding(&mut self, _binding: &ScopeBinding) -> bool {
        false
    }

    fn visit_interceptor_binding(&mut self, _binding: &InterceptorBinding) -> bool {
        false
    }

    fn visit_injection_request(&mut self, _request: &InjectionRequest) -> bool {
        false
    }

    fn visit_static_injection_request(&mut self, _request: &StaticInjectionRequest) -> bool {
        false
    }

    fn visit_converter_binding(&mut self, _binding: &TypeConverterBinding) -> bool {
        false
    }

    fn visit_message(&mut self, _message: &Message) -> bool {
        false
    }

    fn visit_provider_lookup(&mut self, _lookup: &ProviderLookup) -> bool {
        false
    }

    fn visit(&mut self, element: &Element) -> bool {
        match element {
            Element::Bind(command) => self.visit_binding(command),
            Element::BindConstant(command) => self.visit_constant(command),
            Element::BindScope(binding) => self.visit_scope_binding(binding),
            Element::BindInterceptor(binding) => self.visit_interceptor_binding(binding),
            Element::RequestInjection(request) => self.visit_injection_request(request),
            Element::RequestStaticInjection(request) => self.visit_static_injection_request(request),
            Element::ConvertToType(binding) => self.visit_converter_binding(binding),
            Element::AddMessage(message) => self.visit_message(message),
            Element::ProviderLookup(lookup) => self.visit_provider_lookup(lookup),
        }
    }

    /// 访问全部元素，只保留未被认领的
    fn process(&mut self, elements: &mut Vec<Element>) {
        elements.retain(|element| !self.visit(element));
    }
}

/// 构建期间在处理器之间传递的状态
pub(crate) struct BuildState {
    pub bindings: HashMap<Key, Arc<Binding>>,
    pub jit: HashMap<Key, Arc<Binding>>,
    pub scopes: HashMap<ScopeMarker, Arc<dyn Scope>>,
    pub converters: Vec<TypeConverterBinding>,
    pub interceptors: Vec<InterceptorBinding>,
    pub injection_requests: Vec<InjectionRequest>,
    pub static_injection_requests: Vec<StaticInjectionRequest>,
    pub provider_lookups: Vec<ProviderLookup>,
    pub metadata: Arc<Metadata>,
    pub config: InjectorConfig,
    pub errors: Errors,
}

impl BuildState {
    pub fn new(metadata: Arc<Metadata>, config: InjectorConfig) -> Self {
        let mut scopes: HashMap<ScopeMarker, Arc<dyn Scope>> = HashMap::new();
        scopes.insert(ScopeMarker::SINGLETON, scope::singleton());
        Self {
            bindings: HashMap::new(),
            jit: HashMap::new(),
            scopes,
            converters: convert::builtin_converters(),
            interceptors: Vec::new(),
            injection_requests: Vec::new(),
            static_injection_requests: Vec::new(),
            provider_lookups: Vec::new(),
            metadata,
            config,
            errors: Errors::default(),
        }
    }

    pub fn derivation(&self) -> Derivation<'_> {
        Derivation {
            bindings: &self.bindings,
            converters: &self.converters,
            scopes: &self.scopes,
            metadata: &self.metadata,
            config: &self.config,
        }
    }

    pub fn is_bound(&self, key: &Key) -> bool {
        self.bindings.contains_key(key) || self.jit.contains_key(key)
    }

    /// 键是否可解析；可派生时顺带缓存即时绑定
    pub fn lookup(&mut self, key: &Key) -> Result<bool, ProvisionError> {
        if self.is_bound(key) {
            return Ok(true);
        }
        match self.derivation().derive(key)? {
            Some(binding) => {
                self.jit.insert(key.clone(), Arc::new(binding));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// 按固定顺序运行全部处理器
pub(crate) fn process(state: &mut BuildState, elements: &mut Vec<Element>) {
    ScopeBindingProcessor::new(state).process(elements);
    InterceptorBindingProcessor::new(state).process(elements);
    TypeConverterBindingProcessor::new(state).process(elements);
    BindingProcessor::new(state).process(elements);

    let mut implicit = ImplicitBindingProcessor::new(state);
    implicit.process(elements);
    implicit.run();

    InjectionRequestProcessor::new(state).process(elements);
    ProviderLookupProcessor::new(state).process(elements);
    MessageProcessor::new(state).process(elements);

    if !elements.is_empty() {
        tracing::warn!(remaining = elements.len(), "unclaimed elements after processing");
    }
    tracing::debug!(
        bindings = state.bindings.len(),
        jit = state.jit.len(),
        errors = state.errors.len(),
        "element processing finished"
    );
}
