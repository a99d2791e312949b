use crate::element::{InjectionRequest, ProviderLookup, StaticInjectionRequest};
use crate::errors::ProvisionError;

use super::{BuildState, ElementVisitor};

/// 收集静态与实例注入请求，图冻结后执行
pub(crate) struct InjectionRequestProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> InjectionRequestProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for InjectionRequestProcessor<'_> {
    fn visit_injection_request(&mut self, request: &InjectionRequest) -> bool {
        self.state.injection_requests.push(request.clone());
        true
    }

    fn visit_static_injection_request(&mut self, request: &StaticInjectionRequest) -> bool {
        self.state.static_injection_requests.push(request.clone());
        true
    }
}

/// 检查提供者查找的键可解析，图冻结后初始化其委托
pub(crate) struct ProviderLookupProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> ProviderLookupProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for ProviderLookupProcessor<'_> {
    fn visit_provider_lookup(&mut self, lookup: &ProviderLookup) -> bool {
        match self.state.lookup(&lookup.key) {
            Ok(true) => self.state.provider_lookups.push(lookup.clone()),
            Ok(false) => self.state.errors.provision(
                &lookup.source,
                ProvisionError::MissingBinding {
                    key: lookup.key.clone(),
                    requested_by: None,
                },
            ),
            Err(error) => self.state.errors.provision(&lookup.source, error),
        }
        true
    }
}
