//! 解析上下文
//!
//! 每次顶层解析创建一个 [`InternalContext`]，以 `&mut` 贯穿整条解析链，
//! 记录每个构造器工厂的构造状态（是否正在构造、当前引用、待设定的替身）。
//! 上下文从不在线程间共享。

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::dependency::Dependency;
use crate::errors::ProvisionError;
use crate::graph::{Binding, BindingGraph};
use crate::instance::Instance;
use crate::key::{Key, TypeLiteral};
use crate::stats::StatsCounters;

type Delegate = Box<dyn FnOnce(&Instance) -> bool + Send>;

/// 真实实例就绪后的回调，参数为转换到期望类型的实例
pub(crate) type ReadyCallback = Box<dyn FnOnce(&Instance)>;

/// 等待真实实例的替身
pub(crate) struct PendingStandIn {
    pub expected: TypeLiteral,
    pub instance: Instance,
    pub delegate: Delegate,
    pub on_ready: Vec<ReadyCallback>,
}

#[derive(Default)]
struct ConstructionContext {
    constructing: bool,
    current_reference: Option<Instance>,
    stand_ins: Vec<PendingStandIn>,
}

/// 构造器工厂在当前上下文中的状态
pub(crate) enum ConstructionState {
    Idle,
    Constructing,
    Injecting(Instance),
}

/// 解析上下文
pub struct InternalContext<'g> {
    graph: &'g BindingGraph,
    constructions: HashMap<usize, ConstructionContext>,
    depth: usize,
}

impl<'g> InternalContext<'g> {
    pub(crate) fn new(graph: &'g BindingGraph) -> Self {
        Self {
            graph,
            constructions: HashMap::new(),
            depth: 0,
        }
    }

    pub(crate) fn graph(&self) -> &'g BindingGraph {
        self.graph
    }

    pub(crate) fn stats(&self) -> &'g StatsCounters {
        self.graph.counters()
    }

    /// 解析一个依赖；可选依赖在没有可用绑定时得到 `None`
    pub fn resolve(&mut self, dependency: &Dependency) -> Result<Option<Instance>, ProvisionError> {
        match self.graph.binding_for(dependency.key())? {
            Some(binding) => self.provision(&binding, dependency).map(Some),
            None if dependency.is_optional() => Ok(None),
            None => Err(ProvisionError::MissingBinding {
                key: dependency.key().clone(),
                requested_by: dependency.injection_point().cloned(),
            }),
        }
    }

    /// 解析 `key` 的绑定，但保留原始依赖（其类型即期望类型）
    pub fn resolve_key(&mut self, key: &Key, dependency: &Dependency) -> Result<Instance, ProvisionError> {
        match self.graph.binding_for(key)? {
            Some(binding) => self.provision(&binding, dependency),
            None => Err(ProvisionError::MissingBinding {
                key: key.clone(),
                requested_by: dependency.injection_point().cloned(),
            }),
        }
    }

    pub fn resolve_all(
        &mut self,
        dependencies: &[Dependency],
    ) -> Result<Vec<Option<Instance>>, ProvisionError> {
        dependencies
            .iter()
            .map(|dependency| self.resolve(dependency))
            .collect()
    }

    fn provision(&mut self, binding: &Arc<Binding>, dependency: &Dependency) -> Result<Instance, ProvisionError> {
        let max_depth = self.graph.config().max_resolution_depth;
        if self.depth >= max_depth {
            return Err(ProvisionError::ResolutionTooDeep {
                key: binding.key().clone(),
                depth: max_depth,
            });
        }
        self.depth += 1;
        tracing::trace!(key = %binding.key(), depth = self.depth, "resolving");
        let result = binding.factory().get(self, dependency);
        self.depth -= 1;
        result
    }

    pub(crate) fn construction_state(&self, id: usize) -> ConstructionState {
        match self.constructions.get(&id) {
            Some(construction) if construction.constructing => ConstructionState::Constructing,
            Some(ConstructionContext {
                current_reference: Some(reference),
                ..
            }) => ConstructionState::Injecting(reference.clone()),
            _ => ConstructionState::Idle,
        }
    }

    pub(crate) fn add_stand_in(
        &mut self,
        id: usize,
        expected: TypeLiteral,
        instance: Instance,
        delegate: Delegate,
    ) {
        self.constructions
            .entry(id)
            .or_default()
            .stand_ins
            .push(PendingStandIn {
                expected,
                instance,
                delegate,
                on_ready: Vec::new(),
            });
    }

    /// `instance` 是本上下文中尚未设定委托的替身时登记回调并返回 `true`
    ///
    /// 所属构造失败时回调随构造记录一起丢弃，不会被调用。
    pub(crate) fn when_ready(&mut self, instance: &Instance, callback: ReadyCallback) -> bool {
        let pending = self
            .constructions
            .values_mut()
            .flat_map(|construction| construction.stand_ins.iter_mut())
            .find(|pending| pending.instance.same(instance));
        match pending {
            Some(pending) => {
                pending.on_ready.push(callback);
                true
            }
            None => false,
        }
    }
}

/// 构造期间持有上下文的守卫；离开作用域（包括错误与 panic 路径）时清除该工厂的全部记录
pub(crate) struct ConstructionGuard<'c, 'g> {
    context: &'c mut InternalContext<'g>,
    id: usize,
}

impl<'c, 'g> ConstructionGuard<'c, 'g> {
    pub fn start(context: &'c mut InternalContext<'g>, id: usize) -> Self {
        context.constructions.entry(id).or_default().constructing = true;
        Self { context, id }
    }

    /// 构造器已返回：清除构造标记并交出待设定的替身
    pub fn finish_construction(&mut self) -> Vec<PendingStandIn> {
        match self.context.constructions.get_mut(&self.id) {
            Some(construction) => {
                construction.constructing = false;
                std::mem::take(&mut construction.stand_ins)
            }
            None => Vec::new(),
        }
    }

    /// 记录成员注入期间可复用的引用
    pub fn set_current_reference(&mut self, instance: Instance) {
        self.context
            .constructions
            .entry(self.id)
            .or_default()
            .current_reference = Some(instance);
    }
}

impl<'c, 'g> Deref for ConstructionGuard<'c, 'g> {
    type Target = InternalContext<'g>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<'c, 'g> DerefMut for ConstructionGuard<'c, 'g> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for ConstructionGuard<'_, '_> {
    fn drop(&mut self) {
        self.context.constructions.remove(&self.id);
    }
}
