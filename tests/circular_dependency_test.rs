//! 构造器循环依赖的集成测试

#![allow(clippy::uninlined_format_args, clippy::print_stdout)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bindery::stand_in::Forwarder;
use bindery::{module_fn, Dependency, Injector, Key, Metadata, ProvisionError, TypeLiteral};

trait ServiceA: Send + Sync {
    fn name(&self) -> String;
    fn partner(&self) -> String;
    /// 真实实现的地址，替身转发后得到被代理对象的地址
    fn address(&self) -> usize;
}

trait ServiceB: Send + Sync {
    fn name(&self) -> String;
    fn partner(&self) -> String;
    fn partner_address(&self) -> usize;
}

struct AImpl {
    b: Arc<dyn ServiceB>,
}

impl ServiceA for AImpl {
    fn name(&self) -> String {
        "A".to_string()
    }

    fn partner(&self) -> String {
        self.b.name()
    }

    fn address(&self) -> usize {
        self as *const AImpl as usize
    }
}

struct BImpl {
    a: Arc<dyn ServiceA>,
}

impl ServiceB for BImpl {
    fn name(&self) -> String {
        "B".to_string()
    }

    fn partner(&self) -> String {
        self.a.name()
    }

    fn partner_address(&self) -> usize {
        self.a.address()
    }
}

/// `ServiceA` 的转发替身
struct ServiceAStandIn(Forwarder<dyn ServiceA>);

impl ServiceA for ServiceAStandIn {
    fn name(&self) -> String {
        self.0.get().name()
    }

    fn partner(&self) -> String {
        self.0.get().partner()
    }

    fn address(&self) -> usize {
        self.0.get().address()
    }
}

struct ServiceBStandIn(Forwarder<dyn ServiceB>);

impl ServiceB for ServiceBStandIn {
    fn name(&self) -> String {
        self.0.get().name()
    }

    fn partner(&self) -> String {
        self.0.get().partner()
    }

    fn partner_address(&self) -> usize {
        self.0.get().partner_address()
    }
}

/// 互相依赖的具体类型，没有接口可以代理
struct Left {
    _right: Arc<Right>,
}

struct Right {
    _left: Arc<Left>,
}

/// 通过成员注入引用自身的类型
#[derive(Default)]
struct Node {
    me: Mutex<Option<Arc<Node>>>,
}

bindery::type_tag!(AImpl, BImpl, Left, Right, Node, dyn ServiceA, dyn ServiceB);

/// `failures` 为 AImpl 构造器在拿到 B 之后还要失败的次数
fn cycle_metadata(with_stand_in: bool, failures: Arc<AtomicUsize>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<AImpl>()
        .constructor(
            vec![Dependency::required(Key::of::<dyn ServiceB>())],
            move |arguments| {
                let b = arguments.get(0)?;
                if failures.load(Ordering::SeqCst) > 0 {
                    failures.fetch_sub(1, Ordering::SeqCst);
                    anyhow::bail!("AImpl refused its ServiceB");
                }
                Ok(AImpl { b })
            },
        )
        .register();
    metadata
        .constructible::<BImpl>()
        .constructor(
            vec![Dependency::required(Key::of::<dyn ServiceA>())],
            |arguments| Ok(BImpl { a: arguments.get(0)? }),
        )
        .register();
    metadata
        .implements::<dyn ServiceA, AImpl, _>(|a: Arc<AImpl>| -> Arc<dyn ServiceA> { a })
        .implements::<dyn ServiceB, BImpl, _>(|b: Arc<BImpl>| -> Arc<dyn ServiceB> { b });
    if with_stand_in {
        metadata.stand_in::<dyn ServiceA, _>(|forwarder| -> Arc<dyn ServiceA> {
            Arc::new(ServiceAStandIn(forwarder))
        });
        metadata.stand_in::<dyn ServiceB, _>(|forwarder| -> Arc<dyn ServiceB> {
            Arc::new(ServiceBStandIn(forwarder))
        });
    }
    metadata
}

fn cycle_injector(with_stand_in: bool) -> Injector {
    failing_cycle_injector(with_stand_in, 0)
}

fn failing_cycle_injector(with_stand_in: bool, failures: usize) -> Injector {
    Injector::builder()
        .metadata(cycle_metadata(
            with_stand_in,
            Arc::new(AtomicUsize::new(failures)),
        ))
        .module(module_fn("cycle", |binder| {
            binder
                .bind_type::<dyn ServiceA>()
                .to_type::<AImpl>()
                .as_singleton();
            binder.bind_type::<dyn ServiceB>().to_type::<BImpl>();
            Ok(())
        }))
        .build()
        .unwrap()
}

#[test]
fn test_singleton_cycle_resolved_through_stand_in() {
    let injector = cycle_injector(true);

    let a = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();
    assert_eq!(a.name(), "A");
    assert_eq!(a.partner(), "B");

    // B 持有的是替身，替身转发给真实的单例
    let b = injector.instance_of::<Arc<dyn ServiceB>>().unwrap();
    assert_eq!(b.partner(), "A");

    let again = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(injector.stats().stand_ins_created, 1);
}

#[test]
fn test_cycle_entered_from_other_side() {
    let injector = cycle_injector(true);

    let b = injector.instance_of::<Arc<dyn ServiceB>>().unwrap();
    assert_eq!(b.partner(), "A");
    let a = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();
    assert_eq!(a.partner(), "B");
    assert_eq!(injector.stats().stand_ins_created, 1);
}

#[test]
fn test_direct_resolution_shares_instance_with_singleton() {
    let injector = cycle_injector(true);

    let a_impl = injector.instance_of::<Arc<AImpl>>().unwrap();
    let a = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();

    // 单例缓存的是构造完成的真实实例，而不是 B 持有的替身
    assert_eq!(a.address(), Arc::as_ptr(&a_impl) as usize);
    assert_eq!(a_impl.b.partner_address(), a.address());
    assert_eq!(a_impl.b.partner(), "A");

    let again = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(injector.stats().stand_ins_created, 1);
}

#[test]
fn test_failed_construction_leaves_no_stand_in_cached() {
    let injector = failing_cycle_injector(true, 1);

    let error = injector.instance_of::<Arc<dyn ServiceA>>().err().unwrap();
    assert!(matches!(error, ProvisionError::ConstructionFailed { .. }));
    assert!(error.to_string().contains("AImpl refused its ServiceB"));

    // 第二次解析重新构造，得到的实例可以直接使用
    let a = injector.instance_of::<Arc<dyn ServiceA>>().unwrap();
    assert_eq!(a.name(), "A");
    assert_eq!(a.partner(), "B");
    assert_eq!(a.address(), injector.instance_of::<Arc<dyn ServiceA>>().unwrap().address());
}

#[test]
fn test_repeated_construction_failure_keeps_failing() {
    let injector = failing_cycle_injector(true, usize::MAX);

    assert!(injector.instance_of::<Arc<dyn ServiceA>>().is_err());
    assert!(injector.instance_of::<Arc<dyn ServiceA>>().is_err());
    assert_eq!(injector.stats().failed_resolutions, 2);
}

#[test]
fn test_cycle_without_stand_in_is_unresolvable() {
    let injector = cycle_injector(false);

    let error = injector.instance_of::<Arc<dyn ServiceA>>().err().unwrap();
    assert!(
        matches!(
            &error,
            ProvisionError::UnresolvableCircularDependency { expected, .. }
                if *expected == TypeLiteral::of::<dyn ServiceA>()
        ),
        "unexpected error: {}",
        error
    );

    // 失败后上下文已清理，重复请求得到相同的错误而不是死锁
    assert!(injector.instance_of::<Arc<dyn ServiceA>>().is_err());
}

#[test]
fn test_concrete_cycle_is_unresolvable() {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<Left>()
        .constructor(
            vec![Dependency::required(Key::of::<Right>())],
            |arguments| Ok(Left { _right: arguments.get(0)? }),
        )
        .register();
    metadata
        .constructible::<Right>()
        .constructor(
            vec![Dependency::required(Key::of::<Left>())],
            |arguments| Ok(Right { _left: arguments.get(0)? }),
        )
        .register();
    let injector = Injector::builder().metadata(metadata).build().unwrap();

    let error = injector.instance_of::<Arc<Left>>().err().unwrap();
    assert!(matches!(
        error,
        ProvisionError::UnresolvableCircularDependency { .. }
    ));
    assert!(error.to_string().contains("while constructing Key[type=Left]"));
}

#[test]
fn test_member_injection_reuses_current_reference() {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<Node>()
        .default_constructor(|| Ok(Node::default()))
        .member("me", Key::of::<Node>(), |target: &Node, value: Arc<Node>| {
            *target.me.lock().unwrap() = Some(value);
            Ok(())
        })
        .register();
    let injector = Injector::builder().metadata(metadata).build().unwrap();

    let node = injector.instance_of::<Arc<Node>>().unwrap();
    let me = node.me.lock().unwrap().take().unwrap();
    assert!(Arc::ptr_eq(&node, &me));
}
