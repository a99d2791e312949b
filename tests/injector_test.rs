//! 注入器解析行为的集成测试

#![allow(clippy::uninlined_format_args, clippy::print_stdout)]

use std::any::Any;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bindery::context::InternalContext;
use bindery::factory::InternalFactory;
use bindery::matcher;
use bindery::{
    module_fn, provider_fn, Dependency, Injector, Instance, Key, Metadata, Provider,
    ProvisionError, Scope, ScopeMarker, TypeLiteral,
};

/// 测试用的服务trait
trait Counter: Send + Sync {
    fn id(&self) -> usize;
}

/// 每次构造都会递增全局计数的服务
struct CountingService {
    id: usize,
}

impl Counter for CountingService {
    fn id(&self) -> usize {
        self.id
    }
}

/// 需要成员注入的问候服务
#[derive(Default)]
struct Greeting {
    name: Mutex<Option<String>>,
    punctuation: Mutex<Option<String>>,
}

impl Greeting {
    fn render(&self) -> String {
        format!(
            "hello {}{}",
            self.name.lock().unwrap().as_deref().unwrap_or("nobody"),
            self.punctuation.lock().unwrap().as_deref().unwrap_or("")
        )
    }
}

/// 通过静态成员注入配置的类型
struct GlobalSettings;

static GLOBAL_NAME: Mutex<Option<String>> = Mutex::new(None);

bindery::type_tag!(CountingService, Greeting, GlobalSettings, dyn Counter);

fn counting_metadata(created: Arc<AtomicUsize>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<CountingService>()
        .default_constructor(move || {
            // 放大并发初始化的竞争窗口
            thread::sleep(Duration::from_millis(5));
            Ok(CountingService {
                id: created.fetch_add(1, Ordering::SeqCst),
            })
        })
        .register();
    metadata.implements::<dyn Counter, CountingService, _>(
        |service: Arc<CountingService>| -> Arc<dyn Counter> { service },
    );
    metadata
}

fn greeting_metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<Greeting>()
        .default_constructor(|| Ok(Greeting::default()))
        .member("name", Key::named::<String>("name"), |target: &Greeting, value: String| {
            *target.name.lock().unwrap() = Some(value);
            Ok(())
        })
        .optional_member(
            "punctuation",
            Key::named::<String>("punctuation"),
            |target: &Greeting, value: Option<String>| {
                *target.punctuation.lock().unwrap() = value;
                Ok(())
            },
        )
        .register();
    metadata
        .constructible::<GlobalSettings>()
        .default_constructor(|| Ok(GlobalSettings))
        .static_member("name", Key::named::<String>("name"), |value: String| {
            *GLOBAL_NAME.lock().unwrap() = Some(value);
            Ok(())
        })
        .register();
    metadata
}

#[test]
fn test_singleton_returns_same_instance() {
    let created = Arc::new(AtomicUsize::new(0));
    let injector = Injector::builder()
        .metadata(counting_metadata(created.clone()))
        .module(module_fn("counter", |binder| {
            binder
                .bind_type::<dyn Counter>()
                .to_type::<CountingService>()
                .as_singleton();
            Ok(())
        }))
        .build()
        .unwrap();

    // 单例是惰性的
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let first = injector.instance_of::<Arc<dyn Counter>>().unwrap();
    let second = injector.instance_of::<Arc<dyn Counter>>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let stats = injector.stats();
    assert_eq!(stats.singleton_misses, 1);
    assert_eq!(stats.singleton_hits, 1);
    assert!(stats.performance_summary().contains("Singleton hit rate: 50.00%"));
}

#[test]
fn test_unscoped_returns_distinct_instances() {
    let created = Arc::new(AtomicUsize::new(0));
    let injector = Injector::builder()
        .metadata(counting_metadata(created.clone()))
        .module(module_fn("counter", |binder| {
            binder.bind_type::<dyn Counter>().to_type::<CountingService>();
            Ok(())
        }))
        .build()
        .unwrap();

    let first = injector.instance_of::<Arc<dyn Counter>>().unwrap();
    let second = injector.instance_of::<Arc<dyn Counter>>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.id(), second.id());
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_singleton_created_once() {
    let created = Arc::new(AtomicUsize::new(0));
    let injector = Injector::builder()
        .metadata(counting_metadata(created.clone()))
        .module(module_fn("counter", |binder| {
            binder
                .bind_type::<dyn Counter>()
                .to_type::<CountingService>()
                .as_singleton();
            Ok(())
        }))
        .build()
        .unwrap();

    let results: Vec<Arc<dyn Counter>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| injector.instance_of::<Arc<dyn Counter>>().unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(created.load(Ordering::SeqCst), 1);
    for (index, service) in results.iter().enumerate() {
        assert!(
            Arc::ptr_eq(service, &results[0]),
            "Service {} is a different instance",
            index
        );
    }
    assert_eq!(injector.stats().total_resolutions, 16);
}

#[test]
fn test_provider_binding_with_dependencies() {
    let injector = Injector::builder()
        .module(module_fn("providers", |binder| {
            binder.bind_constant().named("name").to("world");
            binder.bind(Key::named::<String>("greeting")).to_provider_fn(
                vec![Dependency::required(Key::named::<String>("name"))],
                |arguments| Ok(format!("hello {}", arguments.get::<String>(0)?)),
            );
            Ok(())
        }))
        .build()
        .unwrap();

    let greeting: String = injector
        .get_instance(&Key::named::<String>("greeting"))
        .unwrap();
    assert_eq!(greeting, "hello world");
}

#[test]
fn test_provider_failure_is_wrapped() {
    let injector = Injector::builder()
        .module(module_fn("providers", |binder| {
            binder
                .bind_type::<u64>()
                .to_provider(provider_fn(Vec::new(), |_| -> anyhow::Result<u64> {
                    anyhow::bail!("backend unavailable")
                }));
            Ok(())
        }))
        .build()
        .unwrap();

    let error = injector.instance_of::<u64>().unwrap_err();
    assert!(matches!(error, ProvisionError::ProviderFailed { .. }));
    assert!(error.to_string().contains("backend unavailable"));
    assert_eq!(injector.stats().failed_resolutions, 1);
}

#[test]
fn test_provider_key_binding() {
    let injector = Injector::builder()
        .module(module_fn("providers", |binder| {
            binder
                .bind(Key::named::<dyn bindery::Provide>("answers"))
                .to_instance(provider_fn(Vec::new(), |_| Ok(42_i32)));
            binder
                .bind_type::<i32>()
                .to_provider_key(Key::named::<dyn bindery::Provide>("answers"));
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(injector.instance_of::<i32>().unwrap(), 42);
}

#[test]
fn test_provider_handle_from_binder() {
    let captured: Arc<Mutex<Option<Provider<String>>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let injector = Injector::builder()
        .module(module_fn("lookup", move |binder| {
            binder.bind_constant().named("name").to("late");
            let provider = binder.get_provider::<String>(Key::named::<String>("name"));
            // 配置期间不可用
            assert!(matches!(
                provider.get(),
                Err(ProvisionError::ProviderNotReady { .. })
            ));
            *slot.lock().unwrap() = Some(provider);
            Ok(())
        }))
        .build()
        .unwrap();

    let provider = captured.lock().unwrap().take().unwrap();
    assert!(provider.is_ready());
    assert_eq!(provider.get().unwrap(), "late");

    drop(injector);
    assert!(matches!(
        provider.get(),
        Err(ProvisionError::InjectorDropped { .. })
    ));
}

#[test]
fn test_member_injection_on_constructed_instance() {
    let injector = Injector::builder()
        .metadata(greeting_metadata())
        .module(module_fn("names", |binder| {
            binder.bind_constant().named("name").to("bindery");
            Ok(())
        }))
        .build()
        .unwrap();

    let greeting = injector.instance_of::<Arc<Greeting>>().unwrap();
    assert_eq!(greeting.render(), "hello bindery");
}

#[test]
fn test_requested_and_static_injection() {
    let target = Arc::new(Greeting::default());
    let requested = target.clone();
    let injector = Injector::builder()
        .metadata(greeting_metadata())
        .module(module_fn("requests", move |binder| {
            binder.bind_constant().named("name").to("requested");
            binder.bind_constant().named("punctuation").to("!");
            binder.request_injection(
                TypeLiteral::of::<Greeting>(),
                Instance::new(requested.clone()),
            );
            binder.request_static_injection(vec![TypeLiteral::of::<GlobalSettings>()]);
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(target.render(), "hello requested!");
    assert_eq!(GLOBAL_NAME.lock().unwrap().as_deref(), Some("requested"));

    // 构建后也可以对已有实例执行成员注入
    let later = Arc::new(Greeting::default());
    injector
        .inject_members(&TypeLiteral::of::<Greeting>(), &Instance::new(later.clone()))
        .unwrap();
    assert_eq!(later.render(), "hello requested!");
}

/// 记录调用次数的作用域
struct CountingScope {
    calls: Arc<AtomicUsize>,
}

struct CountedFactory {
    inner: Arc<dyn InternalFactory>,
    calls: Arc<AtomicUsize>,
}

impl InternalFactory for CountedFactory {
    fn get(
        &self,
        context: &mut InternalContext<'_>,
        dependency: &Dependency,
    ) -> Result<Instance, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(context, dependency)
    }
}

impl Scope for CountingScope {
    fn scope(&self, _key: &Key, unscoped: Arc<dyn InternalFactory>) -> Arc<dyn InternalFactory> {
        Arc::new(CountedFactory {
            inner: unscoped,
            calls: self.calls.clone(),
        })
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("Counted")
    }
}

#[test]
fn test_custom_scope_by_marker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scope_calls = calls.clone();
    let injector = Injector::builder()
        .module(module_fn("scoped", move |binder| {
            binder.bind_scope(
                ScopeMarker::new("Counted"),
                Arc::new(CountingScope {
                    calls: scope_calls.clone(),
                }),
            );
            binder
                .bind_type::<u32>()
                .to_instance(7_u32)
                .in_scope_marker(ScopeMarker::new("Counted"));
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(injector.instance_of::<u32>().unwrap(), 7);
    assert_eq!(injector.instance_of::<u32>().unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let binding = injector.get_binding(&Key::of::<u32>()).unwrap().unwrap();
    assert_eq!(binding.scope_name(), "Counted");
    assert!(!binding.is_singleton());
    assert_eq!(
        injector.scope_markers(),
        vec![ScopeMarker::new("Counted"), ScopeMarker::SINGLETON]
    );
}

#[test]
fn test_interceptor_bindings_are_recorded() {
    let injector = Injector::builder()
        .module(module_fn("aop", |binder| {
            let interceptor: Arc<dyn Any + Send + Sync> = Arc::new("audit");
            binder.bind_interceptor(
                matcher::only(TypeLiteral::of::<Greeting>()),
                |member: &str| member.starts_with("get"),
                vec![interceptor],
            );
            Ok(())
        }))
        .build()
        .unwrap();

    let bindings = injector.interceptor_bindings();
    assert_eq!(bindings.len(), 1);
    assert!(bindings[0].applies_to(&TypeLiteral::of::<Greeting>(), "get_name"));
    assert!(!bindings[0].applies_to(&TypeLiteral::of::<Greeting>(), "set_name"));
    assert!(!bindings[0].applies_to(&TypeLiteral::of::<GlobalSettings>(), "get_name"));
    assert_eq!(
        bindings[0].interceptors[0].downcast_ref::<&str>(),
        Some(&"audit")
    );
}

#[test]
fn test_optional_dependency_resolves_to_none() {
    let injector = Injector::builder()
        .module(module_fn("optional", |binder| {
            binder.bind_type::<String>().to_provider_fn(
                vec![Dependency::optional(Key::named::<String>("suffix"))],
                |arguments| {
                    let suffix: Option<String> = arguments.get_optional(0)?;
                    Ok(format!("value{}", suffix.unwrap_or_default()))
                },
            );
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(injector.instance_of::<String>().unwrap(), "value");
}
