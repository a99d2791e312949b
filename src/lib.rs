//! bindery: 依赖注入容器
//!
//! 模块通过 [`Binder`] 声明绑定，调用被记录为数据（[`Element`]），经过校验、
//! 覆盖合并后冻结为只读的绑定图；[`Injector`] 在其上按键解析实例，处理作用域
//! 与构造器循环依赖，并把所有配置错误汇总进一个 [`CreationError`]。
//!
//! ```
//! use std::sync::Arc;
//! use bindery::{module_fn, Injector, Key, Metadata};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! bindery::type_tag!(English, dyn Greeter);
//!
//! let mut metadata = Metadata::new();
//! metadata
//!     .constructible::<English>()
//!     .default_constructor(|| Ok(English))
//!     .register();
//! metadata.implements::<dyn Greeter, English, _>(|english: Arc<English>| -> Arc<dyn Greeter> { english });
//!
//! let injector = Injector::builder()
//!     .metadata(metadata)
//!     .module(module_fn("greeting", |binder| {
//!         binder.bind_type::<dyn Greeter>().to_type::<English>().as_singleton();
//!         Ok(())
//!     }))
//!     .build()
//!     .unwrap();
//!
//! let greeter: Arc<dyn Greeter> = injector.get_instance(&Key::of::<dyn Greeter>()).unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

pub mod config;
pub mod context;
pub mod convert;
pub mod dependency;
pub mod element;
pub mod errors;
pub mod factory;
pub mod graph;
pub mod injector;
pub mod instance;
pub mod key;
pub mod logging;
pub mod matcher;
pub mod metadata;
mod processor;
pub mod provider;
pub mod recorder;
pub mod scope;
pub mod stand_in;
pub mod stats;

// Re-export commonly used items for convenience
pub use config::{InjectorConfig, Stage};
pub use dependency::{Dependency, InjectionPoint};
pub use element::{Element, Message, Source};
pub use errors::{ConfigError, CreationError, Error, MessageKind, ProvisionError};
pub use graph::{Binding, BindingKind, LoadStrategy};
pub use injector::{Injector, InjectorBuilder};
pub use instance::Instance;
pub use key::{Key, Qualifier, TypeLiteral, TypeTag};
pub use metadata::{Arguments, Metadata};
pub use provider::{provider_fn, Provide, Provider};
pub use recorder::{module_fn, Binder, Module, Modules, Recorder};
pub use scope::{NoScope, Scope, ScopeMarker, Singleton};
pub use stand_in::Forwarder;
pub use stats::InjectorStats;
