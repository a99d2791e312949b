use std::fmt;

use thiserror::Error;

use crate::dependency::InjectionPoint;
use crate::element::{Message, Source};
use crate::key::{Key, TypeLiteral};

/// 诊断消息分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    MissingBinding,
    DuplicateAnnotationOnSameElement,
    TargetSetMoreThanOnce,
    ScopeSetMoreThanOnce,
    ConstantSetMoreThanOnce,
    ConstantConversionFailure,
    TooManyAnnotatedConstructors,
    NoUsableConstructor,
    ModuleConfigureThrew,
    UnresolvableCircularDependency,
    BindingAlreadySet,
    DuplicateScope,
    ScopeNotFound,
    MissingConstantValue,
    MissingQualifier,
    MissingImplementation,
    RecursiveBinding,
    NotASubtype,
    InjectionFailed,
    Custom,
}

/// 解析期错误，在 `get_instance` 等调用中立即返回
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("No implementation for {key} was bound{}", requested_by_suffix(.requested_by))]
    MissingBinding {
        key: Key,
        requested_by: Option<InjectionPoint>,
    },
    #[error("Tried proxying {expected} to support a circular dependency, but no stand-in is registered for it (while constructing {key})")]
    UnresolvableCircularDependency { key: Key, expected: TypeLiteral },
    #[error("Error converting '{value}' bound to {source_key} into {key}. Reason: {reason}")]
    ConstantConversion {
        key: Key,
        source_key: Key,
        value: String,
        reason: String,
    },
    #[error("Error in custom provider for {key}: {source}")]
    ProviderFailed {
        key: Key,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error constructing {type_literal}: {source}")]
    ConstructionFailed {
        type_literal: TypeLiteral,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error injecting member {member} of {type_literal}: {source}")]
    MemberInjectionFailed {
        type_literal: TypeLiteral,
        member: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Binding for {key} produced {actual}, which is not a {expected}")]
    TypeMismatch {
        key: Key,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Argument {index} of {owner} is not available")]
    ArgumentUnavailable { owner: String, index: usize },
    #[error("{from} is not registered as an implementation of {to}")]
    NotASubtype { from: TypeLiteral, to: TypeLiteral },
    #[error("Invalid just-in-time binding for {key}: {reason}")]
    InvalidBinding {
        key: Key,
        kind: MessageKind,
        reason: String,
    },
    #[error("This provider cannot be used until the Injector has been created. ({key})")]
    ProviderNotReady { key: Key },
    #[error("The injector behind the provider for {key} has been dropped")]
    InjectorDropped { key: Key },
    #[error("Resolution of {key} exceeded the maximum depth of {depth}")]
    ResolutionTooDeep { key: Key, depth: usize },
}

fn requested_by_suffix(requested_by: &Option<InjectionPoint>) -> String {
    match requested_by {
        Some(point) => format!(" (required by {})", point),
        None => ".".to_string(),
    }
}

impl ProvisionError {
    /// 对应的诊断分类，用于在构建阶段折叠进 [`CreationError`]
    pub fn kind(&self) -> MessageKind {
        match self {
            ProvisionError::MissingBinding { .. } => MessageKind::MissingBinding,
            ProvisionError::UnresolvableCircularDependency { .. } => {
                MessageKind::UnresolvableCircularDependency
            }
            ProvisionError::ConstantConversion { .. } => MessageKind::ConstantConversionFailure,
            ProvisionError::NotASubtype { .. } => MessageKind::NotASubtype,
            ProvisionError::InvalidBinding { kind, .. } => *kind,
            _ => MessageKind::InjectionFailed,
        }
    }
}

/// 构建注入器失败：汇总全部配置错误
#[derive(Debug, Error)]
#[error("{}", render_messages(.messages))]
pub struct CreationError {
    messages: Vec<Message>,
}

impl CreationError {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        self.messages.iter().map(Message::kind).collect()
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.messages.iter().any(|message| message.kind() == kind)
    }
}

fn render_messages(messages: &[Message]) -> String {
    let mut out = String::from("Unable to create injector, see the following errors:\n\n");
    for (index, message) in messages.iter().enumerate() {
        out.push_str(&format!("{}) {}\n  at {}\n", index + 1, message.text(), message.source()));
        if let Some(cause) = message.cause() {
            out.push_str(&format!("  Caused by: {}\n", cause));
        }
        out.push('\n');
    }
    let noun = if messages.len() == 1 { "error" } else { "errors" };
    out.push_str(&format!("{} {}", messages.len(), noun));
    out
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for {field}")]
    InvalidValue { field: String, value: String },
}

/// 顶层错误
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Creation(#[from] CreationError),
    #[error("Provision error: {0}")]
    Provision(#[from] ProvisionError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// 构建阶段的错误收集器
#[derive(Debug, Default)]
pub(crate) struct Errors {
    messages: Vec<Message>,
}

impl Errors {
    pub fn add(&mut self, message: Message) {
        tracing::debug!(kind = ?message.kind(), source = %message.source(), "{}", message.text());
        self.messages.push(message);
    }

    pub fn report(&mut self, kind: MessageKind, source: &Source, text: impl Into<String>) {
        self.add(Message::new(kind, source.clone(), text));
    }

    pub fn provision(&mut self, source: &Source, error: ProvisionError) {
        let text = error.to_string();
        let mut message = Message::new(error.kind(), source.clone(), text);
        if let ProvisionError::MissingBinding {
            requested_by: Some(point),
            ..
        } = &error
        {
            message = message.with_injection_point(point.clone());
        }
        self.add(message.with_cause(anyhow::Error::new(error)));
    }

    pub fn target_set_more_than_once(&mut self, source: &Source) {
        self.report(
            MessageKind::TargetSetMoreThanOnce,
            source,
            "Implementation is set more than once.",
        );
    }

    pub fn scope_set_more_than_once(&mut self, source: &Source) {
        self.report(MessageKind::ScopeSetMoreThanOnce, source, "Scope is set more than once.");
    }

    pub fn duplicate_annotation(&mut self, source: &Source) {
        self.report(
            MessageKind::DuplicateAnnotationOnSameElement,
            source,
            "More than one annotation is specified for this binding.",
        );
    }

    pub fn constant_set_more_than_once(&mut self, source: &Source) {
        self.report(
            MessageKind::ConstantSetMoreThanOnce,
            source,
            "Constant value is set more than once.",
        );
    }

    pub fn missing_constant_value(&mut self, source: &Source) {
        self.report(
            MessageKind::MissingConstantValue,
            source,
            "Missing constant value. Please call to(...).",
        );
    }

    pub fn missing_qualifier(&mut self, source: &Source) {
        self.report(MessageKind::MissingQualifier, source, "Missing binding annotation.");
    }

    pub fn binding_already_set(&mut self, source: &Source, key: &Key, original: &Source) {
        self.report(
            MessageKind::BindingAlreadySet,
            source,
            format!("A binding to {} was already configured at {}.", key, original),
        );
    }

    pub fn duplicate_scope(&mut self, source: &Source, marker: impl fmt::Display, existing: &str, replacement: &str) {
        self.report(
            MessageKind::DuplicateScope,
            source,
            format!(
                "Scope {} is already bound to {}. Cannot bind {}.",
                marker, existing, replacement
            ),
        );
    }

    pub fn scope_not_found(&mut self, source: &Source, marker: impl fmt::Display) {
        self.report(
            MessageKind::ScopeNotFound,
            source,
            format!("No scope is bound to {}.", marker),
        );
    }

    pub fn recursive_binding(&mut self, source: &Source) {
        self.report(MessageKind::RecursiveBinding, source, "Binding points to itself.");
    }

    pub fn not_a_subtype(&mut self, source: &Source, from: &TypeLiteral, to: &TypeLiteral) {
        self.provision(
            source,
            ProvisionError::NotASubtype {
                from: from.clone(),
                to: to.clone(),
            },
        );
    }

    pub fn missing_implementation(&mut self, source: &Source, key: &Key) {
        self.report(
            MessageKind::MissingImplementation,
            source,
            format!("No implementation for {} was bound.", key),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_error_numbers_messages() {
        let mut errors = Errors::default();
        errors.target_set_more_than_once(&Source::Module("AppModule".into()));
        errors.scope_set_more_than_once(&Source::Unknown);

        let error = CreationError::new(errors.into_messages());
        let rendered = error.to_string();

        assert!(rendered.contains("1) Implementation is set more than once.\n  at AppModule"));
        assert!(rendered.contains("2) Scope is set more than once."));
        assert!(rendered.ends_with("2 errors"));
        assert_eq!(
            error.kinds(),
            vec![MessageKind::TargetSetMoreThanOnce, MessageKind::ScopeSetMoreThanOnce]
        );
    }

    #[test]
    fn test_missing_binding_names_requester() {
        let error = ProvisionError::MissingBinding {
            key: Key::of::<i32>(),
            requested_by: Some(InjectionPoint::constructor(TypeLiteral::named("Server"), 0)),
        };
        assert_eq!(
            error.to_string(),
            "No implementation for Key[type=i32] was bound (required by the 0th parameter of Server::new())"
        );
        assert_eq!(error.kind(), MessageKind::MissingBinding);
    }

    #[test]
    fn test_provision_error_folds_into_message_with_cause() {
        let mut errors = Errors::default();
        errors.provision(
            &Source::Unknown,
            ProvisionError::ProviderFailed {
                key: Key::of::<String>(),
                source: anyhow::anyhow!("boom"),
            },
        );

        let messages = errors.into_messages();
        assert_eq!(messages[0].kind(), MessageKind::InjectionFailed);
        assert!(messages[0].cause().is_some());
        assert!(messages[0].text().contains("boom"));
    }
}
