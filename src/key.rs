//! 绑定键与类型字面量
//!
//! Rust 没有运行时反射，因此类型身份由显式的 [`TypeTag`] 注册表给出：
//! 基础类型和常用容器已内置，用户类型与 trait 对象通过 [`type_tag!`] 宏登记。
//! 类型参数是类型形状的一部分，`Vec<String>` 与 `Vec<i32>` 是不同的字面量。

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// 内置基础类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F32,
    F64,
    Str,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::I128 => "i128",
            Primitive::Isize => "isize",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::U128 => "u128",
            Primitive::Usize => "usize",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Str => "String",
        }
    }
}

/// 类型字面量：完整的类型形状（含类型参数）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeLiteral {
    Primitive(Primitive),
    Named(Cow<'static, str>),
    Parameterized {
        raw: Cow<'static, str>,
        args: Vec<TypeLiteral>,
    },
}

impl TypeLiteral {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        TypeLiteral::Named(name.into())
    }

    pub fn parameterized(raw: impl Into<Cow<'static, str>>, args: Vec<TypeLiteral>) -> Self {
        TypeLiteral::Parameterized {
            raw: raw.into(),
            args,
        }
    }

    /// 通过类型注册表取得字面量
    pub fn of<T: TypeTag + ?Sized>() -> Self {
        T::type_literal()
    }

    /// 去掉类型参数后的原始名称
    pub fn raw_name(&self) -> &str {
        match self {
            TypeLiteral::Primitive(primitive) => primitive.name(),
            TypeLiteral::Named(name) => name,
            TypeLiteral::Parameterized { raw, .. } => raw,
        }
    }

    pub fn type_arguments(&self) -> &[TypeLiteral] {
        match self {
            TypeLiteral::Parameterized { args, .. } => args,
            _ => &[],
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            TypeLiteral::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TypeLiteral::Primitive(Primitive::Str))
    }
}

impl fmt::Display for TypeLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeLiteral::Primitive(primitive) => f.write_str(primitive.name()),
            TypeLiteral::Named(name) => f.write_str(name),
            TypeLiteral::Parameterized { raw, args } => {
                write!(f, "{}<", raw)?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// 类型注册表
///
/// 为类型提供稳定的 [`TypeLiteral`]。`Arc<T>` 是透明的：`Arc<dyn Service>`
/// 与 `dyn Service` 共享同一个字面量，因为容器中的实例句柄总是以 `Arc` 传递。
pub trait TypeTag {
    fn type_literal() -> TypeLiteral;
}

macro_rules! impl_primitive_tags {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl TypeTag for $ty {
                fn type_literal() -> TypeLiteral {
                    TypeLiteral::Primitive(Primitive::$variant)
                }
            }
        )+
    };
}

impl_primitive_tags! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl<T: TypeTag + ?Sized> TypeTag for Arc<T> {
    fn type_literal() -> TypeLiteral {
        T::type_literal()
    }
}

impl<T: TypeTag + ?Sized> TypeTag for Box<T> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("Box", vec![T::type_literal()])
    }
}

impl<T: TypeTag> TypeTag for Vec<T> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("Vec", vec![T::type_literal()])
    }
}

impl<T: TypeTag> TypeTag for Option<T> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("Option", vec![T::type_literal()])
    }
}

impl<T: TypeTag, S> TypeTag for HashSet<T, S> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("HashSet", vec![T::type_literal()])
    }
}

impl<K: TypeTag, V: TypeTag, S> TypeTag for HashMap<K, V, S> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("HashMap", vec![K::type_literal(), V::type_literal()])
    }
}

impl<K: TypeTag, V: TypeTag> TypeTag for BTreeMap<K, V> {
    fn type_literal() -> TypeLiteral {
        TypeLiteral::parameterized("BTreeMap", vec![K::type_literal(), V::type_literal()])
    }
}

/// 为用户类型或 trait 对象登记类型字面量
///
/// 默认以类型的书写形式（`stringify!`）作为名称，因此不同模块中的同名类型会得到
/// 相同的字面量并互相冲突；这种情况用 `类型 => "名称"` 显式指定。
///
/// ```
/// trait Greeter: Send + Sync {}
/// struct EnglishGreeter;
/// bindery::type_tag!(EnglishGreeter, dyn Greeter);
///
/// mod billing {
///     pub struct Config;
/// }
/// mod shipping {
///     pub struct Config;
/// }
/// bindery::type_tag!(billing::Config => "billing::Config", shipping::Config => "shipping::Config");
/// ```
#[macro_export]
macro_rules! type_tag {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl $crate::key::TypeTag for $ty {
                fn type_literal() -> $crate::key::TypeLiteral {
                    $crate::key::TypeLiteral::named($name)
                }
            }
        )+
    };
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::key::TypeTag for $ty {
                fn type_literal() -> $crate::key::TypeLiteral {
                    $crate::key::TypeLiteral::named(stringify!($ty))
                }
            }
        )+
    };
}

/// 绑定限定符
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// 带值的命名限定符
    Named(String),
    /// 无值的标记限定符
    Marker(Cow<'static, str>),
}

impl Qualifier {
    pub fn named(value: impl Into<String>) -> Self {
        Qualifier::Named(value.into())
    }

    pub fn marker(name: impl Into<Cow<'static, str>>) -> Self {
        Qualifier::Marker(name.into())
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Named(value) => write!(f, "@Named(value={})", value),
            Qualifier::Marker(name) => write!(f, "@{}", name),
        }
    }
}

/// 绑定键 = 类型字面量 + 可选限定符
///
/// 相等与哈希是结构化的：独立构造的两个键只要形状相同即相等。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    type_literal: TypeLiteral,
    qualifier: Option<Qualifier>,
}

impl Key {
    pub fn new(type_literal: TypeLiteral) -> Self {
        Self {
            type_literal,
            qualifier: None,
        }
    }

    pub fn of<T: TypeTag + ?Sized>() -> Self {
        Self::new(T::type_literal())
    }

    /// `Key::of::<T>()` 加上 `Named` 限定符
    pub fn named<T: TypeTag + ?Sized>(name: impl Into<String>) -> Self {
        Self::of::<T>().annotated_with(Qualifier::named(name))
    }

    pub fn annotated_with(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn type_literal(&self) -> &TypeLiteral {
        &self.type_literal
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// 保留限定符，替换类型
    pub fn of_type(&self, type_literal: TypeLiteral) -> Key {
        Key {
            type_literal,
            qualifier: self.qualifier.clone(),
        }
    }

    pub fn without_qualifier(&self) -> Key {
        Key::new(self.type_literal.clone())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "Key[type={}, qualifier={}]", self.type_literal, qualifier),
            None => write!(f, "Key[type={}]", self.type_literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    trait Service: Send + Sync {}
    struct ServiceImpl;
    crate::type_tag!(ServiceImpl, dyn Service);

    mod billing {
        pub struct Config;
    }
    mod shipping {
        pub struct Config;
    }
    crate::type_tag!(billing::Config => "billing::Config", shipping::Config => "shipping::Config");

    fn hash_of(key: &Key) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let first = Key::of::<Vec<String>>().annotated_with(Qualifier::marker("Foo"));
        let second = Key::new(TypeLiteral::parameterized(
            "Vec",
            vec![TypeLiteral::Primitive(Primitive::Str)],
        ))
        .annotated_with(Qualifier::marker("Foo"));

        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));
    }

    #[test]
    fn test_type_arguments_are_part_of_identity() {
        assert_ne!(Key::of::<Vec<String>>(), Key::of::<Vec<i32>>());
        assert_ne!(Key::named::<String>("port"), Key::named::<String>("host"));
        assert_ne!(Key::named::<String>("port"), Key::of::<String>());
    }

    #[test]
    fn test_arc_is_transparent() {
        assert_eq!(Key::of::<Arc<dyn Service>>(), Key::of::<dyn Service>());
        assert_eq!(Key::of::<Arc<ServiceImpl>>().to_string(), "Key[type=ServiceImpl]");
    }

    #[test]
    fn test_explicit_names_separate_same_named_types() {
        assert_ne!(Key::of::<billing::Config>(), Key::of::<shipping::Config>());
        assert_eq!(TypeLiteral::of::<billing::Config>().raw_name(), "billing::Config");
        assert_eq!(
            Key::of::<Arc<shipping::Config>>().to_string(),
            "Key[type=shipping::Config]"
        );
    }

    #[test]
    fn test_of_type_keeps_qualifier() {
        let key = Key::named::<String>("port");
        let converted = key.of_type(TypeLiteral::of::<i32>());

        assert_eq!(converted, Key::named::<i32>("port"));
        assert_eq!(converted.without_qualifier(), Key::of::<i32>());
    }

    #[test]
    fn test_display() {
        let key = Key::of::<HashMap<String, Vec<i64>>>().annotated_with(Qualifier::named("limits"));
        assert_eq!(
            key.to_string(),
            "Key[type=HashMap<String, Vec<i64>>, qualifier=@Named(value=limits)]"
        );
        assert_eq!(TypeLiteral::of::<dyn Service>().raw_name(), "dyn Service");
    }
}
