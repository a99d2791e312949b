//! 常量类型转换
//!
//! 常量总是以字符串绑定，请求 `Key<T, q>` 时由匹配的转换器把 `Key<String, q>`
//! 的值转换为目标类型。内置转换器覆盖全部基础类型。

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::element::{Source, TypeConverterBinding};
use crate::instance::Instance;
use crate::key::{Primitive, TypeLiteral};

/// 类型转换器
pub trait TypeConverter: Send + Sync {
    fn convert(&self, value: &str, to: &TypeLiteral) -> anyhow::Result<Instance>;
}

impl<F> TypeConverter for F
where
    F: Fn(&str, &TypeLiteral) -> anyhow::Result<Instance> + Send + Sync,
{
    fn convert(&self, value: &str, to: &TypeLiteral) -> anyhow::Result<Instance> {
        self(value, to)
    }
}

/// 基础类型转换器
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveConverter;

fn parse<T>(value: &str) -> anyhow::Result<Instance>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .with_context(|| format!("'{}' is not a valid {}", value, std::any::type_name::<T>()))?;
    Ok(Instance::new(parsed))
}

impl TypeConverter for PrimitiveConverter {
    fn convert(&self, value: &str, to: &TypeLiteral) -> anyhow::Result<Instance> {
        let primitive = to
            .as_primitive()
            .ok_or_else(|| anyhow!("{} is not a primitive type", to))?;
        match primitive {
            Primitive::Bool => parse::<bool>(value),
            Primitive::Char => {
                let trimmed = value.trim();
                let mut chars = trimmed.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Instance::new(c)),
                    _ => Err(anyhow!("Length != 1")),
                }
            }
            Primitive::I8 => parse::<i8>(value),
            Primitive::I16 => parse::<i16>(value),
            Primitive::I32 => parse::<i32>(value),
            Primitive::I64 => parse::<i64>(value),
            Primitive::I128 => parse::<i128>(value),
            Primitive::Isize => parse::<isize>(value),
            Primitive::U8 => parse::<u8>(value),
            Primitive::U16 => parse::<u16>(value),
            Primitive::U32 => parse::<u32>(value),
            Primitive::U64 => parse::<u64>(value),
            Primitive::U128 => parse::<u128>(value),
            Primitive::Usize => parse::<usize>(value),
            Primitive::F32 => parse::<f32>(value),
            Primitive::F64 => parse::<f64>(value),
            Primitive::Str => Ok(Instance::new(value.to_string())),
        }
    }
}

/// 内置转换器绑定
pub(crate) fn builtin_converters() -> Vec<TypeConverterBinding> {
    vec![TypeConverterBinding {
        source: Source::Module("bindery::convert::PrimitiveConverter".into()),
        type_matcher: Arc::new(|literal: &TypeLiteral| {
            matches!(literal.as_primitive(), Some(primitive) if primitive != Primitive::Str)
        }),
        converter: Arc::new(PrimitiveConverter),
    }]
}

/// 转换失败原因
#[derive(Debug)]
pub(crate) enum ConversionFailure {
    NoConverter,
    Ambiguous(String),
    Failed(anyhow::Error),
}

impl ConversionFailure {
    pub fn reason(&self, to: &TypeLiteral) -> String {
        match self {
            ConversionFailure::NoConverter => format!("No converter is registered for {}", to),
            ConversionFailure::Ambiguous(sources) => {
                format!("Multiple converters can convert to {}: {}", to, sources)
            }
            ConversionFailure::Failed(error) => format!("{:#}", error),
        }
    }
}

/// 在转换器列表中找到唯一匹配者并转换
pub(crate) fn convert_constant(
    converters: &[TypeConverterBinding],
    value: &str,
    to: &TypeLiteral,
) -> Result<Instance, ConversionFailure> {
    let mut matching = converters
        .iter()
        .filter(|binding| binding.type_matcher.matches(to));
    let Some(first) = matching.next() else {
        return Err(ConversionFailure::NoConverter);
    };
    let others: Vec<&TypeConverterBinding> = matching.collect();
    if !others.is_empty() {
        let sources = std::iter::once(first)
            .chain(others)
            .map(|binding| binding.source.to_string())
            .collect::<Vec<_>>()
            .join(" and ");
        return Err(ConversionFailure::Ambiguous(sources));
    }
    first
        .converter
        .convert(value, to)
        .map_err(ConversionFailure::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_conversions() {
        let converter = PrimitiveConverter;
        let port = converter.convert("8080", &TypeLiteral::of::<i32>()).unwrap();
        assert_eq!(port.downcast::<i32>(), Some(8080));

        let flag = converter.convert(" true ", &TypeLiteral::of::<bool>()).unwrap();
        assert_eq!(flag.downcast::<bool>(), Some(true));

        let ratio = converter.convert("0.5", &TypeLiteral::of::<f64>()).unwrap();
        assert_eq!(ratio.downcast::<f64>(), Some(0.5));

        assert!(converter.convert("eighty", &TypeLiteral::of::<i32>()).is_err());
    }

    #[test]
    fn test_char_requires_single_character() {
        let converter = PrimitiveConverter;
        let c = converter.convert(" x ", &TypeLiteral::of::<char>()).unwrap();
        assert_eq!(c.downcast::<char>(), Some('x'));

        let error = converter.convert("xy", &TypeLiteral::of::<char>()).unwrap_err();
        assert_eq!(error.to_string(), "Length != 1");
    }

    #[test]
    fn test_ambiguous_converters() {
        let mut converters = builtin_converters();
        converters.push(TypeConverterBinding {
            source: Source::Module("CustomIntConverter".into()),
            type_matcher: Arc::new(|literal: &TypeLiteral| *literal == TypeLiteral::of::<i32>()),
            converter: Arc::new(|value: &str, _: &TypeLiteral| -> anyhow::Result<Instance> {
                Ok(Instance::new(value.len() as i32))
            }),
        });

        let result = convert_constant(&converters, "1", &TypeLiteral::of::<i32>());
        assert!(matches!(result, Err(ConversionFailure::Ambiguous(ref sources)) if sources.contains("CustomIntConverter")));

        let result = convert_constant(&converters, "1", &TypeLiteral::of::<i64>()).unwrap();
        assert_eq!(result.downcast::<i64>(), Some(1));
    }

    #[test]
    fn test_no_converter_for_named_type() {
        let converters = builtin_converters();
        let result = convert_constant(&converters, "x", &TypeLiteral::named("Url"));
        assert!(matches!(result, Err(ConversionFailure::NoConverter)));
    }
}
