use std::borrow::Cow;
use std::fmt;

use crate::key::{Key, TypeLiteral};

/// 注入点所在的成员
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    Constructor,
    Field(Cow<'static, str>),
    Method(Cow<'static, str>),
}

/// 注入点：声明类型 + 成员 + 参数位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionPoint {
    declaring_type: TypeLiteral,
    member: Member,
    parameter: usize,
    is_static: bool,
}

impl InjectionPoint {
    pub fn constructor(declaring_type: TypeLiteral, parameter: usize) -> Self {
        Self {
            declaring_type,
            member: Member::Constructor,
            parameter,
            is_static: false,
        }
    }

    pub fn member(declaring_type: TypeLiteral, member: Member, is_static: bool) -> Self {
        Self {
            declaring_type,
            member,
            parameter: 0,
            is_static,
        }
    }

    pub fn declaring_type(&self) -> &TypeLiteral {
        &self.declaring_type
    }

    pub fn member_kind(&self) -> &Member {
        &self.member
    }

    pub fn parameter(&self) -> usize {
        self.parameter
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_static { "static " } else { "" };
        match &self.member {
            Member::Constructor => write!(
                f,
                "the {}th parameter of {}::new()",
                self.parameter, self.declaring_type
            ),
            Member::Field(name) => write!(f, "{}field {}.{}", prefix, self.declaring_type, name),
            Member::Method(name) => write!(
                f,
                "the {}th parameter of {}method {}::{}()",
                self.parameter, prefix, self.declaring_type, name
            ),
        }
    }
}

/// 依赖：被请求的键、是否可选以及来源注入点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    key: Key,
    optional: bool,
    injection_point: Option<InjectionPoint>,
}

impl Dependency {
    pub fn required(key: Key) -> Self {
        Self {
            key,
            optional: false,
            injection_point: None,
        }
    }

    pub fn optional(key: Key) -> Self {
        Self {
            key,
            optional: true,
            injection_point: None,
        }
    }

    pub fn at(mut self, injection_point: InjectionPoint) -> Self {
        self.injection_point = Some(injection_point);
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn injection_point(&self) -> Option<&InjectionPoint> {
        self.injection_point.as_ref()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(point) = &self.injection_point {
            write!(f, " for {}", point)?;
        }
        Ok(())
    }
}
