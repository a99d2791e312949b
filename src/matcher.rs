//! 谓词匹配器，用于类型转换器、拦截器绑定和注入器查询

/// 匹配器
pub trait Matcher<T: ?Sized>: Send + Sync {
    fn matches(&self, candidate: &T) -> bool;
}

impl<T: ?Sized, F> Matcher<T> for F
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, candidate: &T) -> bool {
        self(candidate)
    }
}

/// 匹配任意值
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl<T: ?Sized> Matcher<T> for AnyMatcher {
    fn matches(&self, _candidate: &T) -> bool {
        true
    }
}

/// 仅匹配与给定值相等的候选
#[derive(Debug, Clone)]
pub struct Only<T>(T);

impl<T: PartialEq + Send + Sync> Matcher<T> for Only<T> {
    fn matches(&self, candidate: &T) -> bool {
        &self.0 == candidate
    }
}

pub fn any() -> AnyMatcher {
    AnyMatcher
}

pub fn only<T: PartialEq + Send + Sync>(value: T) -> Only<T> {
    Only(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::TypeLiteral;

    #[test]
    fn test_matchers() {
        let literal = TypeLiteral::of::<i32>();
        assert!(Matcher::<TypeLiteral>::matches(&any(), &literal));
        assert!(only(TypeLiteral::of::<i32>()).matches(&literal));
        assert!(!only(TypeLiteral::of::<i64>()).matches(&literal));

        let starts_with_get = |name: &str| name.starts_with("get");
        assert!(Matcher::<str>::matches(&starts_with_get, "get_name"));
    }

    #[test]
    fn test_only_accepts_values_without_debug() {
        #[derive(PartialEq)]
        struct Port(u16);

        let matcher = only(Port(8080));
        assert!(matcher.matches(&Port(8080)));
        assert!(!matcher.matches(&Port(9090)));
    }
}
