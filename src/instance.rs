use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

/// 类型擦除的实例句柄
///
/// 负载是调用方期望的"句柄类型"本身，例如 `Arc<ServiceImpl>`、
/// `Arc<dyn Service>` 或 `i32`，取出时按该类型向下转型并克隆。
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: any::type_name::<T>(),
        }
    }

    /// 取出句柄的克隆；类型不符时返回 `None`
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// 负载的 Rust 类型名，用于诊断
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 两个句柄是否指向同一份负载
    pub fn same(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_clones_handle() {
        let shared = Arc::new(String::from("payload"));
        let instance = Instance::new(shared.clone());

        let out = instance.downcast::<Arc<String>>().unwrap();
        assert!(Arc::ptr_eq(&shared, &out));
        assert!(instance.downcast::<String>().is_none());
        assert!(instance.is::<Arc<String>>());
    }

    #[test]
    fn test_same() {
        let instance = Instance::new(7_i32);
        let copy = instance.clone();
        assert!(instance.same(&copy));
        assert!(!instance.same(&Instance::new(7_i32)));
        assert_eq!(instance.type_name(), "i32");
    }
}
