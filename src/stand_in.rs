//! 循环依赖的转发替身
//!
//! 当构造器在同一次解析中被重入时，注入器交出一个接口类型的替身，
//! 替身把调用转发给尚未构造完成的真实实例；构造完成后委托被一次性设定。
//!
//! ```
//! use std::sync::Arc;
//! use bindery::stand_in::Forwarder;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct ClockStandIn(Forwarder<dyn Clock>);
//!
//! impl Clock for ClockStandIn {
//!     fn now(&self) -> u64 {
//!         self.0.get().now()
//!     }
//! }
//!
//! struct Fixed;
//! impl Clock for Fixed {
//!     fn now(&self) -> u64 {
//!         42
//!     }
//! }
//!
//! let forwarder = Forwarder::<dyn Clock>::new();
//! let stand_in: Arc<dyn Clock> = Arc::new(ClockStandIn(forwarder.clone()));
//! assert!(forwarder.set(Arc::new(Fixed)));
//! assert_eq!(stand_in.now(), 42);
//! ```

use std::sync::{Arc, OnceLock};

/// 延迟绑定的转发单元
pub struct Forwarder<T: ?Sized> {
    cell: Arc<OnceLock<Arc<T>>>,
}

impl<T: ?Sized> Forwarder<T> {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// 设定真实实例；已设定时返回 `false`
    pub fn set(&self, delegate: Arc<T>) -> bool {
        self.cell.set(delegate).is_ok()
    }

    pub fn try_get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    /// 取得真实实例
    ///
    /// # Panics
    ///
    /// 在被代理对象构造完成之前调用会 panic：构造器不能在自身完成前
    /// 使用循环依赖注入的替身。
    pub fn get(&self) -> &Arc<T> {
        match self.cell.get() {
            Some(delegate) => delegate,
            None => panic!(
                "This is a stand-in used to support circular references. \
                 The object it forwards to is not constructed yet; \
                 wait until after injection has completed to use it."
            ),
        }
    }
}

impl<T: ?Sized> Clone for Forwarder<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: ?Sized> Default for Forwarder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_once() {
        let forwarder = Forwarder::<str>::new();
        assert!(!forwarder.is_ready());
        assert!(forwarder.set(Arc::from("first")));
        assert!(!forwarder.set(Arc::from("second")));
        assert_eq!(&**forwarder.clone().get(), "first");
    }

    #[test]
    #[should_panic(expected = "not constructed yet")]
    fn test_get_before_set_panics() {
        let forwarder = Forwarder::<str>::new();
        let _ = forwarder.get();
    }
}
