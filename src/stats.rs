use std::sync::atomic::{AtomicU64, Ordering};

/// 注入器内部统计（原子计数器）
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    resolutions: AtomicU64,
    failures: AtomicU64,
    singleton_hits: AtomicU64,
    singleton_misses: AtomicU64,
    stand_ins: AtomicU64,
    jit_bindings: AtomicU64,
}

impl StatsCounters {
    pub fn resolution(&self, succeeded: bool) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn singleton_hit(&self) {
        self.singleton_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn singleton_miss(&self) {
        self.singleton_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stand_in_created(&self) {
        self.stand_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jit_binding_created(&self) {
        self.jit_bindings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InjectorStats {
        InjectorStats {
            total_resolutions: self.resolutions.load(Ordering::Relaxed),
            failed_resolutions: self.failures.load(Ordering::Relaxed),
            singleton_hits: self.singleton_hits.load(Ordering::Relaxed),
            singleton_misses: self.singleton_misses.load(Ordering::Relaxed),
            stand_ins_created: self.stand_ins.load(Ordering::Relaxed),
            jit_bindings: self.jit_bindings.load(Ordering::Relaxed),
        }
    }
}

/// 注入器统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectorStats {
    /// 顶层解析次数
    pub total_resolutions: u64,
    /// 失败的顶层解析次数
    pub failed_resolutions: u64,
    pub singleton_hits: u64,
    pub singleton_misses: u64,
    /// 为打破循环依赖创建的替身数量
    pub stand_ins_created: u64,
    /// 即时派生的绑定数量
    pub jit_bindings: u64,
}

impl InjectorStats {
    /// 单例缓存命中率
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.singleton_hits + self.singleton_misses;
        if total == 0 {
            0.0
        } else {
            self.singleton_hits as f64 / total as f64
        }
    }

    pub fn performance_summary(&self) -> String {
        format!(
            "Resolutions: {}, Failed: {}, Singleton hit rate: {:.2}%, Stand-ins: {}, JIT bindings: {}",
            self.total_resolutions,
            self.failed_resolutions,
            self.cache_hit_rate() * 100.0,
            self.stand_ins_created,
            self.jit_bindings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        counters.resolution(true);
        counters.resolution(false);
        counters.singleton_miss();
        counters.singleton_hit();
        counters.singleton_hit();
        counters.singleton_hit();

        let stats = counters.snapshot();
        assert_eq!(stats.total_resolutions, 2);
        assert_eq!(stats.failed_resolutions, 1);
        assert!((stats.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!(stats.performance_summary().contains("Singleton hit rate: 75.00%"));
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(InjectorStats::default().cache_hit_rate(), 0.0);
    }
}
