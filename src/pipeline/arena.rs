//! 单帧张量作用域 (tick arena)
//!
//! 每个tick内分配的张量都登记在 `TickArena` 上, 以 `Tracked<T>` 的形式持有。
//! tick 结束 (无论成功或失败) 时作用域内所有张量随之释放,
//! 不存在跨tick存活的张量。

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 存活张量计数 (跨tick共享)
#[derive(Clone, Debug, Default)]
pub struct TensorGauge {
    live: Arc<AtomicUsize>,
}

impl TensorGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存活的张量数
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// 一个tick的张量作用域
pub struct TickArena {
    gauge: TensorGauge,
    baseline: usize,
    allocated: usize,
}

impl TickArena {
    pub fn new(gauge: &TensorGauge) -> Self {
        Self {
            gauge: gauge.clone(),
            baseline: gauge.live(),
            allocated: 0,
        }
    }

    /// 登记一个张量, 随返回值一起释放
    pub fn track<T>(&mut self, value: T) -> Tracked<T> {
        self.gauge.live.fetch_add(1, Ordering::AcqRel);
        self.allocated += 1;
        Tracked {
            value,
            gauge: self.gauge.clone(),
        }
    }

    /// 本tick已分配的张量数
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

impl Drop for TickArena {
    fn drop(&mut self) {
        let live = self.gauge.live();
        if live > self.baseline {
            log::warn!(
                "⚠️ tick 结束时仍有 {} 个张量未释放",
                live - self.baseline
            );
        }
    }
}

/// 登记在 arena 上的张量
pub struct Tracked<T> {
    value: T,
    gauge: TensorGauge,
}

impl<T> Tracked<T> {
    pub fn get(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.gauge.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_scope_exit() {
        let gauge = TensorGauge::new();
        {
            let mut arena = TickArena::new(&gauge);
            let a = arena.track(vec![0.0f32; 16]);
            let b = arena.track(vec![1.0f32; 4]);
            assert_eq!(gauge.live(), 2);
            assert_eq!(a.len() + b.len(), 20);
            assert_eq!(arena.allocated(), 2);
        }
        assert_eq!(gauge.live(), 0);
    }

    #[test]
    fn test_release_on_error_path() {
        fn failing(gauge: &TensorGauge) -> Result<(), String> {
            let mut arena = TickArena::new(gauge);
            let _input = arena.track([0u8; 8]);
            Err("shape mismatch".to_string())?;
            let _unreachable = arena.track([0u8; 8]);
            Ok(())
        }

        let gauge = TensorGauge::new();
        assert!(failing(&gauge).is_err());
        assert_eq!(gauge.live(), 0);
    }
}
