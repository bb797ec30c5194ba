// 教案级说明：侵蚀决策只依赖“当前时间点”，因此时钟抽象仅保留 `now`。
//
// - **意图 (Why)**：装饰器在每次归还时读取时间，测试需要在不等待真实分钟级间隔的前提下
//   跨越决策点，因此时间源必须可注入；
// - **契约 (What)**：`SystemClock` 读取单调时钟；`MockClock` 提供手动推进的虚拟时间轴；
// - **实现提示 (How)**：`MockClock` 以 `Arc<Mutex<_>>` 共享状态，克隆体看到同一时间轴。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 可注入的单调时钟。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 基于 [`Instant::now`] 的系统时钟，装饰器的默认时间源。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的虚拟时钟，服务于侵蚀节律的确定性测试。
///
/// # 教案式注释
/// - **意图 (Why)**：侵蚀间隔以分钟计，真实等待不可接受；`advance` 让测试精确跨越或停在决策点；
/// - **契约 (What)**：`now() == origin + elapsed()`，`advance` 只会向前推进；
/// - **注意 (Trade-offs)**：内部以互斥锁保护，读取开销高于系统时钟，仅建议在测试中使用。
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<ClockState>>,
}

struct ClockState {
    origin: Instant,
    elapsed: Duration,
}

impl MockClock {
    /// 以当前系统时间为起点创建虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起点创建虚拟时钟。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                origin,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// 向前推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(delta);
    }

    /// 自起点以来累计推进的时长。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.origin + state.elapsed
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_shared_timeline() {
        let clock = MockClock::new();
        let observer = clock.clone();
        let start = observer.now();

        clock.advance(Duration::from_secs(90));

        assert_eq!(observer.elapsed(), Duration::from_secs(90));
        assert_eq!(observer.now() - start, Duration::from_secs(90));
    }
}
