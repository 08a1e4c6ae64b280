use std::sync::RwLock;

use time::OffsetDateTime;

/// 現在時刻の供給源
///
/// 有効期限の計算と判定はすべてこのトレイト経由で行う。
/// テストでは MockClock で時刻を固定できる。
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// システムクロック（本番用）
#[derive(Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// 時刻を手動で制御できるテスト用クロック
pub struct MockClock {
    current: RwLock<OffsetDateTime>,
}

impl MockClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.current.write().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, duration: time::Duration) {
        let mut current = self.current.write().expect("clock lock poisoned");
        *current += duration;
    }
}

impl Clock for MockClock {
    fn now(&self) -> OffsetDateTime {
        *self.current.read().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_is_fixed_until_advanced() {
        let start = OffsetDateTime::now_utc();
        let clock = MockClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(time::Duration::hours(5));
        assert_eq!(clock.now(), start + time::Duration::hours(5));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
