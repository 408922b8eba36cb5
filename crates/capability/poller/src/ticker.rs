//! 带抖动的周期触发器

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// 按固定基准时间轴触发，每次触发叠加 ±jitter 的均匀随机偏移。
///
/// 基准时间轴不受抖动与执行耗时影响，不会漂移。`tick` 可安全地在
/// `select!` 中被取消：未完成的等待不会推进时间轴。
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    jitter: Duration,
    anchor: Instant,
    fire_at: Instant,
}

impl Ticker {
    /// 首次触发在 `[now, now + jitter]` 内，错开同时启动的设备。
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        let jitter = jitter.min(interval / 2);
        let anchor = Instant::now();
        let fire_at = anchor + random_offset(jitter);
        Self {
            interval,
            jitter,
            anchor,
            fire_at,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 下一次触发时刻。
    pub fn next_fire(&self) -> Instant {
        self.fire_at
    }

    pub async fn tick(&mut self) {
        tokio::time::sleep_until(self.fire_at).await;
        self.advance();
    }

    fn advance(&mut self) {
        self.anchor += self.interval;
        let offset = signed_offset(self.jitter);
        self.fire_at = if offset >= 0 {
            self.anchor + Duration::from_millis(offset as u64)
        } else {
            self.anchor
                .checked_sub(Duration::from_millis(offset.unsigned_abs()))
                .unwrap_or(self.anchor)
        };
    }
}

fn random_offset(jitter: Duration) -> Duration {
    let bound = jitter.as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}

fn signed_offset(jitter: Duration) -> i64 {
    let bound = jitter.as_millis() as i64;
    if bound == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(-bound..=bound)
}
