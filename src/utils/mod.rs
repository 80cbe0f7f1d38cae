//! 辅助工具函数模块

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// 时钟偏移保护：时间戳超前于 `now` 时收敛到 `now`
pub fn clamp_to_now(ts: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if ts > now { now } else { ts }
}

/// 两个时间点之间的秒数，负值归零
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

/// 锁定剩余分钟数（向上取整，最少 1 分钟）
pub fn minutes_remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (until - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 59) / 60
}

/// 用于日志输出的时长格式，如 "3h 24m"
pub fn format_duration_hm(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

/// 活动统计使用的自然日（UTC）
pub fn day_of(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}
