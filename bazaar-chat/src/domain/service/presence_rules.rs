//! 在线状态机与登录锁定的纯转换规则
//!
//! 这里只做状态计算，不碰存储：仓储实现负责在行锁下读取当前快照、
//! 调用这里的函数、再持久化返回的下一个快照。同一套规则同时服务于
//! 请求内的心跳、显式上下线、只读重估和后台清扫。

use chrono::{DateTime, Duration, Utc};

use bazaar_core::utils::{clamp_to_now, elapsed_seconds, minutes_remaining};

use crate::domain::model::{
    LockState, LockoutOutcome, PresenceAction, PresenceSnapshot, PresenceTransition,
};

/// 状态机参数（来自 `[presence]` 配置）
#[derive(Clone, Copy, Debug)]
pub struct PresenceRules {
    /// 活跃窗口：距离上次活动超过该时长视为不在线
    pub inactivity_window: Duration,
    /// 触发锁定的连续失败次数
    pub lockout_threshold: i32,
    /// 锁定时长
    pub lockout_duration: Duration,
}

impl PresenceRules {
    pub fn new(window_secs: i64, lockout_threshold: i32, lockout_minutes: i64) -> Self {
        Self {
            inactivity_window: Duration::seconds(window_secs),
            lockout_threshold,
            lockout_duration: Duration::minutes(lockout_minutes),
        }
    }
}

impl Default for PresenceRules {
    fn default() -> Self {
        Self::new(300, 5, 30)
    }
}

/// 应用一次状态机输入，返回下一个快照与转换描述
///
/// 同一个 `now` 重复应用不会重复累计时长（幂等）。
pub fn apply(
    rules: &PresenceRules,
    current: &PresenceSnapshot,
    action: PresenceAction,
    now: DateTime<Utc>,
) -> PresenceTransition {
    let mut next = current.clone();
    // 时钟偏移保护：未来的 last_seen_at 一律收敛到 now
    next.last_seen_at = clamp_to_now(current.last_seen_at, now);

    let mut went_online = false;
    let mut went_offline = false;
    let mut flushed_secs = 0;

    match action {
        PresenceAction::ExplicitOnline => {
            went_online = !next.online;
            next.online = true;
            if next.session_started_at.is_none() {
                next.session_started_at = Some(now);
            }
            next.last_seen_at = now;
        }
        PresenceAction::ExplicitOffline => {
            if next.online {
                if let Some(started) = next.session_started_at {
                    flushed_secs = elapsed_seconds(started, now);
                    next.total_online_secs += flushed_secs;
                }
                went_offline = true;
            }
            next.online = false;
            next.session_started_at = None;
            next.last_seen_at = now;
        }
        PresenceAction::Heartbeat => {
            let inactive = now - next.last_seen_at;
            if inactive < rules.inactivity_window {
                // 活跃：续上当前会话，必要时开启新会话
                went_online = !next.online;
                next.online = true;
                if next.session_started_at.is_none() {
                    next.session_started_at = Some(now);
                }
                next.last_seen_at = now;
            } else {
                // 长时间无活动后收到的第一个心跳：把过期会话按最后活动时间
                // 结算并下线；本次心跳只作为新的活动痕迹记录，下一个心跳
                // 会重新判定为活跃并开启新会话
                if next.online {
                    if let Some(started) = next.session_started_at {
                        flushed_secs = elapsed_seconds(started, next.last_seen_at);
                        next.total_online_secs += flushed_secs;
                    }
                    went_offline = true;
                }
                next.online = false;
                next.session_started_at = None;
                next.last_seen_at = now;
            }
        }
        PresenceAction::Evaluate => {
            let inactive = now - next.last_seen_at;
            if next.online && inactive >= rules.inactivity_window {
                if let Some(started) = next.session_started_at {
                    flushed_secs = elapsed_seconds(started, next.last_seen_at);
                    next.total_online_secs += flushed_secs;
                }
                went_offline = true;
                next.online = false;
                next.session_started_at = None;
                // 不更新 last_seen_at：重估不是用户活动
            }
        }
    }

    PresenceTransition {
        next,
        went_online,
        went_offline,
        flushed_secs,
    }
}

/// 记录一次失败登录
pub fn on_login_failure(
    rules: &PresenceRules,
    current: &PresenceSnapshot,
    now: DateTime<Utc>,
) -> (PresenceSnapshot, LockoutOutcome) {
    let mut next = current.clone();
    next.failed_login_count += 1;

    let already_locked = matches!(check_lock(current, now), LockState::Locked { .. });
    let mut just_locked = false;
    if next.failed_login_count >= rules.lockout_threshold && !already_locked {
        next.locked_until = Some(now + rules.lockout_duration);
        just_locked = true;
    }

    let outcome = LockoutOutcome {
        failed_login_count: next.failed_login_count,
        locked_until: next.locked_until,
        just_locked,
    };
    (next, outcome)
}

/// 登录成功：清零计数并解除锁定
pub fn on_login_success(current: &PresenceSnapshot) -> PresenceSnapshot {
    let mut next = current.clone();
    next.failed_login_count = 0;
    next.locked_until = None;
    next
}

/// 检查锁定状态；`Expired` 表示调用方应当惰性清除 locked_until
pub fn check_lock(current: &PresenceSnapshot, now: DateTime<Utc>) -> LockState {
    match current.locked_until {
        Some(until) if until > now => LockState::Locked {
            minutes_remaining: minutes_remaining(until, now),
        },
        Some(_) => LockState::Expired,
        None => LockState::Unlocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rules() -> PresenceRules {
        PresenceRules::default()
    }

    fn online_since(user_id: i64, started: i64, last_seen: i64) -> PresenceSnapshot {
        PresenceSnapshot {
            online: true,
            session_started_at: Some(at(started)),
            last_seen_at: at(last_seen),
            ..PresenceSnapshot::initial(user_id, at(last_seen))
        }
    }

    #[test]
    fn explicit_online_starts_session() {
        let current = PresenceSnapshot::initial(1, at(0));
        let t = apply(&rules(), &current, PresenceAction::ExplicitOnline, at(10));
        assert!(t.went_online);
        assert!(t.next.online);
        assert_eq!(t.next.session_started_at, Some(at(10)));
        assert_eq!(t.next.last_seen_at, at(10));
    }

    #[test]
    fn explicit_online_keeps_existing_session_start() {
        let current = online_since(1, 100, 150);
        let t = apply(&rules(), &current, PresenceAction::ExplicitOnline, at(200));
        assert!(!t.went_online);
        assert_eq!(t.next.session_started_at, Some(at(100)));
    }

    #[test]
    fn explicit_offline_flushes_duration_exactly_once() {
        let current = online_since(1, 1_000, 1_200);
        let t = apply(&rules(), &current, PresenceAction::ExplicitOffline, at(1_500));
        assert!(t.went_offline);
        assert_eq!(t.flushed_secs, 500);
        assert_eq!(t.next.total_online_secs, 500);
        assert!(!t.next.online);
        assert_eq!(t.next.session_started_at, None);

        // 第二次下线是幂等的：不再累计
        let t2 = apply(&rules(), &t.next, PresenceAction::ExplicitOffline, at(1_500));
        assert!(!t2.went_offline);
        assert_eq!(t2.flushed_secs, 0);
        assert_eq!(t2.next.total_online_secs, 500);
    }

    #[test]
    fn heartbeat_within_window_keeps_online() {
        // now - last_seen = 299s：仍然活跃
        let current = online_since(1, 0, 1);
        let t = apply(&rules(), &current, PresenceAction::Heartbeat, at(300));
        assert!(t.next.online);
        assert_eq!(t.flushed_secs, 0);
        assert_eq!(t.next.last_seen_at, at(300));
        assert_eq!(t.next.session_started_at, Some(at(0)));
    }

    #[test]
    fn heartbeat_past_window_goes_offline_and_flushes() {
        // now - last_seen = 301s：判定为不活跃，按最后活动时间结算
        let current = online_since(1, 0, 100);
        let t = apply(&rules(), &current, PresenceAction::Heartbeat, at(401));
        assert!(t.went_offline);
        assert!(!t.next.online);
        assert_eq!(t.flushed_secs, 100);
        assert_eq!(t.next.total_online_secs, 100);
        assert_eq!(t.next.session_started_at, None);
        // 本次心跳记录为新的活动痕迹
        assert_eq!(t.next.last_seen_at, at(401));

        // 紧接着的下一个心跳重新判定为活跃
        let t2 = apply(&rules(), &t.next, PresenceAction::Heartbeat, at(410));
        assert!(t2.went_online);
        assert!(t2.next.online);
        assert_eq!(t2.next.session_started_at, Some(at(410)));
    }

    #[test]
    fn heartbeat_at_exact_window_boundary_goes_offline() {
        let current = online_since(1, 0, 100);
        let t = apply(&rules(), &current, PresenceAction::Heartbeat, at(400));
        assert!(t.went_offline);
    }

    #[test]
    fn heartbeat_clamps_future_last_seen() {
        // 时钟偏移：last_seen_at 在 now 之后，不应报错也不应判定为不活跃
        let mut current = online_since(1, 0, 1_000);
        current.last_seen_at = at(2_000);
        let t = apply(&rules(), &current, PresenceAction::Heartbeat, at(1_500));
        assert!(t.next.online);
        assert_eq!(t.next.last_seen_at, at(1_500));
        assert_eq!(t.flushed_secs, 0);
    }

    #[test]
    fn heartbeat_same_now_twice_does_not_double_count() {
        let current = PresenceSnapshot::initial(1, at(0));
        let t1 = apply(&rules(), &current, PresenceAction::Heartbeat, at(50));
        let t2 = apply(&rules(), &t1.next, PresenceAction::Heartbeat, at(50));
        assert_eq!(t1.next.total_online_secs, 0);
        assert_eq!(t2.next.total_online_secs, 0);
        assert_eq!(t2.next.session_started_at, t1.next.session_started_at);
    }

    #[test]
    fn evaluate_closes_stale_session_without_new_activity() {
        let current = online_since(1, 0, 100);
        let t = apply(&rules(), &current, PresenceAction::Evaluate, at(500));
        assert!(t.went_offline);
        assert_eq!(t.flushed_secs, 100);
        // 重估不是用户活动，last_seen_at 保持原值
        assert_eq!(t.next.last_seen_at, at(100));
    }

    #[test]
    fn evaluate_leaves_fresh_session_untouched() {
        let current = online_since(1, 0, 450);
        let t = apply(&rules(), &current, PresenceAction::Evaluate, at(500));
        assert!(!t.went_offline);
        assert!(t.next.online);
        assert_eq!(t.next.total_online_secs, 0);
    }

    #[test]
    fn evaluate_ignores_offline_rows() {
        let current = PresenceSnapshot::initial(1, at(0));
        let t = apply(&rules(), &current, PresenceAction::Evaluate, at(10_000));
        assert!(!t.went_offline);
        assert_eq!(t.next, current);
    }

    #[test]
    fn lockout_cycle() {
        let r = rules();
        let now = at(0);
        let mut snapshot = PresenceSnapshot::initial(1, now);

        // 前四次失败不触发锁定
        for i in 1..5 {
            let (next, outcome) = on_login_failure(&r, &snapshot, now);
            snapshot = next;
            assert_eq!(outcome.failed_login_count, i);
            assert!(!outcome.just_locked);
            assert_eq!(snapshot.locked_until, None);
        }

        // 第五次触发 30 分钟锁定
        let (next, outcome) = on_login_failure(&r, &snapshot, now);
        snapshot = next;
        assert!(outcome.just_locked);
        assert_eq!(snapshot.locked_until, Some(now + Duration::minutes(30)));

        // 锁定期内
        match check_lock(&snapshot, at(60)) {
            LockState::Locked { minutes_remaining } => assert_eq!(minutes_remaining, 29),
            other => panic!("expected locked, got {other:?}"),
        }

        // 到期后变为 Expired（需要惰性清除）
        assert_eq!(
            check_lock(&snapshot, now + Duration::minutes(30)),
            LockState::Expired
        );

        // 登录成功清零并解锁
        let cleared = on_login_success(&snapshot);
        assert_eq!(cleared.failed_login_count, 0);
        assert_eq!(cleared.locked_until, None);
        assert_eq!(check_lock(&cleared, now), LockState::Unlocked);
    }

    #[test]
    fn failure_during_active_lock_does_not_extend_it() {
        let r = rules();
        let now = at(0);
        let mut snapshot = PresenceSnapshot::initial(1, now);
        for _ in 0..5 {
            snapshot = on_login_failure(&r, &snapshot, now).0;
        }
        let locked_until = snapshot.locked_until;

        let (next, outcome) = on_login_failure(&r, &snapshot, at(60));
        assert!(!outcome.just_locked);
        assert_eq!(next.locked_until, locked_until);
        assert_eq!(next.failed_login_count, 6);
    }
}
