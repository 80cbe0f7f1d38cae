//! # Prometheus 指标收集模块
//!
//! 为聊天核心服务提供统一的 Prometheus 指标收集能力。

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 聊天核心服务指标
pub struct ChatMetrics {
    /// 在线状态转换总数（按转换类型）
    pub presence_transitions_total: IntCounterVec,
    /// 清扫任务强制下线的用户数
    pub sweep_forced_offline_total: IntCounter,
    /// 发送消息总数
    pub messages_sent_total: IntCounter,
    /// 标记已读的消息总数
    pub messages_marked_read_total: IntCounter,
    /// 创建会话总数
    pub conversations_created_total: IntCounter,
    /// 失败登录总数
    pub login_failures_total: IntCounter,
    /// 触发账号锁定总数
    pub account_lockouts_total: IntCounter,
    /// 当前内存中记录的正在输入状态数
    pub typing_entries: IntGauge,
    /// HTTP 请求耗时（秒）
    pub http_request_duration_seconds: Histogram,
}

impl ChatMetrics {
    fn new() -> Self {
        let presence_transitions_total = IntCounterVec::new(
            Opts::new(
                "presence_transitions_total",
                "Total number of presence state transitions",
            ),
            &["transition"],
        )
        .expect("Failed to create presence_transitions_total metric");

        let sweep_forced_offline_total = IntCounter::new(
            "sweep_forced_offline_total",
            "Users forced offline by the inactivity sweep",
        )
        .expect("Failed to create sweep_forced_offline_total metric");

        let messages_sent_total =
            IntCounter::new("messages_sent_total", "Total number of messages sent")
                .expect("Failed to create messages_sent_total metric");

        let messages_marked_read_total = IntCounter::new(
            "messages_marked_read_total",
            "Total number of messages flipped to read",
        )
        .expect("Failed to create messages_marked_read_total metric");

        let conversations_created_total = IntCounter::new(
            "conversations_created_total",
            "Total number of conversations created",
        )
        .expect("Failed to create conversations_created_total metric");

        let login_failures_total =
            IntCounter::new("login_failures_total", "Total number of failed logins")
                .expect("Failed to create login_failures_total metric");

        let account_lockouts_total = IntCounter::new(
            "account_lockouts_total",
            "Total number of account lockouts triggered",
        )
        .expect("Failed to create account_lockouts_total metric");

        let typing_entries = IntGauge::new(
            "typing_entries",
            "Live typing-indicator entries currently tracked",
        )
        .expect("Failed to create typing_entries metric");

        let http_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("Failed to create http_request_duration_seconds metric");

        Self {
            presence_transitions_total,
            sweep_forced_offline_total,
            messages_sent_total,
            messages_marked_read_total,
            conversations_created_total,
            login_failures_total,
            account_lockouts_total,
            typing_entries,
            http_request_duration_seconds,
        }
    }

    fn register(&self, registry: &Registry) {
        registry
            .register(Box::new(self.presence_transitions_total.clone()))
            .expect("Failed to register presence_transitions_total");
        registry
            .register(Box::new(self.sweep_forced_offline_total.clone()))
            .expect("Failed to register sweep_forced_offline_total");
        registry
            .register(Box::new(self.messages_sent_total.clone()))
            .expect("Failed to register messages_sent_total");
        registry
            .register(Box::new(self.messages_marked_read_total.clone()))
            .expect("Failed to register messages_marked_read_total");
        registry
            .register(Box::new(self.conversations_created_total.clone()))
            .expect("Failed to register conversations_created_total");
        registry
            .register(Box::new(self.login_failures_total.clone()))
            .expect("Failed to register login_failures_total");
        registry
            .register(Box::new(self.account_lockouts_total.clone()))
            .expect("Failed to register account_lockouts_total");
        registry
            .register(Box::new(self.typing_entries.clone()))
            .expect("Failed to register typing_entries");
        registry
            .register(Box::new(self.http_request_duration_seconds.clone()))
            .expect("Failed to register http_request_duration_seconds");
    }
}

/// 全局聊天服务指标
pub static METRICS: Lazy<ChatMetrics> = Lazy::new(|| {
    let metrics = ChatMetrics::new();
    metrics.register(&REGISTRY);
    metrics
});

/// 以 Prometheus 文本格式导出全部指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}
