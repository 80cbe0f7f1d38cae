use anyhow::Result;

use bazaar_chat::service::ApplicationBootstrap;
use bazaar_core::config::load_config;
use bazaar_core::tracing::init_tracing_from_config;

#[tokio::main]
async fn main() -> Result<()> {
    // 配置路径：第一个命令行参数，缺省 config/bazaar.toml
    let config_path = std::env::args().nth(1);
    let config = load_config(Some(
        config_path.as_deref().unwrap_or("config/bazaar.toml"),
    ));
    init_tracing_from_config(Some(&config.logging));

    ApplicationBootstrap::run(config).await
}
