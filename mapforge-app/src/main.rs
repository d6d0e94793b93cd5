use std::path::PathBuf;

use mapforge_config::AppConfig;
use mapforge_core::definition::DefinitionCatalog;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

/// 命令行参数。
#[derive(Debug, Default, PartialEq)]
struct LaunchOptions {
    config: Option<PathBuf>,
    log_level: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<LaunchOptions, String> {
    let mut options = LaunchOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" => "config",
            "--log-level" => "log-level",
            other => return Err(format!("未知参数：{other}")),
        };
        let value = args
            .next()
            .ok_or_else(|| format!("`--{slot}` 需要一个取值"))?;
        if slot == "config" {
            options.config = Some(PathBuf::from(value));
        } else {
            options.log_level = Some(value);
        }
    }
    Ok(options)
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    // 日志在配置读取之后才安装，回退原因留到安装后再记录
    let (config, fallback) = load_configuration(options.config);
    init_logging(options.log_level.as_deref().unwrap_or(&config.logging.level));
    if let Some(reason) = fallback {
        warn!(reason = %reason, "配置不可用，使用内建默认值");
    }
    info!(half_extent = config.world.half_extent, "启动 MapForge");

    let catalog = config.catalog().unwrap_or_else(|err| {
        warn!(error = %err, "配置中的实体定义无效，仅使用内置定义");
        DefinitionCatalog::with_builtin_definitions()
    });

    if let Err(err) = cli::run_demo(config.world_bounds(), catalog) {
        error!(error = %err, "执行 CLI 演示失败");
        std::process::exit(1);
    }
}

/// 读取配置；失败时返回默认配置和失败原因。
fn load_configuration(explicit: Option<PathBuf>) -> (AppConfig, Option<String>) {
    let loaded = match explicit {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err.to_string())),
    }
}

/// `RUST_LOG` 优先，其次是命令行或配置给出的等级，都无效时退回 `info`。
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // 测试中可能已安装过订阅者
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
