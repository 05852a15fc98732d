use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use lunabridge::services::ScreenSaverRequests;
use lunabridge::{Bridge, BridgeConfig, ReplyCapture, ServiceCallRequest, logging, services};

/// 在命令行里调用 luna 服务
#[derive(Debug, Parser)]
#[command(name = "lunabridge", version, about)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// libhelpers 路径，覆盖配置文件
    #[arg(long)]
    library: Option<String>,

    /// 阻塞调用的超时（毫秒），覆盖配置文件
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 走私有总线
    #[arg(long)]
    private: bool,

    /// 应用 id，覆盖配置文件和 $APPID
    #[arg(long)]
    app_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 阻塞调用并打印回复
    Call {
        uri: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
    /// 只发送，不等回复
    Send {
        uri: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
    /// 订阅并持续打印回复，Ctrl-C 结束
    Watch {
        uri: String,
        #[arg(default_value = "{\"subscribe\":true}")]
        payload: String,
    },
    /// 面板分辨率和刷新率
    Panel,
    /// 系统界面语言
    Locale,
    /// 用系统浏览器打开链接
    OpenUrl { url: String },
    /// 注册应用并打印生命周期事件
    Register,
    /// 接管屏保请求，Ctrl-C 结束
    Screensaver {
        /// 拒绝所有屏保请求（保持亮屏）
        #[arg(long)]
        inhibit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(library) = &cli.library {
        config.library.path = library.clone();
    }
    if cli.timeout_ms.is_some() {
        config.call_timeout_ms = cli.timeout_ms;
    }
    if cli.app_id.is_some() {
        config.app_id = cli.app_id.clone();
    }
    logging::init(&config.log_filter);

    let bridge = Bridge::from_config(&config).context("loading service bus helpers")?;
    let visibility = if cli.private {
        lunabridge::Visibility::Private
    } else {
        lunabridge::Visibility::Public
    };

    match cli.command {
        Command::Call { uri, payload } => {
            let request = ServiceCallRequest::new(uri, payload).with_visibility(visibility);
            let reply = tokio::task::spawn_blocking(move || {
                bridge.call_sync(&request, ReplyCapture::Capture)
            })
            .await??;
            match reply {
                Some(reply) => println!("{reply}"),
                None => bail!("call returned no payload"),
            }
        }
        Command::Send { uri, payload } => {
            let request = ServiceCallRequest::new(uri, payload).with_visibility(visibility);
            bridge.send(&request)?;
        }
        Command::Watch { uri, payload } => {
            let request = ServiceCallRequest::new(uri, payload)
                .with_visibility(visibility)
                .subscription();
            let mut subscription = bridge.subscribe(&request)?;
            loop {
                tokio::select! {
                    reply = subscription.recv() => match reply {
                        Some(reply) => println!("{reply}"),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            if !subscription.cancel() {
                tracing::warn!("libhelpers cannot unregister, the subscription stays until exit");
            }
        }
        Command::Panel => {
            let (resolution, rate) = tokio::task::spawn_blocking(move || {
                Ok::<_, lunabridge::BridgeError>((
                    services::panel_resolution(&bridge)?,
                    services::refresh_rate(&bridge)?,
                ))
            })
            .await??;
            println!("{}x{}@{}", resolution.width, resolution.height, rate);
        }
        Command::Locale => {
            let locale = tokio::task::spawn_blocking(move || services::preferred_locale(&bridge))
                .await??;
            match locale {
                Some(locale) => println!("{locale}"),
                None => bail!("no UI locale configured"),
            }
        }
        Command::OpenUrl { url } => {
            tokio::task::spawn_blocking(move || services::open_url(&bridge, &url)).await??;
        }
        Command::Register => {
            let app_id = config.require_app_id()?;
            let bridge = Arc::new(bridge);
            let mut lifecycle = {
                let bridge = Arc::clone(&bridge);
                tokio::task::spawn_blocking(move || services::register_app(&bridge, &app_id))
                    .await??
            };
            println!("registered, interface version {}", lifecycle.interface_version());
            loop {
                tokio::select! {
                    event = lifecycle.next_event() => match event {
                        Some(event) => println!("{event:?}"),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Command::Screensaver { inhibit } => {
            let app_id = config.require_app_id()?;
            let mut requests = ScreenSaverRequests::register(&bridge, &app_id)?;
            tracing::info!(
                client = requests.client_name(),
                inhibit,
                "handling screen saver requests"
            );
            loop {
                tokio::select! {
                    request = requests.next_request() => match request {
                        Some(request) => {
                            requests.respond(&bridge, &request, inhibit)?;
                            println!("answered request {} (inhibit: {inhibit})", request.timestamp);
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}
