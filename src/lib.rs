/// 回调上下文的 C 布局，按 `libhelpers` 的版本区分
pub mod abi;

/// 服务总线的提交接口，以及基于 `libhelpers` 的动态加载实现
pub mod bus;

/// 把异步回调变成阻塞调用 / 单发调用 / 订阅
pub mod bridge;

/// 错误类型和线程内的 last-error
pub mod error;

/// TOML 配置
pub mod config;

/// tracing 初始化
pub mod logging;

/// 构建在 bridge 之上的系统服务调用（面板分辨率、语言、生命周期等）
pub mod services;

/// 导出给 C 宿主的入口
pub mod c_api;

pub use bridge::{
    Bridge, BridgeOptions, ContextStats, DeliveryMode, ReplyCapture, ServiceCallRequest,
    Subscription, Visibility,
};
pub use bus::{HelpersLibrary, ServiceBus};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result, last_error};

// `bridge` 是唯一有真正并发问题的地方:
// 回调可能在任意线程上触发，甚至在 submit 里面同步重入，所以 submit 期间绝对不能拿着等待锁
// 同步调用的状态放在一块引用计数的内存里，回调持有一张「票」，超时返回之后晚到的回调也能安全释放它

// 单发模式下回调只能触发一次，第二次触发在 debug 下直接 assert，release 下忽略
// HACK: 如果调用方已经返回，第二次触发根本无从检测，这是 libhelpers 的约定，我们只能相信它

// `services` 里的东西都很薄，就是拼 JSON 然后解析回复
