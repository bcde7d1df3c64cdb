use clap::{Parser, Subcommand, ValueEnum};
use geofence_core::config::LogFormat;
use geofence_domain::TransitionType;

#[derive(Debug, Parser)]
#[command(name = "geofence-dispatch", version, about = "地理围栏事件分发服务")]
pub struct Cli {
    /// 配置文件路径，未指定时按默认路径查找
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(
        short,
        long,
        global = true,
        value_name = "LEVEL",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 启动分发服务（以及启用时的API），直到收到 Ctrl+C 或 SIGTERM
    Run,
    /// 注册或覆盖区域绑定
    Register {
        region_id: String,
        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        radius: f64,
        /// 监控的状态变化，逗号分隔，例如 ENTER,EXIT
        #[arg(long, value_delimiter = ',', value_parser = parse_transition, required = true)]
        transitions: Vec<TransitionType>,
        #[arg(long = "handler")]
        handler_id: String,
        #[arg(long)]
        loitering_delay_ms: Option<u32>,
    },
    /// 注销区域
    Unregister { region_id: String },
    /// 列出已注册区域
    Regions,
    /// 注入一次原始状态变化
    Emit {
        region_id: String,
        #[arg(value_parser = parse_transition)]
        transition: TransitionType,
        /// 事件时间（毫秒时间戳），默认当前时间
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// 队列统计
    Stats,
    /// 查看或重新投递死信
    DeadLetters {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// 将指定死信条目放回队列
        #[arg(long, value_name = "ENTRY_ID")]
        requeue: Option<i64>,
    },
}

fn parse_transition(value: &str) -> Result<TransitionType, String> {
    value.parse::<TransitionType>().map_err(|e| e.to_string())
}
