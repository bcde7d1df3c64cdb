use serde::{Deserialize, Serialize};

/// 内置处理器类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// 仅将事件写入日志
    Logging,
    /// 以 JSON 形式 POST 到指定 URL
    Webhook,
}

/// 通过配置文件声明的处理器
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerConfig {
    pub id: String,
    pub kind: HandlerKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl HandlerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow::anyhow!("处理器ID不能为空"));
        }

        if self.kind == HandlerKind::Webhook {
            match &self.url {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(anyhow::anyhow!(
                        "处理器 {} 的URL必须以http://或https://开头: {}",
                        self.id,
                        url
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!("webhook处理器 {} 缺少url", self.id));
                }
            }
        }

        if self.timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("处理器 {} 的超时时间必须大于0", self.id));
        }

        Ok(())
    }
}
