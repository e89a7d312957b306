use std::sync::{Arc, OnceLock};

use tracing::info;

use super::InvocationHandler;
use crate::error::{GateError, Result};

/// 唯一 handler 的注册表
///
/// 只能写入一次，之后只读。
#[derive(Default)]
pub struct HandlerRegistry {
    slot: OnceLock<Arc<dyn InvocationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 handler，重复注册返回配置错误
    pub fn register(&self, handler: Arc<dyn InvocationHandler>) -> Result<()> {
        self.slot.set(handler).map_err(|_| {
            GateError::Configuration(
                "Multiple invocation handlers registered; only one is allowed".to_string(),
            )
        })?;
        info!("✅ invocation handler 已注册");
        Ok(())
    }

    pub fn has_handler(&self) -> bool {
        self.slot.get().is_some()
    }

    /// 已注册的 handler
    pub fn handler(&self) -> Result<Arc<dyn InvocationHandler>> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| GateError::Configuration("No invocation handler registered".to_string()))
    }
}
