//! 销毁注册表 - 容器关闭时的单例销毁
//!
//! 只有声明了销毁回调的单例才会登记。销毁按注册的逆序执行，
//! 晚创建的 Bean（通常依赖早创建的）先被销毁；单个 Bean 的销毁
//! 失败只记录日志，不影响其余 Bean。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{BeanDefinition, BeanInstance};
use crate::error::ContainerError;
use crate::lifecycle::DESTROY_METHOD;

/// 一个等待销毁的单例
pub(crate) struct DestructionEntry {
    bean_name: String,
    bean: BeanInstance,
    definition: Arc<BeanDefinition>,
}

impl DestructionEntry {
    fn destroy(mut self) {
        // 只有引用计数为 1 时才能取得可变引用
        let Some(bean_mut) = Arc::get_mut(&mut self.bean) else {
            tracing::warn!(
                "Cannot destroy bean '{}': still has active references",
                self.bean_name
            );
            return;
        };

        if let Some(destroy_fn) = self.definition.destroy_callback() {
            if let Err(e) = destroy_fn(bean_mut) {
                let e = ContainerError::Destruction {
                    bean_name: self.bean_name.clone(),
                    message: e.to_string(),
                };
                tracing::warn!("{}", e);
            }
        }

        if let Some(named) = self.definition.destroy_method() {
            // 与 DisposableBean::destroy 重名的自定义方法不再重复调用
            if self.definition.destroy_callback().is_some() && named.method_name == DESTROY_METHOD {
                tracing::trace!(
                    "Skipping custom destroy method '{}' on bean '{}': already invoked",
                    named.method_name,
                    self.bean_name
                );
            } else if let Err(e) = (named.callback)(bean_mut) {
                let e = ContainerError::Destruction {
                    bean_name: self.bean_name.clone(),
                    message: format!("custom destroy method '{}': {}", named.method_name, e),
                };
                tracing::warn!("{}", e);
            }
        }

        tracing::debug!("Bean '{}' destroyed successfully", self.bean_name);
    }
}

/// 登记了销毁回调的单例集合
#[derive(Default)]
pub(crate) struct DisposableBeanRegistry {
    entries: Mutex<Vec<DestructionEntry>>,
}

impl DisposableBeanRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        bean_name: impl Into<String>,
        bean: BeanInstance,
        definition: Arc<BeanDefinition>,
    ) {
        let bean_name = bean_name.into();
        tracing::trace!("Registered disposable bean '{}'", bean_name);
        self.entries.lock().push(DestructionEntry {
            bean_name,
            bean,
            definition,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 逆序销毁全部登记的 Bean
    ///
    /// 登记表被整体取走，重复调用自然成为空操作。
    pub(crate) fn destroy_all(&self) {
        let entries: Vec<DestructionEntry> = std::mem::take(&mut *self.entries.lock());
        if entries.is_empty() {
            return;
        }
        tracing::info!("Destroying {} registered singleton bean(s)", entries.len());
        for entry in entries.into_iter().rev() {
            entry.destroy();
        }
    }
}
