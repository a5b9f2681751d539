//! 生命周期回调与扩展钩子
//!
//! Bean 生命周期各阶段的能力接口：
//! 1. 实例化（构造方法 / 工厂方法）
//! 2. 属性填充（外部协作者）
//! 3. 感知回调（`BeanNameAware`、`BeanFactoryAware`）
//! 4. `BeanPostProcessor::post_process_before_initialization`
//! 5. `InitializingBean::after_properties_set` + 自定义 init 方法
//! 6. `BeanPostProcessor::post_process_after_initialization`
//! 7. 销毁（`DisposableBean` / 自定义 destroy 方法）

use std::sync::Arc;

use crate::bean::BeanInstance;
use crate::bean_factory::DefaultListableBeanFactory;
use crate::error::ContainerResult;

/// `InitializingBean::after_properties_set` 的方法名；
/// 自定义 init 方法与其重名时跳过，避免双重调用
pub const AFTER_PROPERTIES_SET: &str = "after_properties_set";

/// `DisposableBean::destroy` 的方法名；自定义 destroy 方法与其重名时跳过
pub const DESTROY_METHOD: &str = "destroy";

/// 容器感知：需要知道自己在容器中的名字
pub trait BeanNameAware {
    fn set_bean_name(&mut self, bean_name: &str);
}

/// 容器感知：需要持有所属 BeanFactory 的引用
///
/// 回调发生在属性填充之后、任何初始化回调之前。
pub trait BeanFactoryAware {
    fn set_bean_factory(&mut self, bean_factory: Arc<DefaultListableBeanFactory>);
}

/// 属性填充完成后的验证/初始化能力
///
/// 失败视为致命的初始化错误，创建中止。
pub trait InitializingBean {
    fn after_properties_set(&mut self) -> ContainerResult<()>;
}

/// 销毁回调能力；仅对单例在容器关闭时调用
pub trait DisposableBean {
    fn destroy(&mut self) -> ContainerResult<()>;
}

/// 感知回调的上下文
pub struct AwareContext {
    pub bean_name: String,
    pub bean_factory: Arc<DefaultListableBeanFactory>,
}

/// BeanPostProcessor - Bean 工厂扩展机制
///
/// 在 Bean 初始化前后提供钩子，允许替换/包装 Bean 实例。
/// 执行顺序由 `order()` 决定（越小越先执行）。
pub trait BeanPostProcessor: Send + Sync {
    /// 实例化前短路
    ///
    /// 返回 `Some(bean)` 时容器跳过常规的实例化与初始化流程，直接采用
    /// 返回的实例；此时仅 `post_process_after_initialization` 钩子照常
    /// 执行（与初始化前短路的行为不对称，属于既定语义，见
    /// `DefaultListableBeanFactory::create_bean_internal`）。
    fn post_process_before_instantiation(
        &self,
        _bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        Ok(None)
    }

    /// 在初始化回调（after_properties_set / init 方法）之前调用
    ///
    /// 返回 `Some` 替换当前实例；返回 `None` 则整条钩子链就此终止：
    /// 该实例不再经过任何前置或后置钩子，创建结果为 Null 占位。
    fn post_process_before_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        Ok(Some(bean))
    }

    /// 在初始化回调之后调用
    ///
    /// 返回 `Some` 替换当前实例；返回 `None` 保留当前实例并停止
    /// 后续的后置钩子。
    fn post_process_after_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        Ok(Some(bean))
    }

    /// 处理器名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }
}
