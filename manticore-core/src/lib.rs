// manticore-core: Bean 生命周期容器
//
// 提供类型安全的 Bean 创建与生命周期管理，支持：
// - 单例和原型作用域
// - 构造方法 / 工厂方法实例化，惰性记忆化的成员解析
// - 方法注入（Lookup / Replace 覆盖）与增强类缓存
// - 生命周期回调（属性填充、感知、init/destroy、后置处理器）
// - 逆序、幂等的单例销毁

pub mod bean;
pub mod bean_factory;
mod destruction;
pub mod error;
pub mod instantiation;
pub mod lifecycle;
pub mod logging;
pub mod method_override;
pub mod scope;
pub mod subclass;
pub mod utils;

// 重新导出常用类型
pub use bean::{
    BeanArg, BeanDefinition, BeanInstance, BeanSource, Constructor, FactoryMethod, NullBean,
    RawBean,
};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
    DefaultListableBeanFactory, ListableBeanFactory,
};
pub use error::{ContainerError, ContainerResult};
pub use instantiation::{
    CreationContext, EnhancedInstantiationStrategy, FactoryInvocation, FactoryMethodRef,
    InstantiationStrategy, SimpleInstantiationStrategy,
};
pub use lifecycle::{
    AwareContext, BeanFactoryAware, BeanNameAware, BeanPostProcessor, DisposableBean,
    InitializingBean, AFTER_PROPERTIES_SET, DESTROY_METHOD,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use method_override::{
    LookupOverride, MethodOverride, MethodOverrides, MethodReplacer, MethodSignature,
    ReplaceOverride,
};
pub use scope::Scope;
pub use subclass::{
    DispatchOutcome, DispatcherSlot, EnhancedClass, MethodDispatch, OverrideDispatcher,
    SubclassCache,
};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{
        BeanArg, BeanDefinition, BeanInstance, Constructor, FactoryMethod, NullBean,
    };
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
        DefaultListableBeanFactory, ListableBeanFactory,
    };
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::{
        BeanFactoryAware, BeanNameAware, BeanPostProcessor, DisposableBean, InitializingBean,
    };
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::method_override::{MethodReplacer, MethodSignature};
    pub use crate::scope::Scope;
    pub use crate::subclass::{DispatchOutcome, DispatcherSlot};
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
