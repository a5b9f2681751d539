//! 统一的错误处理类型
//!
//! 容器内部使用 `ContainerError` 表达各类失败；用户代码提供的回调
//! 可以返回任意 `anyhow::Error`，通过 `Other` 变体进入容器错误体系。

use thiserror::Error;

/// 用户回调抛出的原始原因
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 实例化失败：无可用构造方法/工厂方法、目标为抽象定义、或调用目标抛出异常。
    /// 由调用目标触发时 `cause` 总是携带原始原因。
    #[error("Failed to instantiate bean '{bean_name}': {message}")]
    Instantiation {
        bean_name: String,
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// 初始化阶段（属性填充、感知回调、前后置钩子、init 方法）抛出的错误
    #[error("Failed to initialize bean '{bean_name}': {message}")]
    Initialization {
        bean_name: String,
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// 销毁回调抛出的错误；只记录，不向外传播，保证其余单例照常销毁
    #[error("Failed to destroy bean '{bean_name}': {message}")]
    Destruction { bean_name: String, message: String },

    /// 当前实例化策略不支持方法注入
    #[error("Method Injection not supported in {0}")]
    MethodInjectionUnsupported(&'static str),

    #[error("Bean '{0}' not found in container")]
    BeanNotFound(String),

    #[error("Bean '{0}' already exists")]
    BeanAlreadyExists(String),

    #[error("Type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// 循环依赖，携带创建链描述
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// 配置已冻结，不再允许修改 Bean 定义
    #[error("Configuration is frozen: {0}")]
    ConfigurationFrozen(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContainerError {
    pub(crate) fn instantiation(bean_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Instantiation {
            bean_name: bean_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub(crate) fn instantiation_with_cause(
        bean_name: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::Instantiation {
            bean_name: bean_name.into(),
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub(crate) fn initialization_with_cause(
        bean_name: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::Initialization {
            bean_name: bean_name.into(),
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;
