//! 方法覆盖 - Method Injection 的声明部分
//!
//! 一个 Bean 定义可以声明若干被容器接管的方法：
//! - Lookup：方法返回从容器中查找到的另一个 Bean
//! - Replace：方法委托给一个可插拔的 `MethodReplacer`
//!
//! 同一方法签名在同一定义里只允许一种覆盖，后注册的覆盖替换先前的。

use std::any::{Any, TypeId};
use std::fmt;

use crate::bean::{BeanArg, BeanInstance};
use crate::error::ContainerResult;

/// 方法签名：方法名 + 参数个数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub method_name: String,
    pub param_count: usize,
}

impl MethodSignature {
    pub fn new(method_name: impl Into<String>, param_count: usize) -> Self {
        Self {
            method_name: method_name.into(),
            param_count,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.method_name, self.param_count)
    }
}

/// Lookup 覆盖：方法被接管为容器查找
///
/// 配置了 `bean_name` 时按名称查找；否则按被覆盖方法声明的返回类型查找。
#[derive(Debug, Clone)]
pub struct LookupOverride {
    pub method: MethodSignature,
    pub bean_name: Option<String>,
    pub return_type: TypeId,
    pub return_type_name: &'static str,
}

impl LookupOverride {
    pub fn new<T: Any + Send + Sync>(
        method: MethodSignature,
        bean_name: Option<impl Into<String>>,
    ) -> Self {
        Self {
            method,
            bean_name: bean_name.map(Into::into),
            return_type: TypeId::of::<T>(),
            return_type_name: std::any::type_name::<T>(),
        }
    }
}

/// Replace 覆盖：方法被接管为对指定 `MethodReplacer` 的调用
#[derive(Debug, Clone)]
pub struct ReplaceOverride {
    pub method: MethodSignature,
    pub replacer_bean_name: String,
}

impl ReplaceOverride {
    pub fn new(method: MethodSignature, replacer_bean_name: impl Into<String>) -> Self {
        Self {
            method,
            replacer_bean_name: replacer_bean_name.into(),
        }
    }
}

/// 方法覆盖
#[derive(Debug, Clone)]
pub enum MethodOverride {
    Lookup(LookupOverride),
    Replace(ReplaceOverride),
}

impl MethodOverride {
    pub fn signature(&self) -> &MethodSignature {
        match self {
            MethodOverride::Lookup(lo) => &lo.method,
            MethodOverride::Replace(ro) => &ro.method,
        }
    }
}

/// 一个 Bean 定义声明的全部方法覆盖
#[derive(Debug, Clone, Default)]
pub struct MethodOverrides {
    overrides: Vec<MethodOverride>,
}

impl MethodOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条覆盖；同签名的已有覆盖被替换（一个签名只允许一种覆盖）
    pub fn add_override(&mut self, method_override: MethodOverride) {
        let signature = method_override.signature().clone();
        if let Some(existing) = self
            .overrides
            .iter_mut()
            .find(|o| *o.signature() == signature)
        {
            tracing::debug!("Replacing existing override for method '{}'", signature);
            *existing = method_override;
        } else {
            self.overrides.push(method_override);
        }
    }

    /// 按签名匹配覆盖
    pub fn get_override(&self, method_name: &str, param_count: usize) -> Option<&MethodOverride> {
        self.overrides.iter().find(|o| {
            let sig = o.signature();
            sig.method_name == method_name && sig.param_count == param_count
        })
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodOverride> {
        self.overrides.iter()
    }

    /// 生成用于增强类缓存的值相等键；与声明顺序无关
    pub(crate) fn shape_key(&self) -> Vec<OverrideKey> {
        let mut keys: Vec<OverrideKey> = self.overrides.iter().map(OverrideKey::from).collect();
        keys.sort_by(|a, b| a.signature().cmp(&b.signature()));
        keys
    }
}

/// 覆盖的内容键（基于值相等，不看对象身份）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum OverrideKey {
    Lookup {
        method: MethodSignature,
        bean_name: Option<String>,
        return_type: TypeId,
    },
    Replace {
        method: MethodSignature,
        replacer: String,
    },
}

impl OverrideKey {
    fn signature(&self) -> (&str, usize) {
        match self {
            OverrideKey::Lookup { method, .. } | OverrideKey::Replace { method, .. } => {
                (&method.method_name, method.param_count)
            }
        }
    }
}

impl From<&MethodOverride> for OverrideKey {
    fn from(method_override: &MethodOverride) -> Self {
        match method_override {
            MethodOverride::Lookup(lo) => OverrideKey::Lookup {
                method: lo.method.clone(),
                bean_name: lo.bean_name.clone(),
                return_type: lo.return_type,
            },
            MethodOverride::Replace(ro) => OverrideKey::Replace {
                method: ro.method.clone(),
                replacer: ro.replacer_bean_name.clone(),
            },
        }
    }
}

/// 泛型方法替换器
///
/// Replace 覆盖命中时，容器从自身取出命名的替换器并调用 `reimplement`，
/// 其返回值原样交还调用方。
pub trait MethodReplacer: Send + Sync {
    fn reimplement(
        &self,
        target: &(dyn Any + Send + Sync),
        method: &MethodSignature,
        args: &[BeanArg],
    ) -> ContainerResult<Option<BeanInstance>>;
}
