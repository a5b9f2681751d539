//! Bean 定义 - 描述如何创建和管理一个 Bean
//!
//! `BeanDefinition` 是容器的配方：实现类型、构造方法/工厂方法、
//! 方法覆盖、作用域、生命周期回调。注册之后定义是只读的，唯一的
//! 例外是惰性记忆化的"已解析成员"槽位，由定义私有的锁保护。

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ContainerError, ContainerResult};
use crate::instantiation::FactoryInvocation;
use crate::lifecycle::{
    AwareContext, BeanFactoryAware, BeanNameAware, DisposableBean, InitializingBean,
};
use crate::method_override::{
    LookupOverride, MethodOverride, MethodOverrides, MethodSignature, ReplaceOverride,
};
use crate::subclass::{OverrideDispatcher, RecipeShape};
use crate::Scope;

/// 容器交付的 Bean 实例
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// 尚未进入共享状态的原始实例
pub type RawBean = Box<dyn Any + Send + Sync>;

/// 构造方法 / 工厂方法 / 参数化查找使用的参数
pub type BeanArg = Arc<dyn Any + Send + Sync>;

/// "工厂合法地产出了空" 的占位对象
///
/// 工厂方法返回 `None` 时实例化结果被归一化为 `NullBean`，调用方可以
/// 统一地把每次成功创建当作"产出了一个值"。Lookup 派发在交付前会做
/// 身份检查，把占位还原为真正的缺失。
#[derive(Debug)]
pub struct NullBean;

impl NullBean {
    /// 身份检查：该实例是否是容器自己的 Null 占位
    pub fn is(bean: &(dyn Any + Send + Sync)) -> bool {
        bean.downcast_ref::<NullBean>().is_some()
    }

    pub fn instance() -> BeanInstance {
        Arc::new(NullBean)
    }
}

/// 生命周期回调类型
pub type PropertyCallback =
    Box<dyn Fn(&mut (dyn Any + Send + Sync)) -> ContainerResult<()> + Send + Sync>;
pub type AwareCallback =
    Box<dyn Fn(&mut (dyn Any + Send + Sync), &AwareContext) -> ContainerResult<()> + Send + Sync>;
pub type InitCallback =
    Box<dyn Fn(&mut (dyn Any + Send + Sync)) -> ContainerResult<()> + Send + Sync>;
pub type DestroyCallback =
    Box<dyn Fn(&mut (dyn Any + Send + Sync)) -> ContainerResult<()> + Send + Sync>;

/// 覆盖派发器的挂载回调：构造完成后把派发器装进实例
pub type DispatchBinder =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), Arc<OverrideDispatcher>) -> bool + Send + Sync>;

/// 带方法名的回调（自定义 init / destroy 方法）
pub struct NamedCallback {
    pub method_name: String,
    pub(crate) callback: InitCallback,
}

/// 将类型擦除的实例向下转换并应用回调
fn apply_to<T: Any>(
    bean: &mut (dyn Any + Send + Sync),
    f: &dyn Fn(&mut T) -> ContainerResult<()>,
) -> ContainerResult<()> {
    match bean.downcast_mut::<T>() {
        Some(target) => f(target),
        None => Err(ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            found: "a bean instance of a different type".to_string(),
        }),
    }
}

type ConstructorFn = Arc<dyn Fn(&[BeanArg]) -> ContainerResult<RawBean> + Send + Sync>;

/// 构造方法：参数个数 + 调用闭包
pub struct Constructor {
    pub param_count: usize,
    invoke: ConstructorFn,
}

impl Constructor {
    pub fn new(
        param_count: usize,
        invoke: impl Fn(&[BeanArg]) -> ContainerResult<RawBean> + Send + Sync + 'static,
    ) -> Self {
        Self {
            param_count,
            invoke: Arc::new(invoke),
        }
    }

    /// 无参构造
    pub fn no_arg<T, F>(construct: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> ContainerResult<T> + Send + Sync + 'static,
    {
        Self::new(0, move |_args| {
            construct().map(|instance| Box::new(instance) as RawBean)
        })
    }

    /// 带参构造；参数由调用点（显式创建或参数化查找）提供
    pub fn with_args<T, F>(param_count: usize, construct: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&[BeanArg]) -> ContainerResult<T> + Send + Sync + 'static,
    {
        Self::new(param_count, move |args| {
            construct(args).map(|instance| Box::new(instance) as RawBean)
        })
    }

    pub(crate) fn invoke(&self, args: &[BeanArg]) -> ContainerResult<RawBean> {
        (self.invoke)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("param_count", &self.param_count)
            .finish()
    }
}

type FactoryMethodFn =
    Arc<dyn Fn(&FactoryInvocation<'_>) -> ContainerResult<Option<RawBean>> + Send + Sync>;

/// 工厂方法
///
/// `factory_bean_name` 声明该方法属于哪个 Bean（静态工厂为 `None`），
/// 用于循环引用诊断。闭包自行获取它需要的工厂实例（可以通过
/// `FactoryInvocation::get_bean` 回到容器），返回 `None` 表示合法地
/// 没有产出对象。
pub struct FactoryMethod {
    pub method_name: String,
    pub factory_bean_name: Option<String>,
    pub param_count: usize,
    invoke: FactoryMethodFn,
}

impl FactoryMethod {
    pub fn new<T, F>(method_name: impl Into<String>, param_count: usize, invoke: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&FactoryInvocation<'_>) -> ContainerResult<Option<T>> + Send + Sync + 'static,
    {
        Self {
            method_name: method_name.into(),
            factory_bean_name: None,
            param_count,
            invoke: Arc::new(move |invocation| {
                invoke(invocation).map(|value| value.map(|v| Box::new(v) as RawBean))
            }),
        }
    }

    /// 声明该工厂方法所属的 Bean
    pub fn on_bean(mut self, factory_bean_name: impl Into<String>) -> Self {
        self.factory_bean_name = Some(factory_bean_name.into());
        self
    }

    pub(crate) fn invoke(
        &self,
        invocation: &FactoryInvocation<'_>,
    ) -> ContainerResult<Option<RawBean>> {
        (self.invoke)(invocation)
    }
}

impl fmt::Debug for FactoryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryMethod")
            .field("method_name", &self.method_name)
            .field("factory_bean_name", &self.factory_bean_name)
            .field("param_count", &self.param_count)
            .finish()
    }
}

/// Bean 的来源：构造方法集合、工厂方法，或尚未声明（抽象定义）
#[derive(Debug)]
pub enum BeanSource {
    Constructors(Vec<Constructor>),
    Factory(FactoryMethod),
    /// 没有任何可执行成员；实例化时报"无具体实现"
    Abstract,
}

/// 惰性记忆化的已解析成员
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedMember {
    /// 构造方法集合中的下标
    Constructor(usize),
    Factory,
}

/// Bean 定义
pub struct BeanDefinition {
    /// Bean 的名称
    pub name: String,

    /// Bean 的作用域
    pub scope: Scope,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy: bool,

    /// Bean 的依赖列表（用于静态依赖分析和预实例化排序）
    pub dependencies: Vec<String>,

    type_id: TypeId,
    type_name: &'static str,
    source: BeanSource,
    method_overrides: MethodOverrides,
    dispatch_binder: Option<DispatchBinder>,
    property_callback: Option<PropertyCallback>,
    aware_callbacks: Vec<AwareCallback>,
    init_callback: Option<InitCallback>,
    init_method: Option<NamedCallback>,
    destroy_callback: Option<DestroyCallback>,
    destroy_method: Option<NamedCallback>,

    /// 已解析成员槽位；锁的粒度是单个定义，
    /// 不同定义的并发创建互不竞争
    resolved_member: Mutex<Option<ResolvedMember>>,
    resolutions: AtomicUsize,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义；来源默认为抽象，需要再声明构造方法或工厂方法
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::default(),
            lazy: false,
            dependencies: Vec::new(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            source: BeanSource::Abstract,
            method_overrides: MethodOverrides::new(),
            dispatch_binder: None,
            property_callback: None,
            aware_callbacks: Vec::new(),
            init_callback: None,
            init_method: None,
            destroy_callback: None,
            destroy_method: None,
            resolved_member: Mutex::new(None),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// 设置依赖列表
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// 追加一个候选构造方法
    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        match &mut self.source {
            BeanSource::Constructors(constructors) => constructors.push(constructor),
            _ => self.source = BeanSource::Constructors(vec![constructor]),
        }
        self
    }

    /// 声明工厂方法来源（替换已有来源）
    pub fn with_factory_method(mut self, factory_method: FactoryMethod) -> Self {
        self.source = BeanSource::Factory(factory_method);
        self
    }

    /// 注册 Lookup 覆盖：`T` 是被覆盖方法声明的返回类型
    pub fn with_lookup_override<T: Any + Send + Sync>(
        mut self,
        method_name: &str,
        param_count: usize,
        bean_name: Option<&str>,
    ) -> Self {
        self.method_overrides
            .add_override(MethodOverride::Lookup(LookupOverride::new::<T>(
                MethodSignature::new(method_name, param_count),
                bean_name,
            )));
        self
    }

    /// 注册 Replace 覆盖
    pub fn with_replace_override(
        mut self,
        method_name: &str,
        param_count: usize,
        replacer_bean_name: &str,
    ) -> Self {
        self.method_overrides
            .add_override(MethodOverride::Replace(ReplaceOverride::new(
                MethodSignature::new(method_name, param_count),
                replacer_bean_name,
            )));
        self
    }

    /// 整体设置方法覆盖
    pub fn with_method_overrides(mut self, method_overrides: MethodOverrides) -> Self {
        self.method_overrides = method_overrides;
        self
    }

    /// 设置派发器挂载回调；声明了方法覆盖的定义必须提供
    pub fn with_dispatch_binder<T: Any + Send + Sync>(
        mut self,
        bind: impl Fn(&mut T, Arc<OverrideDispatcher>) + Send + Sync + 'static,
    ) -> Self {
        self.dispatch_binder = Some(Arc::new(move |bean, dispatcher| {
            match bean.downcast_mut::<T>() {
                Some(target) => {
                    bind(target, dispatcher);
                    true
                }
                None => false,
            }
        }));
        self
    }

    /// 设置属性填充回调（外部协作者；在任何感知/初始化回调之前执行）
    pub fn with_property_values<T: Any + Send + Sync>(
        mut self,
        populate: impl Fn(&mut T) -> ContainerResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.property_callback = Some(Box::new(move |bean| apply_to::<T>(bean, &populate)));
        self
    }

    /// 接通 `BeanNameAware` 感知回调
    pub fn bean_name_aware<T: Any + Send + Sync + BeanNameAware>(mut self) -> Self {
        self.aware_callbacks.push(Box::new(|bean, ctx| {
            apply_to::<T>(bean, &|target| {
                target.set_bean_name(&ctx.bean_name);
                Ok(())
            })
        }));
        self
    }

    /// 接通 `BeanFactoryAware` 感知回调
    pub fn bean_factory_aware<T: Any + Send + Sync + BeanFactoryAware>(mut self) -> Self {
        self.aware_callbacks.push(Box::new(|bean, ctx| {
            apply_to::<T>(bean, &|target| {
                target.set_bean_factory(Arc::clone(&ctx.bean_factory));
                Ok(())
            })
        }));
        self
    }

    /// 接通 `InitializingBean::after_properties_set`
    pub fn initializing_bean<T: Any + Send + Sync + InitializingBean>(mut self) -> Self {
        self.init_callback = Some(Box::new(|bean| {
            apply_to::<T>(bean, &|target| target.after_properties_set())
        }));
        self
    }

    /// 设置自定义 init 方法；与 `after_properties_set` 重名时会被跳过
    pub fn with_init_method<T: Any + Send + Sync>(
        mut self,
        method_name: impl Into<String>,
        init: impl Fn(&mut T) -> ContainerResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.init_method = Some(NamedCallback {
            method_name: method_name.into(),
            callback: Box::new(move |bean| apply_to::<T>(bean, &init)),
        });
        self
    }

    /// 接通 `DisposableBean::destroy`
    pub fn disposable_bean<T: Any + Send + Sync + DisposableBean>(mut self) -> Self {
        self.destroy_callback = Some(Box::new(|bean| {
            apply_to::<T>(bean, &|target| target.destroy())
        }));
        self
    }

    /// 设置自定义 destroy 方法；与 `destroy` 重名时会被跳过
    pub fn with_destroy_method<T: Any + Send + Sync>(
        mut self,
        method_name: impl Into<String>,
        destroy: impl Fn(&mut T) -> ContainerResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.destroy_method = Some(NamedCallback {
            method_name: method_name.into(),
            callback: Box::new(move |bean| apply_to::<T>(bean, &destroy)),
        });
        self
    }

    /// Bean 类型标识。注意不要与 `Any::type_id` 混用:
    /// 通过 `Arc<BeanDefinition>` 调用 `Any::type_id` 得到的是 Arc 自身的 TypeId。
    pub fn bean_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn has_method_overrides(&self) -> bool {
        !self.method_overrides.is_empty()
    }

    pub fn method_overrides(&self) -> &MethodOverrides {
        &self.method_overrides
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.source, BeanSource::Abstract)
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.source, BeanSource::Factory(_))
    }

    /// 是否需要在容器关闭时执行销毁回调
    pub fn requires_destruction(&self) -> bool {
        self.destroy_callback.is_some() || self.destroy_method.is_some()
    }

    pub(crate) fn dispatch_binder(&self) -> Option<&DispatchBinder> {
        self.dispatch_binder.as_ref()
    }

    pub(crate) fn property_callback(&self) -> Option<&PropertyCallback> {
        self.property_callback.as_ref()
    }

    pub(crate) fn aware_callbacks(&self) -> &[AwareCallback] {
        &self.aware_callbacks
    }

    pub(crate) fn init_callback(&self) -> Option<&InitCallback> {
        self.init_callback.as_ref()
    }

    pub(crate) fn init_method(&self) -> Option<&NamedCallback> {
        self.init_method.as_ref()
    }

    pub(crate) fn destroy_callback(&self) -> Option<&DestroyCallback> {
        self.destroy_callback.as_ref()
    }

    pub(crate) fn destroy_method(&self) -> Option<&NamedCallback> {
        self.destroy_method.as_ref()
    }

    pub(crate) fn factory_method(&self) -> Option<&FactoryMethod> {
        match &self.source {
            BeanSource::Factory(factory_method) => Some(factory_method),
            _ => None,
        }
    }

    /// 增强类缓存键：基于定义内容的值相等，与对象身份无关
    pub(crate) fn shape(&self) -> RecipeShape {
        RecipeShape {
            type_id: self.type_id,
            overrides: self.method_overrides.shape_key(),
        }
    }

    /// 解析指定参数个数的构造方法，并把结果记忆在定义的槽位里
    ///
    /// 槽位由定义私有的锁保护：同一定义的并发创建只在成员解析上
    /// 串行，不同定义互不竞争。
    pub(crate) fn resolve_constructor(&self, required_arity: usize) -> ContainerResult<&Constructor> {
        let constructors = match &self.source {
            BeanSource::Constructors(constructors) => constructors,
            BeanSource::Abstract => {
                return Err(ContainerError::instantiation(
                    &self.name,
                    "Specified definition is abstract: no concrete implementation",
                ))
            }
            BeanSource::Factory(_) => {
                return Err(ContainerError::instantiation(
                    &self.name,
                    "Definition declares a factory method; no constructor available",
                ))
            }
        };

        let mut slot = self.resolved_member.lock();
        if let Some(ResolvedMember::Constructor(index)) = *slot {
            if constructors[index].param_count == required_arity {
                return Ok(&constructors[index]);
            }
        }

        let index = constructors
            .iter()
            .position(|c| c.param_count == required_arity)
            .ok_or_else(|| {
                let message = if required_arity == 0 {
                    "No default constructor found".to_string()
                } else {
                    format!("No constructor with {} argument(s) found", required_arity)
                };
                ContainerError::instantiation(&self.name, message)
            })?;

        *slot = Some(ResolvedMember::Constructor(index));
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            "Resolved constructor with {} argument(s) for bean '{}'",
            required_arity,
            self.name
        );
        Ok(&constructors[index])
    }

    /// 标记工厂方法已解析（记忆化槽位的工厂分支）
    pub(crate) fn mark_factory_resolved(&self) {
        let mut slot = self.resolved_member.lock();
        if slot.is_none() {
            *slot = Some(ResolvedMember::Factory);
            self.resolutions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn resolved_member(&self) -> Option<ResolvedMember> {
        *self.resolved_member.lock()
    }

    /// 成员解析发生的次数（诊断用）
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("dependencies", &self.dependencies)
            .field("type_name", &self.type_name)
            .field("method_overrides", &self.method_overrides.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: i32,
    }

    #[test]
    fn test_definition_starts_abstract() {
        let definition = BeanDefinition::new::<Counter>("counter");
        assert!(definition.is_abstract());
        assert!(definition.resolve_constructor(0).is_err());
    }

    #[test]
    fn test_constructor_resolution_is_memoized() {
        let definition = BeanDefinition::new::<Counter>("counter")
            .with_constructor(Constructor::no_arg(|| Ok(Counter { value: 0 })));

        assert_eq!(definition.resolution_count(), 0);
        assert!(definition.resolved_member().is_none());

        definition.resolve_constructor(0).unwrap();
        assert_eq!(definition.resolution_count(), 1);
        assert_eq!(
            definition.resolved_member(),
            Some(ResolvedMember::Constructor(0))
        );

        // 第二次解析命中槽位，不再搜索
        definition.resolve_constructor(0).unwrap();
        assert_eq!(definition.resolution_count(), 1);
    }

    #[test]
    fn test_missing_constructor_arity() {
        let definition = BeanDefinition::new::<Counter>("counter")
            .with_constructor(Constructor::no_arg(|| Ok(Counter { value: 0 })));

        let err = definition.resolve_constructor(2).unwrap_err();
        assert!(err.to_string().contains("No constructor with 2 argument(s)"));
    }

    #[test]
    fn test_null_bean_identity() {
        let placeholder = NullBean::instance();
        let ordinary: BeanInstance = Arc::new(Counter { value: 1 });

        assert!(NullBean::is(&*placeholder));
        assert!(!NullBean::is(&*ordinary));
    }
}
