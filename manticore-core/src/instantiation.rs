//! 实例化策略 - 把定义变成原始实例
//!
//! 两级策略：`SimpleInstantiationStrategy` 处理构造方法和工厂方法，
//! 声明了方法覆盖的定义则委托给 `EnhancedInstantiationStrategy`，
//! 后者生成增强类并在实例上挂载覆盖派发器。

use std::cell::RefCell;
use std::sync::Arc;

use crate::bean::{BeanArg, BeanDefinition, NullBean, RawBean};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::subclass::{OverrideDispatcher, SubclassCache};

/// 正在执行的工厂方法的标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryMethodRef {
    pub bean_name: String,
    pub method_name: String,
}

/// 一次创建请求的上下文
///
/// 按引用沿调用链传递，而不是线程局部状态；创建链和"正在执行的
/// 工厂方法"槽位都只属于这一次请求。非 `Sync`，不跨线程共享。
pub struct CreationContext {
    chain: RefCell<Vec<String>>,
    in_flight_factory: RefCell<Option<FactoryMethodRef>>,
}

impl CreationContext {
    pub fn new() -> Self {
        Self {
            chain: RefCell::new(Vec::new()),
            in_flight_factory: RefCell::new(None),
        }
    }

    /// 当前正在执行的工厂方法；嵌套调用时是最内层的那个
    pub fn currently_invoked_factory_method(&self) -> Option<FactoryMethodRef> {
        self.in_flight_factory.borrow().clone()
    }

    pub(crate) fn is_creating(&self, bean_name: &str) -> bool {
        self.chain.borrow().iter().any(|name| name == bean_name)
    }

    pub(crate) fn creation_chain(&self) -> Vec<String> {
        self.chain.borrow().clone()
    }

    /// 把 Bean 压入创建链；守卫释放时弹出
    pub(crate) fn enter_creation<'a>(&'a self, bean_name: &str) -> ChainGuard<'a> {
        self.chain.borrow_mut().push(bean_name.to_string());
        ChainGuard { ctx: self }
    }

    /// 记录正在执行的工厂方法；守卫释放时严格恢复之前的值,
    /// 嵌套的工厂调用因此正确恢复外层状态
    pub(crate) fn enter_factory_method<'a>(
        &'a self,
        factory_method: FactoryMethodRef,
    ) -> InFlightGuard<'a> {
        let previous = self.in_flight_factory.borrow_mut().replace(factory_method);
        InFlightGuard { ctx: self, previous }
    }
}

impl Default for CreationContext {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct ChainGuard<'a> {
    ctx: &'a CreationContext,
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        self.ctx.chain.borrow_mut().pop();
    }
}

pub(crate) struct InFlightGuard<'a> {
    ctx: &'a CreationContext,
    previous: Option<FactoryMethodRef>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.ctx.in_flight_factory.borrow_mut() = self.previous.take();
    }
}

/// 工厂方法闭包看到的调用环境
///
/// 闭包通过它回到容器：获取所属的工厂 Bean、协作者、或查询当前
/// 正在执行的工厂方法。经由这里的获取共享同一条创建链，循环引用
/// 在链上可见。
pub struct FactoryInvocation<'a> {
    owner: &'a Arc<DefaultListableBeanFactory>,
    ctx: &'a CreationContext,
    pub args: &'a [BeanArg],
}

impl<'a> FactoryInvocation<'a> {
    pub(crate) fn new(
        owner: &'a Arc<DefaultListableBeanFactory>,
        ctx: &'a CreationContext,
        args: &'a [BeanArg],
    ) -> Self {
        Self { owner, ctx, args }
    }

    pub fn owner(&self) -> &Arc<DefaultListableBeanFactory> {
        self.owner
    }

    /// 在当前创建链上获取一个 Bean
    pub fn get_bean(&self, name: &str) -> ContainerResult<crate::bean::BeanInstance> {
        self.owner.get_bean_in_context(name, None, self.ctx)
    }

    pub fn currently_invoked_factory_method(&self) -> Option<FactoryMethodRef> {
        self.ctx.currently_invoked_factory_method()
    }
}

/// 实例化策略
pub trait InstantiationStrategy: Send + Sync {
    /// 默认构造路径
    fn instantiate(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
    ) -> ContainerResult<RawBean>;

    /// 显式参数路径
    fn instantiate_with_args(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean>;

    /// 工厂方法路径
    fn instantiate_with_factory_method(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean>;

    /// 方法注入路径；基础策略不支持
    fn instantiate_with_method_injection(
        &self,
        _definition: &Arc<BeanDefinition>,
        _owner: &Arc<DefaultListableBeanFactory>,
        _ctx: &CreationContext,
        _args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        Err(ContainerError::MethodInjectionUnsupported(
            "SimpleInstantiationStrategy",
        ))
    }
}

/// 基础实例化策略
pub struct SimpleInstantiationStrategy;

impl SimpleInstantiationStrategy {
    pub fn new() -> Self {
        Self
    }

    fn instantiate_constructor(
        &self,
        definition: &Arc<BeanDefinition>,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        let constructor = definition.resolve_constructor(args.len())?;
        constructor.invoke(args).map_err(|err| match err {
            // 协作者的循环依赖原样向外传播
            circular @ ContainerError::CircularDependency(_) => circular,
            other => ContainerError::instantiation_with_cause(
                &definition.name,
                "Constructor threw exception",
                other,
            ),
        })
    }

    fn invoke_factory_method(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        let factory_method = definition.factory_method().ok_or_else(|| {
            ContainerError::instantiation(
                &definition.name,
                "Definition does not declare a factory method",
            )
        })?;

        let invocation = FactoryInvocation::new(owner, ctx, args);
        let result = {
            let _guard = ctx.enter_factory_method(FactoryMethodRef {
                bean_name: definition.name.clone(),
                method_name: factory_method.method_name.clone(),
            });
            factory_method.invoke(&invocation)
        };

        match result {
            Ok(Some(raw)) => {
                definition.mark_factory_resolved();
                Ok(raw)
            }
            Ok(None) => {
                definition.mark_factory_resolved();
                tracing::debug!(
                    "Factory method '{}' returned null for bean '{}', using placeholder",
                    factory_method.method_name,
                    definition.name
                );
                Ok(Box::new(NullBean))
            }
            Err(err) => {
                let mut message =
                    format!("Factory method '{}' threw exception", factory_method.method_name);
                if let Some(owner_name) = &factory_method.factory_bean_name {
                    if owner.is_currently_in_creation(owner_name) {
                        message = format!(
                            "Circular reference involving containing bean '{}' - consider \
                             declaring the factory method as static for independence from \
                             its containing instance. {}",
                            owner_name, message
                        );
                    }
                }
                Err(ContainerError::instantiation_with_cause(
                    &definition.name,
                    message,
                    err,
                ))
            }
        }
    }
}

impl Default for SimpleInstantiationStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl InstantiationStrategy for SimpleInstantiationStrategy {
    fn instantiate(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
    ) -> ContainerResult<RawBean> {
        if definition.has_method_overrides() {
            return self.instantiate_with_method_injection(definition, owner, ctx, &[]);
        }
        self.instantiate_constructor(definition, &[])
    }

    fn instantiate_with_args(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        if definition.has_method_overrides() {
            return self.instantiate_with_method_injection(definition, owner, ctx, args);
        }
        self.instantiate_constructor(definition, args)
    }

    fn instantiate_with_factory_method(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        self.invoke_factory_method(definition, owner, ctx, args)
    }
}

/// 带方法注入支持的实例化策略；容器的默认策略
pub struct EnhancedInstantiationStrategy {
    simple: SimpleInstantiationStrategy,
    cache: Arc<SubclassCache>,
}

impl EnhancedInstantiationStrategy {
    pub fn new(cache: Arc<SubclassCache>) -> Self {
        Self {
            simple: SimpleInstantiationStrategy::new(),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<SubclassCache> {
        &self.cache
    }
}

impl InstantiationStrategy for EnhancedInstantiationStrategy {
    fn instantiate(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
    ) -> ContainerResult<RawBean> {
        if definition.has_method_overrides() {
            return self.instantiate_with_method_injection(definition, owner, ctx, &[]);
        }
        self.simple.instantiate(definition, owner, ctx)
    }

    fn instantiate_with_args(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        if definition.has_method_overrides() {
            return self.instantiate_with_method_injection(definition, owner, ctx, args);
        }
        self.simple.instantiate_with_args(definition, owner, ctx, args)
    }

    fn instantiate_with_factory_method(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        self.simple
            .instantiate_with_factory_method(definition, owner, ctx, args)
    }

    fn instantiate_with_method_injection(
        &self,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
        _ctx: &CreationContext,
        args: &[BeanArg],
    ) -> ContainerResult<RawBean> {
        let _generation = self.cache.enter_generation_context(definition.type_name());
        let enhanced = self.cache.obtain(definition);

        let constructor = definition.resolve_constructor(args.len())?;
        let mut raw = constructor.invoke(args).map_err(|err| {
            ContainerError::instantiation_with_cause(
                &definition.name,
                "Constructor threw exception",
                err,
            )
        })?;

        let binder = definition.dispatch_binder().ok_or_else(|| {
            ContainerError::instantiation(
                &definition.name,
                "Definition declares method overrides but no dispatch binder",
            )
        })?;
        let dispatcher = Arc::new(OverrideDispatcher::new(enhanced, owner.weak_self()));
        if !binder(raw.as_mut(), dispatcher) {
            return Err(ContainerError::instantiation(
                &definition.name,
                "Dispatch binder rejected the instantiated bean",
            ));
        }
        tracing::debug!(
            "Attached override dispatcher to instance of bean '{}'",
            definition.name
        );
        Ok(raw)
    }
}
