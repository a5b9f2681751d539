//! Bean Factory - 核心容器接口
//!
//! 容器的分层接口与默认实现。`DefaultListableBeanFactory` 负责
//! 完整的创建流水线：
//! 1. 实例化（构造方法 / 工厂方法 / 方法注入）
//! 2. 属性填充
//! 3. 感知回调（BeanNameAware, BeanFactoryAware）
//! 4. BeanPostProcessor.post_process_before_initialization
//! 5. InitializingBean.after_properties_set + 自定义 init 方法
//! 6. BeanPostProcessor.post_process_after_initialization
//! 7. 就绪（单例缓存 / 交付原型）

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{
    bean::{BeanArg, BeanDefinition, BeanInstance, NullBean},
    destruction::DisposableBeanRegistry,
    error::{ContainerError, ContainerResult},
    instantiation::{CreationContext, EnhancedInstantiationStrategy, InstantiationStrategy},
    lifecycle::{AwareContext, BeanPostProcessor, AFTER_PROPERTIES_SET},
    method_override::MethodReplacer,
    subclass::SubclassCache,
    utils::dependency::{self, CreationTracker},
    Scope,
};

/// BeanFactory - 最基础的容器接口
///
/// 提供基本的 Bean 访问功能
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance>;

    /// 通过名称获取 Bean 并向构造方法传入显式参数
    ///
    /// 仅在触发新实例创建时有效；已缓存的单例不接受参数。
    fn get_bean_with_args(&self, name: &str, args: &[BeanArg]) -> ContainerResult<BeanInstance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 检查指定名称的 Bean 当前是否正在创建（诊断用）
    fn is_currently_in_creation(&self, name: &str) -> bool;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过类型获取 Bean
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>>;

    /// 检查是否包含指定类型的 Bean
    fn contains_bean_by_type<T: Any + Send + Sync>(&self) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 的名称
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取指定类型的所有 Bean 名称
    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: BeanFactory {
    /// 注册 Bean 定义；注册之后定义不可修改
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()>;

    /// 检查是否包含指定的 Bean 定义
    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 移除 Bean 定义
    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()>;

    /// 获取单个 Bean 定义
    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>>;

    /// 添加 BeanPostProcessor
    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    /// 获取所有 BeanPostProcessor
    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>>;
}

/// ConfigurableListableBeanFactory - 可配置且可列举的 Bean 工厂
pub trait ConfigurableListableBeanFactory: ListableBeanFactory + ConfigurableBeanFactory {
    /// 按依赖序预实例化所有非延迟的单例 Bean
    fn preinstantiate_singletons(&self) -> ContainerResult<()>;

    /// 冻结配置（不再允许修改 Bean 定义）
    fn freeze_configuration(&self);

    /// 检查配置是否已冻结
    fn is_configuration_frozen(&self) -> bool;

    /// 销毁所有单例 Bean（按创建的逆序调用销毁回调）
    fn destroy_singletons(&self) -> ContainerResult<()>;

    /// 获取所有 Bean 的依赖声明（用于依赖验证等）
    fn get_bean_definitions(&self) -> HashMap<String, Vec<String>>;
}

/// DefaultListableBeanFactory - ConfigurableListableBeanFactory 的默认实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储
    definitions: RwLock<HashMap<String, Arc<BeanDefinition>>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, BeanInstance>>,

    /// 类型到名称的映射
    type_to_name: RwLock<HashMap<TypeId, String>>,

    /// 跨请求的创建标记（诊断用；循环检测走创建链）
    creation_tracker: CreationTracker,

    /// Bean 后置处理器列表（按优先级排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    /// 配置是否已冻结
    configuration_frozen: RwLock<bool>,

    /// 增强类缓存；容器级服务，随容器回收
    subclass_cache: Arc<SubclassCache>,

    /// 登记了销毁回调的单例
    disposables: DisposableBeanRegistry,

    /// 实例化策略；默认支持方法注入
    instantiation_strategy: RwLock<Arc<dyn InstantiationStrategy>>,

    myself: Weak<DefaultListableBeanFactory>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    ///
    /// 容器持有自身的弱引用，用于把容器注入感知回调和覆盖派发器。
    pub fn new() -> Arc<Self> {
        let subclass_cache = Arc::new(SubclassCache::new());
        Arc::new_cyclic(|myself| Self {
            definitions: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            type_to_name: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::new(),
            bean_post_processors: RwLock::new(Vec::new()),
            configuration_frozen: RwLock::new(false),
            subclass_cache: Arc::clone(&subclass_cache),
            disposables: DisposableBeanRegistry::new(),
            instantiation_strategy: RwLock::new(Arc::new(EnhancedInstantiationStrategy::new(
                subclass_cache,
            ))),
            myself: myself.clone(),
        })
    }

    /// 替换实例化策略
    pub fn set_instantiation_strategy(&self, strategy: Arc<dyn InstantiationStrategy>) {
        *self.instantiation_strategy.write() = strategy;
    }

    pub fn subclass_cache(&self) -> &Arc<SubclassCache> {
        &self.subclass_cache
    }

    pub(crate) fn weak_self(&self) -> Weak<DefaultListableBeanFactory> {
        self.myself.clone()
    }

    fn owner(&self) -> ContainerResult<Arc<DefaultListableBeanFactory>> {
        self.myself.upgrade().ok_or_else(|| {
            ContainerError::Other(anyhow::anyhow!("Bean factory is being dropped"))
        })
    }

    /// 注册单例 Bean 的便捷方法
    pub fn register_singleton<T, F>(&self, name: &str, construct: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_bean_definition(
            BeanDefinition::new::<T>(name)
                .with_constructor(crate::bean::Constructor::no_arg(move || Ok(construct()))),
        )
    }

    /// 注册原型 Bean 的便捷方法
    pub fn register_prototype<T, F>(&self, name: &str, construct: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_bean_definition(
            BeanDefinition::new::<T>(name)
                .with_scope(Scope::Prototype)
                .with_constructor(crate::bean::Constructor::no_arg(move || Ok(construct()))),
        )
    }

    /// 注册一个 MethodReplacer；替换器本身是容器管理的 Bean
    pub fn register_method_replacer(
        &self,
        name: &str,
        replacer: Arc<dyn MethodReplacer>,
    ) -> ContainerResult<()> {
        self.register_singleton::<Arc<dyn MethodReplacer>, _>(name, move || Arc::clone(&replacer))
    }

    /// 取出命名的 MethodReplacer
    pub(crate) fn get_method_replacer(
        &self,
        name: &str,
    ) -> ContainerResult<Arc<dyn MethodReplacer>> {
        let bean = self.get_bean(name)?;
        bean.downcast::<Arc<dyn MethodReplacer>>()
            .map(|replacer| Arc::clone(&*replacer))
            .map_err(|_| ContainerError::TypeMismatch {
                expected: "an Arc<dyn MethodReplacer> bean".to_string(),
                found: format!("bean '{}' of a different type", name),
            })
    }

    /// 验证已注册定义的依赖声明（缺失依赖、静态环）
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        dependency::validate_dependency_graph(&self.get_bean_definitions()).map_err(|e| match e {
            dependency::DependencyValidationError::CircularDependency { cycle } => {
                ContainerError::CircularDependency(cycle.join(" -> "))
            }
            other => ContainerError::Other(anyhow::anyhow!("{}", other)),
        })
    }

    /// 在给定创建链上获取 Bean；工厂方法闭包经由这里回到容器
    pub(crate) fn get_bean_in_context(
        &self,
        name: &str,
        args: Option<&[BeanArg]>,
        ctx: &CreationContext,
    ) -> ContainerResult<BeanInstance> {
        tracing::trace!("Requesting bean: '{}'", name);

        let definition = {
            let definitions = self.definitions.read();
            definitions.get(name).cloned().ok_or_else(|| {
                tracing::debug!("Bean '{}' not found in container", name);
                ContainerError::BeanNotFound(name.to_string())
            })?
        };

        match definition.scope {
            Scope::Singleton => {
                {
                    let singletons = self.singletons.read();
                    if let Some(bean) = singletons.get(name) {
                        if args.is_some() {
                            return Err(ContainerError::instantiation(
                                name,
                                "Cannot apply explicit arguments to an already-created singleton",
                            ));
                        }
                        tracing::debug!("Returning cached instance of singleton bean '{}'", name);
                        return Ok(Arc::clone(bean));
                    }
                }

                tracing::info!("Creating shared instance of singleton bean '{}'", name);
                let bean = self.create_with_guards(&definition, args, ctx)?;

                // 并发创建同名单例时先写入者胜出，后到的实例被丢弃
                let (canonical, won) = {
                    let mut singletons = self.singletons.write();
                    match singletons.entry(name.to_string()) {
                        Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
                        Entry::Vacant(slot) => {
                            slot.insert(Arc::clone(&bean));
                            (bean, true)
                        }
                    }
                };

                if won {
                    if definition.requires_destruction() && !NullBean::is(&*canonical) {
                        self.disposables.register(
                            name,
                            Arc::clone(&canonical),
                            Arc::clone(&definition),
                        );
                    }
                    tracing::debug!("Singleton bean '{}' created and cached", name);
                } else {
                    tracing::debug!(
                        "Discarding concurrently created instance of singleton bean '{}'",
                        name
                    );
                }
                Ok(canonical)
            }
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                self.create_with_guards(&definition, args, ctx)
            }
        }
    }

    /// 循环检测 + 创建标记下的实例创建
    fn create_with_guards(
        &self,
        definition: &Arc<BeanDefinition>,
        args: Option<&[BeanArg]>,
        ctx: &CreationContext,
    ) -> ContainerResult<BeanInstance> {
        let name = definition.name.as_str();

        // 循环检测基于本次请求的创建链，并发的同名创建互不干扰
        if ctx.is_creating(name) {
            let chain = ctx.creation_chain();
            return Err(ContainerError::CircularDependency(format!(
                "{} -> {}",
                chain.join(" -> "),
                name
            )));
        }
        let _chain_guard = ctx.enter_creation(name);

        // 跨请求的创建标记，供 is_currently_in_creation 观察
        self.creation_tracker.start_creating(name);
        struct TrackerGuard<'a> {
            tracker: &'a CreationTracker,
            name: &'a str,
        }
        impl Drop for TrackerGuard<'_> {
            fn drop(&mut self) {
                self.tracker.finish_creating(self.name);
            }
        }
        let _tracker_guard = TrackerGuard {
            tracker: &self.creation_tracker,
            name,
        };

        self.create_bean_internal(definition, args, ctx)
    }

    /// 创建 Bean 实例并调用生命周期回调
    fn create_bean_internal(
        &self,
        definition: &Arc<BeanDefinition>,
        args: Option<&[BeanArg]>,
        ctx: &CreationContext,
    ) -> ContainerResult<BeanInstance> {
        let name = definition.name.as_str();
        let owner = self.owner()?;

        // 实例化前短路：某个处理器可以直接给出成品实例。
        // 短路实例仍经过后置钩子（但不经过前置钩子和初始化回调）。
        if let Some(shortcut) = self.apply_post_processors_before_instantiation(name)? {
            return self.apply_post_processors_after_initialization(shortcut, name);
        }

        // 1. 实例化：按定义形态选择工厂方法 / 带参构造 / 默认构造
        let strategy = Arc::clone(&*self.instantiation_strategy.read());
        let raw = if definition.is_factory() {
            strategy.instantiate_with_factory_method(
                definition,
                &owner,
                ctx,
                args.unwrap_or(&[]),
            )?
        } else if let Some(args) = args {
            strategy.instantiate_with_args(definition, &owner, ctx, args)?
        } else {
            strategy.instantiate(definition, &owner, ctx)?
        };
        let mut bean: BeanInstance = Arc::from(raw);

        // Null 占位不经过属性填充和生命周期回调
        if NullBean::is(&*bean) {
            tracing::debug!("Bean '{}' resolved to the null placeholder", name);
            return Ok(bean);
        }

        // 2. 属性填充
        // 3. 感知回调
        self.populate_and_make_aware(&mut bean, definition, &owner)?;

        // 4. BeanPostProcessor.post_process_before_initialization
        let Some(current) = self.apply_post_processors_before_initialization(bean, name)? else {
            tracing::debug!(
                "Bean '{}' suppressed by a BeanPostProcessor before initialization",
                name
            );
            return Ok(NullBean::instance());
        };
        bean = current;

        // 5. InitializingBean.after_properties_set + 自定义 init 方法
        self.invoke_init_methods(&mut bean, definition)?;

        // 6. BeanPostProcessor.post_process_after_initialization
        self.apply_post_processors_after_initialization(bean, name)
    }

    fn populate_and_make_aware(
        &self,
        bean: &mut BeanInstance,
        definition: &Arc<BeanDefinition>,
        owner: &Arc<DefaultListableBeanFactory>,
    ) -> ContainerResult<()> {
        let name = definition.name.as_str();
        if definition.property_callback().is_none() && definition.aware_callbacks().is_empty() {
            return Ok(());
        }

        let Some(bean_mut) = Arc::get_mut(bean) else {
            tracing::warn!(
                "Cannot populate bean '{}': multiple references exist",
                name
            );
            return Ok(());
        };

        if let Some(populate) = definition.property_callback() {
            populate(bean_mut).map_err(|e| {
                ContainerError::initialization_with_cause(name, "Property population failed", e)
            })?;
        }

        if !definition.aware_callbacks().is_empty() {
            let aware_ctx = AwareContext {
                bean_name: name.to_string(),
                bean_factory: Arc::clone(owner),
            };
            for aware in definition.aware_callbacks() {
                aware(bean_mut, &aware_ctx).map_err(|e| {
                    ContainerError::initialization_with_cause(
                        name,
                        "Awareness callback threw exception",
                        e,
                    )
                })?;
            }
        }
        Ok(())
    }

    fn invoke_init_methods(
        &self,
        bean: &mut BeanInstance,
        definition: &Arc<BeanDefinition>,
    ) -> ContainerResult<()> {
        let name = definition.name.as_str();
        if definition.init_callback().is_none() && definition.init_method().is_none() {
            return Ok(());
        }

        let Some(bean_mut) = Arc::get_mut(bean) else {
            tracing::warn!(
                "Cannot invoke init methods on bean '{}': multiple references exist",
                name
            );
            return Ok(());
        };

        if let Some(init) = definition.init_callback() {
            tracing::trace!("Invoking after_properties_set on bean '{}'", name);
            init(bean_mut).map_err(|e| {
                ContainerError::initialization_with_cause(
                    name,
                    "after_properties_set threw exception",
                    e,
                )
            })?;
        }

        if let Some(named) = definition.init_method() {
            // 与 after_properties_set 重名的自定义方法不再重复调用
            if definition.init_callback().is_some() && named.method_name == AFTER_PROPERTIES_SET {
                tracing::trace!(
                    "Skipping custom init method '{}' on bean '{}': already invoked",
                    named.method_name,
                    name
                );
            } else {
                tracing::trace!(
                    "Invoking custom init method '{}' on bean '{}'",
                    named.method_name,
                    name
                );
                (named.callback)(bean_mut).map_err(|e| {
                    ContainerError::initialization_with_cause(
                        name,
                        format!("Custom init method '{}' threw exception", named.method_name),
                        e,
                    )
                })?;
            }
        }
        Ok(())
    }

    /// 实例化前短路钩子；第一个给出实例的处理器生效
    fn apply_post_processors_before_instantiation(
        &self,
        bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        // 在调用钩子前释放读锁,钩子内部可能再进入工厂
        let processors = self.bean_post_processors.read().clone();
        for processor in processors.iter() {
            if let Some(bean) = processor.post_process_before_instantiation(bean_name)? {
                tracing::debug!(
                    "Bean '{}' short-circuited before instantiation by '{}'",
                    bean_name,
                    processor.name()
                );
                return Ok(Some(bean));
            }
        }
        Ok(None)
    }

    /// 前置初始化钩子链；任一处理器返回 `None` 则整条链终止
    fn apply_post_processors_before_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<Option<BeanInstance>> {
        let processors = self.bean_post_processors.read().clone();
        let mut current = bean;
        for processor in processors.iter() {
            match processor.post_process_before_initialization(current, bean_name)? {
                Some(replacement) => current = replacement,
                None => {
                    tracing::debug!(
                        "BeanPostProcessor '{}' returned null for bean '{}'",
                        processor.name(),
                        bean_name
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// 后置初始化钩子链；返回 `None` 的处理器保留当前实例并停止链
    fn apply_post_processors_after_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        let processors = self.bean_post_processors.read().clone();
        let mut current = bean;
        for processor in processors.iter() {
            match processor.post_process_after_initialization(Arc::clone(&current), bean_name)? {
                Some(replacement) => current = replacement,
                // None 表示保留当前实例并提前结束链
                None => break,
            }
        }
        Ok(current)
    }

    /// 按声明的返回类型查找 Bean；Lookup 覆盖未配置名称时使用
    pub(crate) fn get_bean_for_type(
        &self,
        type_id: TypeId,
        type_name: &str,
        args: Option<&[BeanArg]>,
    ) -> ContainerResult<BeanInstance> {
        let name = self.find_name_for_type(type_id, type_name).ok_or_else(|| {
            ContainerError::BeanNotFound(format!("No bean found for type '{}'", type_name))
        })?;
        match args {
            Some(args) => self.get_bean_with_args(&name, args),
            None => self.get_bean(&name),
        }
    }

    fn find_name_for_type(&self, type_id: TypeId, type_name: &str) -> Option<String> {
        // 首先尝试通过 TypeId 查找
        {
            let type_to_name = self.type_to_name.read();
            if let Some(name) = type_to_name.get(&type_id) {
                return Some(name.clone());
            }
        }
        // TypeId 查找失败，尝试类型名称匹配
        let definitions = self.definitions.read();
        definitions
            .iter()
            .find(|(_, definition)| definition.type_name() == type_name)
            .map(|(name, _)| name.clone())
    }

    /// 已登记销毁回调的单例数量（诊断用）
    pub fn disposable_count(&self) -> usize {
        self.disposables.len()
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.get_bean_in_context(name, None, &CreationContext::new())
    }

    fn get_bean_with_args(&self, name: &str, args: &[BeanArg]) -> ContainerResult<BeanInstance> {
        self.get_bean_in_context(name, Some(args), &CreationContext::new())
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.is_creating(name)
    }
}

impl BeanFactoryExt for DefaultListableBeanFactory {
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        let bean = self.get_bean_for_type(TypeId::of::<T>(), type_name, None)?;
        bean.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
            expected: type_name.to_string(),
            found: "unknown".to_string(),
        })
    }

    fn contains_bean_by_type<T: Any + Send + Sync>(&self) -> bool {
        self.find_name_for_type(TypeId::of::<T>(), std::any::type_name::<T>())
            .is_some()
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        let definitions = self.definitions.read();
        definitions
            .iter()
            .filter(|(_, definition)| definition.bean_type_id() == type_id)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn get_bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        if *self.configuration_frozen.read() {
            return Err(ContainerError::ConfigurationFrozen(format!(
                "Cannot register bean definition '{}'",
                definition.name
            )));
        }

        let name = definition.name.clone();
        let type_id = definition.bean_type_id();

        tracing::trace!(
            "Attempting to register bean: name='{}', type='{}', scope={:?}",
            name,
            definition.type_name(),
            definition.scope
        );

        {
            let definitions = self.definitions.read();
            if definitions.contains_key(&name) {
                tracing::warn!("Bean '{}' already exists, registration failed", name);
                return Err(ContainerError::BeanAlreadyExists(name));
            }
        }

        {
            let mut definitions = self.definitions.write();
            definitions.insert(name.clone(), Arc::new(definition));
        }
        {
            let mut type_to_name = self.type_to_name.write();
            type_to_name.insert(type_id, name.clone());
        }

        tracing::debug!("Bean definition registered successfully: '{}'", name);
        Ok(())
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()> {
        if *self.configuration_frozen.read() {
            return Err(ContainerError::ConfigurationFrozen(format!(
                "Cannot remove bean definition '{}'",
                name
            )));
        }

        let removed = {
            let mut definitions = self.definitions.write();
            definitions
                .remove(name)
                .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?
        };

        let mut type_to_name = self.type_to_name.write();
        if type_to_name.get(&removed.bean_type_id()).map(String::as_str) == Some(name) {
            type_to_name.remove(&removed.bean_type_id());
        }

        tracing::debug!("Bean definition removed: '{}'", name);
        Ok(())
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);

        // 按优先级排序（order 值越小优先级越高）
        processors.sort_by_key(|p| p.order());
    }

    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }
}

impl ConfigurableListableBeanFactory for DefaultListableBeanFactory {
    fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        self.validate_dependencies()?;

        let ordered = dependency::topological_sort(&self.get_bean_definitions())
            .map_err(ContainerError::CircularDependency)?;

        let eager: Vec<String> = {
            let definitions = self.definitions.read();
            ordered
                .into_iter()
                .filter(|name| {
                    definitions
                        .get(name)
                        .map(|definition| definition.scope.is_singleton() && !definition.lazy)
                        .unwrap_or(false)
                })
                .collect()
        };

        tracing::debug!("Pre-instantiating {} singleton beans", eager.len());
        for name in eager {
            self.get_bean(&name)?;
        }
        Ok(())
    }

    fn freeze_configuration(&self) {
        *self.configuration_frozen.write() = true;
        tracing::debug!("Bean factory configuration frozen");
    }

    fn is_configuration_frozen(&self) -> bool {
        *self.configuration_frozen.read()
    }

    fn destroy_singletons(&self) -> ContainerResult<()> {
        tracing::info!("Destroying singleton beans");

        // 先清空缓存，让注册表持有的引用成为唯一引用
        self.singletons.write().clear();
        self.disposables.destroy_all();

        tracing::info!("Singleton beans destruction completed");
        Ok(())
    }

    fn get_bean_definitions(&self) -> HashMap<String, Vec<String>> {
        let definitions = self.definitions.read();
        definitions
            .iter()
            .map(|(name, definition)| (name.clone(), definition.dependencies.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::bean::Constructor;
    use crate::bean::FactoryMethod;
    use crate::lifecycle::{
        BeanFactoryAware, BeanNameAware, DisposableBean, InitializingBean,
    };
    use crate::method_override::{MethodReplacer, MethodSignature};
    use crate::subclass::DispatcherSlot;

    type EventLog = Arc<Mutex<Vec<String>>>;

    fn log(events: &EventLog, event: impl Into<String>) {
        events.lock().push(event.into());
    }

    #[derive(Default)]
    struct Service {
        bean_name: String,
        wired: bool,
    }

    impl BeanNameAware for Service {
        fn set_bean_name(&mut self, bean_name: &str) {
            self.bean_name = bean_name.to_string();
        }
    }

    #[test]
    fn test_singleton_is_cached() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();

        let first = factory.get_bean("service").unwrap();
        let second = factory.get_bean("service").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_prototype_is_fresh_each_time() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_prototype::<Service, _>("service", Service::default)
            .unwrap();

        let first = factory.get_bean("service").unwrap();
        let second = factory.get_bean("service").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_bean() {
        let factory = DefaultListableBeanFactory::new();
        assert!(matches!(
            factory.get_bean("nope"),
            Err(ContainerError::BeanNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();
        assert!(matches!(
            factory.register_singleton::<Service, _>("service", Service::default),
            Err(ContainerError::BeanAlreadyExists(_))
        ));
    }

    #[test]
    fn test_frozen_configuration_rejects_changes() {
        let factory = DefaultListableBeanFactory::new();
        factory.freeze_configuration();
        assert!(factory.is_configuration_frozen());
        assert!(matches!(
            factory.register_singleton::<Service, _>("service", Service::default),
            Err(ContainerError::ConfigurationFrozen(_))
        ));
        assert!(matches!(
            factory.remove_bean_definition("service"),
            Err(ContainerError::ConfigurationFrozen(_))
        ));
    }

    #[test]
    fn test_get_bean_by_type() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();

        let service = factory.get_bean_by_type::<Service>().unwrap();
        assert!(!service.wired);
        assert!(factory.contains_bean_by_type::<Service>());
        assert!(!factory.contains_bean_by_type::<String>());
    }

    #[test]
    fn test_remove_definition_clears_type_index() {
        struct Orphan;
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Orphan, _>("orphan", || Orphan)
            .unwrap();
        assert!(factory.contains_bean_by_type::<Orphan>());

        factory.remove_bean_definition("orphan").unwrap();
        assert!(!factory.contains_bean_by_type::<Orphan>());
        assert!(factory
            .get_bean_names_for_type(TypeId::of::<Orphan>())
            .is_empty());
    }

    struct LifecycleWitness {
        events: EventLog,
        bean_name: String,
    }

    impl BeanNameAware for LifecycleWitness {
        fn set_bean_name(&mut self, bean_name: &str) {
            self.bean_name = bean_name.to_string();
            self.events.lock().push(format!("aware:{}", bean_name));
        }
    }

    impl InitializingBean for LifecycleWitness {
        fn after_properties_set(&mut self) -> ContainerResult<()> {
            log(&self.events, "after_properties_set");
            Ok(())
        }
    }

    struct LoggingProcessor {
        events: EventLog,
    }

    impl BeanPostProcessor for LoggingProcessor {
        fn post_process_before_initialization(
            &self,
            bean: BeanInstance,
            bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            log(&self.events, format!("before_init:{}", bean_name));
            Ok(Some(bean))
        }

        fn post_process_after_initialization(
            &self,
            bean: BeanInstance,
            bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            log(&self.events, format!("after_init:{}", bean_name));
            Ok(Some(bean))
        }

        fn name(&self) -> &str {
            "LoggingProcessor"
        }
    }

    #[test]
    fn test_lifecycle_phase_order() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(LoggingProcessor {
            events: Arc::clone(&events),
        }));

        let ctor_events = Arc::clone(&events);
        let prop_events = Arc::clone(&events);
        let init_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<LifecycleWitness>("witness")
                    .with_constructor(Constructor::no_arg(move || {
                        log(&ctor_events, "construct");
                        Ok(LifecycleWitness {
                            events: Arc::clone(&ctor_events),
                            bean_name: String::new(),
                        })
                    }))
                    .with_property_values::<LifecycleWitness>(move |_witness| {
                        log(&prop_events, "populate");
                        Ok(())
                    })
                    .bean_name_aware::<LifecycleWitness>()
                    .initializing_bean::<LifecycleWitness>()
                    .with_init_method::<LifecycleWitness>("warm_up", move |_witness| {
                        log(&init_events, "warm_up");
                        Ok(())
                    }),
            )
            .unwrap();

        factory.get_bean("witness").unwrap();
        assert_eq!(
            *events.lock(),
            vec![
                "construct",
                "populate",
                "aware:witness",
                "before_init:witness",
                "after_properties_set",
                "warm_up",
                "after_init:witness",
            ]
        );
    }

    #[test]
    fn test_init_method_named_after_properties_set_runs_once() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();

        let ctor_events = Arc::clone(&events);
        let init_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<LifecycleWitness>("witness")
                    .with_constructor(Constructor::no_arg(move || {
                        Ok(LifecycleWitness {
                            events: Arc::clone(&ctor_events),
                            bean_name: String::new(),
                        })
                    }))
                    .initializing_bean::<LifecycleWitness>()
                    .with_init_method::<LifecycleWitness>(AFTER_PROPERTIES_SET, move |_witness| {
                        log(&init_events, "duplicate");
                        Ok(())
                    }),
            )
            .unwrap();

        factory.get_bean("witness").unwrap();
        assert_eq!(*events.lock(), vec!["after_properties_set"]);
    }

    struct FactoryHolder {
        factory: Option<Arc<DefaultListableBeanFactory>>,
    }

    impl BeanFactoryAware for FactoryHolder {
        fn set_bean_factory(&mut self, bean_factory: Arc<DefaultListableBeanFactory>) {
            self.factory = Some(bean_factory);
        }
    }

    #[test]
    fn test_bean_factory_aware_receives_owner() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<FactoryHolder>("holder")
                    .with_constructor(Constructor::no_arg(|| Ok(FactoryHolder { factory: None })))
                    .bean_factory_aware::<FactoryHolder>(),
            )
            .unwrap();

        let holder = factory.get_bean_by_type::<FactoryHolder>().unwrap();
        let held = holder.factory.as_ref().expect("factory injected");
        assert!(Arc::ptr_eq(held, &factory));
    }

    struct SuppressingProcessor;

    impl BeanPostProcessor for SuppressingProcessor {
        fn post_process_before_initialization(
            &self,
            _bean: BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            Ok(None)
        }
    }

    #[test]
    fn test_before_init_null_yields_placeholder() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(SuppressingProcessor));
        factory.add_bean_post_processor(Arc::new(LoggingProcessor {
            events: Arc::clone(&events),
        }));

        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();
        let bean = factory.get_bean("service").unwrap();
        assert!(NullBean::is(&*bean));
        // 链终止后不再执行任何钩子
        assert!(events
            .lock()
            .iter()
            .all(|event| !event.starts_with("after_init")));
    }

    struct ShortCircuitProcessor;

    impl BeanPostProcessor for ShortCircuitProcessor {
        fn post_process_before_instantiation(
            &self,
            bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            if bean_name == "service" {
                Ok(Some(Arc::new(Service {
                    bean_name: "premade".to_string(),
                    wired: true,
                })))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn test_before_instantiation_shortcut() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(ShortCircuitProcessor));
        factory.add_bean_post_processor(Arc::new(LoggingProcessor {
            events: Arc::clone(&events),
        }));

        let ctor_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<Service>("service").with_constructor(Constructor::no_arg(
                    move || {
                        log(&ctor_events, "construct");
                        Ok(Service::default())
                    },
                )),
            )
            .unwrap();

        let bean = factory.get_bean("service").unwrap();
        let service = bean.downcast::<Service>().unwrap();
        assert!(service.wired);
        // 构造方法未被调用，但后置钩子照常执行
        assert_eq!(*events.lock(), vec!["after_init:service"]);
    }

    struct RegisteringProcessor {
        factory: Weak<DefaultListableBeanFactory>,
        registered: std::sync::atomic::AtomicBool,
    }

    impl BeanPostProcessor for RegisteringProcessor {
        fn post_process_after_initialization(
            &self,
            bean: BeanInstance,
            _bean_name: &str,
        ) -> ContainerResult<Option<BeanInstance>> {
            // 钩子运行期间追加新的处理器:要求钩子链不持有处理器列表的锁
            if !self
                .registered
                .swap(true, std::sync::atomic::Ordering::SeqCst)
            {
                if let Some(factory) = self.factory.upgrade() {
                    struct Passive;
                    impl BeanPostProcessor for Passive {}
                    factory.add_bean_post_processor(Arc::new(Passive));
                }
            }
            Ok(Some(bean))
        }
    }

    #[test]
    fn test_post_processor_may_register_processor_from_hook() {
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(RegisteringProcessor {
            factory: Arc::downgrade(&factory),
            registered: std::sync::atomic::AtomicBool::new(false),
        }));
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();

        factory.get_bean("service").unwrap();
        assert_eq!(factory.get_bean_post_processors().len(), 2);
    }

    #[test]
    fn test_constructor_resolution_memoized_across_creations() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Service>("service")
                    .with_scope(Scope::Prototype)
                    .with_constructor(Constructor::no_arg(|| Ok(Service::default()))),
            )
            .unwrap();

        factory.get_bean("service").unwrap();
        factory.get_bean("service").unwrap();
        factory.get_bean("service").unwrap();

        let definition = factory.get_bean_definition("service").unwrap();
        assert_eq!(definition.resolution_count(), 1);
    }

    #[test]
    fn test_explicit_args_select_constructor() {
        struct Buffer {
            capacity: usize,
        }

        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Buffer>("buffer")
                    .with_scope(Scope::Prototype)
                    .with_constructor(Constructor::no_arg(|| Ok(Buffer { capacity: 1 })))
                    .with_constructor(Constructor::with_args(1, |args: &[BeanArg]| {
                        let capacity = args[0]
                            .downcast_ref::<usize>()
                            .copied()
                            .ok_or_else(|| ContainerError::TypeMismatch {
                                expected: "usize".to_string(),
                                found: "unknown".to_string(),
                            })?;
                        Ok(Buffer { capacity })
                    })),
            )
            .unwrap();

        let plain = factory.get_bean("buffer").unwrap();
        assert_eq!(plain.downcast::<Buffer>().unwrap().capacity, 1);

        let sized = factory
            .get_bean_with_args("buffer", &[Arc::new(16usize)])
            .unwrap();
        assert_eq!(sized.downcast::<Buffer>().unwrap().capacity, 16);
    }

    #[test]
    fn test_args_rejected_for_cached_singleton() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();

        factory.get_bean("service").unwrap();
        let err = factory
            .get_bean_with_args("service", &[Arc::new(1usize)])
            .unwrap_err();
        assert!(err.to_string().contains("already-created singleton"));
    }

    #[test]
    fn test_factory_method_null_result_becomes_placeholder() {
        struct Product;

        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Product>("product").with_factory_method(
                    FactoryMethod::new::<Product, _>("make_product", 0, |_invocation| Ok(None)),
                ),
            )
            .unwrap();

        let bean = factory.get_bean("product").unwrap();
        assert!(NullBean::is(&*bean));
        // 占位也作为单例缓存，后续请求不再触发工厂
        let again = factory.get_bean("product").unwrap();
        assert!(Arc::ptr_eq(&bean, &again));
    }

    #[test]
    fn test_factory_method_sees_in_flight_marker() {
        struct Product {
            made_by: String,
        }

        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Product>("product").with_factory_method(
                    FactoryMethod::new::<Product, _>("make_product", 0, |invocation| {
                        let current = invocation
                            .currently_invoked_factory_method()
                            .expect("factory marker set during invocation");
                        Ok(Some(Product {
                            made_by: current.method_name,
                        }))
                    }),
                ),
            )
            .unwrap();

        let bean = factory.get_bean("product").unwrap();
        assert_eq!(bean.downcast::<Product>().unwrap().made_by, "make_product");
    }

    #[test]
    fn test_circular_dependency_between_factory_beans() {
        struct A;
        struct B;

        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::new::<A>("a").with_factory_method(
                FactoryMethod::new::<A, _>("make_a", 0, |invocation| {
                    invocation.get_bean("b")?;
                    Ok(Some(A))
                }),
            ))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::new::<B>("b").with_factory_method(
                FactoryMethod::new::<B, _>("make_b", 0, |invocation| {
                    invocation.get_bean("a")?;
                    Ok(Some(B))
                }),
            ))
            .unwrap();

        let err = factory.get_bean("a").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("Failed to instantiate bean 'a'"), "{rendered}");
        let mut source = std::error::Error::source(&err);
        let mut found_cycle = false;
        while let Some(cause) = source {
            if cause.to_string().contains("Circular dependency") {
                found_cycle = true;
                break;
            }
            source = cause.source();
        }
        assert!(found_cycle, "expected a circular dependency in the chain");
    }

    #[test]
    fn test_circular_hint_for_instance_factory_method() {
        struct Config;
        struct Product;

        let factory = DefaultListableBeanFactory::new();
        // config 的创建需要 product，而 product 的工厂方法又属于 config
        factory
            .register_bean_definition(BeanDefinition::new::<Config>("config").with_factory_method(
                FactoryMethod::new::<Config, _>("make_config", 0, |invocation| {
                    invocation.get_bean("product")?;
                    Ok(Some(Config))
                }),
            ))
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Product>("product").with_factory_method(
                    FactoryMethod::new::<Product, _>("make_product", 0, |invocation| {
                        invocation.get_bean("config")?;
                        Ok(Some(Product))
                    })
                    .on_bean("config"),
                ),
            )
            .unwrap();

        let err = factory.get_bean("config").unwrap_err();
        let rendered = format!("{:#}", anyhow::Error::from(err));
        assert!(
            rendered.contains("Circular reference involving containing bean 'config'"),
            "{rendered}"
        );
        assert!(rendered.contains("consider declaring the factory method as static"));
    }

    #[test]
    fn test_no_hint_for_static_factory_method() {
        struct Product;

        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Product>("product").with_factory_method(
                    FactoryMethod::new::<Product, _>("make_product", 0, |_invocation| {
                        Err(ContainerError::Other(anyhow::anyhow!("boom")))
                    }),
                ),
            )
            .unwrap();

        let err = factory.get_bean("product").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("Factory method 'make_product' threw exception"));
        assert!(!rendered.contains("Circular reference involving containing bean"));
    }

    // 方法注入：带有派发器槽位的客户端
    struct WidgetClient {
        dispatcher: DispatcherSlot,
    }

    struct Widget {
        serial: usize,
    }

    #[test]
    fn test_lookup_override_fetches_fresh_prototype() {
        let factory = DefaultListableBeanFactory::new();
        let serial = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let serial_for_ctor = Arc::clone(&serial);
        factory
            .register_prototype::<Widget, _>("widget", move || Widget {
                serial: serial_for_ctor.fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            })
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<WidgetClient>("client")
                    .with_constructor(Constructor::no_arg(|| {
                        Ok(WidgetClient {
                            dispatcher: DispatcherSlot::new(),
                        })
                    }))
                    .with_lookup_override::<Widget>("create_widget", 0, Some("widget"))
                    .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                        client.dispatcher.attach(dispatcher);
                    }),
            )
            .unwrap();

        let client = factory.get_bean_by_type::<WidgetClient>().unwrap();
        assert!(client.dispatcher.is_attached());

        let first = client
            .dispatcher
            .lookup::<Widget>(&*client, "create_widget", &[])
            .unwrap()
            .expect("widget looked up");
        let second = client
            .dispatcher
            .lookup::<Widget>(&*client, "create_widget", &[])
            .unwrap()
            .expect("widget looked up");
        assert_ne!(first.serial, second.serial);
    }

    #[test]
    fn test_lookup_override_by_return_type() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Widget, _>("theWidget", || Widget { serial: 42 })
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<WidgetClient>("client")
                    .with_constructor(Constructor::no_arg(|| {
                        Ok(WidgetClient {
                            dispatcher: DispatcherSlot::new(),
                        })
                    }))
                    .with_lookup_override::<Widget>("create_widget", 0, None::<&str>)
                    .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                        client.dispatcher.attach(dispatcher);
                    }),
            )
            .unwrap();

        let client = factory.get_bean_by_type::<WidgetClient>().unwrap();
        let widget = client
            .dispatcher
            .lookup::<Widget>(&*client, "create_widget", &[])
            .unwrap()
            .expect("widget resolved by return type");
        assert_eq!(widget.serial, 42);
    }

    #[test]
    fn test_lookup_override_forwards_arguments() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Widget>("widget")
                    .with_scope(Scope::Prototype)
                    .with_constructor(Constructor::with_args(1, |args: &[BeanArg]| {
                        let serial = args[0]
                            .downcast_ref::<usize>()
                            .copied()
                            .ok_or_else(|| ContainerError::TypeMismatch {
                                expected: "usize".to_string(),
                                found: "unknown".to_string(),
                            })?;
                        Ok(Widget { serial })
                    })),
            )
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<WidgetClient>("client")
                    .with_constructor(Constructor::no_arg(|| {
                        Ok(WidgetClient {
                            dispatcher: DispatcherSlot::new(),
                        })
                    }))
                    .with_lookup_override::<Widget>("create_widget", 1, Some("widget"))
                    .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                        client.dispatcher.attach(dispatcher);
                    }),
            )
            .unwrap();

        let client = factory.get_bean_by_type::<WidgetClient>().unwrap();
        let widget = client
            .dispatcher
            .lookup::<Widget>(&*client, "create_widget", &[Arc::new(7usize)])
            .unwrap()
            .expect("widget built from lookup arguments");
        assert_eq!(widget.serial, 7);
    }

    #[test]
    fn test_lookup_override_unwraps_null_placeholder() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Widget>("widget").with_factory_method(
                    FactoryMethod::new::<Widget, _>("make_widget", 0, |_invocation| Ok(None)),
                ),
            )
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<WidgetClient>("client")
                    .with_constructor(Constructor::no_arg(|| {
                        Ok(WidgetClient {
                            dispatcher: DispatcherSlot::new(),
                        })
                    }))
                    .with_lookup_override::<Widget>("create_widget", 0, Some("widget"))
                    .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                        client.dispatcher.attach(dispatcher);
                    }),
            )
            .unwrap();

        let client = factory.get_bean_by_type::<WidgetClient>().unwrap();
        let result = client
            .dispatcher
            .lookup::<Widget>(&*client, "create_widget", &[])
            .unwrap();
        assert!(result.is_none());
    }

    struct CountingReplacer {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl MethodReplacer for CountingReplacer {
        fn reimplement(
            &self,
            _target: &(dyn Any + Send + Sync),
            method: &MethodSignature,
            args: &[BeanArg],
        ) -> ContainerResult<Option<BeanInstance>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            assert_eq!(method.method_name, "compute");
            assert_eq!(args.len(), 1);
            let input = args[0].downcast_ref::<usize>().copied().unwrap_or(0);
            Ok(Some(Arc::new(input * 2)))
        }
    }

    #[test]
    fn test_replace_override_delegates_exactly_once() {
        let factory = DefaultListableBeanFactory::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        factory
            .register_method_replacer(
                "doubler",
                Arc::new(CountingReplacer {
                    calls: Arc::clone(&calls),
                }),
            )
            .unwrap();
        factory
            .register_bean_definition(
                BeanDefinition::new::<WidgetClient>("client")
                    .with_constructor(Constructor::no_arg(|| {
                        Ok(WidgetClient {
                            dispatcher: DispatcherSlot::new(),
                        })
                    }))
                    .with_replace_override("compute", 1, "doubler")
                    .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                        client.dispatcher.attach(dispatcher);
                    }),
            )
            .unwrap();

        let client = factory.get_bean_by_type::<WidgetClient>().unwrap();
        let result = client
            .dispatcher
            .lookup::<usize>(&*client, "compute", &[Arc::new(21usize)])
            .unwrap()
            .expect("replacer returned a value");
        assert_eq!(*result, 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enhanced_class_shared_between_equal_recipes() {
        let factory = DefaultListableBeanFactory::new();
        for name in ["clientA", "clientB"] {
            factory
                .register_bean_definition(
                    BeanDefinition::new::<WidgetClient>(name)
                        .with_constructor(Constructor::no_arg(|| {
                            Ok(WidgetClient {
                                dispatcher: DispatcherSlot::new(),
                            })
                        }))
                        .with_lookup_override::<Widget>("create_widget", 0, Some("widget"))
                        .with_dispatch_binder::<WidgetClient>(|client, dispatcher| {
                            client.dispatcher.attach(dispatcher);
                        }),
                )
                .unwrap();
        }
        factory
            .register_singleton::<Widget, _>("widget", || Widget { serial: 0 })
            .unwrap();

        factory.get_bean("clientA").unwrap();
        factory.get_bean("clientB").unwrap();
        assert_eq!(factory.subclass_cache().len(), 1);
    }

    struct Closeable {
        events: EventLog,
        label: &'static str,
    }

    impl DisposableBean for Closeable {
        fn destroy(&mut self) -> ContainerResult<()> {
            log(&self.events, format!("destroy:{}", self.label));
            Ok(())
        }
    }

    fn register_closeable(
        factory: &Arc<DefaultListableBeanFactory>,
        name: &str,
        label: &'static str,
        events: &EventLog,
    ) {
        let events = Arc::clone(events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<Closeable>(name)
                    .with_constructor(Constructor::no_arg(move || {
                        Ok(Closeable {
                            events: Arc::clone(&events),
                            label,
                        })
                    }))
                    .disposable_bean::<Closeable>(),
            )
            .unwrap();
    }

    #[test]
    fn test_destroy_singletons_reverse_order_and_idempotent() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();
        register_closeable(&factory, "first", "first", &events);
        register_closeable(&factory, "second", "second", &events);

        factory.get_bean("first").unwrap();
        factory.get_bean("second").unwrap();
        assert_eq!(factory.disposable_count(), 2);

        factory.destroy_singletons().unwrap();
        factory.destroy_singletons().unwrap();
        assert_eq!(*events.lock(), vec!["destroy:second", "destroy:first"]);
    }

    #[test]
    fn test_destruction_skips_beans_without_callbacks() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();
        factory.get_bean("service").unwrap();
        assert_eq!(factory.disposable_count(), 0);
        factory.destroy_singletons().unwrap();
    }

    #[test]
    fn test_preinstantiate_respects_dependency_order_and_lazy() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let factory = DefaultListableBeanFactory::new();

        let config_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<Service>("config").with_constructor(Constructor::no_arg(
                    move || {
                        log(&config_events, "config");
                        Ok(Service::default())
                    },
                )),
            )
            .unwrap();

        struct Database;
        let db_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<Database>("database")
                    .with_dependencies(vec!["config".to_string()])
                    .with_constructor(Constructor::no_arg(move || {
                        log(&db_events, "database");
                        Ok(Database)
                    })),
            )
            .unwrap();

        struct Reporting;
        let lazy_events = Arc::clone(&events);
        factory
            .register_bean_definition(
                BeanDefinition::new::<Reporting>("reporting")
                    .with_lazy(true)
                    .with_constructor(Constructor::no_arg(move || {
                        log(&lazy_events, "reporting");
                        Ok(Reporting)
                    })),
            )
            .unwrap();

        factory.preinstantiate_singletons().unwrap();
        let recorded = events.lock().clone();
        assert_eq!(recorded, vec!["config", "database"]);
    }

    #[test]
    fn test_concurrent_singleton_access_converges() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_singleton::<Service, _>("service", Service::default)
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let factory = Arc::clone(&factory);
            handles.push(std::thread::spawn(move || {
                factory.get_bean("service").unwrap()
            }));
        }
        let beans: Vec<BeanInstance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for bean in &beans[1..] {
            assert!(Arc::ptr_eq(&beans[0], bean));
        }
    }

    #[test]
    fn test_validate_dependencies_reports_missing() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::new::<Service>("service")
                    .with_dependencies(vec!["missing".to_string()])
                    .with_constructor(Constructor::no_arg(|| Ok(Service::default()))),
            )
            .unwrap();

        assert!(factory.validate_dependencies().is_err());
    }
}
