//! 增强类生成 - 方法注入的"子类"支持
//!
//! 对应关系：声明了方法覆盖的 Bean 不直接使用原始类型，而是使用
//! 一个"增强类"，它为每个方法签名预先分类好派发行为（透传 /
//! Lookup / Replace）。增强类按配方形状缓存，形状相同的定义复用
//! 同一个增强类；派发器按实例挂载，实例回收后回调随之回收。

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::bean::{BeanArg, BeanDefinition, BeanInstance, NullBean};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::method_override::{
    LookupOverride, MethodOverride, MethodSignature, OverrideKey, ReplaceOverride,
};

/// 单个方法签名的派发行为
#[derive(Debug, Clone)]
pub enum MethodDispatch {
    /// 未被覆盖：调用走原始实现
    Passthrough,
    /// Lookup 覆盖：每次调用都从容器取一个 Bean
    LookupDispatch(LookupOverride),
    /// Replace 覆盖：委托给命名的 MethodReplacer Bean
    ReplaceDispatch(ReplaceOverride),
}

static PASSTHROUGH: MethodDispatch = MethodDispatch::Passthrough;

/// 增强类缓存的键：实现类型 + 覆盖集合的值形状
///
/// 两个独立构造、内容相同的定义产生相同的键，因此共享增强类。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RecipeShape {
    pub(crate) type_id: std::any::TypeId,
    pub(crate) overrides: Vec<OverrideKey>,
}

/// 生成好的增强类：签名到派发行为的静态表
///
/// 生成之后只读，可以在任意多个实例之间共享。
pub struct EnhancedClass {
    type_name: &'static str,
    dispatch_table: HashMap<MethodSignature, MethodDispatch>,
}

impl EnhancedClass {
    /// 根据定义的覆盖集合生成派发表
    pub(crate) fn from_definition(definition: &BeanDefinition) -> Self {
        let mut dispatch_table = HashMap::new();
        for method_override in definition.method_overrides().iter() {
            let dispatch = match method_override {
                MethodOverride::Lookup(lookup) => MethodDispatch::LookupDispatch(lookup.clone()),
                MethodOverride::Replace(replace) => {
                    MethodDispatch::ReplaceDispatch(replace.clone())
                }
            };
            dispatch_table.insert(method_override.signature().clone(), dispatch);
        }
        Self {
            type_name: definition.type_name(),
            dispatch_table,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 分类一次调用；未覆盖的签名总是得到透传
    pub fn classify(&self, method_name: &str, param_count: usize) -> &MethodDispatch {
        self.dispatch_table
            .get(&MethodSignature::new(method_name, param_count))
            .unwrap_or(&PASSTHROUGH)
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatch_table.len()
    }
}

impl std::fmt::Debug for EnhancedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancedClass")
            .field("type_name", &self.type_name)
            .field("dispatch_count", &self.dispatch_table.len())
            .finish()
    }
}

/// 增强类缓存
///
/// 作为服务注入实例化策略，而不是进程级全局状态；两个独立的容器
/// 可以持有各自隔离的缓存。
pub struct SubclassCache {
    classes: RwLock<HashMap<RecipeShape, Arc<EnhancedClass>>>,
    /// 当前生效的生成上下文标签（诊断用）
    generation_context: Mutex<Option<String>>,
}

impl SubclassCache {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            generation_context: Mutex::new(None),
        }
    }

    /// 取出或生成配方对应的增强类
    ///
    /// 读路径无竞争；未命中时在锁外生成，写入时若其他线程已抢先
    /// 写入同形状的类，则丢弃本线程的生成结果、交付先到者。
    pub(crate) fn obtain(&self, definition: &BeanDefinition) -> Arc<EnhancedClass> {
        let shape = definition.shape();
        {
            let classes = self.classes.read();
            if let Some(enhanced) = classes.get(&shape) {
                tracing::trace!(
                    "Reusing cached enhanced class for bean type '{}'",
                    definition.type_name()
                );
                return Arc::clone(enhanced);
            }
        }

        let generated = Arc::new(EnhancedClass::from_definition(definition));
        tracing::debug!(
            "Generated enhanced class for bean type '{}' with {} dispatch entries",
            definition.type_name(),
            generated.dispatch_count()
        );

        let mut classes = self.classes.write();
        Arc::clone(classes.entry(shape).or_insert(generated))
    }

    /// 进入生成上下文；返回的守卫在释放时恢复之前的上下文，
    /// 生成失败时同样恢复
    pub fn enter_generation_context(&self, label: impl Into<String>) -> GenerationContextGuard<'_> {
        let previous = self.generation_context.lock().replace(label.into());
        GenerationContextGuard {
            cache: self,
            previous,
        }
    }

    pub fn current_generation_context(&self) -> Option<String> {
        self.generation_context.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    pub fn clear(&self) {
        self.classes.write().clear();
    }
}

impl Default for SubclassCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GenerationContextGuard<'a> {
    cache: &'a SubclassCache,
    previous: Option<String>,
}

impl Drop for GenerationContextGuard<'_> {
    fn drop(&mut self) {
        *self.cache.generation_context.lock() = self.previous.take();
    }
}

/// 一次派发的结果
pub enum DispatchOutcome {
    /// 签名未被覆盖，调用方执行原始实现
    Passthrough,
    /// 覆盖生效；`None` 表示 Lookup 合法地没有取到对象
    Value(Option<BeanInstance>),
}

/// 按实例挂载的派发器
///
/// 持有容器的弱引用：容器通过单例缓存持有实例，实例持有派发器，
/// 这里若是强引用会成环。
pub struct OverrideDispatcher {
    enhanced: Arc<EnhancedClass>,
    owner: Weak<DefaultListableBeanFactory>,
}

impl OverrideDispatcher {
    pub(crate) fn new(
        enhanced: Arc<EnhancedClass>,
        owner: Weak<DefaultListableBeanFactory>,
    ) -> Self {
        Self { enhanced, owner }
    }

    fn owner(&self) -> ContainerResult<Arc<DefaultListableBeanFactory>> {
        self.owner.upgrade().ok_or_else(|| {
            ContainerError::Instantiation {
                bean_name: self.enhanced.type_name().to_string(),
                message: "Owning bean factory has been dropped".to_string(),
                cause: None,
            }
        })
    }

    /// 派发一次方法调用
    pub fn dispatch(
        &self,
        target: &(dyn Any + Send + Sync),
        method_name: &str,
        args: &[BeanArg],
    ) -> ContainerResult<DispatchOutcome> {
        match self.enhanced.classify(method_name, args.len()) {
            MethodDispatch::Passthrough => Ok(DispatchOutcome::Passthrough),
            MethodDispatch::LookupDispatch(lookup) => {
                self.dispatch_lookup(lookup, args).map(DispatchOutcome::Value)
            }
            MethodDispatch::ReplaceDispatch(replace) => {
                let owner = self.owner()?;
                let replacer = owner.get_method_replacer(&replace.replacer_bean_name)?;
                let value = replacer.reimplement(target, &replace.method, args)?;
                Ok(DispatchOutcome::Value(value))
            }
        }
    }

    fn dispatch_lookup(
        &self,
        lookup: &LookupOverride,
        args: &[BeanArg],
    ) -> ContainerResult<Option<BeanInstance>> {
        let owner = self.owner()?;
        // 无参调用走普通获取路径，不触发参数化创建
        let args_to_use = if args.is_empty() { None } else { Some(args) };
        let bean = match &lookup.bean_name {
            Some(bean_name) => match args_to_use {
                Some(args) => owner.get_bean_with_args(bean_name, args)?,
                None => owner.get_bean(bean_name)?,
            },
            None => owner.get_bean_for_type(
                lookup.return_type,
                lookup.return_type_name,
                args_to_use,
            )?,
        };
        // 把 Null 占位还原为真正的缺失
        if NullBean::is(&*bean) {
            Ok(None)
        } else {
            Ok(Some(bean))
        }
    }
}

impl std::fmt::Debug for OverrideDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideDispatcher")
            .field("enhanced", &self.enhanced)
            .finish()
    }
}

/// 供实例持有派发器的槽位
///
/// 覆盖派发器在构造完成之后才挂载；槽位在未挂载时把一切调用当作
/// 透传，调用方不需要区分实例是否经过增强。
#[derive(Default)]
pub struct DispatcherSlot {
    dispatcher: RwLock<Option<Arc<OverrideDispatcher>>>,
}

impl DispatcherSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, dispatcher: Arc<OverrideDispatcher>) {
        *self.dispatcher.write() = Some(dispatcher);
    }

    pub fn is_attached(&self) -> bool {
        self.dispatcher.read().is_some()
    }

    pub fn dispatch(
        &self,
        target: &(dyn Any + Send + Sync),
        method_name: &str,
        args: &[BeanArg],
    ) -> ContainerResult<DispatchOutcome> {
        match &*self.dispatcher.read() {
            Some(dispatcher) => dispatcher.dispatch(target, method_name, args),
            None => Ok(DispatchOutcome::Passthrough),
        }
    }

    /// Lookup 便捷方法：派发并向下转换为具体类型
    pub fn lookup<T: Any + Send + Sync>(
        &self,
        target: &(dyn Any + Send + Sync),
        method_name: &str,
        args: &[BeanArg],
    ) -> ContainerResult<Option<Arc<T>>> {
        match self.dispatch(target, method_name, args)? {
            DispatchOutcome::Passthrough | DispatchOutcome::Value(None) => Ok(None),
            DispatchOutcome::Value(Some(bean)) => {
                bean.downcast::<T>().map(Some).map_err(|_| {
                    ContainerError::TypeMismatch {
                        expected: std::any::type_name::<T>().to_string(),
                        found: "a bean instance of a different type".to_string(),
                    }
                })
            }
        }
    }
}

impl std::fmt::Debug for DispatcherSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::Constructor;

    struct Widget;

    fn definition_with_lookup() -> BeanDefinition {
        BeanDefinition::new::<Widget>("widget")
            .with_constructor(Constructor::no_arg(|| Ok(Widget)))
            .with_lookup_override::<Widget>("create_widget", 0, Some("widget"))
    }

    #[test]
    fn test_classify_unknown_signature_is_passthrough() {
        let enhanced = EnhancedClass::from_definition(&definition_with_lookup());
        assert!(matches!(
            enhanced.classify("other_method", 0),
            MethodDispatch::Passthrough
        ));
        assert!(matches!(
            enhanced.classify("create_widget", 0),
            MethodDispatch::LookupDispatch(_)
        ));
        // 同名不同参数个数不命中
        assert!(matches!(
            enhanced.classify("create_widget", 1),
            MethodDispatch::Passthrough
        ));
    }

    #[test]
    fn test_cache_reuses_equal_shapes() {
        let cache = SubclassCache::new();
        let first = cache.obtain(&definition_with_lookup());
        let second = cache.obtain(&definition_with_lookup());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinguishes_shapes() {
        let cache = SubclassCache::new();
        cache.obtain(&definition_with_lookup());
        cache.obtain(
            &BeanDefinition::new::<Widget>("widget")
                .with_constructor(Constructor::no_arg(|| Ok(Widget)))
                .with_replace_override("compute", 1, "replacer"),
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_obtain_converges_on_one_class() {
        let cache = Arc::new(SubclassCache::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                cache.obtain(&definition_with_lookup())
            }));
        }
        let classes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for class in &classes[1..] {
            assert!(Arc::ptr_eq(&classes[0], class));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_generation_context_restores_previous() {
        let cache = SubclassCache::new();
        {
            let _outer = cache.enter_generation_context("outer");
            assert_eq!(cache.current_generation_context().as_deref(), Some("outer"));
            {
                let _inner = cache.enter_generation_context("inner");
                assert_eq!(cache.current_generation_context().as_deref(), Some("inner"));
            }
            assert_eq!(cache.current_generation_context().as_deref(), Some("outer"));
        }
        assert!(cache.current_generation_context().is_none());
    }

    #[test]
    fn test_unattached_slot_is_passthrough() {
        let slot = DispatcherSlot::new();
        let target = Widget;
        let outcome = slot.dispatch(&target, "create_widget", &[]).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Passthrough));
    }
}
