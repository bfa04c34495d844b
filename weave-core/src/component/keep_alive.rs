//! Keep-Alive Cache
//!
//! Keep-alive sits between a parent and the component it renders in its
//! default slot. Instead of destroying the child when it is switched away
//! from, the child is deactivated and kept in a cache keyed by its
//! placeholder; switching back reuses the instance.
//!
//! # Cache Policy
//!
//! 1. Only components whose name passes `include` (when set) and fails
//!    `exclude` (when set) are cached. The name is the definition's name,
//!    falling back to the tag used to reference it.
//!
//! 2. The cache is ordered by recency. A hit moves the key to the back; a
//!    miss appends it and, when `max` is exceeded, evicts the front entry
//!    and destroys its instance.
//!
//! 3. Changing `include` or `exclude` immediately evicts every entry whose
//!    name no longer passes. An entry whose tag matches the node on screen
//!    is evicted without being destroyed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::create::first_component_child;
use super::definition::{ComponentDef, Hook};
use super::instance::Instance;
use super::vnode::{ComponentData, ComponentOptions, VNode};
use crate::config::ConfigError;
use crate::diagnostics::{self, Diagnostic};
use crate::reactive::{Signal, Traverse, Value, WatchOptions};

/// A name filter for `include` / `exclude`.
#[derive(Clone)]
pub enum Pattern {
    /// Matches any of the listed names.
    Names(SmallVec<[String; 4]>),
    /// Matches names the predicate accepts.
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl Pattern {
    /// Parse a comma-separated name list.
    pub fn parse(list: &str) -> Self {
        Pattern::Names(
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + 'static,
    {
        Pattern::Predicate(Rc::new(f))
    }

    /// Read a pattern from a prop: a comma-separated string or an array of
    /// strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(list) => Some(Self::parse(list)),
            Value::Array(items) => Some(Self::names(
                items
                    .to_vec()
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned)),
            )),
            _ => None,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Names(names) => names.iter().any(|n| n == name),
            Pattern::Predicate(f) => f(name),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pattern::Names(a), Pattern::Names(b)) => a == b,
            (Pattern::Predicate(a), Pattern::Predicate(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Names(names) => f.debug_tuple("Names").field(names).finish(),
            Pattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Traverse for Pattern {}

/// Keep-alive props in serialisable form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveOptions {
    /// Comma-separated names to cache.
    pub include: Option<String>,
    /// Comma-separated names never to cache.
    pub exclude: Option<String>,
    /// Maximum number of cached instances.
    pub max: Option<usize>,
}

impl KeepAliveOptions {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// The component data that passes these options as props.
    pub fn into_data(self) -> ComponentData {
        let mut data = ComponentData::new();
        if let Some(include) = self.include {
            data = data.prop("include", include);
        }
        if let Some(exclude) = self.exclude {
            data = data.prop("exclude", exclude);
        }
        if let Some(max) = self.max {
            data = data.prop("max", max as f64);
        }
        data
    }
}

/// Identity of a cached component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The key given on the placeholder.
    Explicit(String),
    /// Definition id plus the tag it was referenced by.
    Derived { cid: u64, tag: Option<String> },
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Explicit(key) => f.write_str(key),
            CacheKey::Derived { cid, tag: Some(tag) } => write!(f, "{cid}::{tag}"),
            CacheKey::Derived { cid, tag: None } => write!(f, "{cid}"),
        }
    }
}

fn component_name(options: &ComponentOptions) -> Option<&str> {
    options.ctor.name().or(options.tag.as_deref())
}

fn vnode_name(vnode: &VNode) -> Option<String> {
    vnode
        .component_options()
        .and_then(component_name)
        .map(str::to_owned)
}

/// The cache behind one keep-alive instance.
pub struct KeepAlive {
    include: Signal<Option<Pattern>>,
    exclude: Signal<Option<Pattern>>,
    max: Cell<Option<usize>>,
    cache: RefCell<IndexMap<CacheKey, VNode>>,
    current: RefCell<Option<VNode>>,
}

impl KeepAlive {
    pub fn new(options: KeepAliveOptions) -> Self {
        Self {
            include: Signal::new(options.include.as_deref().map(Pattern::parse)),
            exclude: Signal::new(options.exclude.as_deref().map(Pattern::parse)),
            max: Cell::new(options.max),
            cache: RefCell::new(IndexMap::new()),
            current: RefCell::new(None),
        }
    }

    /// A cache configured from a keep-alive instance's current props.
    fn from_props(vm: &Instance) -> Self {
        let props = vm.props();
        let pattern = |key: &str| props.get_untracked(key).as_ref().and_then(Pattern::from_value);
        let cache = Self::new(KeepAliveOptions {
            max: props
                .get_untracked("max")
                .and_then(|v| v.as_f64())
                .map(|max| max as usize),
            ..KeepAliveOptions::default()
        });
        cache.include.set(pattern("include"));
        cache.exclude.set(pattern("exclude"));
        cache
    }

    /// The abstract `keep-alive` component.
    ///
    /// Props: `include`, `exclude` (comma-separated strings or arrays of
    /// strings) and `max`. The cache is reachable via [`KeepAlive::of`].
    pub fn component() -> ComponentDef {
        ComponentDef::builder()
            .name("keep-alive")
            .abstract_component(true)
            .hook(Hook::Created, |vm| {
                vm.set_state(Rc::new(KeepAlive::from_props(vm)));
            })
            .hook(Hook::Mounted, watch_props)
            .hook(Hook::Destroyed, |vm| {
                if let Some(cache) = KeepAlive::of(vm) {
                    cache.prune_all();
                }
            })
            .render(|vm| {
                let slot = vm.slot_children();
                let rendered = match KeepAlive::of(vm) {
                    Some(cache) => cache.render(&slot),
                    None => slot.first().cloned(),
                };
                rendered.unwrap_or_else(VNode::empty)
            })
            .build()
    }

    /// The cache of a keep-alive instance.
    pub fn of(vm: &Instance) -> Option<Rc<KeepAlive>> {
        vm.state::<KeepAlive>()
    }

    pub fn include(&self) -> Option<Pattern> {
        self.include.get()
    }

    pub fn exclude(&self) -> Option<Pattern> {
        self.exclude.get()
    }

    pub fn max(&self) -> Option<usize> {
        self.max.get()
    }

    /// Replace `include` and evict entries that no longer match.
    pub fn set_include(&self, pattern: Option<Pattern>) {
        self.include.set(pattern.clone());
        if let Some(pattern) = pattern {
            self.prune_cache(|name| pattern.matches(name));
        }
    }

    /// Replace `exclude` and evict entries that now match.
    pub fn set_exclude(&self, pattern: Option<Pattern>) {
        self.exclude.set(pattern.clone());
        if let Some(pattern) = pattern {
            self.prune_cache(|name| !pattern.matches(name));
        }
    }

    /// Takes effect on the next cache miss.
    pub fn set_max(&self, max: Option<usize>) {
        self.max.set(max);
    }

    /// Cached keys, least recently used first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.cache.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    pub fn cached_instance(&self, key: &CacheKey) -> Option<Instance> {
        self.cache.borrow().get(key).and_then(VNode::component_instance)
    }

    /// Pick the node to render from the slot, consulting and updating the
    /// cache.
    pub fn render(&self, slot: &[VNode]) -> Option<VNode> {
        let rendered = self.select(slot);
        *self.current.borrow_mut() = rendered.clone();
        rendered
    }

    fn select(&self, slot: &[VNode]) -> Option<VNode> {
        let Some(vnode) = first_component_child(slot) else {
            return slot.first().cloned();
        };
        let Some(options) = vnode.component_options() else {
            return Some(vnode);
        };

        let name = component_name(options);
        let not_included = self
            .include
            .get()
            .is_some_and(|include| name.map_or(true, |name| !include.matches(name)));
        let excluded = self
            .exclude
            .get()
            .is_some_and(|exclude| name.is_some_and(|name| exclude.matches(name)));
        if not_included || excluded {
            return Some(vnode);
        }

        let key = cache_key(&vnode, options);
        let hit = {
            let mut cache = self.cache.borrow_mut();
            match cache.shift_remove(&key) {
                Some(cached) => {
                    vnode.set_component_instance(cached.component_instance());
                    cache.insert(key.clone(), cached);
                    true
                }
                None => {
                    cache.insert(key.clone(), vnode.clone());
                    false
                }
            }
        };

        if hit {
            tracing::debug!(key = %key, "keep-alive hit");
        } else {
            tracing::debug!(key = %key, "keep-alive miss");
            let limit = self.max.get().filter(|max| *max > 0);
            if let Some(max) = limit {
                let oldest = {
                    let cache = self.cache.borrow();
                    (cache.len() > max).then(|| cache.keys().next().cloned()).flatten()
                };
                if let Some(oldest) = oldest {
                    let current = self.current.borrow().clone();
                    self.prune_entry(&oldest, current.as_ref());
                }
            }
        }

        vnode.set_keep_alive(true);
        Some(vnode)
    }

    /// Evict every entry whose name fails `filter`.
    pub fn prune_cache(&self, filter: impl Fn(&str) -> bool) {
        let doomed: Vec<CacheKey> = self
            .cache
            .borrow()
            .iter()
            .filter(|(_, cached)| vnode_name(cached).is_some_and(|name| !filter(&name)))
            .map(|(key, _)| key.clone())
            .collect();

        let current = self.current.borrow().clone();
        for key in doomed {
            self.prune_entry(&key, current.as_ref());
        }
    }

    /// Evict and destroy every entry.
    pub fn prune_all(&self) {
        for key in self.keys() {
            self.prune_entry(&key, None);
        }
    }

    fn prune_entry(&self, key: &CacheKey, current: Option<&VNode>) {
        let Some(cached) = self.cache.borrow_mut().shift_remove(key) else {
            return;
        };
        let on_screen = current.is_some_and(|current| current.tag() == cached.tag());
        tracing::debug!(key = %key, destroyed = !on_screen, "keep-alive evict");
        if !on_screen {
            if let Some(vm) = cached.component_instance() {
                vm.destroy();
            }
        }
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("include", &self.include.get_untracked())
            .field("exclude", &self.exclude.get_untracked())
            .field("max", &self.max.get())
            .field("keys", &self.keys())
            .finish()
    }
}

fn cache_key(vnode: &VNode, options: &ComponentOptions) -> CacheKey {
    let derived = || CacheKey::Derived {
        cid: options.ctor.cid(),
        tag: options.tag.clone(),
    };
    match vnode.key() {
        Some(key) if key.trim().is_empty() => {
            diagnostics::report(Diagnostic::InvalidCacheKey {
                tag: vnode.tag().unwrap_or_default().to_string(),
                reason: "empty key".to_string(),
            });
            derived()
        }
        Some(key) => CacheKey::Explicit(key.to_string()),
        None => derived(),
    }
}

fn watch_props(vm: &Instance) {
    let Some(cache) = KeepAlive::of(vm) else {
        return;
    };
    let sync = WatchOptions {
        sync: true,
        ..WatchOptions::default()
    };

    let this = vm.downgrade();
    let target = Rc::clone(&cache);
    vm.watch(
        move || this.upgrade().and_then(|vm| vm.prop("include")).as_ref().and_then(Pattern::from_value),
        move |pattern: &Option<Pattern>, _| target.set_include(pattern.clone()),
        sync.clone(),
    );

    let this = vm.downgrade();
    let target = Rc::clone(&cache);
    vm.watch(
        move || this.upgrade().and_then(|vm| vm.prop("exclude")).as_ref().and_then(Pattern::from_value),
        move |pattern: &Option<Pattern>, _| target.set_exclude(pattern.clone()),
        sync.clone(),
    );

    let this = vm.downgrade();
    vm.watch(
        move || {
            this.upgrade()
                .and_then(|vm| vm.prop("max"))
                .and_then(|max| max.as_f64())
                .map(|max| max as usize)
        },
        move |max: &Option<usize>, _| cache.set_max(*max),
        sync,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::create_component;

    fn context() -> Instance {
        Instance::new(&ComponentDef::builder().build(), Vec::<(String, Value)>::new())
    }

    fn placeholder(vm: &Instance, def: &ComponentDef) -> VNode {
        let node = create_component(def, ComponentData::new(), vm, Vec::new(), None);
        node.set_component_instance(Some(Instance::new(def, Vec::<(String, Value)>::new())));
        node
    }

    #[test]
    fn patterns_match_names() {
        assert!(Pattern::parse("a,b").matches("b"));
        assert!(Pattern::parse("a, b").matches("b"));
        assert!(!Pattern::parse("a,b").matches("c"));
        assert!(Pattern::predicate(|n| n.starts_with("x")).matches("xy"));
        assert_eq!(Pattern::parse("a,b"), Pattern::names(["a", "b"]));

        let list = Value::from(serde_json::json!(["a", "c"]));
        assert!(Pattern::from_value(&list).is_some_and(|p| p.matches("c")));
        assert!(Pattern::from_value(&Value::from(3)).is_none());
    }

    #[test]
    fn options_parse_from_json() {
        let options = KeepAliveOptions::from_json(r#"{ "include": "a,b", "max": 2 }"#).unwrap();
        assert_eq!(options.include.as_deref(), Some("a,b"));
        assert_eq!(options.max, Some(2));
        assert!(options.exclude.is_none());
    }

    #[test]
    fn lru_eviction_destroys_oldest() {
        let vm = context();
        let defs: Vec<ComponentDef> = ["a", "b", "c"]
            .into_iter()
            .map(|name| ComponentDef::builder().name(name).build())
            .collect();
        let cache = KeepAlive::new(KeepAliveOptions {
            max: Some(2),
            ..KeepAliveOptions::default()
        });

        let nodes: Vec<VNode> = defs.iter().map(|def| placeholder(&vm, def)).collect();
        for node in &nodes {
            cache.render(std::slice::from_ref(node));
        }

        let keys = cache.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1], CacheKey::Derived { cid: defs[2].cid(), tag: None });
        assert!(nodes[0].component_instance().is_some_and(|vm| vm.is_destroyed()));
        assert!(nodes[1].component_instance().is_some_and(|vm| !vm.is_destroyed()));
        assert!(nodes.iter().all(VNode::is_keep_alive));
    }

    #[test]
    fn hit_reuses_instance_and_refreshes_recency() {
        let vm = context();
        let a = ComponentDef::builder().name("a").build();
        let b = ComponentDef::builder().name("b").build();
        let cache = KeepAlive::new(KeepAliveOptions::default());

        let first = placeholder(&vm, &a);
        cache.render(std::slice::from_ref(&first));
        cache.render(&[placeholder(&vm, &b)]);

        let again = create_component(&a, ComponentData::new(), &vm, Vec::new(), None);
        cache.render(std::slice::from_ref(&again));

        assert_eq!(again.component_instance(), first.component_instance());
        assert_eq!(
            cache.keys().last(),
            Some(&CacheKey::Derived { cid: a.cid(), tag: None })
        );
    }

    #[test]
    fn include_change_prunes_but_spares_current() {
        let vm = context();
        let a = ComponentDef::builder().name("a").build();
        let b = ComponentDef::builder().name("b").build();
        let cache = KeepAlive::new(KeepAliveOptions::default());

        let node_a = placeholder(&vm, &a);
        let node_b = placeholder(&vm, &b);
        cache.render(std::slice::from_ref(&node_a));
        cache.render(std::slice::from_ref(&node_b));

        // `b` is on screen and fails the filter: evicted, not destroyed.
        cache.set_include(Some(Pattern::parse("nothing")));
        assert!(cache.is_empty());
        assert!(node_a.component_instance().is_some_and(|vm| vm.is_destroyed()));
        assert!(node_b.component_instance().is_some_and(|vm| !vm.is_destroyed()));
    }

    #[test]
    fn excluded_components_bypass_the_cache() {
        let vm = context();
        let a = ComponentDef::builder().name("a").build();
        let cache = KeepAlive::new(KeepAliveOptions {
            exclude: Some("a".into()),
            ..KeepAliveOptions::default()
        });

        let node = placeholder(&vm, &a);
        let rendered = cache.render(std::slice::from_ref(&node));
        assert!(rendered.is_some_and(|r| r.ptr_eq(&node)));
        assert!(cache.is_empty());
        assert!(!node.is_keep_alive());
    }

    #[test]
    fn explicit_and_empty_keys() {
        let vm = context();
        let a = ComponentDef::builder().name("a").build();
        let cache = KeepAlive::new(KeepAliveOptions::default());

        let keyed = create_component(&a, ComponentData::new().key("tab-1"), &vm, Vec::new(), None);
        let blank = create_component(&a, ComponentData::new().key(""), &vm, Vec::new(), None);
        cache.render(&[keyed]);
        cache.render(&[blank]);

        assert_eq!(
            cache.keys(),
            vec![
                CacheKey::Explicit("tab-1".into()),
                CacheKey::Derived { cid: a.cid(), tag: None },
            ]
        );
    }

    #[test]
    fn slot_without_components_renders_first_child() {
        let cache = KeepAlive::new(KeepAliveOptions::default());
        let text = VNode::text("plain");
        assert!(cache.render(std::slice::from_ref(&text)).is_some_and(|r| r.ptr_eq(&text)));
        assert!(cache.render(&[]).is_none());
    }
}
