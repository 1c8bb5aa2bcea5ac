use std::collections::HashMap;

use slotmap::SlotMap;

use crate::render_graph::handle::RgResourceHandle;
use crate::render_graph::resource::{RgResource, RgResourceKind};

/// 资源注册表
///
/// 名字到虚拟资源的映射。同一个名字在 reset 之前始终对应同一个句柄。
#[derive(Default)]
pub struct RgResourceRegistry {
    resources: SlotMap<RgResourceHandle, RgResource>,
    names: HashMap<String, RgResourceHandle>,
}

// new & init
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl RgResourceRegistry {
    /// 按名字查找资源，不存在则创建
    ///
    /// # Panics
    /// 名字已经被注册为另一种类型
    pub fn resolve_or_create(&mut self, name: &str, kind: RgResourceKind) -> RgResourceHandle {
        if let Some(&handle) = self.names.get(name) {
            let existing = self.resources[handle].kind;
            assert_eq!(
                existing, kind,
                "RenderGraph: resource `{}` is declared as {:?} but was previously declared as {:?}",
                name, kind, existing
            );
            return handle;
        }

        let handle = self.resources.insert(RgResource::new(name, kind));
        self.names.insert(name.to_string(), handle);
        handle
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.names.clear();
    }
}

// getter & iter
impl RgResourceRegistry {
    #[inline]
    pub fn handle(&self, name: &str) -> Option<RgResourceHandle> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn get(&self, handle: RgResourceHandle) -> Option<&RgResource> {
        self.resources.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: RgResourceHandle) -> Option<&mut RgResource> {
        self.resources.get_mut(handle)
    }

    #[inline]
    pub fn get_by_name(&self, name: &str) -> Option<&RgResource> {
        self.handle(name).and_then(|handle| self.resources.get(handle))
    }

    /// 用于日志，句柄失效时返回占位字符串
    #[inline]
    pub fn name_of(&self, handle: RgResourceHandle) -> &str {
        self.resources.get(handle).map(|res| res.name.as_str()).unwrap_or("<unknown>")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (RgResourceHandle, &RgResource)> {
        self.resources.iter()
    }
}
