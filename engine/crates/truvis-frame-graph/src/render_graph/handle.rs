//! 渲染图内部句柄
//!
//! 资源与 pass 都存放在 graph 持有的 arena 中，相互之间只通过句柄引用。
//! 句柄在 `RenderGraph::reset` 之后失效。

use std::fmt;

use slotmap::new_key_type;

new_key_type! { pub struct RgResourceHandle; }

/// pass 在声明顺序中的位置
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgPassHandle(pub(crate) usize);

impl RgPassHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for RgPassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgPass({})", self.0)
    }
}
