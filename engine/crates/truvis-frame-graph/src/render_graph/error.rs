use crate::gfx::GfxError;

pub type RgResult<T> = Result<T, RgError>;

#[derive(Debug, thiserror::Error)]
pub enum RgError {
    #[error(transparent)]
    Gfx(#[from] GfxError),
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
    /// 指定的输出不存在，或者不是 image
    #[error("unknown output image `{0}`")]
    UnknownOutput(String),
    /// 被写入的资源没有任何 pass 提供 extent/format 或 size
    #[error("resource `{0}` is written but never described")]
    MissingInfo(String),
    /// pass 引用的资源在执行时没有物理资源
    #[error("resource `{0}` has no physical backing")]
    UnresolvedResource(String),
}

impl RgError {
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Gfx(err) if err.is_fatal())
    }

    /// 重建 swapchain 之后重新 build/execute 即可恢复
    #[inline]
    pub fn is_swapchain_out_of_date(&self) -> bool {
        matches!(self, Self::Gfx(err) if err.is_swapchain_recoverable())
    }
}
