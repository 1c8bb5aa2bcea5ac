use ash::vk;
use serde::Deserialize;

/// swapchain 尺寸和输出不一致时使用的缩放滤波
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RgBlitFilter {
    #[default]
    Linear,
    Nearest,
}

impl RgBlitFilter {
    #[inline]
    pub fn vk_filter(self) -> vk::Filter {
        match self {
            Self::Linear => vk::Filter::LINEAR,
            Self::Nearest => vk::Filter::NEAREST,
        }
    }
}

/// 渲染图配置
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RgSettings {
    /// 录制线程数量，0 表示使用 rayon 的默认值
    pub worker_threads: usize,
    pub blit_filter: RgBlitFilter,
    /// color attachment 的清除颜色
    pub clear_color: [f32; 4],
    /// 是否为每个 pass 插入 debug label
    pub debug_labels: bool,
    /// 每次 execute 时打印执行计划
    pub print_plan: bool,
    /// 等待 frame fence 的超时时间
    pub fence_timeout_ns: u64,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            blit_filter: RgBlitFilter::Linear,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            debug_labels: true,
            print_plan: false,
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl RgSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let settings = RgSettings::from_toml_str(
            r#"
            worker_threads = 4
            blit_filter = "nearest"
            "#,
        )
        .unwrap();

        assert_eq!(settings.worker_threads, 4);
        assert_eq!(settings.blit_filter.vk_filter(), vk::Filter::NEAREST);
        // 未写出的字段使用默认值
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(settings.debug_labels);
    }

    #[test]
    fn test_invalid_filter() {
        assert!(RgSettings::from_toml_str(r#"blit_filter = "cubic""#).is_err());
    }
}
