#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LazyLoadConfig {
    pub enabled: bool,
    pub eager_load_count: usize,
}

pub trait VisibilityPolicy: Send + Sync {
    /// `ordinal` is the 1-based position of the image within the page.
    fn should_lazy_load(&self, ordinal: usize, config: &LazyLoadConfig) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EagerThreshold;

impl VisibilityPolicy for EagerThreshold {
    fn should_lazy_load(&self, ordinal: usize, config: &LazyLoadConfig) -> bool {
        config.enabled && ordinal > config.eager_load_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_lazy_loads() {
        let config = LazyLoadConfig {
            enabled: false,
            eager_load_count: 0,
        };
        assert!((1..10).all(|n| !EagerThreshold.should_lazy_load(n, &config)));
    }

    #[test]
    fn images_after_threshold_are_lazy() {
        let config = LazyLoadConfig {
            enabled: true,
            eager_load_count: 2,
        };
        let lazy: Vec<bool> = (1..=4)
            .map(|n| EagerThreshold.should_lazy_load(n, &config))
            .collect();
        assert_eq!(lazy, vec![false, false, true, true]);
    }

    #[test]
    fn zero_threshold_defers_every_image() {
        let config = LazyLoadConfig {
            enabled: true,
            eager_load_count: 0,
        };
        assert!(EagerThreshold.should_lazy_load(1, &config));
    }
}
