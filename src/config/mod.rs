//! NullVoid configuration loading

mod settings;

pub use settings::{
    CacheSettings, DependencyConfusionConfig, DetectorConfig, Settings, coerce_env_value,
    deep_merge,
};
