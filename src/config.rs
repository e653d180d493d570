use std::path::PathBuf;

/// Overrides the path of the Objective-C runtime library.
pub const LIBOBJC_ENV: &str = "NOBJC_LIBOBJC";
/// `tracing` filter directives for the command-line tool.
pub const LOG_ENV: &str = "NOBJC_LOG";

pub const DEFAULT_LIBOBJC: &str = "/usr/lib/libobjc.A.dylib";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub libobjc: PathBuf,
    /// Frameworks or dylibs loaded as soon as the runtime is.
    pub frameworks: Vec<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            libobjc: PathBuf::from(DEFAULT_LIBOBJC),
            frameworks: vec![],
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(LIBOBJC_ENV).filter(|p| !p.is_empty()) {
            config.libobjc = PathBuf::from(path);
        }
        config
    }

    pub fn with_libobjc(mut self, path: impl Into<PathBuf>) -> Self {
        self.libobjc = path.into();
        self
    }

    pub fn with_framework(mut self, path: impl Into<PathBuf>) -> Self {
        self.frameworks.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_default() {
        let config = RuntimeConfig::from_lookup(|key| {
            (key == LIBOBJC_ENV).then(|| "/opt/objc/libobjc.so".to_string())
        });
        assert_eq!(config.libobjc, PathBuf::from("/opt/objc/libobjc.so"));

        let config = RuntimeConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_builders() {
        let config = RuntimeConfig::default()
            .with_libobjc("/tmp/libobjc.dylib")
            .with_framework("/System/Library/Frameworks/Foundation.framework/Foundation");
        assert_eq!(config.libobjc, PathBuf::from("/tmp/libobjc.dylib"));
        assert_eq!(config.frameworks.len(), 1);
    }
}
