//! Per-invocation context handed to an invoker.

use std::collections::BTreeMap;

/// Arguments and environment overrides for one plugin invocation.
///
/// The environment map only holds overrides. The executable invoker layers
/// them on top of the caller's own environment; the container invoker passes
/// just these entries into the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// Arguments forwarded to the plugin, in order.
    pub args: Vec<String>,
    /// Environment variables to set or replace.
    pub env: BTreeMap<String, String>,
}

impl InvocationContext {
    /// Create a context with the given arguments and no overrides.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            env: BTreeMap::new(),
        }
    }

    /// Add an environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment overrides.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_overrides_win() {
        let ctx = InvocationContext::new(vec!["x".to_owned()])
            .with_env("A", "B")
            .with_envs([("A", "C"), ("G", "T")]);

        assert_eq!(ctx.args, vec!["x"]);
        assert_eq!(ctx.env.get("A").map(String::as_str), Some("C"));
        assert_eq!(ctx.env.get("G").map(String::as_str), Some("T"));
    }
}
