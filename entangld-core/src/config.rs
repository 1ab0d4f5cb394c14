use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Documented, DocumentedFields)]
#[serde(deny_unknown_fields, default)]
/// Per-store behavior switches. Construct with `StoreConfig::default()` and adjust the
/// fields you need; there is no config file format here, unlike the teacher's
/// `AutoschematicConfig` — a store is embedded in a host process, not deployed from one.
pub struct StoreConfig {
    /// When true, `get()` walks its result before returning and replaces every callable
    /// leaf it still finds with the value that callable produces, awaiting any futures
    /// along the way. Non-serializable non-callable leaves may be lost in this pass;
    /// that's an accepted limitation, not a bug.
    pub deref_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_deref_mode_off() {
        assert!(!StoreConfig::default().deref_mode);
    }

    #[test]
    fn fields_are_documented() {
        assert!(!StoreConfig::FIELD_DOCS.is_empty());
    }
}
