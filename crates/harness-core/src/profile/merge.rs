//! Merge-on-read persisted entries
//!
//! Stored option bundles may predate fields added later. Reading one
//! shallow-merges the stored object over the current default template:
//! stored keys win, missing keys take the default, nested objects are
//! replaced wholesale rather than merged.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::storage::KeyValueStorage;
use crate::error::HarnessResult;

/// One-level merge of `stored` over `defaults`
///
/// When either side is not a JSON object, `stored` is returned as is.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use rtc_harness_core::profile::merge::merge_over_defaults;
///
/// let merged = merge_over_defaults(&json!({"a": 0, "b": 2}), json!({"a": 1}));
/// assert_eq!(merged, json!({"a": 1, "b": 2}));
/// ```
pub fn merge_over_defaults(defaults: &Value, stored: Value) -> Value {
    match (defaults, stored) {
        (Value::Object(defaults), Value::Object(stored)) => {
            let mut merged = defaults.clone();
            for (key, value) in stored {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, stored) => stored,
    }
}

/// A typed value under a storage key
///
/// With `merging` enabled, reads go through [`merge_over_defaults`];
/// otherwise the stored value is returned verbatim. Either way a missing or
/// unreadable entry yields the default.
#[derive(Debug, Clone)]
pub struct StoredValue<T> {
    key: &'static str,
    default: T,
    merging: bool,
}

impl<T> StoredValue<T>
where
    T: Serialize + DeserializeOwned + Clone + Debug,
{
    /// Plain entry
    pub fn new(key: &'static str, default: T) -> Self {
        Self {
            key,
            default,
            merging: false,
        }
    }

    /// Entry read with merge-over-defaults
    pub fn merging(key: &'static str, default: T) -> Self {
        Self {
            key,
            default,
            merging: true,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Read the entry, falling back to the default on any problem
    pub fn read(&self, storage: &dyn KeyValueStorage) -> T {
        let raw = match storage.get(self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.default.clone(),
            Err(e) => {
                tracing::warn!(key = self.key, error = %e, "Storage read failed, using default");
                return self.default.clone();
            }
        };

        let stored: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = self.key, error = %e, "Stored value is not JSON, using default");
                return self.default.clone();
            }
        };

        let value = if self.merging {
            match serde_json::to_value(&self.default) {
                Ok(defaults) => merge_over_defaults(&defaults, stored),
                Err(_) => stored,
            }
        } else {
            stored
        };

        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(key = self.key, error = %e, "Stored value has wrong shape, using default");
            self.default.clone()
        })
    }

    pub fn write(&self, storage: &dyn KeyValueStorage, value: &T) -> HarnessResult<()> {
        let raw = serde_json::to_string(value)?;
        storage.set(self.key, raw)
    }

    /// Drop the stored value so reads return the default again
    pub fn reset(&self, storage: &dyn KeyValueStorage) -> HarnessResult<()> {
        storage.remove(self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::storage::MemoryStorage;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn stored_keys_override_and_missing_keys_default() {
        let merged = merge_over_defaults(&json!({"a": 0, "b": 2}), json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_is_shallow() {
        let defaults = json!({"nested": {"x": 1, "y": 2}, "flag": false});
        let merged = merge_over_defaults(&defaults, json!({"nested": {"x": 5}}));
        assert_eq!(merged, json!({"nested": {"x": 5}, "flag": false}));
    }

    #[test]
    fn non_objects_are_taken_verbatim() {
        assert_eq!(merge_over_defaults(&json!({"a": 1}), json!([1, 2])), json!([1, 2]));
        assert_eq!(merge_over_defaults(&json!("auto"), json!("eu")), json!("eu"));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: u32,
    }

    #[test]
    fn merging_entry_fills_fields_added_later() {
        let storage = MemoryStorage::new();
        storage.set("sample", r#"{"a": 1}"#.to_string()).unwrap();

        let entry = StoredValue::merging("sample", Sample { a: 0, b: 2 });
        assert_eq!(entry.read(&storage), Sample { a: 1, b: 2 });

        // the plain entry cannot deserialize the partial object
        let plain = StoredValue::new("sample", Sample { a: 0, b: 2 });
        assert_eq!(plain.read(&storage), Sample { a: 0, b: 2 });
    }

    #[test]
    fn unreadable_values_fall_back_to_default() {
        let storage = MemoryStorage::new();
        storage.set("sample", "{oops".to_string()).unwrap();
        let entry = StoredValue::merging("sample", Sample { a: 7, b: 8 });
        assert_eq!(entry.read(&storage), Sample { a: 7, b: 8 });

        entry.write(&storage, &Sample { a: 9, b: 9 }).unwrap();
        assert_eq!(entry.read(&storage), Sample { a: 9, b: 9 });
        entry.reset(&storage).unwrap();
        assert_eq!(entry.read(&storage), Sample { a: 7, b: 8 });
    }
}
