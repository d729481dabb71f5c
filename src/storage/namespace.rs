use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::identity::{Caller, Owner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Input,
    Output,
    Temp,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Input => write!(f, "input"),
            StorageKind::Output => write!(f, "output"),
            StorageKind::Temp => write!(f, "temp"),
        }
    }
}

/// Maps a caller onto its own subdirectory of each storage root.
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    config: StorageConfig,
}

impl NamespaceResolver {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Shared root for `kind`, without any owner segment.
    pub fn root(&self, kind: StorageKind) -> &Path {
        match kind {
            StorageKind::Input => &self.config.input_root,
            StorageKind::Output => &self.config.output_root,
            StorageKind::Temp => &self.config.temp_root,
        }
    }

    /// `root(kind)/<owner>`. The input namespace is created on demand;
    /// output and temp are left to whoever writes into them.
    pub fn resolve(&self, kind: StorageKind, caller: &Caller) -> Result<PathBuf> {
        let dir = self.root(kind).join(caller.owner().as_str());
        if kind == StorageKind::Input {
            // create_dir_all treats an existing directory as success, so a
            // concurrent creator racing us is fine.
            std::fs::create_dir_all(&dir)?;
            tracing::trace!(path = %dir.display(), "Input namespace ready");
        }
        Ok(dir)
    }

    /// Rewrite every output prefix in `payload` into the caller's namespace.
    pub fn inject(&self, caller: &Caller, payload: &mut Value) {
        let owner = caller.owner();
        inject_namespace(payload, &owner, &self.config.prefix_field);
    }
}

/// Walk `payload` and prefix the value of every `field` key with `<owner>/`.
///
/// Maps and arrays are visited recursively; other scalars are left alone.
pub fn inject_namespace(payload: &mut Value, owner: &Owner, field: &str) {
    match payload {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == field {
                    let original = match &mut *value {
                        Value::String(s) => std::mem::take(s),
                        other => other.to_string(),
                    };
                    *value = Value::String(format!("{}/{}", owner, original));
                } else {
                    inject_namespace(value, owner, field);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                inject_namespace(item, owner, field);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityContext, UserId};
    use serde_json::json;

    fn alice() -> Owner {
        Owner::User(UserId::new("alice").unwrap())
    }

    #[test]
    fn injects_into_nested_maps_and_lists() {
        let mut payload = json!({
            "9": {
                "class_type": "SaveImage",
                "inputs": { "filename_prefix": "ComfyUI", "images": ["8", 0] }
            },
            "extra": [
                { "filename_prefix": "clip" },
                { "nested": [{ "filename_prefix": "deep" }] }
            ]
        });

        inject_namespace(&mut payload, &alice(), "filename_prefix");

        assert_eq!(payload["9"]["inputs"]["filename_prefix"], "alice/ComfyUI");
        assert_eq!(payload["9"]["inputs"]["images"], json!(["8", 0]));
        assert_eq!(payload["extra"][0]["filename_prefix"], "alice/clip");
        assert_eq!(
            payload["extra"][1]["nested"][0]["filename_prefix"],
            "alice/deep"
        );
    }

    #[test]
    fn stringifies_non_string_prefix() {
        let mut payload = json!({ "filename_prefix": 42 });
        inject_namespace(&mut payload, &Owner::Public, "filename_prefix");
        assert_eq!(payload["filename_prefix"], "public/42");
    }

    #[test]
    fn leaves_scalars_untouched() {
        let mut payload = json!("filename_prefix");
        inject_namespace(&mut payload, &alice(), "filename_prefix");
        assert_eq!(payload, json!("filename_prefix"));
    }

    #[test]
    fn resolve_creates_only_input_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            input_root: dir.path().join("input"),
            output_root: dir.path().join("output"),
            temp_root: dir.path().join("temp"),
            prefix_field: "filename_prefix".to_string(),
        };
        let resolver = NamespaceResolver::new(config);
        let ctx = IdentityContext::new(true);
        let caller = ctx.set_current_user(Some(UserId::new("alice").unwrap()), false);

        let input = resolver.resolve(StorageKind::Input, &caller).unwrap();
        assert_eq!(input, dir.path().join("input").join("alice"));
        assert!(input.is_dir());

        // Second call is a no-op, not an error.
        resolver.resolve(StorageKind::Input, &caller).unwrap();

        let output = resolver.resolve(StorageKind::Output, &caller).unwrap();
        assert_eq!(output, dir.path().join("output").join("alice"));
        assert!(!output.exists());
    }

    #[test]
    fn anonymous_caller_resolves_to_public() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = NamespaceResolver::new(StorageConfig {
            temp_root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        });
        let caller = IdentityContext::new(true).background();
        let temp = resolver.resolve(StorageKind::Temp, &caller).unwrap();
        assert_eq!(temp, dir.path().join("public"));
    }
}
