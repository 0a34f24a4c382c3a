use serde::{Deserialize, Serialize};

/// One action of an installation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstallationStep {
    /// Fetch `url` into `file` (relative to the installation root).
    Download {
        file: String,
        url: String,
        #[serde(default)]
        size: u64,
    },
    /// Extract the archive at `file` into `location`, overwriting.
    Unzip { file: String, location: String },
    /// Delete a file or directory tree.
    Remove { location: String },
}

impl InstallationStep {
    pub fn is_download(&self) -> bool {
        matches!(self, InstallationStep::Download { .. })
    }
}

/// Steps that run together; see [`super::Installer::run`].
pub type Segment = Vec<InstallationStep>;

/// Ordered segments describing how to materialize one build on disk.
pub type InstallScript = Vec<Segment>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tagged_steps() {
        let json = r#"[
            [
                {"type": "download", "file": "server.jar", "url": "https://cdn.test/s.jar", "size": 42},
                {"type": "download", "file": "libs.zip", "url": "https://cdn.test/l.zip", "size": 8}
            ],
            [
                {"type": "unzip", "file": "libs.zip", "location": "."},
                {"type": "remove", "location": "libs.zip"}
            ]
        ]"#;

        let script: InstallScript = serde_json::from_str(json).unwrap();
        assert_eq!(script.len(), 2);
        assert!(script[0][0].is_download());
        assert_eq!(
            script[1][1],
            InstallationStep::Remove {
                location: "libs.zip".into()
            }
        );
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let json = r#"{"type": "chmod", "location": "run.sh"}"#;
        assert!(serde_json::from_str::<InstallationStep>(json).is_err());
    }
}
