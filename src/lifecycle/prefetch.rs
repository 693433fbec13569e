//! Pull an image onto the hosts of a project ahead of an upgrade
//!
//! Delegates to the external `rancher_cli` binary. The pull is advisory:
//! failures are logged and the upgrade proceeds regardless.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PROGRAM: &str = "rancher_cli";
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Where and what to pull.
#[derive(Clone)]
pub struct PrefetchTarget {
    /// `<url>/<api_version>`
    pub endpoint: String,
    pub project: String,
    pub access_key: String,
    pub secret_key: String,
    pub image: String,
}

impl std::fmt::Debug for PrefetchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchTarget")
            .field("endpoint", &self.endpoint)
            .field("project", &self.project)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("image", &self.image)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ImagePrefetch {
    program: String,
    attempts: u32,
}

impl Default for ImagePrefetch {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ImagePrefetch {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Arguments passed to the pull program.
    pub fn command_args(target: &PrefetchTarget) -> Vec<String> {
        vec![
            "--url".to_string(),
            target.endpoint.clone(),
            "--env".to_string(),
            target.project.clone(),
            "--access-key".to_string(),
            target.access_key.clone(),
            "--secret-key".to_string(),
            target.secret_key.clone(),
            "pull".to_string(),
            target.image.clone(),
        ]
    }

    /// Run the pull until it succeeds or the attempts run out. Returns
    /// whether the image was pulled.
    pub async fn pull(&self, target: &PrefetchTarget) -> bool {
        let args = Self::command_args(target);
        info!("Pulling {} on hosts of '{}'", target.image, target.project);

        for attempt in 1..=self.attempts {
            let output = Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .await;

            match output {
                Ok(output) if output.status.success() => {
                    debug!("Image pull succeeded on attempt {}", attempt);
                    return true;
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        "Error while pulling image (attempt {}/{}): {}",
                        attempt,
                        self.attempts,
                        stderr.trim()
                    );
                }
                Err(e) => {
                    error!("Failed to run {}: {}", self.program, e);
                    return false;
                }
            }
        }

        warn!("Giving up on pulling {} after {} attempts", target.image, self.attempts);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> PrefetchTarget {
        PrefetchTarget {
            endpoint: "https://rancher.example.com/v2-beta".to_string(),
            project: "prod".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            image: "registry/api:2".to_string(),
        }
    }

    #[test]
    fn test_command_args() {
        assert_eq!(
            ImagePrefetch::command_args(&target()),
            vec![
                "--url",
                "https://rancher.example.com/v2-beta",
                "--env",
                "prod",
                "--access-key",
                "AK",
                "--secret-key",
                "SK",
                "pull",
                "registry/api:2",
            ]
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", target());
        assert!(!rendered.contains("SK\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_defaults() {
        let prefetch = ImagePrefetch::default();
        assert_eq!(prefetch.program(), "rancher_cli");
        assert_eq!(prefetch.attempts(), 10);
        assert_eq!(ImagePrefetch::new("x").with_attempts(0).attempts(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_success() {
        assert!(ImagePrefetch::new("true").pull(&target()).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_gives_up() {
        let prefetch = ImagePrefetch::new("false").with_attempts(3);
        assert!(!prefetch.pull(&target()).await);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let prefetch = ImagePrefetch::new("rancherctl-no-such-program");
        assert!(!prefetch.pull(&target()).await);
    }
}
