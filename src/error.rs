use std::path::PathBuf;
use thiserror::Error;

/// Deployment error types
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Magento root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("No themes found in {path}")]
    NoThemes { path: PathBuf },

    /// No layer placed any file. Reported as skipped, never as a failure.
    #[error("theme not found: {area}/{theme}")]
    NotFound { theme: String, area: String },

    #[error("required library layer {path} failed")]
    RequiredLayerFailure {
        path: PathBuf,
        #[source]
        source: Box<DeployError>,
    },

    #[error("failed to create destination directory {path}")]
    DestinationCreateFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("layer {path} failed, skipped")]
    ExtensionLayerFailure {
        path: PathBuf,
        #[source]
        source: Box<DeployError>,
    },

    #[error("failed to symlink {link} -> {target}")]
    SymlinkFailure {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not linked, {locale} failed: {reason}")]
    RepresentativeFailed { locale: String, reason: String },

    #[error("bin/magento setup:static-content:deploy failed with exit code {code}: {stderr}")]
    DelegatedBackendFailure { code: i32, stderr: String },

    #[error("No space left on device for {path}")]
    DiskFull { path: PathBuf },

    #[error("Failed to copy {src} to {dst}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory: {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}")]
    WalkFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Whether this error counts toward the run's failure signal.
    pub fn is_failure(&self) -> bool {
        !matches!(self, DeployError::NotFound { .. })
    }

    /// Failure to read a source tree or file, as opposed to a failure
    /// writing the destination
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            DeployError::WalkFailed { .. } | DeployError::ReadFailed { .. }
        )
    }

    /// Message followed by every source, joined with ": "
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = std::error::Error::source(err);
        }
        out
    }
}

/// ENOSPC on Unix
pub(crate) fn is_disk_full(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_is_not_failure() {
        let err = DeployError::NotFound {
            theme: "Vendor/missing".to_string(),
            area: "frontend".to_string(),
        };
        assert!(!err.is_failure());
        assert_eq!(err.to_string(), "theme not found: frontend/Vendor/missing");
    }

    #[test]
    fn test_required_layer_failure_keeps_source() {
        let inner = DeployError::WalkFailed {
            path: PathBuf::from("/lib/web/private"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let err = DeployError::RequiredLayerFailure {
            path: PathBuf::from("/lib/web"),
            source: Box::new(inner),
        };
        assert!(err.is_failure());
        assert!(err.source().is_some());
        assert_eq!(
            err.report(),
            "required library layer /lib/web failed: failed to read /lib/web/private: permission denied"
        );
    }

    #[test]
    fn test_source_errors_distinguished_from_write_errors() {
        let walk = DeployError::WalkFailed {
            path: PathBuf::from("/vendor/acme/module/view"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let read = DeployError::ReadFailed {
            path: PathBuf::from("/vendor/acme/module/view/x.js"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let full = DeployError::DiskFull {
            path: PathBuf::from("/pub/static"),
        };
        let mkdir = DeployError::CreateDirFailed {
            path: PathBuf::from("/pub/static/frontend"),
            source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        };

        assert!(walk.is_source_error());
        assert!(read.is_source_error());
        assert!(!full.is_source_error());
        assert!(!mkdir.is_source_error());
    }

    #[test]
    fn test_delegated_failure_message() {
        let err = DeployError::DelegatedBackendFailure {
            code: 3,
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("exit code 3"));
    }
}
