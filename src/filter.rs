//! Decides which source files take part in a deployment.
//!
//! Paths are always judged relative to the layer root, so a Magento install
//! that happens to live under a `docs/` or `node_modules/` directory is not
//! filtered away wholesale.

use std::ffi::OsStr;
use std::path::{Component, Path};

/// Extensions reserved for pre-compilation. Never deployed as-is.
const PRECOMPILE_EXTENSIONS: &[&str] = &["less", "scss", "sass"];

/// Directory names excluded wherever they appear in the relative path
const EXCLUDED_DIRECTORIES: &[&str] = &["docs", "node_modules", "bower_components", "__tests__"];

/// Directory excluded only as the first segment (theme build sources)
const EXCLUDED_ROOT_DIRECTORY: &str = "tailwind";

/// Development file extensions, excluded unless `--include-dev`
const DEV_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "mts", "cts", "md", "markdown", "yml", "yaml", "lock", "flowconfig",
];

/// Development file names, excluded unless `--include-dev`
const DEV_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "composer.json",
    "composer.lock",
    "tsconfig.json",
    "tsconfig.base.json",
    "tsconfig.build.json",
    "LICENSE",
    "LICENSE.txt",
    "MIT-LICENSE",
    "README",
    "README.txt",
    "CHANGELOG",
    "babel.config.js",
    "babel.config.json",
    "jest.config.js",
    "jest.config.json",
    "karma.conf.js",
    "webpack.config.js",
    "rollup.config.js",
    "vite.config.js",
    "Makefile",
    "Gruntfile.js",
    "Gulpfile.js",
];

/// Pure predicate over relative file paths
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusionFilter {
    include_dev: bool,
}

impl ExclusionFilter {
    pub fn new(include_dev: bool) -> Self {
        Self { include_dev }
    }

    /// Returns true when the file at `relative` must not be deployed.
    pub fn excludes(&self, relative: &Path) -> bool {
        // Segments are compared as OsStr so a non-UTF-8 name is still judged
        let segments = relative.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });

        let mut first = true;
        let mut file_name: Option<&OsStr> = None;
        for segment in segments {
            if segment.as_encoded_bytes().starts_with(b".")
                || EXCLUDED_DIRECTORIES.iter().any(|dir| segment == *dir)
            {
                return true;
            }
            if first && segment == EXCLUDED_ROOT_DIRECTORY {
                return true;
            }
            first = false;
            file_name = Some(segment);
        }

        let extension = relative
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);

        if let Some(ext) = extension.as_deref() {
            if PRECOMPILE_EXTENSIONS.contains(&ext) {
                return true;
            }
        }

        if self.include_dev {
            return false;
        }

        if file_name.is_some_and(|name| DEV_FILES.iter().any(|dev| name == *dev)) {
            return true;
        }

        extension.is_some_and(|ext| DEV_EXTENSIONS.contains(&ext.as_str()))
    }
}
