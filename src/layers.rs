use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::scanner::{Package, PackageIndex};
use crate::theme::{Area, ThemeNode};

/// Candidate shared library roots, in lookup order
const LIBRARY_ROOTS: &[&str] = &["lib/web", "vendor/mage-os/magento2-base/lib/web"];

/// Modules whose assets deploy at the destination root instead of under
/// their module name
const UNPREFIXED_MODULES: &[&str] = &["Magento_Email"];

/// Origin of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Theme's own web directory: {theme}/web/
    Theme,
    /// Theme module override: {theme}/{Module_Name}/web/
    ModuleOverride,
    /// Shared library: lib/web/
    Library,
    /// Installed package: vendor/{vendor}/{package}/view/{area|base}/web/
    Package,
}

impl LayerKind {
    /// A required layer aborts the job when it cannot be read
    #[inline]
    pub fn is_required(self) -> bool {
        matches!(self, LayerKind::Library)
    }
}

/// One candidate source directory merged into a job's destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayer {
    pub path: PathBuf,
    /// Namespace directory under the destination root
    pub prefix: Option<String>,
    /// Merge priority; lower is placed first and wins
    pub ordinal: usize,
    pub kind: LayerKind,
}

impl SourceLayer {
    /// Where this layer's files land for a job rooted at `dest`
    pub fn destination(&self, dest: &Path) -> PathBuf {
        match &self.prefix {
            Some(prefix) => dest.join(prefix),
            None => dest.to_path_buf(),
        }
    }
}

#[derive(Default)]
struct LayerList {
    layers: Vec<SourceLayer>,
}

impl LayerList {
    fn push(&mut self, path: PathBuf, prefix: Option<String>, kind: LayerKind) {
        let ordinal = self.layers.len();
        self.layers.push(SourceLayer {
            path,
            prefix,
            ordinal,
            kind,
        });
    }
}

/// Sibling directories of a theme's web/ that contain their own web/
fn module_overrides(theme_root: &Path) -> Vec<(String, PathBuf)> {
    let mut overrides: Vec<(String, PathBuf)> = WalkDir::new(theme_root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.file_name() != "web")
        .filter_map(|e| {
            let web = e.path().join("web");
            web.is_dir()
                .then(|| (e.file_name().to_string_lossy().into_owned(), web))
        })
        .collect();
    overrides.sort();
    overrides
}

/// View directories of a package for an area, in lookup order
fn package_view_dirs(package: &Package, area: Area) -> impl Iterator<Item = PathBuf> + '_ {
    [
        package.path.join("view").join(area.as_str()).join("web"),
        package.path.join("src").join("view").join(area.as_str()).join("web"),
        package.path.join("view").join("base").join("web"),
        package.path.join("src").join("view").join("base").join("web"),
    ]
    .into_iter()
    .filter(|p| p.is_dir())
}

/// Collect all source layers for a job, highest priority first:
///
/// 1. each chain theme's web/ (child first, both roots)
/// 2. that theme's module overrides
/// 3. shared library
/// 4. installed packages, area view then base view
pub fn enumerate_layers(
    magento_root: &Path,
    chain: &[&ThemeNode],
    area: Area,
    packages: &PackageIndex,
) -> Vec<SourceLayer> {
    let mut list = LayerList::default();

    for theme in chain {
        for web in theme.web_dirs() {
            list.push(web, None, LayerKind::Theme);
        }
        for root in &theme.roots {
            for (module, web) in module_overrides(root) {
                list.push(web, Some(module), LayerKind::ModuleOverride);
            }
        }
    }

    for lib in LIBRARY_ROOTS {
        let path = magento_root.join(lib);
        if path.is_dir() {
            list.push(path, None, LayerKind::Library);
        }
    }

    for package in packages.packages() {
        let prefix = (!UNPREFIXED_MODULES.contains(&package.module.as_str()))
            .then(|| package.module.clone());
        for view in package_view_dirs(package, area) {
            list.push(view, prefix.clone(), LayerKind::Package);
        }
    }

    list.layers
}
