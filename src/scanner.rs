use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::DeployError;
use crate::theme::{Area, ThemeCode};

/// Parsed `etc/module.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
}

/// Read the module descriptor from etc/module.xml, falling back to
/// src/etc/module.xml
pub fn read_module_descriptor(package_path: &Path) -> Option<ModuleDescriptor> {
    let module_xml_path = [
        package_path.join("etc").join("module.xml"),
        package_path.join("src").join("etc").join("module.xml"),
    ]
    .into_iter()
    .find(|p| p.is_file())?;

    let content = fs::read_to_string(&module_xml_path).ok()?;
    parse_module_xml(&content).map(|name| ModuleDescriptor { name })
}

/// Parse module name from module.xml content
fn parse_module_xml(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"module" => {
                return e
                    .attributes()
                    .flatten()
                    .find(|attr| attr.key.as_ref() == b"name")
                    .and_then(|attr| attr.unescape_value().ok())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Discover all themes in app/design/{area}/ using parallel iteration
#[must_use = "this returns the discovered themes which should be processed"]
pub fn discover_themes(magento_root: &Path, area: Area) -> Result<Vec<ThemeCode>, DeployError> {
    let design_path = magento_root.join("app").join("design").join(area.as_str());

    if !design_path.exists() {
        return Ok(Vec::new());
    }

    let vendor_dirs = subdirectories(&design_path);

    let mut themes: Vec<ThemeCode> = vendor_dirs
        .par_iter()
        .flat_map(|vendor_path| {
            let vendor = dir_name(vendor_path);
            subdirectories(vendor_path)
                .into_par_iter()
                .filter(|theme_path| theme_path.join("theme.xml").is_file())
                .map(move |theme_path| ThemeCode::new(&vendor, &dir_name(&theme_path)))
                .collect::<Vec<_>>()
        })
        .collect();

    themes.sort();
    Ok(themes)
}

/// An installed package (or nested sub-package) with a module name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Module name from module.xml (e.g., "Magento_Catalog")
    pub module: String,
    /// Package directory
    pub path: PathBuf,
}

/// Every module-carrying package under vendor/, scanned once per run and
/// shared read-only by all workers
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: Vec<Package>,
}

impl PackageIndex {
    /// Scan vendor/{vendor}/{package}, plus `src/module-*` sub-packages of
    /// multi-module packages. Order is sorted by path so every job sees the
    /// same layer order.
    pub fn scan(magento_root: &Path) -> Self {
        let vendor_path = magento_root.join("vendor");
        if !vendor_path.is_dir() {
            return Self::default();
        }

        let package_dirs: Vec<PathBuf> = subdirectories(&vendor_path)
            .iter()
            .flat_map(|vendor| subdirectories(vendor))
            .collect();

        let packages = package_dirs
            .par_iter()
            .flat_map_iter(|package_path| {
                let top = read_module_descriptor(package_path).map(|d| Package {
                    module: d.name,
                    path: package_path.clone(),
                });

                let nested = subdirectories(&package_path.join("src"))
                    .into_iter()
                    .filter(|dir| dir_name(dir).starts_with("module-"))
                    .filter_map(|dir| {
                        read_module_descriptor(&dir).map(|d| Package {
                            module: d.name,
                            path: dir,
                        })
                    });

                top.into_iter().chain(nested).collect::<Vec<_>>()
            })
            .collect();

        Self { packages }
    }

    pub fn from_packages(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Immediate subdirectories, sorted; empty if `path` is unreadable
fn subdirectories(path: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
