//! Theme, locale, and area types for Magento 2 static deployment.
//!
//! Provides type-safe wrappers for theme codes, locale codes, and areas
//! with validation and efficient string interning using `Arc<str>`, plus the
//! theme ancestry graph.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Theme code in "Vendor/name" format (e.g., "Hyva/default").
/// Newtype wrapper for type safety and validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThemeCode(Arc<str>);

impl ThemeCode {
    /// Create a new ThemeCode from vendor and name
    pub fn new(vendor: &str, name: &str) -> Self {
        Self(Arc::from(format!("{}/{}", vendor, name)))
    }

    /// Parse a ThemeCode from "Vendor/name" format
    /// Returns None if format is invalid
    pub fn parse(s: &str) -> Option<Self> {
        let (vendor, name) = s.split_once('/')?;
        if vendor.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self(Arc::from(s)))
    }

    /// Get the inner string reference
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the vendor part (before the slash)
    #[inline]
    pub fn vendor(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// Get the name part (after the slash)
    #[inline]
    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }
}

impl fmt::Display for ThemeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ThemeCode {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

/// Locale code (e.g., "en_US", "nl_NL")
/// Newtype wrapper for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocaleCode(Arc<str>);

impl LocaleCode {
    /// Create a new LocaleCode without validation
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Create a validated LocaleCode, returning error for invalid format
    /// Format must be xx_YY (e.g., en_US, nl_NL, de_DE)
    pub fn validated(s: &str) -> Result<Self, String> {
        if Self::validate_format(s) {
            Ok(Self(Arc::from(s)))
        } else {
            Err(format!(
                "invalid locale format '{}': expected xx_YY (e.g., en_US)",
                s
            ))
        }
    }

    #[inline]
    fn validate_format(s: &str) -> bool {
        let bytes = s.as_bytes();
        bytes.len() == 5
            && bytes[2] == b'_'
            && bytes[0].is_ascii_lowercase()
            && bytes[1].is_ascii_lowercase()
            && bytes[3].is_ascii_uppercase()
            && bytes[4].is_ascii_uppercase()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocaleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LocaleCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Magento area (frontend or admin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Frontend,
    Adminhtml,
}

impl Area {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Frontend => "frontend",
            Area::Adminhtml => "adminhtml",
        }
    }

    #[inline]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "frontend" => Some(Area::Frontend),
            "adminhtml" => Some(Area::Adminhtml),
            _ => None,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `theme.xml`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeDescriptor {
    pub parent: Option<ThemeCode>,
}

/// Parse parent theme from theme.xml content
pub fn parse_theme_xml(xml: &str) -> ThemeDescriptor {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut in_parent = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"parent" => {
                in_parent = true;
            }
            Ok(Event::Text(e)) if in_parent => {
                let parent = e.unescape().ok().and_then(|s| ThemeCode::parse(s.trim()));
                return ThemeDescriptor { parent };
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"parent" => {
                in_parent = false;
            }
            Ok(Event::Eof) | Err(_) => return ThemeDescriptor::default(),
            _ => {}
        }
    }
}

/// Composer package directory that ships a theme, relative to the root
pub fn vendor_theme_path(code: &ThemeCode, area: Area) -> PathBuf {
    let vendor = code.vendor().to_ascii_lowercase();
    let name = code.name().to_ascii_lowercase();
    let area = area.as_str();

    match vendor.as_str() {
        "magento" => PathBuf::from("vendor/magento").join(format!("theme-{area}-{name}")),
        "hyva" => PathBuf::from("vendor/hyva-themes").join(format!("magento2-{name}-theme")),
        "mageos" | "mage-os" => PathBuf::from("vendor/mage-os").join(format!("theme-{area}-{name}")),
        _ => PathBuf::from("vendor")
            .join(vendor)
            .join(format!("theme-{area}-{name}")),
    }
}

/// Candidate theme roots in lookup order: app-local override first, then the
/// vendor package. Only existing directories are returned.
pub fn locate_theme(magento_root: &Path, code: &ThemeCode, area: Area) -> Vec<PathBuf> {
    [
        magento_root
            .join("app")
            .join("design")
            .join(area.as_str())
            .join(code.vendor())
            .join(code.name()),
        magento_root.join(vendor_theme_path(code, area)),
    ]
    .into_iter()
    .filter(|p| p.is_dir())
    .collect()
}

/// Read the descriptor from the first root that carries a theme.xml
pub fn read_theme_descriptor(roots: &[PathBuf]) -> ThemeDescriptor {
    roots
        .iter()
        .map(|root| root.join("theme.xml"))
        .find(|p| p.is_file())
        .and_then(|p| fs::read_to_string(p).ok())
        .map(|xml| parse_theme_xml(&xml))
        .unwrap_or_default()
}

/// Index of a theme in a [`ThemeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThemeId(usize);

/// A theme resolved in one area
#[derive(Debug, Clone)]
pub struct ThemeNode {
    pub code: ThemeCode,
    pub area: Area,
    /// Existing theme roots, app-local first
    pub roots: Vec<PathBuf>,
    /// Parent named in theme.xml
    pub parent: Option<ThemeCode>,
    /// Parent resolved in the same area
    parent_id: Option<ThemeId>,
}

impl ThemeNode {
    /// The theme's own asset directories (`<root>/web`) that exist
    pub fn web_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.roots
            .iter()
            .map(|root| root.join("web"))
            .filter(|p| p.is_dir())
    }
}

/// Arena of resolved themes keyed by (area, code).
///
/// Parent links are indices, so cyclic `theme.xml` declarations produce a
/// cyclic index graph rather than cyclic ownership. The graph is built once
/// before deployment starts and is read-only afterwards.
#[derive(Debug, Default)]
pub struct ThemeGraph {
    nodes: Vec<ThemeNode>,
    index: HashMap<(Area, ThemeCode), ThemeId>,
}

impl ThemeGraph {
    /// Resolve every requested theme and its transitive parents in every area
    pub fn build(magento_root: &Path, themes: &[ThemeCode], areas: &[Area]) -> Self {
        let mut graph = Self::default();
        for &area in areas {
            for code in themes {
                graph.insert_chain(magento_root, code, area);
            }
        }
        graph
    }

    fn insert_chain(&mut self, magento_root: &Path, code: &ThemeCode, area: Area) {
        let mut current = Some(code.clone());
        let mut child: Option<ThemeId> = None;

        while let Some(code) = current.take() {
            let known = self.index.get(&(area, code.clone())).copied();
            let id = match known {
                Some(id) => id,
                None => {
                    let roots = locate_theme(magento_root, &code, area);
                    if roots.is_empty() {
                        break;
                    }
                    let descriptor = read_theme_descriptor(&roots);
                    let id = ThemeId(self.nodes.len());
                    self.nodes.push(ThemeNode {
                        code: code.clone(),
                        area,
                        roots,
                        parent: descriptor.parent,
                        parent_id: None,
                    });
                    self.index.insert((area, code), id);
                    id
                }
            };

            if let Some(child) = child {
                self.nodes[child.0].parent_id = Some(id);
            }
            if known.is_some() {
                // Already resolved, together with everything above it
                break;
            }
            child = Some(id);
            current = self.nodes[id.0].parent.clone();
        }
    }

    pub fn find(&self, code: &ThemeCode, area: Area) -> Option<ThemeId> {
        self.index.get(&(area, code.clone())).copied()
    }

    pub fn node(&self, id: ThemeId) -> &ThemeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ancestry chain, child first. Stops at a missing parent or at the first
    /// theme seen twice; a cycle yields the partial chain.
    pub fn ancestry(&self, code: &ThemeCode, area: Area) -> Vec<&ThemeNode> {
        let mut chain = Vec::with_capacity(4);
        let mut visited = HashSet::new();
        let mut current = self.find(code, area);

        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let node = self.node(id);
            chain.push(node);
            current = node.parent_id;
        }

        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_theme(root: &Path, area: &str, code: &str, parent: Option<&str>) -> PathBuf {
        let dir = root.join("app/design").join(area).join(code);
        fs::create_dir_all(&dir).unwrap();
        let parent_xml = parent
            .map(|p| format!("<parent>{p}</parent>"))
            .unwrap_or_default();
        fs::write(
            dir.join("theme.xml"),
            format!("<theme><title>{code}</title>{parent_xml}</theme>"),
        )
        .unwrap();
        dir
    }

    fn codes(chain: &[&ThemeNode]) -> Vec<String> {
        chain.iter().map(|n| n.code.to_string()).collect()
    }

    #[test]
    fn test_theme_code_parse() {
        let code = ThemeCode::parse("Magento/blank").unwrap();
        assert_eq!(code.vendor(), "Magento");
        assert_eq!(code.name(), "blank");

        assert!(ThemeCode::parse("invalid").is_none());
        assert!(ThemeCode::parse("too/many/slashes").is_none());
        assert!(ThemeCode::parse("/name").is_none());
        assert!(ThemeCode::parse("Vendor/").is_none());
        assert!(ThemeCode::parse("").is_none());
    }

    #[test]
    fn test_theme_code_new_matches_parse() {
        assert_eq!(
            ThemeCode::new("Hyva", "default"),
            ThemeCode::parse("Hyva/default").unwrap()
        );
    }

    #[test]
    fn test_locale_code_validated() {
        assert!(LocaleCode::validated("en_US").is_ok());
        assert!(LocaleCode::validated("nl_NL").is_ok());
        assert!(LocaleCode::validated("english").is_err());
        assert!(LocaleCode::validated("EN_US").is_err());
        assert!(LocaleCode::validated("en_us").is_err());
        assert!(LocaleCode::validated("").is_err());
    }

    #[test]
    fn test_area_parse() {
        assert_eq!(Area::parse("frontend"), Some(Area::Frontend));
        assert_eq!(Area::parse("adminhtml"), Some(Area::Adminhtml));
        assert_eq!(Area::parse("base"), None);
        assert_eq!(Area::Adminhtml.to_string(), "adminhtml");
    }

    #[test]
    fn test_parse_theme_xml_with_parent() {
        let xml = r#"<?xml version="1.0"?>
<theme xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <title>My Theme</title>
    <parent>Hyva/reset</parent>
</theme>"#;

        let descriptor = parse_theme_xml(xml);
        assert_eq!(descriptor.parent.unwrap().as_str(), "Hyva/reset");
    }

    #[test]
    fn test_parse_theme_xml_without_parent() {
        assert_eq!(parse_theme_xml("<theme><title>Root</title></theme>").parent, None);
        assert_eq!(parse_theme_xml("<theme><parent></parent></theme>").parent, None);
        assert_eq!(parse_theme_xml("not xml at all").parent, None);
    }

    #[test]
    fn test_vendor_theme_path_mapping() {
        let blank = ThemeCode::parse("Magento/blank").unwrap();
        assert_eq!(
            vendor_theme_path(&blank, Area::Frontend),
            PathBuf::from("vendor/magento/theme-frontend-blank")
        );
        let backend = ThemeCode::parse("Magento/backend").unwrap();
        assert_eq!(
            vendor_theme_path(&backend, Area::Adminhtml),
            PathBuf::from("vendor/magento/theme-adminhtml-backend")
        );
        let reset = ThemeCode::parse("Hyva/reset").unwrap();
        assert_eq!(
            vendor_theme_path(&reset, Area::Frontend),
            PathBuf::from("vendor/hyva-themes/magento2-reset-theme")
        );
        let custom = ThemeCode::parse("Acme/Shop").unwrap();
        assert_eq!(
            vendor_theme_path(&custom, Area::Frontend),
            PathBuf::from("vendor/acme/theme-frontend-shop")
        );
    }

    #[test]
    fn test_locate_theme_prefers_app_design() {
        let temp = TempDir::new().unwrap();
        let app = make_theme(temp.path(), "frontend", "Magento/luma", None);
        let vendor = temp.path().join("vendor/magento/theme-frontend-luma");
        fs::create_dir_all(&vendor).unwrap();

        let code = ThemeCode::parse("Magento/luma").unwrap();
        assert_eq!(locate_theme(temp.path(), &code, Area::Frontend), vec![app, vendor]);
        assert!(locate_theme(temp.path(), &code, Area::Adminhtml).is_empty());
    }

    #[test]
    fn test_ancestry_is_child_first() {
        let temp = TempDir::new().unwrap();
        make_theme(temp.path(), "frontend", "Acme/child", Some("Hyva/default"));
        make_theme(temp.path(), "frontend", "Hyva/default", Some("Hyva/reset"));
        make_theme(temp.path(), "frontend", "Hyva/reset", None);

        let child = ThemeCode::parse("Acme/child").unwrap();
        let graph = ThemeGraph::build(temp.path(), &[child.clone()], &[Area::Frontend]);

        assert_eq!(graph.len(), 3);
        assert_eq!(
            codes(&graph.ancestry(&child, Area::Frontend)),
            vec!["Acme/child", "Hyva/default", "Hyva/reset"]
        );
    }

    #[test]
    fn test_ancestry_stops_at_missing_parent() {
        let temp = TempDir::new().unwrap();
        make_theme(temp.path(), "frontend", "Acme/orphan", Some("Missing/parent"));

        let code = ThemeCode::parse("Acme/orphan").unwrap();
        let graph = ThemeGraph::build(temp.path(), &[code.clone()], &[Area::Frontend]);

        assert_eq!(codes(&graph.ancestry(&code, Area::Frontend)), vec!["Acme/orphan"]);
    }

    #[test]
    fn test_ancestry_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        make_theme(temp.path(), "frontend", "Acme/a", Some("Acme/b"));
        make_theme(temp.path(), "frontend", "Acme/b", Some("Acme/a"));

        let a = ThemeCode::parse("Acme/a").unwrap();
        let b = ThemeCode::parse("Acme/b").unwrap();
        let graph = ThemeGraph::build(temp.path(), &[a.clone(), b.clone()], &[Area::Frontend]);

        assert_eq!(graph.len(), 2);
        assert_eq!(codes(&graph.ancestry(&a, Area::Frontend)), vec!["Acme/a", "Acme/b"]);
        assert_eq!(codes(&graph.ancestry(&b, Area::Frontend)), vec!["Acme/b", "Acme/a"]);
    }

    #[test]
    fn test_ancestry_self_parent() {
        let temp = TempDir::new().unwrap();
        make_theme(temp.path(), "frontend", "Acme/loop", Some("Acme/loop"));

        let code = ThemeCode::parse("Acme/loop").unwrap();
        let graph = ThemeGraph::build(temp.path(), &[code.clone()], &[Area::Frontend]);

        assert_eq!(codes(&graph.ancestry(&code, Area::Frontend)), vec!["Acme/loop"]);
    }

    #[test]
    fn test_ancestry_is_per_area() {
        let temp = TempDir::new().unwrap();
        make_theme(temp.path(), "frontend", "Acme/child", Some("Hyva/reset"));
        make_theme(temp.path(), "adminhtml", "Hyva/reset", None);

        let child = ThemeCode::parse("Acme/child").unwrap();
        let graph = ThemeGraph::build(
            temp.path(),
            &[child.clone()],
            &[Area::Frontend, Area::Adminhtml],
        );

        assert_eq!(codes(&graph.ancestry(&child, Area::Frontend)), vec!["Acme/child"]);
        assert!(graph.ancestry(&child, Area::Adminhtml).is_empty());
    }

    #[test]
    fn test_web_dirs_across_roots() {
        let temp = TempDir::new().unwrap();
        let app = make_theme(temp.path(), "frontend", "Magento/luma", None);
        fs::create_dir_all(app.join("web")).unwrap();
        let vendor = temp.path().join("vendor/magento/theme-frontend-luma/web");
        fs::create_dir_all(&vendor).unwrap();

        let code = ThemeCode::parse("Magento/luma").unwrap();
        let graph = ThemeGraph::build(temp.path(), &[code.clone()], &[Area::Frontend]);
        let node = graph.node(graph.find(&code, Area::Frontend).unwrap());

        assert_eq!(node.web_dirs().collect::<Vec<_>>(), vec![app.join("web"), vendor]);
    }
}
