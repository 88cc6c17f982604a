//! Splits requested themes between the native copy engine and the
//! delegated `bin/magento` backend.
//!
//! A theme is native-capable when any link of its ancestry chain is a known
//! Hyva root theme or carries a Tailwind build marker. The check runs per
//! area and a hit in any area wins. A theme valid in one area only therefore
//! also gets jobs in the other areas, where they end up skipped as not found.

use rayon::prelude::*;

use crate::theme::{Area, ThemeCode, ThemeGraph, ThemeNode};

/// Root themes handled natively
const NATIVE_ROOT_THEMES: &[&str] = &["Hyva/reset", "Hyva/default", "Hyva/default-csp"];

/// Files below a theme's web/ directory that mark a native-capable theme.
/// Any one of them is enough.
const NATIVE_MARKERS: &[&str] = &[
    "tailwind/tailwind.config.js",
    "tailwind/tailwind.config.cjs",
    "tailwind/package.json",
];

/// Deployment strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Layered copy by this engine
    Native,
    /// Handed to bin/magento for LESS/RequireJS processing
    Delegated,
}

/// Requested themes partitioned by strategy, each list in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub native: Vec<ThemeCode>,
    pub delegated: Vec<ThemeCode>,
}

fn is_native_link(node: &ThemeNode) -> bool {
    if NATIVE_ROOT_THEMES.contains(&node.code.as_str()) {
        return true;
    }
    node.web_dirs()
        .any(|web| NATIVE_MARKERS.iter().any(|marker| web.join(marker).is_file()))
}

/// Strategy of one theme in one area, or None when the theme does not exist
/// there
pub fn classify_in_area(graph: &ThemeGraph, code: &ThemeCode, area: Area) -> Option<Strategy> {
    let chain = graph.ancestry(code, area);
    if chain.is_empty() {
        return None;
    }

    if chain.into_iter().any(is_native_link) {
        Some(Strategy::Native)
    } else {
        Some(Strategy::Delegated)
    }
}

/// Strategy across all requested areas. Themes found in no area stay native
/// so their jobs report "not found" instead of disappearing.
pub fn classify_theme(graph: &ThemeGraph, code: &ThemeCode, areas: &[Area]) -> Strategy {
    let per_area: Vec<Strategy> = areas
        .iter()
        .filter_map(|&area| classify_in_area(graph, code, area))
        .collect();

    if per_area.is_empty() || per_area.contains(&Strategy::Native) {
        Strategy::Native
    } else {
        Strategy::Delegated
    }
}

/// Classify every requested theme
pub fn classify(graph: &ThemeGraph, themes: &[ThemeCode], areas: &[Area]) -> Classification {
    let strategies: Vec<Strategy> = themes
        .par_iter()
        .map(|code| classify_theme(graph, code, areas))
        .collect();

    let mut classification = Classification::default();
    for (code, strategy) in themes.iter().zip(strategies) {
        match strategy {
            Strategy::Native => classification.native.push(code.clone()),
            Strategy::Delegated => classification.delegated.push(code.clone()),
        }
    }
    classification
}
