//! # Magento Static Deploy
//!
//! High-performance static content deployment tool for Magento 2.
//!
//! Themes built on Hyva (or carrying a Tailwind build) are deployed by merging
//! their inheritance chain, module overrides, `lib/web` and every installed
//! package's view assets into `pub/static`, one parallel job per
//! locale × theme × area. Other themes are handed to `bin/magento`.
//!
//! ## Features
//!
//! - First-writer-wins layered placement, by copy or relative symlink
//! - Theme ancestry graph with cycle detection
//! - Bounded worker pool over a crossbeam queue
//! - Locale-level directory symlinks for identical outputs
//! - Development file filtering
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::atomic::AtomicBool;
//! use magento_static_deploy::engine::StaticDeployer;
//!
//! let report = StaticDeployer::new(config).run(&AtomicBool::new(false), &())?;
//! println!("{} files", report.total_files());
//! ```

/// Delegation of non-native themes to bin/magento
pub mod backend;

/// Native vs. delegated theme classification
pub mod classifier;

/// Post-deploy derived asset compilation hook
pub mod compiler;

/// CLI configuration and argument parsing
pub mod config;

/// Single-job deployment, results and run counters
pub mod deployer;

/// Whole-run orchestration and report
pub mod engine;

/// Error types for deployment operations
pub mod error;

/// Path exclusion rules
pub mod filter;

/// Source layer enumeration
pub mod layers;

/// First-writer-wins file placement
pub mod placer;

/// Theme discovery, module descriptors and the package index
pub mod scanner;

/// Job planning and the worker pool
pub mod scheduler;

/// Locale-level directory symlinks
pub mod symlink;

/// Theme, locale, and area types plus the ancestry graph
pub mod theme;
