//! # Health Ingest
//!
//! Imports Apple Health export bundles into a row store.
//!
//! An export bundle is a ZIP archive holding one large `export.xml`. The
//! pipeline locates that document, parses it, keeps the `<Record>` entries
//! whose type is on the allow-list, normalizes them into rows, and submits
//! the rows in ordered, bounded batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌────────┐   ┌──────────┐
//! │ archive │──▶│ document │──▶│ records │──▶│ normalize │──▶│ loader │──▶│   sink   │
//! │  (zip)  │   │  (xml)   │   │         │   │ allow-list│   │ batches│   │SQLite/REST│
//! └─────────┘   └──────────┘   └─────────┘   └───────────┘   └────────┘   └──────────┘
//!                                      pipeline::Importer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hkload init                                  # create the SQLite table
//! hkload import export.zip --owner me          # import an export bundle
//! hkload import export.zip --owner me --dry-run
//! hkload stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`archive`] | Locate and decode `export.xml` in the ZIP |
//! | [`document`] | XML tree with attribute/child separation |
//! | [`records`] | Extract `HealthData/Record` entries |
//! | [`normalize`] | Allow-list filtering and row mapping |
//! | [`loader`] | Ordered, fail-fast batch submission |
//! | [`sink`] | Row store implementations |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`progress`] | Status reporting |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema for the SQLite store |
//! | [`stats`] | Store summary |

pub mod archive;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod records;
pub mod sink;
pub mod stats;
