//! # cvedb
//!
//! A CVE corpus import, reconciliation, and query tool.
//!
//! cvedb walks a cvelistV5-style checkout (one JSON document per CVE,
//! partitioned by year and id range), normalizes each document into a flat
//! relational record, and bulk-imports into SQLite with batched upserts.
//! A two-phase audit/retry protocol reconciles partial imports: `status`
//! compares the corpus against the store and writes a failure manifest,
//! `retry` resolves exactly the entries that manifest names.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Corpus Walk  │──▶│  Normalize   │──▶│  SQLite   │
//! │ year/Nxxx/*  │   │ batch upsert │   │  cves     │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!        │                                  │
//!        │  audit ──▶ manifest ──▶ retry ───┤
//!        │                                  ▼
//!        │                            ┌──────────┐
//!        └───────────────────────────▶│ HTTP API │
//!                                     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cvedb init                 # create database
//! cvedb import               # bulk import the corpus
//! cvedb status               # audit corpus vs store, write manifest
//! cvedb retry                # re-import manifest entries
//! cvedb stats                # store summary
//! cvedb serve api            # start the query API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Canonical record and manifest types |
//! | [`error`] | Recoverable pipeline error kinds |
//! | [`extract`] | Record normalization (pure) |
//! | [`walker`] | Corpus enumeration |
//! | [`import`] | Bulk import with batched upserts |
//! | [`audit`] | Import status audit + manifest |
//! | [`retry`] | Manifest-driven retry |
//! | [`stats`] | Store statistics |
//! | [`server`] | Read-only HTTP query API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema initialization |

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod import;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retry;
pub mod server;
pub mod stats;
pub mod walker;
