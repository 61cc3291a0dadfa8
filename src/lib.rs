//! # Vacancy Harvester
//!
//! An authenticated scraper for a GraphQL staffing marketplace: signs in
//! through a header-based session-token protocol, walks the cursor-paged
//! vacancy list, detects new and changed records against a SQLite
//! snapshot, and serves the results over a JSON/CSV HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ AuthSession  │──▶│ GraphQlClient │──▶│  Pages    │
//! │ login/refresh│   │ 401-once retry│   │ cursor walk│
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            ▼
//!                                      ┌──────────┐
//!                                      │ Reconcile │──▶ SQLite snapshot
//!                                      └────┬─────┘
//!                         ┌─────────────────┤
//!                         ▼                 ▼
//!                    ┌──────────┐     ┌──────────┐
//!                    │   CLI    │     │   HTTP   │
//!                    │   (vh)   │     │  server  │
//!                    └──────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration + env credentials |
//! | [`auth`] | Session-token login, refresh, expiry tracking |
//! | [`graphql`] | Authenticated GraphQL transport and query text |
//! | [`pages`] | Cursor pagination over the vacancy list |
//! | [`reconcile`] | New/updated/unchanged classification |
//! | [`store`] | Snapshot storage (SQLite + in-memory) |
//! | [`scrape`] | Run orchestration and accounting |
//! | [`server`] | HTTP front door |

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod graphql;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod pages;
pub mod reconcile;
pub mod scrape;
pub mod server;
pub mod stats;
pub mod store;
