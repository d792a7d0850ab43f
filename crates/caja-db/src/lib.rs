//! # caja-db: Database Layer for Caja POS
//!
//! SQLite persistence for the sale-consistency core.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        caja-db Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │   Coordinators  │  SaleCoordinator, RestoreCoordinator, ...         │
//! │  │   (caja-core)   │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │ Store::begin()                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      caja-db (THIS CRATE)                        │   │
//! │  │                                                                   │   │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │   │
//! │  │  │  Database   │  │ Repositories│  │   SqliteUnitOfWork      │  │   │
//! │  │  │  (pool.rs)  │  │ product,    │  │   one SQL transaction,  │  │   │
//! │  │  │             │  │ customer,   │  │   versioned writes      │  │   │
//! │  │  │  DbConfig   │  │ sale, debt, │  │                         │  │   │
//! │  │  │  CajaConfig │  │ order       │  │                         │  │   │
//! │  │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │   │
//! │  │                                                                   │   │
//! │  └───────────────────────────────┬───────────────────────────────────┘   │
//! │                                  │                                       │
//! │                                  ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    SQLite Database (WAL mode)                    │   │
//! │  │   products │ customers │ sales │ sale_items │ debts │ orders ... │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use caja_db::{CajaConfig, Database};
//! use caja_core::SaleCoordinator;
//!
//! let config = CajaConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let sales = SaleCoordinator::new(db.clone(), config.sale_settings()?);
//! let done = sales.execute(request).await?;
//! ```

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod telemetry;
pub mod unit_of_work;

pub use config::{CajaConfig, ConfigError, ConfigResult};
pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};
pub use repository::{
    CustomerRepository, DebtRepository, OrderRepository, ProductRepository, SaleRepository,
};
pub use telemetry::init_tracing;
pub use unit_of_work::SqliteUnitOfWork;
