//! # Repository Module
//!
//! Database repository implementations for Caja POS.
//!
//! ## Two ways in
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reads vs. workflow writes                            │
//! │                                                                         │
//! │  Screens, reports, seed                 Coordinators (caja-core)        │
//! │       │                                        │                        │
//! │       │  db.products().list_low_stock()        │  store.begin()         │
//! │       ▼                                        ▼                        │
//! │  XxxRepository { pool }                 SqliteUnitOfWork { tx }         │
//! │  (one pooled connection per call)       (one SQL transaction)           │
//! │       │                                        │                        │
//! │       └──────────► module-level helpers ◄──────┘                        │
//! │                    fetch(conn, id), insert(conn, ..), ...               │
//! │                           │                                             │
//! │                           ▼                                             │
//! │                    SQLite Database                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - Catalog and stock levels
//! - [`CustomerRepository`] - Customers and loyalty accounts
//! - [`SaleRepository`] - Sales with their items
//! - [`DebtRepository`] - Fiado debts with their payments
//! - [`OrderRepository`] - Purchase orders with their lines

pub mod customer;
pub mod debt;
pub mod order;
pub mod product;
pub mod sale;

pub use customer::CustomerRepository;
pub use debt::DebtRepository;
pub use order::OrderRepository;
pub use product::ProductRepository;
pub use sale::SaleRepository;
