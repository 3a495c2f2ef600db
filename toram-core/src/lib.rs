//! Core library for normalizing and browsing the Toram item database.

pub mod assembler;
pub mod browse;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod mapper;
pub mod models;
pub mod shapes;
pub mod statting;

pub use assembler::{Assembler, AssemblerOptions, Listing, TableDiagnostic};
pub use database::{Database, ItemStore, Unreachable, open_store};
pub use error::{Result, ToramError};
pub use models::CompleteView;
