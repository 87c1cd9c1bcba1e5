//! Query composition layer for CareLake.
//!
//! A small algebra of chainable table operators ([`ops`]) is applied in a
//! caller-declared sequence by the pipeline runner ([`pipeline`]), with
//! optional filters bound late through argument placeholders ([`args`]).
//! Dataset queriers ([`querier`]) resolve logical table names through a
//! [`catalog::TableCatalog`] and hand the finished query to callers as a
//! deferred [`interface::QueryInterface`].
//!
//! Building a query never touches the database; execution happens only
//! when the interface is run against a [`interface::QueryExecutor`].

pub mod args;
pub mod catalog;
pub mod interface;
pub mod ops;
pub mod pipeline;
pub mod querier;
pub mod validate;

pub use args::{Arg, ArgBundle, QueryArg, ResolvedArg};
pub use catalog::TableCatalog;
pub use interface::{QueryExecutor, QueryInterface, RowSet};
pub use pipeline::{Operation, run_pipeline};
pub use querier::DatasetQuerier;
pub use validate::{assert_has_columns, get_column};
