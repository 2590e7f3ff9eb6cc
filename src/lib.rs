pub mod app;
pub mod columns;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod metric;
pub mod output;
pub mod period;
pub mod reshape;
pub mod store;
pub mod workbook;
