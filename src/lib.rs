pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fasta;
pub mod integrity;
pub mod output;
pub mod pubmlst;
pub mod registry;
pub mod rmlst;
pub mod staleness;
pub mod store;
