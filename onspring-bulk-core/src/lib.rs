#![doc = "onspring-bulk-core: core logic library for onspring-bulk."]

//! Retrying API access, pagination, file and reference discovery, and the
//! bulk workflows (download, delete, report, references, transfer) that run
//! on top of them.
//!
//! The crate is transport agnostic: the remote platform is reached only
//! through [`contract::RecordApi`], and files, reports and progress go
//! through the other collaborator traits in [`contract`]. The CLI crate
//! provides the real implementations.
//!
//! # Layout
//! - [`remote`]: retry policy and the Remote Access Layer
//! - [`paging`]: pagination driver
//! - [`discovery`]: attachment and reference discovery
//! - [`fanout`]: bounded concurrent execution
//! - [`attachments`], [`records`], [`transfer`]: the workflows

pub mod attachments;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod fanout;
pub mod model;
pub mod paging;
pub mod records;
pub mod remote;
pub mod report;
pub mod scope;
pub mod status;
pub mod transfer;

pub use status::ProcessStatus;
