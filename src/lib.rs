//! EDB - A Versioned Hierarchical Record Store
//!
//! This crate stores structured records inside a content-addressed object
//! graph. Every record is a blob, every value prefix is a directory tree,
//! and every commit is an immutable snapshot of the whole tree. HEAD is the
//! only mutable state and only moves by compare-and-set.
//!
//! # Example
//!
//! ```no_run
//! use edb::db::Edb;
//! use edb::record::LogicalRecord;
//!
//! let mut db = Edb::open("./my_store").unwrap();
//! db.add([LogicalRecord::new(["kind", "name"], ["job", "nightly"]).unwrap()]).unwrap();
//! let head = db.commit("audit", "audit@example.org").unwrap();
//!
//! let records = db.query("*", true).unwrap();
//! assert_eq!(records[0].get("HEAD"), Some(head.to_string().as_str()));
//! ```

pub mod db;
pub mod index;
pub mod query;
pub mod record;
pub mod storage;
