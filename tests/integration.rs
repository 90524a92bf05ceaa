//! Integration tests entry point
//!
//! Runs the ingestion and analysis engines end to end against an in-process
//! source, a SQLite store and the in-memory fingerprint store:
//! - Incremental ingest, then analysis of everything pending
//! - Duplicate suppression across engines sharing one fingerprint store
//! - Failure handling and recovery scenarios

mod integration_tests;
