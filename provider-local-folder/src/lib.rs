//! # Local Folder Provider
//!
//! Implements `CloudProvider` on top of a directory.
//!
//! ## Overview
//!
//! Some services (iCloud Drive on desktop, a mounted network share) are
//! reached through a folder that the OS keeps in sync. This provider writes
//! uploads under that folder with `tokio::fs` and reads them back for
//! listing and download. Remote paths are always resolved inside the root;
//! any `..` component is rejected.

pub mod folder;

pub use folder::LocalFolderProvider;
