//! Reconciles client-edited classroom trees into a relational store.
//!
//! A client submits the whole classroom (modules, lessons, resources) as it
//! sees it, with per-node mutation flags and temporary ids for nodes it has
//! created. One synchronization turns that snapshot into the minimal set of
//! row inserts, updates, order rewrites and deletes, uploads inline assets
//! to an object store, and returns the ids the store assigned.
//!
//! # Examples
//!
//! Direct use of [`reconcile::Reconciler`]:
//! ```
//! use classsync::{
//!     assets::memory::MemoryObjectStore,
//!     node::{ClassroomTree, ModuleNode, NodeHeader},
//!     persist::sqlite::SqliteContentStore,
//!     reconcile::Reconciler,
//!     record::ClassroomInfo,
//!     types::NodeId,
//! };
//!
//! let mut store = SqliteContentStore::open_in_memory().expect("open sqlite");
//! let id = store.create_classroom(&ClassroomInfo::default(), true).expect("classroom");
//! let mut objects = MemoryObjectStore::default();
//!
//! let mut tree = ClassroomTree::new(id);
//! tree.modules.push(ModuleNode {
//!     header: NodeHeader::new(NodeId::parse("m-1").expect("id"), 0),
//!     name: "Basics".to_string(),
//!     description: String::new(),
//!     lessons: Vec::new(),
//! });
//!
//! let report = Reconciler::new(&mut store, &mut objects).sync(&tree).expect("sync");
//! assert_eq!(report.modules.inserted, 1);
//! tree.promote(&report);
//! let again = Reconciler::new(&mut store, &mut objects).sync(&tree).expect("resync");
//! assert!(again.is_noop());
//! ```
//!
//! Runtime usage:
//! ```no_run
//! use classsync::{
//!     assets::fs::FsObjectStore,
//!     node::ClassroomTree,
//!     persist::sqlite::SqliteContentStore,
//!     runtime::handle::{RuntimeConfig, spawn_syncer},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteContentStore::open("classsync.db").expect("open sqlite");
//! let objects = FsObjectStore::open("assets", "http://localhost:3040/assets").expect("assets");
//! let handle = spawn_syncer(Box::new(store), Box::new(objects), RuntimeConfig::default());
//! let report = handle.sync(ClassroomTree::new(1)).await.expect("sync");
//! println!("{} temporary ids promoted", report.id_map.len());
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Object storage and inline asset materialization.
pub mod assets;
/// Environment configuration for the server binary.
pub mod config;
/// Request-scoped identifier resolution.
pub mod core;
/// Client tree wire model.
pub mod node;
/// Store operations and the mutation-flag interpreter.
pub mod op;
/// Relational store abstraction and SQLite implementation.
pub mod persist;
/// Planning, execution and reporting of one synchronization.
pub mod reconcile;
/// Store-side row shapes.
pub mod record;
/// Single-writer runtime handle and events.
pub mod runtime;
/// HTTP router and handlers.
pub mod server;
/// Identifiers and their classification.
pub mod types;
