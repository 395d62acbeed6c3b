mod archive;
mod command;
mod commit;
mod config;
mod deserializer;
mod diff;
mod engine;
mod error;
mod facts;
mod file;
mod handler;
pub mod handlers;
mod path;
mod policy;
mod query;
mod renderer;
mod schema;
mod store;
mod system;
mod template;
mod text;
mod tree;
mod value;

#[cfg(test)]
mod unit_tests;

pub use crate::archive::{CommitArchive, CommitEntry, PendingConfirm};
pub use crate::command::{
    CancelToken, CommandOutput, CommandRunner, CommandSpec, ProcessRunner,
};
pub use crate::commit::{
    CommitLock, CommitLockGuard, CommitOptions, CommitReport, Committer,
};
pub use crate::config::EngineConfig;
pub use crate::diff::{ChangeKind, ChildNodesDiff, ConfigDiff};
pub use crate::engine::{Engine, DEFAULT_CONFIRM_MINUTES};
pub use crate::error::{ErrorKind, RtconfError};
pub use crate::facts::SystemFacts;
pub use crate::file::FileOptions;
pub use crate::handler::{AnyHandler, Handler, HandlerRegistry, HandlerView};
pub use crate::path::ConfigPath;
pub use crate::policy::{
    interface_membership, InterfaceRef, Membership, PkiRef, PolicyContext,
    RouteMapRef, VrfRef, IPV6_MTU_MIN, MTU_MAX, MTU_MIN,
};
pub use crate::query::{ConfigDictOptions, ConfigQuery};
pub use crate::renderer::Renderer;
pub use crate::schema::{NodeKind, Schema, SchemaNode, SchemaRef};
pub use crate::store::ConfigStore;
pub use crate::system::{ServiceAction, SystemOps};
pub use crate::template::{Template, TemplateSet};
pub use crate::text::{from_text, read_header, to_text, CONFIG_VERSION};
pub use crate::tree::{ChildNodes, ConfigNode, ConfigTree, NodeData};
pub use crate::value::{ipv4_in_prefix, parse_ip_prefix, ConfigValue, ValueType};
