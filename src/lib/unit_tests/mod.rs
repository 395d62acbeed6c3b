mod archive;
mod config;
mod engine;
mod error;
mod handler;
mod handlers;
mod path;
mod schema;
mod store;
mod template;
mod testlib;
