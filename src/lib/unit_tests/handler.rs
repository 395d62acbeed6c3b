// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::testlib::{new_query, parse_tree, test_facts};
use crate::handlers::{builtin_registry, HostNameHandler};
use crate::{
    AnyHandler, ConfigDiff, ConfigPath, ConfigQuery, ErrorKind, Handler,
    HandlerRegistry, PolicyContext, Renderer, RtconfError, SystemOps,
};

#[derive(Debug)]
struct TestHandler {
    name: &'static str,
    roots: &'static [&'static str],
    deps: &'static [&'static str],
}

impl TestHandler {
    fn new(
        name: &'static str,
        roots: &'static [&'static str],
        deps: &'static [&'static str],
    ) -> Self {
        Self { name, roots, deps }
    }
}

impl Handler for TestHandler {
    type View = ();

    fn name(&self) -> &'static str {
        self.name
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        self.roots.iter().map(|r| r.parse().unwrap()).collect()
    }

    fn dependencies(&self) -> &'static [&'static str] {
        self.deps
    }

    fn get_config(&self, _query: &ConfigQuery) -> Result<(), RtconfError> {
        Ok(())
    }

    fn verify(&self, _view: &(), _policy: &PolicyContext) -> Result<(), RtconfError> {
        Ok(())
    }

    fn generate(&self, _view: &(), _renderer: &Renderer) -> Result<(), RtconfError> {
        Ok(())
    }

    fn apply(&self, _view: &(), _system: &SystemOps) -> Result<(), RtconfError> {
        Ok(())
    }
}

fn names(handlers: &[&dyn AnyHandler]) -> Vec<&'static str> {
    handlers.iter().map(|h| h.name()).collect()
}

#[test]
fn test_registry_duplicate() {
    let mut registry = HandlerRegistry::new();
    registry.register(TestHandler::new("a", &["system"], &[])).unwrap();
    let e = registry
        .register(TestHandler::new("a", &["vrf"], &[]))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    assert_eq!(e.msg(), "Handler a is already registered");
    assert_eq!(registry.names(), vec!["a"]);
}

#[test]
fn test_registry_cycle() {
    let mut registry = HandlerRegistry::new();
    registry.register(TestHandler::new("a", &["system"], &["c"])).unwrap();
    registry.register(TestHandler::new("b", &["vrf"], &["a"])).unwrap();
    let e = registry
        .register(TestHandler::new("c", &["policy"], &["b"]))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::DependencyCycle);
    assert_eq!(e.msg(), "Dependency cycle between handlers: a, b, c");
    assert_eq!(registry.names(), vec!["a", "b"]);
}

#[test]
fn test_registry_unknown_dependency() {
    let mut registry = HandlerRegistry::new();
    registry.register(TestHandler::new("a", &["system"], &["zz"])).unwrap();
    let e = registry.validate().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    assert_eq!(e.msg(), "Handler a depends on unknown handler zz");
}

#[test]
fn test_registry_order() {
    let mut registry = HandlerRegistry::new();
    registry.register(TestHandler::new("c", &["policy"], &["a"])).unwrap();
    registry.register(TestHandler::new("a", &["system"], &[])).unwrap();
    registry.register(TestHandler::new("b", &["vrf"], &["c"])).unwrap();
    registry.validate().unwrap();

    assert_eq!(names(&registry.order(&["a", "b", "c"]).unwrap()), vec!["a", "c", "b"]);
    assert_eq!(names(&registry.order(&["b", "a"]).unwrap()), vec!["a", "b"]);
    assert!(registry.order(&[]).unwrap().is_empty());
}

#[test]
fn test_registry_affected() {
    let mut registry = HandlerRegistry::new();
    registry.register(TestHandler::new("sys", &["system"], &[])).unwrap();
    registry.register(TestHandler::new("vrf", &["vrf"], &[])).unwrap();
    registry
        .register(TestHandler::new("dns", &["system name-server", "service dns"], &[]))
        .unwrap();

    let diff = ConfigDiff::new(
        Arc::new(parse_tree("system {\n    host-name r1;\n}\n")),
        Arc::new(parse_tree(
            "system {\n    host-name r1;\n    name-server 192.0.2.1;\n}\n",
        )),
    );
    assert_eq!(registry.affected(&diff), vec!["sys", "dns"]);
}

#[test]
fn test_builtin_registry_order() {
    let registry = builtin_registry().unwrap();
    let all = registry.names();
    let ordered = names(&registry.order(&all).unwrap());
    let pos = |name: &str| ordered.iter().position(|n| *n == name).unwrap();
    assert!(pos("vrf") < pos("interfaces_ethernet"));
    assert!(pos("policy") < pos("interfaces_ethernet"));
    assert!(pos("interfaces_ethernet") < pos("interfaces_bonding"));
    assert!(pos("interfaces_bonding") < pos("interfaces_bridge"));
    assert!(pos("interfaces_dummy") < pos("interfaces_bridge"));
    assert!(pos("interfaces_bridge") < pos("firewall"));
    assert!(pos("system_host_name") < pos("service_dns_forwarding"));
    assert_eq!(ordered.len(), 10);
}

#[test]
fn test_handler_view_mismatch() {
    let query = new_query("system {\n    host-name r1;\n}\n", "");
    let facts = test_facts();
    let policy = PolicyContext::new(&query, &facts);
    let view = AnyHandler::get_config(&HostNameHandler, &query).unwrap();
    assert_eq!(view.handler(), "system_host_name");
    let other = TestHandler::new("other", &["vrf"], &[]);
    let e = AnyHandler::verify(&other, &view, &policy).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Bug);
    assert_eq!(e.msg(), "Handler other got a view built by system_host_name");
    assert!(AnyHandler::verify(&HostNameHandler, &view, &policy).is_ok());
}
