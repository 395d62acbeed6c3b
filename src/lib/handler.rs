// SPDX-License-Identifier: Apache-2.0

use std::any::Any;

use crate::{
    ConfigDiff, ConfigPath, ConfigQuery, ErrorKind, PolicyContext, Renderer,
    RtconfError, SystemOps,
};

/// Unit of configuration logic owning one or more configuration subtrees.
///
/// During a commit each affected handler goes through `get_config()` and
/// `verify()` (no side effects), then `generate()` (files only) and
/// finally `apply()`.
pub trait Handler: Send + Sync + 'static {
    /// Typed view built from the configuration by `get_config()`.
    type View: std::fmt::Debug + Send + 'static;

    fn name(&self) -> &'static str;

    /// Subtrees whose change makes this handler part of a commit.
    fn config_roots(&self) -> Vec<ConfigPath>;

    fn is_affected(&self, diff: &ConfigDiff) -> bool {
        self.config_roots().iter().any(|r| diff.node_changed(r))
    }

    /// Handlers which must run before this one.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// External tools needed by `apply()`.
    fn required_tools(&self) -> &'static [&'static str] {
        &[]
    }

    fn get_config(&self, query: &ConfigQuery)
        -> Result<Self::View, RtconfError>;

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError>;

    fn generate(
        &self,
        view: &Self::View,
        renderer: &Renderer,
    ) -> Result<(), RtconfError>;

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError>;
}

/// View of any handler, only usable with the handler which built it.
#[derive(Debug)]
pub struct HandlerView {
    handler: &'static str,
    inner: Box<dyn Any + Send>,
}

impl HandlerView {
    pub fn handler(&self) -> &'static str {
        self.handler
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

/// Object safe form of [Handler] used by the registry.
pub trait AnyHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn config_roots(&self) -> Vec<ConfigPath>;
    fn is_affected(&self, diff: &ConfigDiff) -> bool;
    fn dependencies(&self) -> &'static [&'static str];
    fn required_tools(&self) -> &'static [&'static str];
    fn get_config(&self, query: &ConfigQuery)
        -> Result<HandlerView, RtconfError>;
    fn verify(
        &self,
        view: &HandlerView,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError>;
    fn generate(
        &self,
        view: &HandlerView,
        renderer: &Renderer,
    ) -> Result<(), RtconfError>;
    fn apply(
        &self,
        view: &HandlerView,
        system: &SystemOps,
    ) -> Result<(), RtconfError>;
}

impl<H: Handler> AnyHandler for H {
    fn name(&self) -> &'static str {
        Handler::name(self)
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        Handler::config_roots(self)
    }

    fn is_affected(&self, diff: &ConfigDiff) -> bool {
        Handler::is_affected(self, diff)
    }

    fn dependencies(&self) -> &'static [&'static str] {
        Handler::dependencies(self)
    }

    fn required_tools(&self) -> &'static [&'static str] {
        Handler::required_tools(self)
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<HandlerView, RtconfError> {
        let view = Handler::get_config(self, query)?;
        log::debug!("{} view: {:?}", Handler::name(self), view);
        Ok(HandlerView {
            handler: Handler::name(self),
            inner: Box::new(view),
        })
    }

    fn verify(
        &self,
        view: &HandlerView,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        Handler::verify(self, downcast::<H>(self, view)?, policy)
    }

    fn generate(
        &self,
        view: &HandlerView,
        renderer: &Renderer,
    ) -> Result<(), RtconfError> {
        Handler::generate(self, downcast::<H>(self, view)?, renderer)
    }

    fn apply(
        &self,
        view: &HandlerView,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        Handler::apply(self, downcast::<H>(self, view)?, system)
    }
}

fn downcast<'a, H: Handler>(
    handler: &H,
    view: &'a HandlerView,
) -> Result<&'a H::View, RtconfError> {
    view.downcast_ref::<H::View>().ok_or_else(|| {
        RtconfError::new(
            ErrorKind::Bug,
            format!(
                "Handler {} got a view built by {}",
                Handler::name(handler),
                view.handler
            ),
        )
    })
}

/// Registered handlers and their dependency graph.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn AnyHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Dependencies may name handlers registered later,
    /// but a dependency cycle is refused.
    pub fn register<H: Handler>(&mut self, handler: H) -> Result<(), RtconfError> {
        let name = Handler::name(&handler);
        if self.get(name).is_some() {
            let e = RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Handler {name} is already registered"),
            );
            log::error!("{}", e);
            return Err(e);
        }
        self.handlers.push(Box::new(handler));
        if let Err(e) = self.sorted() {
            self.handlers.pop();
            return Err(e);
        }
        log::debug!("Registered handler {name}");
        Ok(())
    }

    /// Every dependency must name a registered handler.
    pub fn validate(&self) -> Result<(), RtconfError> {
        for handler in self.handlers.iter() {
            for dep in handler.dependencies() {
                if self.get(dep).is_none() {
                    let e = RtconfError::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "Handler {} depends on unknown handler {dep}",
                            handler.name()
                        ),
                    );
                    log::error!("{}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn AnyHandler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Handlers touched by `diff`, in registration order.
    pub fn affected(&self, diff: &ConfigDiff) -> Vec<&'static str> {
        self.handlers
            .iter()
            .filter(|h| h.is_affected(diff))
            .map(|h| h.name())
            .collect()
    }

    // Stable topological sort of all handlers: among the handlers whose
    // dependencies are satisfied, the earliest registered comes first.
    fn sorted(&self) -> Result<Vec<usize>, RtconfError> {
        let mut done = vec![false; self.handlers.len()];
        let mut ret = Vec::new();
        while ret.len() < self.handlers.len() {
            let next = self.handlers.iter().enumerate().position(|(i, h)| {
                !done[i]
                    && h.dependencies().iter().all(|dep| {
                        match self.handlers.iter().position(|o| o.name() == *dep) {
                            Some(j) => done[j],
                            None => true,
                        }
                    })
            });
            match next {
                Some(i) => {
                    done[i] = true;
                    ret.push(i);
                }
                None => {
                    let remains: Vec<&str> = self
                        .handlers
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !done[*i])
                        .map(|(_, h)| h.name())
                        .collect();
                    let e = RtconfError::new(
                        ErrorKind::DependencyCycle,
                        format!(
                            "Dependency cycle between handlers: {}",
                            remains.join(", ")
                        ),
                    );
                    log::error!("{}", e);
                    return Err(e);
                }
            }
        }
        Ok(ret)
    }

    /// Order `names` so that every handler comes after its dependencies,
    /// including dependencies reached through handlers not in `names`.
    pub fn order(
        &self,
        names: &[&str],
    ) -> Result<Vec<&dyn AnyHandler>, RtconfError> {
        Ok(self
            .sorted()?
            .into_iter()
            .map(|i| self.handlers[i].as_ref())
            .filter(|h| names.contains(&h.name()))
            .collect())
    }
}
