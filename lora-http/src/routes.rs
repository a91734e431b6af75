//! Route table: URL pattern -> handler.
//! A pattern ending in '/' matches its whole subtree; any other pattern matches exactly.
//! Longest matching pattern wins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::adapter::Queues;
use crate::handlers::Handler;
use crate::server::{Request, Response};

#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its URL. Last writer wins on collision.
    pub fn insert(&self, handler: Arc<dyn Handler>) {
        let url = handler.url().to_string();
        let mut routes = match self.routes.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if routes.insert(url.clone(), handler).is_some() {
            warn!("route {} already bound, replacing previous handler", url);
        }
    }

    /// Handler for `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Handler>> {
        let routes = match self.routes.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(h) = routes.get(path) {
            return Some(h.clone());
        }
        routes
            .iter()
            .filter(|(pattern, _)| pattern.ends_with('/') && path.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, h)| h.clone())
    }

    pub fn len(&self) -> usize {
        match self.routes.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn dispatch(&self, req: Request, queues: &Queues) -> Response {
        match self.lookup(&req.path) {
            Some(handler) => handler.handle(req, queues).await,
            None => Response::text(404, format!("no handler bound for {}", req.path)),
        }
    }
}
