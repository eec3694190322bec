//! Static route table with exact, method-agnostic path matching.

use std::collections::HashMap;

use crate::handler::Handler;

/// Immutable mapping from normalized path to handler.
///
/// Built once before the listener starts and read-only afterward, so
/// serving needs no lock around it. Matching is exact string comparison on
/// the normalized form with case preserved; there is no wildcard or prefix
/// matching, and the HTTP method is deliberately ignored: one handler
/// answers every verb on its path.
pub struct Routes {
    table: HashMap<String, Box<dyn Handler>>,
}

impl Routes {
    /// Creates a new route table builder.
    pub fn builder() -> RoutesBuilder {
        RoutesBuilder::new()
    }

    /// Looks up the handler registered for an already-normalized key.
    pub(crate) fn resolve(&self, key: &str) -> Option<&dyn Handler> {
        self.table.get(key).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

pub struct RoutesBuilder {
    table: HashMap<String, Box<dyn Handler>>,
}

impl RoutesBuilder {
    fn new() -> Self {
        Self { table: HashMap::new() }
    }

    /// Registers `handler` under `path`.
    ///
    /// Register the normalized form: no leading or trailing slash, no query
    /// string; the root is the empty string. Registering the same path
    /// twice keeps the later handler.
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.table.insert(path.into(), Box::new(handler));
        self
    }

    pub fn build(self) -> Routes {
        Routes { table: self.table }
    }
}

/// Normalizes a raw request target into a route key.
///
/// `/` maps to the empty key; otherwise exactly one leading and one
/// trailing slash are stripped, then everything from the first `?` on is
/// discarded. The untouched raw target stays available to handlers through
/// the request context.
pub(crate) fn normalize(target: &str) -> &str {
    let key = if target == "/" {
        ""
    } else {
        let stripped = target.strip_prefix('/').unwrap_or(target);
        stripped.strip_suffix('/').unwrap_or(stripped)
    };

    key.split_once('?').map_or(key, |(path, _query)| path)
}
