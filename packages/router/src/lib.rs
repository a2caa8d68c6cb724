#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

use std::collections::BTreeMap;

mod context;
pub use context::*;

mod data;
pub use data::*;

mod diagnostics;
pub use diagnostics::*;

mod error;
pub use error::*;

mod fetcher;

mod hydration;
pub use hydration::*;

pub mod matcher;
pub use matcher::{
    find_nearest_boundary, generate_path, get_path_contributing_matches, get_resolve_to_matches,
    join_paths, match_path, match_routes, normalize_pathname, resolve_path, resolve_to,
    strip_basename, DataRoute, LazyRoute, PathMatch, PathPattern, Route, RouteContent, RouteMatch,
    LazyFn, RoutePatch, RouteTree, ShouldRevalidateArgs, ShouldRevalidateFn,
};

mod navigation;
pub use navigation::*;

mod router;
pub use router::*;

mod router_cfg;
pub use router_cfg::*;

mod service;

mod state;
pub use state::*;

mod strategy;
pub use strategy::*;

/// Params parsed from the dynamic segments of a URL, by name. A splat is stored as `*`.
pub type Params = BTreeMap<String, String>;

#[doc(hidden)]
pub mod exports {
    pub use waymark_history;
}
