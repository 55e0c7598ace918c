mod fetcher;
mod resolver;

pub use fetcher::{fetch_release, ReleasePackage};
pub use resolver::{
    resolve_target, select_latest_release, ReleaseEntry, RepoSlug, ResolvedTarget, DEFAULT_BRANCH,
};
