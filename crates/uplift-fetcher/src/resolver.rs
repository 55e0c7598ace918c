use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

pub const DEFAULT_BRANCH: &str = "main";

pub(crate) const USER_AGENT: &str = concat!("uplift/", env!("CARGO_PKG_VERSION"));
const RELEASE_API_TIMEOUT: Duration = Duration::from_secs(30);

/// A repository hosted under the archive-download convention, recognized from
/// an `owner/name` slug or a github URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn parse(repo: &str) -> Option<Self> {
        let repo = repo.trim();
        let rest = repo
            .strip_prefix("https://github.com/")
            .or_else(|| repo.strip_prefix("http://github.com/"))
            .or_else(|| repo.strip_prefix("git@github.com:"))
            .unwrap_or(repo);
        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);

        let mut parts = rest.split('/');
        let owner = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if !is_slug_component(owner) || !is_slug_component(name) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn archive_url(&self, reference: &str) -> String {
        format!(
            "https://github.com/{}/{}/archive/{}.tar.gz",
            self.owner, self.name, reference
        )
    }

    fn releases_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/releases?per_page=30",
            self.owner, self.name
        )
    }
}

fn is_slug_component(value: &str) -> bool {
    !value.is_empty()
        && value.chars().any(|ch| ch.is_ascii_alphanumeric())
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseEntry {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub reference: String,
    pub label: String,
    pub url: Option<String>,
}

impl ResolvedTarget {
    fn from_release(release: &ReleaseEntry) -> Self {
        let label = release
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&release.tag_name)
            .to_string();
        Self {
            reference: release.tag_name.clone(),
            label,
            url: release.html_url.clone(),
        }
    }
}

/// Turn a repository plus ref/"latest release" request into a concrete
/// reference. Only the latest-release path talks to the network; everything
/// else is pure string resolution.
pub fn resolve_target(
    repo: &str,
    explicit_ref: Option<&str>,
    latest_release: bool,
    token: Option<&str>,
) -> Result<ResolvedTarget> {
    if latest_release {
        let slug = RepoSlug::parse(repo).ok_or_else(|| {
            anyhow!("cannot resolve latest release: '{repo}' is not a hosted repository slug")
        })?;
        let releases = fetch_releases(&slug, token)?;
        let release = select_latest_release(&releases).ok_or_else(|| {
            anyhow!("cannot resolve latest release for '{repo}': no published release found")
        })?;
        return Ok(ResolvedTarget::from_release(release));
    }

    let reference = explicit_ref
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .unwrap_or(DEFAULT_BRANCH);
    Ok(ResolvedTarget {
        reference: reference.to_string(),
        label: reference.to_string(),
        url: None,
    })
}

/// First non-draft, non-prerelease entry in listing order; the API returns
/// newest first.
pub fn select_latest_release(releases: &[ReleaseEntry]) -> Option<&ReleaseEntry> {
    releases
        .iter()
        .find(|release| !release.draft && !release.prerelease)
}

fn fetch_releases(slug: &RepoSlug, token: Option<&str>) -> Result<Vec<ReleaseEntry>> {
    let http = HttpClient::builder()
        .timeout(RELEASE_API_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;

    let mut request = http
        .get(slug.releases_url())
        .header("Accept", "application/vnd.github+json");
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let response = request.send().with_context(|| {
        format!(
            "cannot resolve latest release: release listing request failed for {}/{}",
            slug.owner, slug.name
        )
    })?;
    if !response.status().is_success() {
        bail!(
            "cannot resolve latest release: release listing for {}/{} returned {}",
            slug.owner,
            slug.name,
            response.status()
        );
    }

    response
        .json()
        .context("cannot resolve latest release: invalid release listing payload")
}
