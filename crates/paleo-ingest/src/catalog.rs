//! Taxon catalog discovery
//!
//! The illustration repository stores one `<taxon>.jpg` per illustrated
//! taxon. Listing its git tree gives the set of taxa worth querying, and the
//! exact names the normalizer matches image assets against.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::models::Taxon;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Source of illustration asset names
#[async_trait]
pub trait TaxonCatalog: Send + Sync {
    /// Taxon names with an illustration. Discovery failures yield an empty
    /// list so the run can continue with the supplementary taxa.
    async fn asset_names(&self) -> Vec<Taxon>;
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    tree: TreeRef,
}

#[derive(Debug, Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
}

/// Catalog backed by the GitHub REST API
pub struct GitHubCatalog {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    image_dir: String,
}

impl GitHubCatalog {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.catalog_timeout())
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self {
            client,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            owner: config.repo_owner.clone(),
            repo: config.repo_name.clone(),
            branch: config.repo_branch.clone(),
            image_dir: config.image_dir.clone(),
        })
    }

    /// List asset names, propagating any failure
    pub async fn list_assets(&self) -> Result<Vec<Taxon>> {
        let tree_sha = self.branch_tree_sha().await?;
        debug!(branch = %self.branch, tree = %tree_sha, "Resolved branch tree");

        let url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            self.api_url, self.owner, self.repo, tree_sha
        );
        let tree: TreeResponse = self.get_json(&url, &[("recursive", "1")]).await?;

        if tree.truncated {
            warn!(entries = tree.tree.len(), "Repository tree listing was truncated by GitHub");
        }

        let names: Vec<Taxon> = tree
            .tree
            .iter()
            .filter_map(|entry| asset_name_from_path(&entry.path, &self.image_dir))
            .collect();

        info!(count = names.len(), "Taxa read from illustration repository");
        Ok(names)
    }

    async fn branch_tree_sha(&self) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_url, self.owner, self.repo, self.branch
        );
        let branch: BranchResponse = self.get_json(&url, &[]).await?;
        Ok(branch.commit.commit.tree.sha)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| IngestError::unexpected_shape(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl TaxonCatalog for GitHubCatalog {
    async fn asset_names(&self) -> Vec<Taxon> {
        match self.list_assets().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Illustration catalog unavailable, continuing with supplementary taxa only");
                Vec::new()
            },
        }
    }
}

/// Fixed list of asset names, for offline runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Vec<Taxon>);

#[async_trait]
impl TaxonCatalog for StaticCatalog {
    async fn asset_names(&self) -> Vec<Taxon> {
        self.0.clone()
    }
}

/// Taxon name for a repository path, if it is a `.jpg` under `image_dir`
pub fn asset_name_from_path(path: &str, image_dir: &str) -> Option<Taxon> {
    let prefix = format!("{}/", image_dir.trim_end_matches('/'));
    let relative = path.strip_prefix(&prefix)?;

    let file = Path::new(relative);
    let is_jpg = file
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"));
    if !is_jpg {
        return None;
    }

    file.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(String::from)
}

/// Merge asset names with the supplementary taxa into the query list.
///
/// The result is deduplicated and sorted by byte order of the UTF-8 name, so
/// matching is case-sensitive and every uppercase ASCII letter sorts before
/// every lowercase one: `["B", "a", "B"] + ["C"]` gives `["B", "C", "a"]`.
pub fn build_taxon_list(assets: &[Taxon], supplementary: &[String]) -> Vec<Taxon> {
    assets
        .iter()
        .chain(supplementary)
        .map(String::as_str)
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_name_from_path() {
        let dir = "static/imagens";
        assert_eq!(
            asset_name_from_path("static/imagens/Smilodon.jpg", dir).as_deref(),
            Some("Smilodon")
        );
        assert_eq!(
            asset_name_from_path("static/imagens/Rex_imperator.JPG", dir).as_deref(),
            Some("Rex_imperator")
        );
        assert_eq!(
            asset_name_from_path("static/imagens/sub/Dorudon.jpg", dir).as_deref(),
            Some("Dorudon")
        );
        assert_eq!(asset_name_from_path("static/imagens/Smilodon.png", dir), None);
        assert_eq!(asset_name_from_path("static/imagens", dir), None);
        assert_eq!(asset_name_from_path("other/Smilodon.jpg", dir), None);
        assert_eq!(asset_name_from_path("static/imagens-old/Smilodon.jpg", dir), None);
    }

    #[test]
    fn test_build_taxon_list_dedupes_and_sorts_bytewise() {
        let assets: Vec<Taxon> = ["B.jpg", "a.jpg", "B.jpg"]
            .iter()
            .filter_map(|f| asset_name_from_path(&format!("static/imagens/{f}"), "static/imagens"))
            .collect();
        let supplementary = vec!["C".to_string()];

        assert_eq!(build_taxon_list(&assets, &supplementary), vec!["B", "C", "a"]);
    }

    #[test]
    fn test_build_taxon_list_overlap_with_supplementary() {
        let assets = vec!["Eoraptor".to_string(), "Allosaurus".to_string()];
        let supplementary = vec!["Eoraptor".to_string(), "Dorudon".to_string()];
        assert_eq!(
            build_taxon_list(&assets, &supplementary),
            vec!["Allosaurus", "Dorudon", "Eoraptor"]
        );
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let catalog = StaticCatalog(vec!["Rex".into()]);
        assert_eq!(catalog.asset_names().await, vec!["Rex"]);
    }
}
