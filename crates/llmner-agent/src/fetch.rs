//! Download and cache the CoNLL-2003 English test split.

use std::path::{Path, PathBuf};

use llmner_core::{LabelSchema, NerDataset};
use tracing::info;

use crate::error::{AgentError, Result};

/// Raw CoNLL-2003 `eng.testb` (the test split, 3453 sentences).
pub const CONLL2003_TEST_URL: &str =
    "https://raw.githubusercontent.com/autoih/conll2003/master/CoNLL-2003/eng.testb";

const CACHE_FILE: &str = "eng.testb";

/// Path the test split is cached at inside `cache_dir`.
pub fn cached_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(CACHE_FILE)
}

/// Download `url` to `dest`. The file is written under a temporary name
/// first so an interrupted download never leaves a truncated cache entry.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    info!(url, dest = %dest.display(), "downloading dataset");
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AgentError::Status {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }
    let bytes = resp.bytes().await?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, dest).await?;
    info!(bytes = bytes.len(), "download complete");
    Ok(())
}

/// Load the CoNLL-2003 test split, downloading it into `cache_dir` on first use.
pub async fn fetch_conll2003_test_split(
    client: &reqwest::Client,
    cache_dir: &Path,
) -> Result<NerDataset> {
    let path = cached_path(cache_dir);
    if tokio::fs::try_exists(&path).await? {
        info!(path = %path.display(), "using cached dataset");
    } else {
        download(client, CONLL2003_TEST_URL, &path).await?;
    }
    Ok(NerDataset::load_conll(&path, LabelSchema::conll2003())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "-DOCSTART- -X- -X- O\n\n\
        SOCCER NN B-NP O\n\
        - : O O\n\
        JAPAN NNP B-NP I-LOC\n\
        GET VB B-VP O\n\n\
        Nadim NNP B-NP I-PER\n\
        Ladki NNP I-NP I-PER\n";

    #[tokio::test]
    async fn test_cached_file_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(cached_path(dir.path()), SAMPLE).unwrap();

        // An unreachable client proves no request is made.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(1))
            .build()
            .unwrap();
        let ds = fetch_conll2003_test_split(&client, dir.path()).await.unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[0].tokens, vec!["SOCCER", "-", "JAPAN", "GET"]);
        assert_eq!(ds.rows()[0].ner_tags, vec![0, 0, 5, 0]);
        assert_eq!(ds.rows()[1].ner_tags, vec![1, 2]);
        assert_eq!(ds.rows()[1].id, "1");
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let dest = cached_path(dir.path());
        let client = reqwest::Client::new();

        let err = download(&client, "http://127.0.0.1:9/eng.testb", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Http(_)));
        assert!(!dest.exists());
    }
}
