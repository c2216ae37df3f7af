use anyhow::Result;
use records::{TargetEntry, TargetMap};
use tracing::{debug, info};

use crate::provider::TargetSource;

/// Pages through every single-protein target and maps each component accession to its target.
pub async fn build_target_map(source: &dyn TargetSource) -> Result<TargetMap> {
    let mut targets: Vec<TargetEntry> = Vec::new();
    let mut next: Option<String> = None;

    loop {
        let page = source.target_page(next.as_deref()).await?;
        debug!(targets = page.items.len(), seen = targets.len(), "map: target page");
        targets.extend(page.items);
        match page.next {
            Some(link) => next = Some(link),
            None => break,
        }
    }

    let map = TargetMap::from_targets(&targets);
    info!(targets = targets.len(), accessions = map.len(), "map: built");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Page;
    use async_trait::async_trait;
    use records::TargetComponent;

    struct PagedTargets {
        pages: Vec<Vec<TargetEntry>>,
    }

    fn target(id: &str, accessions: &[Option<&str>]) -> TargetEntry {
        TargetEntry {
            target_chembl_id: id.to_string(),
            target_components: accessions
                .iter()
                .map(|a| TargetComponent { accession: a.map(String::from) })
                .collect(),
        }
    }

    #[async_trait]
    impl TargetSource for PagedTargets {
        async fn target_page(&self, next: Option<&str>) -> Result<Page<TargetEntry>> {
            let idx: usize = next.map(|n| n.parse().unwrap()).unwrap_or(0);
            let next = (idx + 1 < self.pages.len()).then(|| (idx + 1).to_string());
            Ok(Page { items: self.pages[idx].clone(), next })
        }
    }

    #[tokio::test]
    async fn test_follows_pages_and_last_target_wins() {
        let source = PagedTargets {
            pages: vec![
                vec![target("CHEMBL1", &[Some("P1"), None]), target("CHEMBL2", &[Some("P2")])],
                vec![target("CHEMBL3", &[Some("P1"), Some("")])],
            ],
        };

        let map = build_target_map(&source).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("P1"), Some("CHEMBL3"));
        assert_eq!(map.get("P2"), Some("CHEMBL2"));
    }
}
