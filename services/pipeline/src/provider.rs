use async_trait::async_trait;
use records::TargetEntry;

/// One page of a paginated listing. `next` is the follow-up URL, `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// An activity as listed by the bioactivity database. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    pub standard_type: Option<String>,
    pub standard_value: Option<String>,
    pub standard_units: Option<String>,
    pub molecule_chembl_id: Option<String>,
}

/// Activities per target plus ligand structures.
#[async_trait]
pub trait BioactivitySource: Send + Sync {
    /// First page when `next` is `None`, otherwise the page at `next`.
    async fn activity_page(&self, target_id: &str, next: Option<&str>) -> anyhow::Result<Page<Activity>>;

    /// `Ok(None)` when the molecule has no usable structure.
    async fn canonical_smiles(&self, molecule_id: &str) -> anyhow::Result<Option<String>>;
}

/// Listing of single-protein targets.
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn target_page(&self, next: Option<&str>) -> anyhow::Result<Page<TargetEntry>>;
}

/// Accession -> amino-acid sequence.
#[async_trait]
pub trait SequenceSource: Send + Sync {
    /// `Ok(None)` when the database has no record for the accession.
    async fn sequence(&self, accession: &str) -> anyhow::Result<Option<String>>;
}
