use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::archive::{apply_plan, ClusterOutcome};
use crate::cluster::{strategy_for, Cluster, ClusterStrategy};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::Result;
use crate::extract::Extractor;
use crate::ledger::Ledger;
use crate::loader::{discover, Candidate};
use crate::lock::RunLock;
use crate::plan::{plan_clusters, ConsolidationPlan};
use crate::probe::{ContentProbe, StreamingProbe};

#[derive(Serialize, Debug, Clone, Default)]
pub struct RunReport {
    pub discovered: usize,
    pub extraction_errors: usize,
    pub planned: usize,
    pub dry_run: bool,
    pub clusters: Vec<ClusterOutcome>,
}

impl RunReport {
    pub fn written(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_written()).count()
    }

    pub fn failed(&self) -> usize {
        self.clusters.len() - self.written()
    }
}

/// Drives Discover -> Extract -> Cluster -> {SelectBase -> Merge} planning,
/// then applies the plan cluster by cluster.
pub struct Consolidator {
    config: EngineConfig,
    probe: Box<dyn ContentProbe>,
    strategy: Box<dyn ClusterStrategy>,
}

impl Consolidator {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let strategy = strategy_for(config.strategy);
        Ok(Self {
            config,
            probe: Box::new(StreamingProbe),
            strategy,
        })
    }

    pub fn with_probe(mut self, probe: Box<dyn ContentProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ClusterStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn discover(&self) -> Result<Vec<Candidate>> {
        let candidates = discover(&self.config)?;
        info!(count = candidates.len(), "discovered documents");
        Ok(candidates)
    }

    pub fn extract(&self, candidates: &[Candidate]) -> Vec<Document> {
        let extractor = Extractor::new(&self.config, self.probe.as_ref());
        candidates.iter().map(|c| extractor.extract(c)).collect()
    }

    pub fn load(&self) -> Result<Vec<Document>> {
        let candidates = self.discover()?;
        Ok(self.extract(&candidates))
    }

    pub fn cluster<'a>(&self, docs: &'a [Document]) -> Vec<Cluster<'a>> {
        if docs.len() < 2 {
            return Vec::new();
        }
        let clusters = self.strategy.build(docs, &self.config);
        info!(
            clusters = clusters.len(),
            strategy = self.strategy.name(),
            "clustering complete"
        );
        clusters
    }

    pub fn plan(&self, docs: &[Document], now: DateTime<Utc>) -> ConsolidationPlan {
        plan_clusters(self.cluster(docs), &self.config, now)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.config.ledger_root())
    }

    pub fn apply(&self, plan: &ConsolidationPlan) -> Vec<ClusterOutcome> {
        apply_plan(plan, &self.ledger())
    }

    /// Full run. With `dry_run` nothing is written and the plan is returned
    /// alongside the report.
    pub fn run(&self, now: DateTime<Utc>, dry_run: bool) -> Result<(RunReport, ConsolidationPlan)> {
        let _lock = if self.config.lock && !dry_run {
            Some(RunLock::acquire(self.config.primary_root())?)
        } else {
            None
        };

        let docs = self.load()?;
        let mut report = RunReport {
            discovered: docs.len(),
            extraction_errors: docs.iter().filter(|d| d.extraction_error.is_some()).count(),
            dry_run,
            ..RunReport::default()
        };

        let plan = self.plan(&docs, now);
        report.planned = plan.clusters.len();

        if plan.is_empty() {
            info!("nothing to consolidate");
            return Ok((report, plan));
        }

        if !dry_run {
            report.clusters = self.apply(&plan);
            info!(
                written = report.written(),
                failed = report.failed(),
                "run complete"
            );
        }

        Ok((report, plan))
    }
}
