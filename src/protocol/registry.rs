//! Stage registry: which version pairs the engine can cross.
//!
//! Stages register keyed by their adjacent version pair. Resolution walks
//! the version axis from a session's server version to the canonical
//! version — versions are totally ordered, so the path is simply every
//! registered pair crossed in sequence. A session resolves once, keeps the
//! resulting [`TranslationPipeline`], and reuses it for every frame.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::TranslationError;
use crate::protocol::pipeline::TranslationPipeline;
use crate::protocol::stage::{RemapTable, TableStage, TransformStage};
use crate::protocol::version::ProtocolVersion;

/// Registered transform stages, keyed by `(older, newer)` version pair.
///
/// Built once at startup from collaborator-supplied tables, then shared
/// immutably (`Arc<StageRegistry>`) by every session.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<(ProtocolVersion, ProtocolVersion), Arc<dyn TransformStage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage for its version pair. A later registration for the
    /// same pair replaces the earlier one.
    pub fn register(&mut self, stage: Arc<dyn TransformStage>) {
        let key = (stage.older(), stage.newer());
        debug!(older = %key.0, newer = %key.1, "stage registered");
        self.stages.insert(key, stage);
    }

    /// Register a data-driven stage from its table.
    pub fn register_table(&mut self, table: RemapTable) {
        self.register(Arc::new(TableStage::new(table)));
    }

    /// Load a JSON array of remap tables, registering a stage per entry.
    pub fn load_tables(&mut self, json: &str) -> Result<usize, serde_json::Error> {
        let tables: Vec<RemapTable> = serde_json::from_str(json)?;
        let count = tables.len();
        for table in tables {
            self.register_table(table);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn stage_up_from(&self, older: ProtocolVersion) -> Option<&Arc<dyn TransformStage>> {
        self.stages
            .iter()
            .find(|((o, _), _)| *o == older)
            .map(|(_, s)| s)
    }

    fn stage_down_from(&self, newer: ProtocolVersion) -> Option<&Arc<dyn TransformStage>> {
        self.stages
            .iter()
            .find(|((_, n), _)| *n == newer)
            .map(|(_, s)| s)
    }

    /// Resolve the ordered stage chain connecting `server_version` to the
    /// canonical version.
    ///
    /// # Errors
    /// [`TranslationError::MissingStage`] when no registered pair continues
    /// the walk.
    pub fn resolve(
        &self,
        server_version: ProtocolVersion,
    ) -> Result<TranslationPipeline, TranslationError> {
        let canonical = ProtocolVersion::CANONICAL;
        let mut chain: Vec<Arc<dyn TransformStage>> = Vec::new();

        if server_version < canonical {
            // Server is older: inbound frames climb the axis.
            let mut current = server_version;
            while current < canonical {
                let stage = self.stage_up_from(current).ok_or_else(|| {
                    TranslationError::MissingStage {
                        older: current,
                        newer: canonical,
                    }
                })?;
                current = stage.newer();
                chain.push(Arc::clone(stage));
            }
        } else if server_version > canonical {
            // Server is newer: inbound frames descend the axis.
            let mut current = server_version;
            while current > canonical {
                let stage = self.stage_down_from(current).ok_or_else(|| {
                    TranslationError::MissingStage {
                        older: canonical,
                        newer: current,
                    }
                })?;
                current = stage.older();
                chain.push(Arc::clone(stage));
            }
        }

        debug!(server = %server_version, stages = chain.len(), "pipeline resolved");
        Ok(TranslationPipeline::new(server_version, chain))
    }
}
