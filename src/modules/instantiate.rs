//! Module Instantiation
//!
//! Turns fetched module content into live instances. The instantiator
//! re-runs content verification when asked to; the safety gate asks
//! for that exactly when the path did not already go through the
//! sandbox pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::modules::format::{parse_module_manifest, ModuleManifest};
use crate::types::{ModuleCapability, ModuleInstance, ModuleInstantiator, VerificationManager};

/// A module instantiated from its manifest.
#[derive(Debug)]
pub struct ManifestModule {
    manifest: ModuleManifest,
    path: String,
}

impl ManifestModule {
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }
}

impl ModuleInstance for ManifestModule {
    fn module_id(&self) -> &str {
        &self.manifest.id
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn capabilities(&self) -> Vec<ModuleCapability> {
        self.manifest.capabilities.clone()
    }
}

/// Manifest-based implementation of [`ModuleInstantiator`].
pub struct ManifestInstantiator {
    verifier: Option<Arc<dyn VerificationManager>>,
}

impl ManifestInstantiator {
    pub fn new(verifier: Option<Arc<dyn VerificationManager>>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl ModuleInstantiator for ManifestInstantiator {
    async fn instantiate(
        &self,
        path: &str,
        content: &str,
        verify: bool,
    ) -> Result<Arc<dyn ModuleInstance>> {
        if verify {
            if let Some(verifier) = &self.verifier {
                let mut changes = BTreeMap::new();
                changes.insert(path.to_string(), content.to_string());
                let report = verifier.verify_proposal(&changes).await?;
                if !report.passed {
                    bail!(
                        "module content failed verification: {}",
                        report.errors.join("; ")
                    );
                }
            }
        }

        let manifest = parse_module_manifest(content, path);
        debug!(
            "Instantiated module {} from {} ({} capabilities)",
            manifest.id,
            path,
            manifest.capabilities.len()
        );

        Ok(Arc::new(ManifestModule {
            manifest,
            path: path.to_string(),
        }))
    }
}
