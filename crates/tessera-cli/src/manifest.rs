//! Bundle manifest: which bundles to install and in what order.
//!
//! ```toml
//! [[bundle]]
//! name = "fonts"
//! version = 3
//! url = "https://cdn.example.com/fonts-3.tar"
//! sha256 = "9f86d08..."
//!
//! [[bundle]]
//! name = "ui"
//! version = 12
//! url = "https://cdn.example.com/ui-12.tar"
//! sha256 = "60303ae..."
//! depends_on = ["fonts"]
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tessera_core::TaskDescriptor;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "bundle")]
    pub bundles: Vec<BundleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleEntry {
    pub name: String,
    pub version: u64,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl BundleEntry {
    /// `<kind>:<name>@<version>`
    pub fn descriptor(&self, kind: &str) -> Result<TaskDescriptor> {
        Ok(TaskDescriptor::new(kind, self.name.as_str())?.with_version(self.version))
    }

    /// File name of the installed bundle.
    pub fn file_name(&self) -> String {
        format!("{}-{}.bundle", self.name, self.version)
    }
}

impl Manifest {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(s).context("parsing bundle manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest at {:?}", path))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid manifest {:?}", path))
    }

    /// Checks:
    /// - at least one bundle, names unique
    /// - sha256 is 32 bytes of hex
    /// - every `depends_on` names another bundle
    /// - no dependency cycles
    pub fn validate(&self) -> Result<()> {
        if self.bundles.is_empty() {
            bail!("manifest must contain at least one [[bundle]] entry");
        }

        let mut seen = HashMap::new();
        for entry in &self.bundles {
            entry
                .descriptor("fetch")
                .with_context(|| format!("bundle name {:?} is not usable", entry.name))?;
            if seen.insert(entry.name.as_str(), ()).is_some() {
                bail!("bundle '{}' is listed twice", entry.name);
            }
            let digest = hex::decode(&entry.sha256)
                .with_context(|| format!("bundle '{}' has a non-hex sha256", entry.name))?;
            if digest.len() != 32 {
                bail!(
                    "bundle '{}' sha256 must be 32 bytes (got {})",
                    entry.name,
                    digest.len()
                );
            }
        }

        for entry in &self.bundles {
            for dep in &entry.depends_on {
                if dep == &entry.name {
                    bail!("bundle '{}' cannot depend on itself", entry.name);
                }
                if !seen.contains_key(dep.as_str()) {
                    bail!("bundle '{}' has unknown dependency '{}'", entry.name, dep);
                }
            }
        }

        self.install_order().map(|_| ())
    }

    /// Bundles ordered so that every bundle comes after its dependencies.
    /// Ties keep manifest order.
    pub fn install_order(&self) -> Result<Vec<&BundleEntry>> {
        let index: HashMap<&str, usize> = self
            .bundles
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();

        let mut remaining: Vec<usize> = self.bundles.iter().map(|b| b.depends_on.len()).collect();
        let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, entry) in self.bundles.iter().enumerate() {
            for dep in &entry.depends_on {
                let dep = *index
                    .get(dep.as_str())
                    .ok_or_else(|| anyhow!("bundle '{}' has unknown dependency '{}'", entry.name, dep))?;
                dependents.entry(dep).or_default().push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.bundles.len())
            .filter(|i| remaining[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.bundles.len());
        while let Some(i) = ready.pop_front() {
            order.push(&self.bundles[i]);
            for &next in dependents.get(&i).map(Vec::as_slice).unwrap_or_default() {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() != self.bundles.len() {
            let stuck = self
                .bundles
                .iter()
                .enumerate()
                .find(|(i, _)| remaining[*i] > 0)
                .map(|(_, b)| b.name.as_str())
                .unwrap_or("?");
            bail!("cycle detected in bundle dependencies involving '{}'", stuck);
        }
        Ok(order)
    }
}
