//! Scenario and fixture manifest.
//!
//! A JSON document `{ "scenarios": [...], "fixtures": [...] }`. String fields may carry
//! `{MAIN}`, `{EMPTY}`, `{MOVE_DEST}`, `{SERVICE_ACCOUNT}`, `{PROJECT_ID}` and `{REGION}`
//! placeholders, expanded from [`Credentials`] at load time. Only placeholders that are
//! actually used must be set.
//!
//! ```json
//! {
//!   "scenarios": [
//!     {
//!       "id": "SU-002",
//!       "verb": "SIGN_URL",
//!       "source": "gs://{MAIN}/cloud-file-su-002.json",
//!       "flags": ["--duration=5m", "--impersonate-service-account={SERVICE_ACCOUNT}"],
//!       "local_source": "./test-data/local-files/su/cloud-file-su-002.json",
//!       "expect": {
//!         "success": true,
//!         "signed_url": { "expected_duration_seconds": 300, "http_get": true }
//!       }
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::{BucketRole, Credentials};
use crate::scenario::{Expectation, Scenario, SignedUrlChecks};
use crate::types::error::HarnessError;
use crate::types::{CommandDescriptor, CommandVerb, FixtureDescriptor, ObjectPath};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    scenarios: Vec<RawScenario>,
    #[serde(default)]
    fixtures: Vec<RawFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScenario {
    id: String,
    #[serde(default)]
    description: String,
    verb: CommandVerb,
    source: Option<String>,
    destination: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
    local_source: Option<PathBuf>,
    expect: RawExpectation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpectation {
    success: bool,
    output: Option<String>,
    #[serde(default)]
    signed_url: SignedUrlChecks,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFixture {
    id: String,
    local_source: Option<PathBuf>,
    source: Option<String>,
    destination: String,
    verb: CommandVerb,
    #[serde(default = "default_expect_success")]
    expect_success: bool,
}

fn default_expect_success() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub scenarios: Vec<Scenario>,
    pub fixtures: Vec<FixtureDescriptor>,
}

impl Manifest {
    pub fn load(path: &Path, cli_prefix: &str, credentials: &Credentials) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Io(format!("{}: {e}", path.display())))?;
        let manifest = Self::parse(&content, cli_prefix, credentials)
            .with_context(|| format!("failed to load manifest {}", path.display()))?;
        debug!(
            path = %path.display(),
            scenarios = manifest.scenarios.len(),
            fixtures = manifest.fixtures.len(),
            "manifest loaded."
        );
        Ok(manifest)
    }

    pub fn parse(content: &str, cli_prefix: &str, credentials: &Credentials) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(content)
            .map_err(|e| HarnessError::InvalidManifest(e.to_string()))?;
        let expander = Expander { credentials };

        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(raw.scenarios.len());
        for entry in raw.scenarios {
            if !seen.insert(entry.id.clone()) {
                return Err(HarnessError::InvalidManifest(format!(
                    "duplicate scenario id {}",
                    entry.id
                ))
                .into());
            }
            scenarios.push(expander.scenario(entry, cli_prefix)?);
        }

        let fixtures = raw
            .fixtures
            .into_iter()
            .map(|entry| expander.fixture(entry))
            .collect::<Result<Vec<_>, HarnessError>>()?;

        Ok(Self {
            scenarios,
            fixtures,
        })
    }

    /// Declared fixtures followed by those derived from scenarios without a declared
    /// fixture of the same id.
    pub fn all_fixtures(&self) -> Vec<FixtureDescriptor> {
        let declared: HashSet<&str> = self.fixtures.iter().map(|f| f.id.as_str()).collect();
        let derived = self
            .scenarios
            .iter()
            .filter(|s| !declared.contains(s.id.as_str()))
            .filter_map(FixtureDescriptor::from_scenario);

        self.fixtures.iter().cloned().chain(derived).collect()
    }
}

impl FixtureDescriptor {
    /// The fixture a scenario leaves behind, if any.
    ///
    /// COPY and MOVE own their destination. SIGN_URL and LIST only need their source to
    /// exist, so the fixture points at the source and is never cleaned up.
    pub fn from_scenario(scenario: &Scenario) -> Option<FixtureDescriptor> {
        let descriptor = &scenario.descriptor;
        let destination = match descriptor.verb {
            CommandVerb::Copy | CommandVerb::Move => descriptor.destination.clone()?,
            CommandVerb::SignUrl | CommandVerb::List => descriptor.source.clone()?,
            CommandVerb::Remove => return None,
        };

        Some(FixtureDescriptor {
            id: scenario.id.clone(),
            local_source: scenario.local_source.clone(),
            source: descriptor.source.clone(),
            destination,
            verb: descriptor.verb,
            expect_success: scenario.expectation.success,
        })
    }
}

fn is_placeholder(token: &str) -> bool {
    let name = &token[1..token.len() - 1];
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

struct Expander<'a> {
    credentials: &'a Credentials,
}

impl Expander<'_> {
    fn lookup(&self, placeholder: &str) -> Result<String, HarnessError> {
        match placeholder {
            "{MAIN}" => self.credentials.bucket(BucketRole::Main),
            "{EMPTY}" => self.credentials.bucket(BucketRole::Empty),
            "{MOVE_DEST}" => self.credentials.bucket(BucketRole::MoveDest),
            "{SERVICE_ACCOUNT}" => self.credentials.service_account(),
            "{PROJECT_ID}" => self.credentials.project_id(),
            "{REGION}" => self.credentials.region(),
            other => Err(HarnessError::InvalidManifest(format!(
                "unknown placeholder {other}"
            ))),
        }
    }

    /// Replace every `{NAME}` token (uppercase letters and underscores) in `value`.
    /// Other braces, such as regex quantifiers, are kept as they are.
    fn expand(&self, value: &str) -> Result<String, HarnessError> {
        let mut expanded = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let candidate = &rest[open..];
            match candidate.find('}').map(|close| &candidate[..=close]) {
                Some(token) if is_placeholder(token) => {
                    expanded.push_str(&self.lookup(token)?);
                    rest = &candidate[token.len()..];
                }
                _ => {
                    expanded.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        expanded.push_str(rest);
        Ok(expanded)
    }

    fn path(&self, value: &str) -> Result<ObjectPath, HarnessError> {
        self.expand(value)?.parse()
    }

    fn scenario(&self, entry: RawScenario, cli_prefix: &str) -> Result<Scenario, HarnessError> {
        let mut descriptor = CommandDescriptor::new(cli_prefix, entry.verb).with_flags(
            entry
                .flags
                .iter()
                .map(|flag| self.expand(flag))
                .collect::<Result<Vec<_>, _>>()?,
        );
        if let Some(source) = &entry.source {
            descriptor = descriptor.with_source(self.path(source)?);
        }
        if let Some(destination) = &entry.destination {
            descriptor = descriptor.with_destination(self.path(destination)?);
        }
        descriptor
            .validate()
            .map_err(|e| HarnessError::InvalidManifest(format!("scenario {}: {e}", entry.id)))?;

        let output = entry
            .expect
            .output
            .as_deref()
            .map(|output| self.expand(output))
            .transpose()?;

        Ok(Scenario {
            id: entry.id,
            description: entry.description,
            descriptor,
            expectation: Expectation {
                success: entry.expect.success,
                output,
                signed_url: entry.expect.signed_url,
            },
            local_source: entry.local_source,
        })
    }

    fn fixture(&self, entry: RawFixture) -> Result<FixtureDescriptor, HarnessError> {
        Ok(FixtureDescriptor {
            source: entry.source.as_deref().map(|s| self.path(s)).transpose()?,
            destination: self.path(&entry.destination)?,
            id: entry.id,
            local_source: entry.local_source,
            verb: entry.verb,
            expect_success: entry.expect_success,
        })
    }
}
