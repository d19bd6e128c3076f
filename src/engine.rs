use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotate::BlockModel;
use crate::docx::extract::extract_blocks;
use crate::docx::package::sha256_hex;
use crate::docx::regenerate::{regenerate_with, RegenerateOptions, StalePositionSkip};
use crate::error::{DocError, Result};
use crate::render::HtmlRenderer;
use crate::substitute::{ReplacementMap, SubstitutionOutcome, Substitutor, DEFAULT_DELIMITER};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Statement of work.
    Sow,
    /// Master services agreement.
    Msa,
}

impl DocumentKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Sow => "SOW",
            DocumentKind::Msa => "MSA",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Sow => "sow",
            DocumentKind::Msa => "msa",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supplies template bytes. Called once per extraction and once more for the
/// fresh reload that regeneration works on.
pub trait TemplateLoader {
    fn load(&self, kind: DocumentKind) -> Result<Vec<u8>>;
}

impl<F> TemplateLoader for F
where
    F: Fn(DocumentKind) -> Result<Vec<u8>>,
{
    fn load(&self, kind: DocumentKind) -> Result<Vec<u8>> {
        self(kind)
    }
}

#[derive(Clone, Debug)]
pub struct DirTemplateLoader {
    pub sow: PathBuf,
    pub msa: PathBuf,
}

impl DirTemplateLoader {
    pub fn new(sow: impl Into<PathBuf>, msa: impl Into<PathBuf>) -> Self {
        Self {
            sow: sow.into(),
            msa: msa.into(),
        }
    }

    pub fn path(&self, kind: DocumentKind) -> &Path {
        match kind {
            DocumentKind::Sow => &self.sow,
            DocumentKind::Msa => &self.msa,
        }
    }
}

impl TemplateLoader for DirTemplateLoader {
    fn load(&self, kind: DocumentKind) -> Result<Vec<u8>> {
        let path = self.path(kind);
        std::fs::read(path).map_err(|e| DocError::TemplateUnavailable {
            kind,
            message: format!("{}: {e}", path.display()),
        })
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub template_sha256: String,
    pub reloaded_sha256: String,
    pub hit_counts: BTreeMap<String, usize>,
    pub changed_block_ids: Vec<String>,
    pub remaining_placeholders: BTreeMap<String, Vec<String>>,
    pub applied: Vec<String>,
    pub unchanged: usize,
    pub skipped: Vec<StalePositionSkip>,
}

impl GenerationReport {
    pub fn template_drifted(&self) -> bool {
        self.template_sha256 != self.reloaded_sha256
    }
}

#[derive(Clone, Debug)]
pub struct GeneratedDocument {
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
    pub report: GenerationReport,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundtripReport {
    pub blocks: usize,
    pub rewritten: usize,
    /// Ids whose text differs after rewrite and re-extraction.
    pub mismatched: Vec<String>,
    #[serde(skip)]
    pub package: Vec<u8>,
}

impl RoundtripReport {
    pub fn is_identical(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// Load, extract, substitute, then regenerate from a fresh reload.
pub struct DocumentEngine<L> {
    loader: L,
    delimiter: String,
}

impl<L: TemplateLoader> DocumentEngine<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(loader: L, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(DocError::InvalidDelimiter);
        }
        Ok(Self {
            loader,
            delimiter: delimiter.to_string(),
        })
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn load_template(&self, kind: DocumentKind) -> Result<Vec<u8>> {
        self.loader.load(kind)
    }

    pub fn extract(&self, kind: DocumentKind) -> Result<BlockModel> {
        extract_blocks(&self.loader.load(kind)?)
    }

    pub fn substitute(
        &self,
        model: &BlockModel,
        map: &ReplacementMap,
    ) -> Result<SubstitutionOutcome> {
        Ok(Substitutor::with_delimiter(map, &self.delimiter)?.apply(&model.all))
    }

    pub fn generate(&self, kind: DocumentKind, map: &ReplacementMap) -> Result<GeneratedDocument> {
        let template = self.loader.load(kind)?;
        let template_sha256 = sha256_hex(&template);
        let model = extract_blocks(&template)?;
        let outcome = self.substitute(&model, map)?;

        // Regeneration always starts from a fresh copy.
        let fresh = self.loader.load(kind)?;
        let reloaded_sha256 = sha256_hex(&fresh);
        if reloaded_sha256 != template_sha256 {
            warn!(
                %kind,
                extracted = %template_sha256,
                reloaded = %reloaded_sha256,
                "template changed between extraction and regeneration"
            );
        }

        let changed_ids: HashSet<&str> =
            outcome.changed_block_ids.iter().map(String::as_str).collect();
        let changed: Vec<_> = outcome
            .blocks
            .iter()
            .filter(|b| changed_ids.contains(b.id.as_str()))
            .cloned()
            .collect();
        let regen = regenerate_with(&fresh, &changed, RegenerateOptions::default())?;
        info!(
            %kind,
            changed = changed.len(),
            applied = regen.applied.len(),
            skipped = regen.skipped.len(),
            unresolved_blocks = outcome.remaining_placeholders.len(),
            "document generated"
        );

        Ok(GeneratedDocument {
            kind,
            bytes: regen.package,
            report: GenerationReport {
                template_sha256,
                reloaded_sha256,
                hit_counts: outcome.hit_counts,
                changed_block_ids: outcome.changed_block_ids,
                remaining_placeholders: outcome.remaining_placeholders,
                applied: regen.applied,
                unchanged: regen.unchanged,
                skipped: regen.skipped,
            },
        })
    }

    /// HTML of the document `generate` would produce.
    pub fn preview(
        &self,
        kind: DocumentKind,
        map: &ReplacementMap,
        renderer: &dyn HtmlRenderer,
    ) -> Result<String> {
        let doc = self.generate(kind, map)?;
        renderer.render(&doc.bytes)
    }

    pub fn preview_template(&self, kind: DocumentKind, renderer: &dyn HtmlRenderer) -> Result<String> {
        renderer.render(&self.loader.load(kind)?)
    }

    pub fn roundtrip(&self, kind: DocumentKind) -> Result<RoundtripReport> {
        verify_roundtrip(&self.loader.load(kind)?)
    }
}

/// Rewrites every block with its own text and checks that re-extraction
/// returns the same text at every id.
pub fn verify_roundtrip(template: &[u8]) -> Result<RoundtripReport> {
    let model = extract_blocks(template)?;
    let regen = regenerate_with(
        template,
        &model.all,
        RegenerateOptions {
            force_rewrite: true,
        },
    )?;
    let again = extract_blocks(&regen.package)?;

    let mut mismatched: Vec<String> = model
        .all
        .iter()
        .filter(|b| again.find(&b.id).map(|a| a.text.as_str()) != Some(b.text.as_str()))
        .map(|b| b.id.clone())
        .collect();
    mismatched.extend(
        again
            .all
            .iter()
            .filter(|a| model.find(&a.id).is_none())
            .map(|a| a.id.clone()),
    );
    debug!(
        blocks = model.all.len(),
        mismatched = mismatched.len(),
        "roundtrip verified"
    );

    Ok(RoundtripReport {
        blocks: model.all.len(),
        rewritten: regen.applied.len(),
        mismatched,
        package: regen.package,
    })
}
