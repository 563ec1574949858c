//! LoRA tag extraction
//!
//! Fully expanded prompt text may embed `<lora:name:weights...>` directives.
//! This module pulls those out into structured records, strips the tags from
//! the text, and splits the remainder on the literal `BREAK` token into the
//! independent segments the conditioning encoder consumes. The host side of
//! lora application (loading model weights, encoding text) is abstracted
//! behind the [`LoraHost`] trait.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::catalog::WildcardCatalog;
use crate::error::Result;
use crate::expand::{is_numeric_string, process};

/// `<lora:...>` span; no `>` inside, tags never nest.
static LORA_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<lora:([^>]+)>").expect("valid lora tag regex"));

/// Preset-name prefix inside an `LBW=` segment (`LBW=preset:...`), dropped
/// before the spec is parsed.
static LBW_PRESET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"LBW=[A-Za-z][A-Za-z0-9_-]*:").expect("valid lbw preset regex"));

/// One extracted `<lora:...>` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraRecord {
    pub name: String,
    /// First numeric segment; defaults to 1.0.
    pub model_weight: f64,
    /// Second numeric segment; defaults to the model weight.
    pub clip_weight: f64,
    /// Block-weight spec from an `LBW=` segment.
    pub block_weights: Option<String>,
    /// `A=` sub-parameter of the block-weight spec.
    pub lbw_a: Option<f64>,
    /// `B=` sub-parameter of the block-weight spec.
    pub lbw_b: Option<f64>,
    /// `LOADER=` tag selecting a non-default host loader.
    pub loader: Option<String>,
}

/// Extract every `<lora:...>` directive from expanded text, in input order,
/// deduplicated by name (first occurrence wins).
///
/// Segments after the name are classified by shape: purely numeric segments
/// fill model weight then clip weight; `LBW=` parses the block-weight spec
/// with optional `;`-separated `A=`/`B=` sub-floats; `LOADER=` records a
/// loader tag. Unrecognized segments are ignored.
pub fn extract_lora_tags(text: &str) -> Vec<LoraRecord> {
    let mut seen = std::collections::HashSet::new();
    let mut records = Vec::new();

    for caps in LORA_TAG.captures_iter(text) {
        let body = caps[1].trim_matches(':').to_string();
        let body = LBW_PRESET.replace_all(&body, "LBW=").into_owned();

        let mut parts = body.split(':');
        let Some(name) = parts.next() else {
            continue;
        };
        let name = name.to_string();

        let mut model_weight = None;
        let mut clip_weight = None;
        let mut block_weights = None;
        let mut lbw_a = None;
        let mut lbw_b = None;
        let mut loader = None;

        for part in parts {
            if is_numeric_string(part) {
                if model_weight.is_none() {
                    model_weight = part.parse().ok();
                } else if clip_weight.is_none() {
                    clip_weight = part.parse().ok();
                }
            } else if let Some(spec) = part.strip_prefix("LBW=") {
                for item in spec.split(';') {
                    if let Some(a) = item.strip_prefix("A=") {
                        lbw_a = Some(safe_float(a.trim()));
                    } else if let Some(b) = item.strip_prefix("B=") {
                        lbw_b = Some(safe_float(b.trim()));
                    } else if !item.trim().is_empty() {
                        block_weights = Some(item.to_string());
                    }
                }
            } else if let Some(tag) = part.strip_prefix("LOADER=") {
                loader = Some(tag.to_string());
            }
        }

        let model_weight = model_weight.unwrap_or(1.0);
        if !name.is_empty() && seen.insert(name.clone()) {
            records.push(LoraRecord {
                name,
                model_weight,
                clip_weight: clip_weight.unwrap_or(model_weight),
                block_weights,
                lbw_a,
                lbw_b,
                loader,
            });
        }
    }

    records
}

/// Remove every `<lora:...>` tag from the text.
pub fn strip_lora_tags(text: &str) -> String {
    LORA_TAG.replace_all(text, "").into_owned()
}

/// Split stripped text on the literal token `BREAK` into trimmed segments,
/// dropping empty ones. All-empty input yields a single empty segment so
/// the encoder always has something to encode.
pub fn split_break_segments(text: &str) -> Vec<String> {
    let segments: Vec<String> = text
        .split("BREAK")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        vec![String::new()]
    } else {
        segments
    }
}

/// Numeric parse with a 1.0 fallback for non-numeric input.
fn safe_float(s: &str) -> f64 {
    if is_numeric_string(s) {
        s.parse().unwrap_or(1.0)
    } else {
        1.0
    }
}

/// The three intermediate text snapshots of a lora-aware expansion, kept
/// for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionPasses {
    /// Expanded template, tags still embedded.
    pub expanded: String,
    /// Expanded text with lora tags stripped.
    pub stripped: String,
    /// Stripped text split on `BREAK`.
    pub segments: Vec<String>,
}

/// Host-side operations for applying extracted loras. The model, clip, and
/// conditioning types belong to the host runtime; the engine only threads
/// them through.
pub trait LoraHost {
    type Model;
    type Clip;
    type Conditioning;

    /// Apply one lora to the model/clip pair.
    fn load_lora(
        &self,
        model: Self::Model,
        clip: Self::Clip,
        record: &LoraRecord,
    ) -> Result<(Self::Model, Self::Clip)>;

    /// Encode one prompt segment.
    fn encode(&self, clip: &Self::Clip, text: &str) -> Result<Self::Conditioning>;

    /// Concatenate two encoded segments.
    fn concat(
        &self,
        left: Self::Conditioning,
        right: Self::Conditioning,
    ) -> Result<Self::Conditioning>;
}

/// Expand a template, apply every embedded lora through the host, and
/// encode the remaining text segment by segment.
///
/// Returns the updated model/clip handles, the concatenated conditioning,
/// and the intermediate snapshots.
pub fn process_with_loras<H: LoraHost>(
    catalog: &WildcardCatalog,
    host: &H,
    text: &str,
    seed: Option<u64>,
    model: H::Model,
    clip: H::Clip,
) -> Result<(H::Model, H::Clip, H::Conditioning, ExpansionPasses)> {
    let expanded = process(catalog, text, seed);
    let records = extract_lora_tags(&expanded);
    let stripped = strip_lora_tags(&expanded);
    let segments = split_break_segments(&stripped);

    let mut model = model;
    let mut clip = clip;
    for record in &records {
        info!(
            lora = %record.name,
            model_weight = record.model_weight,
            clip_weight = record.clip_weight,
            "applying lora"
        );
        (model, clip) = host.load_lora(model, clip, record)?;
    }

    let mut conditioning: Option<H::Conditioning> = None;
    for segment in &segments {
        let encoded = host.encode(&clip, segment)?;
        conditioning = Some(match conditioning {
            Some(previous) => host.concat(previous, encoded)?,
            None => encoded,
        });
    }
    let conditioning = conditioning.expect("segments is never empty");

    let passes = ExpansionPasses {
        expanded,
        stripped,
        segments,
    };
    Ok((model, clip, conditioning, passes))
}
