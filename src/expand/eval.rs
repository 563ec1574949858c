//! Template evaluation
//!
//! Walks a parsed node tree and resolves one kind of construct per pass,
//! mirroring the rewrite order of the template language: choice groups
//! first (innermost first, with wildcard references inside options kept
//! verbatim so multi-select specs can capture them), then wildcard
//! references over the resulting text. Both passes consume a seeded RNG so
//! the whole expansion is reproducible.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use crate::catalog::{normalize_key, WildcardCatalog};

use super::is_numeric_string;
use super::parser::{render_raw, Node};

/// `W::` weight prefix on a choice option or wildcard candidate.
static WEIGHT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[0-9.]+::").expect("valid weight prefix regex"));

/// `__key__` references inside multi-select content.
static WILDCARD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([\w.\-+/*\\]+?)__").expect("valid wildcard token regex"));

/// `N` or `N-M` count range at the start of a multi-select spec.
static COUNT_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+))?").expect("valid count range regex"));

/// `-M` open-ended count range (means `1-M`).
static COUNT_RANGE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-(\d+)").expect("valid open count range regex"));

/// Which construct a pass resolves; the other kind is re-emitted as its
/// source text, untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Resolve `{...}` choice groups, leave `__key__` references verbatim.
    Choices,
    /// Resolve `__key__` references, leave `{...}` groups verbatim.
    Wildcards,
}

/// Evaluates a node tree against a catalog with a per-call RNG.
pub struct Evaluator<'a> {
    catalog: &'a WildcardCatalog,
    rng: &'a mut StdRng,
    phase: Phase,
    changed: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a WildcardCatalog, rng: &'a mut StdRng, phase: Phase) -> Self {
        Self {
            catalog,
            rng,
            phase,
            changed: false,
        }
    }

    /// Whether any substitution happened during evaluation. Constructs
    /// re-emitted verbatim (out-of-phase or unresolvable) do not count.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Render a node sequence to text, resolving this pass's constructs.
    pub fn eval(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            match (node, self.phase) {
                (Node::Literal(text), _) => out.push_str(text),
                (Node::Choice(options), Phase::Choices) => {
                    out.push_str(&self.eval_choice(options));
                }
                (Node::Wildcard(raw), Phase::Wildcards) => {
                    out.push_str(&self.eval_wildcard(raw));
                }
                (other, _) => out.push_str(&render_raw(std::slice::from_ref(other))),
            }
        }
        out
    }

    /// Resolve one `{...}` group: render every option (nested groups
    /// resolve here, wildcard references stay verbatim), parse an optional
    /// multi-select spec off the first option, extract weights, pick, and
    /// join.
    fn eval_choice(&mut self, options: &[Vec<Node>]) -> String {
        let mut rendered: Vec<String> = options.iter().map(|o| self.eval(o)).collect();

        let mut select_range: Option<(usize, usize)> = None;
        let mut separator = " ".to_string();

        let first = rendered[0].clone();
        let segments: Vec<&str> = first.split("$$").collect();
        if segments.len() > 1 {
            select_range = Some(parse_count_range(segments[0]));
            let content = match segments.len() {
                2 => Some(segments[1].to_string()),
                3 => {
                    separator = segments[1].to_string();
                    Some(segments[2].to_string())
                }
                // More than two `$$` markers is not a recognized spec;
                // leave the options untouched.
                _ => None,
            };
            if let Some(content) = content {
                self.reinterpret_content(&mut rendered, &content);
            }
        }

        let weights: Vec<f64> = rendered.iter().map(|o| option_weight(o)).collect();
        let total: f64 = weights.iter().sum();

        let count = match select_range {
            None => 1,
            Some((min_r, max_r)) => {
                let len = rendered.len();
                let upper = if max_r > 0 {
                    (max_r + 1).min(len + 1)
                } else {
                    len + 1
                };
                if upper == min_r {
                    upper
                } else {
                    let lo = min_r.min(upper);
                    let hi = min_r.max(upper);
                    self.rng.gen_range(lo..hi)
                }
            }
        };

        // Overflowing counts and weight totals at or below 1 fall back to
        // using every option in shuffled order.
        let selected: Vec<String> = if count > rendered.len() || total <= 1.0 {
            let mut all = rendered;
            all.shuffle(self.rng);
            all
        } else {
            weighted_sample(self.rng, rendered, &weights, count)
        };

        self.changed = true;
        selected
            .iter()
            .map(|s| strip_weight_prefix(s))
            .collect::<Vec<_>>()
            .join(&separator)
    }

    /// Replace the option list according to the content after a
    /// multi-select spec: a single option that carries wildcard references
    /// expands into the referenced candidate lists; anything else replaces
    /// the first option as a literal alternative.
    fn reinterpret_content(&mut self, rendered: &mut Vec<String>, content: &str) {
        let tokens: Vec<String> = WILDCARD_TOKEN
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();

        if rendered.len() == 1 && !tokens.is_empty() {
            *rendered = self.collect_wildcard_options(&tokens);
        } else {
            rendered[0] = content.to_string();
        }
    }

    /// Gather the concatenated candidate lists for a set of wildcard keys
    /// (direct hits plus glob patterns), for use as a choice-group option
    /// list.
    fn collect_wildcard_options(&mut self, tokens: &[String]) -> Vec<String> {
        let mut options = Vec::new();
        for token in tokens {
            let key = normalize_key(token);
            if let Some(values) = self.catalog.get(&key) {
                options.extend(values.iter().cloned());
            } else if key.contains('*') {
                options.extend(self.catalog.glob(&key));
            }
        }
        options
    }

    /// Resolve one `__key__` reference. Direct catalog hits use a weighted
    /// single draw over the candidate list; glob patterns and the bare-key
    /// leaf fallback use a uniform draw over all matched candidates. An
    /// unresolvable reference is re-emitted verbatim.
    fn eval_wildcard(&mut self, raw: &str) -> String {
        let key = normalize_key(raw);

        if let Some(options) = self.catalog.get(&key) {
            let choice = weighted_single_choice(self.rng, &options);
            self.changed = true;
            return strip_weight_prefix(&choice);
        }

        if key.contains('*') {
            let values = self.catalog.glob(&key);
            if !values.is_empty() {
                self.changed = true;
                return values[self.rng.gen_range(0..values.len())].clone();
            }
        } else if !key.contains('/') {
            // A bare name retries as `*/name`: the same leaf at any depth.
            let values = self.catalog.glob(&format!("*/{}", key));
            if !values.is_empty() {
                self.changed = true;
                return values[self.rng.gen_range(0..values.len())].clone();
            }
        }

        format!("__{}__", raw)
    }
}

/// Parse a multi-select count spec: `N`, `N-M`, or `-M` (meaning `1-M`).
/// Anything unparseable counts as 1.
fn parse_count_range(spec: &str) -> (usize, usize) {
    if let Some(caps) = COUNT_RANGE.captures(spec) {
        let a: usize = caps[1].parse().unwrap_or(1);
        let b = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(a))
            .unwrap_or(a);
        return (a, b);
    }
    if let Some(caps) = COUNT_RANGE_OPEN.captures(spec) {
        let b: usize = caps[1].parse().unwrap_or(1);
        return (1, b);
    }
    (1, 1)
}

/// Weight of one option: a numeric `W::` prefix, defaulting to 1.
fn option_weight(option: &str) -> f64 {
    match option.split_once("::") {
        Some((prefix, _)) if is_numeric_string(prefix.trim()) => {
            prefix.trim().parse().unwrap_or(1.0)
        }
        _ => 1.0,
    }
}

/// Strip a leading `W::` weight prefix from a chosen option.
fn strip_weight_prefix(option: &str) -> String {
    WEIGHT_PREFIX.replace(option, "").into_owned()
}

/// One weighted draw over a candidate list using the `W::` convention.
fn weighted_single_choice(rng: &mut StdRng, options: &[String]) -> String {
    let weights: Vec<f64> = options.iter().map(|o| option_weight(o)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return options[rng.gen_range(0..options.len())].clone();
    }

    let mut target = rng.gen::<f64>() * total;
    for (option, weight) in options.iter().zip(&weights) {
        if target < *weight {
            return option.clone();
        }
        target -= weight;
    }
    options[options.len() - 1].clone()
}

/// Weighted sample of `count` options without replacement.
fn weighted_sample(
    rng: &mut StdRng,
    options: Vec<String>,
    weights: &[f64],
    count: usize,
) -> Vec<String> {
    let mut pool: Vec<(String, f64)> = options.into_iter().zip(weights.iter().copied()).collect();
    let mut out = Vec::with_capacity(count);

    for _ in 0..count {
        let total: f64 = pool.iter().map(|(_, w)| w).sum();
        if pool.is_empty() || total <= 0.0 {
            break;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut index = pool.len() - 1;
        for (i, (_, weight)) in pool.iter().enumerate() {
            if target < *weight {
                index = i;
                break;
            }
            target -= weight;
        }
        out.push(pool.remove(index).0);
    }
    out
}
