//! Template expansion
//!
//! The expander turns a user-authored template into a concrete prompt
//! string: `{option|option}` choice groups with weights and multi-select,
//! `__key__` wildcard references resolved against a catalog, and `N#__key__`
//! quantifiers. Substituted text may itself contain further expandable
//! syntax, so expansion iterates to a fixed point under a hard iteration
//! ceiling — a cyclic definition stops silently at the ceiling instead of
//! looping forever.

pub mod eval;
pub mod parser;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;

use crate::catalog::WildcardCatalog;

/// Hard ceiling on re-expansion rounds for one call.
pub const MAX_EXPANSION_ITERATIONS: usize = 100;

/// `N#__key__` quantifier form.
static QUANTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)#__([\w.\-+/*\\]+?)__").expect("valid quantifier regex"));

/// Numeric literal check shared by weight prefixes and LoRA fields
/// (optionally signed integer or decimal).
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(\d*\.?\d+|\d+\.?\d*)$").expect("valid numeric regex"));

pub(crate) fn is_numeric_string(s: &str) -> bool {
    NUMERIC.is_match(s)
}

/// Expand templates against one catalog.
pub struct Expander<'a> {
    catalog: &'a WildcardCatalog,
}

impl<'a> Expander<'a> {
    pub fn new(catalog: &'a WildcardCatalog) -> Self {
        Self { catalog }
    }

    /// Expand a template. The same seed against the same catalog state
    /// always produces the same output; `None` seeds from entropy.
    pub fn expand(&self, text: &str, seed: Option<u64>) -> String {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.expand_with_rng(text, &mut rng)
    }

    /// Expand with a caller-owned RNG (used when several templates must
    /// draw from one reproducible stream).
    ///
    /// Each round runs the quantifier rewrite, resolves choice groups to
    /// exhaustion (expanded option lists can themselves introduce new
    /// groups), then resolves wildcard references once. The round loop
    /// continues only while the wildcard pass substituted something —
    /// substituted text is the only way new expandable syntax can appear.
    pub fn expand_with_rng(&self, text: &str, rng: &mut StdRng) -> String {
        let mut text = fold_comment_lines(text);

        for _ in 0..MAX_EXPANSION_ITERATIONS {
            text = rewrite_quantifiers(&text);

            // Bounded as well: an expanded option list can re-introduce its
            // own group and would otherwise spin here forever.
            for _ in 0..MAX_EXPANSION_ITERATIONS {
                let nodes = parser::parse_template(&text);
                let mut choices = eval::Evaluator::new(self.catalog, rng, eval::Phase::Choices);
                text = choices.eval(&nodes);
                if !choices.changed() {
                    break;
                }
            }

            let nodes = parser::parse_template(&text);
            let mut wildcards = eval::Evaluator::new(self.catalog, rng, eval::Phase::Wildcards);
            text = wildcards.eval(&nodes);

            if !wildcards.changed() {
                break;
            }
        }
        text
    }
}

/// Expand `text` against `catalog`. Convenience wrapper over [`Expander`];
/// this is the host-facing entrypoint.
pub fn process(catalog: &WildcardCatalog, text: &str, seed: Option<u64>) -> String {
    Expander::new(catalog).expand(text, seed)
}

/// Fold comment lines: a line whose first non-whitespace character is `#`
/// is dropped and the following visible line is appended to the previous
/// visible line, preserving adjacency for inline template authors.
pub fn fold_comment_lines(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending_merge = false;

    for line in text.split('\n') {
        if line.trim_start().starts_with('#') {
            pending_merge = true;
            continue;
        }

        if out.is_empty() {
            out.push(line.to_string());
        } else if pending_merge {
            let last = out.last_mut().expect("out is non-empty");
            last.push(' ');
            last.push_str(line);
            pending_merge = false;
        } else {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}

/// Rewrite every `N#__key__` quantifier into an N-fold alternation of the
/// wildcard reference, so the choice-group pass treats it as `N`
/// independent draws.
fn rewrite_quantifiers(text: &str) -> String {
    QUANTIFIER
        .replace_all(text, |caps: &regex::Captures| {
            let count: usize = caps[1].parse().unwrap_or(1);
            let key = &caps[2];
            let copies = vec![key.to_string(); count];
            format!("__{}__", copies.join("__|__"))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::CatalogBuilder;
    use crate::config::WildcardConfig;
    use std::path::Path;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn build_catalog(root: &Path) -> WildcardCatalog {
        CatalogBuilder::new(WildcardConfig {
            wildcard_dir: root.to_path_buf(),
            custom_wildcard_dir: None,
            cache_limit_mb: 50,
        })
        .build()
    }

    #[test]
    fn test_round_trip_without_tokens() {
        let catalog = WildcardCatalog::empty();
        let text = "a photo of a cat, high quality";
        assert_eq!(process(&catalog, text, Some(1)), text);
    }

    #[test]
    fn test_fold_comment_lines() {
        assert_eq!(
            fold_comment_lines("first\n# note\nsecond\nthird"),
            "first second\nthird"
        );
    }

    #[test]
    fn test_fold_comment_only_lines_are_dropped() {
        assert_eq!(fold_comment_lines("# a\n# b\nvisible"), "visible");
    }

    #[test]
    fn test_rewrite_quantifiers() {
        assert_eq!(
            rewrite_quantifiers("{2$$3#__fruit__}"),
            "{2$$__fruit__|__fruit__|__fruit__}"
        );
        assert_eq!(rewrite_quantifiers("no quantifier"), "no quantifier");
    }

    #[test]
    fn test_seeded_expansion_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "fruit.txt", "apple\nbanana\n#comment\ncherry\n");
        let catalog = build_catalog(temp.path());

        let first = process(&catalog, "__fruit__", Some(1));
        assert!(["apple", "banana", "cherry"].contains(&first.as_str()));
        for _ in 0..10 {
            assert_eq!(process(&catalog, "__fruit__", Some(1)), first);
        }
    }

    #[test]
    fn test_different_seeds_cover_all_candidates() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "fruit.txt", "apple\nbanana\ncherry\n");
        let catalog = build_catalog(temp.path());

        let mut seen = std::collections::HashSet::new();
        for seed in 0..100 {
            seen.insert(process(&catalog, "__fruit__", Some(seed)));
        }
        assert_eq!(seen.len(), 3, "{:?}", seen);
    }

    #[test]
    fn test_transitive_expansion_through_flat_files() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "outer.txt", "a {red|red} __inner__\n");
        write(temp.path(), "inner.txt", "core\n");
        let catalog = build_catalog(temp.path());

        assert_eq!(process(&catalog, "__outer__", Some(3)), "a red core");
    }

    #[test]
    fn test_transitive_structured_keys() {
        let temp = tempfile::tempdir().unwrap();
        write(
            temp.path(),
            "colors.yaml",
            "warm: [red, orange]\ncold: [blue, green]\n",
        );
        let catalog = build_catalog(temp.path());

        for seed in 0..20 {
            let warm = process(&catalog, "__colors/warm__", Some(seed));
            assert!(["red", "orange"].contains(&warm.as_str()), "{}", warm);

            let cold = process(&catalog, "__colors/cold__", Some(seed));
            assert!(["blue", "green"].contains(&cold.as_str()), "{}", cold);

            let any = process(&catalog, "__colors__", Some(seed));
            assert!(
                ["red", "orange", "blue", "green"].contains(&any.as_str()),
                "{}",
                any
            );
        }
    }

    #[test]
    fn test_cyclic_definition_terminates() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.txt", "__b__\n");
        write(temp.path(), "b.txt", "__a__\n");
        let catalog = build_catalog(temp.path());

        // Must stop at the iteration ceiling, leaving one of the tokens.
        let out = process(&catalog, "__a__", Some(1));
        assert!(["__a__", "__b__"].contains(&out.as_str()), "{}", out);
    }

    #[test]
    fn test_unresolved_token_left_verbatim() {
        let catalog = WildcardCatalog::empty();
        assert_eq!(
            process(&catalog, "keep __missing__ here", Some(1)),
            "keep __missing__ here"
        );
    }

    #[test]
    fn test_unresolved_group_left_verbatim() {
        let catalog = WildcardCatalog::empty();
        assert_eq!(process(&catalog, "open {brace", Some(1)), "open {brace");
    }

    #[test]
    fn test_escaped_braces_survive_expansion() {
        let catalog = WildcardCatalog::empty();
        assert_eq!(
            process(&catalog, r"keep \{this\} {a|a}", Some(1)),
            r"keep \{this\} a"
        );
    }

    #[test]
    fn test_quantified_draws_inside_multi_select() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "fruit.txt", "apple\nbanana\ncherry\n");
        let catalog = build_catalog(temp.path());

        for seed in 0..20 {
            let out = process(&catalog, "{2$$3#__fruit__}", Some(seed));
            let parts: Vec<&str> = out.split(' ').collect();
            assert_eq!(parts.len(), 2, "{}", out);
            for p in parts {
                assert!(["apple", "banana", "cherry"].contains(&p), "{}", out);
            }
        }
    }

    #[test]
    fn test_wildcard_expanding_into_choice_group() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "style.txt", "{bold|bold} look\n");
        let catalog = build_catalog(temp.path());

        assert_eq!(process(&catalog, "__style__", Some(5)), "bold look");
    }

    #[test]
    fn test_comment_fold_applies_before_expansion() {
        let catalog = WildcardCatalog::empty();
        let out = process(&catalog, "{a|a}\n# hidden\ntail", Some(1));
        assert_eq!(out, "a tail");
    }
}
