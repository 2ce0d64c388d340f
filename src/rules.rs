//! Rule compiler and admissibility test
//!
//! The declarative rule inputs from the settings file are compiled per
//! category into a canonical exclusion index:
//!
//! - exact skip rules: a combination equal to the rule's parts is rejected;
//! - subset skip rules: a combination containing the rule's parts is
//!   rejected;
//! - the equivalents and supersets they were derived from, plus the
//!   pairwise conflicts, kept for reporting.
//!
//! Every skip rule may be restricted to a set of base models; an empty
//! restriction applies to all models.
//!
//! # Examples
//!
//! ```
//! use dbd_workbench::category::ModelCategory;
//! use dbd_workbench::results::Diagnostics;
//! use dbd_workbench::rules::CompiledRules;
//! use dbd_workbench::settings::RuleInputs;
//! use std::collections::BTreeSet;
//!
//! let inputs: RuleInputs = serde_yaml::from_str(
//!     "attachmentConflicts:\n  SurvivorTorso:\n    KatePurpleHat: [KateBackpack]\n",
//! ).unwrap();
//! let rules = CompiledRules::compile(&inputs, None, &mut Diagnostics::new());
//!
//! let both: BTreeSet<String> = ["KateBackpack", "KatePurpleHat"].map(String::from).into();
//! assert!(!rules.is_admissible(ModelCategory::SurvivorTorso, "KateCosmetic001", &both));
//! ```

use crate::attachments::AttachmentStore;
use crate::category::ModelCategory;
use crate::results::Diagnostics;
use crate::settings::RuleInputs;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

/// Marker turning a skip combination into an exact-match rule
const EXACT_MARKER: &str = "==";

/// A set of attachment ids, optionally restricted to some base models
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkipRule {
    pub parts: BTreeSet<String>,
    pub base_models: BTreeSet<String>,
}

impl SkipRule {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            base_models: BTreeSet::new(),
        }
    }

    /// Whether the rule applies to base model `model`
    pub fn applies_to(&self, model: &str) -> bool {
        self.base_models.is_empty() || self.base_models.contains(model)
    }

    /// The rule with `from` replaced by `to`
    fn rewritten(&self, from: &str, to: &str) -> Self {
        let mut parts = self.parts.clone();
        parts.remove(from);
        parts.insert(to.to_string());
        Self {
            parts,
            base_models: self.base_models.clone(),
        }
    }
}

/// Compiled rules of one category
#[derive(Debug, Clone, Default)]
pub struct CategoryRules {
    pub combos_to_skip_exact: BTreeSet<SkipRule>,
    pub combos_to_skip_subset: BTreeSet<SkipRule>,
    /// part set -> aggregate id
    pub equivalents: BTreeMap<BTreeSet<String>, String>,
    /// outer id -> inner sets
    pub supersets: BTreeMap<String, Vec<BTreeSet<String>>>,
    /// unordered pairs, smaller id first
    pub pair_conflicts: BTreeSet<(String, String)>,
}

impl CategoryRules {
    /// First rule rejecting `combo` on `model`, if any
    pub fn rejection(&self, model: &str, combo: &BTreeSet<String>) -> Option<&SkipRule> {
        self.combos_to_skip_exact
            .iter()
            .find(|rule| rule.applies_to(model) && &rule.parts == combo)
            .or_else(|| {
                self.combos_to_skip_subset
                    .iter()
                    .find(|rule| rule.applies_to(model) && rule.parts.is_subset(combo))
            })
    }

    pub fn is_admissible(&self, model: &str, combo: &BTreeSet<String>) -> bool {
        self.rejection(model, combo).is_none()
    }

    /// One-line description of the index sizes
    pub fn summary(&self) -> String {
        format!(
            "{} exact, {} subset, {} equivalents, {} supersets, {} pair conflicts",
            self.combos_to_skip_exact.len(),
            self.combos_to_skip_subset.len(),
            self.equivalents.len(),
            self.supersets.len(),
            self.pair_conflicts.len()
        )
    }

    fn add_pair(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        self.pair_conflicts
            .insert((first.to_string(), second.to_string()));
        self.combos_to_skip_subset.insert(SkipRule::new([a, b]));
    }

    /// Rewrite every subset rule that mentions `from` so it mentions `to`
    ///
    /// Rules already containing `to`, or containing every id of `keep_whole`,
    /// are left alone.
    fn close_over(&mut self, from: &str, to: &str, keep_whole: &BTreeSet<String>) {
        let derived: Vec<SkipRule> = self
            .combos_to_skip_subset
            .iter()
            .filter(|rule| rule.parts.contains(from))
            .filter(|rule| !rule.parts.contains(to))
            .filter(|rule| !keep_whole.is_subset(&rule.parts))
            .map(|rule| rule.rewritten(from, to))
            .collect();
        self.combos_to_skip_subset.extend(derived);
    }
}

/// Compiled rules of every category
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    categories: BTreeMap<ModelCategory, CategoryRules>,
}

/// Parse one `combosToSkip` combination
///
/// Tokens look like `id`, `id==`, `id:ModelA,ModelB` or `id==:ModelA`. The
/// exact marker anywhere in the combination makes the whole rule exact.
pub fn parse_skip_combo(tokens: &[String]) -> (SkipRule, bool) {
    let exact = tokens.iter().any(|t| t.contains(EXACT_MARKER));
    let mut rule = SkipRule::new(Vec::<String>::new());

    for token in tokens {
        let cleaned = token.replace(EXACT_MARKER, "");
        let (id, models) = match cleaned.split_once(':') {
            Some((id, models)) => (id, Some(models)),
            None => (cleaned.as_str(), None),
        };
        let id = id.trim();
        if !id.is_empty() {
            rule.parts.insert(id.to_string());
        }
        if let Some(models) = models {
            rule.base_models.extend(
                models
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string),
            );
        }
    }
    (rule, exact)
}

fn category_rules<'a>(
    categories: &'a mut BTreeMap<ModelCategory, CategoryRules>,
    key: &str,
    section: &str,
    diagnostics: &mut Diagnostics,
) -> Option<&'a mut CategoryRules> {
    match key.parse::<ModelCategory>() {
        Ok(category) => Some(categories.entry(category).or_default()),
        Err(_) => {
            diagnostics.warn(format!("{}: ignoring rules for unknown category '{}'", section, key));
            None
        }
    }
}

impl CompiledRules {
    /// Compile the declarative rule inputs
    ///
    /// When `store` is given, ids the rules mention that no loaded attachment
    /// defines are reported as warnings.
    pub fn compile(inputs: &RuleInputs, store: Option<&AttachmentStore>, diagnostics: &mut Diagnostics) -> Self {
        let mut categories: BTreeMap<ModelCategory, CategoryRules> = BTreeMap::new();

        // combinations to skip
        for (key, combos) in &inputs.combos_to_skip {
            let Some(rules) = category_rules(&mut categories, key, "combosToSkip", diagnostics) else {
                continue;
            };
            for tokens in combos {
                let (rule, exact) = parse_skip_combo(tokens);
                if rule.parts.is_empty() {
                    diagnostics.warn(format!("combosToSkip.{}: ignoring empty combination {:?}", key, tokens));
                    continue;
                }
                if exact {
                    rules.combos_to_skip_exact.insert(rule);
                } else {
                    rules.combos_to_skip_subset.insert(rule);
                }
            }
        }

        for (key, groups) in &inputs.mutually_exclusive {
            let Some(rules) = category_rules(&mut categories, key, "mutuallyExclusive", diagnostics) else {
                continue;
            };
            for group in groups {
                for (a, b) in group.iter().unique().tuple_combinations() {
                    rules.add_pair(a, b);
                }
            }
        }

        for (key, conflicts) in &inputs.attachment_conflicts {
            let Some(rules) = category_rules(&mut categories, key, "attachmentConflicts", diagnostics) else {
                continue;
            };
            for (id, others) in conflicts {
                for other in others {
                    rules.add_pair(id, other);
                }
            }
        }

        for (key, aggregates) in &inputs.equivalent_parts {
            let Some(rules) = category_rules(&mut categories, key, "equivalentParts", diagnostics) else {
                continue;
            };
            for (aggregate, part_sets) in aggregates {
                for parts in &part_sets.0 {
                    let parts: BTreeSet<String> = parts.iter().cloned().collect();
                    if parts.is_empty() {
                        continue;
                    }
                    for part in &parts {
                        rules.close_over(part, aggregate, &parts);
                    }
                    for part in parts.iter().filter(|p| *p != aggregate) {
                        rules.combos_to_skip_subset
                            .insert(SkipRule::new([aggregate.as_str(), part.as_str()]));
                    }
                    // A single-part set would reject the part on its own
                    if parts.len() > 1 {
                        rules.combos_to_skip_subset.insert(SkipRule {
                            parts: parts.clone(),
                            base_models: BTreeSet::new(),
                        });
                    }
                    rules.equivalents.insert(parts, aggregate.clone());
                }
            }
        }

        for (key, outers) in &inputs.superset_parts {
            let Some(rules) = category_rules(&mut categories, key, "supersetParts", diagnostics) else {
                continue;
            };
            for (outer, inner_sets) in outers {
                for inner_set in &inner_sets.0 {
                    let inner: BTreeSet<String> = inner_set.iter().cloned().collect();
                    for id in &inner {
                        rules.close_over(id, outer, &BTreeSet::from([outer.clone()]));
                    }
                    for id in inner.iter().filter(|id| *id != outer) {
                        rules.combos_to_skip_subset
                            .insert(SkipRule::new([outer.as_str(), id.as_str()]));
                    }
                    rules.supersets.entry(outer.clone()).or_default().push(inner);
                }
            }
        }

        if let Some(store) = store {
            report_undefined_ids(inputs, store, diagnostics);
        }

        for (category, rules) in &categories {
            tracing::debug!("Compiled {} rules: {}", category, rules.summary());
        }
        Self { categories }
    }

    pub fn for_category(&self, category: ModelCategory) -> Option<&CategoryRules> {
        self.categories.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&ModelCategory, &CategoryRules)> {
        self.categories.iter()
    }

    /// Admissibility of `combo` on base model `model` of `category`
    pub fn is_admissible(&self, category: ModelCategory, model: &str, combo: &BTreeSet<String>) -> bool {
        self.for_category(category)
            .map(|rules| rules.is_admissible(model, combo))
            .unwrap_or(true)
    }
}

fn report_undefined_ids(inputs: &RuleInputs, store: &AttachmentStore, diagnostics: &mut Diagnostics) {
    let mut referenced: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (key, combos) in &inputs.combos_to_skip {
        let ids = referenced.entry(key.clone()).or_default();
        for tokens in combos {
            ids.extend(parse_skip_combo(tokens).0.parts);
        }
    }
    for (key, groups) in &inputs.mutually_exclusive {
        referenced
            .entry(key.clone())
            .or_default()
            .extend(groups.iter().flatten().cloned());
    }
    for (key, conflicts) in &inputs.attachment_conflicts {
        let ids = referenced.entry(key.clone()).or_default();
        for (id, others) in conflicts {
            ids.insert(id.clone());
            ids.extend(others.iter().cloned());
        }
    }
    for (key, map) in inputs.equivalent_parts.iter().chain(&inputs.superset_parts) {
        let ids = referenced.entry(key.clone()).or_default();
        for (id, sets) in map {
            ids.insert(id.clone());
            ids.extend(sets.0.iter().flatten().cloned());
        }
    }

    for (key, ids) in referenced {
        let Ok(category) = key.parse::<ModelCategory>() else {
            continue;
        };
        for id in ids.iter().filter(|id| !store.contains(category, id)) {
            diagnostics.warn(format!("Rules for {} reference undefined attachment '{}'", key, id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn compile(yaml: &str) -> CompiledRules {
        let inputs: RuleInputs = serde_yaml::from_str(yaml).unwrap();
        CompiledRules::compile(&inputs, None, &mut Diagnostics::new())
    }

    fn accepted(rules: &CompiledRules, category: ModelCategory, model: &str, ids: &[&str]) -> Vec<BTreeSet<String>> {
        ids.iter()
            .powerset()
            .skip(1)
            .map(|subset| subset.into_iter().map(|s| s.to_string()).collect::<BTreeSet<_>>())
            .filter(|combo| rules.is_admissible(category, model, combo))
            .collect()
    }

    #[test]
    fn test_attachment_conflict_rejects_pair() {
        let rules = compile("attachmentConflicts:\n  SurvivorTorso:\n    KatePurpleHat: [KateBackpack]\n");
        let result = accepted(
            &rules,
            ModelCategory::SurvivorTorso,
            "KateCosmetic001",
            &["KateBackpack", "KatePurpleHat"],
        );
        assert_eq!(result, vec![set(&["KateBackpack"]), set(&["KatePurpleHat"])]);
        let torso = rules.for_category(ModelCategory::SurvivorTorso).unwrap();
        assert!(torso
            .pair_conflicts
            .contains(&("KateBackpack".to_string(), "KatePurpleHat".to_string())));
    }

    #[test]
    fn test_equivalent_parts_scenario() {
        let rules = compile(
            "equivalentParts:\n  SurvivorLegs:\n    KateLegsBlueChains: [[KateLegsLeftBlueChain, KateLegsRightBlueChain]]\n",
        );
        let result = accepted(
            &rules,
            ModelCategory::SurvivorLegs,
            "Kate",
            &["KateLegsLeftBlueChain", "KateLegsRightBlueChain", "KateLegsBlueChains"],
        );
        assert_eq!(
            result,
            vec![
                set(&["KateLegsLeftBlueChain"]),
                set(&["KateLegsRightBlueChain"]),
                set(&["KateLegsBlueChains"]),
            ]
        );
    }

    #[test]
    fn test_exact_skip_with_model_restriction() {
        let rules = compile("combosToSkip:\n  SurvivorLegs:\n    - [\"KateLegsBlueChains==:Pants1\"]\n");
        let legs = ModelCategory::SurvivorLegs;

        assert!(!rules.is_admissible(legs, "Pants1", &set(&["KateLegsBlueChains"])));
        assert!(rules.is_admissible(legs, "Pants1", &set(&["KateLegsBlueChains", "X"])));
        assert!(rules.is_admissible(legs, "Pants2", &set(&["KateLegsBlueChains"])));
    }

    #[test]
    fn test_parse_skip_combo() {
        let tokens: Vec<String> = vec!["KateBackpack:Kate, Meg".into(), "KatePurpleHat".into()];
        let (rule, exact) = parse_skip_combo(&tokens);
        assert!(!exact);
        assert_eq!(rule.parts, set(&["KateBackpack", "KatePurpleHat"]));
        assert_eq!(rule.base_models, set(&["Kate", "Meg"]));

        let tokens: Vec<String> = vec!["A".into(), "B==".into()];
        let (rule, exact) = parse_skip_combo(&tokens);
        assert!(exact);
        assert_eq!(rule.parts, set(&["A", "B"]));
        assert!(rule.base_models.is_empty());
    }

    #[test]
    fn test_subset_skip_rejects_supersets() {
        let rules = compile("combosToSkip:\n  SurvivorTorso:\n    - [A, B]\n");
        let torso = ModelCategory::SurvivorTorso;
        assert!(!rules.is_admissible(torso, "Kate", &set(&["A", "B"])));
        assert!(!rules.is_admissible(torso, "Kate", &set(&["A", "B", "C"])));
        assert!(rules.is_admissible(torso, "Kate", &set(&["A", "C"])));
    }

    #[test]
    fn test_mutually_exclusive_groups() {
        let rules = compile("mutuallyExclusive:\n  SurvivorHead:\n    - [Hat, Cap, Hood]\n");
        let head = rules.for_category(ModelCategory::SurvivorHead).unwrap();
        assert_eq!(head.pair_conflicts.len(), 3);
        let result = accepted(&rules, ModelCategory::SurvivorHead, "Kate", &["Hat", "Cap", "Hood", "Glasses"]);
        assert!(result.iter().all(|combo| combo.iter().filter(|id| *id != "Glasses").count() <= 1));
        assert!(result.contains(&set(&["Hat", "Glasses"])));
    }

    #[test]
    fn test_equivalent_closure_propagates_existing_rules() {
        let without = compile("combosToSkip:\n  SurvivorLegs:\n    - [B, X]\n");
        let legs = ModelCategory::SurvivorLegs;
        assert!(without.is_admissible(legs, "Kate", &set(&["A", "X"])));

        let with = compile(
            "combosToSkip:\n  SurvivorLegs:\n    - [B, X]\nequivalentParts:\n  SurvivorLegs:\n    A: [B, C]\n",
        );
        assert!(!with.is_admissible(legs, "Kate", &set(&["A", "X"])));
        assert!(!with.is_admissible(legs, "Kate", &set(&["B", "X"])));
        // The aggregate alone stays admissible
        assert!(with.is_admissible(legs, "Kate", &set(&["A"])));
    }

    #[test]
    fn test_equivalent_never_accepts_part_with_aggregate() {
        let rules = compile(
            "mutuallyExclusive:\n  SurvivorLegs:\n    - [B, Y]\nequivalentParts:\n  SurvivorLegs:\n    A: [[B, C], [D, E]]\n",
        );
        let ids = ["A", "B", "C", "D", "E", "Y"];
        for combo in accepted(&rules, ModelCategory::SurvivorLegs, "Kate", &ids) {
            if combo.contains("A") {
                for part in ["B", "C", "D", "E"] {
                    assert!(!combo.contains(part), "{combo:?} holds aggregate and part");
                }
            }
        }
    }

    #[test]
    fn test_closure_keeps_aggregate_alone_admissible() {
        let rules = compile(
            "mutuallyExclusive:\n  SurvivorLegs:\n    - [KateLegsBlueChains, KateLegsLeftBlueChain]\n\
             equivalentParts:\n  SurvivorLegs:\n    KateLegsBlueChains: [[KateLegsLeftBlueChain, KateLegsRightBlueChain]]\n",
        );
        let legs = ModelCategory::SurvivorLegs;
        assert!(rules.is_admissible(legs, "Kate", &set(&["KateLegsBlueChains"])));
        assert!(rules.is_admissible(legs, "Kate", &set(&["KateLegsLeftBlueChain"])));
        assert!(!rules.is_admissible(legs, "Kate", &set(&["KateLegsBlueChains", "KateLegsLeftBlueChain"])));
        assert!(!rules
            .for_category(legs)
            .unwrap()
            .combos_to_skip_subset
            .iter()
            .any(|rule| rule.parts == set(&["KateLegsBlueChains"])));

        let rules = compile(
            "mutuallyExclusive:\n  SurvivorTorso:\n    - [BigBag, Backpack]\nsupersetParts:\n  SurvivorTorso:\n    BigBag: [Backpack]\n",
        );
        let torso = ModelCategory::SurvivorTorso;
        assert!(rules.is_admissible(torso, "Kate", &set(&["BigBag"])));
        assert!(!rules.is_admissible(torso, "Kate", &set(&["BigBag", "Backpack"])));
    }

    #[test]
    fn test_superset_parts() {
        let rules = compile(
            "combosToSkip:\n  SurvivorTorso:\n    - [Backpack, Scarf]\nsupersetParts:\n  SurvivorTorso:\n    BigBag: [Backpack]\n",
        );
        let torso = ModelCategory::SurvivorTorso;
        assert!(!rules.is_admissible(torso, "Kate", &set(&["BigBag", "Backpack"])));
        assert!(!rules.is_admissible(torso, "Kate", &set(&["BigBag", "Scarf"])));
        assert!(rules.is_admissible(torso, "Kate", &set(&["BigBag"])));
        assert!(rules.is_admissible(torso, "Kate", &set(&["Backpack"])));
        assert_eq!(
            rules.for_category(torso).unwrap().supersets["BigBag"],
            vec![set(&["Backpack"])]
        );
    }

    #[test]
    fn test_unknown_category_is_warning() {
        let inputs: RuleInputs =
            serde_yaml::from_str("attachmentConflicts:\n  KillerWeapon:\n    A: [B]\n").unwrap();
        let mut diagnostics = Diagnostics::new();
        let rules = CompiledRules::compile(&inputs, None, &mut diagnostics);
        assert_eq!(rules.categories().count(), 0);
        assert_eq!(diagnostics.warnings().len(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_undefined_ids_are_warnings() {
        use crate::attachments::Attachment;
        use std::path::PathBuf;

        let mut diagnostics = Diagnostics::new();
        let mut store = AttachmentStore::default();
        store.insert(
            Attachment {
                attachment_id: "KateBackpack".to_string(),
                model_category: ModelCategory::SurvivorTorso,
                display_name: "Backpack".to_string(),
                attachment_data: serde_json::Value::Null,
                model_base_name: None,
                source_path: PathBuf::from("backpack.yaml"),
            },
            &mut diagnostics,
        );

        let inputs: RuleInputs =
            serde_yaml::from_str("attachmentConflicts:\n  SurvivorTorso:\n    KatePurpleHat: [KateBackpack]\n").unwrap();
        let rules = CompiledRules::compile(&inputs, Some(&store), &mut diagnostics);

        assert_eq!(diagnostics.warnings().len(), 1);
        assert!(diagnostics.warnings()[0].contains("KatePurpleHat"));
        assert!(!diagnostics.has_errors());
        assert!(rules.for_category(ModelCategory::SurvivorTorso).is_some());
    }
}
