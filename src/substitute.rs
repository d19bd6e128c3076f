use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DocError, Result};
use crate::ir::Block;

pub const DEFAULT_DELIMITER: &str = "%%";

static DEFAULT_LEFTOVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&leftover_pattern(DEFAULT_DELIMITER)).expect("leftover token regex")
});

/// Delimiter-wrapped run of uppercase letters, digits and underscores.
fn leftover_pattern(delimiter: &str) -> String {
    let d = regex::escape(delimiter);
    format!("{d}[A-Z0-9_]+{d}")
}

/// Token key (no delimiters) to replacement value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplacementMap(BTreeMap<String, String>);

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Later entries win.
    pub fn extend(&mut self, other: ReplacementMap) {
        self.0.extend(other.0);
    }

    /// Builds a map from a JSON object, coercing every value to a string.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            DocError::InvalidReplacements("expected a JSON object of key -> value".to_string())
        })?;
        Ok(obj
            .iter()
            .map(|(k, v)| (k.clone(), coerce_value(v)))
            .collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReplacementMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ReplacementMap(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// `null` becomes the empty string, strings stay as they are, anything else
/// is rendered as JSON text.
pub fn coerce_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionOutcome {
    pub blocks: Vec<Block>,
    /// Every key of the map, with how many tokens it replaced.
    pub hit_counts: BTreeMap<String, usize>,
    pub changed_block_ids: Vec<String>,
    /// Block id to tokens still present after substitution.
    pub remaining_placeholders: BTreeMap<String, Vec<String>>,
}

struct Token {
    key: String,
    token: String,
    value: String,
}

pub struct Substitutor {
    delimiter: String,
    /// Longest key first.
    tokens: Vec<Token>,
    leftover: Regex,
}

impl Substitutor {
    pub fn new(map: &ReplacementMap) -> Self {
        Self::build(map, DEFAULT_DELIMITER, DEFAULT_LEFTOVER.clone())
    }

    pub fn with_delimiter(map: &ReplacementMap, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(DocError::InvalidDelimiter);
        }
        let leftover =
            Regex::new(&leftover_pattern(delimiter)).map_err(|_| DocError::InvalidDelimiter)?;
        Ok(Self::build(map, delimiter, leftover))
    }

    fn build(map: &ReplacementMap, delimiter: &str, leftover: Regex) -> Self {
        let mut tokens: Vec<Token> = map
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| Token {
                key: k.to_string(),
                token: format!("{delimiter}{k}{delimiter}"),
                value: v.to_string(),
            })
            .collect();
        tokens.sort_by(|a, b| b.key.len().cmp(&a.key.len()).then_with(|| a.key.cmp(&b.key)));


        Substitutor {
            delimiter: delimiter.to_string(),
            tokens,
            leftover,
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Replaces every known token in one left-to-right pass. Inserted values
    /// are never rescanned.
    pub fn apply_text(&self, text: &str, hits: &mut BTreeMap<String, usize>) -> String {
        let delim = self.delimiter.as_str();
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(delim) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match self.tokens.iter().find(|t| tail.starts_with(t.token.as_str())) {
                Some(t) => {
                    out.push_str(&t.value);
                    *hits.entry(t.key.clone()).or_default() += 1;
                    rest = &tail[t.token.len()..];
                }
                None => {
                    // One char only: an odd run of delimiter chars may still
                    // end in a real token.
                    let step = tail.chars().next().map_or(1, char::len_utf8);
                    out.push_str(&tail[..step]);
                    rest = &tail[step..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Delimiter-wrapped tokens left in `text`, first occurrence order.
    pub fn leftover_tokens(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.leftover
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn apply(&self, blocks: &[Block]) -> SubstitutionOutcome {
        let mut hit_counts: BTreeMap<String, usize> =
            self.tokens.iter().map(|t| (t.key.clone(), 0)).collect();
        let mut changed_block_ids = Vec::new();
        let mut remaining_placeholders = BTreeMap::new();
        let mut out_blocks = Vec::with_capacity(blocks.len());

        for b in blocks {
            if b.text.trim().is_empty() {
                out_blocks.push(b.clone());
                continue;
            }
            let text = self.apply_text(&b.text, &mut hit_counts);
            let leftovers = self.leftover_tokens(&text);
            if !leftovers.is_empty() {
                warn!(block = %b.id, tokens = ?leftovers, "unresolved placeholders");
                remaining_placeholders.insert(b.id.clone(), leftovers);
            }
            let mut nb = b.clone();
            if text != b.text {
                changed_block_ids.push(b.id.clone());
                nb.text = text;
            }
            out_blocks.push(nb);
        }

        debug!(
            changed = changed_block_ids.len(),
            unresolved_blocks = remaining_placeholders.len(),
            "substitution finished"
        );
        SubstitutionOutcome {
            blocks: out_blocks,
            hit_counts,
            changed_block_ids,
            remaining_placeholders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::PartName;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn para(i: usize, text: &str) -> Block {
        Block::paragraph(PartName::Body, i, text)
    }

    #[test]
    fn replaces_token_and_counts_hit() {
        let map: ReplacementMap = [("FOO", "bar")].into_iter().collect();
        let out = Substitutor::new(&map).apply(&[para(0, "Hello %%FOO%%!")]);
        assert_eq!(out.blocks[0].text, "Hello bar!");
        assert_eq!(out.hit_counts["FOO"], 1);
        assert_eq!(out.changed_block_ids, vec!["DOC:p:0".to_string()]);
        assert!(out.remaining_placeholders.is_empty());
    }

    #[test]
    fn longer_key_wins_over_its_prefix() {
        let map: ReplacementMap = [("NAME", "X"), ("NAME1", "Y")].into_iter().collect();
        let out = Substitutor::new(&map).apply(&[para(0, "%%NAME1%% and %%NAME%%")]);
        assert_eq!(out.blocks[0].text, "Y and X");
        assert_eq!(out.hit_counts["NAME1"], 1);
        assert_eq!(out.hit_counts["NAME"], 1);
    }

    #[test]
    fn unknown_tokens_stay_and_are_reported() {
        let map: ReplacementMap = [("FOO", "bar")].into_iter().collect();
        let out = Substitutor::new(&map).apply(&[para(3, "%%MISSING%%"), para(4, "%%FOO%%")]);
        assert_eq!(out.blocks[0].text, "%%MISSING%%");
        assert_eq!(
            out.remaining_placeholders.get("DOC:p:3"),
            Some(&vec!["%%MISSING%%".to_string()])
        );
        assert_eq!(out.changed_block_ids, vec!["DOC:p:4".to_string()]);
    }

    #[test]
    fn empty_blocks_pass_through() {
        let map: ReplacementMap = [("FOO", "bar")].into_iter().collect();
        let out = Substitutor::new(&map).apply(&[para(0, ""), para(1, "  \t")]);
        assert_eq!(out.blocks[0].text, "");
        assert_eq!(out.blocks[1].text, "  \t");
        assert!(out.changed_block_ids.is_empty());
        assert_eq!(out.hit_counts["FOO"], 0);
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let map: ReplacementMap = [("A", "%%B%%"), ("B", "b")].into_iter().collect();
        let mut hits = BTreeMap::new();
        let once = Substitutor::new(&map).apply_text("%%A%%", &mut hits);
        assert_eq!(once, "%%B%%");
        assert_eq!(hits.get("B"), None);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let map: ReplacementMap = [("CLIENTNAME1", "Acme"), ("TODAYDATE", "May 1, 2025")]
            .into_iter()
            .collect();
        let s = Substitutor::new(&map);
        let blocks = vec![
            para(0, "Between %%CLIENTNAME1%% and us, dated %%TODAYDATE%%."),
            para(1, "%%UNKNOWN%% stays"),
        ];
        let once = s.apply(&blocks);
        let twice = s.apply(&once.blocks);
        let a: Vec<&str> = once.blocks.iter().map(|b| b.text.as_str()).collect();
        let b: Vec<&str> = twice.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(a, b);
        assert!(twice.changed_block_ids.is_empty());
    }

    #[test]
    fn stray_delimiters_are_kept_literally() {
        let map: ReplacementMap = [("RATE", "$90/hr")].into_iter().collect();
        let mut hits = BTreeMap::new();
        let out = Substitutor::new(&map).apply_text("50%% off, %%%%RATE%% %%", &mut hits);
        assert_eq!(out, "50%% off, %%$90/hr %%");
        assert_eq!(hits["RATE"], 1);
    }

    #[test]
    fn token_after_an_odd_delimiter_run_is_replaced() {
        let map: ReplacementMap = [("FOO", "bar")].into_iter().collect();
        let out = Substitutor::new(&map).apply(&[para(0, "10%%%FOO%% off, %%%%%FOO%%")]);
        assert_eq!(out.blocks[0].text, "10%bar off, %%%bar");
        assert_eq!(out.hit_counts["FOO"], 2);
        assert!(out.remaining_placeholders.is_empty());
    }

    #[test]
    fn custom_delimiter() {
        let map: ReplacementMap = [("X", "1")].into_iter().collect();
        let s = Substitutor::with_delimiter(&map, "{{").expect("delimiter");
        let out = s.apply(&[para(0, "{{X{{ {{Y{{ %%X%%")]);
        assert_eq!(out.blocks[0].text, "1 {{Y{{ %%X%%");
        assert_eq!(
            out.remaining_placeholders["DOC:p:0"],
            vec!["{{Y{{".to_string()]
        );
        assert!(matches!(
            Substitutor::with_delimiter(&map, ""),
            Err(DocError::InvalidDelimiter)
        ));
    }

    #[test]
    fn json_values_are_coerced_to_strings() {
        let map = ReplacementMap::from_json(&json!({
            "A": "text", "B": null, "C": 42, "D": true
        }))
        .expect("map");
        assert_eq!(map.get("A"), Some("text"));
        assert_eq!(map.get("B"), Some(""));
        assert_eq!(map.get("C"), Some("42"));
        assert_eq!(map.get("D"), Some("true"));
        assert!(ReplacementMap::from_json(&json!(["A"])).is_err());
    }
}
