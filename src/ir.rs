use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Addressable XML part of a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartName {
    Body,
    Header(u32),
    Footer(u32),
}

impl PartName {
    /// Zip entry holding this part.
    pub fn entry_name(&self) -> String {
        match self {
            PartName::Body => "word/document.xml".to_string(),
            PartName::Header(n) => format!("word/header{n}.xml"),
            PartName::Footer(n) => format!("word/footer{n}.xml"),
        }
    }

    /// Prefix used in block ids: `DOC`, `HDR<N>`, `FTR<N>`.
    pub fn scope(&self) -> String {
        match self {
            PartName::Body => "DOC".to_string(),
            PartName::Header(n) => format!("HDR{n}"),
            PartName::Footer(n) => format!("FTR{n}"),
        }
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartName::Body => f.write_str("body"),
            PartName::Header(n) => write!(f, "header{n}"),
            PartName::Footer(n) => write!(f, "footer{n}"),
        }
    }
}

impl FromStr for PartName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "body" {
            return Ok(PartName::Body);
        }
        let parse_n = |digits: &str| {
            digits
                .parse::<u32>()
                .map_err(|_| format!("invalid part name: {s}"))
        };
        if let Some(rest) = s.strip_prefix("header") {
            return parse_n(rest).map(PartName::Header);
        }
        if let Some(rest) = s.strip_prefix("footer") {
            return parse_n(rest).map(PartName::Footer);
        }
        Err(format!("invalid part name: {s}"))
    }
}

impl TryFrom<String> for PartName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartName> for String {
    fn from(value: PartName) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Paragraph,
    TableCell,
}

/// Position of a block inside its part. This is the block's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BlockLocator {
    Paragraph {
        index: usize,
    },
    TableCell {
        #[serde(rename = "tableIndex")]
        table_index: usize,
        row: usize,
        col: usize,
    },
}

impl BlockLocator {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockLocator::Paragraph { .. } => BlockKind::Paragraph,
            BlockLocator::TableCell { .. } => BlockKind::TableCell,
        }
    }

    /// Structural order within a `(part, kind)` group.
    pub fn sort_key(&self) -> (usize, usize, usize) {
        match *self {
            BlockLocator::Paragraph { index } => (index, 0, 0),
            BlockLocator::TableCell {
                table_index,
                row,
                col,
            } => (table_index, row, col),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRef {
    pub num_id: i32,
    pub indent_level: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub part: PartName,
    #[serde(flatten)]
    pub locator: BlockLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListRef>,
    pub text: String,
    #[serde(default)]
    pub ordinal_all: usize,
    #[serde(default)]
    pub is_empty: bool,
    #[serde(default)]
    pub ordinal_non_empty: Option<usize>,
}

impl Block {
    pub fn paragraph(part: PartName, index: usize, text: impl Into<String>) -> Self {
        Self::at(part, BlockLocator::Paragraph { index }, text.into())
    }

    pub fn table_cell(
        part: PartName,
        table_index: usize,
        row: usize,
        col: usize,
        text: impl Into<String>,
    ) -> Self {
        Self::at(
            part,
            BlockLocator::TableCell {
                table_index,
                row,
                col,
            },
            text.into(),
        )
    }

    fn at(part: PartName, locator: BlockLocator, text: String) -> Self {
        let is_empty = text.trim().is_empty();
        Block {
            id: block_id(part, &locator),
            part,
            locator,
            style: None,
            list: None,
            text,
            ordinal_all: 0,
            is_empty,
            ordinal_non_empty: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.locator.kind()
    }
}

/// `DOC:p:4`, `HDR1:tc:0:2:1`.
pub fn block_id(part: PartName, locator: &BlockLocator) -> String {
    match *locator {
        BlockLocator::Paragraph { index } => format!("{}:p:{index}", part.scope()),
        BlockLocator::TableCell {
            table_index,
            row,
            col,
        } => format!("{}:tc:{table_index}:{row}:{col}", part.scope()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_encode_scope_kind_and_coordinates() {
        assert_eq!(Block::paragraph(PartName::Body, 4, "x").id, "DOC:p:4");
        assert_eq!(
            Block::table_cell(PartName::Header(2), 0, 3, 1, "x").id,
            "HDR2:tc:0:3:1"
        );
        assert_eq!(Block::paragraph(PartName::Footer(1), 0, "").id, "FTR1:p:0");
    }

    #[test]
    fn part_names_round_trip_through_strings() {
        for p in [PartName::Body, PartName::Header(3), PartName::Footer(12)] {
            assert_eq!(p.to_string().parse::<PartName>(), Ok(p));
        }
        assert!("sidebar1".parse::<PartName>().is_err());
        assert!("header".parse::<PartName>().is_err());
    }

    #[test]
    fn block_json_uses_flat_camel_case_shape() {
        let b = Block::table_cell(PartName::Body, 1, 2, 3, "Rate");
        let v = serde_json::to_value(&b).expect("serialize");
        assert_eq!(v["kind"], "tableCell");
        assert_eq!(v["tableIndex"], 1);
        assert_eq!(v["part"], "body");
        assert_eq!(v["ordinalNonEmpty"], serde_json::Value::Null);

        let back: Block = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, b);
    }
}
