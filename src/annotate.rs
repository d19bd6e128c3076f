use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::{Block, BlockKind, PartName};

/// Annotated blocks plus the non-empty view of the same blocks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockModel {
    pub all: Vec<Block>,
    pub non_empty: Vec<Block>,
}

impl BlockModel {
    pub fn find(&self, id: &str) -> Option<&Block> {
        self.all.iter().find(|b| b.id == id)
    }
}

/// Assigns `ordinal_all`, `is_empty` and `ordinal_non_empty` per `(part, kind)`
/// group in structural order. Input order is kept.
pub fn annotate_in_place(blocks: &mut [Block]) {
    let mut groups: BTreeMap<(PartName, BlockKind), Vec<usize>> = BTreeMap::new();
    for (i, b) in blocks.iter().enumerate() {
        groups.entry((b.part, b.kind())).or_default().push(i);
    }

    for members in groups.values_mut() {
        members.sort_by_key(|&i| blocks[i].locator.sort_key());
        let mut next_non_empty = 0usize;
        for (ordinal, &i) in members.iter().enumerate() {
            let b = &mut blocks[i];
            b.ordinal_all = ordinal;
            b.is_empty = b.text.trim().is_empty();
            b.ordinal_non_empty = if b.is_empty {
                None
            } else {
                next_non_empty += 1;
                Some(next_non_empty - 1)
            };
        }
    }
}

pub fn annotate(mut blocks: Vec<Block>) -> BlockModel {
    annotate_in_place(&mut blocks);
    let non_empty = blocks.iter().filter(|b| !b.is_empty).cloned().collect();
    BlockModel {
        all: blocks,
        non_empty,
    }
}
