//! Utilities for querying and rewriting block trees.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::document::{Block, Document, Property};

/// Merges two property lists by name. Later entries win; the first
/// occurrence of a name decides its position.
pub fn merge_properties(existing: Vec<Property>, new: Vec<Property>) -> Vec<Property> {
    let mut merged: IndexMap<String, Property> = IndexMap::new();
    for property in existing.into_iter().chain(new) {
        merged.insert(property.name.clone(), property);
    }
    merged.into_values().collect()
}

/// True when every non-empty field of the pattern equals the block's
/// field. Data payloads are not compared.
pub fn match_block(pattern: &Block, block: &Block) -> bool {
    let fields = [
        (&pattern.id, &block.id),
        (&pattern.uuid, &block.uuid),
        (&pattern.uri, &block.uri),
        (&pattern.url, &block.url),
        (&pattern.block_type, &block.block_type),
        (&pattern.title, &block.title),
        (&pattern.rel, &block.rel),
        (&pattern.name, &block.name),
        (&pattern.value, &block.value),
        (&pattern.content_type, &block.content_type),
        (&pattern.role, &block.role),
    ];
    fields
        .iter()
        .all(|(want, have)| want.is_empty() || want == have)
}

fn matches_any(block: &Block, patterns: &[Block]) -> bool {
    patterns.iter().any(|pattern| match_block(pattern, block))
}

/// Removes every block matching one of the patterns, recursing into
/// nested blocks.
pub fn delete_blocks(document: &mut Document, patterns: &[Block]) {
    document.links = blocks_to_keep(std::mem::take(&mut document.links), patterns);
    document.meta = blocks_to_keep(std::mem::take(&mut document.meta), patterns);
    document.content = blocks_to_keep(std::mem::take(&mut document.content), patterns);
}

/// The blocks NOT matching any pattern, with nested blocks filtered
/// the same way.
pub fn blocks_to_keep(blocks: Vec<Block>, patterns: &[Block]) -> Vec<Block> {
    let mut kept = Vec::new();
    for mut block in blocks {
        let delete = matches_any(&block, patterns);
        block.links = blocks_to_keep(std::mem::take(&mut block.links), patterns);
        block.meta = blocks_to_keep(std::mem::take(&mut block.meta), patterns);
        block.content = blocks_to_keep(std::mem::take(&mut block.content), patterns);
        if !delete {
            kept.push(block);
        }
    }
    kept
}

/// Collects copies of every block matching one of the patterns, in
/// meta, links, content order, recursing into nested blocks.
pub fn get_blocks(document: &Document, patterns: &[Block]) -> Vec<Block> {
    let mut found = Vec::new();
    collect_blocks(&document.meta, patterns, &mut found);
    collect_blocks(&document.links, patterns, &mut found);
    collect_blocks(&document.content, patterns, &mut found);
    found
}

fn collect_blocks(blocks: &[Block], patterns: &[Block], found: &mut Vec<Block>) {
    for block in blocks {
        if matches_any(block, patterns) {
            found.push(block.clone());
        }
        collect_blocks(&block.links, patterns, found);
        collect_blocks(&block.meta, patterns, found);
        collect_blocks(&block.content, patterns, found);
    }
}

/// Drops links that match one of the patterns and duplicate an earlier
/// kept link.
pub fn dedup_links(links: Vec<Block>, patterns: &[Block]) -> Vec<Block> {
    let mut unique: Vec<Block> = Vec::new();
    for link in links {
        let duplicate = matches_any(&link, patterns)
            && unique.iter().any(|kept| match_block(kept, &link));
        if !duplicate {
            unique.push(link);
        }
    }
    unique
}

/// A rewrite rule: blocks matching `old` get `new`'s non-empty fields.
#[derive(Debug, Clone, Default)]
pub struct BlockReplacement {
    pub old: Block,
    pub new: Block,
}

/// Applies the replacement rules everywhere in the document.
pub fn replace_blocks(document: &mut Document, replacements: &[BlockReplacement]) {
    replace_in_list(&mut document.links, replacements);
    replace_in_list(&mut document.meta, replacements);
    replace_in_list(&mut document.content, replacements);
}

fn replace_in_list(blocks: &mut [Block], replacements: &[BlockReplacement]) {
    for block in blocks {
        for replacement in replacements {
            if match_block(&replacement.old, block) {
                overlay_block(block, &replacement.new);
            }
        }
        replace_in_list(&mut block.links, replacements);
        replace_in_list(&mut block.meta, replacements);
        replace_in_list(&mut block.content, replacements);
    }
}

fn overlay_block(block: &mut Block, new: &Block) {
    let fields = [
        (&mut block.id, &new.id),
        (&mut block.uuid, &new.uuid),
        (&mut block.uri, &new.uri),
        (&mut block.url, &new.url),
        (&mut block.block_type, &new.block_type),
        (&mut block.title, &new.title),
        (&mut block.rel, &new.rel),
        (&mut block.name, &new.name),
        (&mut block.value, &new.value),
        (&mut block.content_type, &new.content_type),
        (&mut block.role, &new.role),
    ];
    for (have, want) in fields {
        if !want.is_empty() {
            *have = want.clone();
        }
    }
    if !new.data.is_empty() {
        block.data = new.data.clone();
    }
}

/// The blocks accepted by the filter, in order.
pub fn filter_blocks(blocks: &[Block], filter: impl Fn(&Block) -> bool) -> Vec<Block> {
    blocks.iter().filter(|b| filter(b)).cloned().collect()
}

/// Stable sort of blocks by a type rank map. Unranked types sort as
/// rank zero.
#[derive(Debug, Clone, Default)]
pub struct BlockSorter {
    order: HashMap<String, i32>,
}

impl BlockSorter {
    pub fn new(order: HashMap<String, i32>) -> Self {
        BlockSorter { order }
    }

    fn rank(&self, block: &Block) -> i32 {
        self.order.get(&block.block_type).copied().unwrap_or(0)
    }

    pub fn sort_blocks(&self, blocks: &mut [Block]) {
        blocks.sort_by_key(|block| self.rank(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rel: &str, uuid: &str) -> Block {
        Block {
            rel: rel.to_string(),
            uuid: uuid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn merge_prefers_new_properties() {
        let existing = vec![
            Property::new("slugline", "old"),
            Property::new("by", "someone"),
        ];
        let new = vec![Property::new("slugline", "new")];
        let merged = merge_properties(existing, new);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "slugline");
        assert_eq!(merged[0].value, "new");
        assert_eq!(merged[1].name, "by");
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = vec![Property::new("slugline", "a")];
        let once = merge_properties(existing.clone(), existing.clone());
        let twice = merge_properties(once.clone(), existing);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_pattern_fields_are_wildcards() {
        let pattern = Block {
            rel: "channel".to_string(),
            ..Default::default()
        };
        assert!(match_block(&pattern, &link("channel", "u1")));
        assert!(!match_block(&pattern, &link("item", "u1")));
    }

    #[test]
    fn delete_blocks_recurses() {
        let mut document = Document::default();
        document.meta.push(Block {
            block_type: "x-im/teaser".to_string(),
            links: vec![link("channel", "u1"), link("item", "u2")],
            ..Default::default()
        });
        let pattern = Block {
            rel: "channel".to_string(),
            ..Default::default()
        };
        delete_blocks(&mut document, &[pattern]);
        assert_eq!(document.meta.len(), 1);
        assert_eq!(document.meta[0].links.len(), 1);
        assert_eq!(document.meta[0].links[0].rel, "item");
    }

    #[test]
    fn get_blocks_finds_nested_matches() {
        let mut document = Document::default();
        document.meta.push(Block {
            block_type: "x-im/teaser".to_string(),
            links: vec![link("channel", "u1")],
            ..Default::default()
        });
        document.links.push(link("channel", "u2"));
        let pattern = Block {
            rel: "channel".to_string(),
            ..Default::default()
        };
        let found = get_blocks(&document, &[pattern]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].uuid, "u1");
        assert_eq!(found[1].uuid, "u2");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let links = vec![
            link("channel", "u1"),
            link("channel", "u1"),
            link("channel", "u2"),
        ];
        let pattern = Block {
            rel: "channel".to_string(),
            ..Default::default()
        };
        let unique = dedup_links(links, &[pattern]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn replace_overlays_non_empty_fields() {
        let mut document = Document::default();
        document.links.push(link("channel", "u1"));
        let replacement = BlockReplacement {
            old: Block {
                rel: "channel".to_string(),
                ..Default::default()
            },
            new: Block {
                title: "Web".to_string(),
                ..Default::default()
            },
        };
        replace_blocks(&mut document, &[replacement]);
        assert_eq!(document.links[0].title, "Web");
        assert_eq!(document.links[0].uuid, "u1");
    }

    #[test]
    fn sort_is_stable_within_equal_ranks() {
        let mut order = HashMap::new();
        order.insert("x-im/image".to_string(), 1);
        let sorter = BlockSorter::new(order);
        let mut blocks = vec![
            Block {
                block_type: "x-im/image".to_string(),
                id: "i1".to_string(),
                ..Default::default()
            },
            Block {
                block_type: "x-im/paragraph".to_string(),
                id: "p1".to_string(),
                ..Default::default()
            },
            Block {
                block_type: "x-im/paragraph".to_string(),
                id: "p2".to_string(),
                ..Default::default()
            },
        ];
        sorter.sort_blocks(&mut blocks);
        assert_eq!(blocks[0].id, "p1");
        assert_eq!(blocks[1].id, "p2");
        assert_eq!(blocks[2].id, "i1");
    }
}
