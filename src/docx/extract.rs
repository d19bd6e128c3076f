use tracing::debug;

use crate::annotate::{annotate, BlockModel};
use crate::docx::layout::{scan_layout, LayoutItem, PartLayout};
use crate::docx::package::DocxPackage;
use crate::docx::tree::{XmlElement, XmlNode, XmlTree};
use crate::docx::xml::parse_xml_part;
use crate::error::{DocError, Result};
use crate::ir::{Block, ListRef, PartName};

/// Elements that never contribute visible text, skipped with their subtree.
const NON_TEXT: &[&str] = &[
    "w:pPr",
    "w:rPr",
    "w:proofErr",
    "w:bookmarkStart",
    "w:bookmarkEnd",
    "w:fldChar",
    "w:instrText",
    "w:delInstrText",
    "w:del",
    "w:delText",
    "w:moveFrom",
    "w:drawing",
    "w:pict",
    "w:object",
    "mc:AlternateContent",
    "w:commentRangeStart",
    "w:commentRangeEnd",
    "w:commentReference",
    "w:footnoteReference",
    "w:endnoteReference",
    "w:lastRenderedPageBreak",
    "w:permStart",
    "w:permEnd",
    "w:sdtPr",
    "w:sdtEndPr",
];

fn push_text_of(el: &XmlElement, out: &mut String) {
    for c in &el.children {
        match c {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Other(crate::docx::xml::XmlEvent::CData { text }) => out.push_str(text),
            _ => {}
        }
    }
}

fn collect_inline_text(el: &XmlElement, out: &mut String) {
    for child in el.child_elements() {
        match child.name.as_str() {
            "w:t" => push_text_of(child, out),
            "w:br" | "w:cr" => out.push('\n'),
            "w:tab" | "w:ptab" => out.push('\t'),
            "w:noBreakHyphen" => out.push('-'),
            "w:softHyphen" => out.push('\u{00AD}'),
            name if NON_TEXT.contains(&name) => {}
            _ => collect_inline_text(child, out),
        }
    }
}

/// Visible text of one `w:p`.
pub fn paragraph_text(p: &XmlElement) -> String {
    let mut out = String::new();
    collect_inline_text(p, &mut out);
    out
}

fn collect_paragraphs<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    for child in el.child_elements() {
        match child.name.as_str() {
            "w:p" => out.push(child),
            "w:tcPr" | "w:tblPr" | "w:trPr" | "w:tblGrid" | "w:sdtPr" | "w:sdtEndPr" => {}
            _ => collect_paragraphs(child, out),
        }
    }
}

/// Every paragraph inside a cell, nested tables included, in document order.
pub fn cell_paragraphs(tc: &XmlElement) -> Vec<&XmlElement> {
    let mut out = Vec::new();
    collect_paragraphs(tc, &mut out);
    out
}

/// Paragraph texts of a cell joined with `\n`.
pub fn cell_text(tc: &XmlElement) -> String {
    cell_paragraphs(tc)
        .into_iter()
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_properties(p: &XmlElement) -> (Option<String>, Option<ListRef>) {
    let Some(ppr) = p.child("w:pPr") else {
        return (None, None);
    };
    let style = ppr
        .child("w:pStyle")
        .and_then(|s| s.attr("w:val"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let list = ppr.child("w:numPr").and_then(|num_pr| {
        let num_id = num_pr
            .child("w:numId")
            .and_then(|e| e.attr("w:val"))
            .and_then(|v| v.trim().parse::<i32>().ok())?;
        let indent_level = num_pr
            .child("w:ilvl")
            .and_then(|e| e.attr("w:val"))
            .and_then(|v| v.trim().parse::<i32>().ok())
            .unwrap_or(0);
        Some(ListRef {
            num_id,
            indent_level,
        })
    });
    (style, list)
}

/// Blocks of an already parsed part, in reading order.
pub fn blocks_from_tree(part: PartName, tree: &XmlTree, layout: &PartLayout) -> Vec<Block> {
    let mut blocks = Vec::new();
    for item in &layout.order {
        match *item {
            LayoutItem::Paragraph(index) => {
                let Some(p) = tree.element_at(&layout.paragraphs[index]) else {
                    continue;
                };
                let (style, list) = paragraph_properties(p);
                let mut b = Block::paragraph(part, index, paragraph_text(p));
                b.style = style;
                b.list = list;
                blocks.push(b);
            }
            LayoutItem::Table(table_index) => {
                for (row, cells) in layout.tables[table_index].rows.iter().enumerate() {
                    for (col, path) in cells.iter().enumerate() {
                        let Some(tc) = tree.element_at(path) else {
                            continue;
                        };
                        blocks.push(Block::table_cell(
                            part,
                            table_index,
                            row,
                            col,
                            cell_text(tc),
                        ));
                    }
                }
            }
        }
    }
    blocks
}

/// Parses one part's XML and emits its blocks.
pub fn extract_part_blocks(part: PartName, xml: &[u8]) -> Result<Vec<Block>> {
    let entry = part.entry_name();
    let events = parse_xml_part(&entry, xml).map_err(|e| DocError::part_parse(&entry, e))?;
    let tree = XmlTree::from_part(events).map_err(|e| DocError::part_parse(&entry, e))?;
    let layout = scan_layout(&tree);
    let blocks = blocks_from_tree(part, &tree, &layout);
    debug!(
        part = %part,
        paragraphs = layout.paragraphs.len(),
        tables = layout.tables.len(),
        blocks = blocks.len(),
        "extracted part"
    );
    Ok(blocks)
}

/// Reads a package and returns its annotated block model: body first, then
/// headers and footers in numeric order.
pub fn extract_blocks(package_bytes: &[u8]) -> Result<BlockModel> {
    let pkg = DocxPackage::from_bytes(package_bytes)?;
    let mut blocks = Vec::new();
    for (part, xml) in pkg.text_parts()? {
        blocks.extend(extract_part_blocks(part, xml)?);
    }
    Ok(annotate(blocks))
}
